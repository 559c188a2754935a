use std::time::Duration;

use playground::{BackendKind, Mode, Submission};

use super::{shell_config, shell_engine};

#[tokio::test]
async fn test_pure_program_output() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo $((3 + 4))"]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.compiled);
    assert!(result.executed);
    assert!(!result.crashed);
    assert!(!result.timed_out);
    assert_eq!(result.output, "7\n");
    assert_eq!(result.compiler_used, "Dash");
    assert_eq!(result.mode, Mode::Class);
    assert!(result.compilation_error_message.is_none());
    assert!(result.execution_error_message.is_none());
    assert!(result.is_consistent());
}

#[tokio::test]
async fn test_stdout_and_stderr_are_merged() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo one; echo two >&2; echo three"])
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    for line in ["one\n", "two\n", "three\n"] {
        assert!(result.output.contains(line), "{:?}", result.output);
    }
}

#[tokio::test]
async fn test_output_is_capped() {
    let mut config = shell_config();
    config.max_output = 16;
    let engine = playground::Engine::new(config).unwrap();
    let submission = Submission::classes(["i=0; while [ $i -lt 100 ]; do echo 0123456789; i=$((i + 1)); done"])
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    assert_eq!(result.output.len(), 16);
}

#[tokio::test]
async fn test_self_termination_does_not_reach_host() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo before; kill -9 $$"]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.compiled);
    assert!(!result.executed);
    assert!(result.crashed);
    assert_eq!(result.output, "");
    let message = result.execution_error_message.unwrap();
    assert!(message.starts_with("security violation"), "{message}");

    // The engine keeps serving submissions
    let next = Submission::classes(["echo still here"]).build().unwrap();
    assert_eq!(engine.run(&next).await.output, "still here\n");
}

#[tokio::test]
async fn test_runtime_fault_is_crash() {
    let engine = shell_engine();
    let submission = Submission::classes(["cat /nonexistent/file"]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.compiled);
    assert!(result.crashed);
    assert!(!result.executed);
    assert!(!result.timed_out);
    assert_eq!(
        result.execution_error_message.as_deref(),
        Some("guest exited with status 1")
    );
    assert!(result.is_consistent());
}

#[tokio::test]
async fn test_unbounded_loop_times_out() {
    let engine = shell_engine();
    let submission = Submission::classes(["while :; do :; done"])
        .timeout_ms(500)
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.compiled);
    assert!(result.timed_out);
    assert!(!result.executed);
    assert!(!result.crashed);
    assert_eq!(result.timeout_length_ms, 500);
    assert!(result.execution_length_ms >= 500, "{}", result.execution_length_ms);
    assert!(result.execution_length_ms <= 600, "{}", result.execution_length_ms);
}

#[tokio::test]
async fn test_timeout_kills_background_children() {
    let engine = shell_engine();
    let submission = Submission::classes(["sleep 30 & sleep 30"])
        .timeout_ms(200)
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let result = engine.run(&submission).await;

    assert!(result.timed_out);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_override_is_clamped() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo ok"])
        .timeout_ms(u64::MAX)
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    assert_eq!(result.timeout_length_ms, engine.config().max_timeout_ms);
}

#[tokio::test]
async fn test_missing_entry_class_is_not_compiled() {
    let engine = shell_engine();
    // The unit declares `Greeter`, so it is written to Greeter.sh
    let submission = Submission::classes([": public class Greeter; echo hi"])
        .entry_class("Main")
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(!result.compiled);
    assert!(!result.executed && !result.crashed && !result.timed_out);
    assert_eq!(
        result.compilation_error_message.as_deref(),
        Some("class Main not found")
    );
    assert_eq!(result.output, "");
}

#[tokio::test]
async fn test_units_compile_together() {
    let engine = shell_engine();
    let submission = Submission::classes([
        ". \"$(dirname \"$0\")/QuestionHelper1.sh\"\ngreet world",
        "greet() {\n    echo \"hello $1\"\n}",
    ])
    .build()
    .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed, "{result:?}");
    assert_eq!(result.output, "hello world\n");
}

#[tokio::test]
async fn test_worker_environment_is_cleared() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo \"[$HOME][$LANG]\"; pwd"])
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    let mut lines = result.output.lines();
    assert_eq!(lines.next(), Some("[][C.UTF-8]"));
    assert!(lines.next().is_some_and(|dir| dir.ends_with("/run")));
}

#[tokio::test]
async fn test_pinned_full_backend() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo full"])
        .backend(BackendKind::FullSpec)
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    assert_eq!(result.compiler_used, "Bash");
}

#[tokio::test]
async fn test_full_backend_diagnostics() {
    let engine = shell_engine();
    let submission = Submission::classes(["if then fi ("])
        .backend(BackendKind::FullSpec)
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(!result.compiled);
    assert_eq!(result.compiler_used, "Bash");
    assert!(result.compilation_error_message.is_some_and(|m| !m.is_empty()));
}
