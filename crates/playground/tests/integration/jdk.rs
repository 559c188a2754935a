//! Tests against the configured Java compilers
//!
//! These need `java`, `javac` and the Janino jars at the paths of the
//! default configuration.

use playground::{BackendKind, Engine, Submission};

use super::fixture_source;

fn engine() -> Engine {
    Engine::with_defaults().expect("Failed to create engine")
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_snippet_prints_sum() {
    let submission = Submission::snippet("int a = 3;\nint b = 4;\nSystem.out.println(a + b);")
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(result.compiled, "{result:?}");
    assert!(result.executed);
    assert!(!result.crashed && !result.timed_out);
    assert_eq!(result.output, "7\n");
    assert_eq!(result.style_check_passed, Some(true));
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_snippet_with_method_declaration() {
    let source = "int square(int x) {\n    return x * x;\n}\n\nSystem.out.println(square(6));";
    let submission = Submission::snippet(source).build().unwrap();

    let result = engine().run(&submission).await;

    assert!(result.executed, "{result:?}");
    assert_eq!(result.output, "36\n");
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_class_prints_sum() {
    let submission = Submission::classes([fixture_source("Question.java")])
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(result.executed, "{result:?}");
    assert_eq!(result.output, "7\n");
    assert_eq!(result.compiler_used, "Janino");
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_system_exit_is_contained() {
    let submission = Submission::classes([fixture_source("Exit.java")])
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(result.compiled);
    assert!(!result.executed);
    assert!(result.crashed);
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_null_dereference_crashes() {
    let submission = Submission::classes([fixture_source("NullDeref.java")])
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(result.compiled);
    assert!(result.crashed);
    assert!(!result.executed);
    assert!(
        result
            .execution_error_message
            .unwrap()
            .contains("NullPointerException")
    );
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_infinite_loop_times_out() {
    let submission = Submission::classes([fixture_source("Loop.java")])
        .timeout_ms(1000)
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(result.timed_out);
    assert!(!result.executed);
    assert!(result.execution_length_ms >= 1000);
    assert!(result.execution_length_ms <= 1200);
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_missing_main_is_not_compiled() {
    let submission = Submission::classes([fixture_source("NoMain.java")])
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(!result.compiled);
    assert!(!result.executed);
    assert!(
        result
            .compilation_error_message
            .unwrap()
            .contains("main(String[])")
    );
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_wrong_entry_class_is_not_compiled() {
    let submission = Submission::classes([fixture_source("Question.java")])
        .entry_class("Main")
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(!result.compiled);
    assert!(!result.executed);
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_generic_collection_falls_back() {
    let submission = Submission::classes([fixture_source("GenericList.java")])
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(result.executed, "{result:?}");
    assert_eq!(result.output, "generic\n");
    assert_eq!(result.compiler_used, "JDK");
}

#[tokio::test]
#[ignore = "requires a JDK and Janino"]
async fn test_generic_collection_pinned_to_restricted() {
    let submission = Submission::classes([fixture_source("GenericList.java")])
        .backend(BackendKind::Restricted)
        .build()
        .unwrap();

    let result = engine().run(&submission).await;

    assert!(!result.compiled);
    assert_eq!(result.compiler_used, "Janino");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a JDK and Janino"]
async fn test_concurrent_markers() {
    let engine = engine();
    let template = fixture_source("Marker.java");
    let submissions = (0..32)
        .map(|i| {
            Submission::classes([template.replace("MARKER", &format!("marker-{i}"))])
                .timeout_ms(5000)
                .build()
                .unwrap()
        })
        .collect();

    let results = engine.run_all(submissions).await;

    for (i, result) in results.iter().enumerate() {
        assert!(result.executed, "submission {i}: {result:?}");
        let expected = format!("marker-{i}");
        assert_eq!(result.output.lines().count(), 100);
        assert!(result.output.lines().all(|l| l == expected));
    }
}
