use playground::{BackendKind, Request, Submission};

use super::shell_engine;

/// Source the restricted shell backend refuses, like a generic collection
/// without a cast on a compiler that lacks generics
const GENERIC_SOURCE: &str = "echo 'List<String> ok'";

#[tokio::test]
async fn test_restricted_backend_used_when_it_succeeds() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo plain"]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    assert_eq!(result.compiler_used, "Dash");
}

#[tokio::test]
async fn test_falls_back_to_full_backend() {
    let engine = shell_engine();
    let submission = Submission::classes([GENERIC_SOURCE]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.compiled);
    assert!(result.executed);
    assert_eq!(result.compiler_used, "Bash");
    assert_eq!(result.output, "List<String> ok\n");
}

#[tokio::test]
async fn test_pinned_restricted_backend_does_not_fall_back() {
    let engine = shell_engine();
    let submission = Submission::classes([GENERIC_SOURCE])
        .backend(BackendKind::Restricted)
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(!result.compiled);
    assert!(!result.executed);
    assert_eq!(result.compiler_used, "Dash");
    assert_eq!(
        result.compilation_error_message.as_deref(),
        Some("Line 1: unsupported generic type usage")
    );
}

#[tokio::test]
async fn test_request_pins_backend_by_display_name() {
    let engine = shell_engine();
    let request: Request = serde_json::from_value(serde_json::json!({
        "sourceUnits": [GENERIC_SOURCE],
        "mode": "class",
        "backend": "dash"
    }))
    .unwrap();

    let result = engine.run_request(request).await;

    assert!(!result.compiled);
    assert_eq!(result.compiler_used, "Dash");
}

#[tokio::test]
async fn test_full_backend_diagnostics_after_fallback() {
    let engine = shell_engine();
    // Both a generic usage and a syntax error: the full backend gets a try
    // and its own diagnostics are reported
    let submission = Submission::classes(["echo 'List<String>'\nif then fi ("])
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(!result.compiled);
    assert_eq!(result.compiler_used, "Bash");
    assert!(
        !result
            .compilation_error_message
            .unwrap()
            .contains("unsupported generic")
    );
}
