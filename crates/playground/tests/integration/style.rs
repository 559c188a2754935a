use playground::{Request, Submission};

use super::shell_engine;

#[tokio::test]
async fn test_style_failure_does_not_gate_execution() {
    let engine = shell_engine();
    let submission = Submission::classes(["x=1\necho $x\t"]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    assert_eq!(result.output, "1\n");
    assert_eq!(result.style_check_passed, Some(false));
}

#[tokio::test]
async fn test_style_pass_on_failed_compile() {
    let engine = shell_engine();
    let request: Request = serde_json::from_value(serde_json::json!({
        "sourceUnits": ["if then fi ("],
        "mode": "class",
        "backend": "full"
    }))
    .unwrap();

    let result = engine.run_request(request).await;

    assert!(!result.compiled);
    assert_eq!(result.style_check_passed, Some(true));
}

#[tokio::test]
async fn test_style_checks_every_unit() {
    let engine = shell_engine();
    let submission = Submission::classes(["echo ok", "helper() {\n\techo nested\n}"])
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    assert_eq!(result.style_check_passed, Some(false));
}

#[tokio::test]
async fn test_style_disabled_by_config() {
    let mut config = super::shell_config();
    config.style.enabled = false;
    let engine = playground::Engine::new(config).unwrap();
    let submission = Submission::classes(["echo ok"]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed);
    assert_eq!(result.style_check_passed, None);
}
