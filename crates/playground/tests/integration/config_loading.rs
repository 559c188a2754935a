use playground::{BackendKind, Config, ConfigError, Engine};

use super::FIXTURES_PATH;

fn load(name: &str) -> Result<Config, ConfigError> {
    Config::from_file(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn test_load_shell_config() {
    let config = load("shell.toml").expect("Failed to load config");

    assert_eq!(config.source_extension, "sh");
    assert_eq!(config.backend(BackendKind::Restricted).name, "Dash");
    assert_eq!(config.backend(BackendKind::FullSpec).name, "Bash");
    assert!(!config.backend(BackendKind::Restricted).inject_launcher);
    assert_eq!(config.max_workers, 32);
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let config = load("valid_minimal.toml").expect("Failed to load config");

    assert_eq!(config.source_extension, "java");
    assert_eq!(config.default_timeout_ms, 1000);
    assert_eq!(config.default_entry_class, "Question");
    assert_eq!(config.default_indent_level, 4);
    assert!(config.style.enabled);
    assert!(config.backend(BackendKind::FullSpec).inject_launcher);
    assert!(Engine::new(config).is_ok());
}

#[test]
fn test_load_invalid_empty_name() {
    assert!(matches!(
        load("invalid_empty_name.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_load_invalid_pattern() {
    assert!(matches!(
        load("invalid_pattern.toml"),
        Err(ConfigError::Pattern(..))
    ));
}

#[test]
fn test_load_invalid_timeouts() {
    assert!(matches!(
        load("invalid_timeouts.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_load_missing_backend() {
    assert!(matches!(
        load("invalid_missing_backend.toml"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_load_nonexistent_file() {
    assert!(load("does_not_exist.toml").is_err());
}
