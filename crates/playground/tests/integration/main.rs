//! Integration tests for playground
//!
//! Most tests drive the engine through the shell-script backends in
//! `tests/fixtures/configs/shell.toml` and need only `/bin/sh`. The
//! isolation tests additionally need unprivileged user namespaces and skip
//! themselves without them.
//!
//! Tests against real Java compilers are behind the `integration-tests`
//! feature and marked `#[ignore]`. To include them:
//!    cargo test -p playground --features integration-tests -- --include-ignored

use std::fs;

use playground::{Config, Engine};

mod concurrency;
mod config_loading;
mod execution;
mod fallback;
mod isolation;
#[cfg(feature = "integration-tests")]
mod jdk;
mod style;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
#[cfg_attr(not(feature = "integration-tests"), allow(dead_code))]
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Config with shell-script backends
pub(crate) fn shell_config() -> Config {
    Config::from_file(format!("{FIXTURES_PATH}/configs/shell.toml"))
        .expect("Failed to load shell config")
}

/// Engine with shell-script backends
pub(crate) fn shell_engine() -> Engine {
    Engine::new(shell_config()).expect("Failed to create engine")
}
