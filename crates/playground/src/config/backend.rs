use serde::Deserialize;

use crate::types::ResourceLimits;

/// Default PATH for compiler and worker processes
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/bin:/bin";

/// Configuration for one compiler backend
///
/// Commands are argument vectors with placeholders:
/// `{sources}` (expands to one argument per source file), `{output}` (the
/// artifact directory) and `{class}` (the entry class name).
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Human-readable name reported as `compilerUsed` (e.g., "JDK")
    pub name: String,

    /// Compiler invocation
    pub compile: Vec<String>,

    /// Worker invocation that locates and runs the entry point
    pub run: Vec<String>,

    /// Compile the bundled launcher together with the submission
    #[serde(default = "default_inject_launcher")]
    pub inject_launcher: bool,

    /// Regexes over compiler diagnostics that mark a feature this backend
    /// does not support. A match lets the other backend retry.
    #[serde(default)]
    pub unsupported_patterns: Vec<String>,

    /// Worker limits for artifacts of this backend, overriding
    /// `[security.limits]` field by field
    #[serde(default = "ResourceLimits::unlimited")]
    pub limits: ResourceLimits,
}

fn default_inject_launcher() -> bool {
    true
}

impl BackendConfig {
    /// Expand placeholders in the given command
    pub fn expand_command(
        command: &[String],
        sources: &[String],
        output: &str,
        class: &str,
    ) -> Vec<String> {
        let mut expanded = Vec::with_capacity(command.len() + sources.len());
        for arg in command {
            if arg == "{sources}" {
                expanded.extend(sources.iter().cloned());
                continue;
            }
            expanded.push(arg.replace("{output}", output).replace("{class}", class));
        }
        expanded
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn expand_command_preserves_args_without_placeholders(
            arg1 in "[a-z]+",
            arg2 in "[a-z]+",
            arg3 in "[a-z]+"
        ) {
            let cmd = vec![arg1.clone(), arg2.clone(), arg3.clone()];
            let result = BackendConfig::expand_command(&cmd, &[], "out", "Question");
            prop_assert_eq!(result, cmd);
        }

        #[test]
        fn expand_command_length_grows_by_sources(
            cmd_len in 1usize..8,
            source_count in 0usize..6
        ) {
            let mut cmd: Vec<String> = (0..cmd_len).map(|i| format!("arg{i}")).collect();
            cmd.push("{sources}".to_owned());
            let sources: Vec<String> = (0..source_count).map(|i| format!("U{i}.java")).collect();
            let result = BackendConfig::expand_command(&cmd, &sources, "out", "Question");
            prop_assert_eq!(result.len(), cmd_len + source_count);
        }
    }
}
