use regex::Regex;

use crate::config::{Config, ConfigError};
use crate::types::BackendKind;

/// Decides which backend compiles a submission and whether a failed
/// compilation is retried on the other backend
///
/// The restricted backend is tried first. Its failure is retried on the
/// full-spec backend only if the caller did not pin a backend and the
/// diagnostics match one of the restricted backend's "unsupported feature"
/// signatures. Everything else is final.
#[derive(Debug, Clone, Default)]
pub struct FallbackPolicy {
    signatures: Vec<Regex>,
}

impl FallbackPolicy {
    /// Create a policy from signature patterns
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { signatures })
    }

    /// Create the policy from the restricted backend's configured signatures
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let restricted = config.backend(BackendKind::Restricted);
        Self::new(&restricted.unsupported_patterns)
            .map_err(|e| ConfigError::Pattern(BackendKind::Restricted.to_string(), e))
    }

    /// Backend of the first attempt
    pub fn initial(&self, pinned: Option<BackendKind>) -> BackendKind {
        pinned.unwrap_or(BackendKind::Restricted)
    }

    /// Backend to retry with after `attempted` failed with `diagnostics`,
    /// or `None` if the failure is final
    pub fn retry_with(
        &self,
        attempted: BackendKind,
        pinned: bool,
        diagnostics: &str,
    ) -> Option<BackendKind> {
        if pinned || attempted != BackendKind::Restricted {
            return None;
        }
        self.matched_signature(diagnostics)
            .map(|_| BackendKind::FullSpec)
    }

    /// The first signature that matches the diagnostics
    pub fn matched_signature(&self, diagnostics: &str) -> Option<&str> {
        self.signatures
            .iter()
            .find(|re| re.is_match(diagnostics))
            .map(Regex::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERIC_FAILURE: &str = "File Question.java, Line 5, Column 20: Assignment conversion not possible from type \"java.lang.Object\" to type \"java.lang.String\"";

    fn policy() -> FallbackPolicy {
        FallbackPolicy::new([
            r#"Assignment conversion not possible from type "java\.lang\.Object""#,
            "(?i)lambda",
        ])
        .unwrap()
    }

    #[test]
    fn test_initial_backend() {
        let policy = policy();
        assert_eq!(policy.initial(None), BackendKind::Restricted);
        assert_eq!(
            policy.initial(Some(BackendKind::FullSpec)),
            BackendKind::FullSpec
        );
        assert_eq!(
            policy.initial(Some(BackendKind::Restricted)),
            BackendKind::Restricted
        );
    }

    #[test]
    fn test_retry_on_signature() {
        assert_eq!(
            policy().retry_with(BackendKind::Restricted, false, GENERIC_FAILURE),
            Some(BackendKind::FullSpec)
        );
        assert_eq!(
            policy().retry_with(BackendKind::Restricted, false, "LAMBDA expressions unsupported"),
            Some(BackendKind::FullSpec)
        );
    }

    #[test]
    fn test_no_retry_for_genuine_errors() {
        assert_eq!(
            policy().retry_with(BackendKind::Restricted, false, "Line 1: ';' expected"),
            None
        );
    }

    #[test]
    fn test_no_retry_when_pinned() {
        assert_eq!(
            policy().retry_with(BackendKind::Restricted, true, GENERIC_FAILURE),
            None
        );
    }

    #[test]
    fn test_no_retry_from_full_backend() {
        assert_eq!(
            policy().retry_with(BackendKind::FullSpec, false, GENERIC_FAILURE),
            None
        );
    }

    #[test]
    fn test_matched_signature() {
        let policy = policy();
        assert_eq!(policy.matched_signature("uses a lambda"), Some("(?i)lambda"));
        assert_eq!(policy.matched_signature("nothing here"), None);
    }

    #[test]
    fn test_empty_policy_never_retries() {
        let policy = FallbackPolicy::default();
        assert_eq!(
            policy.retry_with(BackendKind::Restricted, false, GENERIC_FAILURE),
            None
        );
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(FallbackPolicy::new(["(unclosed"]).is_err());
    }

    #[test]
    fn test_default_config_ignores_feature_words_in_identifiers() {
        let policy = FallbackPolicy::from_config(&Config::default()).unwrap();
        for diagnostics in [
            "File 'Snippet.java', Line 3, Column 9: Unknown variable or type \"lambdaCount\"",
            "File 'Snippet.java', Line 4, Column 2: Unknown variable or type \"lambda\"",
            "File 'Snippet.java', Line 7, Column 5: A method named \"notYetImplemented\" is not declared in any enclosing class",
            "File 'Snippet.java', Line 2, Column 1: \"switchExpression\" is not a type",
        ] {
            assert_eq!(
                policy.retry_with(BackendKind::Restricted, false, diagnostics),
                None,
                "{diagnostics}"
            );
        }
    }

    #[test]
    fn test_default_config_recognises_unsupported_features() {
        let policy = FallbackPolicy::from_config(&Config::default()).unwrap();
        for diagnostics in [
            "File 'Snippet.java', Line 3, Column 21: Compiler: Lambda expressions NYI",
            "File 'Snippet.java', Line 5, Column 14: Method reference NYI",
            "File 'Snippet.java', Line 8, Column 3: Switch expressions not yet implemented",
        ] {
            assert_eq!(
                policy.retry_with(BackendKind::Restricted, false, diagnostics),
                Some(BackendKind::FullSpec),
                "{diagnostics}"
            );
        }
    }

    #[test]
    fn test_from_default_config_recognises_generic_failure() {
        let policy = FallbackPolicy::from_config(&Config::default()).unwrap();
        assert_eq!(
            policy.retry_with(BackendKind::Restricted, false, GENERIC_FAILURE),
            Some(BackendKind::FullSpec)
        );
    }
}
