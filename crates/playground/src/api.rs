//! Request surface
//!
//! [`Request`] is the wire form of a submission. Turning it into a
//! [`Submission`] never panics; anything invalid comes back as a
//! [`SubmissionError`] that the engine reports as a `compiled=false` result.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::submission::{Submission, SubmissionError};
use crate::types::{BackendKind, Mode};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub source_units: Vec<String>,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_class_name: Option<String>,

    /// `restricted`, `full` or a backend's display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_level: Option<usize>,
}

impl Request {
    /// Validate the request against the engine config
    pub fn into_submission(self, config: &Config) -> Result<Submission, SubmissionError> {
        let backend = self
            .backend
            .as_deref()
            .map(|name| resolve_backend(name, config))
            .transpose()?;

        let mut builder = match self.mode {
            Mode::Snippet => {
                if self.source_units.len() > 1 {
                    return Err(SubmissionError::SnippetUnits(self.source_units.len()));
                }
                Submission::snippet(self.source_units.into_iter().next().unwrap_or_default())
            }
            Mode::Class => Submission::classes(self.source_units),
        };

        if let Some(backend) = backend {
            builder = builder.backend(backend);
        }
        if let Some(name) = self.entry_class_name {
            builder = builder.entry_class(name);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout_ms(ms);
        }
        if let Some(level) = self.indent_level {
            builder = builder.indent_level(level);
        }
        builder.build()
    }
}

/// Resolve a backend by config key or display name, ignoring case
pub fn resolve_backend(name: &str, config: &Config) -> Result<BackendKind, SubmissionError> {
    let wanted = name.trim();
    BackendKind::ALL
        .into_iter()
        .find(|kind| {
            wanted.eq_ignore_ascii_case(kind.key())
                || wanted.eq_ignore_ascii_case(&config.backend(*kind).name)
        })
        .ok_or_else(|| SubmissionError::UnknownBackend(name.to_string()))
}
