//! Validated submissions

use thiserror::Error;

use crate::types::{BackendKind, Mode};

/// Largest accepted indentation level
pub const MAX_INDENT_LEVEL: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("submission has no source units")]
    NoSources,

    #[error("source unit {0} is blank")]
    Blank(usize),

    #[error("snippet mode takes exactly one source unit, got {0}")]
    SnippetUnits(usize),

    #[error("invalid entry class name '{0}'")]
    InvalidEntryClass(String),

    #[error("indentation level must be between 1 and {MAX_INDENT_LEVEL}, got {0}")]
    IndentOutOfRange(usize),

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),
}

/// One accepted submission
///
/// Constructed through [`Submission::snippet`] or [`Submission::classes`]
/// and immutable afterwards. Unset options fall back to the engine config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    units: Vec<String>,
    mode: Mode,
    backend: Option<BackendKind>,
    entry_class: Option<String>,
    timeout_ms: Option<u64>,
    indent_level: Option<usize>,
}

impl Submission {
    /// A bare statement sequence
    pub fn snippet(source: impl Into<String>) -> SubmissionBuilder {
        SubmissionBuilder::new(Mode::Snippet, vec![source.into()])
    }

    /// Complete compilation units, compiled together
    pub fn classes<I, S>(units: I) -> SubmissionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SubmissionBuilder::new(Mode::Class, units.into_iter().map(Into::into).collect())
    }

    /// Source units in submission order
    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Backend the caller pinned, disabling fallback
    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    pub fn entry_class(&self) -> Option<&str> {
        self.entry_class.as_deref()
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn indent_level(&self) -> Option<usize> {
        self.indent_level
    }
}

/// Builder for [`Submission`]
#[derive(Debug, Clone)]
pub struct SubmissionBuilder {
    inner: Submission,
}

impl SubmissionBuilder {
    fn new(mode: Mode, units: Vec<String>) -> Self {
        Self {
            inner: Submission {
                units,
                mode,
                backend: None,
                entry_class: None,
                timeout_ms: None,
                indent_level: None,
            },
        }
    }

    /// Pin a backend
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.inner.backend = Some(backend);
        self
    }

    /// Class whose `main` is invoked (class mode only)
    pub fn entry_class(mut self, name: impl Into<String>) -> Self {
        self.inner.entry_class = Some(name.into());
        self
    }

    /// Override the execution deadline
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.inner.timeout_ms = Some(ms);
        self
    }

    pub fn indent_level(mut self, level: usize) -> Self {
        self.inner.indent_level = Some(level);
        self
    }

    /// Validate and accept the submission
    pub fn build(self) -> Result<Submission, SubmissionError> {
        let submission = self.inner;

        if submission.units.is_empty() {
            return Err(SubmissionError::NoSources);
        }
        if submission.mode == Mode::Snippet && submission.units.len() != 1 {
            return Err(SubmissionError::SnippetUnits(submission.units.len()));
        }
        if let Some(idx) = submission.units.iter().position(|u| u.trim().is_empty()) {
            return Err(SubmissionError::Blank(idx));
        }
        if let Some(name) = &submission.entry_class
            && !is_class_name(name)
        {
            return Err(SubmissionError::InvalidEntryClass(name.clone()));
        }
        if let Some(level) = submission.indent_level
            && !(1..=MAX_INDENT_LEVEL).contains(&level)
        {
            return Err(SubmissionError::IndentOutOfRange(level));
        }

        Ok(submission)
    }
}

/// Whether `name` is a (possibly package-qualified) Java class name
pub fn is_class_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
}
