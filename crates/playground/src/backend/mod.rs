//! Compiler backends
//!
//! A [`Backend`] turns the source files of one submission into a
//! [`CompiledArtifact`]: a directory of compiled output plus the command
//! that runs its entry point. Backends do not interpret their diagnostics;
//! deciding whether a failure warrants another backend is the job of
//! [`FallbackPolicy`].

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

pub use crate::backend::command::CommandBackend;
pub use crate::backend::launcher::{LAUNCHER_CLASS, LAUNCHER_SOURCE};
pub use crate::backend::select::FallbackPolicy;
use crate::sandbox::{SandboxError, Workspace};
use crate::source::SourceScanner;
use crate::types::BackendKind;

mod command;
mod launcher;
mod select;

/// Errors that occur during compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Failed(Diagnostics),

    #[error("compilation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

impl CompileError {
    /// Diagnostics if the compiler rejected the source
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            CompileError::Failed(diagnostics) => Some(diagnostics),
            _ => None,
        }
    }
}

/// Compiler output of a failed compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    /// Backend that produced the diagnostics
    pub backend: BackendKind,
    /// Raw compiler output (stdout and stderr)
    pub text: String,
    /// Compiler exit code (`None` if killed by a signal)
    pub exit_code: Option<i32>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.text.trim_end();
        if !text.is_empty() {
            return f.write_str(text);
        }
        match self.exit_code {
            Some(code) => write!(f, "compiler exited with status {code}"),
            None => f.write_str("compiler was killed by a signal"),
        }
    }
}

/// Compiled output of one submission, owned by the worker that runs it
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    /// Backend that produced the artifact
    pub backend: BackendKind,
    /// Display name of that backend
    pub compiler: String,
    /// Directory with the compiled output
    pub output_dir: PathBuf,
    /// Expanded worker command
    pub run_command: Vec<String>,
}

/// Source files of one submission written into its workspace
#[derive(Debug, Clone)]
pub struct SourceSet {
    /// Class whose `main` the worker invokes
    pub entry_class: String,
    /// Host paths of the source files, in submission order
    pub files: Vec<PathBuf>,
}

impl SourceSet {
    /// Write `units` into the workspace
    ///
    /// Each unit is named after its public top-level type when it declares
    /// one (as `javac` requires), otherwise after the entry class, with a
    /// `Helper<n>` suffix for every unit after the first.
    pub async fn write(
        workspace: &Workspace,
        units: &[String],
        entry_class: &str,
        extension: &str,
    ) -> Result<Self, SandboxError> {
        let names = unit_file_names(units, entry_class, extension);
        let mut files = Vec::with_capacity(units.len());
        for (name, unit) in names.iter().zip(units) {
            files.push(workspace.write_source(name, unit).await?);
        }
        Ok(Self {
            entry_class: entry_class.to_string(),
            files,
        })
    }
}

static PUBLIC_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bpublic\s+(?:(?:abstract|final|sealed|non-sealed|strictfp|static)\s+)*(?:class|interface|enum|record|@interface)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("public type pattern is valid")
});

/// Name of the first public type declared at the top level of `unit`
pub fn public_type_name(unit: &str) -> Option<String> {
    let mut scanner = SourceScanner::new();
    for line in unit.lines() {
        let scanned = scanner.scan(line);
        if scanned.depth_before != 0 {
            continue;
        }
        if let Some(caps) = PUBLIC_TYPE.captures(&scanned.code) {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
    }
    None
}

/// File names for the source units, unique within the submission
pub fn unit_file_names(units: &[String], entry_class: &str, extension: &str) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    used.insert(launcher::launcher_file(extension));

    let mut names: Vec<Option<String>> = units
        .iter()
        .map(|unit| {
            public_type_name(unit)
                .map(|name| format!("{name}.{extension}"))
                .filter(|name| used.insert(name.clone()))
        })
        .collect();

    for (idx, name) in names.iter_mut().enumerate() {
        if name.is_some() {
            continue;
        }
        let mut candidate = if idx == 0 {
            format!("{entry_class}.{extension}")
        } else {
            format!("{entry_class}Helper{idx}.{extension}")
        };
        let mut suffix = idx;
        while used.contains(&candidate) {
            suffix += 1;
            candidate = format!("{entry_class}Helper{suffix}.{extension}");
        }
        used.insert(candidate.clone());
        *name = Some(candidate);
    }

    names.into_iter().flatten().collect()
}

/// A compiler
#[async_trait]
pub trait Backend: fmt::Debug + Send + Sync {
    /// Which side of the fallback this backend is on
    fn kind(&self) -> BackendKind;

    /// Display name, reported as `compilerUsed`
    fn name(&self) -> &str;

    /// Compile the source set inside the workspace
    async fn compile(
        &self,
        workspace: &Workspace,
        sources: &SourceSet,
    ) -> Result<CompiledArtifact, CompileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(sources: &[&str]) -> Vec<String> {
        sources.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_public_type_name() {
        assert_eq!(
            public_type_name("public class Question {\n}"),
            Some("Question".to_string())
        );
        assert_eq!(
            public_type_name("import java.util.*;\n\npublic final class Box<T> {}"),
            Some("Box".to_string())
        );
        assert_eq!(
            public_type_name("public interface Shape {}"),
            Some("Shape".to_string())
        );
        assert_eq!(public_type_name("class Question {}"), None);
    }

    #[test]
    fn test_public_type_name_ignores_nested_and_comments() {
        let unit = "// public class Fake {}\nclass Outer {\n  public class Inner {}\n}\n";
        assert_eq!(public_type_name(unit), None);

        let unit = "/* public class Fake */\nString s = \"public class Nope\";\npublic class Real {}";
        assert_eq!(public_type_name(unit), Some("Real".to_string()));
    }

    #[test]
    fn test_unit_file_names_prefers_public_type() {
        let names = unit_file_names(
            &units(&["public class Question {}", "public class Helper {}"]),
            "Question",
            "java",
        );
        assert_eq!(names, vec!["Question.java", "Helper.java"]);
    }

    #[test]
    fn test_unit_file_names_fallback() {
        let names = unit_file_names(
            &units(&["class Question {}", "class A {}", "class B {}"]),
            "Question",
            "java",
        );
        assert_eq!(
            names,
            vec!["Question.java", "QuestionHelper1.java", "QuestionHelper2.java"]
        );
    }

    #[test]
    fn test_unit_file_names_never_collide() {
        let names = unit_file_names(
            &units(&[
                "class A {}",
                "public class Question {}",
                "public class Question {}",
                "public class PlaygroundLauncher {}",
            ]),
            "Question",
            "java",
        );
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(names[1], "Question.java");
        assert!(!names.contains(&"PlaygroundLauncher.java".to_string()));
    }

    #[test]
    fn test_diagnostics_display() {
        let diagnostics = Diagnostics {
            backend: BackendKind::FullSpec,
            text: "A.java:1: error: ';' expected\n".to_string(),
            exit_code: Some(1),
        };
        assert_eq!(diagnostics.to_string(), "A.java:1: error: ';' expected");

        let silent = Diagnostics {
            text: String::new(),
            ..diagnostics
        };
        assert_eq!(silent.to_string(), "compiler exited with status 1");
    }

    #[tokio::test]
    async fn test_source_set_write() {
        let workspace = Workspace::create(None).unwrap();
        let set = SourceSet::write(
            &workspace,
            &units(&["class Question {}", "public class Other {}"]),
            "Question",
            "java",
        )
        .await
        .unwrap();
        assert_eq!(set.entry_class, "Question");
        assert_eq!(set.files.len(), 2);
        assert!(set.files[0].ends_with("src/Question.java"));
        assert!(set.files[1].ends_with("src/Other.java"));
        assert_eq!(
            tokio::fs::read_to_string(&set.files[1]).await.unwrap(),
            "public class Other {}"
        );
    }
}
