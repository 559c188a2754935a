//! Style advisory pass
//!
//! Style results never gate compilation or execution. The built-in
//! [`FormatChecker`] enforces a fixed set of layout rules on the source the
//! caller submitted.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::source::SourceScanner;

/// A style checker
pub trait StyleChecker: fmt::Debug + Send + Sync {
    /// Whether `source` passes at the given indentation level
    fn check(&self, source: &str, indent_level: usize) -> bool;
}

/// Rule a line broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleRule {
    Tab,
    TrailingWhitespace,
    Indentation { expected: usize, found: usize },
    BraceOnOwnLine,
    ClosingBraceAlone,
    OperatorSpacing,
    CommaSpacing,
    KeywordSpacing,
    BraceSpacing,
}

impl fmt::Display for StyleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleRule::Tab => f.write_str("tab character"),
            StyleRule::TrailingWhitespace => f.write_str("trailing whitespace"),
            StyleRule::Indentation { expected, found } => {
                write!(f, "indented by {found}, expected {expected}")
            }
            StyleRule::BraceOnOwnLine => f.write_str("'{' should end the previous line"),
            StyleRule::ClosingBraceAlone => {
                f.write_str("'}' should share the line with else, catch or finally")
            }
            StyleRule::OperatorSpacing => f.write_str("operator not surrounded by whitespace"),
            StyleRule::CommaSpacing => f.write_str("',' not followed by whitespace"),
            StyleRule::KeywordSpacing => f.write_str("keyword not followed by whitespace"),
            StyleRule::BraceSpacing => f.write_str("'{' or '}' not separated by whitespace"),
        }
    }
}

/// A rule violation on one line (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleViolation {
    pub line: usize,
    pub rule: StyleRule,
}

impl fmt::Display for StyleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.rule)
    }
}

/// Built-in layout checker
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatChecker;

impl FormatChecker {
    pub fn new() -> Self {
        Self
    }

    /// Every violation in `source`, in line order
    pub fn violations(&self, source: &str, indent_level: usize) -> Vec<StyleViolation> {
        let indent_level = indent_level.max(1);
        let mut violations = Vec::new();
        let mut scanner = SourceScanner::new();
        let mut switches: Vec<isize> = Vec::new();
        let mut previous: Option<String> = None;

        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let mut report = |rule| violations.push(StyleViolation { line, rule });

            let continues_comment = scanner.in_multiline();
            let scanned = scanner.scan(raw);

            if raw.contains('\t') {
                report(StyleRule::Tab);
            }
            if raw.ends_with([' ', '\t']) {
                report(StyleRule::TrailingWhitespace);
            }
            if scanned.is_blank() {
                continue;
            }

            let code = scanned.code.trim();
            let closes_first = code.starts_with('}');
            let depth = scanned.depth_before - isize::from(closes_first);

            while switches.last().is_some_and(|&body| depth < body) {
                switches.pop();
            }

            if !continues_comment {
                let found = raw.len() - raw.trim_start_matches([' ', '\t']).len();
                let nested_in_case = switches
                    .iter()
                    .filter(|&&body| depth > body || (depth == body && !is_case_label(code)))
                    .count();
                let levels = usize::try_from(depth).unwrap_or(0) + nested_in_case;
                let expected = levels * indent_level;
                let wrapped = previous.as_deref().is_some_and(is_unfinished);
                let misplaced = if wrapped {
                    found < expected
                } else {
                    found != expected
                };
                if misplaced {
                    report(StyleRule::Indentation { expected, found });
                }
            }

            if code.starts_with('{') && previous.as_deref().is_some_and(opens_block) {
                report(StyleRule::BraceOnOwnLine);
            }
            if ["else", "catch", "finally"]
                .iter()
                .any(|kw| starts_with_word(code, kw))
            {
                report(StyleRule::ClosingBraceAlone);
            }
            if has_operator_without_spacing(code) {
                report(StyleRule::OperatorSpacing);
            }
            if has_comma_without_spacing(code) {
                report(StyleRule::CommaSpacing);
            }
            if KEYWORD_PAREN.is_match(code) {
                report(StyleRule::KeywordSpacing);
            }
            if has_brace_without_spacing(code) {
                report(StyleRule::BraceSpacing);
            }

            if SWITCH.is_match(code) && code.ends_with('{') {
                switches.push(scanner.depth());
            }
            previous = Some(code.to_string());
        }

        violations
    }
}

impl StyleChecker for FormatChecker {
    fn check(&self, source: &str, indent_level: usize) -> bool {
        self.violations(source, indent_level).is_empty()
    }
}

static KEYWORD_PAREN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:if|for|while|switch|catch|synchronized|try)\(")
        .expect("keyword pattern is valid")
});

static SWITCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bswitch\b").expect("switch pattern is valid"));

/// Operators that need whitespace on both sides, longest first. Bare `<` and
/// `>` are left out since they also delimit type arguments.
const OPERATORS: &[&str] = &[
    ">>>=", "<<=", ">>=", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "=",
];

fn starts_with_word(code: &str, word: &str) -> bool {
    code.strip_prefix(word)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
}

fn is_case_label(code: &str) -> bool {
    starts_with_word(code, "case") || starts_with_word(code, "default")
}

/// Whether a line leaves its statement open, making the next line a
/// continuation
fn is_unfinished(code: &str) -> bool {
    !(code.ends_with(';')
        || code.ends_with('{')
        || code.ends_with('}')
        || code.ends_with(':')
        || code.starts_with('@'))
}

/// Whether a line ends like a header whose body should open on it
fn opens_block(code: &str) -> bool {
    code.ends_with(')') || code.ends_with(|c: char| c.is_alphanumeric() || c == '_' || c == '>')
}

fn has_operator_without_spacing(code: &str) -> bool {
    let bytes = code.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let Some(op) = OPERATORS
            .iter()
            .find(|op| bytes[i..].starts_with(op.as_bytes()))
        else {
            i += 1;
            continue;
        };
        let end = i + op.len();
        let spaced_before = i == 0 || bytes[i - 1] == b' ';
        let spaced_after = end == bytes.len() || bytes[end] == b' ';
        if !spaced_before || !spaced_after {
            return true;
        }
        i = end;
    }
    false
}

fn has_comma_without_spacing(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b',' && bytes.get(i + 1).is_some_and(|&next| next != b' '))
}

fn has_brace_without_spacing(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| match b {
        b'{' => i > 0 && !matches!(bytes[i - 1], b' ' | b'(' | b'{'),
        b'}' => bytes
            .get(i + 1)
            .is_some_and(|next| next.is_ascii_alphanumeric() || *next == b'_'),
        _ => false,
    })
}
