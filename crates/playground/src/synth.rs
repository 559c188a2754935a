//! Snippet synthesis
//!
//! Wraps a bare statement sequence into a complete compilation unit. The
//! statements become the body of a static entry method inside a generated
//! container class. Type and method declarations found at the top level of
//! the snippet are lifted to member level of the container so they stay
//! callable from the entry method.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::source::SourceScanner;

/// Name of the generated container class
pub const SNIPPET_CLASS: &str = "Snippet";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("snippet is blank")]
    Blank,
}

const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "protected",
    "static",
    "final",
    "abstract",
    "sealed",
    "non-sealed",
    "strictfp",
    "synchronized",
    "native",
    "default",
];

const TYPE_KEYWORDS: &[&str] = &["class", "interface", "enum", "record", "@interface"];

/// Words that may look like a return type or a method name in a statement
const STATEMENT_KEYWORDS: &[&str] = &[
    "if",
    "while",
    "for",
    "switch",
    "catch",
    "synchronized",
    "return",
    "new",
    "else",
    "do",
    "try",
    "throw",
    "case",
    "yield",
    "assert",
];

static METHOD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:public|private|protected|static|final|abstract|synchronized|native|strictfp)\s+)*(?:<[^>]*>\s*)?([A-Za-z_$][\w$.]*(?:\s*<.*>)?(?:\s*\[\s*\])*)\s+([A-Za-z_$][\w$]*)\s*\(",
    )
    .expect("method header pattern is valid")
});

/// Wrap `snippet` into a complete program whose entry class is
/// [`SNIPPET_CLASS`]
///
/// Members of the container are indented by `indent_level` spaces and the
/// entry method body by twice that. Trailing whitespace is trimmed from every
/// line and `import` declarations are hoisted above the container.
pub fn synthesize(snippet: &str, indent_level: usize) -> Result<String, SynthesisError> {
    let lines: Vec<&str> = snippet.lines().collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return Err(SynthesisError::Blank);
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    let lines = &lines[first..=last];

    let mut imports: Vec<&str> = Vec::new();
    let mut members: Vec<Vec<String>> = Vec::new();
    let mut body: Vec<&str> = Vec::new();
    let mut annotations: Vec<&str> = Vec::new();
    let mut scanner = SourceScanner::new();
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        let trimmed = line.trim();
        let top_level = scanner.depth() <= 0 && !scanner.in_multiline();

        if top_level && trimmed.starts_with("import ") && trimmed.ends_with(';') {
            imports.push(trimmed);
            scanner.scan(line);
            idx += 1;
            continue;
        }

        if top_level && trimmed.starts_with('@') && !trimmed.starts_with("@interface") {
            annotations.push(line);
            scanner.scan(line);
            idx += 1;
            continue;
        }

        let is_type = top_level && is_type_declaration(trimmed);
        if is_type || (top_level && is_method_header(trimmed)) {
            let start = idx;
            idx = consume_declaration(&mut scanner, lines, idx);

            let mut chunk: Vec<String> = annotations.drain(..).map(str::to_owned).collect();
            let needs_static = !is_type || declared_keyword(trimmed) == Some("class");
            chunk.push(if needs_static {
                with_static(line)
            } else {
                line.to_owned()
            });
            chunk.extend(lines[start + 1..idx].iter().map(|l| (*l).to_owned()));
            members.push(chunk);
            continue;
        }

        // Annotations on a local declaration stay with it
        body.append(&mut annotations);
        body.push(line);
        scanner.scan(line);
        idx += 1;
    }
    body.append(&mut annotations);

    let member_pad = " ".repeat(indent_level);
    let body_pad = " ".repeat(indent_level * 2);
    let mut out = String::new();

    for import in &imports {
        out.push_str(import);
        out.push('\n');
    }
    if !imports.is_empty() {
        out.push('\n');
    }

    out.push_str(&format!("public class {SNIPPET_CLASS} {{\n"));
    for chunk in &members {
        for line in chunk {
            push_indented(&mut out, &member_pad, line);
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{member_pad}public static void main(String[] args) throws Exception {{\n"
    ));
    for line in &body {
        push_indented(&mut out, &body_pad, line);
    }
    out.push_str(&format!("{member_pad}}}\n}}\n"));

    Ok(out)
}

/// Consume a declaration starting at `start`, returning the index of the
/// first line after it. A declaration ends when its braces close, or at a
/// `;` if no brace was opened.
fn consume_declaration(scanner: &mut SourceScanner, lines: &[&str], start: usize) -> usize {
    let mut idx = start;
    let mut opened = false;
    while idx < lines.len() {
        let scanned = scanner.scan(lines[idx]);
        idx += 1;
        opened |= scanned.opens > 0;
        if opened && scanner.depth() <= 0 {
            break;
        }
        if !opened && scanned.code.trim_end().ends_with(';') {
            break;
        }
    }
    idx
}

fn push_indented(out: &mut String, pad: &str, line: &str) {
    let line = line.trim_end();
    if !line.is_empty() {
        out.push_str(pad);
        out.push_str(line);
    }
    out.push('\n');
}

fn is_modifier(word: &str) -> bool {
    MODIFIERS.contains(&word)
}

/// The type keyword a declaration line introduces, if any
fn declared_keyword(trimmed: &str) -> Option<&str> {
    trimmed
        .split_whitespace()
        .find(|w| !is_modifier(w))
        .filter(|w| TYPE_KEYWORDS.contains(w))
}

fn is_type_declaration(trimmed: &str) -> bool {
    let mut words = trimmed.split_whitespace().skip_while(|w| is_modifier(w));
    match words.next() {
        Some(keyword) if TYPE_KEYWORDS.contains(&keyword) => words
            .next()
            .and_then(|name| name.chars().next())
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$'),
        _ => false,
    }
}

fn is_method_header(trimmed: &str) -> bool {
    if trimmed.ends_with(';') {
        return false;
    }
    if let (Some(eq), Some(paren)) = (trimmed.find('='), trimmed.find('('))
        && eq < paren
    {
        return false;
    }
    let Some(caps) = METHOD_HEADER.captures(trimmed) else {
        return false;
    };
    let return_type = caps.get(1).map_or("", |m| m.as_str());
    let name = caps.get(2).map_or("", |m| m.as_str());
    !STATEMENT_KEYWORDS.contains(&return_type) && !STATEMENT_KEYWORDS.contains(&name)
}

/// Add `static` to a declaration line unless its modifiers already have it
fn with_static(line: &str) -> String {
    let trimmed = line.trim_start();
    let has_static = trimmed
        .split_whitespace()
        .take_while(|w| is_modifier(w))
        .any(|w| w == "static");
    if has_static {
        return line.to_owned();
    }
    let lead = &line[..line.len() - trimmed.len()];
    format!("{lead}static {trimmed}")
}
