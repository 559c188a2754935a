//! Line-oriented scanning of Java source text
//!
//! Tracks brace depth across lines while ignoring braces inside string,
//! character and text block literals and comments. Each scanned line is
//! returned with its non-code characters masked out so callers can apply
//! token-level rules without tripping over literal contents.

/// Lexical state carried from one line to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Code,
    BlockComment,
    TextBlock,
}

/// One line after scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    /// The line with comment and literal contents replaced by spaces.
    /// Literal delimiters are kept, so `"{"` becomes `" "`.
    pub code: String,

    /// Brace depth before the first character of the line
    pub depth_before: isize,

    /// Number of `{` in code
    pub opens: usize,

    /// Number of `}` in code
    pub closes: usize,
}

impl ScannedLine {
    /// Whether the line contains nothing but whitespace, comments or the
    /// inside of a multi-line literal
    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Incremental brace-depth scanner
#[derive(Debug, Default)]
pub struct SourceScanner {
    state: State,
    depth: isize,
}

impl SourceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current brace depth (negative for unbalanced input)
    pub fn depth(&self) -> isize {
        self.depth
    }

    /// Whether the scanner is inside a block comment or text block
    pub fn in_multiline(&self) -> bool {
        self.state != State::Code
    }

    /// Scan one line (without its terminator)
    pub fn scan(&mut self, line: &str) -> ScannedLine {
        let chars: Vec<char> = line.chars().collect();
        let depth_before = self.depth;
        let mut code = String::with_capacity(line.len());
        let mut opens = 0;
        let mut closes = 0;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match self.state {
                State::BlockComment => {
                    if c == '*' && next == Some('/') {
                        self.state = State::Code;
                        code.push_str("  ");
                        i += 2;
                    } else {
                        code.push(' ');
                        i += 1;
                    }
                }
                State::TextBlock => {
                    if starts_with_at(&chars, i, "\"\"\"") {
                        self.state = State::Code;
                        code.push_str("\"\"\"");
                        i += 3;
                    } else if c == '\\' && next.is_some() {
                        code.push_str("  ");
                        i += 2;
                    } else {
                        code.push(' ');
                        i += 1;
                    }
                }
                State::Code => match c {
                    '/' if next == Some('/') => {
                        code.extend(std::iter::repeat_n(' ', chars.len() - i));
                        break;
                    }
                    '/' if next == Some('*') => {
                        self.state = State::BlockComment;
                        code.push_str("  ");
                        i += 2;
                    }
                    '"' if starts_with_at(&chars, i, "\"\"\"") => {
                        self.state = State::TextBlock;
                        code.push_str("\"\"\"");
                        i += 3;
                    }
                    '"' | '\'' => {
                        i = mask_literal(&chars, i, &mut code);
                    }
                    '{' => {
                        self.depth += 1;
                        opens += 1;
                        code.push(c);
                        i += 1;
                    }
                    '}' => {
                        self.depth -= 1;
                        closes += 1;
                        code.push(c);
                        i += 1;
                    }
                    _ => {
                        code.push(c);
                        i += 1;
                    }
                },
            }
        }

        ScannedLine {
            code,
            depth_before,
            opens,
            closes,
        }
    }
}

fn starts_with_at(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut idx = at;
    for p in pattern.chars() {
        if chars.get(idx) != Some(&p) {
            return false;
        }
        idx += 1;
    }
    true
}

/// Mask a string or character literal starting at `start`. Unterminated
/// literals end at the end of the line. Returns the index after the literal.
fn mask_literal(chars: &[char], start: usize, code: &mut String) -> usize {
    let quote = chars[start];
    code.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                code.push_str("  ");
                i += 2;
            }
            c if c == quote => {
                code.push(quote);
                return i + 1;
            }
            _ => {
                code.push(' ');
                i += 1;
            }
        }
    }
    i
}
