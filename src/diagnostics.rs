use std::cell::RefCell;
use std::cmp;
use std::rc::Rc;

use thiserror::Error;

use crate::runtime::RuntimeError;
use crate::span::Span;
use crate::token::TokenKind;

const RED: &str = "\x1B[31m";
const YELLOW: &str = "\x1B[33m";
const CYAN: &str = "\x1B[36m";
const RESET: &str = "\x1B[0m";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character `{ch}`")]
    UnexpectedChar { ch: char, span: Span },
    #[error("unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("unterminated block comment")]
    UnterminatedBlockComment { span: Span },
    #[error("invalid numeric literal")]
    InvalidNumber { span: Span },
    #[error("non-ASCII identifier character `{ch}`")]
    NonAsciiIdentifierChar { ch: char, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::UnterminatedBlockComment { span }
            | LexError::InvalidNumber { span }
            | LexError::NonAsciiIdentifierChar { span, .. } => *span,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        expected: &'static str,
        found: TokenKind,
        span: Span,
    },
    #[error("invalid number literal `{literal}`")]
    InvalidNumber { literal: String, span: Span },
    #[error("optional arguments must follow mandatory arguments")]
    ArgumentOrder { span: Span },
    #[error("optional parameters must follow mandatory parameters in function {function}")]
    ParameterOrder { function: String, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::InvalidNumber { span, .. }
            | ParseError::ArgumentOrder { span }
            | ParseError::ParameterOrder { span, .. } => *span,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Identifier(name) => write!(f, "identifier `{name}`"),
            TokenKind::NumberLiteral(lit) => write!(f, "number `{lit}`"),
            TokenKind::StringLiteral(lit) => write!(f, "string {lit:?}"),
            TokenKind::Keyword(kw) => write!(f, "keyword `{}`", kw.lexeme()),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "`{}`", punctuation(other)),
        }
    }
}

fn punctuation(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::LeftBrace => "{",
        TokenKind::RightBrace => "}",
        TokenKind::LeftParen => "(",
        TokenKind::RightParen => ")",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Semicolon => ";",
        TokenKind::Colon => ":",
        TokenKind::Equals => "=",
        TokenKind::PlusEquals => "+=",
        TokenKind::MinusEquals => "-=",
        TokenKind::StarEquals => "*=",
        TokenKind::SlashEquals => "/=",
        TokenKind::CaretEquals => "^=",
        TokenKind::PercentEquals => "%=",
        TokenKind::DotEquals => ".=",
        TokenKind::EqualEqual => "==",
        TokenKind::BangEqual => "!=",
        TokenKind::Less => "<",
        TokenKind::LessEqual => "<=",
        TokenKind::Greater => ">",
        TokenKind::GreaterEqual => ">=",
        TokenKind::Plus => "+",
        TokenKind::PlusPlus => "++",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Caret => "^",
        TokenKind::Question => "?",
        TokenKind::Bang => "!",
        TokenKind::Pipe => "|",
        TokenKind::AmpersandAmpersand => "&&",
        TokenKind::PipePipe => "||",
        TokenKind::Identifier(_)
        | TokenKind::NumberLiteral(_)
        | TokenKind::StringLiteral(_)
        | TokenKind::Keyword(_)
        | TokenKind::Eof => "",
    }
}

/// Sink for the non-fatal diagnostics produced while a script runs.
pub trait Reporter {
    fn warning(&mut self, line: usize, function: Option<&str>, message: &str);
    fn message(&mut self, message: &str);
}

/// Writes warnings to stderr and messages to stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    color: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl Reporter for ConsoleReporter {
    fn warning(&mut self, line: usize, function: Option<&str>, message: &str) {
        eprintln!("{}", format_warning(line, function, message, self.color));
    }

    fn message(&mut self, message: &str) {
        if self.color {
            println!("{CYAN}{message}{RESET}");
        } else {
            println!("{message}");
        }
    }
}

#[derive(Debug, Default)]
struct Captured {
    warnings: Vec<String>,
    messages: Vec<String>,
}

/// Captures diagnostics in memory. Clones share the same buffer, so a
/// handle kept by the caller sees everything the interpreter reported.
#[derive(Debug, Clone, Default)]
pub struct BufferReporter {
    captured: Rc<RefCell<Captured>>,
}

impl BufferReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.captured.borrow().warnings.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.captured.borrow().messages.clone()
    }
}

impl Reporter for BufferReporter {
    fn warning(&mut self, line: usize, function: Option<&str>, message: &str) {
        self.captured
            .borrow_mut()
            .warnings
            .push(format_warning(line, function, message, false));
    }

    fn message(&mut self, message: &str) {
        self.captured.borrow_mut().messages.push(message.to_string());
    }
}

pub fn format_fatal(error: &RuntimeError, color: bool) -> String {
    let prefix = match error.span() {
        Some(span) => format!("delbrot:{} error: ", span.line),
        None => "delbrot: error: ".to_string(),
    };
    let body = format!("{prefix}{}{}", function_prefix(error.function()), error.message());
    paint(body, RED, color)
}

pub fn format_warning(line: usize, function: Option<&str>, message: &str, color: bool) -> String {
    let body = format!("delbrot:{line} warning: {}{message}", function_prefix(function));
    paint(body, YELLOW, color)
}

/// Renders the offending source line with a caret under the span.
pub fn format_snippet(source: &str, span: Span) -> String {
    let line_str = line_at(source, span.line);
    let pointer_len = cmp::max(1, span.end.saturating_sub(span.start));
    let caret_offset = span.column.saturating_sub(1);
    let caret = format!(
        "{}{}",
        " ".repeat(caret_offset),
        "^".repeat(cmp::min(
            pointer_len,
            line_str.len().saturating_sub(caret_offset).max(1)
        ))
    );
    format!(
        " --> line {}, column {}\n{:>4} | {}\n     | {}",
        span.line, span.column, span.line, line_str, caret
    )
}

fn function_prefix(function: Option<&str>) -> String {
    match function {
        Some(name) if !name.is_empty() => format!("{name}: "),
        _ => String::new(),
    }
}

fn paint(body: String, color_code: &str, color: bool) -> String {
    if color {
        format!("{color_code}{body}{RESET}")
    } else {
        body
    }
}

fn line_at(source: &str, line: usize) -> String {
    source
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ErrorKind;

    #[test]
    fn fatal_includes_line_and_function() {
        let err = RuntimeError::new(ErrorKind::Arity, "expected 1 mandatory argument, got 0")
            .located(Span::new(0, 1, 7, 1), Some("blur"));
        assert_eq!(
            format_fatal(&err, false),
            "delbrot:7 error: blur: expected 1 mandatory argument, got 0"
        );
    }

    #[test]
    fn fatal_is_painted_red_when_colored() {
        let err = RuntimeError::new(ErrorKind::Name, "boom").located(Span::new(0, 1, 1, 1), None);
        let text = format_fatal(&err, true);
        assert!(text.starts_with(RED));
        assert!(text.ends_with(RESET));
    }

    #[test]
    fn buffer_reporter_shares_captures_between_clones() {
        let handle = BufferReporter::new();
        let mut sink = handle.clone();
        sink.warning(3, None, "overwrote previous definition of f");
        sink.message("hello");
        assert_eq!(
            handle.warnings(),
            vec!["delbrot:3 warning: overwrote previous definition of f".to_string()]
        );
        assert_eq!(handle.messages(), vec!["hello".to_string()]);
    }

    #[test]
    fn snippet_points_at_column() {
        let snippet = format_snippet("x = 1;\ny = ;\n", Span::new(11, 12, 2, 5));
        assert!(snippet.contains("   2 | y = ;"));
        assert!(snippet.ends_with("    ^"));
    }
}
