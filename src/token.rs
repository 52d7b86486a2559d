use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl Keyword {
    pub fn lexeme(self) -> &'static str {
        match self {
            Keyword::Function => "function",
            Keyword::Return => "return",
            Keyword::Default => "default",
            Keyword::Import => "import",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::Opt => "opt",
            Keyword::Num => "num",
            Keyword::Bool => "bool",
            Keyword::String => "string",
            Keyword::Clip => "clip",
            Keyword::True => "true",
            Keyword::False => "false",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Function,
    Return,
    Default,
    Import,
    If,
    Else,
    Opt,
    Num,
    Bool,
    String,
    Clip,
    True,
    False,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    NumberLiteral(String),
    StringLiteral(String),
    Keyword(Keyword),
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Semicolon,
    Colon,
    Equals,
    PlusEquals,
    MinusEquals,
    StarEquals,
    SlashEquals,
    CaretEquals,
    PercentEquals,
    DotEquals,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    PlusPlus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Question,
    Bang,
    Pipe,
    AmpersandAmpersand,
    PipePipe,
    Eof,
}
