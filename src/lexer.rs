use crate::diagnostics::LexError;
use crate::span::Span;
use crate::token::{Keyword, Token, TokenKind};

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).lex()
}

struct Lexer<'a> {
    source: &'a str,
    index: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        self.skip_bom();
        loop {
            self.skip_trivia()?;
            let ch = match self.peek_char() {
                Some(ch) => ch,
                None => break,
            };
            let token = if is_ident_start(ch) {
                self.lex_identifier()?
            } else if ch.is_ascii_digit() {
                self.lex_number()?
            } else {
                match ch {
                    '"' => self.lex_string()?,
                    '{' => self.simple_token(TokenKind::LeftBrace),
                    '}' => self.simple_token(TokenKind::RightBrace),
                    '(' => self.simple_token(TokenKind::LeftParen),
                    ')' => self.simple_token(TokenKind::RightParen),
                    ',' => self.simple_token(TokenKind::Comma),
                    ';' => self.simple_token(TokenKind::Semicolon),
                    ':' => self.simple_token(TokenKind::Colon),
                    '?' => self.simple_token(TokenKind::Question),
                    '.' => self.with_equals(TokenKind::Dot, TokenKind::DotEquals),
                    '-' => self.with_equals(TokenKind::Minus, TokenKind::MinusEquals),
                    '*' => self.with_equals(TokenKind::Star, TokenKind::StarEquals),
                    '/' => self.with_equals(TokenKind::Slash, TokenKind::SlashEquals),
                    '^' => self.with_equals(TokenKind::Caret, TokenKind::CaretEquals),
                    '%' => self.with_equals(TokenKind::Percent, TokenKind::PercentEquals),
                    '=' => self.with_equals(TokenKind::Equals, TokenKind::EqualEqual),
                    '!' => self.with_equals(TokenKind::Bang, TokenKind::BangEqual),
                    '<' => self.with_equals(TokenKind::Less, TokenKind::LessEqual),
                    '>' => self.with_equals(TokenKind::Greater, TokenKind::GreaterEqual),
                    '+' => match self.peek_second_char() {
                        Some('+') => self.multi_char_token(2, TokenKind::PlusPlus),
                        Some('=') => self.multi_char_token(2, TokenKind::PlusEquals),
                        _ => self.simple_token(TokenKind::Plus),
                    },
                    '|' => {
                        if self.peek_second_char() == Some('|') {
                            self.multi_char_token(2, TokenKind::PipePipe)
                        } else {
                            self.simple_token(TokenKind::Pipe)
                        }
                    }
                    '&' if self.peek_second_char() == Some('&') => {
                        self.multi_char_token(2, TokenKind::AmpersandAmpersand)
                    }
                    other => {
                        let span = Span::new(
                            self.index,
                            self.index + other.len_utf8(),
                            self.line,
                            self.column,
                        );
                        return Err(LexError::UnexpectedChar { ch: other, span });
                    }
                }
            };
            tokens.push(token);
        }
        tokens.push(Token::new(
            TokenKind::Eof,
            Span::new(self.index, self.index, self.line, self.column),
        ));
        Ok(tokens)
    }

    fn lex_identifier(&mut self) -> Result<Token, LexError> {
        let start_index = self.index;
        let start_line = self.line;
        let start_col = self.column;
        let mut ident = String::new();
        while let Some(ch) = self.peek_char() {
            if is_ident_char(ch) {
                if !ch.is_ascii() {
                    let span = Span::new(
                        self.index,
                        self.index + ch.len_utf8(),
                        self.line,
                        self.column,
                    );
                    return Err(LexError::NonAsciiIdentifierChar { ch, span });
                }
                ident.push(ch);
                self.advance_char();
            } else {
                break;
            }
        }
        let span = Span::new(start_index, self.index, start_line, start_col);
        let kind = keyword(&ident)
            .map(TokenKind::Keyword)
            .unwrap_or(TokenKind::Identifier(ident));
        Ok(Token::new(kind, span))
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let start_index = self.index;
        let start_line = self.line;
        let start_col = self.column;
        let mut literal = String::new();
        self.take_digits(&mut literal);
        // `3.f()` chains onto the integer 3; only `3.5` is a fraction.
        if self.peek_char() == Some('.')
            && matches!(self.peek_nth_char(1), Some(next) if next.is_ascii_digit())
        {
            literal.push('.');
            self.advance_char();
            self.take_digits(&mut literal);
        }
        let span = Span::new(start_index, self.index, start_line, start_col);
        if literal.is_empty() {
            return Err(LexError::InvalidNumber { span });
        }
        Ok(Token::new(TokenKind::NumberLiteral(literal), span))
    }

    fn take_digits(&mut self, literal: &mut String) {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    literal.push(ch);
                }
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let start_index = self.index;
        let start_line = self.line;
        let start_col = self.column;
        self.advance_char(); // opening "
        let mut value = String::new();
        loop {
            match self.advance_char() {
                Some((_, '"')) => {
                    let span = Span::new(start_index, self.index, start_line, start_col);
                    return Ok(Token::new(TokenKind::StringLiteral(value), span));
                }
                Some((_, '\\')) => {
                    if let Some((_, esc)) = self.advance_char() {
                        let ch = match esc {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            '\\' => '\\',
                            '"' => '"',
                            other => other,
                        };
                        value.push(ch);
                    } else {
                        let span = Span::new(start_index, self.index, start_line, start_col);
                        return Err(LexError::UnterminatedString { span });
                    }
                }
                Some((_, ch)) => value.push(ch),
                None => {
                    let span = Span::new(start_index, self.index, start_line, start_col);
                    return Err(LexError::UnterminatedString { span });
                }
            }
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            let mut ate = false;
            while matches!(self.peek_char(), Some(ch) if ch.is_whitespace()) {
                ate = true;
                self.advance_char();
            }
            let line_comment = match (self.peek_char(), self.peek_second_char()) {
                (Some('#'), _) | (Some('/'), Some('/')) => true,
                _ => false,
            };
            if line_comment {
                ate = true;
                while let Some((_, ch)) = self.advance_char() {
                    if ch == '\n' {
                        break;
                    }
                }
            } else if self.peek_char() == Some('/') && self.peek_second_char() == Some('*') {
                ate = true;
                let start_span = Span::new(self.index, self.index + 2, self.line, self.column);
                self.advance_char();
                self.advance_char();
                let mut closed = false;
                while let Some((_, ch)) = self.advance_char() {
                    if ch == '*' && self.peek_char() == Some('/') {
                        self.advance_char();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(LexError::UnterminatedBlockComment { span: start_span });
                }
            }
            if !ate {
                break;
            }
        }
        Ok(())
    }

    fn with_equals(&mut self, single: TokenKind, with_equals: TokenKind) -> Token {
        if self.peek_second_char() == Some('=') {
            self.multi_char_token(2, with_equals)
        } else {
            self.simple_token(single)
        }
    }

    fn simple_token(&mut self, kind: TokenKind) -> Token {
        self.multi_char_token(1, kind)
    }

    fn multi_char_token(&mut self, len: usize, kind: TokenKind) -> Token {
        let start_index = self.index;
        let start_line = self.line;
        let start_col = self.column;
        for _ in 0..len {
            self.advance_char();
        }
        let span = Span::new(start_index, self.index, start_line, start_col);
        Token::new(kind, span)
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.index..].chars().next()
    }

    fn peek_second_char(&self) -> Option<char> {
        self.peek_nth_char(1)
    }

    fn peek_nth_char(&self, n: usize) -> Option<char> {
        self.source[self.index..].chars().nth(n)
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let ch = self.peek_char()?;
        let idx = self.index;
        self.index += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some((idx, ch))
    }

    fn skip_bom(&mut self) {
        if self.index == 0 && self.peek_char() == Some('\u{feff}') {
            self.advance_char();
        }
    }
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphabetic()
}

fn is_ident_char(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

fn keyword(ident: &str) -> Option<Keyword> {
    match ident {
        "function" => Some(Keyword::Function),
        "return" => Some(Keyword::Return),
        "default" => Some(Keyword::Default),
        "import" => Some(Keyword::Import),
        "if" => Some(Keyword::If),
        "else" => Some(Keyword::Else),
        "opt" => Some(Keyword::Opt),
        "num" => Some(Keyword::Num),
        "bool" => Some(Keyword::Bool),
        "string" => Some(Keyword::String),
        "clip" => Some(Keyword::Clip),
        "true" => Some(Keyword::True),
        "false" => Some(Keyword::False),
        _ => None,
    }
}
