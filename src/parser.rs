use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::*;
use crate::diagnostics::ParseError;
use crate::lexer;
use crate::runtime::{RuntimeError, Value, ValueKind};
use crate::span::Span;
use crate::token::{Keyword, Token, TokenKind};

/// Lexes and parses a whole script.
pub fn parse(source: &str) -> Result<Program, RuntimeError> {
    let tokens = lexer::lex(source)?;
    Ok(parse_tokens(tokens)?)
}

pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    eof: Token,
    /// Names brought in by `import`, so `name.fn(...)` parses as a plugin call.
    imported: HashSet<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        let eof_span = tokens.last().map(|t| t.span).unwrap_or_default();
        Self {
            tokens,
            index: 0,
            eof: Token::new(TokenKind::Eof, eof_span),
            imported: HashSet::new(),
        }
    }

    fn parse(mut self) -> Result<Program, ParseError> {
        let start = self.peek().span;
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.parse_statement()? {
                statements.push(stmt);
            }
        }
        let span = statements
            .last()
            .map(|last| start.merge(last.span))
            .unwrap_or(start);
        Ok(Program { statements, span })
    }

    /// Returns `None` for an empty statement.
    fn parse_statement(&mut self) -> Result<Option<Node>, ParseError> {
        if self.match_with(|k| matches!(k, TokenKind::Semicolon)) {
            return Ok(None);
        }
        if self.check(|k| matches!(k, TokenKind::LeftBrace)) {
            return self.parse_block().map(Some);
        }
        if self.check_keyword(Keyword::If) {
            return self.parse_if().map(Some);
        }
        if self.check_keyword(Keyword::Function) {
            return self.parse_function().map(Some);
        }
        if self.check_keyword(Keyword::Default) {
            return self.parse_default().map(Some);
        }
        if self.check_keyword(Keyword::Return) {
            return self.parse_return().map(Some);
        }
        if self.check_keyword(Keyword::Import) {
            return self.parse_import().map(Some);
        }
        let expr = self.parse_expression()?;
        self.expect_with("';'", |k| matches!(k, TokenKind::Semicolon))?;
        Ok(Some(expr))
    }

    fn parse_block(&mut self) -> Result<Node, ParseError> {
        let start = self
            .expect_with("'{'", |k| matches!(k, TokenKind::LeftBrace))?
            .span;
        let mut statements = Vec::new();
        while !self.check(|k| matches!(k, TokenKind::RightBrace)) {
            if self.is_at_end() {
                let token = self.advance();
                return Err(ParseError::UnexpectedToken {
                    expected: "'}'",
                    found: token.kind,
                    span: token.span,
                });
            }
            if let Some(stmt) = self.parse_statement()? {
                statements.push(stmt);
            }
        }
        let end = self.advance().span;
        Ok(Node::new(NodeKind::Sequence(statements), start.merge(end)))
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_keyword(Keyword::If)?.span;
        self.expect_with("'('", |k| matches!(k, TokenKind::LeftParen))?;
        let condition = self.parse_expression()?;
        self.expect_with("')'", |k| matches!(k, TokenKind::RightParen))?;
        let then = self.parse_branch()?;
        let otherwise = if self.match_keyword(Keyword::Else) {
            Some(Box::new(self.parse_branch()?))
        } else {
            None
        };
        let end = otherwise.as_ref().map(|n| n.span).unwrap_or(then.span);
        Ok(Node::new(
            NodeKind::If {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise,
            },
            start.merge(end),
        ))
    }

    fn parse_branch(&mut self) -> Result<Node, ParseError> {
        let span = self.peek().span;
        Ok(self
            .parse_statement()?
            .unwrap_or_else(|| Node::new(NodeKind::Sequence(Vec::new()), span)))
    }

    fn parse_function(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_keyword(Keyword::Function)?.span;
        let (name, _) = self.expect_identifier("function name")?;
        self.expect_with("'('", |k| matches!(k, TokenKind::LeftParen))?;
        let mut params: Vec<Param> = Vec::new();
        if !self.check(|k| matches!(k, TokenKind::RightParen)) {
            loop {
                let param = self.parse_param()?;
                if !param.optional && params.iter().any(|p| p.optional) {
                    return Err(ParseError::ParameterOrder {
                        function: name,
                        span: param.span,
                    });
                }
                params.push(param);
                if !self.match_with(|k| matches!(k, TokenKind::Comma)) {
                    break;
                }
            }
        }
        self.expect_with("')'", |k| matches!(k, TokenKind::RightParen))?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(Node::new(
            NodeKind::FunctionDef {
                name,
                params,
                body: Rc::new(body),
            },
            span,
        ))
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let start = self.peek().span;
        let optional = self.match_keyword(Keyword::Opt);
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::Keyword(Keyword::Num) => ValueKind::Number,
            TokenKind::Keyword(Keyword::Bool) => ValueKind::Boolean,
            TokenKind::Keyword(Keyword::String) => ValueKind::String,
            TokenKind::Keyword(Keyword::Clip) => ValueKind::Clip,
            found => {
                return Err(ParseError::UnexpectedToken {
                    expected: "parameter type",
                    found,
                    span: token.span,
                })
            }
        };
        let (name, end) = self.expect_identifier("parameter name")?;
        Ok(Param {
            name,
            kind,
            optional,
            span: start.merge(end),
        })
    }

    fn parse_default(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_keyword(Keyword::Default)?.span;
        self.expect_with("'('", |k| matches!(k, TokenKind::LeftParen))?;
        let (name, _) = self.expect_identifier("parameter name")?;
        self.expect_with("','", |k| matches!(k, TokenKind::Comma))?;
        let value = self.parse_expression()?;
        self.expect_with("')'", |k| matches!(k, TokenKind::RightParen))?;
        let end = self
            .expect_with("';'", |k| matches!(k, TokenKind::Semicolon))?
            .span;
        Ok(Node::new(
            NodeKind::Default {
                name,
                value: Box::new(value),
            },
            start.merge(end),
        ))
    }

    fn parse_return(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_keyword(Keyword::Return)?.span;
        let value = if self.check(|k| matches!(k, TokenKind::Semicolon)) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let end = self
            .expect_with("';'", |k| matches!(k, TokenKind::Semicolon))?
            .span;
        Ok(Node::new(NodeKind::Return(value), start.merge(end)))
    }

    fn parse_import(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_keyword(Keyword::Import)?.span;
        let (name, _) = self.expect_identifier("plugin or script name")?;
        let end = self
            .expect_with("';'", |k| matches!(k, TokenKind::Semicolon))?
            .span;
        self.imported.insert(name.clone());
        Ok(Node::new(NodeKind::Import(name), start.merge(end)))
    }

    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Node, ParseError> {
        let target = self.parse_ternary()?;
        let op = match self.peek().kind {
            TokenKind::Equals => AssignOp::Assign,
            TokenKind::PlusEquals => AssignOp::Add,
            TokenKind::MinusEquals => AssignOp::Sub,
            TokenKind::StarEquals => AssignOp::Mul,
            TokenKind::SlashEquals => AssignOp::Div,
            TokenKind::CaretEquals => AssignOp::Pow,
            TokenKind::PercentEquals => AssignOp::Mod,
            TokenKind::DotEquals => AssignOp::Chain,
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_assignment()?;
        let span = target.span.merge(value.span);
        Ok(Node::new(
            NodeKind::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_ternary(&mut self) -> Result<Node, ParseError> {
        let condition = self.parse_logical_or()?;
        if !self.match_with(|k| matches!(k, TokenKind::Question)) {
            return Ok(condition);
        }
        let then = self.parse_logical_or()?;
        self.expect_with("'|'", |k| matches!(k, TokenKind::Pipe))?;
        let otherwise = self.parse_ternary()?;
        let span = condition.span.merge(otherwise.span);
        Ok(Node::new(
            NodeKind::Ternary {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        ))
    }

    fn parse_logical_or(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_logical_and()?;
        while self.match_with(|k| matches!(k, TokenKind::PipePipe)) {
            let rhs = self.parse_logical_and()?;
            expr = binary(BinaryOp::Or, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_equality()?;
        while self.match_with(|k| matches!(k, TokenKind::AmpersandAmpersand)) {
            let rhs = self.parse_equality()?;
            expr = binary(BinaryOp::And, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_factor()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_power()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_power()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_power(&mut self) -> Result<Node, ParseError> {
        let base = self.parse_concat()?;
        if self.match_with(|k| matches!(k, TokenKind::Caret)) {
            let exponent = self.parse_power()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_concat(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_chain()?;
        while self.match_with(|k| matches!(k, TokenKind::PlusPlus)) {
            let rhs = self.parse_chain()?;
            expr = binary(BinaryOp::Concat, expr, rhs);
        }
        Ok(expr)
    }

    /// `a.f().g()` nests to the right: `Chain(a, Chain(f(), g()))`.
    fn parse_chain(&mut self) -> Result<Node, ParseError> {
        let value = self.parse_unary()?;
        if !self.match_with(|k| matches!(k, TokenKind::Dot)) {
            return Ok(value);
        }
        let call = self.parse_chain()?;
        let span = value.span.merge(call.span);
        Ok(Node::new(
            NodeKind::Chain {
                value: Box::new(value),
                call: Box::new(call),
            },
            span,
        ))
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let op_span = self.advance().span;
        let operand = self.parse_unary()?;
        let span = op_span.merge(operand.span);
        Ok(Node::new(
            NodeKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::NumberLiteral(literal) => match literal.parse::<f64>() {
                Ok(n) => Ok(Node::leaf(Value::Number(n), token.span)),
                Err(_) => Err(ParseError::InvalidNumber {
                    literal,
                    span: token.span,
                }),
            },
            TokenKind::StringLiteral(s) => Ok(Node::leaf(Value::String(s), token.span)),
            TokenKind::Keyword(Keyword::True) => Ok(Node::leaf(Value::Boolean(true), token.span)),
            TokenKind::Keyword(Keyword::False) => {
                Ok(Node::leaf(Value::Boolean(false), token.span))
            }
            TokenKind::Identifier(name) => self.parse_name(name, token.span),
            TokenKind::LeftParen => {
                let inner = self.parse_expression()?;
                self.expect_with("')'", |k| matches!(k, TokenKind::RightParen))?;
                Ok(inner)
            }
            found => Err(ParseError::UnexpectedToken {
                expected: "expression",
                found,
                span: token.span,
            }),
        }
    }

    fn parse_name(&mut self, name: String, span: Span) -> Result<Node, ParseError> {
        if self.check(|k| matches!(k, TokenKind::LeftParen)) {
            return self.parse_call(Callee::Named(name), span);
        }
        if self.imported.contains(&name) && self.plugin_call_follows() {
            self.advance();
            let (function, _) = self.expect_identifier("plugin function name")?;
            return self.parse_call(
                Callee::Plugin {
                    plugin: name,
                    function,
                },
                span,
            );
        }
        Ok(Node::identifier(name, span))
    }

    fn plugin_call_follows(&self) -> bool {
        matches!(
            (
                self.peek_kind_at(0),
                self.peek_kind_at(1),
                self.peek_kind_at(2)
            ),
            (
                Some(TokenKind::Dot),
                Some(TokenKind::Identifier(_)),
                Some(TokenKind::LeftParen)
            )
        )
    }

    fn parse_call(&mut self, callee: Callee, start: Span) -> Result<Node, ParseError> {
        self.expect_with("'('", |k| matches!(k, TokenKind::LeftParen))?;
        let mut args: Vec<Arg> = Vec::new();
        if !self.check(|k| matches!(k, TokenKind::RightParen)) {
            loop {
                let arg = self.parse_arg()?;
                if arg.name.is_none() && args.iter().any(|a| a.name.is_some()) {
                    return Err(ParseError::ArgumentOrder {
                        span: arg.value.span,
                    });
                }
                args.push(arg);
                if !self.match_with(|k| matches!(k, TokenKind::Comma)) {
                    break;
                }
            }
        }
        let end = self
            .expect_with("')'", |k| matches!(k, TokenKind::RightParen))?
            .span;
        Ok(Node::call(callee, args, start.merge(end)))
    }

    fn parse_arg(&mut self) -> Result<Arg, ParseError> {
        let named = matches!(
            (self.peek_kind_at(0), self.peek_kind_at(1)),
            (
                Some(TokenKind::Identifier(_)),
                Some(TokenKind::Colon | TokenKind::Equals)
            )
        );
        if named {
            let (name, _) = self.expect_identifier("argument name")?;
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Arg::named(name, value));
        }
        Ok(Arg::positional(self.parse_expression()?))
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek().kind, TokenKind::Keyword(k) if k == keyword)
    }

    fn match_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check<F>(&self, predicate: F) -> bool
    where
        F: Fn(&TokenKind) -> bool,
    {
        predicate(&self.peek().kind)
    }

    fn match_with<F>(&mut self, predicate: F) -> bool
    where
        F: Fn(&TokenKind) -> bool,
    {
        if predicate(&self.peek().kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        self.expect_with(
            keyword.lexeme(),
            |k| matches!(k, TokenKind::Keyword(kw) if *kw == keyword),
        )
    }

    fn expect_with<F>(&mut self, expected: &'static str, predicate: F) -> Result<Token, ParseError>
    where
        F: Fn(&TokenKind) -> bool,
    {
        let token = self.advance();
        if predicate(&token.kind) {
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                expected,
                found: token.kind,
                span: token.span,
            })
        }
    }

    fn expect_identifier(&mut self, context: &'static str) -> Result<(String, Span), ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Identifier(name) => Ok((name, token.span)),
            found => Err(ParseError::UnexpectedToken {
                expected: context,
                found,
                span: token.span,
            }),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.index).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.index + offset).map(|t| &t.kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }
}

fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
    let span = lhs.span.merge(rhs.span);
    Node::new(
        NodeKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}
