use std::rc::Rc;

use crate::runtime::{Value, ValueKind};
use crate::span::Span;

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A literal, or an `Identifier` resolved at evaluation time.
    Leaf(Value),
    Sequence(Vec<Node>),
    Assign {
        target: Box<Node>,
        op: AssignOp,
        value: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Ternary {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    Call {
        callee: Callee,
        args: Vec<Arg>,
    },
    /// `value.call`, where `call` is a call, a bare name or another chain.
    Chain {
        value: Box<Node>,
        call: Box<Node>,
    },
    FunctionDef {
        name: String,
        params: Vec<Param>,
        body: Rc<Node>,
    },
    Default {
        name: String,
        value: Box<Node>,
    },
    Return(Option<Box<Node>>),
    If {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Option<Box<Node>>,
    },
    Import(String),
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn leaf(value: Value, span: Span) -> Self {
        Self::new(NodeKind::Leaf(value), span)
    }

    pub fn identifier(name: impl Into<String>, span: Span) -> Self {
        Self::leaf(Value::Identifier(name.into()), span)
    }

    pub fn call(callee: Callee, args: Vec<Arg>, span: Span) -> Self {
        Self::new(NodeKind::Call { callee, args }, span)
    }

    /// Kind name used when a node shows up where a name was expected.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Leaf(value) => value.kind_name(),
            _ => "operation",
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Leaf(Value::Identifier(name)) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    Chain,
}

impl AssignOp {
    /// The binary operator a compound assignment applies.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Pow => Some(BinaryOp::Pow),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::Assign | AssignOp::Chain => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    Concat,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "++",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Named(String),
    Plugin { plugin: String, function: String },
}

impl Callee {
    /// Name recorded as the current function while the callee runs.
    pub fn display_name(&self) -> String {
        match self {
            Callee::Named(name) => name.clone(),
            Callee::Plugin { plugin, function } => format!("{plugin}.{function}"),
        }
    }
}

/// A call argument. Named arguments are optional ones.
#[derive(Debug, Clone)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Node,
}

impl Arg {
    pub fn positional(value: Node) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Node) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ValueKind,
    pub optional: bool,
    pub span: Span,
}
