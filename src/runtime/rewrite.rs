use std::rc::Rc;

use crate::ast::{Arg, AssignOp, Callee, Node, NodeKind};
use crate::span::Span;

use super::value::Value;
use super::{RuntimeError, RuntimeResult};

/// Replaces every chain in `node` with the call it stands for, and turns
/// `x .= call` into `x = call(x)`. Function bodies are rewritten too.
///
/// A chain headed by a bare name is kept: `fx.blur()` is a plugin call if
/// `fx` names a loaded plugin when it runs, so the evaluator decides.
pub fn rewrite(node: Node) -> RuntimeResult<Node> {
    let Node { kind, span } = node;
    let kind = match kind {
        NodeKind::Chain { value, call } if value.as_identifier().is_some() => {
            NodeKind::Chain { value, call }
        }
        NodeKind::Chain { value, call } => return rewrite_chain(*value, *call, span),
        NodeKind::Assign {
            target,
            op: AssignOp::Chain,
            value,
        } => {
            let piped = rewrite_chain((*target).clone(), *value, span)?;
            NodeKind::Assign {
                target,
                op: AssignOp::Assign,
                value: Box::new(piped),
            }
        }
        NodeKind::Assign { target, op, value } => NodeKind::Assign {
            target,
            op,
            value: boxed(*value)?,
        },
        NodeKind::Sequence(nodes) => NodeKind::Sequence(
            nodes
                .into_iter()
                .map(rewrite)
                .collect::<RuntimeResult<Vec<_>>>()?,
        ),
        NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
            op,
            lhs: boxed(*lhs)?,
            rhs: boxed(*rhs)?,
        },
        NodeKind::Unary { op, operand } => NodeKind::Unary {
            op,
            operand: boxed(*operand)?,
        },
        NodeKind::Ternary {
            condition,
            then,
            otherwise,
        } => NodeKind::Ternary {
            condition: boxed(*condition)?,
            then: boxed(*then)?,
            otherwise: boxed(*otherwise)?,
        },
        NodeKind::Call { callee, args } => NodeKind::Call {
            callee,
            args: rewrite_args(args)?,
        },
        NodeKind::FunctionDef { name, params, body } => {
            let body = Rc::try_unwrap(body).unwrap_or_else(|shared| (*shared).clone());
            NodeKind::FunctionDef {
                name,
                params,
                body: Rc::new(rewrite(body)?),
            }
        }
        NodeKind::Default { name, value } => NodeKind::Default {
            name,
            value: boxed(*value)?,
        },
        NodeKind::Return(value) => NodeKind::Return(value.map(|v| boxed(*v)).transpose()?),
        NodeKind::If {
            condition,
            then,
            otherwise,
        } => NodeKind::If {
            condition: boxed(*condition)?,
            then: boxed(*then)?,
            otherwise: otherwise.map(|o| boxed(*o)).transpose()?,
        },
        leaf @ (NodeKind::Leaf(_) | NodeKind::Import(_)) => leaf,
    };
    Ok(Node::new(kind, span))
}

/// Rewrites `value.call` into a plain call with `value` as its first
/// unnamed argument.
pub fn rewrite_chain(value: Node, call: Node, span: Span) -> RuntimeResult<Node> {
    let value = rewrite(value)?;
    pipe(value, call, span)
}

/// Rewrites `plugin.call` into a call of a function exported by `plugin`.
/// Anything after the first call is piped as in an ordinary chain.
pub fn plugin_call(plugin: &str, call: Node, span: Span) -> RuntimeResult<Node> {
    let callee = |function| Callee::Plugin {
        plugin: plugin.to_string(),
        function,
    };
    match call.kind {
        NodeKind::Call {
            callee: Callee::Named(function),
            args,
        } => Ok(Node::call(callee(function), rewrite_args(args)?, span)),
        NodeKind::Leaf(Value::Identifier(function)) => {
            Ok(Node::call(callee(function), Vec::new(), span))
        }
        NodeKind::Chain { value: head, call: tail } => {
            let head = plugin_call(plugin, *head, span)?;
            pipe(head, *tail, span)
        }
        other => rewrite_chain(
            Node::identifier(plugin, span),
            Node::new(other, call.span),
            span,
        ),
    }
}

fn pipe(value: Node, call: Node, span: Span) -> RuntimeResult<Node> {
    match call.kind {
        NodeKind::Call { callee, args } => {
            let mut args = rewrite_args(args)?;
            args.insert(0, Arg::positional(value));
            Ok(Node::call(callee, args, span))
        }
        NodeKind::Leaf(Value::Identifier(name)) => Ok(Node::call(
            Callee::Named(name),
            vec![Arg::positional(value)],
            span,
        )),
        // `a.f().g()`: `a` flows into `f()`, whose result flows into `g()`.
        NodeKind::Chain { value: head, call: tail } => {
            let piped = pipe(value, *head, span)?;
            pipe(piped, *tail, span)
        }
        other => Err(RuntimeError::syntax(format!(
            "expected function name, got {}",
            Node::new(other, call.span).kind_name()
        ))),
    }
}

fn rewrite_args(args: Vec<Arg>) -> RuntimeResult<Vec<Arg>> {
    args.into_iter()
        .map(|arg| {
            Ok(Arg {
                name: arg.name,
                value: rewrite(arg.value)?,
            })
        })
        .collect()
}

fn boxed(node: Node) -> RuntimeResult<Box<Node>> {
    rewrite(node).map(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::runtime::ErrorKind;

    fn rewritten(source: &str) -> Node {
        let mut program = parser::parse(source).expect("parse should succeed");
        rewrite(program.statements.remove(0)).expect("rewrite should succeed")
    }

    fn callee_and_args(node: &Node) -> (&Callee, &[Arg]) {
        match &node.kind {
            NodeKind::Call { callee, args } => (callee, args),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn chain_becomes_nested_calls() {
        let node = rewritten("(a + 1).f(1).g();");
        let (callee, args) = callee_and_args(&node);
        assert_eq!(*callee, Callee::Named("g".into()));
        assert_eq!(args.len(), 1);
        let (inner, inner_args) = callee_and_args(&args[0].value);
        assert_eq!(*inner, Callee::Named("f".into()));
        assert_eq!(inner_args.len(), 2);
        assert!(matches!(inner_args[0].value.kind, NodeKind::Binary { .. }));
    }

    #[test]
    fn chain_on_a_bare_name_is_left_for_evaluation() {
        let node = rewritten("y = a.f(1);");
        let NodeKind::Assign { value, .. } = node.kind else {
            panic!("expected assignment");
        };
        let NodeKind::Chain { value: head, call } = value.kind else {
            panic!("expected chain");
        };
        assert_eq!(head.as_identifier(), Some("a"));

        let piped = rewrite_chain(*head, *call, Span::default()).unwrap();
        let (callee, args) = callee_and_args(&piped);
        assert_eq!(*callee, Callee::Named("f".into()));
        assert_eq!(args[0].value.as_identifier(), Some("a"));
    }

    #[test]
    fn bare_name_on_the_right_is_called() {
        let node = rewritten("1.f;");
        let (callee, args) = callee_and_args(&node);
        assert_eq!(*callee, Callee::Named("f".into()));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn plugin_head_calls_into_the_plugin() {
        let span = Span::default();
        let mut program = parser::parse("fx.blur(2).g();").unwrap();
        let NodeKind::Chain { call, .. } = program.statements.remove(0).kind else {
            panic!("expected chain");
        };
        let node = plugin_call("fx", *call, span).unwrap();
        let (callee, args) = callee_and_args(&node);
        assert_eq!(*callee, Callee::Named("g".into()));
        let (inner, inner_args) = callee_and_args(&args[0].value);
        assert_eq!(
            *inner,
            Callee::Plugin {
                plugin: "fx".into(),
                function: "blur".into()
            }
        );
        assert_eq!(inner_args.len(), 1);

        let node = plugin_call("fx", Node::identifier("blur", span), span).unwrap();
        let (_, args) = callee_and_args(&node);
        assert!(args.is_empty());
    }

    #[test]
    fn chain_assign_pipes_the_variable() {
        let node = rewritten("x .= f(2);");
        let NodeKind::Assign { target, op, value } = node.kind else {
            panic!("expected assignment");
        };
        assert_eq!(op, AssignOp::Assign);
        assert_eq!(target.as_identifier(), Some("x"));
        let (_, args) = callee_and_args(&value);
        assert_eq!(args[0].value.as_identifier(), Some("x"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn non_callable_right_side_is_a_syntax_error() {
        let mut program = parser::parse("\"a\".3;").unwrap();
        let err = rewrite(program.statements.remove(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.message(), "expected function name, got number");

        let mut program = parser::parse("a.(1 + 2);").unwrap();
        let NodeKind::Chain { value, call } = program.statements.remove(0).kind else {
            panic!("expected chain");
        };
        let err = rewrite_chain(*value, *call, Span::default()).unwrap_err();
        assert_eq!(err.message(), "expected function name, got operation");
    }

    #[test]
    fn chains_inside_function_bodies_are_rewritten() {
        let node = rewritten("function f(num a) { return (a).g().h(); }");
        let NodeKind::FunctionDef { body, .. } = node.kind else {
            panic!("expected function definition");
        };
        let NodeKind::Sequence(stmts) = &body.kind else {
            panic!("expected body sequence");
        };
        let NodeKind::Return(Some(value)) = &stmts[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(value.kind, NodeKind::Chain { .. }));

        let node = rewritten("function f(num a) { return (a + 1).g(); }");
        let NodeKind::FunctionDef { body, .. } = node.kind else {
            panic!("expected function definition");
        };
        let NodeKind::Sequence(stmts) = &body.kind else {
            panic!("expected body sequence");
        };
        let NodeKind::Return(Some(value)) = &stmts[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(value.kind, NodeKind::Call { .. }));
    }
}
