use std::fmt;
use std::rc::Rc;

use crate::ast::{Node, Param};

use super::env::{Binding, Env, WeakEnv};
use super::value::{Clip, Value, ValueKind};
use super::{ErrorKind, Interpreter, RuntimeError, RuntimeResult};

/// Signature shared by core functions and plugin exports.
pub type NativeFn = fn(&mut Interpreter, &ArgList) -> RuntimeResult<Value>;

#[derive(Clone)]
pub enum Function {
    Core { name: String, func: NativeFn },
    User(Rc<UserFunction>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Core { name, .. } => name,
            Function::User(user) => &user.name,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Core { name, .. } => write!(f, "<core fn {name}>"),
            Function::User(user) => write!(f, "<fn {}>", user.name),
        }
    }
}

pub struct UserFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Rc<Node>,
    env: WeakEnv,
}

impl UserFunction {
    pub fn new(name: String, params: Vec<Param>, body: Rc<Node>, env: &Env) -> Self {
        Self {
            name,
            params,
            body,
            env: env.downgrade(),
        }
    }

    pub fn defining_env(&self) -> Option<Env> {
        self.env.upgrade()
    }

    pub fn mandatory_count(&self) -> usize {
        self.params.iter().take_while(|p| !p.optional).count()
    }

    pub fn check_param_order(&self) -> RuntimeResult<()> {
        let mandatory = self.mandatory_count();
        if self.params[mandatory..].iter().any(|p| !p.optional) {
            return Err(RuntimeError::new(
                ErrorKind::ArgumentOrder,
                format!(
                    "optional parameters must follow mandatory parameters in function {}",
                    self.name
                ),
            ));
        }
        Ok(())
    }

    /// Binds every parameter in `env`, then moves the arguments into their
    /// slots after checking count, kinds and names.
    pub fn bind(&self, env: &Env, args: ArgList) -> RuntimeResult<()> {
        for param in &self.params {
            let binding = if param.optional {
                Binding::OptionalParameter
            } else {
                Binding::Parameter
            };
            env.bind(param.name.clone(), Value::Void, binding);
        }

        let expected = self.mandatory_count();
        let given = args.mandatory_count();
        if given != expected {
            return Err(RuntimeError::new(
                ErrorKind::Arity,
                format!(
                    "expected {expected} mandatory argument{}, got {given}",
                    plural(expected)
                ),
            ));
        }

        for (i, arg) in args.args.into_iter().enumerate() {
            match arg.name {
                None => {
                    let param = &self.params[i];
                    if arg.value.kind() != param.kind {
                        return Err(RuntimeError::type_error(format!(
                            "type mismatch: arg {} of {} expected {}, got {}",
                            i + 1,
                            self.name,
                            param.kind,
                            arg.value.kind_name()
                        )));
                    }
                    env.set(&param.name, arg.value);
                }
                Some(name) => {
                    let param = self
                        .params
                        .iter()
                        .find(|p| p.optional && p.name == name)
                        .ok_or_else(|| {
                            RuntimeError::new(
                                ErrorKind::UnknownParameter,
                                format!(
                                    "{name} is not an optional parameter of function {}",
                                    self.name
                                ),
                            )
                        })?;
                    if arg.value.kind() != param.kind {
                        return Err(optional_mismatch(&name, param.kind, &arg.value));
                    }
                    env.set(&param.name, arg.value);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Value,
}

/// Materialized call arguments: unnamed ones first, then named ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgList {
    args: Vec<Argument>,
}

impl ArgList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument, rejecting an unnamed one after a named one.
    pub fn push(&mut self, name: Option<String>, value: Value) -> RuntimeResult<()> {
        if name.is_none() && self.args.iter().any(|a| a.name.is_some()) {
            return Err(RuntimeError::new(
                ErrorKind::ArgumentOrder,
                "optional arguments must follow mandatory arguments",
            ));
        }
        self.args.push(Argument { name, value });
        Ok(())
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            args: values
                .into_iter()
                .map(|value| Argument { name: None, value })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    pub fn mandatory_count(&self) -> usize {
        self.args.iter().take_while(|a| a.name.is_none()).count()
    }

    /// Fails unless exactly `expected.len()` unnamed arguments were passed
    /// with the given kinds.
    pub fn check_args(&self, expected: &[ValueKind]) -> RuntimeResult<()> {
        self.check_count(expected.len())?;
        for (i, (arg, kind)) in self.args.iter().zip(expected).enumerate() {
            if arg.value.kind() != *kind {
                return Err(arg_mismatch(i, *kind, &arg.value));
            }
        }
        Ok(())
    }

    pub fn check_count(&self, expected: usize) -> RuntimeResult<()> {
        let given = self.mandatory_count();
        if given != expected {
            return Err(RuntimeError::new(
                ErrorKind::Arity,
                format!("expected {expected} argument{}, got {given}", plural(expected)),
            ));
        }
        Ok(())
    }

    /// The named argument `name`, if it was passed, checked against `kind`.
    pub fn opt_arg(&self, name: &str, kind: ValueKind) -> RuntimeResult<Option<&Value>> {
        let Some(arg) = self
            .args
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
        else {
            return Ok(None);
        };
        if arg.value.kind() != kind {
            return Err(optional_mismatch(name, kind, &arg.value));
        }
        Ok(Some(&arg.value))
    }

    /// The unnamed argument at `index`, whatever its kind.
    pub fn value(&self, index: usize) -> RuntimeResult<&Value> {
        self.args
            .get(index)
            .filter(|a| a.name.is_none())
            .map(|a| &a.value)
            .ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::Arity,
                    format!("missing argument {}", index + 1),
                )
            })
    }

    pub fn number(&self, index: usize) -> RuntimeResult<f64> {
        match self.value(index)? {
            Value::Number(n) => Ok(*n),
            other => Err(arg_mismatch(index, ValueKind::Number, other)),
        }
    }

    pub fn boolean(&self, index: usize) -> RuntimeResult<bool> {
        match self.value(index)? {
            Value::Boolean(b) => Ok(*b),
            other => Err(arg_mismatch(index, ValueKind::Boolean, other)),
        }
    }

    pub fn string(&self, index: usize) -> RuntimeResult<&str> {
        match self.value(index)? {
            Value::String(s) => Ok(s),
            other => Err(arg_mismatch(index, ValueKind::String, other)),
        }
    }

    pub fn clip(&self, index: usize) -> RuntimeResult<&Clip> {
        match self.value(index)? {
            Value::Clip(clip) => Ok(clip),
            other => Err(arg_mismatch(index, ValueKind::Clip, other)),
        }
    }

    pub fn opt_number(&self, name: &str) -> RuntimeResult<Option<f64>> {
        Ok(match self.opt_arg(name, ValueKind::Number)? {
            Some(Value::Number(n)) => Some(*n),
            _ => None,
        })
    }

    pub fn opt_boolean(&self, name: &str) -> RuntimeResult<Option<bool>> {
        Ok(match self.opt_arg(name, ValueKind::Boolean)? {
            Some(Value::Boolean(b)) => Some(*b),
            _ => None,
        })
    }

    pub fn opt_string(&self, name: &str) -> RuntimeResult<Option<&str>> {
        Ok(match self.opt_arg(name, ValueKind::String)? {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn opt_clip(&self, name: &str) -> RuntimeResult<Option<&Clip>> {
        Ok(match self.opt_arg(name, ValueKind::Clip)? {
            Some(Value::Clip(clip)) => Some(clip),
            _ => None,
        })
    }
}

fn arg_mismatch(index: usize, expected: ValueKind, got: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "arg {} expected {expected}, got {}",
        index + 1,
        got.kind_name()
    ))
}

fn optional_mismatch(name: &str, expected: ValueKind, got: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "type mismatch: optional argument \"{name}\" expected {expected}, got {}",
        got.kind_name()
    ))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn args(list: Vec<(Option<&str>, Value)>) -> ArgList {
        let mut out = ArgList::new();
        for (name, value) in list {
            out.push(name.map(str::to_string), value).unwrap();
        }
        out
    }

    fn param(name: &str, kind: ValueKind, optional: bool) -> Param {
        Param {
            name: name.into(),
            kind,
            optional,
            span: Span::default(),
        }
    }

    #[test]
    fn check_args_reports_count_then_kind() {
        let list = args(vec![(None, Value::Number(1.0))]);
        assert!(list.check_args(&[ValueKind::Number]).is_ok());
        let err = list
            .check_args(&[ValueKind::Number, ValueKind::String])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arity);
        assert_eq!(err.message(), "expected 2 arguments, got 1");
        let err = list.check_args(&[ValueKind::Boolean]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.message(), "arg 1 expected boolean, got number");
    }

    #[test]
    fn opt_arg_is_absent_or_typed() {
        let list = args(vec![
            (None, Value::Number(1.0)),
            (Some("radius"), Value::Number(3.0)),
        ]);
        assert_eq!(list.opt_number("radius").unwrap(), Some(3.0));
        assert_eq!(list.opt_number("sigma").unwrap(), None);
        let err = list.opt_string("radius").unwrap_err();
        assert_eq!(
            err.message(),
            "type mismatch: optional argument \"radius\" expected string, got number"
        );
    }

    #[test]
    fn unnamed_after_named_is_an_order_error() {
        let mut list = ArgList::new();
        list.push(Some("a".into()), Value::Number(1.0)).unwrap();
        let err = list.push(None, Value::Number(2.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentOrder);
    }

    #[test]
    fn user_binding_checks_names_and_kinds() {
        let env = Env::new().child();
        let func = UserFunction::new(
            "f".into(),
            vec![
                param("a", ValueKind::Number, false),
                param("b", ValueKind::String, true),
            ],
            Rc::new(Node::new(
                crate::ast::NodeKind::Sequence(Vec::new()),
                Span::default(),
            )),
            &env,
        );

        let call_env = env.child();
        func.bind(&call_env, args(vec![(None, Value::Number(5.0))]))
            .unwrap();
        assert_eq!(call_env.get("a"), Some(Value::Number(5.0)));
        assert_eq!(call_env.get("b"), Some(Value::Void));

        let err = func
            .bind(&env.child(), args(vec![(None, Value::from("x"))]))
            .unwrap_err();
        assert_eq!(err.message(), "type mismatch: arg 1 of f expected number, got string");

        let err = func
            .bind(
                &env.child(),
                args(vec![(None, Value::Number(1.0)), (Some("c"), Value::from("x"))]),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownParameter);
        assert_eq!(err.message(), "c is not an optional parameter of function f");

        let err = func.bind(&env.child(), ArgList::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arity);
        assert_eq!(err.message(), "expected 1 mandatory argument, got 0");
    }
}
