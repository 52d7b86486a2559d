use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::ast::{BinaryOp, UnaryOp};

use super::{ErrorKind, RuntimeError, RuntimeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Void,
    Number,
    Boolean,
    String,
    Clip,
    Identifier,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Void => "void",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::String => "string",
            ValueKind::Clip => "clip",
            ValueKind::Identifier => "identifier",
        }
    }

    /// Only these kinds may live in a variable slot.
    pub fn is_storable(self) -> bool {
        matches!(
            self,
            ValueKind::Number | ValueKind::Boolean | ValueKind::String | ValueKind::Clip
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque handle to a media object owned by filters and plugins. Clones
/// share the same underlying object.
#[derive(Clone)]
pub struct Clip(Rc<dyn Any>);

impl Clip {
    pub fn new<T: Any>(inner: T) -> Self {
        Clip(Rc::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Clip) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Clip({:p})", Rc::as_ptr(&self.0))
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Void,
    Number(f64),
    Boolean(bool),
    String(String),
    Clip(Clip),
    Identifier(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::String(_) => ValueKind::String,
            Value::Clip(_) => ValueKind::Clip,
            Value::Identifier(_) => ValueKind::Identifier,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_storable(&self) -> bool {
        self.kind().is_storable()
    }

    pub fn to_string_value(&self) -> String {
        match self {
            Value::Void => "void".to_string(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::String(s) => s.clone(),
            Value::Clip(_) => "<clip>".to_string(),
            Value::Identifier(name) => name.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Clip(a), Value::Clip(b)) => a.ptr_eq(b),
            (Value::Identifier(a), Value::Identifier(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Clip> for Value {
    fn from(clip: Clip) -> Self {
        Value::Clip(clip)
    }
}

pub fn apply_unary(op: UnaryOp, operand: Value) -> RuntimeResult<Value> {
    match (op, operand) {
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOp::Negate, other) => Err(RuntimeError::type_error(format!(
            "- expected number, got {}",
            other.kind_name()
        ))),
        (UnaryOp::Not, other) => Err(RuntimeError::type_error(format!(
            "! expected boolean, got {}",
            other.kind_name()
        ))),
    }
}

pub fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> RuntimeResult<Value> {
    match op {
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::Pow
        | BinaryOp::Mod => arithmetic(op, lhs, rhs),
        BinaryOp::Concat => concatenate(lhs, rhs),
        _ => compare(op, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> RuntimeResult<Value> {
    let a = match lhs {
        Value::Number(n) => n,
        other => {
            return Err(RuntimeError::type_error(format!(
                "type mismatch: LHS of {} expected number, got {}",
                op.symbol(),
                other.kind_name()
            )))
        }
    };
    let b = match rhs {
        Value::Number(n) => n,
        other => {
            return Err(RuntimeError::type_error(format!(
                "type mismatch: RHS of {} expected number, got {}",
                op.symbol(),
                other.kind_name()
            )))
        }
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.powf(b),
        _ => truncating_rem(a, b),
    };
    Ok(Value::Number(result))
}

fn truncating_rem(a: f64, b: f64) -> f64 {
    (a as i64)
        .checked_rem(b as i64)
        .map(|r| r as f64)
        .unwrap_or(f64::NAN)
}

fn concatenate(lhs: Value, rhs: Value) -> RuntimeResult<Value> {
    if lhs.kind() != rhs.kind() {
        return Err(RuntimeError::type_error(format!(
            "type mismatch: cannot concatenate {} with {}",
            lhs.kind_name(),
            rhs.kind_name()
        )));
    }
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => {
            let mut joined = String::new();
            let needed = a
                .len()
                .checked_add(b.len())
                .ok_or_else(out_of_memory)?;
            joined.try_reserve(needed).map_err(|_| out_of_memory())?;
            joined.push_str(&a);
            joined.push_str(&b);
            Ok(Value::String(joined))
        }
        (Value::Clip(_), _) => Err(RuntimeError::type_error(
            "clip concatenation is not supported (yet)",
        )),
        (other, _) => Err(RuntimeError::type_error(format!(
            "the concatenation operator is not defined on {}s",
            other.kind_name()
        ))),
    }
}

fn out_of_memory() -> RuntimeError {
    RuntimeError::new(ErrorKind::OutOfMemory, "out of memory")
}

fn compare(op: BinaryOp, lhs: Value, rhs: Value) -> RuntimeResult<Value> {
    if lhs.kind() != rhs.kind() {
        return Err(RuntimeError::type_error(format!(
            "type mismatch: cannot compare {} to {}",
            lhs.kind_name(),
            rhs.kind_name()
        )));
    }
    let result = match (op, &lhs, &rhs) {
        (BinaryOp::Equal, Value::Number(a), Value::Number(b)) => a == b,
        (BinaryOp::NotEqual, Value::Number(a), Value::Number(b)) => a != b,
        (BinaryOp::Less, Value::Number(a), Value::Number(b)) => a < b,
        (BinaryOp::LessEqual, Value::Number(a), Value::Number(b)) => a <= b,
        (BinaryOp::Greater, Value::Number(a), Value::Number(b)) => a > b,
        (BinaryOp::GreaterEqual, Value::Number(a), Value::Number(b)) => a >= b,
        (BinaryOp::Equal, Value::Boolean(a), Value::Boolean(b)) => a == b,
        (BinaryOp::NotEqual, Value::Boolean(a), Value::Boolean(b)) => a != b,
        (BinaryOp::And, Value::Boolean(a), Value::Boolean(b)) => *a && *b,
        (BinaryOp::Or, Value::Boolean(a), Value::Boolean(b)) => *a || *b,
        (BinaryOp::Equal, Value::String(a), Value::String(b)) => a == b,
        (BinaryOp::NotEqual, Value::String(a), Value::String(b)) => a != b,
        (_, Value::Clip(_) | Value::Void, _) => {
            return Err(RuntimeError::type_error(format!(
                "comparison operators are not supported for {}s (yet)",
                lhs.kind_name()
            )))
        }
        _ => {
            return Err(RuntimeError::type_error(format!(
                "type mismatch: operator {} is not defined for {}s",
                op.symbol(),
                lhs.kind_name()
            )))
        }
    };
    Ok(Value::Boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn arithmetic_follows_float_rules() {
        assert_eq!(apply_binary(BinaryOp::Add, num(3.0), num(4.0)).unwrap(), num(7.0));
        assert_eq!(apply_binary(BinaryOp::Pow, num(2.0), num(10.0)).unwrap(), num(1024.0));
        match apply_binary(BinaryOp::Div, num(1.0), num(0.0)).unwrap() {
            Value::Number(n) => assert!(n.is_infinite()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn modulo_truncates_operands() {
        assert_eq!(apply_binary(BinaryOp::Mod, num(7.9), num(3.2)).unwrap(), num(1.0));
        assert_eq!(apply_binary(BinaryOp::Mod, num(-7.0), num(3.0)).unwrap(), num(-1.0));
        match apply_binary(BinaryOp::Mod, num(5.0), num(0.5)).unwrap() {
            Value::Number(n) => assert!(n.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn arithmetic_names_the_offending_side() {
        let err = apply_binary(BinaryOp::Add, Value::from("a"), num(1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.message(), "type mismatch: LHS of + expected number, got string");
    }

    #[test]
    fn concatenation_rules() {
        assert_eq!(
            apply_binary(BinaryOp::Concat, Value::from("ab"), Value::from("cd")).unwrap(),
            Value::from("abcd")
        );
        let err = apply_binary(BinaryOp::Concat, Value::from("ab"), Value::Boolean(true))
            .unwrap_err();
        assert_eq!(err.message(), "type mismatch: cannot concatenate string with boolean");
        let err = apply_binary(BinaryOp::Concat, num(1.0), num(2.0)).unwrap_err();
        assert_eq!(err.message(), "the concatenation operator is not defined on numbers");
        let clip = Clip::new(());
        let err = apply_binary(BinaryOp::Concat, Value::Clip(clip.clone()), Value::Clip(clip))
            .unwrap_err();
        assert_eq!(err.message(), "clip concatenation is not supported (yet)");
    }

    #[test]
    fn comparisons_require_matching_kinds() {
        assert_eq!(
            apply_binary(BinaryOp::Less, num(1.0), num(2.0)).unwrap(),
            Value::Boolean(true)
        );
        let err = apply_binary(BinaryOp::Equal, num(1.0), Value::from("1")).unwrap_err();
        assert_eq!(err.message(), "type mismatch: cannot compare number to string");
        let err = apply_binary(BinaryOp::And, num(1.0), num(1.0)).unwrap_err();
        assert_eq!(err.message(), "type mismatch: operator && is not defined for numbers");
        let err = apply_binary(BinaryOp::Less, Value::from("a"), Value::from("b")).unwrap_err();
        assert_eq!(err.message(), "type mismatch: operator < is not defined for strings");
        let clip = Value::Clip(Clip::new(0u8));
        let err = apply_binary(BinaryOp::Equal, clip.clone(), clip).unwrap_err();
        assert_eq!(err.message(), "comparison operators are not supported for clips (yet)");
        let err = apply_binary(BinaryOp::Less, Value::Void, Value::Void).unwrap_err();
        assert_eq!(err.message(), "comparison operators are not supported for voids (yet)");
    }

    #[test]
    fn unary_operators_check_kinds() {
        assert_eq!(apply_unary(UnaryOp::Negate, num(2.0)).unwrap(), num(-2.0));
        assert_eq!(
            apply_unary(UnaryOp::Not, Value::Boolean(false)).unwrap(),
            Value::Boolean(true)
        );
        let err = apply_unary(UnaryOp::Negate, Value::Boolean(true)).unwrap_err();
        assert_eq!(err.message(), "- expected number, got boolean");
    }

    #[test]
    fn numbers_print_without_trailing_zero() {
        assert_eq!(num(14.0).to_string_value(), "14");
        assert_eq!(num(2.5).to_string_value(), "2.5");
    }

    #[test]
    fn clip_copies_share_their_object() {
        let clip = Clip::new(42u32);
        let copy = clip.clone();
        assert!(clip.ptr_eq(&copy));
        assert_eq!(copy.downcast_ref::<u32>(), Some(&42));
    }
}
