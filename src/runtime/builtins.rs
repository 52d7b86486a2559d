use super::{ArgList, ErrorKind, Interpreter, RuntimeError, RuntimeResult, Value, ValueKind};

pub(super) fn register(interpreter: &mut Interpreter) {
    interpreter.register_core("print", builtin_print);
    interpreter.register_core("typeof", builtin_typeof);
    interpreter.register_core("str", builtin_str);
    interpreter.register_core("assert", builtin_assert);
}

fn builtin_print(interpreter: &mut Interpreter, args: &ArgList) -> RuntimeResult<Value> {
    args.check_count(1)?;
    let value = storable(args.value(0)?)?;
    interpreter.message(&value.to_string_value());
    Ok(Value::Void)
}

fn builtin_typeof(_: &mut Interpreter, args: &ArgList) -> RuntimeResult<Value> {
    args.check_count(1)?;
    Ok(Value::String(args.value(0)?.kind_name().to_string()))
}

fn builtin_str(_: &mut Interpreter, args: &ArgList) -> RuntimeResult<Value> {
    args.check_count(1)?;
    let value = args.value(0)?;
    match value {
        Value::Number(_) | Value::Boolean(_) | Value::String(_) => {
            Ok(Value::String(value.to_string_value()))
        }
        other => Err(RuntimeError::type_error(format!(
            "arg 1 expected number or boolean, got {}",
            other.kind_name()
        ))),
    }
}

fn builtin_assert(_: &mut Interpreter, args: &ArgList) -> RuntimeResult<Value> {
    args.check_args(&[ValueKind::Boolean])?;
    let message = args.opt_string("message")?;
    if args.boolean(0)? {
        return Ok(Value::Void);
    }
    Err(RuntimeError::new(
        ErrorKind::Type,
        message.unwrap_or("assertion failed"),
    ))
}

fn storable(value: &Value) -> RuntimeResult<&Value> {
    if value.is_storable() {
        Ok(value)
    } else {
        Err(RuntimeError::type_error(format!(
            "arg 1 expected a value, got {}",
            value.kind_name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::BufferReporter;

    fn interpreter() -> (Interpreter, BufferReporter) {
        let reporter = BufferReporter::new();
        (Interpreter::new().with_reporter(reporter.clone()), reporter)
    }

    #[test]
    fn print_writes_a_message() {
        let (mut interp, reporter) = interpreter();
        interp.run_source("print(3 * 2); print(\"hi\");").unwrap();
        assert_eq!(reporter.messages(), vec!["6".to_string(), "hi".to_string()]);
    }

    #[test]
    fn print_rejects_void() {
        let (mut interp, _) = interpreter();
        interp.run_source("function nothing() { }").unwrap();
        let err = interp.run_source("print(nothing());").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.function(), Some("print"));
    }

    #[test]
    fn typeof_and_str() {
        let (mut interp, _) = interpreter();
        interp
            .run_source("t = typeof(true); s = str(2.5) ++ str(false);")
            .unwrap();
        assert_eq!(interp.global("t"), Some(Value::from("boolean")));
        assert_eq!(interp.global("s"), Some(Value::from("2.5false")));
    }

    #[test]
    fn assert_carries_its_message() {
        let (mut interp, _) = interpreter();
        interp.run_source("assert(1 < 2);").unwrap();
        let err = interp
            .run_source("assert(1 > 2, message: \"math is broken\");")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.message(), "math is broken");
        assert_eq!(err.line(), Some(1));
    }
}
