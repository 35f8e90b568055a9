//! Type inspection and conversion builtins.
//!
//! The compiler folds `string`, `number` and `bool` calls whose argument
//! is a constant, using the same [`Value`] conversions as these functions.

use crate::runtime::{HostCall, Value};

/// `type(x)` - the type name of `x`.
pub fn type_of(call: &mut HostCall) -> Result<(), String> {
    let name = call.arg(0).type_name();
    call.push_result(Value::from(name));
    Ok(())
}

/// `isnumber(x)`
pub fn is_number(call: &mut HostCall) -> Result<(), String> {
    let result = matches!(call.arg(0), Value::Number(_));
    call.push_result(Value::Bool(result));
    Ok(())
}

/// `string(x)` - the display form of `x`.
pub fn string(call: &mut HostCall) -> Result<(), String> {
    let text = call.arg(0).to_string();
    call.push_result(Value::String(text));
    Ok(())
}

/// `number(x)` - numeric value of `x`, or nil when it has none.
pub fn number(call: &mut HostCall) -> Result<(), String> {
    let result = call.arg(0).to_number().map_or(Value::Nil, Value::Number);
    call.push_result(result);
    Ok(())
}

/// `bool(x)` - truthiness of `x`.
pub fn boolean(call: &mut HostCall) -> Result<(), String> {
    let result = call.arg(0).to_bool();
    call.push_result(Value::Bool(result));
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_util::eval;
    use crate::runtime::Value;

    #[test]
    fn test_type_names() {
        assert_eq!(eval("type(1)").unwrap(), Value::from("number"));
        assert_eq!(eval("type('a')").unwrap(), Value::from("string"));
        assert_eq!(eval("type(nil)").unwrap(), Value::from("nil"));
        assert_eq!(eval("type([])").unwrap(), Value::from("array"));
        assert_eq!(eval("type({})").unwrap(), Value::from("object"));
        assert_eq!(eval("type(len)").unwrap(), Value::from("function"));
        assert_eq!(eval("type(chan())").unwrap(), Value::from("channel"));
    }

    #[test]
    fn test_isnumber() {
        assert_eq!(eval("isnumber(3)").unwrap(), Value::Bool(true));
        assert_eq!(eval("isnumber('3')").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_conversions_at_runtime() {
        // arguments held in variables are not folded
        assert_eq!(eval("x := 12; string(x)").unwrap(), Value::from("12"));
        assert_eq!(eval("s := ' 0x1f '; number(s)").unwrap(), Value::Number(31.0));
        assert_eq!(eval("s := 'abc'; number(s)").unwrap(), Value::Nil);
        assert_eq!(eval("b := true; number(b)").unwrap(), Value::Number(1.0));
        assert_eq!(eval("n := 0; bool(n)").unwrap(), Value::Bool(true));
        assert_eq!(eval("n := nil; bool(n)").unwrap(), Value::Bool(false));
        assert_eq!(eval("xs := [1, 'a']; string(xs)").unwrap(), Value::from("[1, \"a\"]"));
    }

    #[test]
    fn test_folded_and_runtime_conversions_agree() {
        for literal in ["'42'", "'x'", "true", "nil", "2.5"] {
            for conv in ["string", "number", "bool"] {
                let folded = eval(&format!("{}({})", conv, literal)).unwrap();
                let runtime = eval(&format!("v := {}; {}(v)", literal, conv)).unwrap();
                assert_eq!(folded, runtime, "{}({})", conv, literal);
            }
        }
    }
}
