//! Collection builtins.

use crate::runtime::{HostCall, Value};

/// `len(x)` - length of a string (in characters), array or object.
pub fn len(call: &mut HostCall) -> Result<(), String> {
    let len = match call.arg(0) {
        Value::String(s) => s.chars().count(),
        Value::Array(array) => array.len(),
        Value::Object(object) => object.len(),
        Value::Channel(channel) => channel.len(),
        other => return Err(format!("cannot take length of {}", other.type_name())),
    };
    call.push_result(Value::Number(len as f64));
    Ok(())
}

/// `append(array, values...)` - pushes the values and returns the array.
pub fn append(call: &mut HostCall) -> Result<(), String> {
    let target = call.arg(0);
    let Value::Array(array) = &target else {
        return Err(format!("cannot append to {}", target.type_name()));
    };
    array.extend(call.args.iter().skip(1).cloned());
    call.push_result(target);
    Ok(())
}

/// `setparent(object, parent)` - sets or clears the parent link.
///
/// Fails when the link would make a cycle.
pub fn set_parent(call: &mut HostCall) -> Result<(), String> {
    let target = call.arg(0);
    let Value::Object(object) = &target else {
        return Err(format!("cannot set parent of {}", target.type_name()));
    };
    let linked = match call.arg(1) {
        Value::Nil => object.set_parent(None),
        Value::Object(parent) => object.set_parent(Some(&parent)),
        other => return Err(format!("parent must be an object, got {}", other.type_name())),
    };
    if !linked {
        return Err("parent chain would form a cycle".to_string());
    }
    call.push_result(target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_util::eval;
    use crate::error::RuntimeErrorKind;
    use crate::runtime::Value;

    #[test]
    fn test_len() {
        assert_eq!(eval("len('héllo')").unwrap(), Value::Number(5.0));
        assert_eq!(eval("len([1, 2, 3])").unwrap(), Value::Number(3.0));
        assert_eq!(eval("len({a: 1, b: 2})").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_len_of_number_is_host_error() {
        let err = eval("len(3)").unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::Host { ref name, .. } if name == "len"));
    }

    #[test]
    fn test_append_mutates_shared_array() {
        let result = eval("xs := [1]; ys := xs; append(xs, 2, 3); len(ys)").unwrap();
        assert_eq!(result, Value::Number(3.0));
        let result = eval("xs := append([], 'a'); xs[0]").unwrap();
        assert_eq!(result, Value::from("a"));
    }

    #[test]
    fn test_setparent_lookup() {
        let src = "base := {greet: 'hi'}; o := setparent({}, base); o.greet";
        assert_eq!(eval(src).unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_setparent_clears_and_rejects_cycles() {
        let src = "a := {x: 1}; b := setparent({}, a); setparent(b, nil); b.x";
        assert_eq!(eval(src).unwrap(), Value::Nil);

        let err = eval("a := {}; b := setparent({}, a); setparent(a, b)").unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::Host { .. }));
    }
}
