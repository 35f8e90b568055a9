//! Same-kind comparison.
//!
//! Equality is defined across all kinds: values of different kinds are
//! never equal, and arrays, objects, functions and channels compare by
//! identity. Ordering is only defined between two numbers or two
//! strings.

use crate::compiler::OpCode;
use crate::error::RuntimeErrorKind;
use crate::runtime::Value;
use std::cmp::Ordering;

/// A comparison operator as encoded in bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    /// Maps a comparison opcode to its operator.
    pub fn from_opcode(op: OpCode) -> Option<CompareOp> {
        Some(match op {
            OpCode::Lt => CompareOp::Lt,
            OpCode::Le => CompareOp::Le,
            OpCode::Eq => CompareOp::Eq,
            OpCode::Ne => CompareOp::Ne,
            _ => return None,
        })
    }

    /// The opcode implementing this operator.
    pub fn opcode(self) -> OpCode {
        match self {
            CompareOp::Lt => OpCode::Lt,
            CompareOp::Le => OpCode::Le,
            CompareOp::Eq => OpCode::Eq,
            CompareOp::Ne => OpCode::Ne,
        }
    }

    /// Source spelling, for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Evaluates `a op b`.
pub fn compare(op: CompareOp, a: &Value, b: &Value) -> Result<bool, RuntimeErrorKind> {
    match op {
        CompareOp::Eq => Ok(a == b),
        CompareOp::Ne => Ok(a != b),
        CompareOp::Lt | CompareOp::Le => {
            let ordering = match (a, b) {
                (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
                (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
                _ => {
                    return Err(RuntimeErrorKind::InvalidComparison {
                        op: op.symbol(),
                        left: a.kind(),
                        right: b.kind(),
                    });
                }
            };
            // NaN orders with nothing
            Ok(match (op, ordering) {
                (_, None) => false,
                (CompareOp::Lt, Some(ord)) => ord == Ordering::Less,
                (_, Some(ord)) => ord != Ordering::Greater,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Array, ValueKind};

    #[test]
    fn test_equality_same_kind() {
        assert!(compare(CompareOp::Eq, &Value::Nil, &Value::Nil).unwrap());
        assert!(compare(CompareOp::Eq, &Value::Number(1.0), &Value::Number(1.0)).unwrap());
        assert!(compare(CompareOp::Ne, &Value::from("a"), &Value::from("b")).unwrap());
        assert!(!compare(CompareOp::Eq, &Value::Number(f64::NAN), &Value::Number(f64::NAN)).unwrap());
    }

    #[test]
    fn test_equality_across_kinds_is_false() {
        assert!(!compare(CompareOp::Eq, &Value::Number(1.0), &Value::from("1")).unwrap());
        assert!(compare(CompareOp::Ne, &Value::Nil, &Value::Bool(false)).unwrap());
    }

    #[test]
    fn test_reference_identity() {
        let a = Value::Array(Array::new(vec![]));
        let b = Value::Array(Array::new(vec![]));
        assert!(compare(CompareOp::Eq, &a, &a.clone()).unwrap());
        assert!(!compare(CompareOp::Eq, &a, &b).unwrap());
    }

    #[test]
    fn test_ordering() {
        assert!(compare(CompareOp::Lt, &Value::Number(1.0), &Value::Number(2.0)).unwrap());
        assert!(compare(CompareOp::Le, &Value::Number(2.0), &Value::Number(2.0)).unwrap());
        assert!(!compare(CompareOp::Lt, &Value::Number(2.0), &Value::Number(2.0)).unwrap());
        assert!(compare(CompareOp::Lt, &Value::from("abc"), &Value::from("abd")).unwrap());
        assert!(!compare(CompareOp::Le, &Value::Number(f64::NAN), &Value::Number(1.0)).unwrap());
    }

    #[test]
    fn test_ordering_across_kinds_fails() {
        let err = compare(CompareOp::Lt, &Value::Number(1.0), &Value::from("2")).unwrap_err();
        assert_eq!(
            err,
            RuntimeErrorKind::InvalidComparison {
                op: "<",
                left: ValueKind::Number,
                right: ValueKind::String,
            }
        );
        assert!(compare(CompareOp::Le, &Value::Bool(true), &Value::Bool(false)).is_err());
    }
}
