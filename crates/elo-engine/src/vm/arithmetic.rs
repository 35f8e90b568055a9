//! Arithmetic and bitwise operators.
//!
//! The interpreter and the compiler's constant folder both evaluate
//! through these functions, so a folded expression always produces the
//! value the VM would have computed at run time.

use crate::compiler::OpCode;
use crate::error::RuntimeErrorKind;
use crate::runtime::Value;

/// A binary numeric operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+` (also joins two strings)
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Pow,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
}

impl ArithOp {
    /// Maps an arithmetic opcode to its operator.
    pub fn from_opcode(op: OpCode) -> Option<ArithOp> {
        Some(match op {
            OpCode::Add => ArithOp::Add,
            OpCode::Sub => ArithOp::Sub,
            OpCode::Mul => ArithOp::Mul,
            OpCode::Div => ArithOp::Div,
            OpCode::Mod => ArithOp::Mod,
            OpCode::Pow => ArithOp::Pow,
            OpCode::Shl => ArithOp::Shl,
            OpCode::Shr => ArithOp::Shr,
            OpCode::And => ArithOp::BitAnd,
            OpCode::Or => ArithOp::BitOr,
            OpCode::Xor => ArithOp::BitXor,
            _ => return None,
        })
    }

    /// The opcode implementing this operator.
    pub fn opcode(self) -> OpCode {
        match self {
            ArithOp::Add => OpCode::Add,
            ArithOp::Sub => OpCode::Sub,
            ArithOp::Mul => OpCode::Mul,
            ArithOp::Div => OpCode::Div,
            ArithOp::Mod => OpCode::Mod,
            ArithOp::Pow => OpCode::Pow,
            ArithOp::Shl => OpCode::Shl,
            ArithOp::Shr => OpCode::Shr,
            ArithOp::BitAnd => OpCode::And,
            ArithOp::BitOr => OpCode::Or,
            ArithOp::BitXor => OpCode::Xor,
        }
    }

    /// Source spelling, for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Pow => "**",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
            ArithOp::BitAnd => "&",
            ArithOp::BitOr => "|",
            ArithOp::BitXor => "^",
        }
    }

    /// Applies the operator to two numbers.
    ///
    /// Shifts and bitwise operators work on the operands truncated to
    /// 64-bit integers; shift counts are clamped to `0..=63`.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
            ArithOp::Pow => a.powf(b),
            ArithOp::Shl => (a as i64).wrapping_shl(shift_count(b)) as f64,
            ArithOp::Shr => ((a as i64) >> shift_count(b)) as f64,
            ArithOp::BitAnd => ((a as i64) & (b as i64)) as f64,
            ArithOp::BitOr => ((a as i64) | (b as i64)) as f64,
            ArithOp::BitXor => ((a as i64) ^ (b as i64)) as f64,
        }
    }
}

fn shift_count(b: f64) -> u32 {
    (b as i64).clamp(0, 63) as u32
}

/// Evaluates `a op b`.
pub fn binary(op: ArithOp, a: &Value, b: &Value) -> Result<Value, RuntimeErrorKind> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(Value::Number(op.apply(*x, *y))),
        (Value::String(x), Value::String(y)) if op == ArithOp::Add => {
            let mut joined = String::with_capacity(x.len() + y.len());
            joined.push_str(x);
            joined.push_str(y);
            Ok(Value::String(joined))
        }
        _ => Err(RuntimeErrorKind::TypeMismatch {
            op: op.symbol(),
            left: a.kind(),
            right: b.kind(),
        }),
    }
}

/// Evaluates `-v`.
pub fn negate(v: &Value) -> Result<Value, RuntimeErrorKind> {
    match v {
        Value::Number(n) => Ok(Value::Number(-n)),
        other => Err(RuntimeErrorKind::InvalidOperand {
            op: "-",
            kind: other.kind(),
        }),
    }
}

/// Evaluates `~v`.
pub fn complement(v: &Value) -> Result<Value, RuntimeErrorKind> {
    match v {
        Value::Number(n) => Ok(Value::Number(!(*n as i64) as f64)),
        other => Err(RuntimeErrorKind::InvalidOperand {
            op: "~",
            kind: other.kind(),
        }),
    }
}

/// Evaluates `!v` on the value's truthiness.
pub fn not(v: &Value) -> Value {
    Value::Bool(!v.to_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ValueKind;

    #[test]
    fn test_numeric_operators() {
        assert_eq!(ArithOp::Add.apply(1.0, 2.0), 3.0);
        assert_eq!(ArithOp::Mod.apply(7.0, 3.0), 1.0);
        assert_eq!(ArithOp::Pow.apply(2.0, 10.0), 1024.0);
        assert!(ArithOp::Div.apply(1.0, 0.0).is_infinite());
    }

    #[test]
    fn test_bitwise_operators_truncate() {
        assert_eq!(ArithOp::Shl.apply(1.0, 4.0), 16.0);
        assert_eq!(ArithOp::Shr.apply(-16.0, 2.0), -4.0);
        assert_eq!(ArithOp::BitAnd.apply(6.9, 3.0), 2.0);
        assert_eq!(ArithOp::BitOr.apply(4.0, 1.0), 5.0);
        assert_eq!(ArithOp::BitXor.apply(5.0, 1.0), 4.0);
        assert_eq!(ArithOp::Shl.apply(1.0, 100.0), (1i64 << 63) as f64);
    }

    #[test]
    fn test_string_concatenation() {
        let joined = binary(ArithOp::Add, &Value::from("a"), &Value::from("b")).unwrap();
        assert_eq!(joined, Value::from("ab"));
    }

    #[test]
    fn test_type_mismatch() {
        let err = binary(ArithOp::Sub, &Value::from("a"), &Value::Number(1.0)).unwrap_err();
        assert_eq!(
            err,
            RuntimeErrorKind::TypeMismatch {
                op: "-",
                left: ValueKind::String,
                right: ValueKind::Number,
            }
        );
        assert!(binary(ArithOp::Add, &Value::Number(1.0), &Value::Nil).is_err());
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(negate(&Value::Number(2.0)).unwrap(), Value::Number(-2.0));
        assert_eq!(complement(&Value::Number(0.0)).unwrap(), Value::Number(-1.0));
        assert!(negate(&Value::Bool(true)).is_err());
        assert_eq!(not(&Value::Nil), Value::Bool(true));
        assert_eq!(not(&Value::Number(0.0)), Value::Bool(false));
    }

    #[test]
    fn test_opcode_mapping() {
        for op in [ArithOp::Add, ArithOp::Shr, ArithOp::BitXor] {
            assert_eq!(ArithOp::from_opcode(op.opcode()), Some(op));
        }
        assert_eq!(ArithOp::from_opcode(OpCode::Move), None);
    }
}
