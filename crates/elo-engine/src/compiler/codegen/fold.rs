//! Constant folding.
//!
//! Folding evaluates through the VM's own operator functions, so a
//! folded result is exactly what the instructions would have produced.
//! Anything that would fail at run time (mismatched kinds, ordering
//! across kinds) is left unfolded and reported by the VM instead.

use super::Compiler;
use crate::ast::*;
use crate::runtime::Value;
use crate::vm::arithmetic::{self, ArithOp};
use crate::vm::comparison::{self, CompareOp};

impl Compiler {
    /// Evaluates `expr` at compile time, if it is constant.
    ///
    /// Identifiers fold when they name a `const` binding. Calls fold
    /// when they are one-argument `string`, `number` or `bool`
    /// conversions of a constant and the conversion name is not
    /// shadowed by a local.
    pub(super) fn fold(&self, expr: &Expression) -> Option<Value> {
        match &expr.kind {
            ExpressionKind::Nil => Some(Value::Nil),
            ExpressionKind::Bool(b) => Some(Value::Bool(*b)),
            ExpressionKind::Number(n) => Some(Value::Number(*n)),
            ExpressionKind::String(s) => Some(Value::String(s.clone())),
            ExpressionKind::Identifier(name) => self.scope.find(name)?.constant.clone(),
            ExpressionKind::Unary(unary) => fold_unary(unary.operator, self.fold(&unary.operand)?),
            ExpressionKind::Binary(binary) => {
                let left = self.fold(&binary.left)?;
                let right = self.fold(&binary.right)?;
                fold_binary(binary.operator, &left, &right)
            }
            ExpressionKind::Call(call) => self.fold_conversion(call),
            _ => None,
        }
    }

    fn fold_conversion(&self, call: &CallExpression) -> Option<Value> {
        let ExpressionKind::Identifier(name) = &call.callee.kind else {
            return None;
        };
        if call.args.len() != 1 || self.scope.find(name).is_some() {
            return None;
        }
        let value = self.fold(&call.args[0])?;
        match name.as_str() {
            "string" => Some(Value::String(value.to_string())),
            "number" => Some(value.to_number().map_or(Value::Nil, Value::Number)),
            "bool" => Some(Value::Bool(value.to_bool())),
            _ => None,
        }
    }
}

fn fold_unary(operator: UnaryOperator, value: Value) -> Option<Value> {
    match (operator, &value) {
        (UnaryOperator::Minus, Value::Number(_)) => arithmetic::negate(&value).ok(),
        (UnaryOperator::Complement, Value::Number(_)) => arithmetic::complement(&value).ok(),
        (UnaryOperator::Not, Value::Bool(_)) => Some(arithmetic::not(&value)),
        _ => None,
    }
}

fn fold_binary(operator: BinaryOperator, left: &Value, right: &Value) -> Option<Value> {
    if let Some(op) = arith_op(operator) {
        return match (left, right) {
            (Value::Number(_), Value::Number(_)) => arithmetic::binary(op, left, right).ok(),
            (Value::String(_), Value::String(_)) if op == ArithOp::Add => {
                arithmetic::binary(op, left, right).ok()
            }
            _ => None,
        };
    }

    match operator {
        BinaryOperator::And | BinaryOperator::Or => {
            let (Value::Bool(a), Value::Bool(b)) = (left, right) else {
                return None;
            };
            Some(Value::Bool(if operator == BinaryOperator::And {
                *a && *b
            } else {
                *a || *b
            }))
        }
        _ => {
            let same_kind = matches!(
                (left, right),
                (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
            );
            if !same_kind {
                return None;
            }
            let (op, swapped) = compare_op(operator)?;
            let result = if swapped {
                comparison::compare(op, right, left)
            } else {
                comparison::compare(op, left, right)
            };
            result.ok().map(Value::Bool)
        }
    }
}

/// The VM operator behind an arithmetic or bitwise source operator.
pub(super) fn arith_op(operator: BinaryOperator) -> Option<ArithOp> {
    Some(match operator {
        BinaryOperator::Add => ArithOp::Add,
        BinaryOperator::Sub => ArithOp::Sub,
        BinaryOperator::Mul => ArithOp::Mul,
        BinaryOperator::Div => ArithOp::Div,
        BinaryOperator::Mod => ArithOp::Mod,
        BinaryOperator::Pow => ArithOp::Pow,
        BinaryOperator::Shl => ArithOp::Shl,
        BinaryOperator::Shr => ArithOp::Shr,
        BinaryOperator::BitAnd => ArithOp::BitAnd,
        BinaryOperator::BitOr => ArithOp::BitOr,
        BinaryOperator::BitXor => ArithOp::BitXor,
        _ => return None,
    })
}

/// The VM comparison behind a relational operator; `true` means the
/// operands are swapped (`a > b` is `b < a`).
pub(super) fn compare_op(operator: BinaryOperator) -> Option<(CompareOp, bool)> {
    Some(match operator {
        BinaryOperator::Lt => (CompareOp::Lt, false),
        BinaryOperator::Le => (CompareOp::Le, false),
        BinaryOperator::Gt => (CompareOp::Lt, true),
        BinaryOperator::Ge => (CompareOp::Le, true),
        BinaryOperator::Eq => (CompareOp::Eq, false),
        BinaryOperator::Ne => (CompareOp::Ne, false),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn fold_source(src: &str) -> Option<Value> {
        let expr = Parser::new(src).parse_expression().unwrap();
        Compiler::new("test").fold(&expr)
    }

    #[test]
    fn test_fold_arithmetic() {
        assert_eq!(fold_source("2 + 3 * 4"), Some(Value::Number(14.0)));
        assert_eq!(fold_source("2 ** 3 - 1"), Some(Value::Number(7.0)));
        assert_eq!(fold_source("1 << 4 | 1"), Some(Value::Number(17.0)));
        assert_eq!(fold_source("-(3)"), Some(Value::Number(-3.0)));
        assert_eq!(fold_source("~0"), Some(Value::Number(-1.0)));
    }

    #[test]
    fn test_fold_strings_and_comparisons() {
        assert_eq!(fold_source("'a' + 'b'"), Some(Value::from("ab")));
        assert_eq!(fold_source("'a' < 'b'"), Some(Value::Bool(true)));
        assert_eq!(fold_source("3 > 2"), Some(Value::Bool(true)));
        assert_eq!(fold_source("2 >= 3"), Some(Value::Bool(false)));
        assert_eq!(fold_source("1 == 1"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_fold_logical_only_on_bools() {
        assert_eq!(fold_source("true && false"), Some(Value::Bool(false)));
        assert_eq!(fold_source("!false || false"), Some(Value::Bool(true)));
        assert_eq!(fold_source("1 && 2"), None);
        assert_eq!(fold_source("!1"), None);
    }

    #[test]
    fn test_fold_rejects_mixed_kinds() {
        assert_eq!(fold_source("1 + 'a'"), None);
        assert_eq!(fold_source("'a' - 'b'"), None);
        assert_eq!(fold_source("1 < 'a'"), None);
        assert_eq!(fold_source("x + 1"), None);
    }

    #[test]
    fn test_fold_conversions() {
        assert_eq!(fold_source("string(12)"), Some(Value::from("12")));
        assert_eq!(fold_source("number('0x10')"), Some(Value::Number(16.0)));
        assert_eq!(fold_source("number('nope')"), Some(Value::Nil));
        assert_eq!(fold_source("bool(nil)"), Some(Value::Bool(false)));
        assert_eq!(fold_source("string(1, 2)"), None);
        assert_eq!(fold_source("len('abc')"), None);
    }
}
