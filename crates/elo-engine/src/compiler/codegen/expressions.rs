//! Expression compilation.
//!
//! | Expression | Instructions |
//! |------------|--------------|
//! | literal | `LOADCONST`, or a constant operand when propagating |
//! | identifier | `MOVE`, `LOADREF`, `LOADGLOBAL` |
//! | `[a, b]` | `ARRAY`, then `APPEND` per batch of elements |
//! | `{k: v}` | `OBJECT`, then `SET` per field |
//! | `a.b`, `a[i]` | `GET` |
//! | `f(x)`, `o.m(x)` | `CALL`, `GET` + `CALLMETHOD` |
//! | `a && b` | left, `JMPFALSE` over right |
//! | `c ? a : b` | `JMPFALSE` to else, `JMP` past else |

use super::fold::{arith_op, compare_op};
use super::{Binding, CompileResult, Compiler, Dest, ScopeKind};
use crate::ast::*;
use crate::compiler::bytecode::{ARRAY_BATCH, CONST_OFFSET, OpCode, is_constant};
use crate::error::CompileErrorKind;
use crate::runtime::Value;

impl Compiler {
    /// Compiles `expr` into `dest`, or into a fresh register when no
    /// destination is given. Returns the operand holding the value.
    pub(super) fn expression(&mut self, expr: &Expression, dest: Option<Dest>) -> CompileResult<u32> {
        let line = std::mem::replace(&mut self.line, expr.line);
        let dest = match dest {
            Some(dest) => dest,
            None => Dest::to(self.temp()?),
        };
        let result = self.visit_expression(expr, dest);
        self.line = line;
        result
    }

    fn visit_expression(&mut self, expr: &Expression, dest: Dest) -> CompileResult<u32> {
        match &expr.kind {
            ExpressionKind::Nil => {
                self.emit_ab(OpCode::LoadNil, dest.reg, dest.end - 1);
                Ok(dest.reg)
            }
            ExpressionKind::Bool(b) => self.literal(Value::Bool(*b), dest),
            ExpressionKind::Number(n) => self.literal(Value::Number(*n), dest),
            ExpressionKind::String(s) => self.literal(Value::String(s.clone()), dest),
            ExpressionKind::Identifier(name) => self.identifier(name, dest),
            ExpressionKind::Array(items) => self.array(items, dest),
            ExpressionKind::Object(fields) => self.object(fields, dest),
            ExpressionKind::Function(literal) => {
                let index = self.function(literal)?;
                self.emit_abx(OpCode::Func, dest.reg, index);
                Ok(dest.reg)
            }
            ExpressionKind::Selector(selector) => self.selector(selector, dest),
            ExpressionKind::Subscript(subscript) => self.subscript(subscript, dest),
            ExpressionKind::Call(call) => self.call(expr, call, dest),
            ExpressionKind::Unary(unary) => self.unary(expr, unary, dest),
            ExpressionKind::Update(update) => self.update(update, Some(dest)),
            ExpressionKind::Binary(binary) => self.binary(expr, binary, dest),
            ExpressionKind::Ternary(ternary) => self.ternary(ternary, dest),
            ExpressionKind::Spread(_) => Err(self.error(CompileErrorKind::InvalidSpread)),
        }
    }

    /// Compiles `expr` into any readable operand, register or constant.
    pub(super) fn operand(&mut self, expr: &Expression) -> CompileResult<u32> {
        let scratch = self.temp()?;
        self.expression(expr, Some(Dest::operand(scratch)))
    }

    /// Compiles `expr` into a register; locals are read in place.
    pub(super) fn register_operand(&mut self, expr: &Expression) -> CompileResult<u32> {
        let scratch = self.temp()?;
        let operand = self.expression(expr, Some(Dest::operand(scratch)))?;
        if is_constant(operand) {
            self.emit_abx(OpCode::LoadConst, scratch, operand - CONST_OFFSET);
            return Ok(scratch);
        }
        Ok(operand)
    }

    /// Compiles the last value of a declaration or assignment, which may
    /// fill a window of several registers.
    pub(super) fn multi_value(&mut self, expr: &Expression, dest: Dest) -> CompileResult<u32> {
        match &expr.kind {
            ExpressionKind::Spread(inner) => {
                let line = std::mem::replace(&mut self.line, expr.line);
                self.expression(inner, Some(Dest::to(dest.reg)))?;
                self.emit_ab(OpCode::Unpack, dest.reg, dest.width());
                self.line = line;
                Ok(dest.reg)
            }
            _ => self.expression(expr, Some(dest)),
        }
    }

    fn literal(&mut self, value: Value, dest: Dest) -> CompileResult<u32> {
        if dest.propagate {
            return self.constant_rk(value, dest.reg);
        }
        self.load_constant(value, dest.reg)?;
        Ok(dest.reg)
    }

    fn identifier(&mut self, name: &str, dest: Dest) -> CompileResult<u32> {
        match self.lookup(name)? {
            Binding::Constant(value) => self.literal(value, dest),
            Binding::Local(reg) => {
                if dest.propagate {
                    return Ok(reg);
                }
                if reg != dest.reg {
                    self.emit_ab(OpCode::Move, dest.reg, reg);
                }
                Ok(dest.reg)
            }
            Binding::Upvalue(index) => {
                self.emit_abx(OpCode::LoadRef, dest.reg, index);
                Ok(dest.reg)
            }
            Binding::Global => {
                let key = self.constant(Value::from(name))?;
                self.emit_abx(OpCode::LoadGlobal, dest.reg, key);
                Ok(dest.reg)
            }
        }
    }

    fn array(&mut self, items: &[Expression], dest: Dest) -> CompileResult<u32> {
        let base = self.staging_base(dest.reg, 1)?;
        let saved = self.free_register();
        self.emit_ab(OpCode::Array, base, 0);

        for batch in items.chunks(ARRAY_BATCH) {
            for (i, item) in batch.iter().enumerate() {
                let reg = base + 1 + i as u32;
                self.claim(reg + 1)?;
                self.expression(item, Some(Dest::to(reg)))?;
            }
            self.emit_ab(OpCode::Append, base, batch.len() as u32);
            self.set_free_register(saved);
        }

        self.finish_staged(base, dest.reg, 1);
        Ok(dest.reg)
    }

    fn object(&mut self, fields: &[ObjectField], dest: Dest) -> CompileResult<u32> {
        let base = self.staging_base(dest.reg, 1)?;
        let saved = self.free_register();
        self.emit_ab(OpCode::Object, base, 0);

        for field in fields {
            let scratch = self.temp()?;
            let key = self.constant_rk(Value::from(field.key.as_str()), scratch)?;
            let value = self.operand(&field.value)?;
            self.emit_abc(OpCode::Set, base, key, value);
            self.set_free_register(saved);
        }

        self.finish_staged(base, dest.reg, 1);
        Ok(dest.reg)
    }

    /// Moves `width` results built at `base` into `reg`.
    fn finish_staged(&mut self, base: u32, reg: u32, width: u32) {
        if base != reg {
            for i in 0..width {
                self.emit_ab(OpCode::Move, reg + i, base + i);
            }
        }
    }

    fn selector(&mut self, selector: &SelectorExpression, dest: Dest) -> CompileResult<u32> {
        let saved = self.free_register();
        let object = self.register_operand(&selector.object)?;
        let scratch = self.temp()?;
        let key = self.constant_rk(Value::from(selector.field.as_str()), scratch)?;
        self.emit_abc(OpCode::Get, dest.reg, object, key);
        self.set_free_register(saved);
        Ok(dest.reg)
    }

    fn subscript(&mut self, subscript: &SubscriptExpression, dest: Dest) -> CompileResult<u32> {
        let saved = self.free_register();
        let object = self.register_operand(&subscript.object)?;
        let index = self.operand(&subscript.index)?;
        self.emit_abc(OpCode::Get, dest.reg, object, index);
        self.set_free_register(saved);
        Ok(dest.reg)
    }

    /// Compiles a call. The callee goes in the first register of the
    /// window, results overwrite the window, and arguments follow it.
    /// A selector callee becomes a method call with the selected-from
    /// value as receiver.
    fn call(&mut self, expr: &Expression, call: &CallExpression, dest: Dest) -> CompileResult<u32> {
        let results = dest.width();

        if let Some(value) = self.fold(expr) {
            let operand = self.literal(value, Dest { end: dest.reg + 1, ..dest })?;
            if results > 1 {
                self.emit_ab(OpCode::LoadNil, dest.reg + 1, dest.end - 1);
            }
            return Ok(operand);
        }

        let saved = self.free_register();
        let base = self.staging_base(dest.reg, results)?;

        let (op, first_arg, argc) = match &call.callee.kind {
            ExpressionKind::Selector(selector) => {
                let receiver = base + results;
                self.claim(receiver + 1)?;
                self.expression(&selector.object, Some(Dest::to(receiver)))?;
                let scratch = self.temp()?;
                let key = self.constant_rk(Value::from(selector.field.as_str()), scratch)?;
                self.emit_abc(OpCode::Get, base, receiver, key);
                self.set_free_register(receiver + 1);
                (OpCode::CallMethod, receiver + 1, call.args.len() + 1)
            }
            _ => {
                self.expression(&call.callee, Some(Dest::to(base)))?;
                (OpCode::Call, base + results, call.args.len())
            }
        };

        for (i, arg) in call.args.iter().enumerate() {
            let reg = first_arg + i as u32;
            self.claim(reg + 1)?;
            self.expression(arg, Some(Dest::to(reg)))?;
        }

        self.emit_abc(op, base, results, argc as u32);
        self.finish_staged(base, dest.reg, results);
        self.set_free_register(saved);
        Ok(dest.reg)
    }

    fn unary(&mut self, expr: &Expression, unary: &UnaryExpression, dest: Dest) -> CompileResult<u32> {
        if let Some(value) = self.fold(expr) {
            return self.literal(value, dest);
        }

        let saved = self.free_register();
        let operand = self.operand(&unary.operand)?;
        let op = match unary.operator {
            UnaryOperator::Minus => OpCode::Neg,
            UnaryOperator::Not => OpCode::Not,
            UnaryOperator::Complement => OpCode::Cmpl,
        };
        self.emit_abx(op, dest.reg, operand);
        self.set_free_register(saved);
        Ok(dest.reg)
    }

    fn binary(&mut self, expr: &Expression, binary: &BinaryExpression, dest: Dest) -> CompileResult<u32> {
        if let Some(value) = self.fold(expr) {
            return self.literal(value, dest);
        }
        if matches!(binary.operator, BinaryOperator::And | BinaryOperator::Or) {
            return self.logical(binary, dest);
        }

        let saved = self.free_register();
        let left = if self.clobbers_left(&binary.left, &binary.right) {
            let scratch = self.temp()?;
            self.expression(&binary.left, Some(Dest::to(scratch)))?
        } else {
            self.operand(&binary.left)?
        };
        let right = self.operand(&binary.right)?;

        if let Some(op) = arith_op(binary.operator) {
            self.emit_abc(op.opcode(), dest.reg, left, right);
        } else if let Some((op, swapped)) = compare_op(binary.operator) {
            let (b, c) = if swapped { (right, left) } else { (left, right) };
            self.emit_abc(op.opcode(), dest.reg, b, c);
        }

        self.set_free_register(saved);
        Ok(dest.reg)
    }

    /// True when `left` is a local read in place and evaluating `right`
    /// may change it before the operator reads both.
    fn clobbers_left(&self, left: &Expression, right: &Expression) -> bool {
        let ExpressionKind::Identifier(name) = &left.kind else {
            return false;
        };
        match self.scope.find(name) {
            Some(info) if info.constant.is_none() => {
                writes_local(right, name, info.scope == ScopeKind::Ref)
            }
            _ => false,
        }
    }

    /// `a && b` leaves `a` in the destination and skips `b` when `a` is
    /// falsy; `a || b` skips `b` when `a` is truthy.
    fn logical(&mut self, binary: &BinaryExpression, dest: Dest) -> CompileResult<u32> {
        let saved = self.free_register();
        let jump = if binary.operator == BinaryOperator::And {
            OpCode::JmpFalse
        } else {
            OpCode::JmpTrue
        };

        self.expression(&binary.left, Some(Dest::to(dest.reg)))?;
        let skip = self.emit_jump(jump, dest.reg);
        self.set_free_register(saved);
        self.expression(&binary.right, Some(Dest::to(dest.reg)))?;
        let end = self.label();
        self.patch_jump(skip, end)?;

        self.set_free_register(saved);
        Ok(dest.reg)
    }

    fn ternary(&mut self, ternary: &TernaryExpression, dest: Dest) -> CompileResult<u32> {
        let saved = self.free_register();
        let condition = self.register_operand(&ternary.condition)?;
        let to_else = self.emit_jump(OpCode::JmpFalse, condition);
        self.set_free_register(saved);

        self.expression(&ternary.then_value, Some(Dest::to(dest.reg)))?;
        let to_end = self.emit_jump(OpCode::Jmp, 0);
        let else_label = self.label();
        self.patch_jump(to_else, else_label)?;

        self.expression(&ternary.else_value, Some(Dest::to(dest.reg)))?;
        let end = self.label();
        self.patch_jump(to_end, end)?;

        self.set_free_register(saved);
        Ok(dest.reg)
    }

    /// Compiles `++`/`--`. With no destination the value is unused and
    /// only the target is updated.
    pub(super) fn update(&mut self, update: &UpdateExpression, dest: Option<Dest>) -> CompileResult<u32> {
        let saved = self.free_register();
        let op = match update.operator {
            UpdateOperator::Increment => OpCode::Add,
            UpdateOperator::Decrement => OpCode::Sub,
        };

        if let ExpressionKind::Identifier(name) = &update.target.kind {
            match self.lookup(name)? {
                Binding::Constant(_) => {
                    return Err(self.error(CompileErrorKind::ConstAssignment(name.clone())));
                }
                Binding::Local(reg) => {
                    let scratch = self.temp()?;
                    let one = self.constant_rk(Value::Number(1.0), scratch)?;
                    let result = match dest {
                        None => reg,
                        Some(dest) if update.prefix => {
                            self.emit_abc(op, reg, reg, one);
                            self.set_free_register(saved);
                            if dest.propagate {
                                return Ok(reg);
                            }
                            self.emit_ab(OpCode::Move, dest.reg, reg);
                            return Ok(dest.reg);
                        }
                        Some(dest) => {
                            self.emit_ab(OpCode::Move, dest.reg, reg);
                            dest.reg
                        }
                    };
                    self.emit_abc(op, reg, reg, one);
                    self.set_free_register(saved);
                    return Ok(result);
                }
                Binding::Upvalue(_) | Binding::Global => {}
            }
        } else if !update.target.is_assignable() {
            return Err(self.error(CompileErrorKind::NotAssignable(describe(&update.target))));
        }

        let old = self.temp()?;
        self.expression(&update.target, Some(Dest::to(old)))?;
        let new = self.temp()?;
        let one = self.constant_rk(Value::Number(1.0), new)?;
        self.emit_abc(op, new, old, one);
        self.assign(&update.target, new)?;

        let result = match dest {
            Some(dest) => {
                let value = if update.prefix { new } else { old };
                self.emit_ab(OpCode::Move, dest.reg, value);
                dest.reg
            }
            None => new,
        };
        self.set_free_register(saved);
        Ok(result)
    }
}

/// True when evaluating `expr` may assign local `name`: an update of
/// it, or a call that can reach it through a captured cell.
fn writes_local(expr: &Expression, name: &str, captured: bool) -> bool {
    let writes = |expr: &Expression| writes_local(expr, name, captured);
    match &expr.kind {
        ExpressionKind::Nil
        | ExpressionKind::Bool(_)
        | ExpressionKind::Number(_)
        | ExpressionKind::String(_)
        | ExpressionKind::Identifier(_) => false,
        // a literal capturing the name may be called right away
        ExpressionKind::Function(_) => true,
        ExpressionKind::Array(items) => items.iter().any(writes),
        ExpressionKind::Object(fields) => fields.iter().any(|field| writes(&field.value)),
        ExpressionKind::Selector(selector) => writes(&selector.object),
        ExpressionKind::Subscript(subscript) => {
            writes(&subscript.object) || writes(&subscript.index)
        }
        ExpressionKind::Call(call) => {
            captured || writes(&call.callee) || call.args.iter().any(writes)
        }
        ExpressionKind::Unary(unary) => writes(&unary.operand),
        ExpressionKind::Update(update) => match &update.target.kind {
            ExpressionKind::Identifier(target) => target == name,
            _ => writes(&update.target),
        },
        ExpressionKind::Binary(binary) => writes(&binary.left) || writes(&binary.right),
        ExpressionKind::Ternary(ternary) => {
            writes(&ternary.condition)
                || writes(&ternary.then_value)
                || writes(&ternary.else_value)
        }
        ExpressionKind::Spread(inner) => writes(inner),
    }
}

/// Names an expression shape for error messages.
pub(super) fn describe(expr: &Expression) -> String {
    match &expr.kind {
        ExpressionKind::Nil
        | ExpressionKind::Bool(_)
        | ExpressionKind::Number(_)
        | ExpressionKind::String(_) => "a literal".to_string(),
        ExpressionKind::Identifier(name) => format!("'{}'", name),
        ExpressionKind::Array(_) => "an array literal".to_string(),
        ExpressionKind::Object(_) => "an object literal".to_string(),
        ExpressionKind::Function(_) => "a function literal".to_string(),
        ExpressionKind::Selector(_) | ExpressionKind::Subscript(_) => {
            format!("'{}'", expr.dotted_name())
        }
        ExpressionKind::Call(_) => "a function call".to_string(),
        ExpressionKind::Spread(_) => "a spread".to_string(),
        ExpressionKind::Unary(_)
        | ExpressionKind::Update(_)
        | ExpressionKind::Binary(_)
        | ExpressionKind::Ternary(_) => "an operator expression".to_string(),
    }
}
