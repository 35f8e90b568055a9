//! Statement compilation.
//!
//! ## Control flow
//!
//! Forward jumps are emitted with a zero offset and patched once the
//! target is known. Backward jumps go to labels recorded before the
//! loop body, so they are emitted complete.
//!
//! ```text
//! if cond { then } else { else }
//!
//!     [cond -> rC]
//!     JMPFALSE rC -> else
//!     [then]
//!     JMP -> end
//! else:
//!     [else]
//! end:
//! ```
//!
//! ```text
//! for init; cond; step { body }
//!
//!     [init]
//! test:
//!     [cond -> rC]
//!     JMPFALSE rC -> exit
//!     [body]
//! continue:
//!     CLOSE rBase               ; only when the loop's locals are captured
//!     [step]
//!     JMP -> test
//! exit:
//!     CLOSE rBase
//! ```
//!
//! `for k, v in coll` reserves six registers: the iteration source and
//! its length, the key and the running index, the value and the
//! collection.
//!
//! ```text
//!     [coll -> rCol]
//!     FORBEGIN rSrc rCol        ; rSrc = array or sorted keys, rLen = count
//!     LOADCONST rIdx 0
//! test:
//!     LT rKey rIdx rLen
//!     JMPFALSE rKey -> exit
//!     FORITER rKey rCol rSrc    ; rKey = key at rIdx, rIdx += 1
//!     GET rVal rCol rKey
//!     [body]
//! continue:
//!     CLOSE rSrc                ; only when the loop's locals are captured
//!     JMP -> test
//! exit:
//!     CLOSE rSrc
//! ```

use super::expressions::describe;
use super::{BlockContext, Binding, CompileResult, Compiler, Dest};
use crate::ast::*;
use crate::compiler::bytecode::OpCode;
use crate::error::CompileErrorKind;
use crate::runtime::Value;

impl Compiler {
    pub(super) fn statements(&mut self, statements: &[Statement]) -> CompileResult<()> {
        for stmt in statements {
            self.statement(stmt)?;
        }
        Ok(())
    }

    pub(super) fn statement(&mut self, stmt: &Statement) -> CompileResult<()> {
        self.line = stmt.line;
        let saved = self.free_register();

        match &stmt.kind {
            StatementKind::Expression(expr) => {
                match &expr.kind {
                    ExpressionKind::Update(update) => self.update(update, None)?,
                    _ => self.expression(expr, None)?,
                };
            }
            StatementKind::Declaration(decl) => return self.declaration(decl),
            StatementKind::Assignment(assign) => self.assignment(assign)?,
            StatementKind::Function(literal) => return self.function_declaration(literal),
            StatementKind::Branch(kind) => self.branch(*kind)?,
            StatementKind::Return(values) => self.return_statement(values)?,
            StatementKind::If(if_stmt) => self.if_statement(if_stmt)?,
            StatementKind::For(for_stmt) => self.for_statement(for_stmt)?,
            StatementKind::ForIn(for_in) => self.for_in_statement(for_in)?,
            StatementKind::Block(block) => self.block(block)?,
        }

        self.set_free_register(saved);
        Ok(())
    }

    /// Compiles a nested block in its own scope.
    fn block(&mut self, block: &Block) -> CompileResult<()> {
        self.scope.enter(BlockContext::Branch, self.depth());
        self.statements(&block.statements)?;
        self.leave_block()
    }

    /// Leaves the current block, patching pending loop jumps.
    ///
    /// Cells captured from the block's registers are closed first, so
    /// later statements can reuse those registers.
    fn leave_block(&mut self) -> CompileResult<()> {
        if self.scope.needs_close() {
            let base = self.scope.current().base;
            self.emit_ab(OpCode::Close, base, 0);
        }
        if let Some(info) = self.scope.leave() {
            if let Some(target) = info.continue_target {
                self.patch_jumps(&info.continues, target)?;
            }
            if let Some(target) = info.break_target {
                self.patch_jumps(&info.breaks, target)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Declarations and assignments
    // ========================================================================

    /// Evaluates `values` into `count` registers from `base`.
    ///
    /// A trailing call or spread widens to fill the remaining registers;
    /// otherwise missing values are nil. Values beyond `count` are still
    /// evaluated for their effects.
    fn values_into(&mut self, values: &[Expression], base: u32, count: u32) -> CompileResult<()> {
        let end = base + count;
        self.claim(end)?;

        let mut filled = 0;
        for (i, value) in values.iter().enumerate() {
            let reg = base + i as u32;
            let is_last = i + 1 == values.len();

            if reg >= end {
                self.expression(value, None)?;
                self.set_free_register(end);
                continue;
            }
            if !is_last && matches!(value.kind, ExpressionKind::Spread(_)) {
                self.line = value.line;
                return Err(self.error(CompileErrorKind::InvalidSpread));
            }

            let window_end = if is_last && value.is_multi_value() { end } else { reg + 1 };
            self.multi_value(value, Dest::window(reg, window_end))?;
            filled = window_end - base;
        }

        if filled < count {
            self.emit_ab(OpCode::LoadNil, base + filled, end - 1);
        }
        Ok(())
    }

    fn declaration(&mut self, decl: &Declaration) -> CompileResult<()> {
        if decl.kind == DeclarationKind::Const {
            for (i, name) in decl.names.iter().enumerate() {
                let Some(value) = decl.values.get(i) else {
                    return Err(self.error(CompileErrorKind::ConstWithoutInitializer(name.clone())));
                };
                let Some(folded) = self.fold(value) else {
                    return Err(self.error(CompileErrorKind::ConstNotConstant(name.clone())));
                };
                let declared = self.scope.declare_constant(name, folded);
                self.check(declared)?;
            }
            return Ok(());
        }

        let base = self.free_register();
        let count = decl.names.len() as u32;
        self.values_into(&decl.values, base, count)?;

        if self.toplevel_globals && self.at_toplevel() {
            for (i, name) in decl.names.iter().enumerate() {
                self.set_global(name, base + i as u32)?;
            }
            self.set_free_register(base);
            return Ok(());
        }

        // the values already sit where the new locals will be allocated
        self.set_free_register(base);
        for name in &decl.names {
            self.declare_local(name)?;
        }
        Ok(())
    }

    fn set_global(&mut self, name: &str, reg: u32) -> CompileResult<()> {
        let key = self.constant(Value::from(name))?;
        self.emit_abx(OpCode::SetGlobal, reg, key);
        Ok(())
    }

    fn assignment(&mut self, assign: &Assignment) -> CompileResult<()> {
        match assign.operator {
            AssignOperator::Assign => self.assign_values(&assign.targets, &assign.values),
            AssignOperator::Compound(operator) => {
                let (Some(target), Some(value)) = (assign.targets.first(), assign.values.first())
                else {
                    return Ok(());
                };
                // x op= y is x = x op y
                let combined = Expression::new(
                    ExpressionKind::Binary(BinaryExpression {
                        operator,
                        left: Box::new(target.clone()),
                        right: Box::new(value.clone()),
                    }),
                    value.line,
                );
                self.assign_values(std::slice::from_ref(target), std::slice::from_ref(&combined))
            }
        }
    }

    fn assign_values(&mut self, targets: &[Expression], values: &[Expression]) -> CompileResult<()> {
        if let Some(target) = targets.iter().find(|target| !target.is_assignable()) {
            return Err(self.error(CompileErrorKind::NotAssignable(describe(target))));
        }

        // a lone local target can take a value that reads all its
        // operands before writing
        if let ([target], [value]) = (targets, values) {
            if let ExpressionKind::Identifier(name) = &target.kind {
                if writes_in_place(value) {
                    if let Binding::Local(reg) = self.lookup(name)? {
                        self.expression(value, Some(Dest::to(reg)))?;
                        return Ok(());
                    }
                }
            }
        }

        let base = self.free_register();
        self.values_into(values, base, targets.len() as u32)?;
        for (i, target) in targets.iter().enumerate() {
            self.assign(target, base + i as u32)?;
        }
        Ok(())
    }

    /// Stores register `value` into an assignable expression.
    pub(super) fn assign(&mut self, target: &Expression, value: u32) -> CompileResult<()> {
        let saved = self.free_register();

        match &target.kind {
            ExpressionKind::Identifier(name) => match self.lookup(name)? {
                Binding::Constant(_) => {
                    return Err(self.error(CompileErrorKind::ConstAssignment(name.clone())));
                }
                Binding::Local(reg) => {
                    if reg != value {
                        self.emit_ab(OpCode::Move, reg, value);
                    }
                }
                Binding::Upvalue(index) => {
                    self.emit_abx(OpCode::SetRef, value, index);
                }
                Binding::Global => self.set_global(name, value)?,
            },
            ExpressionKind::Selector(selector) => {
                let object = self.register_operand(&selector.object)?;
                let scratch = self.temp()?;
                let key = self.constant_rk(Value::from(selector.field.as_str()), scratch)?;
                self.emit_abc(OpCode::Set, object, key, value);
            }
            ExpressionKind::Subscript(subscript) => {
                let object = self.register_operand(&subscript.object)?;
                let key = self.operand(&subscript.index)?;
                self.emit_abc(OpCode::Set, object, key, value);
            }
            _ => return Err(self.error(CompileErrorKind::NotAssignable(describe(target)))),
        }

        self.set_free_register(saved);
        Ok(())
    }

    fn function_declaration(&mut self, literal: &FunctionLiteral) -> CompileResult<()> {
        match &literal.name {
            Some(FunctionName::Simple(name)) if !(self.toplevel_globals && self.at_toplevel()) => {
                // declared first so the body can call itself
                let reg = self.declare_local(name)?;
                let index = self.function(literal)?;
                self.emit_abx(OpCode::Func, reg, index);
            }
            Some(FunctionName::Simple(name)) => {
                let saved = self.free_register();
                let reg = self.temp()?;
                let index = self.function(literal)?;
                self.emit_abx(OpCode::Func, reg, index);
                self.set_global(name, reg)?;
                self.set_free_register(saved);
            }
            Some(FunctionName::Path(path)) => {
                let saved = self.free_register();
                let reg = self.temp()?;
                let index = self.function(literal)?;
                self.emit_abx(OpCode::Func, reg, index);
                self.assign(path, reg)?;
                self.set_free_register(saved);
            }
            None => {
                let saved = self.free_register();
                let reg = self.temp()?;
                let index = self.function(literal)?;
                self.emit_abx(OpCode::Func, reg, index);
                self.set_free_register(saved);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn branch(&mut self, kind: BranchKind) -> CompileResult<()> {
        let at = self.label();
        let in_loop = match self.scope.enclosing_loop() {
            Some(info) => {
                match kind {
                    BranchKind::Break => info.breaks.push(at),
                    BranchKind::Continue => info.continues.push(at),
                }
                true
            }
            None => false,
        };
        if !in_loop {
            return Err(self.error(CompileErrorKind::OutsideLoop(kind)));
        }
        self.emit_jump(OpCode::Jmp, 0);
        Ok(())
    }

    fn return_statement(&mut self, values: &[Expression]) -> CompileResult<()> {
        match values {
            [] => {
                self.emit_ab(OpCode::Return, 0, 0);
            }
            [value] if !matches!(value.kind, ExpressionKind::Spread(_)) => {
                let reg = self.register_operand(value)?;
                self.emit_ab(OpCode::Return, reg, 1);
            }
            _ => {
                let base = self.free_register();
                let count = values.len() as u32;
                self.values_into(values, base, count)?;
                self.emit_ab(OpCode::Return, base, count);
            }
        }
        Ok(())
    }

    fn if_statement(&mut self, stmt: &IfStatement) -> CompileResult<()> {
        if let Some(init) = &stmt.init {
            self.scope.enter(BlockContext::Branch, self.depth());
            self.statement(init)?;
        }

        let saved = self.free_register();
        self.line = stmt.condition.line;
        let condition = self.register_operand(&stmt.condition)?;
        let to_else = self.emit_jump(OpCode::JmpFalse, condition);
        self.set_free_register(saved);

        self.block(&stmt.then_branch)?;

        match &stmt.else_branch {
            Some(else_branch) => {
                let to_end = self.emit_jump(OpCode::Jmp, 0);
                let else_label = self.label();
                self.patch_jump(to_else, else_label)?;
                self.statement(else_branch)?;
                let end = self.label();
                self.patch_jump(to_end, end)?;
            }
            None => {
                let end = self.label();
                self.patch_jump(to_else, end)?;
            }
        }

        if stmt.init.is_some() {
            self.leave_block()?;
        }
        Ok(())
    }

    fn for_statement(&mut self, stmt: &ForStatement) -> CompileResult<()> {
        self.scope.enter(BlockContext::Loop, self.depth());
        if let Some(init) = &stmt.init {
            self.statement(init)?;
        }

        let test = self.label();
        let exit_jump = match &stmt.condition {
            Some(condition) => {
                let saved = self.free_register();
                self.line = condition.line;
                let reg = self.register_operand(condition)?;
                let jump = self.emit_jump(OpCode::JmpFalse, reg);
                self.set_free_register(saved);
                Some(jump)
            }
            None => None,
        };

        self.block(&stmt.body)?;

        let continue_label = self.label();
        self.close_loop_registers();
        if let Some(step) = &stmt.step {
            self.statement(step)?;
        }
        self.emit_jump_to(OpCode::Jmp, 0, test)?;

        let exit = self.label();
        if let Some(jump) = exit_jump {
            self.patch_jump(jump, exit)?;
        }
        self.close_loop_registers();
        self.scope.set_loop_targets(continue_label, exit);
        self.leave_block()
    }

    /// Closes the cells captured from the current loop's registers, so
    /// every iteration captures fresh ones.
    fn close_loop_registers(&mut self) {
        let block = self.scope.current();
        if block.captures {
            let base = block.base;
            self.emit_ab(OpCode::Close, base, 0);
        }
    }

    fn for_in_statement(&mut self, stmt: &ForInStatement) -> CompileResult<()> {
        self.scope.enter(BlockContext::Loop, self.depth());

        let base = self.reserve(6)?;
        let (source, length, key, index, value, collection) =
            (base, base + 1, base + 2, base + 3, base + 4, base + 5);

        self.expression(&stmt.collection, Some(Dest::to(collection)))?;
        self.emit_ab(OpCode::ForBegin, source, collection);
        self.load_constant(Value::Number(0.0), index)?;

        let test = self.label();
        self.emit_abc(OpCode::Lt, key, index, length);
        let exit_jump = self.emit_jump(OpCode::JmpFalse, key);
        self.emit_abc(OpCode::ForIter, key, collection, source);
        self.emit_abc(OpCode::Get, value, collection, key);

        let declared = match &stmt.value {
            Some(value_name) => self
                .scope
                .declare_register(&stmt.key, key)
                .and_then(|()| self.scope.declare_register(value_name, value)),
            None => self.scope.declare_register(&stmt.key, value),
        };
        self.check(declared)?;

        self.block(&stmt.body)?;
        let continue_label = self.label();
        self.close_loop_registers();
        self.emit_jump_to(OpCode::Jmp, 0, test)?;

        let exit = self.label();
        self.patch_jump(exit_jump, exit)?;
        self.close_loop_registers();
        self.scope.set_loop_targets(continue_label, exit);
        self.leave_block()
    }
}

/// True for values that read every operand before writing their
/// destination.
fn writes_in_place(expr: &Expression) -> bool {
    match &expr.kind {
        ExpressionKind::Nil
        | ExpressionKind::Bool(_)
        | ExpressionKind::Number(_)
        | ExpressionKind::String(_)
        | ExpressionKind::Identifier(_)
        | ExpressionKind::Unary(_) => true,
        ExpressionKind::Binary(binary) => {
            !matches!(binary.operator, BinaryOperator::And | BinaryOperator::Or)
        }
        _ => false,
    }
}
