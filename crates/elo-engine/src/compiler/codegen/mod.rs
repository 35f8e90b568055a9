//! Code generation from AST to register bytecode.
//!
//! The `Compiler` walks the tree once. Every expression visit receives a
//! destination ([`Dest`]) naming the register the caller wants the value
//! in, and answers with the operand that actually holds it. When the
//! destination allows propagation, constants come back as constant-pool
//! operands and locals as their own register, so arithmetic reads them
//! in place instead of copying.
//!
//! ## Structure
//!
//! - `scope` - Block tree, name bindings and loop bookkeeping
//! - `fold` - Constant folding
//! - `expressions` - Expression visitors
//! - `statements` - Statement visitors and control flow
//!
//! ## Register discipline
//!
//! Registers are allocated in stack order from the current block's
//! cursor. A statement records the cursor on entry and restores it on
//! exit, so temporaries never outlive the statement that created them.
//! Declared locals move the cursor permanently for the rest of their
//! block.

mod expressions;
mod fold;
mod scope;
mod statements;


pub use scope::{BlockContext, BlockId, LoopInfo, NameInfo, Resolved, Scope, ScopeKind};

use crate::ast::*;
use crate::compiler::bytecode::{
    Instruction, MAX_A, MAX_BX, MAX_REGISTERS, OpCode, SBX_BIAS, constant_operand,
};
use crate::compiler::proto::{FuncProto, UpvalueDesc};
use crate::error::{CompileError, CompileErrorKind};
use crate::runtime::Value;
use std::sync::Arc;
use tracing::debug;

type CompileResult<T> = Result<T, CompileError>;

/// Upvalues one closure may capture.
const MAX_UPVALUES: usize = MAX_A as usize;

/// Where an expression should leave its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Dest {
    /// First result register
    pub reg: u32,
    /// One past the last result register; calls and spreads fill the
    /// whole window
    pub end: u32,
    /// The caller only reads the value, so a constant operand or a
    /// local's own register may be returned instead of `reg`
    pub propagate: bool,
}

impl Dest {
    /// The value must end up in `reg`.
    pub fn to(reg: u32) -> Self {
        Self {
            reg,
            end: reg + 1,
            propagate: false,
        }
    }

    /// Any readable operand will do; `reg` is available as scratch.
    pub fn operand(reg: u32) -> Self {
        Self {
            reg,
            end: reg + 1,
            propagate: true,
        }
    }

    /// Values fill `reg..end`.
    pub fn window(reg: u32, end: u32) -> Self {
        Self {
            reg,
            end,
            propagate: false,
        }
    }

    /// Number of registers in the window.
    pub fn width(&self) -> u32 {
        self.end - self.reg
    }
}

/// A resolved name at its use site.
#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Constant(Value),
    Local(u32),
    Upvalue(u32),
    Global,
}

/// A function being compiled.
#[derive(Debug, Default)]
struct FunctionState {
    proto: FuncProto,
    /// Captured names keyed by the block that declared them, in upvalue
    /// index order
    captures: Vec<(String, BlockId)>,
}

/// Compiles a parsed program into a tree of function prototypes.
pub struct Compiler {
    file: String,
    scope: Scope,
    current: FunctionState,
    enclosing: Vec<FunctionState>,
    line: u32,
    toplevel_globals: bool,
}

impl Compiler {
    /// Creates a compiler for source named `file`.
    pub fn new(file: impl Into<String>) -> Self {
        let file = file.into();
        Self {
            current: FunctionState {
                proto: FuncProto::new(file.clone()),
                captures: Vec::new(),
            },
            file,
            scope: Scope::new(),
            enclosing: Vec::new(),
            line: 1,
            toplevel_globals: false,
        }
    }

    /// Makes declarations in the main chunk's outermost block define
    /// globals instead of locals, so they outlive one compilation.
    /// The REPL compiles each input this way.
    pub fn with_toplevel_globals(mut self, enabled: bool) -> Self {
        self.toplevel_globals = enabled;
        self
    }

    /// Compiles `program` into the main chunk's prototype.
    ///
    /// If the last statement is an expression, the main chunk returns
    /// its value.
    pub fn compile(mut self, program: &Program) -> CompileResult<Arc<FuncProto>> {
        if let Some((last, init)) = program.body.split_last() {
            for stmt in init {
                self.statement(stmt)?;
            }
            match &last.kind {
                StatementKind::Expression(expr) => {
                    self.line = last.line;
                    let saved = self.free_register();
                    let reg = self.register_operand(expr)?;
                    self.emit_ab(OpCode::Return, reg, 1);
                    self.set_free_register(saved);
                }
                _ => self.statement(last)?,
            }
        }
        self.return_guard();

        let proto = self.current.proto;
        debug!(
            "Compiled main chunk of {} ({} constants, {} instructions, {} functions)",
            proto.source,
            proto.num_constants(),
            proto.num_code(),
            proto.num_protos()
        );
        Ok(Arc::new(proto))
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn error(&self, kind: CompileErrorKind) -> CompileError {
        CompileError {
            file: self.file.clone(),
            line: self.line,
            kind,
        }
    }

    fn check<T>(&self, result: Result<T, CompileErrorKind>) -> CompileResult<T> {
        result.map_err(|kind| self.error(kind))
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.current.proto.emit(instr, self.line)
    }

    fn emit_abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> usize {
        self.emit(Instruction::abc(op, a, b, c))
    }

    fn emit_ab(&mut self, op: OpCode, a: u32, b: u32) -> usize {
        self.emit(Instruction::ab(op, a, b))
    }

    fn emit_abx(&mut self, op: OpCode, a: u32, bx: u32) -> usize {
        self.emit(Instruction::abx(op, a, bx))
    }

    /// Index the next instruction will get.
    fn label(&self) -> usize {
        self.current.proto.num_code()
    }

    /// Emits a jump to be patched later.
    fn emit_jump(&mut self, op: OpCode, a: u32) -> usize {
        self.emit(Instruction::asbx(op, a, 0))
    }

    /// Emits a jump to an already known label.
    fn emit_jump_to(&mut self, op: OpCode, a: u32, target: usize) -> CompileResult<usize> {
        let at = self.emit_jump(op, a);
        self.patch_jump(at, target)?;
        Ok(at)
    }

    /// Points the jump at `at` to `target`.
    ///
    /// The VM has already advanced past the jump when it applies the
    /// offset, so the distance is measured from `at + 1`.
    fn patch_jump(&mut self, at: usize, target: usize) -> CompileResult<()> {
        let offset = target as i64 - (at as i64 + 1);
        if offset < -(SBX_BIAS as i64) || offset > MAX_BX as i64 - SBX_BIAS as i64 {
            return Err(self.error(CompileErrorKind::JumpOutOfRange));
        }
        let instr = self.current.proto.code[at];
        let op = instr.opcode().unwrap_or(OpCode::Jmp);
        self.current.proto.code[at] = Instruction::asbx(op, instr.a(), offset as i32);
        Ok(())
    }

    /// Patches a list of jumps to `target`.
    fn patch_jumps(&mut self, jumps: &[usize], target: usize) -> CompileResult<()> {
        for &at in jumps {
            self.patch_jump(at, target)?;
        }
        Ok(())
    }

    /// Appends `RETURN 0 0` unless the code already ends in a return.
    fn return_guard(&mut self) {
        if self.current.proto.last_opcode() != Some(OpCode::Return) {
            self.emit_ab(OpCode::Return, 0, 0);
        }
    }

    // ========================================================================
    // Registers and constants
    // ========================================================================

    fn free_register(&self) -> u32 {
        self.scope.register()
    }

    fn set_free_register(&mut self, register: u32) {
        self.scope.set_register(register);
    }

    /// Ensures registers below `end` are reserved.
    fn claim(&mut self, end: u32) -> CompileResult<()> {
        if end as usize > MAX_REGISTERS {
            return Err(self.error(CompileErrorKind::TooManyRegisters));
        }
        if end > self.free_register() {
            self.set_free_register(end);
        }
        let proto = &mut self.current.proto;
        proto.max_registers = proto.max_registers.max(end as usize);
        Ok(())
    }

    /// Reserves one scratch register.
    fn temp(&mut self) -> CompileResult<u32> {
        self.reserve(1)
    }

    /// Reserves `count` consecutive registers.
    fn reserve(&mut self, count: u32) -> CompileResult<u32> {
        let base = self.free_register();
        self.claim(base + count)?;
        Ok(base)
    }

    /// Picks the base for an instruction sequence that writes `reg`
    /// through `reg + width` and scratch registers beyond. Returns `reg`
    /// when nothing live sits above the window, otherwise fresh
    /// registers the caller must move the results from.
    fn staging_base(&mut self, reg: u32, width: u32) -> CompileResult<u32> {
        if reg + width >= self.free_register() {
            self.claim(reg + width)?;
            Ok(reg)
        } else {
            self.reserve(width)
        }
    }

    fn declare_local(&mut self, name: &str) -> CompileResult<u32> {
        let declared = self.scope.declare_local(name);
        let reg = self.check(declared)?;
        self.claim(reg + 1)?;
        Ok(reg)
    }

    fn constant(&mut self, value: Value) -> CompileResult<u32> {
        match self.current.proto.add_constant(value) {
            Some(index) => Ok(index as u32),
            None => Err(self.error(CompileErrorKind::TooManyConstants)),
        }
    }

    fn load_constant(&mut self, value: Value, reg: u32) -> CompileResult<()> {
        let index = self.constant(value)?;
        self.emit_abx(OpCode::LoadConst, reg, index);
        Ok(())
    }

    /// A constant as an RK operand, loaded into `reg` when its pool
    /// index is too large for a B/C field.
    fn constant_rk(&mut self, value: Value, reg: u32) -> CompileResult<u32> {
        let index = self.constant(value)?;
        match constant_operand(index as usize) {
            Some(operand) => Ok(operand),
            None => {
                self.emit_abx(OpCode::LoadConst, reg, index);
                Ok(reg)
            }
        }
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Function nesting depth of the code being compiled (0 is main).
    fn depth(&self) -> usize {
        self.enclosing.len()
    }

    fn function_mut(&mut self, depth: usize) -> &mut FunctionState {
        if depth == self.enclosing.len() {
            &mut self.current
        } else {
            &mut self.enclosing[depth]
        }
    }

    fn lookup(&mut self, name: &str) -> CompileResult<Binding> {
        Ok(match self.scope.resolve(name) {
            Resolved::Constant(value) => Binding::Constant(value),
            Resolved::Local(reg) => Binding::Local(reg),
            Resolved::Ref { register, owner } => {
                Binding::Upvalue(self.capture(self.depth(), name, owner, register)?)
            }
            Resolved::Global => Binding::Global,
        })
    }

    /// Returns the upvalue index of `name` in the function at `depth`,
    /// threading the capture through every function in between.
    fn capture(&mut self, depth: usize, name: &str, owner: BlockId, register: u32) -> CompileResult<u32> {
        let existing = self
            .function_mut(depth)
            .captures
            .iter()
            .position(|(captured, block)| captured == name && *block == owner);
        if let Some(index) = existing {
            return Ok(index as u32);
        }

        let owner_depth = self.scope.block(owner).function;
        let (in_register, index) = if owner_depth + 1 == depth {
            (true, register)
        } else {
            (false, self.capture(depth - 1, name, owner, register)?)
        };

        if self.function_mut(depth).captures.len() >= MAX_UPVALUES {
            return Err(self.error(CompileErrorKind::TooManyUpvalues));
        }
        let state = self.function_mut(depth);
        state.captures.push((name.to_string(), owner));
        state.proto.upvalues.push(UpvalueDesc {
            name: name.to_string(),
            in_register,
            index,
        });
        Ok((state.captures.len() - 1) as u32)
    }

    /// True while compiling the main chunk's outermost block.
    fn at_toplevel(&self) -> bool {
        self.depth() == 0 && self.scope.current().parent.is_none()
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Compiles a function literal into a nested prototype and returns
    /// its index in the enclosing prototype.
    fn function(&mut self, literal: &FunctionLiteral) -> CompileResult<u32> {
        let mut proto = FuncProto::new(self.file.clone());
        proto.name = literal.display_name();
        proto.num_params = literal.params.len();

        let parent = std::mem::replace(
            &mut self.current,
            FunctionState {
                proto,
                captures: Vec::new(),
            },
        );
        self.enclosing.push(parent);
        self.scope.enter(BlockContext::Function, self.depth());

        // the receiver sits below the parameters
        self.declare_local("this")?;
        for param in &literal.params {
            self.declare_local(param)?;
        }
        self.statements(&literal.body.statements)?;
        self.return_guard();

        self.scope.leave();
        let parent = self.enclosing.pop().unwrap_or_default();
        let child = std::mem::replace(&mut self.current, parent);
        let proto = child.proto;

        debug!(
            "Compiled function {} ({} constants, {} instructions, {} upvalues)",
            proto.name.as_deref().unwrap_or("<anonymous>"),
            proto.num_constants(),
            proto.num_code(),
            proto.upvalues.len()
        );

        let index = self.current.proto.num_protos();
        if index > MAX_BX as usize {
            return Err(self.error(CompileErrorKind::TooManyFunctions));
        }
        self.current.proto.protos.push(Arc::new(proto));
        Ok(index as u32)
    }
}

/// Compiles a parsed program.
pub fn compile(program: &Program, file: &str) -> Result<Arc<FuncProto>, CompileError> {
    Compiler::new(file).compile(program)
}
