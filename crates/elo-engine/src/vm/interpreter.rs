//! The bytecode interpreter.
//!
//! All frames share one register buffer. A frame owns the window
//! `base..base + window`, where the window is its prototype's register
//! count, and a callee's window starts right after its caller's.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::arithmetic::{self, ArithOp};
use super::comparison::{self, CompareOp};
use crate::compiler::FuncProto;
use crate::compiler::bytecode::{CALL_STACK_SIZE, CONST_OFFSET, Instruction, OpCode, is_constant};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::runtime::{
    Array, Callable, Closure, HostCall, HostFn, Object, Upvalue, UpvalueRef, Value, ValueKind,
};

type Step<T> = Result<T, RuntimeErrorKind>;

/// VM settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum call depth, at most [`CALL_STACK_SIZE`]
    pub call_stack_size: usize,
    /// Log every dispatched instruction at trace level
    pub trace_execution: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            call_stack_size: CALL_STACK_SIZE,
            trace_execution: false,
        }
    }
}

impl VmConfig {
    /// Sets the call depth limit, clamped to `1..=CALL_STACK_SIZE`.
    pub fn with_call_stack_size(mut self, size: usize) -> Self {
        self.call_stack_size = size.clamp(1, CALL_STACK_SIZE);
        self
    }

    /// Enables instruction tracing.
    pub fn with_trace_execution(mut self, enabled: bool) -> Self {
        self.trace_execution = enabled;
        self
    }
}

/// An active function invocation.
#[derive(Debug)]
struct CallFrame {
    proto: Arc<FuncProto>,
    upvalues: Vec<UpvalueRef>,
    /// First register of the window
    base: usize,
    /// Registers in the window
    window: usize,
    /// Next instruction
    pc: usize,
    /// Absolute register the caller wants results in
    result_base: usize,
    /// Results the caller asked for
    num_results: usize,
}

/// The register virtual machine.
///
/// A VM owns its globals, so values defined by one `run` stay visible
/// to the next.
#[derive(Debug)]
pub struct Vm {
    config: VmConfig,
    registers: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: FxHashMap<String, Value>,
    /// Cells still aliasing a live register
    open_upvalues: Vec<UpvalueRef>,
}

impl Vm {
    /// Creates a VM with no globals defined.
    pub fn new(config: VmConfig) -> Self {
        let config = VmConfig {
            call_stack_size: config.call_stack_size.clamp(1, CALL_STACK_SIZE),
            ..config
        };
        Self {
            config,
            registers: Vec::with_capacity(256),
            frames: Vec::with_capacity(16),
            globals: FxHashMap::default(),
            open_upvalues: Vec::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Defines a host function as a global.
    pub fn register_host(&mut self, name: &str, func: HostFn) {
        let callable = Callable::host(name, func);
        self.globals
            .insert(name.to_string(), Value::Function(Arc::new(callable)));
    }

    /// Sets a global.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Reads a global.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Names of all defined globals, sorted.
    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs a main chunk and returns the value it returns.
    pub fn run(&mut self, proto: Arc<FuncProto>) -> Result<Value, RuntimeError> {
        debug!(
            "Running {} ({} instructions)",
            proto.source,
            proto.num_code()
        );

        let entry = self.frames.len();
        if let Err(kind) = self.push_frame(Arc::clone(&proto), Vec::new(), 0, 1) {
            return Err(RuntimeError {
                file: proto.source.clone(),
                line: 0,
                kind,
            });
        }

        let result = self.execute(entry);
        if result.is_err() {
            self.unwind(entry);
        }
        debug!("Finished {} (ok: {})", proto.source, result.is_ok());
        result
    }

    /// Drops the frames of a failed run, closing their captured cells.
    fn unwind(&mut self, entry: usize) {
        if let Some(frame) = self.frames.get(entry) {
            let base = frame.base;
            self.close_upvalues(base);
        }
        self.frames.truncate(entry);
    }

    fn execute(&mut self, entry: usize) -> Result<Value, RuntimeError> {
        loop {
            let frame = self.frame_mut();
            let pc = frame.pc;
            let Some(&instr) = frame.proto.code.get(pc) else {
                // running off the end is an implicit `return`
                if let Some(value) = self.return_values(Vec::new(), entry) {
                    return Ok(value);
                }
                continue;
            };
            frame.pc += 1;

            if self.config.trace_execution {
                trace!(depth = self.frames.len(), pc, "{}", instr);
            }

            match self.step(instr, entry) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(kind) => return Err(self.error_at(pc, kind)),
            }
        }
    }

    fn error_at(&self, pc: usize, kind: RuntimeErrorKind) -> RuntimeError {
        let proto = &self.frame().proto;
        RuntimeError {
            file: proto.source.clone(),
            line: proto.line_at(pc),
            kind,
        }
    }

    /// Executes one instruction. Returns the run's result once the entry
    /// frame returns.
    fn step(&mut self, instr: Instruction, entry: usize) -> Step<Option<Value>> {
        let op = instr
            .opcode()
            .ok_or(RuntimeErrorKind::InvalidInstruction(instr.0))?;
        let a = instr.a() as usize;

        match op {
            OpCode::LoadNil => {
                for reg in a..=instr.b() as usize {
                    self.set(reg, Value::Nil)?;
                }
            }
            OpCode::LoadConst => {
                let value = self.constant(instr, instr.bx() as usize)?;
                self.set(a, value)?;
            }
            OpCode::LoadGlobal => {
                let name = self.global_name(instr)?;
                match self.globals.get(&name).cloned() {
                    Some(value) => self.set(a, value)?,
                    None => return Err(RuntimeErrorKind::UndefinedGlobal(name)),
                }
            }
            OpCode::SetGlobal => {
                let name = self.global_name(instr)?;
                let value = self.reg(a)?;
                self.globals.insert(name, value);
            }
            OpCode::LoadRef => {
                let cell = self.upvalue(instr)?;
                let value = match &*cell.lock() {
                    Upvalue::Open(slot) => self.registers[*slot].clone(),
                    Upvalue::Closed(value) => value.clone(),
                };
                self.set(a, value)?;
            }
            OpCode::SetRef => {
                let cell = self.upvalue(instr)?;
                let value = self.reg(a)?;
                match &mut *cell.lock() {
                    Upvalue::Open(slot) => self.registers[*slot] = value,
                    Upvalue::Closed(closed) => *closed = value,
                }
            }
            OpCode::Neg => {
                let value = self.rk(instr, instr.bx())?;
                self.set(a, arithmetic::negate(&value)?)?;
            }
            OpCode::Not => {
                let value = self.rk(instr, instr.bx())?;
                self.set(a, arithmetic::not(&value))?;
            }
            OpCode::Cmpl => {
                let value = self.rk(instr, instr.bx())?;
                self.set(a, arithmetic::complement(&value)?)?;
            }
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor => {
                let arith =
                    ArithOp::from_opcode(op).ok_or(RuntimeErrorKind::InvalidInstruction(instr.0))?;
                let left = self.rk(instr, instr.b())?;
                let right = self.rk(instr, instr.c())?;
                self.set(a, arithmetic::binary(arith, &left, &right)?)?;
            }
            OpCode::Lt | OpCode::Le | OpCode::Eq | OpCode::Ne => {
                let compare = CompareOp::from_opcode(op)
                    .ok_or(RuntimeErrorKind::InvalidInstruction(instr.0))?;
                let left = self.rk(instr, instr.b())?;
                let right = self.rk(instr, instr.c())?;
                let result = comparison::compare(compare, &left, &right)?;
                self.set(a, Value::Bool(result))?;
            }
            OpCode::Move => {
                let value = self.reg(instr.b() as usize)?;
                self.set(a, value)?;
            }
            OpCode::Get => {
                let target = self.reg(instr.b() as usize)?;
                let key = self.rk(instr, instr.c())?;
                self.set(a, index(&target, &key)?)?;
            }
            OpCode::Set => {
                let target = self.reg(a)?;
                let key = self.rk(instr, instr.b())?;
                let value = self.rk(instr, instr.c())?;
                store(&target, &key, value)?;
            }
            OpCode::Append => {
                let target = self.reg(a)?;
                let Value::Array(array) = &target else {
                    return Err(RuntimeErrorKind::NotIndexable(target.kind()));
                };
                let count = instr.b() as usize;
                let values = (a + 1..=a + count)
                    .map(|reg| self.reg(reg))
                    .collect::<Step<Vec<_>>>()?;
                array.extend(values);
            }
            OpCode::Unpack => {
                let source = self.reg(a)?;
                let Value::Array(array) = &source else {
                    return Err(RuntimeErrorKind::NotIterable(source.kind()));
                };
                for i in 0..instr.b() as usize {
                    self.set(a + i, array.get(i).unwrap_or_default())?;
                }
            }
            OpCode::Call => self.call(instr, false)?,
            OpCode::CallMethod => self.call(instr, true)?,
            OpCode::Array => self.set(a, Value::Array(Array::new(Vec::new())))?,
            OpCode::Object => self.set(a, Value::Object(Object::new()))?,
            OpCode::Func => {
                let closure = self.closure(instr)?;
                self.set(a, closure)?;
            }
            OpCode::Jmp => self.jump(instr)?,
            OpCode::JmpTrue => {
                if self.rk(instr, instr.a())?.to_bool() {
                    self.jump(instr)?;
                }
            }
            OpCode::JmpFalse => {
                if !self.rk(instr, instr.a())?.to_bool() {
                    self.jump(instr)?;
                }
            }
            OpCode::Return => {
                let values = (a..a + instr.b() as usize)
                    .map(|reg| self.reg(reg))
                    .collect::<Step<Vec<_>>>()?;
                return Ok(self.return_values(values, entry));
            }
            OpCode::ForBegin => {
                let collection = self.reg(instr.b() as usize)?;
                let (source, len) = match &collection {
                    Value::Array(array) => (collection.clone(), array.len()),
                    Value::String(s) => (collection.clone(), s.chars().count()),
                    Value::Object(object) => {
                        let keys: Vec<Value> = object.keys().into_iter().map(Value::from).collect();
                        let len = keys.len();
                        (Value::Array(Array::new(keys)), len)
                    }
                    other => return Err(RuntimeErrorKind::NotIterable(other.kind())),
                };
                self.set(a, source)?;
                self.set(a + 1, Value::Number(len as f64))?;
            }
            OpCode::ForIter => {
                let position = self.reg(a + 1)?.as_number().unwrap_or(0.0);
                let key = match self.reg(instr.b() as usize)? {
                    Value::Object(_) => {
                        let keys = self.reg(instr.c() as usize)?;
                        index(&keys, &Value::Number(position))?
                    }
                    _ => Value::Number(position),
                };
                self.set(a, key)?;
                self.set(a + 1, Value::Number(position + 1.0))?;
            }
            OpCode::Close => {
                let from = self.frame().base + a;
                self.close_upvalues(from);
            }
        }

        Ok(None)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    fn frame(&self) -> &CallFrame {
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn push_frame(
        &mut self,
        proto: Arc<FuncProto>,
        upvalues: Vec<UpvalueRef>,
        result_base: usize,
        num_results: usize,
    ) -> Step<()> {
        if self.frames.len() >= self.config.call_stack_size {
            return Err(RuntimeErrorKind::StackOverflow);
        }

        let base = self.frames.last().map_or(0, |frame| frame.base + frame.window);
        let window = proto.max_registers.max(proto.num_params + 1);
        let end = base + window;
        if self.registers.len() < end {
            self.registers.resize(end, Value::Nil);
        }
        self.registers[base..end].fill(Value::Nil);

        self.frames.push(CallFrame {
            proto,
            upvalues,
            base,
            window,
            pc: 0,
            result_base,
            num_results,
        });
        Ok(())
    }

    /// Pops the current frame and hands `values` to its caller, padded
    /// with nil. Returns the first value once the entry frame is gone.
    fn return_values(&mut self, values: Vec<Value>, entry: usize) -> Option<Value> {
        let Some(frame) = self.frames.pop() else {
            return Some(Value::Nil);
        };
        self.close_upvalues(frame.base);

        if self.frames.len() <= entry {
            return Some(values.into_iter().next().unwrap_or_default());
        }

        let mut values = values.into_iter();
        for slot in frame.result_base..frame.result_base + frame.num_results {
            let value = values.next().unwrap_or_default();
            if let Some(register) = self.registers.get_mut(slot) {
                *register = value;
            }
        }
        None
    }

    /// Calls `R(A)`. Arguments follow the result window; for a method
    /// call the first of them is the receiver.
    fn call(&mut self, instr: Instruction, method: bool) -> Step<()> {
        let a = instr.a() as usize;
        let num_results = instr.b() as usize;
        let first = a + num_results;
        let argc = instr.c() as usize;

        let callable = match self.reg(a)? {
            Value::Function(callable) => callable,
            other => return Err(RuntimeErrorKind::NotCallable(other.kind())),
        };
        let mut args = (first..first + argc)
            .map(|reg| self.reg(reg))
            .collect::<Step<Vec<_>>>()?;
        let receiver = if method && !args.is_empty() {
            args.remove(0)
        } else {
            Value::Nil
        };

        match callable.as_ref() {
            Callable::Host { name, func } => {
                let mut call = HostCall::new(args, num_results);
                func(&mut call).map_err(|message| RuntimeErrorKind::Host {
                    name: name.clone(),
                    message,
                })?;
                for (i, value) in call.into_results().into_iter().enumerate() {
                    self.set(a + i, value)?;
                }
            }
            Callable::Closure(closure) => {
                let result_base = self.frame().base + a;
                self.push_frame(
                    Arc::clone(&closure.proto),
                    closure.upvalues.clone(),
                    result_base,
                    num_results,
                )?;
                // the receiver sits below the parameters
                let base = self.frame().base;
                self.registers[base] = receiver;
                for (i, arg) in args.into_iter().take(closure.proto.num_params).enumerate() {
                    self.registers[base + 1 + i] = arg;
                }
            }
        }
        Ok(())
    }

    fn jump(&mut self, instr: Instruction) -> Step<()> {
        let frame = self.frame_mut();
        let target = frame.pc as i64 + instr.sbx() as i64;
        if target < 0 {
            return Err(RuntimeErrorKind::InvalidInstruction(instr.0));
        }
        frame.pc = target as usize;
        Ok(())
    }

    // ========================================================================
    // Closures
    // ========================================================================

    /// Builds a closure from nested prototype `Bx`.
    fn closure(&mut self, instr: Instruction) -> Step<Value> {
        let proto = self
            .frame()
            .proto
            .protos
            .get(instr.bx() as usize)
            .cloned()
            .ok_or(RuntimeErrorKind::InvalidInstruction(instr.0))?;

        let mut upvalues = Vec::with_capacity(proto.upvalues.len());
        for desc in &proto.upvalues {
            let cell = if desc.in_register {
                let slot = self.frame().base + desc.index as usize;
                self.open_upvalue(slot)
            } else {
                self.frame()
                    .upvalues
                    .get(desc.index as usize)
                    .cloned()
                    .ok_or(RuntimeErrorKind::InvalidInstruction(instr.0))?
            };
            upvalues.push(cell);
        }

        Ok(Value::Function(Arc::new(Callable::Closure(Closure {
            proto,
            upvalues,
        }))))
    }

    /// The open cell aliasing `slot`, shared by every closure capturing it.
    fn open_upvalue(&mut self, slot: usize) -> UpvalueRef {
        let existing = self
            .open_upvalues
            .iter()
            .find(|cell| matches!(*cell.lock(), Upvalue::Open(open) if open == slot));
        if let Some(cell) = existing {
            return Arc::clone(cell);
        }
        let cell = Arc::new(Mutex::new(Upvalue::Open(slot)));
        self.open_upvalues.push(Arc::clone(&cell));
        cell
    }

    /// Closes every open cell at or above register `from`.
    fn close_upvalues(&mut self, from: usize) {
        let registers = &self.registers;
        self.open_upvalues.retain(|cell| {
            let mut cell = cell.lock();
            match *cell {
                Upvalue::Open(slot) if slot >= from => {
                    *cell = Upvalue::Closed(registers[slot].clone());
                    false
                }
                _ => true,
            }
        });
    }

    fn upvalue(&self, instr: Instruction) -> Step<UpvalueRef> {
        self.frame()
            .upvalues
            .get(instr.bx() as usize)
            .cloned()
            .ok_or(RuntimeErrorKind::InvalidInstruction(instr.0))
    }

    // ========================================================================
    // Operands
    // ========================================================================

    fn reg(&self, reg: usize) -> Step<Value> {
        let frame = self.frame();
        if reg >= frame.window {
            return Err(RuntimeErrorKind::RegisterOverflow(reg));
        }
        Ok(self.registers[frame.base + reg].clone())
    }

    fn set(&mut self, reg: usize, value: Value) -> Step<()> {
        let frame = self.frame();
        if reg >= frame.window {
            return Err(RuntimeErrorKind::RegisterOverflow(reg));
        }
        let slot = frame.base + reg;
        self.registers[slot] = value;
        Ok(())
    }

    fn constant(&self, instr: Instruction, index: usize) -> Step<Value> {
        self.frame()
            .proto
            .constants
            .get(index)
            .cloned()
            .ok_or(RuntimeErrorKind::InvalidInstruction(instr.0))
    }

    /// Resolves a register-or-constant operand.
    fn rk(&self, instr: Instruction, operand: u32) -> Step<Value> {
        if is_constant(operand) {
            self.constant(instr, (operand - CONST_OFFSET) as usize)
        } else {
            self.reg(operand as usize)
        }
    }

    fn global_name(&self, instr: Instruction) -> Step<String> {
        match self.constant(instr, instr.bx() as usize)? {
            Value::String(name) => Ok(name),
            _ => Err(RuntimeErrorKind::InvalidInstruction(instr.0)),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

/// `target[key]`.
///
/// Arrays and strings take integer positions; objects take field names
/// and fall back to their parent chain, yielding nil when absent.
fn index(target: &Value, key: &Value) -> Step<Value> {
    match target {
        Value::Array(array) => {
            let at = position(key, array.len(), ValueKind::Array)?;
            Ok(array.get(at).unwrap_or_default())
        }
        Value::String(s) => {
            let at = position(key, s.chars().count(), ValueKind::String)?;
            Ok(s.chars()
                .nth(at)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default())
        }
        Value::Object(object) => Ok(object.get(&field_name(key)).unwrap_or_default()),
        other => Err(RuntimeErrorKind::NotIndexable(other.kind())),
    }
}

/// `target[key] = value`.
fn store(target: &Value, key: &Value, value: Value) -> Step<()> {
    match target {
        Value::Array(array) => {
            let at = position(key, array.len(), ValueKind::Array)?;
            array.set(at, value);
            Ok(())
        }
        Value::Object(object) => {
            object.set(field_name(key), value);
            Ok(())
        }
        other => Err(RuntimeErrorKind::NotIndexable(other.kind())),
    }
}

fn position(key: &Value, len: usize, target: ValueKind) -> Step<usize> {
    match key.as_integer() {
        Some(i) if i >= 0 && (i as usize) < len => Ok(i as usize),
        _ => Err(RuntimeErrorKind::IndexOutOfRange {
            index: key.to_string(),
            target,
        }),
    }
}

fn field_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::Parser;

    fn run_with(vm: &mut Vm, src: &str) -> Result<Value, RuntimeError> {
        let program = Parser::new(src).parse_program().unwrap();
        let proto = compile(&program, "test").unwrap();
        vm.run(proto)
    }

    fn eval(src: &str) -> Result<Value, RuntimeError> {
        run_with(&mut Vm::default(), src)
    }

    fn eval_ok(src: &str) -> Value {
        eval(src).expect("evaluation should succeed")
    }

    fn count_calls(call: &mut HostCall) -> Result<(), String> {
        call.push_result(Value::Number(call.num_args() as f64));
        Ok(())
    }

    fn fail(_call: &mut HostCall) -> Result<(), String> {
        Err("boom".to_string())
    }

    #[test]
    fn test_vm_default_config() {
        let vm = Vm::default();
        assert_eq!(vm.config().call_stack_size, CALL_STACK_SIZE);
        assert!(!vm.config().trace_execution);
        let vm = Vm::new(VmConfig::default().with_call_stack_size(10_000));
        assert_eq!(vm.config().call_stack_size, CALL_STACK_SIZE);
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eq!(eval_ok("1 + 2"), Value::Number(3.0));
        assert_eq!(eval_ok("x := 7; x % 4 * 2"), Value::Number(6.0));
        assert_eq!(eval_ok("x := 3; -x"), Value::Number(-3.0));
        assert_eq!(eval_ok("x := 5; x << 2 | 1"), Value::Number(21.0));
    }

    #[test]
    fn test_eval_strings() {
        assert_eq!(eval_ok("\"a\" + \"b\""), Value::from("ab"));
        assert_eq!(eval_ok("s := 'x'; s + 'y'"), Value::from("xy"));
        assert_eq!(eval_ok("s := 'hey'; s[1]"), Value::from("e"));
    }

    #[test]
    fn test_eval_short_circuit() {
        let mut vm = Vm::default();
        vm.register_host("touch", |call| {
            call.push_result(Value::Bool(true));
            Ok(())
        });
        let result = run_with(&mut vm, "f := false; f && touch()").unwrap();
        assert_eq!(result, Value::Bool(false));

        let result = run_with(&mut vm, "t := true; t || undefined_name").unwrap();
        assert_eq!(result, Value::Bool(true));
        assert_eq!(eval_ok("true && false"), Value::Bool(false));
    }

    #[test]
    fn test_eval_array_index() {
        assert_eq!(eval_ok("[1, 2, 3][1]"), Value::Number(2.0));
        assert_eq!(eval_ok("a := [1, 2, 3]; a[2] = 9; a[2]"), Value::Number(9.0));
    }

    #[test]
    fn test_eval_large_array_literal() {
        let items: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        let src = format!("a := [{}]; a[24] + a[10]", items.join(", "));
        assert_eq!(eval_ok(&src), Value::Number(34.0));
    }

    #[test]
    fn test_eval_objects() {
        assert_eq!(eval_ok("o := {a: 1, b: 2}; o.a + o['b']"), Value::Number(3.0));
        assert_eq!(eval_ok("o := {}; o.missing"), Value::Nil);
        assert_eq!(eval_ok("o := {n: 1}; o.n += 4; o.n"), Value::Number(5.0));
    }

    #[test]
    fn test_eval_if_else() {
        assert_eq!(
            eval_ok("x := 0; if 2 > 1 { x = 10 } else { x = 20 }; x"),
            Value::Number(10.0)
        );
        assert_eq!(
            eval_ok("x := 0; if y := 5; y < 3 { x = 1 } else if y < 9 { x = 2 } else { x = 3 }; x"),
            Value::Number(2.0)
        );
    }

    #[test]
    fn test_eval_for_loop() {
        let src = "sum := 0; for i := 0; i < 5; i++ { sum += i }; sum";
        assert_eq!(eval_ok(src), Value::Number(10.0));
    }

    #[test]
    fn test_eval_break_and_continue() {
        let src = "
            sum := 0
            for i := 0; i < 100; i++ {
                if i % 2 == 0 { continue }
                if i > 9 { break }
                sum += i
            }
            sum
        ";
        assert_eq!(eval_ok(src), Value::Number(25.0));
    }

    #[test]
    fn test_eval_for_in() {
        let src = "sum := 0; for v in [1, 2, 3] { sum += v }; sum";
        assert_eq!(eval_ok(src), Value::Number(6.0));

        let src = "keys := ''; for k, v in {b: 2, a: 1} { keys = keys + k }; keys";
        assert_eq!(eval_ok(src), Value::from("ab"));

        let src = "n := 0; for i, c in 'abc' { n += i }; n";
        assert_eq!(eval_ok(src), Value::Number(3.0));
    }

    #[test]
    fn test_eval_functions() {
        assert_eq!(eval_ok("func add(a, b) { return a + b }; add(2, 3)"), Value::Number(5.0));
        assert_eq!(eval_ok("f := func(x) => x * 2; f(21)"), Value::Number(42.0));
        assert_eq!(eval_ok("func f(a, b) { return b }; f(1)"), Value::Nil);
        assert_eq!(eval_ok("func f() { }; f()"), Value::Nil);
    }

    #[test]
    fn test_eval_recursion() {
        let src = "func fib(n) { if n < 2 { return n }; return fib(n - 1) + fib(n - 2) }; fib(15)";
        assert_eq!(eval_ok(src), Value::Number(610.0));
    }

    #[test]
    fn test_eval_multiple_results() {
        let src = "func two() { return 1, 2 }; a, b := two(); a * 10 + b";
        assert_eq!(eval_ok(src), Value::Number(12.0));
        let src = "func one() { return 1 }; a, b := one(); b";
        assert_eq!(eval_ok(src), Value::Nil);
        let src = "a, b, c := [4, 5, 6]...; a + b + c";
        assert_eq!(eval_ok(src), Value::Number(15.0));
    }

    #[test]
    fn test_eval_closures() {
        let src = "
            func counter() {
                n := 0
                return func() { n++; return n }
            }
            c := counter()
            c(); c()
            c()
        ";
        assert_eq!(eval_ok(src), Value::Number(3.0));
    }

    #[test]
    fn test_eval_closures_are_independent() {
        let src = "
            func make(start) { return func() { start = start + 1; return start } }
            a := make(0)
            b := make(100)
            a(); a()
            a() + b()
        ";
        assert_eq!(eval_ok(src), Value::Number(104.0));
    }

    #[test]
    fn test_eval_nested_capture() {
        let src = "
            x := 1
            func outer() {
                return func() { return x + 1 }
            }
            x = 41
            outer()()
        ";
        assert_eq!(eval_ok(src), Value::Number(42.0));
    }

    #[test]
    fn test_eval_method_receiver() {
        let src = "
            o := {n: 5}
            o.get = func() { return this.n }
            func o.double() { return this.n * 2 }
            o.get() + o.double()
        ";
        assert_eq!(eval_ok(src), Value::Number(15.0));
    }

    #[test]
    fn test_host_calls() {
        let mut vm = Vm::default();
        vm.register_host("count", count_calls);
        assert_eq!(run_with(&mut vm, "count(1, 2, 3)").unwrap(), Value::Number(3.0));
        let result = run_with(&mut vm, "a, b := count(); b").unwrap();
        assert_eq!(result, Value::Nil);
    }

    #[test]
    fn test_globals_persist_between_runs() {
        let mut vm = Vm::default();
        vm.set_global("base", Value::Number(10.0));
        assert_eq!(run_with(&mut vm, "base + 1").unwrap(), Value::Number(11.0));
        run_with(&mut vm, "base = 20").unwrap();
        assert_eq!(vm.get_global("base"), Some(Value::Number(20.0)));
        assert!(vm.global_names().contains(&"base".to_string()));
    }

    #[test]
    fn test_runtime_errors() {
        let err = eval("x := 1; x + 'a'").unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch { op: "+", .. }));
        assert_eq!(err.file, "test");
        assert_eq!(err.line, 1);

        let err = eval("missing").unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedGlobal("missing".into()));

        let err = eval("x := 1; x()").unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::NotCallable(ValueKind::Number));

        let err = eval("x := nil; x.y").unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::NotIndexable(ValueKind::Nil));

        let err = eval("a := [1]; a[3]").unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::IndexOutOfRange { .. }));

        let err = eval("x := 1; x < 'a'").unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::InvalidComparison { .. }));

        let err = eval("for x in 5 { }").unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::NotIterable(ValueKind::Number));
    }

    #[test]
    fn test_runtime_error_line() {
        let err = eval("x := 1\ny := 2\nz := x + nil").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.to_string(), "test:3: invalid operands for '+': number and nil");
    }

    #[test]
    fn test_host_error() {
        let mut vm = Vm::default();
        vm.register_host("fail", fail);
        let err = run_with(&mut vm, "fail()").unwrap_err();
        assert_eq!(
            err.kind,
            RuntimeErrorKind::Host {
                name: "fail".into(),
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_stack_overflow() {
        let mut vm = Vm::new(VmConfig::default().with_call_stack_size(16));
        let err = run_with(&mut vm, "func f() { return f() }; f()").unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::StackOverflow);

        // the VM is usable after a failed run
        assert_eq!(run_with(&mut vm, "1 + 1").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_invalid_instruction() {
        let mut proto = FuncProto::new("bad");
        proto.max_registers = 1;
        proto.emit(Instruction(63), 1);
        let err = Vm::default().run(Arc::new(proto)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidInstruction(63));
    }

    #[test]
    fn test_register_overflow() {
        let mut proto = FuncProto::new("bad");
        proto.max_registers = 2;
        proto.emit(Instruction::ab(OpCode::Move, 5, 0), 1);
        let err = Vm::default().run(Arc::new(proto)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::RegisterOverflow(5));
    }
}
