//! Compiled function prototypes.

use super::bytecode::{CONST_OFFSET, Instruction, MAX_CONSTANTS, OpCode, is_constant};
use crate::runtime::Value;
use std::fmt;
use std::sync::Arc;

/// Maps an instruction index to the source line it came from.
///
/// The table only records line changes: an entry covers every
/// instruction from `instr` up to the next entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    /// Index of the first instruction on this line
    pub instr: u32,
    /// Source line (1-based)
    pub line: u32,
}

/// Where a closure finds one captured variable when it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Variable name, for diagnostics
    pub name: String,
    /// True: register `index` of the enclosing frame.
    /// False: upvalue `index` of the enclosing closure.
    pub in_register: bool,
    /// Register or upvalue index
    pub index: u32,
}

/// The compiled form of one function body.
///
/// Built once by the compiler, then shared read-only behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct FuncProto {
    /// Source name (usually the file name)
    pub source: String,
    /// Function name, when the literal had one
    pub name: Option<String>,
    /// Number of declared parameters (the receiver is not counted)
    pub num_params: usize,
    /// Highest register count used by the body
    pub max_registers: usize,
    /// Deduplicated constant pool
    pub constants: Vec<Value>,
    /// Instruction stream
    pub code: Vec<Instruction>,
    /// Sparse line table
    pub lines: Vec<LineInfo>,
    /// Nested prototypes, indexed by FUNC operands
    pub protos: Vec<Arc<FuncProto>>,
    /// Captures, in upvalue index order
    pub upvalues: Vec<UpvalueDesc>,
}

impl FuncProto {
    /// Creates an empty prototype for `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Number of constants.
    pub fn num_constants(&self) -> usize {
        self.constants.len()
    }

    /// Number of instructions.
    pub fn num_code(&self) -> usize {
        self.code.len()
    }

    /// Number of line table entries.
    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    /// Number of nested prototypes.
    pub fn num_protos(&self) -> usize {
        self.protos.len()
    }

    /// Returns the index of `value` in the pool, adding it if needed.
    ///
    /// Returns `None` when the pool is full.
    pub fn add_constant(&mut self, value: Value) -> Option<usize> {
        if let Some(index) = self.constants.iter().position(|c| c.same_constant(&value)) {
            return Some(index);
        }
        if self.constants.len() >= MAX_CONSTANTS {
            return None;
        }
        self.constants.push(value);
        Some(self.constants.len() - 1)
    }

    /// Appends an instruction emitted on `line` and returns its index.
    pub fn emit(&mut self, instr: Instruction, line: u32) -> usize {
        let index = self.code.len();
        if self.lines.last().is_none_or(|last| last.line != line) {
            self.lines.push(LineInfo {
                instr: index as u32,
                line,
            });
        }
        self.code.push(instr);
        index
    }

    /// Source line of the instruction at `pc`.
    pub fn line_at(&self, pc: usize) -> u32 {
        let after = self.lines.partition_point(|info| info.instr as usize <= pc);
        match after.checked_sub(1) {
            Some(i) => self.lines[i].line,
            None => 0,
        }
    }

    /// Opcode of the last emitted instruction.
    pub fn last_opcode(&self) -> Option<OpCode> {
        self.code.last().and_then(|instr| instr.opcode())
    }
}

impl FuncProto {
    fn write_listing(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        let unnamed = if depth == 0 { "<main>" } else { "<anonymous>" };
        let name = self.name.as_deref().unwrap_or(unnamed);
        writeln!(
            f,
            "{pad}func {name} ({}) params={} registers={} constants={} functions={}",
            self.source,
            self.num_params,
            self.max_registers,
            self.num_constants(),
            self.num_protos()
        )?;

        if !self.constants.is_empty() {
            writeln!(f, "{pad}constants:")?;
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, "{pad}  {i:>4}  {}", ConstantRepr(constant))?;
            }
        }
        if !self.upvalues.is_empty() {
            writeln!(f, "{pad}upvalues:")?;
            for (i, up) in self.upvalues.iter().enumerate() {
                let from = if up.in_register { "register" } else { "upvalue" };
                writeln!(f, "{pad}  {i:>4}  {} ({from} {})", up.name, up.index)?;
            }
        }

        writeln!(f, "{pad}code:")?;
        for (pc, instr) in self.code.iter().enumerate() {
            write!(f, "{pad}  {:>4} {:>4}  ", self.line_at(pc), pc)?;
            self.write_instruction(f, pc, *instr)?;
            writeln!(f)?;
        }

        for proto in &self.protos {
            writeln!(f)?;
            proto.write_listing(f, depth + 1)?;
        }
        Ok(())
    }

    fn write_instruction(&self, f: &mut fmt::Formatter<'_>, pc: usize, instr: Instruction) -> fmt::Result {
        let Some(op) = instr.opcode() else {
            return write!(f, "{}", instr);
        };
        write!(f, "{:<10}", op.name())?;
        let (a, b, c) = (instr.a(), instr.b(), instr.c());
        match op {
            OpCode::LoadConst | OpCode::LoadGlobal | OpCode::SetGlobal => {
                write!(f, " !{a} ")?;
                self.write_constant(f, instr.bx() as usize)
            }
            OpCode::LoadRef | OpCode::SetRef => {
                let bx = instr.bx() as usize;
                match self.upvalues.get(bx) {
                    Some(up) => write!(f, " !{a} ^{bx} ; {}", up.name),
                    None => write!(f, " !{a} ^{bx}"),
                }
            }
            OpCode::Neg | OpCode::Not | OpCode::Cmpl => {
                write!(f, " !{a} ")?;
                self.write_rk(f, instr.bx())
            }
            OpCode::Func => write!(f, " !{a} <func {}>", instr.bx()),
            OpCode::Jmp => write!(f, " ->{}", jump_target(pc, instr)),
            OpCode::JmpTrue | OpCode::JmpFalse => {
                write!(f, " ")?;
                self.write_rk(f, a)?;
                write!(f, " ->{}", jump_target(pc, instr))
            }
            OpCode::Get => {
                write!(f, " !{a} !{b} ")?;
                self.write_rk(f, c)
            }
            OpCode::Set => {
                write!(f, " !{a} ")?;
                self.write_rk(f, b)?;
                write!(f, " ")?;
                self.write_rk(f, c)
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
            | OpCode::Xor
            | OpCode::Lt
            | OpCode::Le
            | OpCode::Eq
            | OpCode::Ne => {
                write!(f, " !{a} ")?;
                self.write_rk(f, b)?;
                write!(f, " ")?;
                self.write_rk(f, c)
            }
            OpCode::LoadNil => write!(f, " !{a}..!{b}"),
            OpCode::Move | OpCode::ForBegin => write!(f, " !{a} !{b}"),
            OpCode::ForIter => write!(f, " !{a} !{b} !{c}"),
            OpCode::Array | OpCode::Object | OpCode::Close => write!(f, " !{a}"),
            // B counts values here, not registers
            OpCode::Append | OpCode::Unpack | OpCode::Return => write!(f, " !{a} {b}"),
            OpCode::Call | OpCode::CallMethod => write!(f, " !{a} results={b} args={c}"),
        }
    }

    fn write_rk(&self, f: &mut fmt::Formatter<'_>, operand: u32) -> fmt::Result {
        if is_constant(operand) {
            self.write_constant(f, (operand - CONST_OFFSET) as usize)
        } else {
            write!(f, "!{operand}")
        }
    }

    fn write_constant(&self, f: &mut fmt::Formatter<'_>, index: usize) -> fmt::Result {
        match self.constants.get(index) {
            Some(value) => write!(f, "{}", ConstantRepr(value)),
            None => write!(f, "<const {index}?>"),
        }
    }
}

/// Prints a bytecode listing of this prototype and every nested one.
///
/// Registers print as `!n`, upvalues as `^n` and jumps as `->target`.
impl fmt::Display for FuncProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_listing(f, 0)
    }
}

struct ConstantRepr<'a>(&'a Value);

impl fmt::Display for ConstantRepr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

fn jump_target(pc: usize, instr: Instruction) -> i64 {
    pc as i64 + 1 + instr.sbx() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_dedup_by_kind_and_value() {
        let mut proto = FuncProto::new("test");
        assert_eq!(proto.add_constant(Value::Number(1.0)), Some(0));
        assert_eq!(proto.add_constant(Value::from("1")), Some(1));
        assert_eq!(proto.add_constant(Value::Number(1.0)), Some(0));
        assert_eq!(proto.add_constant(Value::Bool(true)), Some(2));
        assert_eq!(proto.num_constants(), 3);
    }

    #[test]
    fn test_constant_pool_limit() {
        let mut proto = FuncProto::new("test");
        for i in 0..MAX_CONSTANTS {
            assert!(proto.add_constant(Value::Number(i as f64)).is_some());
        }
        assert_eq!(proto.add_constant(Value::from("one more")), None);
        assert_eq!(proto.add_constant(Value::Number(0.0)), Some(0));
    }

    #[test]
    fn test_line_table_records_changes_only() {
        let mut proto = FuncProto::new("test");
        let nop = Instruction::ab(OpCode::Move, 0, 0);
        proto.emit(nop, 1);
        proto.emit(nop, 1);
        proto.emit(nop, 3);
        proto.emit(nop, 3);
        proto.emit(nop, 2);
        assert_eq!(
            proto.lines,
            vec![
                LineInfo { instr: 0, line: 1 },
                LineInfo { instr: 2, line: 3 },
                LineInfo { instr: 4, line: 2 },
            ]
        );
        assert_eq!(proto.line_at(1), 1);
        assert_eq!(proto.line_at(3), 3);
        assert_eq!(proto.line_at(4), 2);
        assert_eq!(proto.num_lines(), 3);
    }

    #[test]
    fn test_listing_shows_nested_functions_and_operands() {
        let proto = crate::compile_source(
            "func add(a, b) { return a + b }\nprintln(add(1, \"s\"))",
            "listing.elo",
        )
        .expect("should compile");
        let listing = proto.to_string();

        assert!(listing.starts_with("func <main> (listing.elo)"));
        assert!(listing.contains("\"s\""));
        assert!(listing.contains("    func add (listing.elo) params=2"));
        assert!(listing.contains("!1 !2"));
        assert!(listing.contains("CALL"));
        assert!(listing.contains("RETURN"));
    }

    #[test]
    fn test_listing_marks_registers_and_names_nested_functions() {
        let proto = crate::compile_source("f := func() { return 1 }; g := f; f()", "anon.elo")
            .expect("should compile");
        let listing = proto.to_string();

        assert!(listing.starts_with("func <main> (anon.elo)"));
        assert!(listing.contains("    func <anonymous> (anon.elo) params=0"));
        assert_eq!(listing.matches("<main>").count(), 1);
        assert!(listing.contains("MOVE       !1 !0"));
        assert!(listing.contains("results=1 args=0"));
    }

    #[test]
    fn test_listing_resolves_jump_targets() {
        let mut proto = FuncProto::new("test");
        proto.emit(Instruction::asbx(OpCode::Jmp, 0, 1), 1);
        proto.emit(Instruction::ab(OpCode::LoadNil, 0, 0), 1);
        proto.emit(Instruction::ab(OpCode::Return, 0, 0), 2);
        let listing = proto.to_string();
        assert!(listing.contains("JMP        ->2"));
        assert!(listing.contains("   2    2  RETURN"));
    }
}
