//! Instruction encoding.
//!
//! Every instruction is one 32-bit word:
//!
//! ```text
//!  31        23 22        14 13      6 5     0
//! +------------+------------+---------+-------+
//! |   C (9)    |   B (9)    |  A (8)  | op(6) |
//! +------------+------------+---------+-------+
//! |        Bx / sBx (18)    |  A (8)  | op(6) |
//! +-------------------------+---------+-------+
//! ```
//!
//! B, C and Bx operands of value [`CONST_OFFSET`] or more name constant
//! pool entries (`operand - CONST_OFFSET`) instead of registers.

use std::fmt;

/// Width of the opcode field.
pub const OPCODE_BITS: u32 = 6;
/// Width of the A field.
pub const A_BITS: u32 = 8;
/// Width of the B field.
pub const B_BITS: u32 = 9;
/// Width of the C field.
pub const C_BITS: u32 = 9;
/// Width of the Bx field (B and C together).
pub const BX_BITS: u32 = B_BITS + C_BITS;

const OPCODE_MASK: u32 = (1 << OPCODE_BITS) - 1;
const A_MASK: u32 = (1 << A_BITS) - 1;
const B_MASK: u32 = (1 << B_BITS) - 1;
const C_MASK: u32 = (1 << C_BITS) - 1;
const BX_MASK: u32 = (1 << BX_BITS) - 1;

const A_SHIFT: u32 = OPCODE_BITS;
const B_SHIFT: u32 = A_SHIFT + A_BITS;
const C_SHIFT: u32 = B_SHIFT + B_BITS;
const BX_SHIFT: u32 = B_SHIFT;

/// Largest A operand.
pub const MAX_A: u32 = A_MASK;
/// Largest B or C operand.
pub const MAX_B: u32 = B_MASK;
/// Largest Bx operand.
pub const MAX_BX: u32 = BX_MASK;
/// Bias added to signed jump offsets.
pub const SBX_BIAS: i32 = (BX_MASK >> 1) as i32;

/// Operands at or above this value are constant pool references.
pub const CONST_OFFSET: u32 = 250;
/// Registers available to one function.
pub const MAX_REGISTERS: usize = 249;
/// Maximum call depth.
pub const CALL_STACK_SIZE: usize = 255;
/// Maximum constant pool size of one prototype.
pub const MAX_CONSTANTS: usize = 0xffff;
/// Elements appended per APPEND when building array literals.
pub const ARRAY_BATCH: usize = 10;

/// Returns true if `operand` refers to the constant pool.
pub fn is_constant(operand: u32) -> bool {
    operand >= CONST_OFFSET
}

/// Encodes constant `index` as a B/C operand, if it fits in 9 bits.
pub fn constant_operand(index: usize) -> Option<u32> {
    let operand = CONST_OFFSET as usize + index;
    (operand <= MAX_B as usize).then_some(operand as u32)
}

/// Operation codes.
///
/// `R(x)` is register x of the current frame, `K(x)` constant x,
/// `RK(x)` either one depending on [`CONST_OFFSET`], and `U(x)` the
/// current closure's upvalue x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// R(A) .. R(B) = nil
    LoadNil,
    /// R(A) = K(Bx)
    LoadConst,
    /// R(A) = globals[K(Bx)]
    LoadGlobal,
    /// globals[K(Bx)] = R(A)
    SetGlobal,
    /// R(A) = U(Bx)
    LoadRef,
    /// U(Bx) = R(A)
    SetRef,
    /// R(A) = -RK(Bx)
    Neg,
    /// R(A) = not RK(Bx)
    Not,
    /// R(A) = ~RK(Bx)
    Cmpl,
    /// R(A) = RK(B) + RK(C)
    Add,
    /// R(A) = RK(B) - RK(C)
    Sub,
    /// R(A) = RK(B) * RK(C)
    Mul,
    /// R(A) = RK(B) / RK(C)
    Div,
    /// R(A) = RK(B) % RK(C)
    Mod,
    /// R(A) = RK(B) ** RK(C)
    Pow,
    /// R(A) = RK(B) << RK(C)
    Shl,
    /// R(A) = RK(B) >> RK(C)
    Shr,
    /// R(A) = RK(B) & RK(C)
    And,
    /// R(A) = RK(B) | RK(C)
    Or,
    /// R(A) = RK(B) ^ RK(C)
    Xor,
    /// R(A) = RK(B) < RK(C)
    Lt,
    /// R(A) = RK(B) <= RK(C)
    Le,
    /// R(A) = RK(B) == RK(C)
    Eq,
    /// R(A) = RK(B) != RK(C)
    Ne,
    /// R(A) = R(B)
    Move,
    /// R(A) = R(B)[RK(C)]
    Get,
    /// R(A)[RK(B)] = RK(C)
    Set,
    /// R(A) append R(A+1) .. R(A+B)
    Append,
    /// R(A) .. R(A+B-1) = elements of the array in R(A)
    Unpack,
    /// R(A) .. R(A+B-1) = R(A)(R(A+B) .. R(A+B+C-1))
    Call,
    /// like Call, R(A+B) is the receiver
    CallMethod,
    /// R(A) = []
    Array,
    /// R(A) = {}
    Object,
    /// R(A) = closure(protos[Bx])
    Func,
    /// pc += sBx
    Jmp,
    /// if RK(A) is truthy then pc += sBx
    JmpTrue,
    /// if RK(A) is falsy then pc += sBx
    JmpFalse,
    /// return R(A) .. R(A+B-1)
    Return,
    /// R(A) = iteration source of R(B), R(A+1) = its length
    ForBegin,
    /// R(A) = key at index R(A+1) (array index, or R(C)[R(A+1)]); R(A+1) += 1
    ForIter,
    /// close every open upvalue at or above R(A)
    Close,
}

impl OpCode {
    /// Number of opcodes.
    pub const COUNT: usize = OpCode::Close as usize + 1;

    const ALL: [OpCode; OpCode::COUNT] = [
        OpCode::LoadNil,
        OpCode::LoadConst,
        OpCode::LoadGlobal,
        OpCode::SetGlobal,
        OpCode::LoadRef,
        OpCode::SetRef,
        OpCode::Neg,
        OpCode::Not,
        OpCode::Cmpl,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Pow,
        OpCode::Shl,
        OpCode::Shr,
        OpCode::And,
        OpCode::Or,
        OpCode::Xor,
        OpCode::Lt,
        OpCode::Le,
        OpCode::Eq,
        OpCode::Ne,
        OpCode::Move,
        OpCode::Get,
        OpCode::Set,
        OpCode::Append,
        OpCode::Unpack,
        OpCode::Call,
        OpCode::CallMethod,
        OpCode::Array,
        OpCode::Object,
        OpCode::Func,
        OpCode::Jmp,
        OpCode::JmpTrue,
        OpCode::JmpFalse,
        OpCode::Return,
        OpCode::ForBegin,
        OpCode::ForIter,
        OpCode::Close,
    ];

    /// Decodes an opcode number.
    pub fn from_u8(value: u8) -> Option<OpCode> {
        Self::ALL.get(value as usize).copied()
    }

    /// The mnemonic used in listings and traces.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::LoadNil => "LOADNIL",
            OpCode::LoadConst => "LOADCONST",
            OpCode::LoadGlobal => "LOADGLOBAL",
            OpCode::SetGlobal => "SETGLOBAL",
            OpCode::LoadRef => "LOADREF",
            OpCode::SetRef => "SETREF",
            OpCode::Neg => "NEG",
            OpCode::Not => "NOT",
            OpCode::Cmpl => "CMPL",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Shl => "SHL",
            OpCode::Shr => "SHR",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Xor => "XOR",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Move => "MOVE",
            OpCode::Get => "GET",
            OpCode::Set => "SET",
            OpCode::Append => "APPEND",
            OpCode::Unpack => "UNPACK",
            OpCode::Call => "CALL",
            OpCode::CallMethod => "CALLMETHOD",
            OpCode::Array => "ARRAY",
            OpCode::Object => "OBJECT",
            OpCode::Func => "FUNC",
            OpCode::Jmp => "JMP",
            OpCode::JmpTrue => "JMPTRUE",
            OpCode::JmpFalse => "JMPFALSE",
            OpCode::Return => "RETURN",
            OpCode::ForBegin => "FORBEGIN",
            OpCode::ForIter => "FORITER",
            OpCode::Close => "CLOSE",
        }
    }

    /// Operand layout of this opcode.
    pub fn format(self) -> Format {
        match self {
            OpCode::LoadConst
            | OpCode::LoadGlobal
            | OpCode::SetGlobal
            | OpCode::LoadRef
            | OpCode::SetRef
            | OpCode::Neg
            | OpCode::Not
            | OpCode::Cmpl
            | OpCode::Func => Format::ABx,
            OpCode::Jmp | OpCode::JmpTrue | OpCode::JmpFalse => Format::AsBx,
            _ => Format::ABC,
        }
    }
}

/// How an instruction's operand bits are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// A, B and C
    ABC,
    /// A and unsigned Bx
    ABx,
    /// A and signed sBx
    AsBx,
}

/// A packed instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    /// Encodes an A/B/C instruction.
    pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        debug_assert!(a <= MAX_A, "A operand {} out of range", a);
        debug_assert!(b <= MAX_B, "B operand {} out of range", b);
        debug_assert!(c <= MAX_B, "C operand {} out of range", c);
        Self(
            (op as u32 & OPCODE_MASK)
                | ((a & A_MASK) << A_SHIFT)
                | ((b & B_MASK) << B_SHIFT)
                | ((c & C_MASK) << C_SHIFT),
        )
    }

    /// Encodes an A/B instruction (C = 0).
    pub fn ab(op: OpCode, a: u32, b: u32) -> Self {
        Self::abc(op, a, b, 0)
    }

    /// Encodes an A/Bx instruction.
    pub fn abx(op: OpCode, a: u32, bx: u32) -> Self {
        debug_assert!(a <= MAX_A, "A operand {} out of range", a);
        debug_assert!(bx <= MAX_BX, "Bx operand {} out of range", bx);
        Self((op as u32 & OPCODE_MASK) | ((a & A_MASK) << A_SHIFT) | ((bx & BX_MASK) << BX_SHIFT))
    }

    /// Encodes an A/sBx instruction from a signed jump distance.
    pub fn asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        let biased = sbx + SBX_BIAS;
        debug_assert!(
            (0..=MAX_BX as i32).contains(&biased),
            "jump offset {} out of range",
            sbx
        );
        Self::abx(op, a, biased as u32)
    }

    /// The opcode, or `None` for an undefined opcode number.
    pub fn opcode(self) -> Option<OpCode> {
        OpCode::from_u8((self.0 & OPCODE_MASK) as u8)
    }

    /// The A field.
    pub fn a(self) -> u32 {
        (self.0 >> A_SHIFT) & A_MASK
    }

    /// The B field.
    pub fn b(self) -> u32 {
        (self.0 >> B_SHIFT) & B_MASK
    }

    /// The C field.
    pub fn c(self) -> u32 {
        (self.0 >> C_SHIFT) & C_MASK
    }

    /// The unsigned Bx field.
    pub fn bx(self) -> u32 {
        (self.0 >> BX_SHIFT) & BX_MASK
    }

    /// The signed jump distance.
    pub fn sbx(self) -> i32 {
        self.bx() as i32 - SBX_BIAS
    }

    /// Re-encodes this instruction from its decoded fields.
    pub fn reencode(self) -> Option<Self> {
        let op = self.opcode()?;
        Some(match op.format() {
            Format::ABC => Self::abc(op, self.a(), self.b(), self.c()),
            Format::ABx => Self::abx(op, self.a(), self.bx()),
            Format::AsBx => Self::asbx(op, self.a(), self.sbx()),
        })
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.opcode() else {
            return write!(f, "<invalid {:#010x}>", self.0);
        };
        match op.format() {
            Format::ABC => write!(f, "{:<10} {} {} {}", op.name(), self.a(), self.b(), self.c()),
            Format::ABx => write!(f, "{:<10} {} {}", op.name(), self.a(), self.bx()),
            Format::AsBx => write!(f, "{:<10} {} {}", op.name(), self.a(), self.sbx()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abc_fields() {
        let instr = Instruction::abc(OpCode::Add, 3, 251, 511);
        assert_eq!(instr.opcode(), Some(OpCode::Add));
        assert_eq!(instr.a(), 3);
        assert_eq!(instr.b(), 251);
        assert_eq!(instr.c(), 511);
    }

    #[test]
    fn test_abx_fields() {
        let instr = Instruction::abx(OpCode::LoadConst, 255, MAX_BX);
        assert_eq!(instr.opcode(), Some(OpCode::LoadConst));
        assert_eq!(instr.a(), 255);
        assert_eq!(instr.bx(), MAX_BX);
    }

    #[test]
    fn test_sbx_bias() {
        for offset in [-SBX_BIAS, -1, 0, 1, 42, SBX_BIAS] {
            let instr = Instruction::asbx(OpCode::Jmp, 0, offset);
            assert_eq!(instr.sbx(), offset);
            assert_eq!(instr.bx() as i32, offset + SBX_BIAS);
        }
    }

    #[test]
    fn test_opcode_numbers_are_dense() {
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(OpCode::from_u8(i as u8), Some(*op));
        }
        assert_eq!(OpCode::from_u8(OpCode::COUNT as u8), None);
        assert!(OpCode::COUNT <= (1 << OPCODE_BITS));
    }

    #[test]
    fn test_reencode_is_identity() {
        let words = [
            Instruction::abc(OpCode::Call, 4, 2, 3),
            Instruction::abx(OpCode::Func, 1, 7),
            Instruction::asbx(OpCode::JmpFalse, 9, -12),
            Instruction::ab(OpCode::Array, 0, 4),
        ];
        for word in words {
            assert_eq!(word.reencode(), Some(word));
        }
    }

    #[test]
    fn test_constant_operand_range() {
        assert!(is_constant(CONST_OFFSET));
        assert!(!is_constant(CONST_OFFSET - 1));
        assert_eq!(constant_operand(0), Some(CONST_OFFSET));
        assert_eq!(constant_operand(261), Some(511));
        assert_eq!(constant_operand(262), None);
    }

    #[test]
    fn test_display() {
        let instr = Instruction::asbx(OpCode::Jmp, 0, -3);
        assert_eq!(instr.to_string(), "JMP        0 -3");
    }
}
