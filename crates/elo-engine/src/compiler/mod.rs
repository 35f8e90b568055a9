//! Bytecode compiler for elo.
//!
//! Transforms the AST into register bytecode that can be executed by the VM.
//!
//! # Module Structure
//!
//! - `bytecode`: Instruction word layout and opcodes
//! - `proto`: Function prototypes (constants, code, line table, nested functions)
//!   and their printable listing
//! - `codegen`: Code generation from AST
//!   - `codegen::scope`: Block tree and name resolution

pub mod bytecode;
pub mod codegen;
pub mod proto;

pub use bytecode::{Instruction, OpCode};
pub use codegen::{Compiler, compile};
pub use proto::{FuncProto, LineInfo, UpvalueDesc};
