//! The bytecode virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - Call frames, register windows and the dispatch loop
//! - `arithmetic` - Numeric, bitwise and string-join operators
//! - `comparison` - Equality and ordering
//!
//! The operator modules are shared with the compiler's constant folder.

mod interpreter;

pub mod arithmetic;
pub mod comparison;

pub use interpreter::{Vm, VmConfig};
