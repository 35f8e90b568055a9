//! Parser for elo source code.
//!
//! Transforms a stream of tokens into an Abstract Syntax Tree (AST).
//!
//! ## Structure
//!
//! - `parser` - Parser state, token helpers and statement parsing
//! - `expressions` - Expression parsing (operators, literals, calls)
//!
//! ## Usage
//!
//! ```rust
//! use elo_engine::parser::Parser;
//!
//! let mut parser = Parser::new("x := 1 + 2");
//! let program = parser.parse_program().expect("Should parse");
//! assert_eq!(program.body.len(), 1);
//! ```

mod expressions;
mod parser;

pub use parser::Parser;
