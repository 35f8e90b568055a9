//! Lexical analysis (tokenization) for elo source code.
//!
//! The lexer transforms source text into a stream of tokens that can be
//! consumed by the parser. Statement-ending newlines are turned into
//! `Semicolon` tokens here, so the parser never sees line breaks.
//!
//! ## Usage
//!
//! ```rust
//! use elo_engine::lexer::{Scanner, TokenKind};
//!
//! let mut scanner = Scanner::new("x := 42");
//!
//! loop {
//!     let token = scanner.next_token();
//!     if matches!(token.kind, TokenKind::Eof) {
//!         break;
//!     }
//!     println!("{:?}", token.kind);
//! }
//! ```

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Span, Token, TokenKind};
