// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # elo-engine
//!
//! Compiler and register-based virtual machine for the elo scripting
//! language.
//!
//! ## Overview
//!
//! - Lexer and recursive descent parser producing an AST
//! - Single-pass compiler to 32-bit register bytecode with constant folding
//! - A VM with one shared register stack, closures over upvalue cells and
//!   host functions
//! - Built-in functions and an async/parallel front end
//!
//! ## Quick Start
//!
//! ```rust
//! use elo_engine::{Engine, Value};
//!
//! let mut engine = Engine::new();
//! let result = engine.eval("x := 2; x * 21").unwrap();
//! assert_eq!(result, Value::Number(42.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod vm;

#[cfg(feature = "async")]
pub mod async_engine;

pub use compiler::{Compiler, FuncProto, Instruction, OpCode};
pub use error::{CompileError, CompileErrorKind, Error, ParseError, Result, RuntimeError, RuntimeErrorKind};
pub use runtime::{Channel, HostCall, HostFn, Value};
pub use vm::{Vm, VmConfig};

#[cfg(feature = "async")]
pub use async_engine::AsyncEngine;
#[cfg(all(feature = "async", feature = "parallel"))]
pub use async_engine::ParallelCompiler;

use parser::Parser;
use std::path::Path;
use std::sync::Arc;

/// File name reported for sources without one.
pub const DEFAULT_FILE: &str = "<input>";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Settings for the virtual machine
    pub vm: VmConfig,
    /// Whether to define the builtin functions as globals
    pub register_builtins: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vm: VmConfig::default(),
            register_builtins: true,
        }
    }
}

/// Parses and compiles `source` into a main chunk.
pub fn compile_source(source: &str, file: &str) -> Result<Arc<FuncProto>> {
    compile_with(source, file, false)
}

fn compile_with(source: &str, file: &str, toplevel_globals: bool) -> Result<Arc<FuncProto>> {
    let program = Parser::with_file(source, file).parse_program()?;
    let proto = Compiler::new(file)
        .with_toplevel_globals(toplevel_globals)
        .compile(&program)?;
    Ok(proto)
}

/// The main elo engine instance.
///
/// Owns a VM whose globals persist across evaluations.
pub struct Engine {
    vm: Vm,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let mut vm = Vm::new(config.vm.clone());
        if config.register_builtins {
            builtins::register(&mut vm);
        }
        Self { vm, config }
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates source code and returns the value of its final
    /// expression statement (nil if there is none).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use elo_engine::{Engine, Value};
    /// let mut engine = Engine::new();
    /// assert_eq!(engine.eval("len([1, 2])").unwrap(), Value::Number(2.0));
    /// ```
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        self.eval_named(source, DEFAULT_FILE)
    }

    /// Evaluates source code, reporting errors against `file`.
    pub fn eval_named(&mut self, source: &str, file: &str) -> Result<Value> {
        let proto = compile_source(source, file)?;
        self.run(proto)
    }

    /// Evaluates one line of interactive input.
    ///
    /// Declarations in the outermost block become globals, so later
    /// inputs can see them.
    pub fn eval_repl(&mut self, source: &str) -> Result<Value> {
        let proto = compile_with(source, "<repl>", true)?;
        self.run(proto)
    }

    /// Evaluates source code from a file.
    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        self.eval_named(&source, &path.display().to_string())
    }

    /// Compiles without running.
    pub fn compile(&self, source: &str) -> Result<Arc<FuncProto>> {
        compile_source(source, DEFAULT_FILE)
    }

    /// Runs a compiled main chunk.
    pub fn run(&mut self, proto: Arc<FuncProto>) -> Result<Value> {
        Ok(self.vm.run(proto)?)
    }

    /// Defines a host function as a global.
    pub fn register(&mut self, name: &str, func: HostFn) {
        self.vm.register_host(name, func);
    }

    /// Sets a global.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.vm.set_global(name, value);
    }

    /// Reads a global.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.vm.get_global(name)
    }

    /// Names of all defined globals, sorted.
    pub fn global_names(&self) -> Vec<String> {
        self.vm.global_names()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
