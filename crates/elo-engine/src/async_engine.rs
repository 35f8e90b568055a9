//! Asynchronous and parallel engine APIs.
//!
//! `AsyncEngine` reads files with tokio and serializes execution behind a
//! lock. `ParallelCompiler` compiles many sources on a rayon pool, which
//! works because compiled prototypes are `Send + Sync`.
//!
//! # Example
//!
//! ```ignore
//! use elo_engine::AsyncEngine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = AsyncEngine::new();
//!     let result = engine.eval_file("script.elo").await.unwrap();
//!     println!("{}", result);
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLock;

use crate::compiler::FuncProto;
use crate::runtime::Value;
use crate::{DEFAULT_FILE, Engine, EngineConfig, Result, compile_source};

/// An engine shared between tasks.
///
/// Parsing and compiling happen outside the lock; only execution holds it.
#[derive(Clone)]
pub struct AsyncEngine {
    engine: Arc<RwLock<Engine>>,
}

impl AsyncEngine {
    /// Creates an async engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an async engine with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: Arc::new(RwLock::new(Engine::with_config(config))),
        }
    }

    /// Evaluates source code.
    pub async fn eval(&self, source: &str) -> Result<Value> {
        self.eval_named(source, DEFAULT_FILE).await
    }

    /// Evaluates source code, reporting errors against `file`.
    pub async fn eval_named(&self, source: &str, file: &str) -> Result<Value> {
        let proto = compile_source(source, file)?;
        self.run(proto).await
    }

    /// Reads and evaluates a file using tokio's async file I/O.
    pub async fn eval_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).await?;
        self.eval_named(&source, &path.display().to_string()).await
    }

    /// Evaluates several files concurrently.
    ///
    /// Reads overlap; execution is serialized by the engine lock. Results
    /// come back in the order of `paths`.
    pub async fn eval_files(&self, paths: &[impl AsRef<Path>]) -> Vec<Result<Value>> {
        let futures: Vec<_> = paths.iter().map(|p| self.eval_file(p)).collect();
        futures::future::join_all(futures).await
    }

    /// Runs a compiled main chunk.
    pub async fn run(&self, proto: Arc<FuncProto>) -> Result<Value> {
        let mut engine = self.engine.write().await;
        engine.run(proto)
    }

    /// Reads a global.
    pub async fn get_global(&self, name: &str) -> Option<Value> {
        self.engine.read().await.get_global(name)
    }

    /// Sets a global.
    pub async fn set_global(&self, name: impl Into<String>, value: Value) {
        self.engine.write().await.set_global(name, value);
    }
}

impl Default for AsyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles sources on a dedicated rayon thread pool.
#[cfg(feature = "parallel")]
pub struct ParallelCompiler {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelCompiler {
    /// Creates a compiler pool with the default number of threads.
    pub fn new() -> std::result::Result<Self, rayon::ThreadPoolBuildError> {
        Ok(Self {
            pool: rayon::ThreadPoolBuilder::new().build()?,
        })
    }

    /// Creates a compiler pool with a specific number of threads.
    pub fn with_threads(
        num_threads: usize,
    ) -> std::result::Result<Self, rayon::ThreadPoolBuildError> {
        Ok(Self {
            pool: rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build()?,
        })
    }

    /// Compiles `(file, source)` pairs, returning results in input order.
    pub fn compile_all(&self, sources: &[(&str, &str)]) -> Vec<Result<Arc<FuncProto>>> {
        use rayon::prelude::*;

        self.pool.install(|| {
            sources
                .par_iter()
                .map(|(file, source)| compile_source(source, file))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_async_eval() {
        let engine = AsyncEngine::new();
        let result = engine.eval("1 + 2").await.unwrap();
        assert_eq!(result, Value::Number(3.0));
    }

    #[tokio::test]
    async fn test_async_globals_shared_between_clones() {
        let engine = AsyncEngine::new();
        let other = engine.clone();
        engine.set_global("n", Value::Number(1.0)).await;
        other.eval("n = n + 1").await.unwrap();
        assert_eq!(engine.get_global("n").await, Some(Value::Number(2.0)));
    }

    #[tokio::test]
    async fn test_eval_files_in_order() {
        let dir = std::env::temp_dir();
        let id = std::process::id();
        let first = dir.join(format!("elo-async-{}-a.elo", id));
        let second = dir.join(format!("elo-async-{}-b.elo", id));
        fs::write(&first, "1 + 1").await.unwrap();
        fs::write(&second, "'two'").await.unwrap();
        let missing = dir.join(format!("elo-async-{}-missing.elo", id));

        let engine = AsyncEngine::new();
        let results = engine.eval_files(&[&first, &second, &missing]).await;
        fs::remove_file(&first).await.unwrap();
        fs::remove_file(&second).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &Value::Number(2.0));
        assert_eq!(results[1].as_ref().unwrap(), &Value::from("two"));
        assert!(matches!(results[2], Err(Error::Io(_))));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_compile() {
        let compiler = ParallelCompiler::with_threads(2).unwrap();
        let sources = [("a.elo", "x := 1; x + 1"), ("b.elo", "x := ("), ("c.elo", "1")];
        let results = compiler.compile_all(&sources);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().source, "a.elo");
        assert!(matches!(results[1], Err(Error::Syntax(_))));

        let mut engine = Engine::new();
        for proto in results.into_iter().filter_map(|r| r.ok()) {
            engine.run(proto).unwrap();
        }
    }
}
