//! Function values: script closures and host functions.

use super::value::Value;
use crate::compiler::FuncProto;
use parking_lot::Mutex;
use std::sync::Arc;

/// A captured variable cell.
///
/// While the declaring frame is live the cell is `Open` and aliases an
/// absolute slot in the VM register buffer. When that frame returns the
/// VM copies the value in and the cell becomes `Closed`.
#[derive(Debug, Clone)]
pub enum Upvalue {
    /// Aliases a live register slot
    Open(usize),
    /// Owns the captured value
    Closed(Value),
}

/// Shared handle to an upvalue cell.
pub type UpvalueRef = Arc<Mutex<Upvalue>>;

/// A compiled prototype plus its captured cells.
#[derive(Debug)]
pub struct Closure {
    /// The prototype this closure executes
    pub proto: Arc<FuncProto>,
    /// One cell per upvalue descriptor of `proto`
    pub upvalues: Vec<UpvalueRef>,
}

/// Arguments and results of one host call.
///
/// The VM packages the argument registers into `args` and tells the host
/// how many results the caller wants. The host appends results with
/// [`HostCall::push_result`]; missing ones are padded with nil.
#[derive(Debug, Default)]
pub struct HostCall {
    /// The argument values
    pub args: Vec<Value>,
    /// Number of results the caller requested
    pub expect_results: usize,
    results: Vec<Value>,
}

impl HostCall {
    /// Creates a call record.
    pub fn new(args: Vec<Value>, expect_results: usize) -> Self {
        Self {
            args,
            expect_results,
            results: Vec::new(),
        }
    }

    /// Number of arguments passed.
    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    /// Argument `index`, or nil when absent.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Appends a result value.
    pub fn push_result(&mut self, value: Value) {
        self.results.push(value);
    }

    /// Number of results produced so far.
    pub fn num_results(&self) -> usize {
        self.results.len()
    }

    /// Consumes the record, returning exactly `expect_results` values.
    pub fn into_results(mut self) -> Vec<Value> {
        self.results.resize(self.expect_results, Value::Nil);
        self.results
    }
}

/// Signature of a host function.
pub type HostFn = fn(&mut HostCall) -> Result<(), String>;

/// A callable value - either a script closure or a host function.
pub enum Callable {
    /// A compiled script function
    Closure(Closure),
    /// A function implemented in Rust
    Host {
        /// The registered name
        name: String,
        /// The function pointer
        func: HostFn,
    },
}

impl Callable {
    /// Wraps a host function.
    pub fn host(name: impl Into<String>, func: HostFn) -> Self {
        Callable::Host {
            name: name.into(),
            func,
        }
    }

    /// The function name, when known.
    pub fn name(&self) -> Option<&str> {
        match self {
            Callable::Closure(closure) => closure.proto.name.as_deref(),
            Callable::Host { name, .. } => Some(name),
        }
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Closure(closure) => write!(f, "Closure({:?})", closure.proto.name),
            Callable::Host { name, .. } => write!(f, "HostFunction({})", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_arg(call: &mut HostCall) -> Result<(), String> {
        let value = call.arg(0);
        call.push_result(value);
        Ok(())
    }

    #[test]
    fn test_host_call_pads_results() {
        let mut call = HostCall::new(vec![Value::Number(1.0)], 3);
        first_arg(&mut call).unwrap();
        assert_eq!(call.num_results(), 1);
        let results = call.into_results();
        assert_eq!(
            results,
            vec![Value::Number(1.0), Value::Nil, Value::Nil]
        );
    }

    #[test]
    fn test_host_call_truncates_extra_results() {
        let mut call = HostCall::new(vec![], 0);
        call.push_result(Value::Bool(true));
        assert!(call.into_results().is_empty());
    }

    #[test]
    fn test_missing_argument_is_nil() {
        let call = HostCall::new(vec![], 1);
        assert_eq!(call.num_args(), 0);
        assert_eq!(call.arg(2), Value::Nil);
    }

    #[test]
    fn test_callable_name() {
        let host = Callable::host("len", first_arg);
        assert_eq!(host.name(), Some("len"));
        assert_eq!(format!("{:?}", host), "HostFunction(len)");
    }
}
