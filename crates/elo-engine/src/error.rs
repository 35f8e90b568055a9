//! Error types for parsing, compilation and execution.

use crate::ast::BranchKind;
use crate::runtime::ValueKind;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error the engine can report.
#[derive(Debug, Error)]
pub enum Error {
    /// The source did not parse.
    #[error(transparent)]
    Syntax(#[from] ParseError),

    /// The program parsed but could not be compiled.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Execution stopped with an error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Reading a source file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Source line of the error, when it has one.
    pub fn line(&self) -> Option<u32> {
        match self {
            Error::Syntax(err) => Some(err.line),
            Error::Compile(err) => Some(err.line),
            Error::Runtime(err) => Some(err.line),
            Error::Io(_) => None,
        }
    }
}

/// A syntax error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{file}:{line}: syntax error: {message}")]
pub struct ParseError {
    /// Source name
    pub file: String,
    /// Source line
    pub line: u32,
    /// What went wrong
    pub message: String,
}

/// What a compile error is about.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileErrorKind {
    /// A name was declared twice in one block.
    #[error("cannot redeclare '{0}'")]
    Redeclaration(String),

    /// `const x` without a value.
    #[error("const '{0}' declared without a value")]
    ConstWithoutInitializer(String),

    /// A const initializer that does not fold.
    #[error("const initializer for '{0}' is not a constant expression")]
    ConstNotConstant(String),

    /// Assignment to something that is not a name, field or element.
    #[error("cannot assign to {0}")]
    NotAssignable(String),

    /// Assignment to a const binding.
    #[error("cannot assign to constant '{0}'")]
    ConstAssignment(String),

    /// break or continue with no enclosing loop.
    #[error("{} outside loop", .0.keyword())]
    OutsideLoop(BranchKind),

    /// The constant pool is full.
    #[error("too many constants")]
    TooManyConstants,

    /// A function needs more registers than a frame holds.
    #[error("too many registers")]
    TooManyRegisters,

    /// A function holds more nested functions than FUNC can index.
    #[error("too many nested functions")]
    TooManyFunctions,

    /// A function captures more variables than an operand can index.
    #[error("too many captured variables")]
    TooManyUpvalues,

    /// A spread in a position that cannot expand.
    #[error("spread is only allowed as the last value of an assignment or declaration")]
    InvalidSpread,

    /// A jump distance that does not fit the operand.
    #[error("jump distance too large")]
    JumpOutOfRange,
}

/// A compile error with its position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{file}:{line}: {kind}")]
pub struct CompileError {
    /// Source name
    pub file: String,
    /// Source line
    pub line: u32,
    /// What went wrong
    pub kind: CompileErrorKind,
}

impl CompileError {
    /// The message without position.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// What a runtime error is about.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    /// Operands of the wrong kind for a binary operator.
    #[error("invalid operands for '{op}': {left} and {right}")]
    TypeMismatch {
        /// Operator spelling
        op: &'static str,
        /// Left operand kind
        left: ValueKind,
        /// Right operand kind
        right: ValueKind,
    },

    /// Operand of the wrong kind for a unary operator.
    #[error("invalid operand for '{op}': {kind}")]
    InvalidOperand {
        /// Operator spelling
        op: &'static str,
        /// Operand kind
        kind: ValueKind,
    },

    /// Ordering across kinds that do not order.
    #[error("cannot compare {left} {op} {right}")]
    InvalidComparison {
        /// Operator spelling
        op: &'static str,
        /// Left operand kind
        left: ValueKind,
        /// Right operand kind
        right: ValueKind,
    },

    /// Indexing a value that has no elements or fields.
    #[error("cannot index {0}")]
    NotIndexable(ValueKind),

    /// An index of the wrong kind or out of range.
    #[error("index {index} out of range for {target}")]
    IndexOutOfRange {
        /// The index, rendered
        index: String,
        /// The indexed kind
        target: ValueKind,
    },

    /// Calling something that is not a function.
    #[error("cannot call {0}")]
    NotCallable(ValueKind),

    /// for-in over something that does not iterate.
    #[error("cannot iterate over {0}")]
    NotIterable(ValueKind),

    /// The call-frame stack is full.
    #[error("call stack overflow")]
    StackOverflow,

    /// An operand addressed a register outside the frame window.
    #[error("register {0} outside frame window")]
    RegisterOverflow(usize),

    /// Reading a global that was never set.
    #[error("undefined global '{0}'")]
    UndefinedGlobal(String),

    /// An undecodable instruction word.
    #[error("invalid instruction {0:#010x}")]
    InvalidInstruction(u32),

    /// A host function reported failure.
    #[error("{name}: {message}")]
    Host {
        /// Host function name
        name: String,
        /// Its message
        message: String,
    },
}

/// A runtime error with its position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{file}:{line}: {kind}")]
pub struct RuntimeError {
    /// Source name of the executing prototype
    pub file: String,
    /// Line of the failing instruction
    pub line: u32,
    /// What went wrong
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    /// The message without position.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let err = CompileError {
            file: "main.elo".into(),
            line: 3,
            kind: CompileErrorKind::Redeclaration("x".into()),
        };
        assert_eq!(err.to_string(), "main.elo:3: cannot redeclare 'x'");
    }

    #[test]
    fn test_outside_loop_display() {
        let kind = CompileErrorKind::OutsideLoop(BranchKind::Continue);
        assert_eq!(kind.to_string(), "continue outside loop");
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError {
            file: "x.elo".into(),
            line: 7,
            kind: RuntimeErrorKind::TypeMismatch {
                op: "+",
                left: ValueKind::Number,
                right: ValueKind::Nil,
            },
        };
        assert_eq!(err.to_string(), "x.elo:7: invalid operands for '+': number and nil");
    }

    #[test]
    fn test_parse_error_display_and_conversion() {
        let err: Error = ParseError {
            file: "a.elo".into(),
            line: 1,
            message: "unexpected ')'".into(),
        }
        .into();
        assert_eq!(err.to_string(), "a.elo:1: syntax error: unexpected ')'");
        assert_eq!(err.line(), Some(1));
    }
}
