//! Runtime value model.

pub mod function;
pub mod object;
pub mod value;

pub use function::{Callable, Closure, HostCall, HostFn, Upvalue, UpvalueRef};
pub use object::{Array, Channel, Object};
pub use value::{Value, ValueKind};
