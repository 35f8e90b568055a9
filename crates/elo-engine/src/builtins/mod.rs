//! Built-in host functions.
//!
//! Everything here goes through the ordinary host calling convention, so
//! scripts see builtins as plain globals and can shadow them:
//! - `console`: `print`, `println`
//! - `global`: `type`, `isnumber` and the `string`/`number`/`bool` conversions
//! - `object`: `len`, `append`, `setparent`
//! - `channel`: `chan`, `send`, `recv`

pub mod channel;
pub mod console;
pub mod global;
pub mod object;

use crate::runtime::HostFn;
use crate::vm::Vm;

/// Every builtin, by global name.
pub const BUILTINS: &[(&str, HostFn)] = &[
    ("print", console::print),
    ("println", console::println),
    ("type", global::type_of),
    ("isnumber", global::is_number),
    ("string", global::string),
    ("number", global::number),
    ("bool", global::boolean),
    ("len", object::len),
    ("append", object::append),
    ("setparent", object::set_parent),
    ("chan", channel::chan),
    ("send", channel::send),
    ("recv", channel::recv),
];

/// Defines all builtins as globals of `vm`.
pub fn register(vm: &mut Vm) {
    for (name, func) in BUILTINS {
        vm.register_host(name, *func);
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::compiler::compile;
    use crate::error::RuntimeError;
    use crate::parser::Parser;
    use crate::runtime::Value;
    use crate::vm::{Vm, VmConfig};

    /// Runs `src` on a fresh VM with the builtins installed.
    pub fn eval(src: &str) -> Result<Value, RuntimeError> {
        let mut vm = Vm::new(VmConfig::default());
        super::register(&mut vm);
        let program = Parser::new(src).parse_program().expect("source should parse");
        let proto = compile(&program, "test").expect("source should compile");
        vm.run(proto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VmConfig;

    #[test]
    fn test_register_defines_every_builtin() {
        let mut vm = Vm::new(VmConfig::default());
        register(&mut vm);
        let names = vm.global_names();
        for (name, _) in BUILTINS {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
        assert_eq!(names.len(), BUILTINS.len());
    }

    #[test]
    fn test_builtins_can_be_shadowed() {
        let result = test_util::eval("len := func(x) { return 42 }; len([1])").unwrap();
        assert_eq!(result, crate::runtime::Value::Number(42.0));
    }
}
