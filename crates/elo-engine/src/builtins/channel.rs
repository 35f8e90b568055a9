//! Channel builtins.
//!
//! Script-side channel operations never block: `recv` on an empty channel
//! yields nil and `send` on a full one fails.

use crate::runtime::{Channel, HostCall, Value};

fn channel_arg(call: &HostCall, func: &str) -> Result<Channel, String> {
    match call.arg(0) {
        Value::Channel(channel) => Ok(channel),
        other => Err(format!("{} expects a channel, got {}", func, other.type_name())),
    }
}

/// `chan([capacity])`
pub fn chan(call: &mut HostCall) -> Result<(), String> {
    let capacity = match call.arg(0) {
        Value::Nil => None,
        value => match value.as_integer() {
            Some(n) if n >= 0 => Some(n as usize),
            _ => return Err(format!("invalid channel capacity {}", value)),
        },
    };
    call.push_result(Value::Channel(Channel::new(capacity)));
    Ok(())
}

/// `send(ch, value)`
pub fn send(call: &mut HostCall) -> Result<(), String> {
    let channel = channel_arg(call, "send")?;
    channel.try_send(call.arg(1))
}

/// `recv(ch)`
pub fn recv(call: &mut HostCall) -> Result<(), String> {
    let channel = channel_arg(call, "recv")?;
    call.push_result(channel.try_recv().unwrap_or_default());
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_util::eval;
    use crate::error::RuntimeErrorKind;
    use crate::runtime::Value;

    #[test]
    fn test_send_then_recv() {
        let src = "ch := chan(); send(ch, 1); send(ch, 'two'); a := recv(ch); b := recv(ch); string(a) + b";
        assert_eq!(eval(src).unwrap(), Value::from("1two"));
    }

    #[test]
    fn test_recv_on_empty_is_nil() {
        assert_eq!(eval("recv(chan())").unwrap(), Value::Nil);
    }

    #[test]
    fn test_send_on_full_channel_fails() {
        let err = eval("ch := chan(1); send(ch, 1); send(ch, 2)").unwrap_err();
        assert_eq!(
            err.kind,
            RuntimeErrorKind::Host {
                name: "send".into(),
                message: "channel is full".into()
            }
        );
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(eval("chan(-1)").is_err());
        assert!(eval("chan('x')").is_err());
    }

    #[test]
    fn test_host_thread_receives() {
        use crate::runtime::Channel;

        let channel = Channel::new(None);
        let receiver = channel.receiver();
        let mut vm = crate::vm::Vm::new(Default::default());
        crate::builtins::register(&mut vm);
        vm.set_global("out", Value::Channel(channel));
        let program = crate::parser::Parser::new("send(out, 7)").parse_program().unwrap();
        vm.run(crate::compiler::compile(&program, "test").unwrap())
            .unwrap();

        let handle = std::thread::spawn(move || receiver.recv().unwrap());
        assert_eq!(handle.join().unwrap(), Value::Number(7.0));
    }
}
