//! Output builtins.

use crate::runtime::{HostCall, Value};
use std::io::Write;

fn join(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `println(...)` - prints its arguments space-separated, then a newline.
pub fn println(call: &mut HostCall) -> Result<(), String> {
    println!("{}", join(&call.args));
    Ok(())
}

/// `print(...)` - like `println` without the newline.
pub fn print(call: &mut HostCall) -> Result<(), String> {
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", join(&call.args)).map_err(|e| e.to_string())?;
    stdout.flush().map_err(|e| e.to_string())
}
