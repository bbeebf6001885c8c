//! Ship - a small dynamically-typed scripting language
//!
//! Source is compiled in a single pass straight to bytecode and run on a
//! stack VM with a mark-sweep collector.

pub mod token;
pub mod lexer;
pub mod scope;
pub mod bytecode;
pub mod value;
pub mod object;
pub mod gc;
pub mod builtins;
pub mod compiler;
pub mod vm;
pub mod config;
pub mod error;

pub use compiler::compile;
pub use config::VmConfig;
pub use error::{ErrorClass, ErrorKind, Result, ShipError};
pub use lexer::Lexer;
pub use value::Value;
pub use vm::VM;

/// Convenience function to run Ship code, printing to stdout
pub fn run(source: &str) -> Result<()> {
    let mut vm = VM::new();
    let function = compile(source, &mut vm.heap)?;
    vm.interpret(function)
}

/// Run Ship code with `config` and return everything it printed
pub fn run_captured(source: &str, config: VmConfig) -> Result<Vec<String>> {
    let mut vm = VM::with_config(config);
    vm.capture_output();
    let function = compile(source, &mut vm.heap)?;
    vm.interpret(function)?;
    Ok(vm.take_output())
}

/// Version of the Ship language
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
