// delbrot: evaluator for mkvsynth pipeline scripts.

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod span;
pub mod token;


// Re-export commonly used types
pub use ast::{Node, NodeKind, Program};
pub use config::Settings;
pub use diagnostics::{BufferReporter, ConsoleReporter, Reporter};
pub use runtime::{
    ArgList, ErrorKind, Flow, Interpreter, NativeFn, RuntimeError, RuntimeResult, Value,
    ValueKind,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> String {
    format!("delbrot v{}", VERSION)
}

/// Parses and runs `source` with a fresh interpreter.
pub fn run_script(source: &str, settings: &Settings) -> RuntimeResult<Interpreter> {
    let mut interpreter = Interpreter::with_settings(settings);
    interpreter.run_source(source)?;
    Ok(interpreter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(ver.contains("delbrot"));
        assert!(ver.ends_with(VERSION));
    }
}
