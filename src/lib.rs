//! Kernel to IL flow graph builder
//!
//! Translates the functions of a structured kernel program into single-entry
//! IL control-flow graphs: basic blocks of instructions ending in one control
//! transfer, with explicit context objects for captured variables, exception
//! regions for try/catch, inlined finalizers and resumption points for
//! generators.
//!
//! # Example
//!
//! ```no_run
//! use kernel_il::driver::CompileUnit;
//! use kernel_il::util::config::BuilderConfig;
//! use std::path::Path;
//!
//! fn main() -> kernel_il::Result<()> {
//!     let program = kernel_il::read_program(Path::new("program.json"))?;
//!     let unit = CompileUnit::new(&program, BuilderConfig::default())?;
//!     for (function, graph) in unit.compile_all(&unit.compilable_functions()) {
//!         println!("{}: {} blocks", unit.store().qualified_name(function), graph?.block_count());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod driver;
pub mod frontend;
pub mod il;
pub mod kernel;
pub mod object;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use frontend::{BuildError, BuildResult};
pub use il::FlowGraph;

use std::fs;
use std::path::Path;
use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = "kernel-il";

/// Read a kernel program serialized as JSON
pub fn read_program(path: &Path) -> Result<kernel::Program> {
    debug!("reading program {}", path.display());
    let source = fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let program = serde_json::from_str(&source)
        .with_context(|| format!("Failed to parse kernel program: {}", path.display()))?;
    Ok(program)
}
