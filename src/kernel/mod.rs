//! Kernel input model
//!
//! The resolved, offset-addressed program representation consumed by the
//! flow graph builder, its string and canonical name tables, and an offset
//! index over it.

pub mod ast;
pub mod builder;
pub mod names;
pub mod reader;

pub use ast::{NodeOffset, Program};
pub use names::{CanonicalNameTable, NameIndex, StringIndex, StringTable};
pub use reader::KernelReader;

#[cfg(test)]
mod tests;
