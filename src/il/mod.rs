//! Intermediate language
//!
//! Instructions, the arena they live in, the finished [`FlowGraph`], and a
//! printer for it.

pub mod graph;
pub mod instruction;
pub mod printer;

pub use graph::{FlowGraph, GraphArena, GraphError};
pub use instruction::{CallShape, ConstantValue, InstrId, InstrKind, Instruction, Slot, Token};

#[cfg(test)]
mod tests;
