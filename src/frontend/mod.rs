//! Kernel 到 IL 的前端
//!
//! Builds the flow graph of one function of a loaded kernel program. The
//! pieces, bottom-up:
//!
//! - [`fragment`]: open/closed instruction sequences and their composition
//! - [`base_builder`]: the expression stack, block ids and instruction
//!   factories
//! - [`control_stack`]: break/continue/finally targets of nested statements
//! - [`scope_builder`]: the pre-pass deciding where each variable lives
//! - [`flow_graph_builder`]: the per-function driver, with statement,
//!   expression and dispatcher translation in sibling modules

pub mod active_class;
pub mod base_builder;
pub mod constant_evaluator;
pub mod control_stack;
pub mod error;
pub mod flow_graph_builder;
pub mod fragment;
pub mod scope;
pub mod scope_builder;
pub mod translation_helper;

mod dispatchers;
mod expressions;
mod statements;

pub use error::{BuildError, BuildResult};
pub use flow_graph_builder::FlowGraphBuilder;
pub use fragment::Fragment;
pub use translation_helper::TranslationHelper;

#[cfg(test)]
mod tests;
