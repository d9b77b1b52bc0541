//! 编译驱动
//!
//! Loads a kernel program once and builds flow graphs for its functions,
//! either one at a time or all of them on the rayon pool. Each function gets
//! its own [`FlowGraphBuilder`]; the reader and the object store are shared
//! read-only between workers.

use crate::frontend::error::BuildResult;
use crate::frontend::flow_graph_builder::FlowGraphBuilder;
use crate::frontend::translation_helper::TranslationHelper;
use crate::il::graph::FlowGraph;
use crate::kernel::ast::Program;
use crate::kernel::reader::KernelReader;
use crate::object::{Function, FunctionId, FunctionKind, ObjectStore};
use crate::util::config::BuilderConfig;
use rayon::prelude::*;
use tracing::{debug, info};

/// A loaded program ready for graph building
#[derive(Debug)]
pub struct CompileUnit<'p> {
    reader: KernelReader<'p>,
    store: ObjectStore,
    config: BuilderConfig,
}

impl<'p> CompileUnit<'p> {
    pub fn new(
        program: &'p Program,
        config: BuilderConfig,
    ) -> BuildResult<Self> {
        let reader = KernelReader::new(program);
        let store = ObjectStore::load(program)?;
        Ok(Self { reader, store, config })
    }

    #[inline]
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Function by its qualified name, `Class.member` or a top-level name
    pub fn lookup(
        &self,
        qualified_name: &str,
    ) -> Option<FunctionId> {
        self.store
            .functions()
            .find(|f| self.store.qualified_name(f.id) == qualified_name)
            .map(|f| f.id)
    }

    /// Functions of the loaded libraries that have a graph to build, in
    /// declaration order. Core library functions are left out, and so are
    /// implicit closures: they only forward a tear-off and are built on
    /// demand with [`CompileUnit::build_function`].
    pub fn compilable_functions(&self) -> Vec<FunctionId> {
        let core = self.store.core().library;
        self.store
            .functions()
            .filter(|f| self.store.class(f.owner).library != core)
            .filter(|f| f.kind != FunctionKind::ImplicitClosure)
            .filter(|f| has_graph(f))
            .map(|f| f.id)
            .collect()
    }

    /// Build the graph of one function
    pub fn build_function(
        &self,
        function: FunctionId,
    ) -> BuildResult<FlowGraph> {
        let helper = TranslationHelper::new(&self.reader, &self.store);
        FlowGraphBuilder::new(helper, function, self.config.clone()).build_graph()
    }

    /// Build the graphs of `functions` in parallel; results keep the input order
    pub fn compile_all(
        &self,
        functions: &[FunctionId],
    ) -> Vec<(FunctionId, BuildResult<FlowGraph>)> {
        debug!(functions = functions.len(), "compiling in parallel");
        let results: Vec<_> = functions
            .par_iter()
            .map(|&function| (function, self.build_function(function)))
            .collect();
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(built = results.len() - failed, failed, "compilation finished");
        results
    }
}

/// Abstract members and external non-natives have no body
fn has_graph(function: &Function) -> bool {
    !function.is_abstract && !(function.is_external && !function.is_native())
}
