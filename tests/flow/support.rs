//! 集成测试共用的程序构造与图查询

use kernel_il::driver::CompileUnit;
use kernel_il::il::instruction::InstrId;
use kernel_il::kernel::ast::{FunctionNode, Procedure, Program, Statement, VariableDeclaration};
use kernel_il::kernel::builder::ProgramBuilder;
use kernel_il::kernel::NameIndex;
use kernel_il::util::config::BuilderConfig;
use kernel_il::FlowGraph;

pub const LIBRARY_URI: &str = "file:///test.k";

/// Program with one library holding the returned top-level procedures
pub fn program_with(build: impl FnOnce(&ProgramBuilder, NameIndex) -> Vec<Procedure>) -> Program {
    let b = ProgramBuilder::new();
    let lib = b.library_name(LIBRARY_URI);
    let procedures = build(&b, lib);
    let mut library = b.library(lib);
    library.procedures = procedures;
    b.add_library(library);
    b.finish()
}

/// Top-level function `name(params) { body }`
pub fn top_level(
    b: &ProgramBuilder,
    lib: NameIndex,
    name: &str,
    params: Vec<VariableDeclaration>,
    body: Vec<Statement>,
) -> Procedure {
    let function = b.function(params, Some(b.block(body)));
    b.static_method(b.method_name(lib, lib, name), function)
}

pub fn top_level_node(
    b: &ProgramBuilder,
    lib: NameIndex,
    name: &str,
    function: FunctionNode,
) -> Procedure {
    b.static_method(b.method_name(lib, lib, name), function)
}

pub fn build(
    program: &Program,
    name: &str,
) -> FlowGraph {
    build_with(program, name, BuilderConfig::default())
}

/// Build `name` and check the block structure
pub fn build_with(
    program: &Program,
    name: &str,
    config: BuilderConfig,
) -> FlowGraph {
    let unit = CompileUnit::new(program, config).unwrap();
    let function = unit.lookup(name).unwrap_or_else(|| panic!("no function {}", name));
    let graph = unit.build_function(function).unwrap();
    graph.verify().unwrap();
    graph
}

/// Instruction mnemonics of a block, entry first
pub fn mnemonics(
    graph: &FlowGraph,
    block: InstrId,
) -> Vec<&'static str> {
    graph
        .block_instructions(block)
        .map(|i| graph.instruction(i).mnemonic())
        .collect()
}

/// Blocks whose entry has the given mnemonic
pub fn blocks_of_kind<'g>(
    graph: &'g FlowGraph,
    mnemonic: &'g str,
) -> impl Iterator<Item = InstrId> + 'g {
    graph
        .blocks()
        .iter()
        .copied()
        .filter(move |&b| graph.instruction(b).mnemonic() == mnemonic)
}
