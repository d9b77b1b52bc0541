//! 流图渲染器
//!
//! Text and JSON renderings of a [`FlowGraph`], used by the CLI and by tests
//! that compare graph shapes.

use crate::il::graph::FlowGraph;
use crate::il::instruction::{InstrId, InstrKind, Instruction};
use crate::object::ObjectStore;
use serde::Serialize;
use std::fmt::Write;

/// 渲染器配置
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// 显示 token 位置
    pub show_positions: bool,
    /// 显示 deopt id
    pub show_deopt_ids: bool,
    /// 显示前驱块
    pub show_predecessors: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            show_positions: false,
            show_deopt_ids: true,
            show_predecessors: true,
        }
    }
}

/// Renders graphs as text, one instruction per line
#[derive(Debug, Clone, Default)]
pub struct GraphPrinter<'a> {
    config: PrinterConfig,
    store: Option<&'a ObjectStore>,
}

impl<'a> GraphPrinter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PrinterConfig) -> Self {
        Self { config, store: None }
    }

    /// Resolve function, class and field names through `store`
    pub fn with_store(
        mut self,
        store: &'a ObjectStore,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn render(
        &self,
        graph: &FlowGraph,
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "==== {} ====", graph.name);
        for &block in graph.blocks() {
            for id in graph.block_instructions(block) {
                let instruction = graph.instruction(id);
                let indent = if id == block { "" } else { "    " };
                let _ = write!(out, "{}{}", indent, self.render_instruction(graph, id, instruction));
                if id == block && self.config.show_predecessors {
                    let predecessors = graph.predecessors(block);
                    if !predecessors.is_empty() {
                        let names: Vec<String> = predecessors
                            .iter()
                            .map(|&p| self.block_name(graph, p))
                            .collect();
                        let _ = write!(out, " pred({})", names.join(", "));
                    }
                }
                let _ = writeln!(out);
            }
        }
        out
    }

    fn block_name(
        &self,
        graph: &FlowGraph,
        block: InstrId,
    ) -> String {
        match graph.instruction(block).block_id() {
            Some(id) => format!("B{}", id),
            None => block.to_string(),
        }
    }

    fn function_name(
        &self,
        id: crate::object::FunctionId,
    ) -> String {
        match self.store {
            Some(store) => store.qualified_name(id),
            None => format!("fn#{}", id.0),
        }
    }

    fn field_name(
        &self,
        id: crate::object::FieldId,
    ) -> String {
        match self.store {
            Some(store) => store.field(id).name.clone(),
            None => format!("field#{}", id.0),
        }
    }

    fn render_instruction(
        &self,
        graph: &FlowGraph,
        id: InstrId,
        instruction: &Instruction,
    ) -> String {
        let mut line = String::new();
        if instruction.is_definition() {
            let _ = write!(line, "{} <- ", id);
        }
        line.push_str(instruction.mnemonic());
        let detail = self.detail(graph, instruction);
        let inputs: Vec<String> = instruction.inputs.iter().map(InstrId::to_string).collect();
        let mut args = Vec::new();
        if !detail.is_empty() {
            args.push(detail);
        }
        args.extend(inputs);
        if !args.is_empty() {
            let _ = write!(line, "({})", args.join(", "));
        }
        if self.config.show_deopt_ids {
            if let Some(deopt_id) = instruction.deopt_id {
                let _ = write!(line, " deopt:{}", deopt_id);
            }
        }
        if self.config.show_positions && instruction.position.is_real() {
            let _ = write!(line, " {}", instruction.position);
        }
        line
    }

    fn detail(
        &self,
        graph: &FlowGraph,
        instruction: &Instruction,
    ) -> String {
        let block = |id: InstrId| self.block_name(graph, id);
        match &instruction.kind {
            InstrKind::GraphEntry {
                block_id,
                normal_entry,
                catch_entries,
                osr_id,
            } => {
                let mut s = format!("B{}", block_id);
                if let Some(normal) = normal_entry {
                    let _ = write!(s, " -> {}", block(*normal));
                }
                for catch in catch_entries {
                    let _ = write!(s, ", catch {}", block(*catch));
                }
                if let Some(osr) = osr_id {
                    let _ = write!(s, ", osr {}", osr);
                }
                s
            }
            InstrKind::TargetEntry { block_id, try_index } | InstrKind::JoinEntry { block_id, try_index } => {
                match try_index {
                    Some(t) => format!("B{} try {}", block_id, t),
                    None => format!("B{}", block_id),
                }
            }
            InstrKind::CatchBlockEntry {
                block_id,
                catch_try_index,
                handler_types,
                needs_stacktrace,
                ..
            } => {
                let types: Vec<String> = handler_types.iter().map(|t| t.to_string()).collect();
                format!(
                    "B{} catches {} [{}]{}",
                    block_id,
                    catch_try_index,
                    types.join(", "),
                    if *needs_stacktrace { " stacktrace" } else { "" }
                )
            }
            InstrKind::Goto { target } => block(*target),
            InstrKind::Branch {
                true_successor,
                false_successor,
            } => {
                let comparison = instruction
                    .inputs
                    .first()
                    .map(|&c| self.render_instruction(graph, c, graph.instruction(c)))
                    .unwrap_or_default();
                format!("if {} goto {} else {}", comparison, block(*true_successor), block(*false_successor))
            }
            InstrKind::ReThrow {
                catch_try_index: Some(index),
            } => format!("try {}", index),
            InstrKind::TailCall { code } => code.clone(),
            InstrKind::Constant(value) => value.to_string(),
            InstrKind::Parameter { index } => index.to_string(),
            InstrKind::LoadLocal { variable } | InstrKind::StoreLocal { variable } => {
                graph.variable(*variable).name.clone()
            }
            InstrKind::DropTemps { count } => count.to_string(),
            InstrKind::StrictCompare {
                kind,
                needs_number_check,
            } => {
                if *needs_number_check {
                    format!("{}, number check", kind.as_str())
                } else {
                    kind.as_str().to_string()
                }
            }
            InstrKind::InstanceOf { ty } => ty.to_string(),
            InstrKind::AssertAssignable { ty, name } => format!("{} '{}'", ty, name),
            InstrKind::AssertSubtype {
                sub_type,
                super_type,
                name,
            } => format!("{} <: {} '{}'", sub_type, super_type, name),
            InstrKind::CheckNull { function_name } => function_name.clone(),
            InstrKind::CheckStackOverflow { loop_depth } => format!("depth {}", loop_depth),
            InstrKind::ClosureCall { shape } => format!("args {}", shape.argument_count),
            InstrKind::InstanceCall { name, shape, .. } => format!("{}, args {}", name, shape.argument_count),
            InstrKind::StaticCall { target, shape } => {
                format!("{}, args {}", self.function_name(*target), shape.argument_count)
            }
            InstrKind::NativeCall { name, .. } => name.clone(),
            InstrKind::LoadField { slot } => slot.to_string(),
            InstrKind::StoreInstanceField {
                slot,
                emit_store_barrier,
                ..
            } => {
                if *emit_store_barrier {
                    format!("{}, barrier", slot)
                } else {
                    slot.to_string()
                }
            }
            InstrKind::InitStaticField { field }
            | InstrKind::StoreStaticField { field }
            | InstrKind::GuardFieldClass { field }
            | InstrKind::GuardFieldLength { field } => self.field_name(*field),
            InstrKind::AllocateObject {
                class,
                closure_function,
            } => {
                let class = match self.store {
                    Some(store) => store.class(*class).name.clone(),
                    None => format!("class#{}", class.0),
                };
                match closure_function {
                    Some(f) => format!("{} {}", class, self.function_name(*f)),
                    None => class,
                }
            }
            InstrKind::InstantiateType { ty } => ty.to_string(),
            InstrKind::InstantiateTypeArguments { type_arguments } => {
                let types: Vec<String> = type_arguments.iter().map(|t| t.to_string()).collect();
                format!("<{}>", types.join(", "))
            }
            InstrKind::AllocateContext { num_variables } | InstrKind::CloneContext { num_variables } => {
                num_variables.to_string()
            }
            _ => String::new(),
        }
    }
}

/// Serializable outline of a graph
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub name: String,
    pub max_block_id: usize,
    pub deopt_id_count: usize,
    pub blocks: Vec<BlockSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub id: usize,
    pub kind: &'static str,
    pub try_index: Option<usize>,
    pub predecessors: Vec<usize>,
    pub successors: Vec<usize>,
    pub instructions: Vec<&'static str>,
}

impl GraphSummary {
    pub fn new(graph: &FlowGraph) -> Self {
        let block_id = |id: InstrId| graph.instruction(id).block_id().unwrap_or(usize::MAX);
        let blocks = graph
            .blocks()
            .iter()
            .map(|&block| {
                let entry = graph.instruction(block);
                BlockSummary {
                    id: block_id(block),
                    kind: entry.mnemonic(),
                    try_index: entry.try_index(),
                    predecessors: graph.predecessors(block).iter().map(|&p| block_id(p)).collect(),
                    successors: graph.successors(block).into_iter().map(block_id).collect(),
                    instructions: graph
                        .block_instructions(block)
                        .skip(1)
                        .map(|i| graph.instruction(i).mnemonic())
                        .collect(),
                }
            })
            .collect();
        GraphSummary {
            name: graph.name.clone(),
            max_block_id: graph.max_block_id(),
            deopt_id_count: graph.deopt_id_count(),
            blocks,
        }
    }
}
