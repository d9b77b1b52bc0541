//! IL 单元测试

use crate::il::graph::{FlowGraph, GraphArena, GraphError};
use crate::il::instruction::{CallShape, ConstantValue, InstrId, InstrKind, Instruction, Token};
use crate::il::printer::{GraphPrinter, GraphSummary, PrinterConfig};
use crate::object::FunctionId;

fn entry(
    arena: &mut GraphArena,
    block_id: usize,
) -> InstrId {
    arena.add(Instruction::new(InstrKind::TargetEntry { block_id, try_index: None }))
}

/// Append `kinds` to the chain ending at `last`
fn append(
    arena: &mut GraphArena,
    mut last: InstrId,
    kinds: Vec<InstrKind>,
) -> InstrId {
    for kind in kinds {
        let id = arena.add(Instruction::new(kind));
        arena.link(last, id);
        last = id;
    }
    last
}

fn graph_entry(
    arena: &mut GraphArena,
    normal_entry: InstrId,
) -> InstrId {
    arena.add(Instruction::new(InstrKind::GraphEntry {
        block_id: 0,
        normal_entry: Some(normal_entry),
        catch_entries: Vec::new(),
        osr_id: None,
    }))
}

/// B1 branches to B2 and B3, both jump to the join B4 which returns
fn diamond() -> FlowGraph {
    let mut arena = GraphArena::new();
    let b1 = entry(&mut arena, 1);
    let b2 = entry(&mut arena, 2);
    let b3 = entry(&mut arena, 3);
    let b4 = arena.add(Instruction::new(InstrKind::JoinEntry { block_id: 4, try_index: None }));

    let condition = append(&mut arena, b1, vec![InstrKind::Constant(ConstantValue::Bool(true))]);
    let branch = arena.add(
        Instruction::new(InstrKind::Branch {
            true_successor: b2,
            false_successor: b3,
        })
        .with_inputs([condition]),
    );
    arena.link(condition, branch);
    append(&mut arena, b2, vec![InstrKind::Goto { target: b4 }]);
    append(&mut arena, b3, vec![InstrKind::Goto { target: b4 }]);
    let value = append(&mut arena, b4, vec![InstrKind::Constant(ConstantValue::Null)]);
    let ret = arena.add(Instruction::new(InstrKind::Return).with_inputs([value]));
    arena.link(value, ret);

    let entry = graph_entry(&mut arena, b1);
    FlowGraph::new(FunctionId(0), "diamond".to_string(), arena, entry, Vec::new(), 4, 0, None)
}

// ===== 图结构 =====

#[test]
fn test_blocks_are_discovered_in_preorder() {
    let graph = diamond();
    let ids: Vec<Option<usize>> = graph.blocks().iter().map(|&b| graph.instruction(b).block_id()).collect();
    assert_eq!(ids, vec![Some(0), Some(1), Some(2), Some(4), Some(3)]);
    assert_eq!(graph.body_block_count(), 4);
    assert_eq!(graph.terminator_count(), 4);
    assert!(graph.verify().is_ok());
}

#[test]
fn test_join_has_both_predecessors() {
    let graph = diamond();
    let join = graph.find_block(4).unwrap();
    let preds: Vec<Option<usize>> = graph
        .predecessors(join)
        .iter()
        .map(|&p| graph.instruction(p).block_id())
        .collect();
    assert_eq!(preds.len(), 2);
    assert!(preds.contains(&Some(2)));
    assert!(preds.contains(&Some(3)));
    assert_eq!(graph.count("Goto"), 2);
    assert_eq!(graph.count("Return"), 1);
}

#[test]
fn test_unreachable_blocks_are_not_listed() {
    let mut arena = GraphArena::new();
    let b1 = entry(&mut arena, 1);
    let dead = entry(&mut arena, 2);
    append(&mut arena, dead, vec![InstrKind::Constant(ConstantValue::Null)]);
    let value = append(&mut arena, b1, vec![InstrKind::Constant(ConstantValue::Int(1))]);
    let ret = arena.add(Instruction::new(InstrKind::Return).with_inputs([value]));
    arena.link(value, ret);
    let graph_entry = graph_entry(&mut arena, b1);

    let graph = FlowGraph::new(FunctionId(0), "f".to_string(), arena, graph_entry, Vec::new(), 2, 0, None);
    assert!(graph.find_block(2).is_none());
    assert!(graph.verify().is_ok());
}

// ===== 校验 =====

#[test]
fn test_missing_terminator_is_rejected() {
    let mut arena = GraphArena::new();
    let b1 = entry(&mut arena, 1);
    append(&mut arena, b1, vec![InstrKind::Constant(ConstantValue::Null)]);
    let graph_entry = graph_entry(&mut arena, b1);

    let graph = FlowGraph::new(FunctionId(0), "f".to_string(), arena, graph_entry, Vec::new(), 1, 0, None);
    assert!(matches!(graph.verify(), Err(GraphError::MissingTerminator { block: 1 })));
}

#[test]
fn test_early_terminator_is_rejected() {
    let mut arena = GraphArena::new();
    let b1 = entry(&mut arena, 1);
    let b2 = entry(&mut arena, 2);
    append(&mut arena, b2, vec![InstrKind::TailCall { code: "stub".to_string() }]);
    append(
        &mut arena,
        b1,
        vec![InstrKind::Goto { target: b2 }, InstrKind::TailCall { code: "stub".to_string() }],
    );
    let graph_entry = graph_entry(&mut arena, b1);

    let graph = FlowGraph::new(FunctionId(0), "f".to_string(), arena, graph_entry, Vec::new(), 2, 0, None);
    assert!(matches!(graph.verify(), Err(GraphError::EarlyTerminator { block: 1 })));
}

#[test]
fn test_duplicate_block_id_is_rejected() {
    let mut arena = GraphArena::new();
    let b1 = entry(&mut arena, 1);
    let again = entry(&mut arena, 1);
    append(&mut arena, again, vec![InstrKind::TailCall { code: "stub".to_string() }]);
    append(&mut arena, b1, vec![InstrKind::Goto { target: again }]);
    let graph_entry = graph_entry(&mut arena, b1);

    let graph = FlowGraph::new(FunctionId(0), "f".to_string(), arena, graph_entry, Vec::new(), 1, 0, None);
    assert!(matches!(graph.verify(), Err(GraphError::DuplicateBlockId(1))));
}

// ===== 指令 =====

#[test]
fn test_operator_tokens() {
    assert_eq!(Token::from_method_name("+"), Token::Add);
    assert_eq!(Token::from_method_name("[]="), Token::AssignIndex);
    assert_eq!(Token::from_method_name("get:length"), Token::Get);
    assert_eq!(Token::from_method_name("set:length"), Token::Set);
    assert_eq!(Token::from_method_name("toString"), Token::Illegal);
    assert_eq!(Token::Lt.checked_argument_count(), 2);
    assert_eq!(Token::Get.checked_argument_count(), 1);
}

#[test]
fn test_call_shape_counts_type_argument_vector() {
    let shape = CallShape::new(1, 3, vec!["b".to_string()]);
    assert_eq!(shape.pushed_count(), 4);
    let descriptor = shape.descriptor();
    assert_eq!(descriptor.positional_count(), 2);
    assert_eq!(descriptor.named_count(), 1);
    assert_eq!(CallShape::positional(2).pushed_count(), 2);
}

#[test]
fn test_constant_display() {
    let list = ConstantValue::Array(vec![ConstantValue::Int(1), ConstantValue::String("a\"b".to_string())]);
    assert_eq!(list.to_string(), "[1, \"a\\\"b\"]");
    assert!(ConstantValue::Double(1.5).is_number());
    assert!(!ConstantValue::Null.is_number());
}

// ===== 渲染 =====

#[test]
fn test_printer_lists_blocks_and_predecessors() {
    let text = GraphPrinter::new().render(&diamond());
    assert!(text.starts_with("==== diamond ===="));
    assert!(text.contains("GraphEntry(B0 -> B1)"));
    assert!(text.contains("Branch("));
    assert!(text.contains("JoinEntry(B4) pred("));

    let quiet = GraphPrinter::with_config(PrinterConfig {
        show_predecessors: false,
        ..PrinterConfig::default()
    })
    .render(&diamond());
    assert!(!quiet.contains("pred("));
}

#[test]
fn test_summary_serializes_to_json() {
    let summary = GraphSummary::new(&diamond());
    assert_eq!(summary.blocks.len(), 5);
    let b1 = &summary.blocks[1];
    assert_eq!(b1.kind, "TargetEntry");
    assert_eq!(b1.successors, vec![2, 3]);
    assert_eq!(b1.instructions, vec!["Constant", "Branch"]);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["name"], "diamond");
    assert_eq!(json["blocks"][0]["kind"], "GraphEntry");
}
