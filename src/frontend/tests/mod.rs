//! 前端单元测试
//!
//! Fragment composition, expression stack discipline, context chains and the
//! control stack, exercised on a bare [`BaseFlowGraphBuilder`].

use crate::frontend::active_class::ActiveClass;
use crate::frontend::base_builder::{BaseFlowGraphBuilder, BlockAllocator};
use crate::frontend::control_stack::ControlStack;
use crate::frontend::fragment::{Fragment, GraphHandle};
use crate::frontend::scope::{LocalVariable, VarId, VariableKind};
use crate::il::graph::GraphArena;
use crate::il::instruction::{ConstantValue, InstrKind, Slot};
use crate::kernel::builder::ProgramBuilder;
use crate::object::ObjectStore;
use crate::util::config::BuilderConfig;
use crate::util::span::TokenPosition;
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

fn builder<'a>() -> BaseFlowGraphBuilder<'a> {
    let context = LocalVariable::new(":current_context_var", VariableKind::Synthetic);
    BaseFlowGraphBuilder::new(BuilderConfig::default(), vec![context], VarId(0), 0)
}

/// Integer constants of the fragment in chain order
fn int_values(
    base: &BaseFlowGraphBuilder<'_>,
    fragment: &Fragment,
) -> Vec<i64> {
    let graph = base.graph().borrow();
    fragment
        .instructions()
        .into_iter()
        .filter_map(|id| match graph[id].kind {
            InstrKind::Constant(ConstantValue::Int(v)) => Some(v),
            _ => None,
        })
        .collect()
}

fn constants(
    base: &mut BaseFlowGraphBuilder<'_>,
    values: &[i64],
) -> Fragment {
    let mut fragment = base.empty();
    for &v in values {
        fragment += base.int_constant(v);
    }
    fragment
}

// ===== Fragment =====

#[test]
fn test_empty_fragment_is_identity() {
    let mut base = builder();
    let one = base.int_constant(1);
    let joined = base.empty() + one;
    assert_eq!(int_values(&base, &joined), vec![1]);
    assert!(joined.is_open());
    assert!(base.empty().is_open());
}

#[test]
fn test_closed_fragment_ignores_appended_code() {
    let mut base = builder();
    let target = base.build_join_entry();
    let mut fragment = base.int_constant(1);
    fragment += base.goto(target);
    assert!(fragment.is_closed());

    let dead = base.int_constant(2);
    fragment += dead;
    assert!(fragment.is_closed());
    assert_eq!(int_values(&base, &fragment), vec![1]);
}

proptest! {
    /// 左结合与右结合拼接得到相同的指令序列
    #[test]
    fn prop_concatenation_is_associative(parts in prop::collection::vec(prop::collection::vec(0i64..100, 0..4), 0..6)) {
        let mut left_base = builder();
        let left_parts: Vec<Fragment> = parts.iter().map(|p| constants(&mut left_base, p)).collect();
        let left = left_parts.into_iter().fold(left_base.empty(), |acc, f| acc + f);

        let mut right_base = builder();
        let right_parts: Vec<Fragment> = parts.iter().map(|p| constants(&mut right_base, p)).collect();
        let empty = right_base.empty();
        let right = right_parts.into_iter().rev().fold(empty, |acc, f| f + acc);

        let expected: Vec<i64> = parts.iter().flatten().copied().collect();
        prop_assert_eq!(int_values(&left_base, &left), expected.clone());
        prop_assert_eq!(int_values(&right_base, &right), expected);
    }
}

// ===== 表达式栈 =====

#[test]
fn test_drop_of_plain_value_emits_nothing() {
    let mut base = builder();
    let _ = base.int_constant(7);
    let dropped = base.drop();
    assert!(dropped.is_empty());
    assert_eq!(base.stack_depth(), 0);
}

#[test]
fn test_drop_of_temporary_emits_drop_temps() {
    let mut base = builder();
    let _ = base.int_constant(7);
    let temp = base.make_temporary();
    assert_eq!(base.make_temporary(), temp);
    assert_eq!(base.variable(temp).kind, VariableKind::Temporary(0));

    let dropped = base.drop();
    let ids = dropped.instructions();
    assert_eq!(ids.len(), 1);
    assert!(matches!(base.graph().borrow()[ids[0]].kind, InstrKind::DropTemps { count: 1 }));
}

#[test]
fn test_drop_temps_preserve_top() {
    let mut base = builder();
    let _ = base.int_constant(1);
    let _ = base.int_constant(2);
    let _ = base.int_constant(3);
    let _ = base.drop_temps_preserve_top(2);
    assert_eq!(base.stack_depth(), 1);
}

#[test]
#[should_panic(expected = "underflow")]
fn test_pop_of_empty_stack_panics() {
    let mut base = builder();
    let _ = base.drop();
}

#[test]
fn test_return_closes_fragment() {
    let mut base = builder();
    let mut body = base.int_constant(0);
    body += base.return_(TokenPosition::NO_SOURCE);
    assert!(body.is_closed());
    assert_eq!(base.stack_depth(), 0);
}

#[test]
fn test_block_ids_are_dense() {
    let mut base = builder();
    let a = base.build_target_entry();
    let b = base.build_join_entry();
    let graph = base.graph().borrow();
    assert!(matches!(graph[a].kind, InstrKind::TargetEntry { block_id: 1, .. }));
    assert!(matches!(graph[b].kind, InstrKind::JoinEntry { block_id: 2, .. }));
}

// ===== 上下文 =====

#[test]
fn test_push_and_pop_context_track_depth() {
    let mut base = builder();
    let _ = base.push_context(2);
    let _ = base.drop();
    assert_eq!(base.context_depth, 1);
    let _ = base.push_context(1);
    let _ = base.drop();
    assert_eq!(base.context_depth, 2);

    let unwind = base.adjust_context_to(0);
    assert_eq!(base.context_depth, 0);
    let parents = {
        let graph = base.graph().borrow();
        unwind
            .instructions()
            .into_iter()
            .filter(|&id| matches!(graph[id].kind, InstrKind::LoadField { slot: Slot::ContextParent }))
            .count()
    };
    assert_eq!(parents, 2);
}

#[test]
fn test_captured_local_walks_context_chain() {
    let mut base = builder();
    let mut captured = LocalVariable::new("x", VariableKind::Declared);
    captured.is_captured = true;
    captured.context_index = Some(3);
    captured.context_level = 1;
    let x = base.add_variable(captured);

    let _ = base.push_context(4);
    let _ = base.drop();
    let _ = base.push_context(1);
    let _ = base.drop();

    let load = base.load_local(x);
    let graph = base.graph().borrow();
    let kinds: Vec<_> = load.instructions().into_iter().map(|id| graph[id].kind.clone()).collect();
    assert!(matches!(kinds[0], InstrKind::LoadLocal { variable: VarId(0) }));
    assert!(matches!(kinds[1], InstrKind::LoadField { slot: Slot::ContextParent }));
    assert!(matches!(kinds[2], InstrKind::LoadField { slot: Slot::ContextVariable(3) }));
    assert_eq!(kinds.len(), 3);
}

// ===== 控制栈 =====

fn allocator() -> BlockAllocator {
    let graph: GraphHandle = Rc::new(RefCell::new(GraphArena::new()));
    BlockAllocator::new(&graph, 1)
}

#[test]
fn test_break_destination_is_allocated_once() {
    let mut blocks = allocator();
    let mut control = ControlStack::new();
    let outer = control.enter_breakable(0);
    let inner = control.enter_breakable(1);
    assert_eq!(control.breakable(inner).index, 1);
    assert!(!control.breakable_had_jumper(outer));

    let first = control.break_destination(0, &mut blocks);
    let second = control.break_destination(0, &mut blocks);
    assert_eq!(first.join, second.join);
    assert_eq!(first.context_depth, 0);
    assert!(control.breakable_had_jumper(outer));
    assert!(!control.breakable_had_jumper(inner));
    assert_eq!(blocks.last_used_block_id(), 1);

    control.exit(inner);
    control.exit(outer);
    assert_eq!(control.depth(), 0);
}

#[test]
fn test_switch_cases_are_numbered_across_nesting() {
    let mut blocks = allocator();
    let mut control = ControlStack::new();
    let outer = control.enter_switch(3, 0);
    let inner = control.enter_switch(2, 0);
    assert_eq!(control.switch(inner).depth, 3);

    // 第 1 个外层 case
    let to_outer = control.switch_destination(1, &mut blocks);
    assert!(control.switch_had_jumper(outer, 1));
    let again = control.switch_destination(1, &mut blocks);
    assert_eq!(again.join, to_outer.join);
    assert_eq!(blocks.last_used_block_id(), 1);
    // 第 0 个内层 case
    let to_inner = control.switch_destination(3, &mut blocks);
    assert!(control.switch_had_jumper(inner, 0));
    assert_ne!(to_outer.join, to_inner.join);

    let direct = control.switch_destination_direct(inner, 0, &mut blocks);
    assert_eq!(direct.join, to_inner.join);

    control.exit(inner);
    control.exit(outer);
}

#[test]
fn test_try_index_follows_innermost_try_catch() {
    let mut control = ControlStack::new();
    assert_eq!(control.current_try_index(), None);
    let outer = control.enter_try_catch(0);
    let inner = control.enter_try_catch(1);
    assert_eq!(control.current_try_index(), Some(1));
    control.exit(inner);
    assert_eq!(control.current_try_index(), Some(0));
    control.exit(outer);
    assert_eq!(control.current_try_index(), None);
}

#[test]
fn test_try_finally_remembers_visible_frames() {
    let finalizer = ProgramBuilder::new().empty();
    let mut control = ControlStack::new();
    let label = control.enter_breakable(0);
    let finally = control.enter_try_finally(&finalizer, 0, 1);
    let block = control.try_finally(finally);
    assert_eq!(block.breakable_top, Some(label));
    assert_eq!(block.try_depth, 0);
    assert_eq!(control.try_finally_top(), Some(finally));
    control.exit(finally);
    control.exit(label);
    assert_eq!(control.try_finally_top(), None);
}

proptest! {
    /// 任意嵌套按相反顺序退出后栈为空；同一标签的目标只分配一次
    #[test]
    fn prop_control_stack_is_lifo(kinds in prop::collection::vec(0u8..3, 1..12), pick in 0usize..12) {
        let mut blocks = allocator();
        let mut control = ControlStack::new();
        let mut frames = Vec::new();
        let mut breakables = 0;
        for (i, kind) in kinds.iter().enumerate() {
            let frame = match kind {
                0 => {
                    breakables += 1;
                    control.enter_breakable(i)
                }
                1 => control.enter_switch(2, i),
                _ => control.enter_try_catch(i),
            };
            frames.push(frame);
        }
        prop_assert_eq!(control.depth(), kinds.len());

        if breakables > 0 {
            let label = pick % breakables;
            let first = control.break_destination(label, &mut blocks);
            let second = control.break_destination(label, &mut blocks);
            prop_assert_eq!(first.join, second.join);
            prop_assert_eq!(blocks.last_used_block_id(), 1);
        }

        for frame in frames.into_iter().rev() {
            control.exit(frame);
        }
        prop_assert_eq!(control.depth(), 0);
        prop_assert_eq!(control.current_try_index(), None);
    }
}

#[test]
#[should_panic(expected = "exited out of order")]
fn test_exit_out_of_order_panics() {
    let mut control = ControlStack::new();
    let outer = control.enter_breakable(0);
    let _inner = control.enter_try_catch(0);
    control.exit(outer);
}

#[test]
#[should_panic(expected = "used after exit")]
fn test_frame_use_after_exit_panics() {
    let mut control = ControlStack::new();
    let frame = control.enter_breakable(0);
    control.exit(frame);
    let _ = control.breakable(frame);
}

// ===== 活动类 =====

#[test]
fn test_active_class_enter_and_restore() {
    let store = ObjectStore::new();
    let core = store.core();
    let mut active = ActiveClass::default();

    let saved = active.enter(ActiveClass::for_function(&store, core.object_no_such_method));
    assert_eq!(active.class, Some(core.object));
    assert_eq!(active.member, Some(core.object_no_such_method));
    assert_eq!(saved, ActiveClass::default());

    active.restore(saved);
    assert_eq!(active, ActiveClass::default());
}
