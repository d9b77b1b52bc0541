//! 闭包、捕获变量与生成器恢复

use super::support::{build, program_with, top_level, top_level_node};
use kernel_il::driver::CompileUnit;
use kernel_il::il::instruction::{InstrKind, Slot, Token};
use kernel_il::kernel::ast::AsyncMarker;
use kernel_il::util::config::BuilderConfig;

/// `main() { var x = 1; return () => x; }`
#[test]
fn test_captured_variable_lives_in_context() {
    let mut closure_offset = None;
    let program = program_with(|b, lib| {
        let x = b.variable("x", Some(b.int(1)));
        let inner = b.function(vec![], Some(b.ret(Some(b.var_get(&x)))));
        closure_offset = Some(inner.offset);
        let body = vec![b.var_decl(x.clone()), b.ret(Some(b.closure(inner)))];
        vec![top_level(b, lib, "main", vec![], body)]
    });
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();

    let main = unit.build_function(unit.lookup("main").unwrap()).unwrap();
    main.verify().unwrap();
    assert_eq!(main.count("AllocateContext"), 1);
    // 闭包对象本身
    assert_eq!(main.count("AllocateObject"), 1);

    let closure = unit.store().function_at(closure_offset.unwrap()).unwrap();
    let graph = unit.build_function(closure).unwrap();
    graph.verify().unwrap();
    let slots: Vec<Slot> = graph
        .blocks()
        .iter()
        .flat_map(|&b| graph.block_instructions(b))
        .filter_map(|i| match graph.instruction(i).kind {
            InstrKind::LoadField { slot } => Some(slot),
            _ => None,
        })
        .collect();
    assert_eq!(slots[0], Slot::ClosureContext);
    assert!(slots.contains(&Slot::ContextVariable(0)));
}

#[test]
fn test_uncaptured_locals_need_no_context() {
    let program = program_with(|b, lib| {
        let x = b.variable("x", Some(b.int(1)));
        let body = vec![b.var_decl(x.clone()), b.ret(Some(b.var_get(&x)))];
        vec![top_level(b, lib, "main", vec![], body)]
    });
    let graph = build(&program, "main");
    assert_eq!(graph.count("AllocateContext"), 0);
    assert_eq!(graph.count("StoreLocal"), 1);
}

/// 循环体内被捕获的变量每次迭代都有新的上下文
#[test]
fn test_loop_variable_context_is_cloned() {
    let program = program_with(|b, lib| {
        let i = b.variable("i", Some(b.int(0)));
        let capture = b.function(vec![], Some(b.ret(Some(b.var_get(&i)))));
        let body = vec![
            b.for_(
                vec![i.clone()],
                Some(b.bool(true)),
                vec![b.var_set(&i, b.int(1))],
                b.expr_stmt(b.closure(capture)),
            ),
            b.ret(None),
        ];
        vec![top_level(b, lib, "main", vec![], body)]
    });
    let graph = build(&program, "main");
    assert_eq!(graph.count("CloneContext"), 1);
    assert!(graph.count("AllocateContext") >= 1);
}

#[test]
fn test_local_function_declaration() {
    let program = program_with(|b, lib| {
        let f = b.variable("f", None);
        let function = b.function(vec![b.parameter("a")], Some(b.ret(None)));
        let body = vec![b.fun_decl(f.clone(), function), b.ret(Some(b.var_get(&f)))];
        vec![top_level(b, lib, "main", vec![], body)]
    });
    let graph = build(&program, "main");
    assert_eq!(graph.count("AllocateObject"), 1);
    assert_eq!(graph.count("Return"), 1);
}

/// 生成器体按跳转变量分派到入口或某个 yield 之后
#[test]
fn test_yielding_closure_dispatches_on_jump_variable() {
    let mut body_offset = None;
    let program = program_with(|b, lib| {
        let mut generator = b.function(
            vec![],
            Some(b.block(vec![b.yield_(b.int(1)), b.yield_(b.int(2))])),
        );
        generator.async_marker = AsyncMarker::SyncYielding;
        body_offset = Some(generator.offset);
        let main = b.function(vec![], Some(b.ret(Some(b.closure(generator)))));
        vec![top_level_node(b, lib, "main", main)]
    });
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();

    // 跳转变量属于外层函数的上下文
    let main = unit.build_function(unit.lookup("main").unwrap()).unwrap();
    assert_eq!(main.count("AllocateContext"), 1);

    let generator = unit.store().function_at(body_offset.unwrap()).unwrap();
    let graph = unit.build_function(generator).unwrap();
    graph.verify().unwrap();
    // 入口与两个恢复点：两次比较，各自作为分支的条件
    let compares: Vec<InstrKind> = graph
        .blocks()
        .iter()
        .map(|&block| graph.instruction(graph.last_instruction(block)))
        .filter(|last| last.mnemonic() == "Branch")
        .map(|branch| graph.instruction(branch.inputs[0]).kind.clone())
        .collect();
    assert_eq!(compares.len(), 2);
    for compare in &compares {
        assert!(matches!(compare, InstrKind::StrictCompare { kind: Token::EqStrict, .. }));
    }
    // 两个 yield 各返回一次，末尾再返回 null
    assert_eq!(graph.count("Return"), 3);
}
