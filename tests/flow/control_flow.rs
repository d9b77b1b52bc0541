//! 结构化控制流的图形状

use super::support::{blocks_of_kind, build, build_with, mnemonics, program_with, top_level};
use kernel_il::driver::CompileUnit;
use kernel_il::il::instruction::InstrKind;
use kernel_il::util::config::BuilderConfig;

/// `if (x) return 1; return 2;` 两个分支各自返回，没有汇合块
#[test]
fn test_if_with_returning_branches_has_no_join() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let body = vec![
            b.if_(b.var_get(&x), b.ret(Some(b.int(1))), None),
            b.ret(Some(b.int(2))),
        ];
        vec![top_level(b, lib, "main", vec![x], body)]
    });
    let graph = build(&program, "main");

    assert_eq!(graph.count("Branch"), 1);
    assert_eq!(graph.count("Return"), 2);
    assert_eq!(graph.count("JoinEntry"), 0);
    assert_eq!(graph.body_block_count(), 3);
    for block in blocks_of_kind(&graph, "TargetEntry").skip(1) {
        assert_eq!(mnemonics(&graph, block).last(), Some(&"Return"));
    }
}

#[test]
fn test_if_else_joins_open_branches() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let y = b.variable("y", None);
        let body = vec![
            b.var_decl(y.clone()),
            b.if_(
                b.var_get(&x),
                b.expr_stmt(b.var_set(&y, b.int(1))),
                Some(b.expr_stmt(b.var_set(&y, b.int(2)))),
            ),
            b.ret(Some(b.var_get(&y))),
        ];
        vec![top_level(b, lib, "main", vec![x], body)]
    });
    let graph = build(&program, "main");

    let joins: Vec<_> = blocks_of_kind(&graph, "JoinEntry").collect();
    assert_eq!(joins.len(), 1);
    assert_eq!(graph.predecessors(joins[0]).len(), 2);
    assert_eq!(graph.count("Return"), 1);
}

/// 三个分支都跳到 `default: break;`，共享同一个汇合块
#[test]
fn test_switch_cases_share_default_join() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let cases = vec![
            b.case(vec![b.int(1)], b.continue_switch(3)),
            b.case(vec![b.int(2)], b.continue_switch(3)),
            b.case(vec![b.int(3)], b.continue_switch(3)),
            b.default_case(b.break_(0)),
        ];
        let body = vec![b.labeled(b.switch(b.var_get(&x), cases)), b.ret(Some(b.int(0)))];
        vec![top_level(b, lib, "main", vec![x], body)]
    });
    let graph = build(&program, "main");

    // 每个 case 一次 `==` 比较
    assert_eq!(graph.count("InstanceCall"), 3);
    assert_eq!(graph.count("Return"), 1);

    let default_join = blocks_of_kind(&graph, "JoinEntry")
        .find(|&j| graph.predecessors(j).len() == 4)
        .expect("default case join");
    let case_bodies = graph
        .predecessors(default_join)
        .iter()
        .filter(|&&p| mnemonics(&graph, p) == ["TargetEntry", "Goto"])
        .count();
    assert!(case_bodies >= 3);
}

/// `switch (x) { case 1: continue default; default: y = 5; } return y;`
#[test]
fn test_default_jump_target_continues_after_switch() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let y = b.variable("y", None);
        let cases = vec![
            b.case(vec![b.int(1)], b.continue_switch(1)),
            b.default_case(b.expr_stmt(b.var_set(&y, b.int(5)))),
        ];
        let body = vec![
            b.var_decl(y.clone()),
            b.switch(b.var_get(&x), cases),
            b.ret(Some(b.var_get(&y))),
        ];
        vec![top_level(b, lib, "main", vec![x], body)]
    });
    let graph = build(&program, "main");

    assert_eq!(graph.count("Return"), 1);
    let joins: Vec<_> = blocks_of_kind(&graph, "JoinEntry").collect();
    assert_eq!(joins.len(), 1);
    // 跳转的 case 与最后的 otherwise 分支
    assert_eq!(graph.predecessors(joins[0]).len(), 2);
    let default_body = mnemonics(&graph, joins[0]);
    assert!(default_body.contains(&"StoreLocal"));
    assert_eq!(default_body.last(), Some(&"Return"));
}

/// 内层 switch 的两个 case 都跳到外层第 2 个 case，共用同一个汇合块
#[test]
fn test_nested_switch_jumps_to_outer_case() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let y = b.parameter("y");
        let inner = b.switch(
            b.var_get(&y),
            vec![
                b.case(vec![b.int(10)], b.continue_switch(2)),
                b.case(vec![b.int(20)], b.continue_switch(2)),
            ],
        );
        let outer = b.switch(
            b.var_get(&x),
            vec![
                b.case(vec![b.int(1)], b.block(vec![inner, b.ret(Some(b.int(0)))])),
                b.case(vec![b.int(2)], b.ret(Some(b.int(1)))),
                b.case(vec![b.int(3)], b.ret(Some(b.int(2)))),
            ],
        );
        let body = vec![outer, b.ret(Some(b.int(3)))];
        vec![top_level(b, lib, "main", vec![x, y], body)]
    });
    let graph = build(&program, "main");

    assert_eq!(graph.count("InstanceCall"), 5);
    assert_eq!(graph.count("Return"), 4);
    assert_eq!(graph.count("Throw"), 0);

    let joins: Vec<_> = blocks_of_kind(&graph, "JoinEntry").collect();
    assert_eq!(joins.len(), 1);
    let preds = graph.predecessors(joins[0]);
    assert_eq!(preds.len(), 3);
    for &pred in preds {
        assert_eq!(mnemonics(&graph, pred), ["TargetEntry", "Goto"]);
    }
    assert_eq!(mnemonics(&graph, joins[0]).last(), Some(&"Return"));
}

#[test]
fn test_switch_fall_through_throws() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let cases = vec![
            b.case(vec![b.int(1)], b.expr_stmt(b.int(10))),
            b.case(vec![b.int(2)], b.ret(None)),
        ];
        let body = vec![b.switch(b.var_get(&x), cases), b.ret(Some(b.int(0)))];
        vec![top_level(b, lib, "main", vec![x], body)]
    });
    let graph = build(&program, "main");

    assert_eq!(graph.count("Throw"), 1);
    assert_eq!(graph.count("InstanceCall"), 2);
}

#[test]
fn test_default_must_be_last() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let cases = vec![b.default_case(b.ret(None)), b.case(vec![b.int(1)], b.ret(None))];
        vec![top_level(b, lib, "main", vec![x.clone()], vec![b.switch(b.var_get(&x), cases)])]
    });
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let err = unit.build_function(unit.lookup("main").unwrap()).unwrap_err();
    assert!(err.to_string().contains("default must be the last switch case"));
}

/// 循环体中 `break` 穿过 try/finally 时先内联终结块再跳转
#[test]
fn test_break_through_finally_inlines_finalizer() {
    let program = program_with(|b, lib| {
        let fin_name = b.method_name(lib, lib, "fin");
        let fin = b.static_method(fin_name, b.function(vec![], Some(b.ret(None))));
        let c = b.parameter("c");
        let d = b.parameter("d");
        let body = b.labeled(b.try_finally(
            b.if_(b.var_get(&d), b.break_(0), None),
            b.expr_stmt(b.static_call(fin_name, vec![])),
        ));
        let main = top_level(
            b,
            lib,
            "main",
            vec![c.clone(), d],
            vec![b.while_(b.var_get(&c), body), b.ret(None)],
        );
        vec![fin, main]
    });
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let fin = unit.lookup("fin").unwrap();
    let graph = unit.build_function(unit.lookup("main").unwrap()).unwrap();
    graph.verify().unwrap();

    let calls_fin = |block| {
        graph
            .block_instructions(block)
            .any(|i| matches!(graph.instruction(i).kind, InstrKind::StaticCall { target, .. } if target == fin))
    };
    // 正常退出、break 与异常处理各一份
    let with_finalizer: Vec<_> = graph.blocks().iter().copied().filter(|&b| calls_fin(b)).collect();
    assert_eq!(with_finalizer.len(), 3);

    // break 与正常退出都先切回 try 外的异常区域，再执行终结块
    let inlined: Vec<_> = with_finalizer
        .iter()
        .copied()
        .filter(|&b| mnemonics(&graph, b) == ["JoinEntry", "StaticCall", "Goto"])
        .collect();
    assert_eq!(inlined.len(), 2);
    // 正常退出到 try 之后的汇合块；break 到标签的汇合块，它还有 try 之后这一前驱
    let mut target_predecessors: Vec<usize> = inlined
        .iter()
        .map(|&b| graph.predecessors(graph.successors(b)[0]).len())
        .collect();
    target_predecessors.sort_unstable();
    assert_eq!(target_predecessors, vec![1, 2]);

    assert_eq!(graph.catch_entries().len(), 1);
    assert_eq!(graph.count("ReThrow"), 1);
    assert_eq!(graph.count("CheckStackOverflow"), 2);
}

#[test]
fn test_while_loop_back_edge() {
    let program = program_with(|b, lib| {
        let i = b.variable("i", Some(b.int(0)));
        let body = vec![
            b.var_decl(i.clone()),
            b.while_(b.bool(true), b.expr_stmt(b.var_set(&i, b.int(1)))),
            b.ret(Some(b.var_get(&i))),
        ];
        vec![top_level(b, lib, "main", vec![], body)]
    });
    let graph = build(&program, "main");

    // 循环头有入口边和回边
    let header = blocks_of_kind(&graph, "JoinEntry")
        .find(|&j| graph.predecessors(j).len() == 2)
        .expect("loop header");
    let header_code = mnemonics(&graph, header);
    assert_eq!(header_code[1], "CheckStackOverflow");
    assert!(matches!(
        graph.instruction(graph.block_instructions(header).nth(1).unwrap()).kind,
        InstrKind::CheckStackOverflow { loop_depth: 1, .. }
    ));
}

#[test]
fn test_for_loop_with_updates() {
    let program = program_with(|b, lib| {
        let i = b.variable("i", Some(b.int(0)));
        let body = vec![
            b.for_(
                vec![i.clone()],
                Some(b.not(b.var_get(&i))),
                vec![b.var_set(&i, b.bool(true))],
                b.empty(),
            ),
            b.ret(None),
        ];
        vec![top_level(b, lib, "main", vec![], body)]
    });
    let graph = build(&program, "main");
    assert_eq!(graph.count("Branch"), 1);
    assert_eq!(graph.count("Return"), 1);
    assert!(blocks_of_kind(&graph, "JoinEntry").count() >= 1);
}

#[test]
fn test_do_while_runs_body_first() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let body = vec![b.do_(b.expr_stmt(b.int(1)), b.var_get(&x)), b.ret(None)];
        vec![top_level(b, lib, "main", vec![x], body)]
    });
    let graph = build(&program, "main");
    assert_eq!(graph.count("Branch"), 1);
    assert_eq!(graph.count("CheckStackOverflow"), 2);
}

#[test]
fn test_asserts_follow_configuration() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let body = vec![b.assert_(b.var_get(&x), Some(b.str("x must hold"))), b.ret(None)];
        vec![top_level(b, lib, "main", vec![x], body)]
    });

    let disabled = build(&program, "main");
    assert_eq!(disabled.count("StaticCall"), 0);

    let enabled = build_with(
        &program,
        "main",
        BuilderConfig {
            enable_asserts: true,
            ..BuilderConfig::default()
        },
    );
    // evaluateAssertion 与 AssertionError._throwNew
    assert_eq!(enabled.count("StaticCall"), 2);
    assert_eq!(enabled.count("Branch"), 1);
}

#[test]
fn test_logical_and_conditional_expressions() {
    use kernel_il::kernel::ast::LogicalOperator;
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let y = b.parameter("y");
        let value = b.conditional(
            b.logical(b.var_get(&x), LogicalOperator::And, b.var_get(&y)),
            b.int(1),
            b.int(2),
        );
        vec![top_level(b, lib, "main", vec![x.clone(), y.clone()], vec![b.ret(Some(value))])]
    });
    let graph = build(&program, "main");
    assert!(graph.count("Branch") >= 2);
    assert_eq!(graph.count("Return"), 1);
}
