//! try/catch、try/finally 与抛出

use super::support::{build, program_with, top_level};
use kernel_il::driver::CompileUnit;
use kernel_il::il::instruction::InstrKind;
use kernel_il::kernel::ast::KernelType;
use kernel_il::util::config::BuilderConfig;
use kernel_il::BuildError;

#[test]
fn test_catch_all_handler() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let e = b.variable("e", None);
        let body = vec![
            b.try_catch(
                b.expr_stmt(b.throw(b.var_get(&x))),
                vec![b.catch(KernelType::Dynamic, Some(e), None, b.ret(Some(b.int(1))))],
            ),
            b.ret(Some(b.int(0))),
        ];
        vec![top_level(b, lib, "main", vec![x.clone()], body)]
    });
    let graph = build(&program, "main");

    assert_eq!(graph.catch_entries().len(), 1);
    assert_eq!(graph.count("CatchBlockEntry"), 1);
    assert_eq!(graph.count("Throw"), 1);
    assert_eq!(graph.count("InstanceOf"), 0);
    assert_eq!(graph.count("ReThrow"), 0);

    let handler = graph.catch_entries()[0];
    match &graph.instruction(handler).kind {
        InstrKind::CatchBlockEntry {
            catch_try_index,
            needs_stacktrace,
            ..
        } => {
            assert_eq!(*catch_try_index, 0);
            assert!(!needs_stacktrace);
        }
        other => panic!("expected a catch entry, got {:?}", other),
    }
}

/// 类型化的 catch 经 InstanceOf 选择处理器，未匹配时重新抛出
#[test]
fn test_typed_catch_rethrows_unmatched() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let guard = b.interface_type(b.core_class("int"));
        let st = b.variable("st", None);
        let body = vec![
            b.try_catch(
                b.expr_stmt(b.throw(b.var_get(&x))),
                vec![b.catch(guard, None, Some(st), b.ret(Some(b.int(1))))],
            ),
            b.ret(Some(b.int(0))),
        ];
        vec![top_level(b, lib, "main", vec![x.clone()], body)]
    });
    let graph = build(&program, "main");

    assert_eq!(graph.count("InstanceOf"), 1);
    assert_eq!(graph.count("ReThrow"), 1);
    let handler = graph.catch_entries()[0];
    assert!(matches!(
        graph.instruction(handler).kind,
        InstrKind::CatchBlockEntry {
            needs_stacktrace: true,
            ..
        }
    ));
}

#[test]
fn test_rethrow_inside_catch() {
    let program = program_with(|b, lib| {
        let body = vec![b.try_catch(
            b.ret(Some(b.int(0))),
            vec![b.catch(KernelType::Dynamic, None, None, b.expr_stmt(b.rethrow()))],
        )];
        vec![top_level(b, lib, "main", vec![], body)]
    });
    let graph = build(&program, "main");
    assert_eq!(graph.count("ReThrow"), 1);
}

#[test]
fn test_rethrow_outside_catch_is_an_error() {
    let program = program_with(|b, lib| vec![top_level(b, lib, "main", vec![], vec![b.expr_stmt(b.rethrow())])]);
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let err = unit.build_function(unit.lookup("main").unwrap()).unwrap_err();
    assert!(matches!(err, BuildError::Compile { .. }));
    assert!(err.to_string().contains("rethrow outside of a catch clause"));
}

/// `return` 经过 finally：先保存返回值，再内联终结块
#[test]
fn test_return_through_finally() {
    let program = program_with(|b, lib| {
        let fin_name = b.method_name(lib, lib, "cleanup");
        let cleanup = b.static_method(fin_name, b.function(vec![], Some(b.ret(None))));
        let body = vec![b.try_finally(
            b.ret(Some(b.int(42))),
            b.expr_stmt(b.static_call(fin_name, vec![])),
        )];
        vec![cleanup, top_level(b, lib, "main", vec![], body)]
    });
    let graph = build(&program, "main");

    // return 路径与异常路径各一次
    assert_eq!(graph.count("StaticCall"), 2);
    assert_eq!(graph.count("ReThrow"), 1);
    assert!(graph.count("StoreLocal") >= 1);
    assert!(graph.count("Return") >= 1);
}

#[test]
fn test_nested_try_indices() {
    let program = program_with(|b, lib| {
        let x = b.parameter("x");
        let inner = b.try_catch(
            b.expr_stmt(b.throw(b.var_get(&x))),
            vec![b.catch(KernelType::Dynamic, None, None, b.empty())],
        );
        let outer = b.try_catch(inner, vec![b.catch(KernelType::Dynamic, None, None, b.empty())]);
        vec![top_level(b, lib, "main", vec![x.clone()], vec![outer, b.ret(None)])]
    });
    let graph = build(&program, "main");

    assert_eq!(graph.catch_entries().len(), 2);
    let mut indices: Vec<usize> = graph
        .catch_entries()
        .iter()
        .filter_map(|&c| match graph.instruction(c).kind {
            InstrKind::CatchBlockEntry { catch_try_index, .. } => Some(catch_try_index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1]);
}
