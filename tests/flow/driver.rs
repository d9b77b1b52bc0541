//! 编译驱动、配置文件与输出

use super::support::{program_with, top_level};
use kernel_il::driver::CompileUnit;
use kernel_il::il::printer::{GraphPrinter, GraphSummary};
use kernel_il::kernel::ast::Program;
use kernel_il::object::FunctionKind;
use kernel_il::util::config::BuilderConfig;
use kernel_il::util::logger::{self, LogLevel};
use kernel_il::read_program;
use std::fs;
use tempfile::TempDir;

/// `f0 .. f{n-1}`, each `if (x) return i; return -i;`
fn many_functions(n: usize) -> Program {
    program_with(|b, lib| {
        (0..n)
            .map(|i| {
                let x = b.parameter("x");
                let body = vec![
                    b.if_(b.var_get(&x), b.ret(Some(b.int(i as i64))), None),
                    b.ret(Some(b.int(-(i as i64)))),
                ];
                top_level(b, lib, &format!("f{}", i), vec![x], body)
            })
            .collect()
    })
}

#[test]
fn test_compile_all_keeps_input_order() {
    // 其他测试可能已安装订阅者
    let _ = logger::try_init(LogLevel::Warn);
    let program = many_functions(24);
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let functions = unit.compilable_functions();
    assert_eq!(functions.len(), 24);

    let results = unit.compile_all(&functions);
    assert_eq!(results.len(), functions.len());
    for ((id, result), expected) in results.iter().zip(&functions) {
        assert_eq!(id, expected);
        let graph = result.as_ref().unwrap();
        assert_eq!(graph.function, *id);
        assert!(graph.verify().is_ok());
    }
}

#[test]
fn test_parallel_and_sequential_builds_agree() {
    let program = many_functions(8);
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let functions = unit.compilable_functions();
    let printer = GraphPrinter::new().with_store(unit.store());

    for (id, result) in unit.compile_all(&functions) {
        let parallel = printer.render(&result.unwrap());
        let sequential = printer.render(&unit.build_function(id).unwrap());
        assert_eq!(parallel, sequential);
    }
}

#[test]
fn test_core_functions_are_not_compilable() {
    let program = many_functions(1);
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let core = unit.store().core().library;
    for id in unit.compilable_functions() {
        let owner = unit.store().function(id).owner;
        assert_ne!(unit.store().class(owner).library, core);
    }
    assert!(unit.lookup("f0").is_some());
    assert!(unit.lookup("f1").is_none());
}

/// 隐式闭包只在需要时构建，不在编译列表中
#[test]
fn test_implicit_closures_are_built_on_demand() {
    let program = many_functions(3);
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let functions = unit.compilable_functions();
    assert_eq!(functions.len(), 3);

    let f0 = unit.lookup("f0").unwrap();
    let closure = unit.store().function(f0).implicit_closure.unwrap();
    assert_eq!(unit.store().function(closure).kind, FunctionKind::ImplicitClosure);
    assert!(!functions.contains(&closure));

    let graph = unit.build_function(closure).unwrap();
    graph.verify().unwrap();
    assert_eq!(graph.count("StaticCall"), 1);
}

#[test]
fn test_program_json_round_trip_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("program.json");
    let program = many_functions(2);
    fs::write(&path, serde_json::to_string(&program).unwrap()).unwrap();

    let loaded = read_program(&path).unwrap();
    let unit = CompileUnit::new(&loaded, BuilderConfig::default()).unwrap();
    let graph = unit.build_function(unit.lookup("f1").unwrap()).unwrap();
    assert_eq!(graph.count("Return"), 2);

    let summary = serde_json::to_value(GraphSummary::new(&graph)).unwrap();
    assert_eq!(summary["name"], "f1");
}

#[test]
fn test_read_program_reports_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = read_program(&temp_dir.path().join("absent.json")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read file"));
}

#[test]
fn test_config_file_changes_graphs() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("builder.ron");
    fs::write(&path, "(emit_debug_step_checks: true, track_context_levels: true)").unwrap();
    let config = BuilderConfig::load(&path).unwrap();
    assert!(config.emit_debug_step_checks);
    assert!(!config.enable_asserts);

    let program = many_functions(1);
    let unit = CompileUnit::new(&program, config).unwrap();
    let graph = unit.build_function(unit.lookup("f0").unwrap()).unwrap();
    assert!(graph.count("DebugStepCheck") > 0);
    assert!(graph.context_level_array().is_some());

    let plain = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let graph = plain.build_function(plain.lookup("f0").unwrap()).unwrap();
    assert_eq!(graph.count("DebugStepCheck"), 0);
    assert!(graph.context_level_array().is_none());
}

#[test]
fn test_first_block_id_is_configurable() {
    let program = many_functions(1);
    let config = BuilderConfig {
        first_block_id: 10,
        ..BuilderConfig::default()
    };
    let unit = CompileUnit::new(&program, config).unwrap();
    let graph = unit.build_function(unit.lookup("f0").unwrap()).unwrap();
    let normal = graph.normal_entry().unwrap();
    assert_eq!(graph.instruction(normal).block_id(), Some(10));
    assert_eq!(graph.max_block_id(), 12);
}
