//! # kernel-il 性能基准测试
//!
//! 使用 Criterion.rs 测量图构建的耗时。
//!
//! ## 基准测试分组
//! - `loops`: 嵌套循环与 try/finally 的单函数构建
//! - `driver`: 整个程序的并行构建
//!
//! ## 使用方法
//! ```bash
//! cargo bench          # 运行所有
//! cargo bench loops    # 只运行循环基准
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kernel_il::driver::CompileUnit;
use kernel_il::kernel::ast::{Program, Statement};
use kernel_il::kernel::builder::ProgramBuilder;
use kernel_il::util::config::BuilderConfig;
use std::hint::black_box;

// ============================================================================
// 合成程序
// ============================================================================

/// `depth` 层嵌套 while，每层都有一个 break 穿过的 try/finally
fn loop_nest(
    b: &ProgramBuilder,
    depth: usize,
    flag: &kernel_il::kernel::ast::VariableDeclaration,
) -> Statement {
    let mut body = b.expr_stmt(b.int(0));
    for _ in 0..depth {
        let guarded = b.try_finally(
            b.block(vec![body, b.if_(b.var_get(flag), b.break_(0), None)]),
            b.expr_stmt(b.int(1)),
        );
        body = b.while_(b.var_get(flag), b.labeled(guarded));
    }
    body
}

fn program(
    functions: usize,
    depth: usize,
) -> Program {
    let b = ProgramBuilder::new();
    let lib = b.library_name("file:///bench.k");
    let mut library = b.library(lib);
    for i in 0..functions {
        let flag = b.parameter("flag");
        let body = b.block(vec![loop_nest(&b, depth, &flag), b.ret(None)]);
        let function = b.function(vec![flag], Some(body));
        library
            .procedures
            .push(b.static_method(b.method_name(lib, lib, &format!("f{}", i)), function));
    }
    b.add_library(library);
    b.finish()
}

// ============================================================================
// 基准
// ============================================================================

fn bench_loop_nest(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");
    for depth in [1usize, 4, 16] {
        let program = program(1, depth);
        let unit = CompileUnit::new(&program, BuilderConfig::default()).expect("bench program loads");
        let f0 = unit.lookup("f0").expect("f0");
        group.bench_with_input(BenchmarkId::new("nested_while", depth), &f0, |bench, &f0| {
            bench.iter(|| black_box(unit.build_function(f0).expect("graph builds")))
        });
    }
    group.finish();
}

fn bench_compile_all(c: &mut Criterion) {
    let program = program(64, 4);
    let unit = CompileUnit::new(&program, BuilderConfig::default()).expect("bench program loads");
    let functions = unit.compilable_functions();
    c.bench_function("driver/compile_all_64", |bench| {
        bench.iter(|| black_box(unit.compile_all(&functions)))
    });
}

criterion_group!(loops, bench_loop_nest);
criterion_group!(driver, bench_compile_all);
criterion_main!(loops, driver);
