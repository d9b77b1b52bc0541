//! 类成员：访问器、构造函数、方法提取器与调度器

use super::support::LIBRARY_URI;
use kernel_il::driver::CompileUnit;
use kernel_il::frontend::{FlowGraphBuilder, TranslationHelper};
use kernel_il::il::instruction::{InstrKind, Slot};
use kernel_il::kernel::ast::{Initializer, ProcedureKind, Program};
use kernel_il::kernel::builder::ProgramBuilder;
use kernel_il::kernel::KernelReader;
use kernel_il::object::{ArgumentsDescriptor, ClassId, FunctionId, FunctionKind, ObjectStore};
use kernel_il::util::config::BuilderConfig;
use kernel_il::FlowGraph;

/// `class Point { var x; final y = []; Point(x0) : x = x0; norm() => this.x; }`
/// plus `main() => new Point(1).norm();` and a static field with a computed
/// initializer.
fn point_program() -> Program {
    let b = ProgramBuilder::new();
    let lib = b.library_name(LIBRARY_URI);
    let point = b.class_name(lib, "Point");
    let x_name = b.field_name(point, lib, "x");
    let x = b.field(x_name, None);
    let y = {
        let mut f = b.field(b.field_name(point, lib, "y"), Some(b.list(vec![])));
        f.is_final = true;
        f
    };
    let norm = b.procedure(
        b.method_name(point, lib, "norm"),
        ProcedureKind::Method,
        b.function(vec![], Some(b.ret(Some(b.property_get(b.this(), b.name("x", lib)))))),
    );
    let x0 = b.parameter("x0");
    let ctor_name = b.constructor_name(point, lib, "");
    let ctor = b.constructor(
        ctor_name,
        b.function(vec![x0.clone()], Some(b.empty())),
        vec![Initializer::Field {
            field: x_name,
            value: b.var_get(&x0),
        }],
    );
    let mut class = b.class(point);
    class.fields = vec![x, y];
    class.procedures.push(norm);
    class.constructors.push(ctor);

    let main = b.static_method(
        b.method_name(lib, lib, "main"),
        b.function(
            vec![],
            Some(b.ret(Some(b.method_call(b.new_object(ctor_name, vec![b.int(1)]), b.name("norm", lib), vec![])))),
        ),
    );
    let counter = b.static_field(
        b.field_name(lib, lib, "counter"),
        Some(b.concat(vec![b.str("n"), b.int(1)])),
    );

    let mut library = b.library(lib);
    library.classes.push(class);
    library.procedures.push(main);
    library.fields.push(counter);
    b.add_library(library);
    b.finish()
}

fn point_class(store: &ObjectStore) -> ClassId {
    let library = store.lookup_library(LIBRARY_URI).unwrap();
    store.lookup_class(library, "Point").unwrap()
}

fn compile(
    unit: &CompileUnit<'_>,
    function: FunctionId,
) -> FlowGraph {
    let graph = unit.build_function(function).unwrap();
    graph.verify().unwrap();
    graph
}

fn compile_named(
    unit: &CompileUnit<'_>,
    name: &str,
) -> FlowGraph {
    compile(unit, unit.lookup(name).unwrap_or_else(|| panic!("no function {}", name)))
}

#[test]
fn test_implicit_getter_loads_field() {
    let program = point_program();
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let graph = compile_named(&unit, "Point.get:x");

    assert_eq!(graph.body_block_count(), 1);
    assert_eq!(graph.count("Return"), 1);
    let loads: Vec<_> = graph
        .blocks()
        .iter()
        .flat_map(|&b| graph.block_instructions(b))
        .filter(|&i| matches!(graph.instruction(i).kind, InstrKind::LoadField { slot: Slot::Field(_) }))
        .collect();
    assert_eq!(loads.len(), 1);
}

#[test]
fn test_implicit_setter_stores_field() {
    let program = point_program();
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let graph = compile_named(&unit, "Point.set:x");

    assert_eq!(graph.count("StoreInstanceField"), 1);
    assert_eq!(graph.count("Return"), 1);
    assert!(unit.lookup("Point.set:y").is_none());
}

#[test]
fn test_constructor_runs_field_initializers_first() {
    let program = point_program();
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let point = point_class(unit.store());
    let ctor = unit.store().lookup_constructor(point, "Point.").unwrap();
    let graph = compile(&unit, ctor);

    // y 的初始化器先于初始化列表中的 x
    let stores: Vec<_> = graph
        .blocks()
        .iter()
        .flat_map(|&b| graph.block_instructions(b))
        .filter_map(|i| match &graph.instruction(i).kind {
            InstrKind::StoreInstanceField { slot, .. } => Some(slot.clone()),
            _ => None,
        })
        .collect();
    let y = unit.store().lookup_field(point, "y").unwrap();
    let x = unit.store().lookup_field(point, "x").unwrap();
    assert_eq!(stores, vec![Slot::Field(y), Slot::Field(x)]);
}

#[test]
fn test_method_extractor_allocates_closure() {
    let program = point_program();
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let extractor = unit.lookup("Point.get:norm").unwrap();
    assert_eq!(unit.store().function(extractor).kind, FunctionKind::MethodExtractor);
    let graph = compile(&unit, extractor);

    assert_eq!(graph.count("AllocateObject"), 1);
    assert_eq!(graph.count("AllocateContext"), 1);
    assert_eq!(graph.count("Return"), 1);
}

#[test]
fn test_implicit_closure_forwards_to_target() {
    let program = point_program();
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let norm = unit.lookup("Point.norm").unwrap();
    let closure = unit.store().function(norm).implicit_closure.unwrap();
    let graph = compile(&unit, closure);

    let calls: Vec<_> = graph
        .blocks()
        .iter()
        .flat_map(|&b| graph.block_instructions(b))
        .filter_map(|i| match &graph.instruction(i).kind {
            InstrKind::StaticCall { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(calls, vec![norm]);
    assert!(graph.count("LoadField") >= 2);
}

#[test]
fn test_dynamic_calls_in_main() {
    let program = point_program();
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let graph = compile_named(&unit, "main");

    assert_eq!(graph.count("AllocateObject"), 1);
    assert_eq!(graph.count("InstanceCall"), 1);
    assert_eq!(graph.count("Return"), 1);
}

#[test]
fn test_static_field_getter_and_initializer() {
    let program = point_program();
    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();

    let getter = compile_named(&unit, "get:counter");
    assert_eq!(getter.count("InitStaticField"), 1);
    assert_eq!(getter.count("LoadStaticField"), 1);

    let initializer = unit.lookup("init:counter").unwrap();
    assert_eq!(unit.store().function(initializer).kind, FunctionKind::FieldInitializer);
    let graph = compile(&unit, initializer);
    assert_eq!(graph.count("StringInterpolate"), 1);
    assert_eq!(graph.count("Return"), 1);
}

#[test]
fn test_abstract_class_cannot_be_instantiated() {
    let b = ProgramBuilder::new();
    let lib = b.library_name(LIBRARY_URI);
    let shape = b.class_name(lib, "Shape");
    let ctor_name = b.constructor_name(shape, lib, "");
    let mut class = b.class(shape);
    class.is_abstract = true;
    class
        .constructors
        .push(b.constructor(ctor_name, b.function(vec![], Some(b.empty())), vec![]));
    let main = b.static_method(
        b.method_name(lib, lib, "main"),
        b.function(vec![], Some(b.ret(Some(b.new_object(ctor_name, vec![]))))),
    );
    let mut library = b.library(lib);
    library.classes.push(class);
    library.procedures.push(main);
    b.add_library(library);
    let program = b.finish();

    let unit = CompileUnit::new(&program, BuilderConfig::default()).unwrap();
    let err = unit.build_function(unit.lookup("main").unwrap()).unwrap_err();
    assert!(err.to_string().contains("cannot instantiate abstract class 'Shape'"));
}

// ===== 调度器 =====

fn build_in(
    program: &Program,
    store: &ObjectStore,
    function: FunctionId,
) -> FlowGraph {
    let reader = KernelReader::new(program);
    let helper = TranslationHelper::new(&reader, store);
    let graph = FlowGraphBuilder::new(helper, function, BuilderConfig::default())
        .build_graph()
        .unwrap();
    graph.verify().unwrap();
    graph
}

#[test]
fn test_no_such_method_dispatcher_builds_invocation_mirror() {
    let program = point_program();
    let mut store = ObjectStore::load(&program).unwrap();
    let point = point_class(&store);
    let dispatcher = store.add_no_such_method_dispatcher(point, "missing", ArgumentsDescriptor::new(0, 3, vec![]));
    let graph = build_in(&program, &store, dispatcher);

    assert_eq!(graph.count("CreateArray"), 1);
    assert_eq!(graph.count("StoreIndexed"), 3);
    assert_eq!(graph.count("StaticCall"), 2);
    assert_eq!(graph.count("Return"), 1);
}

#[test]
fn test_invoke_field_dispatcher_calls_getter_result() {
    let program = point_program();
    let mut store = ObjectStore::load(&program).unwrap();
    let point = point_class(&store);
    let dispatcher = store.add_invoke_field_dispatcher(point, "x", ArgumentsDescriptor::new(0, 2, vec![]));
    let graph = build_in(&program, &store, dispatcher);

    // get:x 然后 call
    assert_eq!(graph.count("InstanceCall"), 2);
    assert_eq!(graph.count("ClosureCall"), 0);
    assert_eq!(graph.count("Return"), 1);
}
