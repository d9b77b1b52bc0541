//! 对象模型测试

use crate::kernel::ast::ProcedureKind;
use crate::kernel::builder::ProgramBuilder;
use crate::object::store::private_key;
use crate::object::{AbstractType, ArgumentsDescriptor, FunctionKind, ObjectStore, CORE_LIBRARY_URI};

/// 核心库在空存储中即可用
#[test]
fn test_core_library_bootstrapped() {
    let store = ObjectStore::new();
    let core = store.core();
    assert_eq!(store.lookup_library(CORE_LIBRARY_URI), Some(core.library));
    assert_eq!(store.lookup_class(core.library, "int"), Some(core.int));
    assert_eq!(store.class(core.growable_list).super_class, Some(core.list));
    assert_eq!(store.function(core.interpolate).name, "interpolate");
    assert!(store.function(core.growable_list_literal).is_static);
    assert_eq!(
        store.lookup_static_method(core.no_such_method_error, "throwNew"),
        Some(core.no_such_method_throw_new)
    );
}

/// 加载程序登记类、字段、隐式访问器与方法提取器
#[test]
fn test_load_registers_members() {
    let b = ProgramBuilder::new();
    let lib = b.library_name("file:///a");
    let class_name = b.class_name(lib, "Point");
    let x = b.field(b.field_name(class_name, lib, "x"), None);
    let y = {
        let mut f = b.field(b.field_name(class_name, lib, "y"), None);
        f.is_final = true;
        f
    };
    let norm = b.procedure(
        b.method_name(class_name, lib, "norm"),
        ProcedureKind::Method,
        b.function(vec![], Some(b.ret(Some(b.int(0))))),
    );
    let mut class = b.class(class_name);
    class.fields.push(x);
    class.fields.push(y);
    class.procedures.push(norm);
    let mut library = b.library(lib);
    library.classes.push(class);
    b.add_library(library);
    let program = b.finish();

    let store = ObjectStore::load(&program).unwrap();
    let library = store.lookup_library("file:///a").unwrap();
    let point = store.lookup_class(library, "Point").unwrap();

    assert_eq!(store.class(point).super_class, Some(store.core().object));
    assert_eq!(store.class(point).instance_field_count, 2);
    let x = store.lookup_field(point, "x").unwrap();
    assert_eq!(store.field(x).instance_slot, Some(0));

    let getter = store.lookup_function(point, "get:x").unwrap();
    assert_eq!(store.function(getter).kind, FunctionKind::ImplicitGetter);
    assert!(store.lookup_function(point, "set:x").is_some());
    assert!(store.lookup_function(point, "set:y").is_none());

    let norm = store.lookup_function(point, "norm").unwrap();
    assert_eq!(store.function(norm).num_fixed_parameters, 1);
    let extractor = store.lookup_function(point, "get:norm").unwrap();
    assert_eq!(store.function(extractor).kind, FunctionKind::MethodExtractor);
    assert_eq!(store.function(extractor).target, Some(norm));
    assert!(store.function(norm).implicit_closure.is_some());
    assert_eq!(store.resolve_dynamic(point, "norm"), Some(norm));
}

/// 私有成员名带库私有键
#[test]
fn test_private_names_are_mangled() {
    let b = ProgramBuilder::new();
    let lib = b.library_name("file:///p");
    let helper = b.static_method(
        b.method_name(lib, lib, "_helper"),
        b.function(vec![], Some(b.ret(None))),
    );
    let mut library = b.library(lib);
    library.procedures.push(helper);
    b.add_library(library);
    let program = b.finish();

    let store = ObjectStore::load(&program).unwrap();
    let library = store.lookup_library("file:///p").unwrap();
    let toplevel = store.library(library).toplevel_class;
    let mangled = format!("_helper{}", private_key("file:///p"));
    assert!(store.lookup_static_method(toplevel, &mangled).is_some());
    assert!(store.lookup_static_method(toplevel, "_helper").is_none());
}

/// 闭包按偏移登记并指向外层函数
#[test]
fn test_closures_have_parents() {
    let b = ProgramBuilder::new();
    let lib = b.library_name("file:///c");
    let inner = b.function(vec![], Some(b.ret(Some(b.int(1)))));
    let inner_offset = inner.offset;
    let body = b.block(vec![b.expr_stmt(b.closure(inner))]);
    let main = b.static_method(b.method_name(lib, lib, "main"), b.function(vec![], Some(body)));
    let mut library = b.library(lib);
    library.procedures.push(main);
    b.add_library(library);
    let program = b.finish();

    let store = ObjectStore::load(&program).unwrap();
    let closure = store.function_at(inner_offset).unwrap();
    let closure = store.function(closure);
    assert_eq!(closure.kind, FunctionKind::Closure);
    let parent = closure.parent.unwrap();
    assert_eq!(store.function(parent).name, "main");
    assert_eq!(closure.num_fixed_parameters, 1);
}

/// 未解析的超类报告错误
#[test]
fn test_unresolved_super_class() {
    let b = ProgramBuilder::new();
    let lib = b.library_name("file:///s");
    let missing = b.class_name(b.library_name("file:///missing"), "Gone");
    let mut class = b.class(b.class_name(lib, "Child"));
    class.super_class = Some(crate::kernel::ast::Supertype {
        class: missing,
        type_arguments: Vec::new(),
    });
    let mut library = b.library(lib);
    library.classes.push(class);
    b.add_library(library);
    let program = b.finish();

    let err = ObjectStore::load(&program).unwrap_err();
    assert!(err.to_string().contains("Gone"));
}

/// 调度器按调用形状去重
#[test]
fn test_dispatchers_are_shared_per_shape() {
    let mut store = ObjectStore::new();
    let object = store.core().object;
    let d = ArgumentsDescriptor::new(0, 2, vec![]);
    let a = store.add_no_such_method_dispatcher(object, "foo", d.clone());
    let again = store.add_no_such_method_dispatcher(object, "foo", d.clone());
    let other = store.add_invoke_field_dispatcher(object, "foo", d);
    assert_eq!(a, again);
    assert_ne!(a, other);
    assert!(store.function(a).kind.is_dispatcher());
    assert_eq!(store.function(a).parameter_names, vec!["this", ":arg1"]);
}

/// 类型参数按名字解析到所属者
#[test]
fn test_resolve_type_parameters() {
    let b = ProgramBuilder::new();
    let t = b.type_parameter_type("T");
    let program = b.finish();
    let store = ObjectStore::new();
    let class_params = vec!["T".to_string()];
    let resolved = store.resolve_type(
        &program,
        &t,
        crate::object::store::TypeScope {
            class_parameters: &class_params,
            function_parameters: &[],
        },
    );
    assert!(!resolved.is_instantiated());
    assert!(resolved.mentions(crate::object::TypeParameterOwner::Class));
    let unknown = store.resolve_type(&program, &t, Default::default());
    assert!(matches!(unknown, AbstractType::Malformed(_)));
}
