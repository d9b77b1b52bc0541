//! Kernel 输入模型测试

use crate::kernel::ast::{FunctionNode, ProcedureKind};
use crate::kernel::builder::ProgramBuilder;
use crate::kernel::names::{CanonicalNameTable, NameIndex, StringTable};
use crate::kernel::reader::{FunctionOwner, KernelReader};

/// 字符串池按索引取回原串
#[test]
fn test_string_table_roundtrip() {
    let mut table = StringTable::new();
    let a = table.intern("alpha");
    let b = table.intern("beta");
    let again = table.intern("alpha");

    assert_eq!(a, again);
    assert_eq!(table.get(a), "alpha");
    assert_eq!(table.get(b), "beta");
    assert_eq!(table.string_size(b), 4);
    assert_eq!(table.string_offset(b), 5);
    assert_eq!(table.character_at(a, 0), Some(b'a'));
    assert_eq!(table.character_at(a, 5), None);
    assert!(table.equals(b, "beta"));
}

/// 规范名表共享相同的子节点
#[test]
fn test_canonical_children_are_shared() {
    let mut strings = StringTable::new();
    let root = strings.intern("");
    let lib = strings.intern("file:///a");
    let mut names = CanonicalNameTable::new(root);

    let first = names.child(NameIndex::ROOT, lib);
    let second = names.child(NameIndex::ROOT, lib);
    assert_eq!(first, second);
    assert_eq!(names.parent(first), Some(NameIndex::ROOT));
    assert_eq!(names.parent(NameIndex::ROOT), None);
}

/// 私有成员名在管理节点与名字之间插入库节点
#[test]
fn test_private_member_name_has_library_node() {
    let b = ProgramBuilder::new();
    let lib = b.library_name("file:///a");
    let class = b.class_name(lib, "Foo");
    let public = b.method_name(class, lib, "bar");
    let private = b.method_name(class, lib, "_bar");
    let program = b.finish();
    let names = &program.names;

    let tag = names.parent(public).unwrap();
    assert_eq!(program.strings.get(names.string(tag)), "@methods");
    let uri = names.parent(private).unwrap();
    assert_eq!(program.strings.get(names.string(uri)), "file:///a");
    assert_eq!(names.parent(uri), Some(tag));
}

fn closure_program() -> (crate::kernel::Program, FunctionNode) {
    let b = ProgramBuilder::new();
    let lib_name = b.library_name("file:///main");
    let main_name = b.method_name(lib_name, lib_name, "main");

    let inner = b.function(vec![], Some(b.ret(Some(b.int(1)))));
    let inner_copy = inner.clone();
    let f = b.variable("f", None);
    let body = b.block(vec![b.fun_decl(f, inner)]);
    let main = b.static_method(main_name, b.function(vec![], Some(body)));

    let mut library = b.library(lib_name);
    library.procedures.push(main);
    b.add_library(library);
    (b.finish(), inner_copy)
}

/// 读取器为嵌套闭包建立偏移索引
#[test]
fn test_reader_indexes_nested_closures() {
    let (program, inner) = closure_program();
    let reader = KernelReader::new(&program);

    let entry = reader.function_at(inner.offset).expect("closure indexed");
    let parent = match entry.owner {
        FunctionOwner::Closure { parent } => parent,
        other => panic!("unexpected owner {:?}", other),
    };
    let outer = reader.function_at(parent).expect("parent indexed");
    match outer.owner {
        FunctionOwner::Procedure(p) => assert_eq!(p.kind, ProcedureKind::Method),
        other => panic!("unexpected owner {:?}", other),
    }
    assert_eq!(reader.functions().count(), 2);
}

/// 程序可以经 JSON 往返
#[test]
fn test_program_json_roundtrip() {
    let (program, inner) = closure_program();
    let json = serde_json::to_string(&program).unwrap();
    let back: crate::kernel::Program = serde_json::from_str(&json).unwrap();
    let reader = KernelReader::new(&back);
    assert!(reader.function_at(inner.offset).is_some());
}
