//! Core library bootstrap
//!
//! Classes and functions the graph builder calls into directly: literal
//! factories, string interpolation, assertion and error helpers. Kernel
//! programs may declare further members of these classes under the same
//! library URI; they are merged into the bootstrapped classes on load.

use crate::object::store::ObjectStore;
use crate::object::types::AbstractType;
use crate::object::{ClassId, FunctionId, FunctionKind, LibraryId, CORE_LIBRARY_URI};

/// Handles to the well-known core entities
#[derive(Debug, Clone)]
pub struct CoreEntities {
    pub library: LibraryId,
    pub object: ClassId,
    pub null: ClassId,
    pub bool: ClassId,
    pub int: ClassId,
    pub double: ClassId,
    pub string: ClassId,
    pub list: ClassId,
    pub map: ClassId,
    pub closure: ClassId,
    pub context: ClassId,
    pub iterator: ClassId,
    pub growable_list: ClassId,
    pub linked_hash_map: ClassId,
    pub string_base: ClassId,
    pub assertion_error: ClassId,
    pub fall_through_error: ClassId,
    pub no_such_method_error: ClassId,
    pub invocation_mirror: ClassId,
    /// `Object.noSuchMethod(invocation)`
    pub object_no_such_method: FunctionId,
    /// `Object.==(other)`
    pub object_equals: FunctionId,
    /// `GrowableList.literal<T>(array)`
    pub growable_list_literal: FunctionId,
    /// `LinkedHashMap.fromLiteral<K, V>(keys_and_values)`
    pub map_from_literal: FunctionId,
    /// `StringBase.interpolate(array)`
    pub interpolate: FunctionId,
    /// `StringBase.interpolateSingle(value)`
    pub interpolate_single: FunctionId,
    /// `AssertionError.evaluateAssertion(condition)`
    pub evaluate_assertion: FunctionId,
    /// `AssertionError.throwNew(start, end, message)`
    pub assertion_throw_new: FunctionId,
    /// `FallThroughError.create(url, line)`
    pub fall_through_create: FunctionId,
    /// `NoSuchMethodError.throwNew(receiver, name, invocation_type, type_arguments, arguments, argument_names)`
    pub no_such_method_throw_new: FunctionId,
    /// `InvocationMirror.allocateInvocationMirror(name, descriptor, arguments, is_super)`
    pub allocate_invocation_mirror: FunctionId,
}

impl CoreEntities {
    /// Handles that are overwritten by [`install_core_library`]
    pub(crate) fn placeholder() -> Self {
        let c = ClassId(0);
        let f = FunctionId(0);
        CoreEntities {
            library: LibraryId(0),
            object: c,
            null: c,
            bool: c,
            int: c,
            double: c,
            string: c,
            list: c,
            map: c,
            closure: c,
            context: c,
            iterator: c,
            growable_list: c,
            linked_hash_map: c,
            string_base: c,
            assertion_error: c,
            fall_through_error: c,
            no_such_method_error: c,
            invocation_mirror: c,
            object_no_such_method: f,
            object_equals: f,
            growable_list_literal: f,
            map_from_literal: f,
            interpolate: f,
            interpolate_single: f,
            evaluate_assertion: f,
            assertion_throw_new: f,
            fall_through_create: f,
            no_such_method_throw_new: f,
            allocate_invocation_mirror: f,
        }
    }
}

fn static_method(
    store: &mut ObjectStore,
    class: ClassId,
    name: &str,
    parameters: &[&str],
) -> FunctionId {
    let parameter_names = parameters.iter().map(|p| p.to_string()).collect::<Vec<_>>();
    store.add_function(class, name, FunctionKind::Regular, |f| {
        f.is_static = true;
        f.is_external = true;
        f.num_fixed_parameters = parameter_names.len();
        f.parameter_names = parameter_names;
    })
}

fn factory(
    store: &mut ObjectStore,
    class: ClassId,
    name: &str,
    parameters: &[&str],
) -> FunctionId {
    let full_name = format!("{}.{}", store.class(class).name, name);
    let parameter_names = std::iter::once(":type_arguments")
        .chain(parameters.iter().copied())
        .map(str::to_string)
        .collect::<Vec<_>>();
    store.add_function(class, &full_name, FunctionKind::Factory, |f| {
        f.is_static = true;
        f.is_external = true;
        f.num_fixed_parameters = parameter_names.len();
        f.parameter_names = parameter_names;
    })
}

fn instance_method(
    store: &mut ObjectStore,
    class: ClassId,
    name: &str,
    parameters: &[&str],
) -> FunctionId {
    let parameter_names = std::iter::once("this")
        .chain(parameters.iter().copied())
        .map(str::to_string)
        .collect::<Vec<_>>();
    store.add_function(class, name, FunctionKind::Regular, |f| {
        f.is_external = true;
        f.num_fixed_parameters = parameter_names.len();
        f.parameter_names = parameter_names;
    })
}

/// Create the core library inside `store`
pub(crate) fn install_core_library(store: &mut ObjectStore) -> CoreEntities {
    let library = store.add_library(CORE_LIBRARY_URI);
    let object = store.add_class(library, "Object", None);
    let class = |store: &mut ObjectStore, name: &str| store.add_class(library, name, Some(object));

    let null = class(store, "Null");
    let bool = class(store, "bool");
    let int = class(store, "int");
    let double = class(store, "double");
    let string = class(store, "String");
    let list = class(store, "List");
    let map = class(store, "Map");
    let closure = class(store, "Closure");
    let context = class(store, "Context");
    let iterator = class(store, "Iterator");
    let growable_list = store.add_class(library, "GrowableList", Some(list));
    let linked_hash_map = store.add_class(library, "LinkedHashMap", Some(map));
    let string_base = store.add_class(library, "StringBase", Some(string));
    let assertion_error = class(store, "AssertionError");
    let fall_through_error = class(store, "FallThroughError");
    let no_such_method_error = class(store, "NoSuchMethodError");
    let invocation_mirror = class(store, "InvocationMirror");

    store.class_mut(list).type_parameters = vec!["E".to_string()];
    store.class_mut(growable_list).type_parameters = vec!["E".to_string()];
    store.class_mut(map).type_parameters = vec!["K".to_string(), "V".to_string()];
    store.class_mut(linked_hash_map).type_parameters = vec!["K".to_string(), "V".to_string()];
    store.class_mut(iterator).type_parameters = vec!["E".to_string()];
    store.class_mut(list).is_abstract = true;
    store.class_mut(map).is_abstract = true;
    store.class_mut(iterator).is_abstract = true;

    let object_no_such_method = instance_method(store, object, "noSuchMethod", &["invocation"]);
    let object_equals = instance_method(store, object, "==", &["other"]);
    store.function_mut(object_equals).result_type = AbstractType::Interface {
        class: bool,
        name: "bool".to_string(),
        arguments: Vec::new(),
    };

    let growable_list_literal = factory(store, growable_list, "literal", &["elements"]);
    let map_from_literal = factory(store, linked_hash_map, "fromLiteral", &["keys_and_values"]);
    let interpolate = static_method(store, string_base, "interpolate", &["values"]);
    let interpolate_single = static_method(store, string_base, "interpolateSingle", &["value"]);
    let evaluate_assertion = static_method(store, assertion_error, "evaluateAssertion", &["condition"]);
    let assertion_throw_new = static_method(store, assertion_error, "throwNew", &["start", "end", "message"]);
    let fall_through_create = static_method(store, fall_through_error, "create", &["url", "line"]);
    let no_such_method_throw_new = static_method(
        store,
        no_such_method_error,
        "throwNew",
        &[
            "receiver",
            "name",
            "invocation_type",
            "type_arguments",
            "arguments",
            "argument_names",
        ],
    );
    let allocate_invocation_mirror = static_method(
        store,
        invocation_mirror,
        "allocateInvocationMirror",
        &["name", "descriptor", "arguments", "is_super"],
    );

    // Iterator protocol used by for-in
    instance_method(store, iterator, "moveNext", &[]);
    instance_method(store, iterator, "get:current", &[]);

    CoreEntities {
        library,
        object,
        null,
        bool,
        int,
        double,
        string,
        list,
        map,
        closure,
        context,
        iterator,
        growable_list,
        linked_hash_map,
        string_base,
        assertion_error,
        fall_through_error,
        no_such_method_error,
        invocation_mirror,
        object_no_such_method,
        object_equals,
        growable_list_literal,
        map_from_literal,
        interpolate,
        interpolate_single,
        evaluate_assertion,
        assertion_throw_new,
        fall_through_create,
        no_such_method_throw_new,
        allocate_invocation_mirror,
    }
}
