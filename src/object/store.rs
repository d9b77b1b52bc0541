//! Object store
//!
//! Flat tables of libraries, classes, fields and functions plus the name
//! indexes used to resolve stable references. [`ObjectStore::load`] fills the
//! tables from a kernel program; afterwards the store only grows through the
//! dispatcher constructors, which the driver calls before translation starts.

use crate::frontend::error::{BuildError, BuildResult};
use crate::kernel::ast::{
    AsyncMarker, Class as KernelClass, Constructor, Expression, ExpressionKind, Field as KernelField, FunctionNode, Initializer,
    KernelType, Procedure, ProcedureKind, Program,
};
use crate::kernel::reader::{collect_closures_in_expression, collect_closures_in_statement};
use crate::kernel::{NameIndex, NodeOffset};
use crate::object::bootstrap::{self, CoreEntities};
use crate::object::types::{AbstractType, ArgumentsDescriptor, TypeParameterOwner};
use crate::object::{
    Class, ClassId, Field, FieldId, Function, FunctionId, FunctionKind, GuardState, Library, LibraryId,
    TOPLEVEL_CLASS_NAME,
};
use crate::util::span::TokenPosition;
use indexmap::IndexMap;
use tracing::debug;

/// Prefix of getter names
pub const GETTER_PREFIX: &str = "get:";
/// Prefix of setter names
pub const SETTER_PREFIX: &str = "set:";
/// Prefix of static field initializer names
pub const INITIALIZER_PREFIX: &str = "init:";

/// Key appended to private names of the library at `uri`
pub fn private_key(uri: &str) -> String {
    // FNV-1a
    let mut hash: u32 = 0x811c_9dc5;
    for byte in uri.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    format!("@{}", hash & 0x3fff_ffff)
}

/// Type parameters in scope while resolving a type
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScope<'a> {
    pub class_parameters: &'a [String],
    /// Innermost function last
    pub function_parameters: &'a [String],
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    libraries: Vec<Library>,
    classes: Vec<Class>,
    fields: Vec<Field>,
    functions: Vec<Function>,
    libraries_by_uri: IndexMap<String, LibraryId>,
    classes_by_name: IndexMap<(LibraryId, String), ClassId>,
    fields_by_name: IndexMap<(ClassId, String), FieldId>,
    functions_by_name: IndexMap<(ClassId, String), FunctionId>,
    functions_by_offset: IndexMap<NodeOffset, FunctionId>,
    fields_by_offset: IndexMap<NodeOffset, FieldId>,
    dispatchers: IndexMap<(ClassId, String, FunctionKind, ArgumentsDescriptor), FunctionId>,
    core: CoreEntities,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    /// Store holding only the core library
    pub fn new() -> Self {
        let mut store = ObjectStore {
            libraries: Vec::new(),
            classes: Vec::new(),
            fields: Vec::new(),
            functions: Vec::new(),
            libraries_by_uri: IndexMap::new(),
            classes_by_name: IndexMap::new(),
            fields_by_name: IndexMap::new(),
            functions_by_name: IndexMap::new(),
            functions_by_offset: IndexMap::new(),
            fields_by_offset: IndexMap::new(),
            dispatchers: IndexMap::new(),
            core: CoreEntities::placeholder(),
        };
        store.core = bootstrap::install_core_library(&mut store);
        store
    }

    /// Build the store for `program`
    pub fn load(program: &Program) -> BuildResult<Self> {
        let mut store = ObjectStore::new();
        let mut loader = Loader {
            store: &mut store,
            program,
        };
        loader.load_libraries()?;
        loader.resolve_super_classes()?;
        loader.load_members()?;
        store.assign_instance_slots();
        debug!(
            "object store: {} libraries, {} classes, {} fields, {} functions",
            store.libraries.len(),
            store.classes.len(),
            store.fields.len(),
            store.functions.len()
        );
        Ok(store)
    }

    // ===== Accessors =====

    #[inline]
    pub fn core(&self) -> &CoreEntities {
        &self.core
    }

    #[inline]
    pub fn library(
        &self,
        id: LibraryId,
    ) -> &Library {
        &self.libraries[id.index()]
    }

    #[inline]
    pub fn class(
        &self,
        id: ClassId,
    ) -> &Class {
        &self.classes[id.index()]
    }

    #[inline]
    pub fn field(
        &self,
        id: FieldId,
    ) -> &Field {
        &self.fields[id.index()]
    }

    #[inline]
    pub fn function(
        &self,
        id: FunctionId,
    ) -> &Function {
        &self.functions[id.index()]
    }

    pub fn field_mut(
        &mut self,
        id: FieldId,
    ) -> &mut Field {
        &mut self.fields[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.libraries.iter()
    }

    /// `Class.name` style name used in diagnostics
    pub fn qualified_name(
        &self,
        function: FunctionId,
    ) -> String {
        let function = self.function(function);
        let owner = self.class(function.owner);
        if owner.is_toplevel() {
            function.name.clone()
        } else {
            format!("{}.{}", owner.name, function.name)
        }
    }

    /// Outermost enclosing function of a closure, or the function itself
    pub fn outermost_function(
        &self,
        mut function: FunctionId,
    ) -> FunctionId {
        while let Some(parent) = self.function(function).parent {
            function = parent;
        }
        function
    }

    /// Generated body of an `async` or `async*` function; it is resumed
    /// with a result, an exception and a stack trace
    pub fn is_async_closure(
        &self,
        function: FunctionId,
    ) -> bool {
        let f = self.function(function);
        f.is_generated_body()
            && f.parent.is_some_and(|p| {
                matches!(
                    self.function(p).async_marker,
                    AsyncMarker::Async | AsyncMarker::AsyncStar
                )
            })
    }

    pub fn is_subclass_of(
        &self,
        mut class: ClassId,
        ancestor: ClassId,
    ) -> bool {
        loop {
            if class == ancestor {
                return true;
            }
            match self.class(class).super_class {
                Some(sup) => class = sup,
                None => return false,
            }
        }
    }

    // ===== Lookups =====

    pub fn lookup_library(
        &self,
        uri: &str,
    ) -> Option<LibraryId> {
        self.libraries_by_uri.get(uri).copied()
    }

    pub fn lookup_class(
        &self,
        library: LibraryId,
        name: &str,
    ) -> Option<ClassId> {
        if name == TOPLEVEL_CLASS_NAME {
            return Some(self.library(library).toplevel_class);
        }
        self.classes_by_name
            .get(&(library, name.to_string()))
            .copied()
    }

    pub fn lookup_field(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<FieldId> {
        self.fields_by_name.get(&(class, name.to_string())).copied()
    }

    /// Function declared directly in `class`
    pub fn lookup_function(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<FunctionId> {
        self.functions_by_name
            .get(&(class, name.to_string()))
            .copied()
    }

    pub fn lookup_static_method(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<FunctionId> {
        self.lookup_function(class, name)
            .filter(|&f| self.function(f).is_static)
    }

    /// Generative constructor or factory named `Class.name`
    pub fn lookup_constructor(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<FunctionId> {
        self.lookup_function(class, name).filter(|&f| {
            matches!(
                self.function(f).kind,
                FunctionKind::Constructor | FunctionKind::Factory
            )
        })
    }

    /// Instance member `name` as found by dynamic dispatch on `class`
    pub fn resolve_dynamic(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<FunctionId> {
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(f) = self.lookup_function(c, name) {
                let function = self.function(f);
                if !function.is_static && !function.is_abstract {
                    return Some(f);
                }
            }
            current = self.class(c).super_class;
        }
        None
    }

    /// Function whose body is the function node at `offset`
    pub fn function_at(
        &self,
        offset: NodeOffset,
    ) -> Option<FunctionId> {
        self.functions_by_offset.get(&offset).copied()
    }

    pub fn field_at(
        &self,
        offset: NodeOffset,
    ) -> Option<FieldId> {
        self.fields_by_offset.get(&offset).copied()
    }

    // ===== Types =====

    /// Resolve a kernel type; unknown classes and type parameters become
    /// [`AbstractType::Malformed`].
    pub fn resolve_type(
        &self,
        program: &Program,
        ty: &KernelType,
        scope: TypeScope<'_>,
    ) -> AbstractType {
        match ty {
            KernelType::Invalid => AbstractType::Malformed("invalid type".to_string()),
            KernelType::Dynamic => AbstractType::Dynamic,
            KernelType::Void => AbstractType::Void,
            KernelType::Bottom => AbstractType::Bottom,
            KernelType::Interface {
                class,
                type_arguments,
            } => match self.resolve_class_name(program, *class) {
                Some(id) => AbstractType::Interface {
                    class: id,
                    name: self.class(id).name.clone(),
                    arguments: type_arguments
                        .iter()
                        .map(|t| self.resolve_type(program, t, scope))
                        .collect(),
                },
                None => AbstractType::Malformed(format!(
                    "unknown class {}",
                    program.strings.get(program.names.string(*class))
                )),
            },
            KernelType::Function {
                positional,
                named,
                return_type,
            } => AbstractType::Function {
                parameters: positional
                    .iter()
                    .map(|t| self.resolve_type(program, t, scope))
                    .collect(),
                named: named
                    .iter()
                    .map(|(n, t)| (program.strings.get(*n).to_string(), self.resolve_type(program, t, scope)))
                    .collect(),
                result: Box::new(self.resolve_type(program, return_type, scope)),
            },
            KernelType::TypeParameter { name } => {
                let name = program.strings.get(*name);
                if let Some(index) = scope.function_parameters.iter().rposition(|p| p == name) {
                    AbstractType::TypeParameter {
                        name: name.to_string(),
                        index,
                        owner: TypeParameterOwner::Function,
                    }
                } else if let Some(index) = scope.class_parameters.iter().position(|p| p == name) {
                    AbstractType::TypeParameter {
                        name: name.to_string(),
                        index,
                        owner: TypeParameterOwner::Class,
                    }
                } else {
                    AbstractType::Malformed(format!("type parameter {} not in scope", name))
                }
            }
        }
    }

    /// Class for a class canonical name (`root / uri / class`)
    pub fn resolve_class_name(
        &self,
        program: &Program,
        name: NameIndex,
    ) -> Option<ClassId> {
        let library = program.names.parent(name)?;
        let uri = program.strings.get(program.names.string(library));
        let library = self.lookup_library(uri)?;
        self.lookup_class(library, program.strings.get(program.names.string(name)))
    }

    /// Interface type for a class with its own type parameters as arguments
    pub fn declaration_type(
        &self,
        class: ClassId,
    ) -> AbstractType {
        let c = self.class(class);
        AbstractType::Interface {
            class,
            name: c.name.clone(),
            arguments: c
                .type_parameters
                .iter()
                .enumerate()
                .map(|(index, name)| AbstractType::TypeParameter {
                    name: name.clone(),
                    index,
                    owner: TypeParameterOwner::Class,
                })
                .collect(),
        }
    }

    /// Raw interface type of a class
    pub fn class_type(
        &self,
        class: ClassId,
    ) -> AbstractType {
        AbstractType::Interface {
            class,
            name: self.class(class).name.clone(),
            arguments: Vec::new(),
        }
    }

    // ===== Dispatchers =====

    /// Function forwarding calls of `name` with `descriptor` to `noSuchMethod`
    pub fn add_no_such_method_dispatcher(
        &mut self,
        class: ClassId,
        name: &str,
        descriptor: ArgumentsDescriptor,
    ) -> FunctionId {
        self.add_dispatcher(class, name, FunctionKind::NoSuchMethodDispatcher, descriptor)
    }

    /// Function calling the closure held in field `name`
    pub fn add_invoke_field_dispatcher(
        &mut self,
        class: ClassId,
        name: &str,
        descriptor: ArgumentsDescriptor,
    ) -> FunctionId {
        self.add_dispatcher(class, name, FunctionKind::InvokeFieldDispatcher, descriptor)
    }

    fn add_dispatcher(
        &mut self,
        class: ClassId,
        name: &str,
        kind: FunctionKind,
        descriptor: ArgumentsDescriptor,
    ) -> FunctionId {
        let key = (class, name.to_string(), kind, descriptor.clone());
        if let Some(&existing) = self.dispatchers.get(&key) {
            return existing;
        }
        let id = FunctionId(self.functions.len() as u32);
        let mut function = Function::new(id, name, kind, class);
        function.num_fixed_parameters = descriptor.positional_count();
        function.num_optional_parameters = descriptor.named_count();
        function.has_named_parameters = descriptor.named_count() > 0;
        function.parameter_names = std::iter::once("this".to_string())
            .chain((1..descriptor.positional_count()).map(|i| format!(":arg{}", i)))
            .chain(descriptor.named.iter().cloned())
            .collect();
        function.type_parameters = (0..descriptor.type_args_len)
            .map(|i| format!("T{}", i))
            .collect();
        function.dispatcher_descriptor = Some(descriptor);
        self.functions.push(function);
        self.dispatchers.insert(key, id);
        id
    }

    // ===== Construction =====

    pub(crate) fn add_library(
        &mut self,
        uri: &str,
    ) -> LibraryId {
        if let Some(existing) = self.lookup_library(uri) {
            return existing;
        }
        let id = LibraryId(self.libraries.len() as u32);
        let toplevel_class = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            id: toplevel_class,
            name: TOPLEVEL_CLASS_NAME.to_string(),
            library: id,
            canonical_name: None,
            kernel_offset: None,
            position: TokenPosition::NO_SOURCE,
            super_class: None,
            type_parameters: Vec::new(),
            is_abstract: true,
            fields: Vec::new(),
            functions: Vec::new(),
            instance_field_count: 0,
        });
        self.libraries.push(Library {
            id,
            uri: uri.to_string(),
            canonical_name: None,
            is_deferred: false,
            is_external: false,
            private_key: private_key(uri),
            toplevel_class,
            classes: Vec::new(),
        });
        self.libraries_by_uri.insert(uri.to_string(), id);
        id
    }

    pub(crate) fn add_class(
        &mut self,
        library: LibraryId,
        name: &str,
        super_class: Option<ClassId>,
    ) -> ClassId {
        if let Some(existing) = self.lookup_class(library, name) {
            return existing;
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            id,
            name: name.to_string(),
            library,
            canonical_name: None,
            kernel_offset: None,
            position: TokenPosition::NO_SOURCE,
            super_class,
            type_parameters: Vec::new(),
            is_abstract: false,
            fields: Vec::new(),
            functions: Vec::new(),
            instance_field_count: 0,
        });
        self.libraries[library.index()].classes.push(id);
        self.classes_by_name.insert((library, name.to_string()), id);
        id
    }

    pub(crate) fn class_mut(
        &mut self,
        id: ClassId,
    ) -> &mut Class {
        &mut self.classes[id.index()]
    }

    pub(crate) fn add_field(
        &mut self,
        owner: ClassId,
        name: &str,
        init: impl FnOnce(&mut Field),
    ) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        let mut field = Field {
            id,
            name: name.to_string(),
            owner,
            canonical_name: None,
            kernel_offset: None,
            position: TokenPosition::NO_SOURCE,
            static_type: AbstractType::Dynamic,
            is_static: false,
            is_final: false,
            is_const: false,
            has_initializer: false,
            has_trivial_initializer: true,
            guard: GuardState::Unknown,
            guarded_list_length: None,
            instance_slot: None,
        };
        init(&mut field);
        if let Some(offset) = field.kernel_offset {
            self.fields_by_offset.insert(offset, id);
        }
        self.fields.push(field);
        self.classes[owner.index()].fields.push(id);
        self.fields_by_name.insert((owner, name.to_string()), id);
        id
    }

    pub(crate) fn add_function(
        &mut self,
        owner: ClassId,
        name: &str,
        kind: FunctionKind,
        init: impl FnOnce(&mut Function),
    ) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        let mut function = Function::new(id, name, kind, owner);
        init(&mut function);
        // Implicit closures share the node of their target
        if kind != FunctionKind::ImplicitClosure {
            if let Some(offset) = function.kernel_offset {
                self.functions_by_offset.insert(offset, id);
            }
        }
        let named = !kind.is_closure() && !kind.is_dispatcher();
        self.functions.push(function);
        self.classes[owner.index()].functions.push(id);
        if named {
            self.functions_by_name.insert((owner, name.to_string()), id);
        }
        id
    }

    pub(crate) fn function_mut(
        &mut self,
        id: FunctionId,
    ) -> &mut Function {
        &mut self.functions[id.index()]
    }

    fn assign_instance_slots(&mut self) {
        let mut done = vec![false; self.classes.len()];
        for index in 0..self.classes.len() {
            self.assign_slots_of(ClassId(index as u32), &mut done);
        }
    }

    fn assign_slots_of(
        &mut self,
        class: ClassId,
        done: &mut Vec<bool>,
    ) -> usize {
        if done[class.index()] {
            return self.classes[class.index()].instance_field_count;
        }
        // Mark first so a malformed cyclic hierarchy terminates.
        done[class.index()] = true;
        let inherited = match self.classes[class.index()].super_class {
            Some(sup) => self.assign_slots_of(sup, done),
            None => 0,
        };
        let mut count = inherited;
        let fields = self.classes[class.index()].fields.clone();
        for field in fields {
            let field = &mut self.fields[field.index()];
            if !field.is_static {
                field.instance_slot = Some(count);
                count += 1;
            }
        }
        self.classes[class.index()].instance_field_count = count;
        count
    }
}

/// Fills a store from a kernel program
struct Loader<'s, 'p> {
    store: &'s mut ObjectStore,
    program: &'p Program,
}

impl<'s, 'p> Loader<'s, 'p> {
    fn string(
        &self,
        name: NameIndex,
    ) -> &'p str {
        self.program.strings.get(self.program.names.string(name))
    }

    fn unresolved(
        &self,
        kind: &'static str,
        name: NameIndex,
    ) -> BuildError {
        BuildError::Unresolved {
            kind,
            name: self.string(name).to_string(),
        }
    }

    fn load_libraries(&mut self) -> BuildResult<()> {
        let program = self.program;
        for library in &program.libraries {
            let uri = self.string(library.canonical_name);
            let id = self.store.add_library(uri);
            let entry = &mut self.store.libraries[id.index()];
            entry.canonical_name = Some(library.canonical_name);
            entry.is_deferred = library.is_deferred;
            entry.is_external = library.is_external;
            for class in &library.classes {
                let name = self.string(class.canonical_name);
                let class_id = self.store.add_class(id, name, None);
                let type_parameters = class
                    .type_parameters
                    .iter()
                    .map(|p| self.program.strings.get(p.name).to_string())
                    .collect();
                let entry = self.store.class_mut(class_id);
                entry.canonical_name = Some(class.canonical_name);
                entry.kernel_offset = Some(class.offset);
                entry.position = class.position;
                entry.is_abstract = class.is_abstract;
                entry.type_parameters = type_parameters;
            }
        }
        Ok(())
    }

    fn resolve_super_classes(&mut self) -> BuildResult<()> {
        let object = self.store.core.object;
        let program = self.program;
        for library in &program.libraries {
            for class in &library.classes {
                let id = self
                    .store
                    .resolve_class_name(self.program, class.canonical_name)
                    .ok_or_else(|| self.unresolved("class", class.canonical_name))?;
                let super_class = match &class.super_class {
                    Some(supertype) => Some(
                        self.store
                            .resolve_class_name(self.program, supertype.class)
                            .ok_or_else(|| self.unresolved("class", supertype.class))?,
                    ),
                    None if id == object => None,
                    None => self.store.class(id).super_class.or(Some(object)),
                };
                self.store.class_mut(id).super_class = super_class;
            }
        }
        Ok(())
    }

    fn load_members(&mut self) -> BuildResult<()> {
        let program = self.program;
        for library in &program.libraries {
            let uri = self.string(library.canonical_name);
            let library_id = self
                .store
                .lookup_library(uri)
                .ok_or_else(|| self.unresolved("library", library.canonical_name))?;
            let toplevel = self.store.library(library_id).toplevel_class;
            for field in &library.fields {
                self.load_field(toplevel, field);
            }
            for procedure in &library.procedures {
                self.load_procedure(toplevel, procedure, true);
            }
            for class in &library.classes {
                let class_id = self
                    .store
                    .resolve_class_name(self.program, class.canonical_name)
                    .ok_or_else(|| self.unresolved("class", class.canonical_name))?;
                self.load_class_members(class_id, class);
            }
        }
        Ok(())
    }

    fn load_class_members(
        &mut self,
        class_id: ClassId,
        class: &'p KernelClass,
    ) {
        for field in &class.fields {
            self.load_field(class_id, field);
        }
        for constructor in &class.constructors {
            self.load_constructor(class_id, constructor);
        }
        for procedure in &class.procedures {
            self.load_procedure(class_id, procedure, false);
        }
    }

    /// Name of a member as stored in the object model, private names mangled
    fn member_name(
        &self,
        name: NameIndex,
    ) -> String {
        let text = self.string(name);
        if !text.starts_with('_') {
            return text.to_string();
        }
        let uri = self
            .program
            .names
            .parent(name)
            .map(|library| self.string(library))
            .unwrap_or_default();
        format!("{}{}", text, private_key(uri))
    }

    fn load_field(
        &mut self,
        owner: ClassId,
        field: &'p KernelField,
    ) {
        let name = self.member_name(field.canonical_name);
        let is_static = field.is_static || self.store.class(owner).is_toplevel();
        let class_parameters = self.store.class(owner).type_parameters.clone();
        let static_type = self.store.resolve_type(
            self.program,
            &field.ty,
            TypeScope {
                class_parameters: &class_parameters,
                function_parameters: &[],
            },
        );
        let trivial = field.initializer.as_ref().map_or(true, is_trivial_initializer);
        let field_id = self.store.add_field(owner, &name, |f| {
            f.canonical_name = Some(field.canonical_name);
            f.kernel_offset = Some(field.offset);
            f.position = field.position;
            f.static_type = static_type.clone();
            f.is_static = is_static;
            f.is_final = field.is_final || field.is_const;
            f.is_const = field.is_const;
            f.has_initializer = field.initializer.is_some();
            f.has_trivial_initializer = trivial;
        });

        let position = field.position;
        if !is_static {
            self.store.add_function(
                owner,
                &format!("{}{}", GETTER_PREFIX, name),
                FunctionKind::ImplicitGetter,
                |f| {
                    f.field = Some(field_id);
                    f.position = position;
                    f.num_fixed_parameters = 1;
                    f.parameter_names = vec!["this".to_string()];
                    f.result_type = static_type.clone();
                },
            );
            if !field.is_final && !field.is_const {
                self.store.add_function(
                    owner,
                    &format!("{}{}", SETTER_PREFIX, name),
                    FunctionKind::ImplicitSetter,
                    |f| {
                        f.field = Some(field_id);
                        f.position = position;
                        f.num_fixed_parameters = 2;
                        f.parameter_names = vec!["this".to_string(), "value".to_string()];
                        f.result_type = AbstractType::Void;
                    },
                );
            }
        } else if !trivial && !field.is_const {
            self.store.add_function(
                owner,
                &format!("{}{}", GETTER_PREFIX, name),
                FunctionKind::ImplicitStaticGetter,
                |f| {
                    f.field = Some(field_id);
                    f.position = position;
                    f.is_static = true;
                    f.result_type = static_type.clone();
                },
            );
            let initializer = self.store.add_function(
                owner,
                &format!("{}{}", INITIALIZER_PREFIX, name),
                FunctionKind::FieldInitializer,
                |f| {
                    f.field = Some(field_id);
                    f.position = position;
                    f.is_static = true;
                    f.result_type = static_type;
                },
            );
            // Closures inside initializers get their parent here.
            if let Some(init) = &field.initializer {
                let mut closures = Vec::new();
                collect_closures_in_expression(init, &mut closures);
                for node in closures {
                    self.load_closure(owner, initializer, node);
                }
            }
        }
    }

    fn load_procedure(
        &mut self,
        owner: ClassId,
        procedure: &'p Procedure,
        toplevel: bool,
    ) {
        let base = self.member_name(procedure.canonical_name);
        let (name, kind) = match procedure.kind {
            ProcedureKind::Method | ProcedureKind::Operator => (base.clone(), FunctionKind::Regular),
            ProcedureKind::Getter => (format!("{}{}", GETTER_PREFIX, base), FunctionKind::Getter),
            ProcedureKind::Setter => (format!("{}{}", SETTER_PREFIX, base), FunctionKind::Setter),
            ProcedureKind::Factory => (
                format!("{}.{}", self.store.class(owner).name, base),
                FunctionKind::Factory,
            ),
        };
        let is_static = procedure.is_static || toplevel || kind == FunctionKind::Factory;
        let implicit = usize::from(!is_static || kind == FunctionKind::Factory);
        let node = &procedure.function;
        let id = self.add_function_for_node(owner, &name, kind, node, implicit, |f| {
            f.canonical_name = Some(procedure.canonical_name);
            f.position = procedure.position;
            f.is_static = is_static;
            f.is_abstract = procedure.is_abstract;
            f.is_external = procedure.is_external;
            f.is_const = procedure.is_const;
            f.native_name = procedure.native_name.clone();
        });
        if kind == FunctionKind::Factory {
            self.store.function_mut(id).parameter_names[0] = ":type_arguments".to_string();
        }

        if kind == FunctionKind::Regular && !procedure.is_abstract {
            let closure = self.add_function_for_node(owner, &name, FunctionKind::ImplicitClosure, node, 1, |f| {
                f.position = procedure.position;
                f.target = Some(id);
                f.parent = Some(id);
            });
            self.store.function_mut(id).implicit_closure = Some(closure);
            if !is_static {
                let extractor = format!("{}{}", GETTER_PREFIX, name);
                if self.store.lookup_function(owner, &extractor).is_none() {
                    self.store
                        .add_function(owner, &extractor, FunctionKind::MethodExtractor, |f| {
                            f.target = Some(id);
                            f.position = procedure.position;
                            f.num_fixed_parameters = 1;
                            f.parameter_names = vec!["this".to_string()];
                        });
                }
            }
        }
        self.load_nested_closures(owner, id, node);
    }

    fn load_constructor(
        &mut self,
        owner: ClassId,
        constructor: &'p Constructor,
    ) {
        let name = format!(
            "{}.{}",
            self.store.class(owner).name,
            self.member_name(constructor.canonical_name)
        );
        let node = &constructor.function;
        let id = self.add_function_for_node(owner, &name, FunctionKind::Constructor, node, 1, |f| {
            f.canonical_name = Some(constructor.canonical_name);
            f.position = constructor.position;
            f.is_external = constructor.is_external;
            f.is_const = constructor.is_const;
            f.result_type = AbstractType::Void;
        });
        for initializer in &constructor.initializers {
            let mut closures = Vec::new();
            match initializer {
                Initializer::Field { value, .. } => collect_closures_in_expression(value, &mut closures),
                Initializer::Super { arguments, .. } | Initializer::Redirecting { arguments, .. } => {
                    for e in &arguments.positional {
                        collect_closures_in_expression(e, &mut closures);
                    }
                    for n in &arguments.named {
                        collect_closures_in_expression(&n.value, &mut closures);
                    }
                }
                Initializer::Local { variable } => {
                    if let Some(init) = &variable.initializer {
                        collect_closures_in_expression(init, &mut closures);
                    }
                }
                Initializer::Invalid => {}
            }
            for closure in closures {
                self.load_closure(owner, id, closure);
            }
        }
        self.load_nested_closures(owner, id, node);
    }

    fn load_nested_closures(
        &mut self,
        owner: ClassId,
        parent: FunctionId,
        node: &'p FunctionNode,
    ) {
        let mut closures = Vec::new();
        for parameter in node.parameters() {
            if let Some(init) = &parameter.initializer {
                collect_closures_in_expression(init, &mut closures);
            }
        }
        if let Some(body) = &node.body {
            collect_closures_in_statement(body, &mut closures);
        }
        for closure in closures {
            self.load_closure(owner, parent, closure);
        }
    }

    fn load_closure(
        &mut self,
        owner: ClassId,
        parent: FunctionId,
        node: &'p FunctionNode,
    ) {
        let id = self.add_function_for_node(owner, "<anonymous closure>", FunctionKind::Closure, node, 1, |f| {
            f.parent = Some(parent);
        });
        self.load_nested_closures(owner, id, node);
    }

    /// Add a function whose signature comes from `node`. `implicit` counts the
    /// leading receiver/closure/type-argument parameter.
    fn add_function_for_node(
        &mut self,
        owner: ClassId,
        name: &str,
        kind: FunctionKind,
        node: &'p FunctionNode,
        implicit: usize,
        init: impl FnOnce(&mut Function),
    ) -> FunctionId {
        let strings = &self.program.strings;
        let mut type_parameters: Vec<String> = Vec::new();
        let mut parameter_names = Vec::new();
        if implicit > 0 {
            parameter_names.push(if kind.is_closure() { ":closure" } else { "this" }.to_string());
        }
        parameter_names.extend(node.parameters().map(|p| strings.get(p.name).to_string()));
        type_parameters.extend(node.type_parameters.iter().map(|p| strings.get(p.name).to_string()));

        let class_parameters = self.store.class(owner).type_parameters.clone();
        let result_type = self.store.resolve_type(
            self.program,
            &node.return_type,
            TypeScope {
                class_parameters: &class_parameters,
                function_parameters: &type_parameters,
            },
        );
        let optional_positional = node.positional_parameters.len() - node.required_parameter_count;

        self.store.add_function(owner, name, kind, |f| {
            f.kernel_offset = Some(node.offset);
            f.position = node.position;
            f.end_position = node.end_position;
            f.async_marker = node.async_marker;
            f.num_fixed_parameters = implicit + node.required_parameter_count;
            f.num_optional_parameters = optional_positional + node.named_parameters.len();
            f.has_named_parameters = !node.named_parameters.is_empty();
            f.parameter_names = parameter_names;
            f.type_parameters = type_parameters;
            f.result_type = result_type;
            init(f);
        })
    }
}

/// Initializer whose value needs no code: a literal or a constant reference
fn is_trivial_initializer(expression: &Expression) -> bool {
    matches!(
        expression.kind,
        ExpressionKind::IntLiteral(_)
            | ExpressionKind::DoubleLiteral(_)
            | ExpressionKind::BoolLiteral(_)
            | ExpressionKind::NullLiteral
            | ExpressionKind::StringLiteral(_)
            | ExpressionKind::Constant(_)
    )
}
