//! 原生对象模型
//!
//! Libraries, classes, fields and functions as the graph builder sees them.
//! Entities live in flat tables inside [`ObjectStore`] and are referred to by
//! small copyable ids. The store is filled once from a kernel program and is
//! read-only while graphs are being built, so it can be shared between
//! builder threads.

pub mod bootstrap;
pub mod store;
pub mod types;

pub use store::ObjectStore;
pub use types::{AbstractType, ArgumentsDescriptor, TypeParameterOwner};

use crate::kernel::ast::AsyncMarker;
use crate::kernel::{NameIndex, NodeOffset};
use crate::util::span::TokenPosition;

/// Import URI of the bootstrapped core library
pub const CORE_LIBRARY_URI: &str = "kernel:core";

/// Name of the per-library class holding top-level members
pub const TOPLEVEL_CLASS_NAME: &str = "::";

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl $name {
                #[inline]
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

define_id!(
    /// Library handle
    LibraryId,
    /// Class handle
    ClassId,
    /// Field handle
    FieldId,
    /// Function handle
    FunctionId,
);

#[derive(Debug, Clone)]
pub struct Library {
    pub id: LibraryId,
    pub uri: String,
    pub canonical_name: Option<NameIndex>,
    pub is_deferred: bool,
    pub is_external: bool,
    /// Suffix appended to private names declared in this library
    pub private_key: String,
    pub toplevel_class: ClassId,
    pub classes: Vec<ClassId>,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub library: LibraryId,
    pub canonical_name: Option<NameIndex>,
    pub kernel_offset: Option<NodeOffset>,
    pub position: TokenPosition,
    pub super_class: Option<ClassId>,
    pub type_parameters: Vec<String>,
    pub is_abstract: bool,
    pub fields: Vec<FieldId>,
    pub functions: Vec<FunctionId>,
    /// Instance field count including inherited ones
    pub instance_field_count: usize,
}

impl Class {
    #[inline]
    pub fn is_toplevel(&self) -> bool {
        self.name == TOPLEVEL_CLASS_NAME
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        !self.type_parameters.is_empty()
    }
}

/// What the field guard currently knows about stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    /// No store observed yet
    #[default]
    Unknown,
    /// Every stored value had this class
    Class(ClassId),
    /// Values of more than one class were stored
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub owner: ClassId,
    pub canonical_name: Option<NameIndex>,
    pub kernel_offset: Option<NodeOffset>,
    pub position: TokenPosition,
    pub static_type: AbstractType,
    pub is_static: bool,
    pub is_final: bool,
    pub is_const: bool,
    pub has_initializer: bool,
    /// Initializer is a literal that needs no code to evaluate
    pub has_trivial_initializer: bool,
    pub guard: GuardState,
    /// Fixed length of stored lists, if known
    pub guarded_list_length: Option<usize>,
    /// Slot index among the instance fields of the owner
    pub instance_slot: Option<usize>,
}

impl Field {
    /// Stores need a class guard
    #[inline]
    pub fn needs_class_guard(&self) -> bool {
        !self.is_static && self.guard != GuardState::Dynamic
    }

    #[inline]
    pub fn needs_length_guard(&self) -> bool {
        !self.is_static && self.guarded_list_length.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Regular,
    Closure,
    Getter,
    Setter,
    Constructor,
    Factory,
    ImplicitGetter,
    ImplicitSetter,
    ImplicitStaticGetter,
    /// Computes the value of a static field with a non-trivial initializer
    FieldInitializer,
    MethodExtractor,
    NoSuchMethodDispatcher,
    InvokeFieldDispatcher,
    /// Body of the closure created when a method is torn off
    ImplicitClosure,
}

impl FunctionKind {
    #[inline]
    pub fn is_dispatcher(self) -> bool {
        matches!(
            self,
            FunctionKind::NoSuchMethodDispatcher | FunctionKind::InvokeFieldDispatcher
        )
    }

    #[inline]
    pub fn is_closure(self) -> bool {
        matches!(self, FunctionKind::Closure | FunctionKind::ImplicitClosure)
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub kind: FunctionKind,
    pub owner: ClassId,
    /// Enclosing function of a closure
    pub parent: Option<FunctionId>,
    pub canonical_name: Option<NameIndex>,
    /// Offset of the function node that holds the body
    pub kernel_offset: Option<NodeOffset>,
    pub position: TokenPosition,
    pub end_position: TokenPosition,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_external: bool,
    pub is_const: bool,
    pub native_name: Option<String>,
    pub async_marker: AsyncMarker,
    pub num_fixed_parameters: usize,
    pub num_optional_parameters: usize,
    pub has_named_parameters: bool,
    pub parameter_names: Vec<String>,
    pub type_parameters: Vec<String>,
    pub result_type: AbstractType,
    /// Field behind implicit accessors and field initializers
    pub field: Option<FieldId>,
    /// Target of method extractors and implicit closures
    pub target: Option<FunctionId>,
    /// Implicit closure used when this function is torn off
    pub implicit_closure: Option<FunctionId>,
    /// Call shape handled by a dispatcher
    pub dispatcher_descriptor: Option<ArgumentsDescriptor>,
}

impl Function {
    pub fn new(
        id: FunctionId,
        name: impl Into<String>,
        kind: FunctionKind,
        owner: ClassId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            owner,
            parent: None,
            canonical_name: None,
            kernel_offset: None,
            position: TokenPosition::NO_SOURCE,
            end_position: TokenPosition::NO_SOURCE,
            is_static: false,
            is_abstract: false,
            is_external: false,
            is_const: false,
            native_name: None,
            async_marker: AsyncMarker::Sync,
            num_fixed_parameters: 0,
            num_optional_parameters: 0,
            has_named_parameters: false,
            parameter_names: Vec::new(),
            type_parameters: Vec::new(),
            result_type: AbstractType::Dynamic,
            field: None,
            target: None,
            implicit_closure: None,
            dispatcher_descriptor: None,
        }
    }

    /// Receives `this` as its first argument
    #[inline]
    pub fn has_receiver(&self) -> bool {
        !self.is_static && !self.kind.is_closure() && self.kind != FunctionKind::Factory
    }

    /// Parameters as seen by callers, receiver included
    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.num_fixed_parameters + self.num_optional_parameters
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        !self.type_parameters.is_empty()
    }

    #[inline]
    pub fn is_generative_constructor(&self) -> bool {
        self.kind == FunctionKind::Constructor
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        self.native_name.is_some()
    }

    /// Desugared body of a generator or async function
    #[inline]
    pub fn is_generated_body(&self) -> bool {
        self.kind == FunctionKind::Closure && self.async_marker == AsyncMarker::SyncYielding
    }

    #[inline]
    pub fn is_implicit_accessor(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::ImplicitGetter | FunctionKind::ImplicitSetter | FunctionKind::ImplicitStaticGetter
        )
    }
}

#[cfg(test)]
mod tests;
