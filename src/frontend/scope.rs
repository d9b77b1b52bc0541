//! 局部变量与作用域
//!
//! Every local the graph builder reads or writes is a [`LocalVariable`] in
//! one flat table, referred to by [`VarId`]. Scopes only matter for context
//! allocation: a scope that declares captured variables owns a context
//! object at a fixed level of the context chain.

use crate::kernel::NodeOffset;
use crate::object::AbstractType;
use crate::util::span::TokenPosition;

/// Handle of a local variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a local scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a variable stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Declared in the kernel program
    Declared,
    /// Incoming argument at the given position, receiver first
    Parameter(usize),
    /// Builder bookkeeping (`:current_context_var`, `:switch_expr`, ...)
    Synthetic,
    /// Expression stack slot made addressable by `MakeTemporary`
    Temporary(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub position: TokenPosition,
    pub ty: AbstractType,
    pub kind: VariableKind,
    pub is_final: bool,
    /// Referenced from a nested function; lives in a context
    pub is_captured: bool,
    /// Scope that declares the variable
    pub owner: Option<ScopeId>,
    /// Function nesting depth of the declaration, 0 for the outermost member
    pub function_depth: usize,
    /// Slot in the owner's context
    pub context_index: Option<usize>,
    /// Context level of the owner's context
    pub context_level: usize,
}

impl LocalVariable {
    pub fn new(
        name: impl Into<String>,
        kind: VariableKind,
    ) -> Self {
        Self {
            name: name.into(),
            position: TokenPosition::NO_SOURCE,
            ty: AbstractType::Dynamic,
            kind,
            is_final: false,
            is_captured: false,
            owner: None,
            function_depth: 0,
            context_index: None,
            context_level: 0,
        }
    }

    #[inline]
    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, VariableKind::Parameter(_))
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        matches!(self.kind, VariableKind::Temporary(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalScope {
    pub parent: Option<ScopeId>,
    /// Node that opened the scope
    pub kernel_offset: Option<NodeOffset>,
    pub function_depth: usize,
    pub variables: Vec<VarId>,
    /// Variables stored in this scope's context
    pub num_context_variables: usize,
    /// Level of the innermost context visible inside the scope
    pub context_level: usize,
}

impl LocalScope {
    pub fn new(
        parent: Option<ScopeId>,
        kernel_offset: Option<NodeOffset>,
        function_depth: usize,
    ) -> Self {
        Self {
            parent,
            kernel_offset,
            function_depth,
            variables: Vec::new(),
            num_context_variables: 0,
            context_level: 0,
        }
    }

    /// The scope allocates a context when entered
    #[inline]
    pub fn has_context(&self) -> bool {
        self.num_context_variables > 0
    }
}
