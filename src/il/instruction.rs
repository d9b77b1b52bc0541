//! IL instructions
//!
//! Instructions live in a [`GraphArena`](crate::il::graph::GraphArena) and are
//! referred to by [`InstrId`]. Within a basic block they form a singly linked
//! chain through `next`; blocks are connected by the successor ids carried in
//! the payload of their last instruction.

use crate::frontend::scope::VarId;
use crate::object::{AbstractType, ArgumentsDescriptor, ClassId, FieldId, FunctionId};
use crate::util::span::TokenPosition;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

/// Handle of an instruction in its graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

impl InstrId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Value inputs; most instructions have at most two
pub type Inputs = SmallVec<[InstrId; 2]>;

/// Operator tokens attached to comparisons and instance calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Eq,
    Ne,
    EqStrict,
    NeStrict,
    Lt,
    Gt,
    Lte,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    TruncDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,
    Negate,
    Index,
    AssignIndex,
    Get,
    Set,
    /// Plain method call
    Illegal,
}

static OPERATOR_TOKENS: Lazy<HashMap<&'static str, Token>> = Lazy::new(|| {
    [
        ("==", Token::Eq),
        ("<", Token::Lt),
        (">", Token::Gt),
        ("<=", Token::Lte),
        (">=", Token::Gte),
        ("+", Token::Add),
        ("-", Token::Sub),
        ("*", Token::Mul),
        ("/", Token::Div),
        ("~/", Token::TruncDiv),
        ("%", Token::Mod),
        ("&", Token::BitAnd),
        ("|", Token::BitOr),
        ("^", Token::BitXor),
        ("~", Token::BitNot),
        ("<<", Token::Shl),
        (">>", Token::Shr),
        ("unary-", Token::Negate),
        ("[]", Token::Index),
        ("[]=", Token::AssignIndex),
    ]
    .into_iter()
    .collect()
});

impl Token {
    /// Token for an instance call of `name`
    pub fn from_method_name(name: &str) -> Token {
        if let Some(&token) = OPERATOR_TOKENS.get(name) {
            return token;
        }
        if name.starts_with("get:") {
            Token::Get
        } else if name.starts_with("set:") {
            Token::Set
        } else {
            Token::Illegal
        }
    }

    #[inline]
    pub fn is_binary_arithmetic(self) -> bool {
        matches!(
            self,
            Token::Add
                | Token::Sub
                | Token::Mul
                | Token::Div
                | Token::TruncDiv
                | Token::Mod
                | Token::BitAnd
                | Token::BitOr
                | Token::BitXor
                | Token::Shl
                | Token::Shr
        )
    }

    #[inline]
    pub fn is_relational(self) -> bool {
        matches!(self, Token::Lt | Token::Gt | Token::Lte | Token::Gte)
    }

    #[inline]
    pub fn is_equality(self) -> bool {
        matches!(self, Token::Eq | Token::Ne | Token::EqStrict | Token::NeStrict)
    }

    /// Number of leading arguments whose classes the call site records
    #[inline]
    pub fn checked_argument_count(self) -> usize {
        if self.is_binary_arithmetic() || self.is_relational() || self.is_equality() {
            2
        } else {
            1
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::EqStrict => "===",
            Token::NeStrict => "!==",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Add => "+",
            Token::Sub => "-",
            Token::Mul => "*",
            Token::Div => "/",
            Token::TruncDiv => "~/",
            Token::Mod => "%",
            Token::BitAnd => "&",
            Token::BitOr => "|",
            Token::BitXor => "^",
            Token::BitNot => "~",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::Negate => "unary-",
            Token::Index => "[]",
            Token::AssignIndex => "[]=",
            Token::Get => "get",
            Token::Set => "set",
            Token::Illegal => "call",
        }
    }
}

/// Storage location read by `LoadField` and written by `StoreInstanceField`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Field(FieldId),
    ContextParent,
    ContextVariable(usize),
    ClosureFunction,
    ClosureContext,
    ClosureInstantiatorTypeArguments,
    ClosureFunctionTypeArguments,
    ArrayLength,
    /// Argument count recorded in an arguments descriptor
    ArgumentCount,
    /// Type argument vector of a generic instance
    TypeArguments,
}

impl fmt::Display for Slot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Slot::Field(id) => write!(f, "field#{}", id.0),
            Slot::ContextParent => write!(f, "Context.parent"),
            Slot::ContextVariable(i) => write!(f, "Context.var[{}]", i),
            Slot::ClosureFunction => write!(f, "Closure.function"),
            Slot::ClosureContext => write!(f, "Closure.context"),
            Slot::ClosureInstantiatorTypeArguments => write!(f, "Closure.instantiator_type_arguments"),
            Slot::ClosureFunctionTypeArguments => write!(f, "Closure.function_type_arguments"),
            Slot::ArrayLength => write!(f, "Array.length"),
            Slot::ArgumentCount => write!(f, "ArgumentsDescriptor.count"),
            Slot::TypeArguments => write!(f, "type_arguments"),
        }
    }
}

/// Compile-time constant values
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Symbol(String),
    Type(AbstractType),
    TypeArguments(Vec<AbstractType>),
    List {
        element_type: AbstractType,
        elements: Vec<ConstantValue>,
    },
    Map {
        key_type: AbstractType,
        value_type: AbstractType,
        entries: Vec<(ConstantValue, ConstantValue)>,
    },
    /// Plain array, e.g. argument names
    Array(Vec<ConstantValue>),
    /// Closure of a torn-off static function
    Closure(FunctionId),
    Function(FunctionId),
    Field(FieldId),
    ArgumentsDescriptor(ArgumentsDescriptor),
}

impl ConstantValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ConstantValue::Null)
    }

    /// Value that `identical` compares by number rather than by reference
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, ConstantValue::Int(_) | ConstantValue::Double(_))
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConstantValue::Null => write!(f, "null"),
            ConstantValue::Bool(b) => write!(f, "{}", b),
            ConstantValue::Int(i) => write!(f, "{}", i),
            ConstantValue::Double(d) => write!(f, "{:?}", d),
            ConstantValue::String(s) => write!(f, "\"{}\"", s.escape_debug()),
            ConstantValue::Symbol(s) => write!(f, "#{}", s),
            ConstantValue::Type(t) => write!(f, "{}", t),
            ConstantValue::TypeArguments(types) => {
                write!(f, "<")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ">")
            }
            ConstantValue::List { elements, .. } => {
                write!(f, "const [")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            ConstantValue::Map { entries, .. } => {
                write!(f, "const {{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            ConstantValue::Array(elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            ConstantValue::Closure(id) => write!(f, "closure(fn#{})", id.0),
            ConstantValue::Function(id) => write!(f, "fn#{}", id.0),
            ConstantValue::Field(id) => write!(f, "field#{}", id.0),
            ConstantValue::ArgumentsDescriptor(d) => write!(f, "{}", d),
        }
    }
}

/// Call site shape shared by the call instructions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallShape {
    pub type_args_len: usize,
    /// Arguments including the receiver, excluding the type argument vector
    pub argument_count: usize,
    pub argument_names: Vec<String>,
}

impl CallShape {
    pub fn new(
        type_args_len: usize,
        argument_count: usize,
        argument_names: Vec<String>,
    ) -> Self {
        Self {
            type_args_len,
            argument_count,
            argument_names,
        }
    }

    #[inline]
    pub fn positional(argument_count: usize) -> Self {
        Self::new(0, argument_count, Vec::new())
    }

    /// Values the call consumes from the stack
    #[inline]
    pub fn pushed_count(&self) -> usize {
        self.argument_count + usize::from(self.type_args_len > 0)
    }

    pub fn descriptor(&self) -> ArgumentsDescriptor {
        ArgumentsDescriptor::new(self.type_args_len, self.argument_count, self.argument_names.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    // ===== Block entries =====
    GraphEntry {
        block_id: usize,
        normal_entry: Option<InstrId>,
        catch_entries: Vec<InstrId>,
        osr_id: Option<usize>,
    },
    TargetEntry {
        block_id: usize,
        try_index: Option<usize>,
    },
    JoinEntry {
        block_id: usize,
        try_index: Option<usize>,
    },
    CatchBlockEntry {
        block_id: usize,
        /// Region enclosing the handler itself
        try_index: Option<usize>,
        /// Region the handler catches for
        catch_try_index: usize,
        handler_types: Vec<AbstractType>,
        exception_var: VarId,
        stacktrace_var: VarId,
        needs_stacktrace: bool,
    },

    // ===== Control transfer =====
    Goto {
        target: InstrId,
    },
    /// Input 0 is the comparison instruction
    Branch {
        true_successor: InstrId,
        false_successor: InstrId,
    },
    Return,
    Throw,
    /// `catch_try_index` is `None` outside of any handler
    ReThrow {
        catch_try_index: Option<usize>,
    },
    TailCall {
        code: String,
    },

    // ===== Definitions and effects =====
    Constant(ConstantValue),
    Parameter {
        index: usize,
    },
    LoadLocal {
        variable: VarId,
    },
    StoreLocal {
        variable: VarId,
    },
    /// Drops `count` temporaries; an input, if any, is the preserved value
    DropTemps {
        count: usize,
    },
    PushArgument,
    StrictCompare {
        kind: Token,
        needs_number_check: bool,
    },
    BooleanNegate,
    /// Inputs: value, instantiator type arguments, function type arguments
    InstanceOf {
        ty: AbstractType,
    },
    /// Inputs: value, instantiator type arguments, function type arguments
    AssertAssignable {
        ty: AbstractType,
        name: String,
    },
    /// Inputs: instantiator type arguments, function type arguments
    AssertSubtype {
        sub_type: AbstractType,
        super_type: AbstractType,
        name: String,
    },
    AssertBoolean,
    CheckNull {
        function_name: String,
    },
    CheckStackOverflow {
        loop_depth: usize,
    },
    DebugStepCheck,
    ClosureCall {
        shape: CallShape,
    },
    InstanceCall {
        name: String,
        token: Token,
        shape: CallShape,
        checked_argument_count: usize,
        interface_target: Option<FunctionId>,
    },
    StaticCall {
        target: FunctionId,
        shape: CallShape,
    },
    NativeCall {
        name: String,
        function: FunctionId,
    },
    LoadIndexed,
    StoreIndexed,
    LoadField {
        slot: Slot,
    },
    StoreInstanceField {
        slot: Slot,
        emit_store_barrier: bool,
        is_initialization: bool,
    },
    InitStaticField {
        field: FieldId,
    },
    /// Input: the field as a constant
    LoadStaticField,
    StoreStaticField {
        field: FieldId,
    },
    /// Inputs: element type arguments, length
    CreateArray,
    AllocateObject {
        class: ClassId,
        closure_function: Option<FunctionId>,
    },
    LoadClassId,
    InstantiateType {
        ty: AbstractType,
    },
    InstantiateTypeArguments {
        type_arguments: Vec<AbstractType>,
    },
    AllocateContext {
        num_variables: usize,
    },
    CloneContext {
        num_variables: usize,
    },
    StringInterpolate,
    GuardFieldClass {
        field: FieldId,
    },
    GuardFieldLength {
        field: FieldId,
    },
}

/// One node of the IL graph
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub kind: InstrKind,
    pub inputs: Inputs,
    pub deopt_id: Option<usize>,
    pub position: TokenPosition,
    /// Next instruction in the same block
    pub next: Option<InstrId>,
    /// Stack slot of a definition that is on the expression stack
    pub temp_index: Option<usize>,
    /// Referenced through a temporary variable; dropping it needs `DropTemps`
    pub used_as_temp: bool,
}

impl Instruction {
    pub fn new(kind: InstrKind) -> Self {
        Self {
            kind,
            inputs: Inputs::new(),
            deopt_id: None,
            position: TokenPosition::NO_SOURCE,
            next: None,
            temp_index: None,
            used_as_temp: false,
        }
    }

    pub fn with_inputs(
        mut self,
        inputs: impl IntoIterator<Item = InstrId>,
    ) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    pub fn with_deopt_id(
        mut self,
        deopt_id: usize,
    ) -> Self {
        self.deopt_id = Some(deopt_id);
        self
    }

    pub fn at(
        mut self,
        position: TokenPosition,
    ) -> Self {
        self.position = position;
        self
    }

    #[inline]
    pub fn is_block_entry(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::GraphEntry { .. }
                | InstrKind::TargetEntry { .. }
                | InstrKind::JoinEntry { .. }
                | InstrKind::CatchBlockEntry { .. }
        )
    }

    #[inline]
    pub fn is_control_transfer(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::Goto { .. }
                | InstrKind::Branch { .. }
                | InstrKind::Return
                | InstrKind::Throw
                | InstrKind::ReThrow { .. }
                | InstrKind::TailCall { .. }
        )
    }

    /// Produces a value that can be pushed on the expression stack
    pub fn is_definition(&self) -> bool {
        match &self.kind {
            InstrKind::Constant(_)
            | InstrKind::Parameter { .. }
            | InstrKind::LoadLocal { .. }
            | InstrKind::StoreLocal { .. }
            | InstrKind::PushArgument
            | InstrKind::StrictCompare { .. }
            | InstrKind::BooleanNegate
            | InstrKind::InstanceOf { .. }
            | InstrKind::AssertAssignable { .. }
            | InstrKind::AssertBoolean
            | InstrKind::ClosureCall { .. }
            | InstrKind::InstanceCall { .. }
            | InstrKind::StaticCall { .. }
            | InstrKind::NativeCall { .. }
            | InstrKind::LoadIndexed
            | InstrKind::LoadField { .. }
            | InstrKind::LoadStaticField
            | InstrKind::CreateArray
            | InstrKind::AllocateObject { .. }
            | InstrKind::LoadClassId
            | InstrKind::InstantiateType { .. }
            | InstrKind::InstantiateTypeArguments { .. }
            | InstrKind::AllocateContext { .. }
            | InstrKind::CloneContext { .. }
            | InstrKind::StringInterpolate => true,
            InstrKind::DropTemps { .. } => !self.inputs.is_empty(),
            _ => false,
        }
    }

    pub fn has_side_effects(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::StoreLocal { .. }
                | InstrKind::ClosureCall { .. }
                | InstrKind::InstanceCall { .. }
                | InstrKind::StaticCall { .. }
                | InstrKind::NativeCall { .. }
                | InstrKind::StoreIndexed
                | InstrKind::StoreInstanceField { .. }
                | InstrKind::InitStaticField { .. }
                | InstrKind::StoreStaticField { .. }
                | InstrKind::Throw
                | InstrKind::ReThrow { .. }
                | InstrKind::TailCall { .. }
                | InstrKind::CheckStackOverflow { .. }
                | InstrKind::DebugStepCheck
                | InstrKind::StringInterpolate
        )
    }

    /// May fall back to unoptimized code at this point
    pub fn can_deoptimize(&self) -> bool {
        match &self.kind {
            InstrKind::StrictCompare {
                needs_number_check, ..
            } => *needs_number_check,
            InstrKind::InstanceOf { .. }
            | InstrKind::AssertAssignable { .. }
            | InstrKind::AssertSubtype { .. }
            | InstrKind::AssertBoolean
            | InstrKind::CheckNull { .. }
            | InstrKind::CheckStackOverflow { .. }
            | InstrKind::ClosureCall { .. }
            | InstrKind::InstanceCall { .. }
            | InstrKind::StaticCall { .. }
            | InstrKind::InitStaticField { .. }
            | InstrKind::InstantiateType { .. }
            | InstrKind::InstantiateTypeArguments { .. }
            | InstrKind::StringInterpolate
            | InstrKind::GuardFieldClass { .. }
            | InstrKind::GuardFieldLength { .. }
            | InstrKind::LoadIndexed
            | InstrKind::StoreIndexed => true,
            _ => false,
        }
    }

    /// Block number of a block entry
    pub fn block_id(&self) -> Option<usize> {
        match &self.kind {
            InstrKind::GraphEntry { block_id, .. }
            | InstrKind::TargetEntry { block_id, .. }
            | InstrKind::JoinEntry { block_id, .. }
            | InstrKind::CatchBlockEntry { block_id, .. } => Some(*block_id),
            _ => None,
        }
    }

    /// Exception region of a block entry
    pub fn try_index(&self) -> Option<usize> {
        match &self.kind {
            InstrKind::TargetEntry { try_index, .. }
            | InstrKind::JoinEntry { try_index, .. }
            | InstrKind::CatchBlockEntry { try_index, .. } => *try_index,
            _ => None,
        }
    }

    pub fn set_try_index(
        &mut self,
        index: Option<usize>,
    ) {
        match &mut self.kind {
            InstrKind::TargetEntry { try_index, .. }
            | InstrKind::JoinEntry { try_index, .. }
            | InstrKind::CatchBlockEntry { try_index, .. } => *try_index = index,
            _ => {}
        }
    }

    /// Blocks control can reach from this instruction
    pub fn successors(&self) -> SmallVec<[InstrId; 2]> {
        match &self.kind {
            InstrKind::Goto { target } => SmallVec::from_slice(&[*target]),
            InstrKind::Branch {
                true_successor,
                false_successor,
            } => SmallVec::from_slice(&[*true_successor, *false_successor]),
            InstrKind::GraphEntry {
                normal_entry,
                catch_entries,
                ..
            } => normal_entry.iter().chain(catch_entries.iter()).copied().collect(),
            _ => SmallVec::new(),
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match &self.kind {
            InstrKind::GraphEntry { .. } => "GraphEntry",
            InstrKind::TargetEntry { .. } => "TargetEntry",
            InstrKind::JoinEntry { .. } => "JoinEntry",
            InstrKind::CatchBlockEntry { .. } => "CatchBlockEntry",
            InstrKind::Goto { .. } => "Goto",
            InstrKind::Branch { .. } => "Branch",
            InstrKind::Return => "Return",
            InstrKind::Throw => "Throw",
            InstrKind::ReThrow { .. } => "ReThrow",
            InstrKind::TailCall { .. } => "TailCall",
            InstrKind::Constant(_) => "Constant",
            InstrKind::Parameter { .. } => "Parameter",
            InstrKind::LoadLocal { .. } => "LoadLocal",
            InstrKind::StoreLocal { .. } => "StoreLocal",
            InstrKind::DropTemps { .. } => "DropTemps",
            InstrKind::PushArgument => "PushArgument",
            InstrKind::StrictCompare { .. } => "StrictCompare",
            InstrKind::BooleanNegate => "BooleanNegate",
            InstrKind::InstanceOf { .. } => "InstanceOf",
            InstrKind::AssertAssignable { .. } => "AssertAssignable",
            InstrKind::AssertSubtype { .. } => "AssertSubtype",
            InstrKind::AssertBoolean => "AssertBoolean",
            InstrKind::CheckNull { .. } => "CheckNull",
            InstrKind::CheckStackOverflow { .. } => "CheckStackOverflow",
            InstrKind::DebugStepCheck => "DebugStepCheck",
            InstrKind::ClosureCall { .. } => "ClosureCall",
            InstrKind::InstanceCall { .. } => "InstanceCall",
            InstrKind::StaticCall { .. } => "StaticCall",
            InstrKind::NativeCall { .. } => "NativeCall",
            InstrKind::LoadIndexed => "LoadIndexed",
            InstrKind::StoreIndexed => "StoreIndexed",
            InstrKind::LoadField { .. } => "LoadField",
            InstrKind::StoreInstanceField { .. } => "StoreInstanceField",
            InstrKind::InitStaticField { .. } => "InitStaticField",
            InstrKind::LoadStaticField => "LoadStaticField",
            InstrKind::StoreStaticField { .. } => "StoreStaticField",
            InstrKind::CreateArray => "CreateArray",
            InstrKind::AllocateObject { .. } => "AllocateObject",
            InstrKind::LoadClassId => "LoadClassId",
            InstrKind::InstantiateType { .. } => "InstantiateType",
            InstrKind::InstantiateTypeArguments { .. } => "InstantiateTypeArguments",
            InstrKind::AllocateContext { .. } => "AllocateContext",
            InstrKind::CloneContext { .. } => "CloneContext",
            InstrKind::StringInterpolate => "StringInterpolate",
            InstrKind::GuardFieldClass { .. } => "GuardFieldClass",
            InstrKind::GuardFieldLength { .. } => "GuardFieldLength",
        }
    }
}
