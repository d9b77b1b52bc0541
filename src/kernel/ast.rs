//! Kernel program tree
//!
//! Structured, offset-addressed representation of a resolved program. Every
//! statement, expression, function node and variable declaration carries a
//! [`NodeOffset`] that is unique within its [`Program`]; the scope builder keys
//! its maps by these offsets and the graph builder looks them up again during
//! translation.
//!
//! Variables are referenced by the offset of their declaration. Labels are
//! referenced by nesting depth (0 is the outermost labeled statement of the
//! enclosing function), switch cases by their index across all enclosing switches.

use crate::kernel::names::{CanonicalNameTable, NameIndex, StringIndex, StringTable};
use crate::util::span::TokenPosition;
use serde::{Deserialize, Serialize};

/// Offset of a node within the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeOffset(pub u32);

impl std::fmt::Display for NodeOffset {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A whole kernel program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub strings: StringTable,
    pub names: CanonicalNameTable,
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub constants: Vec<KernelConstant>,
    #[serde(default)]
    pub main_method: Option<NameIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub offset: NodeOffset,
    /// Child of the root; its string is the import URI.
    pub canonical_name: NameIndex,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub is_deferred: bool,
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub offset: NodeOffset,
    pub canonical_name: NameIndex,
    #[serde(default)]
    pub position: TokenPosition,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub type_parameters: Vec<TypeParameter>,
    #[serde(default)]
    pub super_class: Option<Supertype>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub constructors: Vec<Constructor>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supertype {
    pub class: NameIndex,
    #[serde(default)]
    pub type_arguments: Vec<KernelType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParameter {
    pub name: StringIndex,
    #[serde(default)]
    pub bound: KernelType,
}

/// Static types as written in the kernel program
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum KernelType {
    Invalid,
    #[default]
    Dynamic,
    Void,
    Bottom,
    Interface {
        class: NameIndex,
        #[serde(default)]
        type_arguments: Vec<KernelType>,
    },
    Function {
        #[serde(default)]
        positional: Vec<KernelType>,
        #[serde(default)]
        named: Vec<(StringIndex, KernelType)>,
        return_type: Box<KernelType>,
    },
    /// Reference to a type parameter visible at the use site
    TypeParameter { name: StringIndex },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub offset: NodeOffset,
    pub canonical_name: NameIndex,
    #[serde(default)]
    pub position: TokenPosition,
    #[serde(default)]
    pub ty: KernelType,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_covariant: bool,
    #[serde(default)]
    pub is_generic_covariant_impl: bool,
    #[serde(default)]
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedureKind {
    Method,
    Getter,
    Setter,
    Operator,
    Factory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub offset: NodeOffset,
    pub canonical_name: NameIndex,
    #[serde(default)]
    pub position: TokenPosition,
    pub kind: ProcedureKind,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub is_const: bool,
    /// Name of the native implementation for external procedures
    #[serde(default)]
    pub native_name: Option<String>,
    pub function: FunctionNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constructor {
    pub offset: NodeOffset,
    pub canonical_name: NameIndex,
    #[serde(default)]
    pub position: TokenPosition,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_external: bool,
    pub function: FunctionNode,
    #[serde(default)]
    pub initializers: Vec<Initializer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Initializer {
    Invalid,
    Field {
        field: NameIndex,
        value: Expression,
    },
    Super {
        position: TokenPosition,
        target: NameIndex,
        arguments: Arguments,
    },
    Redirecting {
        position: TokenPosition,
        target: NameIndex,
        arguments: Arguments,
    },
    Local {
        variable: VariableDeclaration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AsyncMarker {
    #[default]
    Sync,
    SyncStar,
    Async,
    AsyncStar,
    /// Desugared body of a generator or async function
    SyncYielding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionNode {
    pub offset: NodeOffset,
    #[serde(default)]
    pub position: TokenPosition,
    #[serde(default)]
    pub end_position: TokenPosition,
    #[serde(default)]
    pub async_marker: AsyncMarker,
    #[serde(default)]
    pub type_parameters: Vec<TypeParameter>,
    #[serde(default)]
    pub required_parameter_count: usize,
    #[serde(default)]
    pub positional_parameters: Vec<VariableDeclaration>,
    #[serde(default)]
    pub named_parameters: Vec<VariableDeclaration>,
    #[serde(default)]
    pub return_type: KernelType,
    #[serde(default)]
    pub body: Option<Box<Statement>>,
}

impl FunctionNode {
    pub fn parameters(&self) -> impl Iterator<Item = &VariableDeclaration> {
        self.positional_parameters
            .iter()
            .chain(self.named_parameters.iter())
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.positional_parameters.len() + self.named_parameters.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub offset: NodeOffset,
    #[serde(default)]
    pub position: TokenPosition,
    pub name: StringIndex,
    #[serde(default)]
    pub ty: KernelType,
    #[serde(default)]
    pub initializer: Option<Box<Expression>>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_covariant: bool,
    #[serde(default)]
    pub is_generic_covariant_impl: bool,
    /// Parameter must be checked for null on entry
    #[serde(default)]
    pub null_check: bool,
}

/// Member name used by dynamic dispatch; private names carry their library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub text: StringIndex,
    #[serde(default)]
    pub library: Option<NameIndex>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub type_arguments: Vec<KernelType>,
    #[serde(default)]
    pub positional: Vec<Expression>,
    #[serde(default)]
    pub named: Vec<NamedExpression>,
}

impl Arguments {
    #[inline]
    pub fn count(&self) -> usize {
        self.positional.len() + self.named.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedExpression {
    pub name: StringIndex,
    pub value: Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub offset: NodeOffset,
    #[serde(default)]
    pub position: TokenPosition,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    Expression(Expression),
    Block(Vec<Statement>),
    Empty,
    Assert {
        condition: Expression,
        #[serde(default)]
        message: Option<Expression>,
    },
    Labeled(Box<Statement>),
    Break {
        label: usize,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    Do {
        body: Box<Statement>,
        condition: Expression,
    },
    For {
        #[serde(default)]
        variables: Vec<VariableDeclaration>,
        #[serde(default)]
        condition: Option<Expression>,
        #[serde(default)]
        updates: Vec<Expression>,
        body: Box<Statement>,
    },
    ForIn {
        variable: VariableDeclaration,
        iterable: Expression,
        body: Box<Statement>,
        #[serde(default)]
        is_async: bool,
    },
    Switch {
        condition: Expression,
        cases: Vec<SwitchCase>,
    },
    ContinueSwitch {
        target: usize,
    },
    If {
        condition: Expression,
        then: Box<Statement>,
        #[serde(default)]
        otherwise: Option<Box<Statement>>,
    },
    Return(Option<Expression>),
    TryCatch {
        body: Box<Statement>,
        catches: Vec<Catch>,
    },
    TryFinally {
        body: Box<Statement>,
        finalizer: Box<Statement>,
    },
    Yield {
        expression: Expression,
        #[serde(default = "yes")]
        is_native: bool,
    },
    VariableDeclaration(VariableDeclaration),
    FunctionDeclaration {
        variable: VariableDeclaration,
        function: FunctionNode,
    },
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub expressions: Vec<Expression>,
    #[serde(default)]
    pub is_default: bool,
    pub body: Statement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catch {
    pub offset: NodeOffset,
    #[serde(default)]
    pub position: TokenPosition,
    #[serde(default)]
    pub guard: KernelType,
    #[serde(default)]
    pub exception: Option<VariableDeclaration>,
    #[serde(default)]
    pub stack_trace: Option<VariableDeclaration>,
    pub body: Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub offset: NodeOffset,
    #[serde(default)]
    pub position: TokenPosition,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpressionKind {
    Invalid,
    VariableGet {
        variable: NodeOffset,
    },
    VariableSet {
        variable: NodeOffset,
        value: Box<Expression>,
    },
    PropertyGet {
        receiver: Box<Expression>,
        name: Name,
        #[serde(default)]
        interface_target: Option<NameIndex>,
    },
    PropertySet {
        receiver: Box<Expression>,
        name: Name,
        value: Box<Expression>,
        #[serde(default)]
        interface_target: Option<NameIndex>,
    },
    DirectPropertyGet {
        receiver: Box<Expression>,
        target: NameIndex,
    },
    DirectPropertySet {
        receiver: Box<Expression>,
        target: NameIndex,
        value: Box<Expression>,
    },
    DirectMethodInvocation {
        receiver: Box<Expression>,
        target: NameIndex,
        arguments: Arguments,
    },
    SuperMethodInvocation {
        name: Name,
        arguments: Arguments,
        #[serde(default)]
        interface_target: Option<NameIndex>,
    },
    StaticGet {
        target: NameIndex,
    },
    StaticSet {
        target: NameIndex,
        value: Box<Expression>,
    },
    MethodInvocation {
        receiver: Box<Expression>,
        name: Name,
        arguments: Arguments,
        #[serde(default)]
        interface_target: Option<NameIndex>,
    },
    StaticInvocation {
        target: NameIndex,
        arguments: Arguments,
        #[serde(default)]
        is_const: bool,
    },
    ConstructorInvocation {
        target: NameIndex,
        arguments: Arguments,
        #[serde(default)]
        is_const: bool,
    },
    Not(Box<Expression>),
    Logical {
        left: Box<Expression>,
        operator: LogicalOperator,
        right: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    StringConcatenation(Vec<Expression>),
    Is {
        operand: Box<Expression>,
        ty: KernelType,
    },
    As {
        operand: Box<Expression>,
        ty: KernelType,
        #[serde(default)]
        is_type_error: bool,
    },
    StringLiteral(StringIndex),
    IntLiteral(i64),
    DoubleLiteral(f64),
    BoolLiteral(bool),
    NullLiteral,
    SymbolLiteral(StringIndex),
    TypeLiteral(KernelType),
    This,
    Rethrow,
    Throw(Box<Expression>),
    ListLiteral {
        #[serde(default)]
        element_type: KernelType,
        elements: Vec<Expression>,
        #[serde(default)]
        is_const: bool,
    },
    MapLiteral {
        #[serde(default)]
        key_type: KernelType,
        #[serde(default)]
        value_type: KernelType,
        entries: Vec<MapEntry>,
        #[serde(default)]
        is_const: bool,
    },
    FunctionExpression(FunctionNode),
    Let {
        variable: VariableDeclaration,
        body: Box<Expression>,
    },
    /// Reference into [`Program::constants`]
    Constant(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Expression,
    pub value: Expression,
}

/// Entries of the program's constant table. Compound constants refer to
/// other entries by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelConstant {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(StringIndex),
    Symbol(StringIndex),
    List {
        element_type: KernelType,
        elements: Vec<usize>,
    },
    Map {
        key_type: KernelType,
        value_type: KernelType,
        entries: Vec<(usize, usize)>,
    },
    Type(KernelType),
    TearOff(NameIndex),
}
