//! Programmatic construction of kernel programs
//!
//! Hands out fresh node offsets and interns strings, so that callers can
//! write nested node constructors directly:
//!
//! ```rust
//! use kernel_il::kernel::builder::ProgramBuilder;
//!
//! let b = ProgramBuilder::new();
//! let x = b.variable("x", Some(b.int(1)));
//! let body = b.block(vec![b.var_decl(x.clone()), b.ret(Some(b.var_get(&x)))]);
//! let function = b.function(vec![], Some(body));
//! assert!(function.body.is_some());
//! ```

use crate::kernel::ast::*;
use crate::kernel::names::{tags, CanonicalNameTable, NameBuilder, NameIndex, StringIndex, StringTable};
use crate::object::CORE_LIBRARY_URI;
use crate::util::span::TokenPosition;
use std::cell::{Cell, RefCell};

#[derive(Debug)]
pub struct ProgramBuilder {
    strings: RefCell<StringTable>,
    names: RefCell<CanonicalNameTable>,
    constants: RefCell<Vec<KernelConstant>>,
    libraries: RefCell<Vec<Library>>,
    next_offset: Cell<u32>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut strings = StringTable::new();
        let root = strings.intern("");
        Self {
            strings: RefCell::new(strings),
            names: RefCell::new(CanonicalNameTable::new(root)),
            constants: RefCell::new(Vec::new()),
            libraries: RefCell::new(Vec::new()),
            next_offset: Cell::new(1),
        }
    }

    pub fn finish(self) -> Program {
        Program {
            strings: self.strings.into_inner(),
            names: self.names.into_inner(),
            libraries: self.libraries.into_inner(),
            constants: self.constants.into_inner(),
            main_method: None,
        }
    }

    /// Fresh node offset
    pub fn offset(&self) -> NodeOffset {
        let offset = self.next_offset.get();
        self.next_offset.set(offset + 1);
        NodeOffset(offset)
    }

    /// Position derived from the node offset, so every node has a real one
    fn position(
        &self,
        offset: NodeOffset,
    ) -> TokenPosition {
        TokenPosition::new(offset.0 as i32 * 10)
    }

    pub fn string(
        &self,
        s: &str,
    ) -> StringIndex {
        self.strings.borrow_mut().intern(s)
    }

    pub fn constant(
        &self,
        constant: KernelConstant,
    ) -> usize {
        let mut constants = self.constants.borrow_mut();
        constants.push(constant);
        constants.len() - 1
    }

    // ===== Canonical names =====

    pub fn library_name(
        &self,
        uri: &str,
    ) -> NameIndex {
        let mut strings = self.strings.borrow_mut();
        let mut names = self.names.borrow_mut();
        NameBuilder::new(&mut strings, &mut names).library(uri)
    }

    pub fn class_name(
        &self,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        let mut strings = self.strings.borrow_mut();
        let mut names = self.names.borrow_mut();
        NameBuilder::new(&mut strings, &mut names).class(library, name)
    }

    /// Canonical name of a class in the core library
    pub fn core_class(
        &self,
        name: &str,
    ) -> NameIndex {
        let core = self.library_name(CORE_LIBRARY_URI);
        self.class_name(core, name)
    }

    fn member_name(
        &self,
        owner: NameIndex,
        library: NameIndex,
        tag: &str,
        name: &str,
    ) -> NameIndex {
        let mut strings = self.strings.borrow_mut();
        let mut names = self.names.borrow_mut();
        NameBuilder::new(&mut strings, &mut names).member(owner, tag, library, name)
    }

    pub fn method_name(
        &self,
        owner: NameIndex,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        self.member_name(owner, library, tags::METHODS, name)
    }

    pub fn getter_name(
        &self,
        owner: NameIndex,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        self.member_name(owner, library, tags::GETTERS, name)
    }

    pub fn setter_name(
        &self,
        owner: NameIndex,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        self.member_name(owner, library, tags::SETTERS, name)
    }

    pub fn field_name(
        &self,
        owner: NameIndex,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        self.member_name(owner, library, tags::FIELDS, name)
    }

    pub fn constructor_name(
        &self,
        class: NameIndex,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        self.member_name(class, library, tags::CONSTRUCTORS, name)
    }

    pub fn factory_name(
        &self,
        class: NameIndex,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        self.member_name(class, library, tags::FACTORIES, name)
    }

    /// Dynamic dispatch name; private names are bound to `library`.
    pub fn name(
        &self,
        text: &str,
        library: NameIndex,
    ) -> Name {
        Name {
            text: self.string(text),
            library: text.starts_with('_').then_some(library),
        }
    }

    // ===== Declarations =====

    pub fn add_library(
        &self,
        library: Library,
    ) {
        self.libraries.borrow_mut().push(library);
    }

    pub fn library(
        &self,
        name: NameIndex,
    ) -> Library {
        Library {
            offset: self.offset(),
            canonical_name: name,
            is_external: false,
            is_deferred: false,
            classes: Vec::new(),
            procedures: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn class(
        &self,
        name: NameIndex,
    ) -> Class {
        let offset = self.offset();
        Class {
            offset,
            canonical_name: name,
            position: self.position(offset),
            is_abstract: false,
            type_parameters: Vec::new(),
            super_class: None,
            fields: Vec::new(),
            constructors: Vec::new(),
            procedures: Vec::new(),
        }
    }

    pub fn type_parameter(
        &self,
        name: &str,
    ) -> TypeParameter {
        TypeParameter {
            name: self.string(name),
            bound: KernelType::Dynamic,
        }
    }

    pub fn type_parameter_type(
        &self,
        name: &str,
    ) -> KernelType {
        KernelType::TypeParameter {
            name: self.string(name),
        }
    }

    pub fn interface_type(
        &self,
        class: NameIndex,
    ) -> KernelType {
        KernelType::Interface {
            class,
            type_arguments: Vec::new(),
        }
    }

    pub fn field(
        &self,
        name: NameIndex,
        initializer: Option<Expression>,
    ) -> Field {
        let offset = self.offset();
        Field {
            offset,
            canonical_name: name,
            position: self.position(offset),
            ty: KernelType::Dynamic,
            is_static: false,
            is_final: false,
            is_const: false,
            is_covariant: false,
            is_generic_covariant_impl: false,
            initializer,
        }
    }

    pub fn static_field(
        &self,
        name: NameIndex,
        initializer: Option<Expression>,
    ) -> Field {
        Field {
            is_static: true,
            ..self.field(name, initializer)
        }
    }

    pub fn procedure(
        &self,
        name: NameIndex,
        kind: ProcedureKind,
        function: FunctionNode,
    ) -> Procedure {
        let offset = self.offset();
        Procedure {
            offset,
            canonical_name: name,
            position: self.position(offset),
            kind,
            is_static: false,
            is_abstract: false,
            is_external: false,
            is_const: false,
            native_name: None,
            function,
        }
    }

    pub fn static_method(
        &self,
        name: NameIndex,
        function: FunctionNode,
    ) -> Procedure {
        Procedure {
            is_static: true,
            ..self.procedure(name, ProcedureKind::Method, function)
        }
    }

    pub fn constructor(
        &self,
        name: NameIndex,
        function: FunctionNode,
        initializers: Vec<Initializer>,
    ) -> Constructor {
        let offset = self.offset();
        Constructor {
            offset,
            canonical_name: name,
            position: self.position(offset),
            is_const: false,
            is_external: false,
            function,
            initializers,
        }
    }

    pub fn function(
        &self,
        positional: Vec<VariableDeclaration>,
        body: Option<Statement>,
    ) -> FunctionNode {
        let offset = self.offset();
        let position = self.position(offset);
        let end_position = TokenPosition::new(position.value() + 100_000);
        FunctionNode {
            offset,
            position,
            end_position,
            async_marker: AsyncMarker::Sync,
            type_parameters: Vec::new(),
            required_parameter_count: positional.len(),
            positional_parameters: positional,
            named_parameters: Vec::new(),
            return_type: KernelType::Dynamic,
            body: body.map(Box::new),
        }
    }

    pub fn variable(
        &self,
        name: &str,
        initializer: Option<Expression>,
    ) -> VariableDeclaration {
        let offset = self.offset();
        VariableDeclaration {
            offset,
            position: self.position(offset),
            name: self.string(name),
            ty: KernelType::Dynamic,
            initializer: initializer.map(Box::new),
            is_final: false,
            is_const: false,
            is_covariant: false,
            is_generic_covariant_impl: false,
            null_check: false,
        }
    }

    pub fn parameter(
        &self,
        name: &str,
    ) -> VariableDeclaration {
        self.variable(name, None)
    }

    // ===== Statements =====

    pub fn statement(
        &self,
        kind: StatementKind,
    ) -> Statement {
        let offset = self.offset();
        Statement {
            offset,
            position: self.position(offset),
            kind,
        }
    }

    pub fn expr_stmt(
        &self,
        expression: Expression,
    ) -> Statement {
        self.statement(StatementKind::Expression(expression))
    }

    pub fn block(
        &self,
        statements: Vec<Statement>,
    ) -> Statement {
        self.statement(StatementKind::Block(statements))
    }

    pub fn empty(&self) -> Statement {
        self.statement(StatementKind::Empty)
    }

    pub fn ret(
        &self,
        value: Option<Expression>,
    ) -> Statement {
        self.statement(StatementKind::Return(value))
    }

    pub fn if_(
        &self,
        condition: Expression,
        then: Statement,
        otherwise: Option<Statement>,
    ) -> Statement {
        self.statement(StatementKind::If {
            condition,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        })
    }

    pub fn while_(
        &self,
        condition: Expression,
        body: Statement,
    ) -> Statement {
        self.statement(StatementKind::While {
            condition,
            body: Box::new(body),
        })
    }

    pub fn do_(
        &self,
        body: Statement,
        condition: Expression,
    ) -> Statement {
        self.statement(StatementKind::Do {
            body: Box::new(body),
            condition,
        })
    }

    pub fn for_(
        &self,
        variables: Vec<VariableDeclaration>,
        condition: Option<Expression>,
        updates: Vec<Expression>,
        body: Statement,
    ) -> Statement {
        self.statement(StatementKind::For {
            variables,
            condition,
            updates,
            body: Box::new(body),
        })
    }

    pub fn for_in(
        &self,
        variable: VariableDeclaration,
        iterable: Expression,
        body: Statement,
    ) -> Statement {
        self.statement(StatementKind::ForIn {
            variable,
            iterable,
            body: Box::new(body),
            is_async: false,
        })
    }

    pub fn labeled(
        &self,
        body: Statement,
    ) -> Statement {
        self.statement(StatementKind::Labeled(Box::new(body)))
    }

    pub fn break_(
        &self,
        label: usize,
    ) -> Statement {
        self.statement(StatementKind::Break { label })
    }

    pub fn switch(
        &self,
        condition: Expression,
        cases: Vec<SwitchCase>,
    ) -> Statement {
        self.statement(StatementKind::Switch { condition, cases })
    }

    pub fn case(
        &self,
        expressions: Vec<Expression>,
        body: Statement,
    ) -> SwitchCase {
        SwitchCase {
            expressions,
            is_default: false,
            body,
        }
    }

    pub fn default_case(
        &self,
        body: Statement,
    ) -> SwitchCase {
        SwitchCase {
            expressions: Vec::new(),
            is_default: true,
            body,
        }
    }

    pub fn continue_switch(
        &self,
        target: usize,
    ) -> Statement {
        self.statement(StatementKind::ContinueSwitch { target })
    }

    pub fn try_catch(
        &self,
        body: Statement,
        catches: Vec<Catch>,
    ) -> Statement {
        self.statement(StatementKind::TryCatch {
            body: Box::new(body),
            catches,
        })
    }

    pub fn catch(
        &self,
        guard: KernelType,
        exception: Option<VariableDeclaration>,
        stack_trace: Option<VariableDeclaration>,
        body: Statement,
    ) -> Catch {
        let offset = self.offset();
        Catch {
            offset,
            position: self.position(offset),
            guard,
            exception,
            stack_trace,
            body,
        }
    }

    pub fn try_finally(
        &self,
        body: Statement,
        finalizer: Statement,
    ) -> Statement {
        self.statement(StatementKind::TryFinally {
            body: Box::new(body),
            finalizer: Box::new(finalizer),
        })
    }

    pub fn yield_(
        &self,
        expression: Expression,
    ) -> Statement {
        self.statement(StatementKind::Yield {
            expression,
            is_native: true,
        })
    }

    pub fn var_decl(
        &self,
        variable: VariableDeclaration,
    ) -> Statement {
        self.statement(StatementKind::VariableDeclaration(variable))
    }

    pub fn fun_decl(
        &self,
        variable: VariableDeclaration,
        function: FunctionNode,
    ) -> Statement {
        self.statement(StatementKind::FunctionDeclaration { variable, function })
    }

    pub fn assert_(
        &self,
        condition: Expression,
        message: Option<Expression>,
    ) -> Statement {
        self.statement(StatementKind::Assert { condition, message })
    }

    // ===== Expressions =====

    pub fn expression(
        &self,
        kind: ExpressionKind,
    ) -> Expression {
        let offset = self.offset();
        Expression {
            offset,
            position: self.position(offset),
            kind,
        }
    }

    pub fn int(
        &self,
        value: i64,
    ) -> Expression {
        self.expression(ExpressionKind::IntLiteral(value))
    }

    pub fn double(
        &self,
        value: f64,
    ) -> Expression {
        self.expression(ExpressionKind::DoubleLiteral(value))
    }

    pub fn bool(
        &self,
        value: bool,
    ) -> Expression {
        self.expression(ExpressionKind::BoolLiteral(value))
    }

    pub fn null(&self) -> Expression {
        self.expression(ExpressionKind::NullLiteral)
    }

    pub fn str(
        &self,
        value: &str,
    ) -> Expression {
        let s = self.string(value);
        self.expression(ExpressionKind::StringLiteral(s))
    }

    pub fn this(&self) -> Expression {
        self.expression(ExpressionKind::This)
    }

    pub fn var_get(
        &self,
        variable: &VariableDeclaration,
    ) -> Expression {
        self.expression(ExpressionKind::VariableGet {
            variable: variable.offset,
        })
    }

    pub fn var_set(
        &self,
        variable: &VariableDeclaration,
        value: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::VariableSet {
            variable: variable.offset,
            value: Box::new(value),
        })
    }

    pub fn args(
        &self,
        positional: Vec<Expression>,
    ) -> Arguments {
        Arguments {
            type_arguments: Vec::new(),
            positional,
            named: Vec::new(),
        }
    }

    pub fn static_call(
        &self,
        target: NameIndex,
        positional: Vec<Expression>,
    ) -> Expression {
        let arguments = self.args(positional);
        self.expression(ExpressionKind::StaticInvocation {
            target,
            arguments,
            is_const: false,
        })
    }

    pub fn method_call(
        &self,
        receiver: Expression,
        name: Name,
        positional: Vec<Expression>,
    ) -> Expression {
        let arguments = self.args(positional);
        self.expression(ExpressionKind::MethodInvocation {
            receiver: Box::new(receiver),
            name,
            arguments,
            interface_target: None,
        })
    }

    pub fn property_get(
        &self,
        receiver: Expression,
        name: Name,
    ) -> Expression {
        self.expression(ExpressionKind::PropertyGet {
            receiver: Box::new(receiver),
            name,
            interface_target: None,
        })
    }

    pub fn property_set(
        &self,
        receiver: Expression,
        name: Name,
        value: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::PropertySet {
            receiver: Box::new(receiver),
            name,
            value: Box::new(value),
            interface_target: None,
        })
    }

    pub fn static_get(
        &self,
        target: NameIndex,
    ) -> Expression {
        self.expression(ExpressionKind::StaticGet { target })
    }

    pub fn static_set(
        &self,
        target: NameIndex,
        value: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::StaticSet {
            target,
            value: Box::new(value),
        })
    }

    pub fn new_object(
        &self,
        target: NameIndex,
        positional: Vec<Expression>,
    ) -> Expression {
        let arguments = self.args(positional);
        self.expression(ExpressionKind::ConstructorInvocation {
            target,
            arguments,
            is_const: false,
        })
    }

    pub fn not(
        &self,
        operand: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Not(Box::new(operand)))
    }

    pub fn logical(
        &self,
        left: Expression,
        operator: LogicalOperator,
        right: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Logical {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    pub fn conditional(
        &self,
        condition: Expression,
        then: Expression,
        otherwise: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn concat(
        &self,
        parts: Vec<Expression>,
    ) -> Expression {
        self.expression(ExpressionKind::StringConcatenation(parts))
    }

    pub fn is_(
        &self,
        operand: Expression,
        ty: KernelType,
    ) -> Expression {
        self.expression(ExpressionKind::Is {
            operand: Box::new(operand),
            ty,
        })
    }

    pub fn as_(
        &self,
        operand: Expression,
        ty: KernelType,
    ) -> Expression {
        self.expression(ExpressionKind::As {
            operand: Box::new(operand),
            ty,
            is_type_error: false,
        })
    }

    pub fn throw(
        &self,
        value: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Throw(Box::new(value)))
    }

    pub fn rethrow(&self) -> Expression {
        self.expression(ExpressionKind::Rethrow)
    }

    pub fn list(
        &self,
        elements: Vec<Expression>,
    ) -> Expression {
        self.expression(ExpressionKind::ListLiteral {
            element_type: KernelType::Dynamic,
            elements,
            is_const: false,
        })
    }

    pub fn map(
        &self,
        entries: Vec<(Expression, Expression)>,
    ) -> Expression {
        self.expression(ExpressionKind::MapLiteral {
            key_type: KernelType::Dynamic,
            value_type: KernelType::Dynamic,
            entries: entries
                .into_iter()
                .map(|(key, value)| MapEntry { key, value })
                .collect(),
            is_const: false,
        })
    }

    pub fn closure(
        &self,
        function: FunctionNode,
    ) -> Expression {
        self.expression(ExpressionKind::FunctionExpression(function))
    }

    pub fn let_(
        &self,
        variable: VariableDeclaration,
        body: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Let {
            variable,
            body: Box::new(body),
        })
    }

    pub fn const_ref(
        &self,
        index: usize,
    ) -> Expression {
        self.expression(ExpressionKind::Constant(index))
    }
}
