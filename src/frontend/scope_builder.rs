//! 作用域构建
//!
//! One forward pass over the outermost member enclosing the function being
//! compiled. It allocates a [`LocalVariable`] for every declaration, records
//! the scope opened by each node offset, finds the variables referenced from
//! nested closures (they live in contexts), and reserves the special
//! variables the graph builder needs.
//!
//! Walking the whole member, rather than just the compiled function, makes
//! the capture information of sibling and enclosing closures available no
//! matter which function is compiled first.

use crate::frontend::error::{BuildError, BuildResult};
use crate::frontend::scope::{LocalScope, LocalVariable, ScopeId, VarId, VariableKind};
use crate::frontend::translation_helper::TranslationHelper;
use crate::kernel::ast::{
    Arguments, AsyncMarker, Expression, ExpressionKind, FunctionNode, Initializer, KernelType, Statement,
    StatementKind, VariableDeclaration,
};
use crate::kernel::reader::FunctionOwner;
use crate::kernel::NodeOffset;
use crate::object::store::TypeScope;
use crate::object::{FunctionId, FunctionKind};
use crate::util::span::TokenPosition;
use indexmap::IndexMap;
use tracing::trace;

pub const CURRENT_CONTEXT_VAR: &str = ":current_context_var";
pub const SWITCH_VAR: &str = ":switch_expr";
pub const FINALLY_RETURN_VAR: &str = ":try_finally_return_value";
pub const EXPRESSION_TEMP_VAR: &str = ":expr_temp";
pub const AWAIT_JUMP_VAR: &str = ":await_jump_var";
pub const AWAIT_CONTEXT_VAR: &str = ":await_ctx_var";
pub const ARGUMENT_DESCRIPTOR_VAR: &str = ":arg_desc";
pub const FUNCTION_TYPE_ARGUMENTS_VAR: &str = ":function_type_arguments_var";
pub const TYPE_ARGUMENTS_PARAMETER: &str = ":type_arguments";
pub const CLOSURE_PARAMETER: &str = ":closure";
pub const THIS: &str = "this";

/// Variables of one function node (the member or a closure)
#[derive(Debug, Clone)]
pub struct FunctionScope {
    pub scope: ScopeId,
    pub function_depth: usize,
    /// Parameters in calling order, the implicit first parameter included
    pub parameters: Vec<VarId>,
    /// Captured parameters and the stack slot their value arrives in
    pub raw_parameters: Vec<(VarId, VarId)>,
    pub context_variable: VarId,
    pub function_type_arguments: Option<VarId>,
    pub argument_descriptor: Option<VarId>,
    pub switch_variable: Option<VarId>,
    pub finally_return_variable: Option<VarId>,
    pub setter_value: Option<VarId>,
    pub expression_temp: Option<VarId>,
    pub yield_jump_variable: Option<VarId>,
    pub yield_context_variable: Option<VarId>,
    /// Indexed by try depth
    pub catch_context_variables: Vec<VarId>,
    /// Indexed by catch depth
    pub exception_variables: Vec<VarId>,
    pub stack_trace_variables: Vec<VarId>,
    /// Indexed by for-in depth
    pub iterator_variables: Vec<VarId>,
}

impl FunctionScope {
    fn new(
        scope: ScopeId,
        function_depth: usize,
        context_variable: VarId,
    ) -> Self {
        Self {
            scope,
            function_depth,
            parameters: Vec::new(),
            raw_parameters: Vec::new(),
            context_variable,
            function_type_arguments: None,
            argument_descriptor: None,
            switch_variable: None,
            finally_return_variable: None,
            setter_value: None,
            expression_temp: None,
            yield_jump_variable: None,
            yield_context_variable: None,
            catch_context_variables: Vec::new(),
            exception_variables: Vec::new(),
            stack_trace_variables: Vec::new(),
            iterator_variables: Vec::new(),
        }
    }

    /// Raw incoming slot of a captured parameter
    pub fn raw_parameter(
        &self,
        parameter: VarId,
    ) -> Option<VarId> {
        self.raw_parameters
            .iter()
            .find(|(declared, _)| *declared == parameter)
            .map(|&(_, raw)| raw)
    }
}

/// Everything the graph builder needs to know about the locals of a member
#[derive(Debug, Clone, Default)]
pub struct ScopeBuildingResult {
    pub variables: Vec<LocalVariable>,
    pub scopes: Vec<LocalScope>,
    /// Variable declared by the node at an offset
    pub locals: IndexMap<NodeOffset, VarId>,
    /// Scope opened by the node at an offset
    pub scopes_by_offset: IndexMap<NodeOffset, ScopeId>,
    /// Per function node: the member's own node (or its field) and every closure
    pub functions: IndexMap<NodeOffset, FunctionScope>,
    /// `this` of an instance member
    pub this_variable: Option<VarId>,
    /// `:type_arguments` of a factory
    pub type_arguments_variable: Option<VarId>,
}

impl ScopeBuildingResult {
    pub fn variable(
        &self,
        id: VarId,
    ) -> &LocalVariable {
        &self.variables[id.index()]
    }

    pub fn scope(
        &self,
        id: ScopeId,
    ) -> &LocalScope {
        &self.scopes[id.index()]
    }

    /// Variable declared at `offset`; references to undeclared variables are
    /// an upstream bug
    pub fn local(
        &self,
        offset: NodeOffset,
    ) -> VarId {
        match self.locals.get(&offset) {
            Some(&id) => id,
            None => panic!("unscoped variable reference {}", offset),
        }
    }

    pub fn scope_at(
        &self,
        offset: NodeOffset,
    ) -> Option<&LocalScope> {
        self.scopes_by_offset.get(&offset).map(|&id| self.scope(id))
    }

    pub fn function(
        &self,
        offset: NodeOffset,
    ) -> Option<&FunctionScope> {
        self.functions.get(&offset)
    }

    /// Context level in force just outside the function node at `offset`
    pub fn outer_context_level(
        &self,
        offset: NodeOffset,
    ) -> usize {
        self.functions
            .get(&offset)
            .and_then(|f| self.scope(f.scope).parent)
            .map_or(0, |parent| self.scope(parent).context_level)
    }
}

/// Nesting depths tracked per function node
#[derive(Debug, Clone, Copy, Default)]
struct Depths {
    loop_: usize,
    try_: usize,
    catch_: usize,
    finally_: usize,
    for_in: usize,
}

/// Leading implicit parameter of a function node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImplicitParameter {
    None,
    This,
    Closure,
    TypeArguments,
}

pub struct ScopeBuilder<'a> {
    helper: TranslationHelper<'a>,
    result: ScopeBuildingResult,
    current_scope: Option<ScopeId>,
    /// Offset of the innermost function node being visited
    current_function: Option<NodeOffset>,
    function_depth: usize,
    depth: Depths,
    is_factory: bool,
    class_type_parameters: Vec<String>,
    function_type_parameters: Vec<String>,
}

impl<'a> ScopeBuilder<'a> {
    pub fn new(helper: TranslationHelper<'a>) -> Self {
        Self {
            helper,
            result: ScopeBuildingResult::default(),
            current_scope: None,
            current_function: None,
            function_depth: 0,
            depth: Depths::default(),
            is_factory: false,
            class_type_parameters: Vec::new(),
            function_type_parameters: Vec::new(),
        }
    }

    /// Build the scopes of the member that encloses `function`
    pub fn build(
        mut self,
        function: FunctionId,
    ) -> BuildResult<ScopeBuildingResult> {
        let store = self.helper.store();
        let member_id = store.outermost_function(function);
        let member = store.function(member_id);
        let class = store.class(member.owner);
        self.is_factory = member.kind == FunctionKind::Factory;
        if !member.is_static || self.is_factory {
            self.class_type_parameters = class.type_parameters.clone();
        }

        if member.kind == FunctionKind::FieldInitializer {
            // 静态字段初始化器没有函数节点，以字段偏移为键
            let field = member.field.map(|f| store.field(f));
            let kernel_field = field
                .and_then(|f| f.kernel_offset)
                .and_then(|offset| self.helper.reader().field_at(offset));
            let Some(kernel_field) = kernel_field else {
                return Err(BuildError::MissingBody {
                    function: store.qualified_name(member_id),
                });
            };
            self.enter_function(kernel_field.offset);
            if let Some(initializer) = &kernel_field.initializer {
                self.visit_expression(initializer);
            }
            self.exit_function(None);
            return Ok(self.finish());
        }

        let entry = member
            .kernel_offset
            .and_then(|offset| self.helper.reader().function_at(offset))
            .ok_or_else(|| BuildError::MissingBody {
                function: store.qualified_name(member_id),
            })?;
        let implicit = if self.is_factory {
            ImplicitParameter::TypeArguments
        } else if member.has_receiver() {
            ImplicitParameter::This
        } else {
            ImplicitParameter::None
        };
        let is_setter = member.kind == FunctionKind::Setter;
        let is_constructor = member.is_generative_constructor();
        let node = entry.node;

        self.visit_function_node(node, implicit, |builder| {
            if is_setter {
                let setter_value = builder.current().parameters.last().copied();
                builder.current_mut().setter_value = setter_value;
            }
            if is_constructor {
                // 实例字段初始化器在构造函数中求值
                if let Some(class) = entry.class {
                    for field in class.fields.iter().filter(|f| !f.is_static) {
                        if let Some(initializer) = &field.initializer {
                            builder.visit_expression(initializer);
                        }
                    }
                }
                if let FunctionOwner::Constructor(constructor) = entry.owner {
                    for initializer in &constructor.initializers {
                        builder.visit_initializer(initializer);
                    }
                }
            }
        });
        Ok(self.finish())
    }

    // ===== 作用域与变量 =====

    fn current(&self) -> &FunctionScope {
        match self.current_function.and_then(|f| self.result.functions.get(&f)) {
            Some(scope) => scope,
            None => panic!("no function scope"),
        }
    }

    fn current_mut(&mut self) -> &mut FunctionScope {
        match self.current_function.and_then(|f| self.result.functions.get_mut(&f)) {
            Some(scope) => scope,
            None => panic!("no function scope"),
        }
    }

    fn enter_scope(
        &mut self,
        offset: Option<NodeOffset>,
    ) -> ScopeId {
        let id = ScopeId(self.result.scopes.len() as u32);
        self.result
            .scopes
            .push(LocalScope::new(self.current_scope, offset, self.function_depth));
        if let Some(offset) = offset {
            self.result.scopes_by_offset.insert(offset, id);
        }
        self.current_scope = Some(id);
        id
    }

    fn exit_scope(&mut self) {
        let current = self.current_scope.map(|s| self.result.scope(s).parent);
        match current {
            Some(parent) => self.current_scope = parent,
            None => panic!("scope stack underflow"),
        }
    }

    /// Open the function scope of the node at `offset`
    fn enter_function(
        &mut self,
        offset: NodeOffset,
    ) -> (Option<NodeOffset>, Depths) {
        let scope = self.enter_scope(Some(offset));
        let mut context = LocalVariable::new(CURRENT_CONTEXT_VAR, VariableKind::Synthetic);
        context.function_depth = self.function_depth;
        let context_variable = self.push_variable(context, None);
        self.result
            .functions
            .insert(offset, FunctionScope::new(scope, self.function_depth, context_variable));
        trace!(function = %offset, depth = self.function_depth, "enter function scope");
        let saved = (self.current_function.replace(offset), self.depth);
        self.depth = Depths::default();
        saved
    }

    fn exit_function(
        &mut self,
        saved: Option<(Option<NodeOffset>, Depths)>,
    ) {
        self.exit_scope();
        if let Some((function, depth)) = saved {
            self.current_function = function;
            self.depth = depth;
        }
    }

    fn push_variable(
        &mut self,
        mut variable: LocalVariable,
        offset: Option<NodeOffset>,
    ) -> VarId {
        let id = VarId(self.result.variables.len() as u32);
        variable.owner = self.current_scope;
        if let Some(scope) = self.current_scope {
            self.result.scopes[scope.index()].variables.push(id);
        }
        self.result.variables.push(variable);
        if let Some(offset) = offset {
            self.result.locals.insert(offset, id);
        }
        id
    }

    fn type_scope(&self) -> TypeScope<'_> {
        TypeScope {
            class_parameters: &self.class_type_parameters,
            function_parameters: &self.function_type_parameters,
        }
    }

    fn declare(
        &mut self,
        declaration: &VariableDeclaration,
        kind: VariableKind,
    ) -> VarId {
        let ty = self.helper.translate_type(&declaration.ty, self.type_scope());
        let mut variable = LocalVariable::new(self.helper.string(declaration.name), kind);
        variable.position = declaration.position;
        variable.ty = ty;
        variable.is_final = declaration.is_final || declaration.is_const;
        variable.function_depth = self.function_depth;
        self.push_variable(variable, Some(declaration.offset))
    }

    fn synthetic(
        &mut self,
        name: &str,
    ) -> VarId {
        let mut variable = LocalVariable::new(name, VariableKind::Synthetic);
        variable.function_depth = self.function_depth;
        variable.position = TokenPosition::NO_SOURCE;
        self.push_variable(variable, None)
    }

    /// Synthetic variable in the outermost scope of the current function
    fn function_synthetic(
        &mut self,
        name: &str,
    ) -> VarId {
        let saved = self.current_scope;
        self.current_scope = Some(self.current().scope);
        let id = self.synthetic(name);
        self.current_scope = saved;
        id
    }

    fn lookup_variable(
        &mut self,
        offset: NodeOffset,
    ) {
        let id = self.result.local(offset);
        let variable = &mut self.result.variables[id.index()];
        if variable.function_depth < self.function_depth {
            variable.is_captured = true;
        }
    }

    fn capture(
        &mut self,
        id: Option<VarId>,
    ) {
        if let Some(id) = id {
            let variable = &mut self.result.variables[id.index()];
            if variable.function_depth < self.function_depth {
                variable.is_captured = true;
            }
        }
    }

    /// The closure needs the instantiator type arguments of the member
    fn capture_instantiator(&mut self) {
        if self.function_depth == 0 {
            return;
        }
        let variable = if self.is_factory {
            self.result.type_arguments_variable
        } else {
            self.result.this_variable
        };
        self.capture(variable);
    }

    fn add_switch_variable(&mut self) {
        if self.current().switch_variable.is_none() {
            let id = self.function_synthetic(SWITCH_VAR);
            self.current_mut().switch_variable = Some(id);
        }
    }

    fn add_expression_temp(&mut self) {
        if self.current().expression_temp.is_none() {
            let id = self.function_synthetic(EXPRESSION_TEMP_VAR);
            self.current_mut().expression_temp = Some(id);
        }
    }

    fn add_try_variables(&mut self) {
        let depth = self.depth.try_;
        if depth > self.current().catch_context_variables.len() {
            let id = self.function_synthetic(&format!(":saved_try_context_var{}", depth - 1));
            self.current_mut().catch_context_variables.push(id);
        }
    }

    fn add_catch_variables(&mut self) {
        while self.depth.catch_ > self.current().exception_variables.len() {
            let index = self.current().exception_variables.len();
            let exception = self.function_synthetic(&format!(":exception{}", index));
            let stack_trace = self.function_synthetic(&format!(":stack_trace{}", index));
            let current = self.current_mut();
            current.exception_variables.push(exception);
            current.stack_trace_variables.push(stack_trace);
        }
    }

    fn add_iterator_variable(&mut self) {
        if self.depth.for_in > self.current().iterator_variables.len() {
            let id = self.function_synthetic(&format!(":iterator{}", self.depth.for_in - 1));
            self.current_mut().iterator_variables.push(id);
        }
    }

    /// Jump and context variables of a yielding function live in the scope
    /// around it, so that they survive between invocations
    fn add_yield_variables(&mut self) {
        if self.current().yield_jump_variable.is_some() {
            return;
        }
        let function_scope = self.current().scope;
        let target = self.result.scope(function_scope).parent.unwrap_or(function_scope);
        let depth = self.result.scope(target).function_depth;
        let saved = self.current_scope;
        self.current_scope = Some(target);
        let mut jump = LocalVariable::new(AWAIT_JUMP_VAR, VariableKind::Synthetic);
        jump.function_depth = depth;
        let jump = self.push_variable(jump, None);
        let mut context = LocalVariable::new(AWAIT_CONTEXT_VAR, VariableKind::Synthetic);
        context.function_depth = depth;
        let context = self.push_variable(context, None);
        self.current_scope = saved;
        self.capture(Some(jump));
        self.capture(Some(context));
        let current = self.current_mut();
        current.yield_jump_variable = Some(jump);
        current.yield_context_variable = Some(context);
        self.add_switch_variable();
    }

    // ===== 函数节点 =====

    fn visit_function_node(
        &mut self,
        node: &FunctionNode,
        implicit: ImplicitParameter,
        members: impl FnOnce(&mut Self),
    ) {
        let saved = self.enter_function(node.offset);
        let saved_type_parameters = self.function_type_parameters.len();
        let helper = self.helper;
        self.function_type_parameters
            .extend(node.type_parameters.iter().map(|p| helper.string(p.name).to_string()));

        let mut index = 0;
        match implicit {
            ImplicitParameter::None => {}
            ImplicitParameter::This => {
                let id = self.implicit_parameter(THIS, index);
                self.result.this_variable = Some(id);
                index += 1;
            }
            ImplicitParameter::Closure => {
                self.implicit_parameter(CLOSURE_PARAMETER, index);
                index += 1;
            }
            ImplicitParameter::TypeArguments => {
                let id = self.implicit_parameter(TYPE_ARGUMENTS_PARAMETER, index);
                self.result.type_arguments_variable = Some(id);
                index += 1;
            }
        }
        for parameter in node.parameters() {
            let id = self.declare(parameter, VariableKind::Parameter(index));
            self.current_mut().parameters.push(id);
            self.visit_type(&parameter.ty);
            index += 1;
        }

        let has_generic_parent = saved_type_parameters > 0;
        if !node.type_parameters.is_empty() || (implicit == ImplicitParameter::Closure && has_generic_parent) {
            let id = self.function_synthetic(FUNCTION_TYPE_ARGUMENTS_VAR);
            self.current_mut().function_type_arguments = Some(id);
        }
        if implicit == ImplicitParameter::Closure {
            let id = self.function_synthetic(ARGUMENT_DESCRIPTOR_VAR);
            self.current_mut().argument_descriptor = Some(id);
        }

        members(self);

        if let Some(body) = &node.body {
            self.visit_statement(body);
        }

        self.function_type_parameters.truncate(saved_type_parameters);
        self.exit_function(Some(saved));
    }

    fn implicit_parameter(
        &mut self,
        name: &str,
        index: usize,
    ) -> VarId {
        let mut variable = LocalVariable::new(name, VariableKind::Parameter(index));
        variable.function_depth = self.function_depth;
        variable.is_final = true;
        let id = self.push_variable(variable, None);
        self.current_mut().parameters.push(id);
        id
    }

    fn visit_nested_function(
        &mut self,
        node: &FunctionNode,
    ) {
        self.function_depth += 1;
        self.visit_function_node(node, ImplicitParameter::Closure, |_| {});
        self.function_depth -= 1;
    }

    fn visit_initializer(
        &mut self,
        initializer: &Initializer,
    ) {
        match initializer {
            Initializer::Invalid => {}
            Initializer::Field { value, .. } => self.visit_expression(value),
            Initializer::Super { arguments, .. } | Initializer::Redirecting { arguments, .. } => {
                self.visit_arguments(arguments)
            }
            Initializer::Local { variable } => self.visit_variable_declaration(variable),
        }
    }

    // ===== 语句 =====

    fn visit_statement(
        &mut self,
        statement: &Statement,
    ) {
        match &statement.kind {
            StatementKind::Expression(expression) => self.visit_expression(expression),
            StatementKind::Block(statements) => {
                self.enter_scope(Some(statement.offset));
                for s in statements {
                    self.visit_statement(s);
                }
                self.exit_scope();
            }
            StatementKind::Empty | StatementKind::Break { .. } | StatementKind::ContinueSwitch { .. } => {}
            StatementKind::Assert { condition, message } => {
                self.visit_expression(condition);
                if let Some(message) = message {
                    self.visit_expression(message);
                }
            }
            StatementKind::Labeled(body) => self.visit_statement(body),
            StatementKind::While { condition, body } | StatementKind::Do { body, condition } => {
                self.depth.loop_ += 1;
                self.visit_expression(condition);
                self.visit_statement(body);
                self.depth.loop_ -= 1;
            }
            StatementKind::For {
                variables,
                condition,
                updates,
                body,
            } => {
                self.enter_scope(Some(statement.offset));
                for variable in variables {
                    self.visit_variable_declaration(variable);
                }
                self.depth.loop_ += 1;
                if let Some(condition) = condition {
                    self.visit_expression(condition);
                }
                for update in updates {
                    self.visit_expression(update);
                }
                self.visit_statement(body);
                self.depth.loop_ -= 1;
                self.exit_scope();
            }
            StatementKind::ForIn {
                variable,
                iterable,
                body,
                ..
            } => {
                self.visit_expression(iterable);
                self.depth.for_in += 1;
                self.add_iterator_variable();
                self.depth.loop_ += 1;
                self.enter_scope(Some(statement.offset));
                self.visit_variable_declaration(variable);
                self.visit_statement(body);
                self.exit_scope();
                self.depth.loop_ -= 1;
                self.depth.for_in -= 1;
            }
            StatementKind::Switch { condition, cases } => {
                self.add_switch_variable();
                self.visit_expression(condition);
                for case in cases {
                    for expression in &case.expressions {
                        self.visit_expression(expression);
                    }
                    self.visit_statement(&case.body);
                }
            }
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.visit_expression(condition);
                self.visit_statement(then);
                if let Some(otherwise) = otherwise {
                    self.visit_statement(otherwise);
                }
            }
            StatementKind::Return(value) => {
                if self.depth.finally_ > 0 && self.current().finally_return_variable.is_none() {
                    let id = self.function_synthetic(FINALLY_RETURN_VAR);
                    self.current_mut().finally_return_variable = Some(id);
                }
                if let Some(value) = value {
                    self.visit_expression(value);
                }
            }
            StatementKind::TryCatch { body, catches } => {
                self.depth.try_ += 1;
                self.add_try_variables();
                self.visit_statement(body);
                self.depth.try_ -= 1;

                self.depth.catch_ += 1;
                self.add_catch_variables();
                for catch in catches {
                    self.enter_scope(Some(catch.offset));
                    self.visit_type(&catch.guard);
                    if let Some(exception) = &catch.exception {
                        self.visit_variable_declaration(exception);
                    }
                    if let Some(stack_trace) = &catch.stack_trace {
                        self.visit_variable_declaration(stack_trace);
                    }
                    self.visit_statement(&catch.body);
                    self.exit_scope();
                }
                self.depth.catch_ -= 1;
            }
            StatementKind::TryFinally { body, finalizer } => {
                self.depth.try_ += 1;
                self.depth.finally_ += 1;
                self.add_try_variables();
                self.visit_statement(body);
                self.depth.finally_ -= 1;
                self.depth.try_ -= 1;

                self.depth.catch_ += 1;
                self.add_catch_variables();
                self.visit_statement(finalizer);
                self.depth.catch_ -= 1;
            }
            StatementKind::Yield { expression, is_native } => {
                self.visit_expression(expression);
                if *is_native {
                    self.add_yield_variables();
                }
            }
            StatementKind::VariableDeclaration(declaration) => self.visit_variable_declaration(declaration),
            StatementKind::FunctionDeclaration { variable, function } => {
                self.visit_variable_declaration(variable);
                self.visit_nested_function(function);
            }
        }
    }

    fn visit_variable_declaration(
        &mut self,
        declaration: &VariableDeclaration,
    ) {
        self.declare(declaration, VariableKind::Declared);
        self.visit_type(&declaration.ty);
        if let Some(initializer) = &declaration.initializer {
            self.visit_expression(initializer);
        }
    }

    // ===== 表达式 =====

    fn visit_expression(
        &mut self,
        expression: &Expression,
    ) {
        match &expression.kind {
            ExpressionKind::Invalid
            | ExpressionKind::StringLiteral(_)
            | ExpressionKind::IntLiteral(_)
            | ExpressionKind::DoubleLiteral(_)
            | ExpressionKind::BoolLiteral(_)
            | ExpressionKind::NullLiteral
            | ExpressionKind::SymbolLiteral(_)
            | ExpressionKind::Constant(_)
            | ExpressionKind::StaticGet { .. }
            | ExpressionKind::Rethrow => {}
            ExpressionKind::VariableGet { variable } => self.lookup_variable(*variable),
            ExpressionKind::VariableSet { variable, value } => {
                self.lookup_variable(*variable);
                self.visit_expression(value);
            }
            ExpressionKind::PropertyGet { receiver, .. } | ExpressionKind::DirectPropertyGet { receiver, .. } => {
                self.visit_expression(receiver)
            }
            ExpressionKind::PropertySet { receiver, value, .. }
            | ExpressionKind::DirectPropertySet { receiver, value, .. } => {
                self.visit_expression(receiver);
                self.visit_expression(value);
            }
            ExpressionKind::DirectMethodInvocation { receiver, arguments, .. }
            | ExpressionKind::MethodInvocation { receiver, arguments, .. } => {
                self.visit_expression(receiver);
                self.visit_arguments(arguments);
            }
            ExpressionKind::SuperMethodInvocation { arguments, .. } => {
                let this = self.result.this_variable;
                self.capture(this);
                self.visit_arguments(arguments);
            }
            ExpressionKind::StaticSet { value, .. } => self.visit_expression(value),
            ExpressionKind::StaticInvocation { arguments, .. }
            | ExpressionKind::ConstructorInvocation { arguments, .. } => self.visit_arguments(arguments),
            ExpressionKind::Not(operand) => self.visit_expression(operand),
            ExpressionKind::Logical { left, right, .. } => {
                self.add_expression_temp();
                self.visit_expression(left);
                self.visit_expression(right);
            }
            ExpressionKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.add_expression_temp();
                self.visit_expression(condition);
                self.visit_expression(then);
                self.visit_expression(otherwise);
            }
            ExpressionKind::StringConcatenation(parts) => {
                for part in parts {
                    self.visit_expression(part);
                }
            }
            ExpressionKind::Is { operand, ty } | ExpressionKind::As { operand, ty, .. } => {
                self.visit_expression(operand);
                self.visit_type(ty);
            }
            ExpressionKind::TypeLiteral(ty) => self.visit_type(ty),
            ExpressionKind::This => {
                let this = self.result.this_variable;
                self.capture(this);
            }
            ExpressionKind::Throw(value) => self.visit_expression(value),
            ExpressionKind::ListLiteral {
                element_type, elements, ..
            } => {
                self.visit_type(element_type);
                for element in elements {
                    self.visit_expression(element);
                }
            }
            ExpressionKind::MapLiteral {
                key_type,
                value_type,
                entries,
                ..
            } => {
                self.visit_type(key_type);
                self.visit_type(value_type);
                for entry in entries {
                    self.visit_expression(&entry.key);
                    self.visit_expression(&entry.value);
                }
            }
            ExpressionKind::FunctionExpression(function) => self.visit_nested_function(function),
            ExpressionKind::Let { variable, body } => {
                self.visit_variable_declaration(variable);
                self.visit_expression(body);
            }
        }
    }

    fn visit_arguments(
        &mut self,
        arguments: &Arguments,
    ) {
        for ty in &arguments.type_arguments {
            self.visit_type(ty);
        }
        for expression in &arguments.positional {
            self.visit_expression(expression);
        }
        for named in &arguments.named {
            self.visit_expression(&named.value);
        }
    }

    /// Class type parameters used inside a closure are read through `this`
    /// (or the factory's type arguments), which must then be captured
    fn visit_type(
        &mut self,
        ty: &KernelType,
    ) {
        match ty {
            KernelType::Interface { type_arguments, .. } => {
                for argument in type_arguments {
                    self.visit_type(argument);
                }
            }
            KernelType::Function {
                positional,
                named,
                return_type,
            } => {
                for p in positional {
                    self.visit_type(p);
                }
                for (_, n) in named {
                    self.visit_type(n);
                }
                self.visit_type(return_type);
            }
            KernelType::TypeParameter { name } => {
                let name = self.helper.string(*name);
                let is_function_parameter = self.function_type_parameters.iter().any(|p| p == name);
                if !is_function_parameter && self.class_type_parameters.iter().any(|p| p == name) {
                    self.capture_instantiator();
                }
            }
            KernelType::Invalid | KernelType::Dynamic | KernelType::Void | KernelType::Bottom => {}
        }
    }

    // ===== 上下文分配 =====

    fn finish(mut self) -> ScopeBuildingResult {
        let result = &mut self.result;
        for index in 0..result.scopes.len() {
            let parent_level = result.scopes[index]
                .parent
                .map_or(0, |parent| result.scopes[parent.index()].context_level);
            let mut slot = 0;
            for &id in &result.scopes[index].variables {
                let variable = &mut result.variables[id.index()];
                if variable.is_captured {
                    variable.context_index = Some(slot);
                    slot += 1;
                }
            }
            let scope = &mut result.scopes[index];
            scope.num_context_variables = slot;
            scope.context_level = parent_level + usize::from(slot > 0);
            let level = scope.context_level;
            for &id in &result.scopes[index].variables {
                result.variables[id.index()].context_level = level;
            }
        }

        // 被捕获的参数经由原始参数槽传入
        let offsets: Vec<NodeOffset> = result.functions.keys().copied().collect();
        for offset in offsets {
            let parameters = result.functions[&offset].parameters.clone();
            for parameter in parameters {
                let declared = &result.variables[parameter.index()];
                if !declared.is_captured {
                    continue;
                }
                let mut raw = LocalVariable::new(declared.name.clone(), declared.kind);
                raw.position = declared.position;
                raw.ty = declared.ty.clone();
                raw.function_depth = declared.function_depth;
                result.variables.push(raw);
                let raw = VarId(result.variables.len() as u32 - 1);
                if let Some(function) = result.functions.get_mut(&offset) {
                    function.raw_parameters.push((parameter, raw));
                }
            }
        }
        self.result
    }
}

/// Whether the function node's body was produced by the async transformation
pub fn is_yielding(node: &FunctionNode) -> bool {
    node.async_marker == AsyncMarker::SyncYielding
}
