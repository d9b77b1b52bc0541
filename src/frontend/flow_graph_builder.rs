//! 流图构建器
//!
//! [`FlowGraphBuilder`] turns the body of one function into a [`FlowGraph`].
//! It runs the scope pre-pass over the enclosing member, emits the function
//! prologue (context restore, parameter copies, argument and type checks),
//! translates the body statement by statement, prepends the resumption
//! dispatch of yielding functions, and finally seals the graph entry.
//!
//! Statement, expression and dispatcher translation live in sibling modules
//! as further `impl FlowGraphBuilder` blocks.
//!
//! ```text
//! GraphEntry
//!   └─ normal entry: CheckStackOverflow, prologue, [yield dispatch], body
//!   └─ catch entries: one per try/catch handler
//! ```

use crate::frontend::active_class::ActiveClass;
use crate::frontend::base_builder::BaseFlowGraphBuilder;
use crate::frontend::constant_evaluator::ConstantEvaluator;
use crate::frontend::control_stack::FrameId;
use crate::frontend::error::{BuildError, BuildResult};
use crate::frontend::fragment::Fragment;
use crate::frontend::scope::{LocalVariable, VarId, VariableKind};
use crate::frontend::scope_builder::{FunctionScope, ScopeBuilder, ScopeBuildingResult, CURRENT_CONTEXT_VAR};
use crate::frontend::translation_helper::TranslationHelper;
use crate::il::graph::FlowGraph;
use crate::il::instruction::{CallShape, ConstantValue, InstrId, InstrKind, Instruction, Slot, Token};
use crate::kernel::ast::{Expression, FunctionNode, Initializer, KernelType};
use crate::kernel::reader::{FunctionEntry, FunctionOwner};
use crate::kernel::NodeOffset;
use crate::object::{AbstractType, FieldId, Function, FunctionId, FunctionKind, TypeParameterOwner};
use crate::util::config::BuilderConfig;
use crate::util::span::TokenPosition;
use tracing::{debug, trace, warn};

/// Resumption point of a yielding function
#[derive(Debug, Clone, Copy)]
pub(crate) struct YieldContinuation {
    /// Anchor the resumed code hangs off; not part of the graph itself
    pub entry: InstrId,
    pub try_index: Option<usize>,
}

/// Builds the flow graph of one function
#[derive(Debug)]
pub struct FlowGraphBuilder<'a> {
    pub(crate) base: BaseFlowGraphBuilder<'a>,
    pub(crate) helper: TranslationHelper<'a>,
    pub(crate) function: FunctionId,
    /// URI of the library the function belongs to
    pub(crate) script: &'a str,
    pub(crate) active_class: ActiveClass,
    pub(crate) scopes: ScopeBuildingResult,
    pub(crate) function_scope: Option<FunctionScope>,
    pub(crate) graph_entry: InstrId,
    pub(crate) catch_entries: Vec<InstrId>,
    pub(crate) yield_continuations: Vec<YieldContinuation>,
    pub(crate) loop_depth: usize,
    pub(crate) try_depth: usize,
    pub(crate) catch_depth: usize,
    pub(crate) for_in_depth: usize,
}

impl<'a> FlowGraphBuilder<'a> {
    pub fn new(
        helper: TranslationHelper<'a>,
        function: FunctionId,
        config: BuilderConfig,
    ) -> Self {
        // 作用域构建前只有当前上下文变量
        let context = LocalVariable::new(CURRENT_CONTEXT_VAR, VariableKind::Synthetic);
        let mut base = BaseFlowGraphBuilder::new(config, vec![context], VarId(0), 0);
        let osr_id = base.config.osr_id;
        let graph_entry = base.add_instruction(Instruction::new(InstrKind::GraphEntry {
            block_id: 0,
            normal_entry: None,
            catch_entries: Vec::new(),
            osr_id,
        }));
        Self {
            base,
            helper,
            function,
            script: helper.script_uri(function),
            active_class: ActiveClass::default(),
            scopes: ScopeBuildingResult::default(),
            function_scope: None,
            graph_entry,
            catch_entries: Vec::new(),
            yield_continuations: Vec::new(),
            loop_depth: 0,
            try_depth: 0,
            catch_depth: 0,
            for_in_depth: 0,
        }
    }

    /// Translate the function; consumes the session
    pub fn build_graph(mut self) -> BuildResult<FlowGraph> {
        let store = self.helper.store();
        let function = store.function(self.function);
        debug!(
            function = %store.qualified_name(self.function),
            kind = ?function.kind,
            "building flow graph"
        );
        let saved = self.active_class.enter(ActiveClass::for_function(store, self.function));

        let normal_entry = match function.kind {
            FunctionKind::ImplicitGetter | FunctionKind::ImplicitSetter | FunctionKind::ImplicitStaticGetter => {
                self.build_graph_of_field_accessor()
            }
            FunctionKind::FieldInitializer => self.build_graph_of_field_initializer(),
            FunctionKind::MethodExtractor => self.build_graph_of_method_extractor(),
            FunctionKind::NoSuchMethodDispatcher => self.build_graph_of_no_such_method_dispatcher(),
            FunctionKind::InvokeFieldDispatcher => self.build_graph_of_invoke_field_dispatcher(),
            FunctionKind::ImplicitClosure => self.build_graph_of_implicit_closure(),
            _ if function.is_native() => self.build_graph_of_native(),
            _ if function.is_abstract || function.is_external => Err(self.missing_body()),
            _ => self.build_graph_of_function(),
        };
        self.active_class.restore(saved);
        Ok(self.finish(normal_entry?))
    }

    /// Seal the graph entry and hand the arena to a [`FlowGraph`]
    fn finish(
        self,
        normal_entry: InstrId,
    ) -> FlowGraph {
        {
            let mut graph = self.base.graph().borrow_mut();
            if let InstrKind::GraphEntry {
                normal_entry: entry,
                catch_entries,
                ..
            } = &mut graph[self.graph_entry].kind
            {
                *entry = Some(normal_entry);
                catch_entries.clone_from(&self.catch_entries);
            }
        }
        let name = self.helper.store().qualified_name(self.function);
        let session = self.base.finish();
        let graph = FlowGraph::new(
            self.function,
            name,
            session.arena,
            self.graph_entry,
            session.variables,
            session.max_block_id,
            session.deopt_id_count,
            session.context_level_array,
        );
        debug!(
            function = %graph.name,
            blocks = graph.block_count(),
            deopt_ids = graph.deopt_id_count(),
            "flow graph built"
        );
        graph
    }

    // ===== 作用域 =====

    /// Run the scope pre-pass and install the variables of the function
    /// node keyed by `key`
    pub(crate) fn prepare_scopes(
        &mut self,
        key: NodeOffset,
    ) -> BuildResult<()> {
        let scopes = ScopeBuilder::new(self.helper).build(self.function)?;
        let function_scope = match scopes.function(key) {
            Some(scope) => scope.clone(),
            None => return Err(self.missing_body()),
        };
        self.base.variables = scopes.variables.clone();
        self.base.context_variable = function_scope.context_variable;
        self.base.context_depth = scopes.outer_context_level(key);
        trace!(
            variables = scopes.variables.len(),
            context_depth = self.base.context_depth,
            "scopes ready"
        );
        self.function_scope = Some(function_scope);
        self.scopes = scopes;
        Ok(())
    }

    pub(crate) fn function_scope(&self) -> &FunctionScope {
        match &self.function_scope {
            Some(scope) => scope,
            None => panic!("no function scope"),
        }
    }

    /// Function nesting depth of the code being translated
    pub(crate) fn function_depth(&self) -> usize {
        self.function_scope.as_ref().map_or(0, |s| s.function_depth)
    }

    /// The variable can be read from the current function
    pub(crate) fn is_accessible(
        &self,
        variable: VarId,
    ) -> bool {
        let v = self.base.variable(variable);
        v.is_captured || v.function_depth == self.function_depth()
    }

    /// Allocate the context of the scope opened at `offset`, if it has one
    pub(crate) fn enter_scope(
        &mut self,
        offset: NodeOffset,
    ) -> Fragment {
        let size = self.scopes.scope_at(offset).map_or(0, |s| s.num_context_variables);
        if size == 0 {
            return self.base.empty();
        }
        let mut instructions = self.base.push_context(size);
        instructions += self.base.drop();
        instructions
    }

    /// Leave the scope opened at `offset`. A closed fragment has no code to
    /// unwind the context in, only the bookkeeping is restored.
    pub(crate) fn exit_scope(
        &mut self,
        offset: NodeOffset,
        open: bool,
    ) -> Fragment {
        let has_context = self.scopes.scope_at(offset).is_some_and(|s| s.has_context());
        if !has_context {
            return self.base.empty();
        }
        if open {
            self.base.pop_context()
        } else {
            self.base.context_depth = self.base.context_depth.saturating_sub(1);
            self.base.empty()
        }
    }

    /// Run `f` inside `frame`, leaving the frame whatever `f` returns
    pub(crate) fn with_frame<T>(
        &mut self,
        frame: FrameId,
        f: impl FnOnce(&mut Self) -> BuildResult<T>,
    ) -> BuildResult<T> {
        let result = f(self);
        self.base.control.exit(frame);
        result
    }

    // ===== 诊断 =====

    pub(crate) fn report_error(
        &self,
        position: TokenPosition,
        message: impl Into<String>,
    ) -> BuildError {
        self.helper.report_error(self.script, position, message)
    }

    /// Attach the current script and `position` to resolution failures
    pub(crate) fn located(
        &self,
        position: TokenPosition,
    ) -> impl Fn(BuildError) -> BuildError + 'a {
        let script = self.script;
        move |error| error.at(script, position)
    }

    pub(crate) fn missing_body(&self) -> BuildError {
        BuildError::MissingBody {
            function: self.helper.store().qualified_name(self.function),
        }
    }

    /// Constructs an inlined graph cannot contain
    pub(crate) fn check_inlinable(
        &self,
        reason: &str,
    ) -> BuildResult<()> {
        if self.base.config.inlining {
            warn!(
                function = %self.helper.store().qualified_name(self.function),
                reason,
                "inlining bailout"
            );
            return Err(BuildError::InlineBailout {
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn evaluator(&self) -> ConstantEvaluator<'a> {
        ConstantEvaluator::new(self.helper, self.script)
    }

    // ===== 类型 =====

    pub(crate) fn translate_type(
        &self,
        ty: &KernelType,
    ) -> AbstractType {
        self.helper.translate_type(ty, self.active_class.type_scope())
    }

    pub(crate) fn is_top_type(
        &self,
        ty: &AbstractType,
    ) -> bool {
        ty.is_top(self.helper.store().core().object)
    }

    /// Push the type arguments of the enclosing class instance, or null
    pub(crate) fn load_instantiator_type_arguments(&mut self) -> Fragment {
        if self.active_class.class_type_parameters.is_empty() {
            return self.base.null_constant();
        }
        if let Some(type_arguments) = self.scopes.type_arguments_variable {
            if self.is_accessible(type_arguments) {
                return self.base.load_local(type_arguments);
            }
        }
        match self.scopes.this_variable.filter(|&this| self.is_accessible(this)) {
            Some(this) => {
                let mut instructions = self.base.load_local(this);
                instructions += self.base.load_field(Slot::TypeArguments);
                instructions
            }
            None => self.base.null_constant(),
        }
    }

    /// Push the function type arguments in scope, or null
    pub(crate) fn load_function_type_arguments(&mut self) -> Fragment {
        match self.function_scope.as_ref().and_then(|s| s.function_type_arguments) {
            Some(variable) => self.base.load_local(variable),
            None => self.base.null_constant(),
        }
    }

    /// Push both type argument vectors `ty` may need to be instantiated
    pub(crate) fn load_type_arguments_for(
        &mut self,
        ty: &AbstractType,
    ) -> Fragment {
        let mut instructions = if ty.mentions(TypeParameterOwner::Class) {
            self.load_instantiator_type_arguments()
        } else {
            self.base.null_constant()
        };
        instructions += if ty.mentions(TypeParameterOwner::Function) {
            self.load_function_type_arguments()
        } else {
            self.base.null_constant()
        };
        instructions
    }

    /// Push a type argument vector, instantiating it at run time if needed
    pub(crate) fn translate_instantiated_type_arguments(
        &mut self,
        type_arguments: Vec<AbstractType>,
    ) -> Fragment {
        if type_arguments.iter().all(AbstractType::is_instantiated) {
            return self.base.constant(ConstantValue::TypeArguments(type_arguments));
        }
        let mut instructions = self.load_instantiator_type_arguments();
        instructions += self.load_function_type_arguments();
        instructions += self.base.instantiate_type_arguments(type_arguments);
        instructions
    }

    /// Check the value on top of the stack against `ty`
    pub(crate) fn assert_assignable(
        &mut self,
        position: TokenPosition,
        ty: &AbstractType,
        name: &str,
    ) -> Fragment {
        if self.is_top_type(ty) {
            return self.base.empty();
        }
        let mut instructions = self.load_type_arguments_for(ty);
        instructions += self.base.assert_assignable_raw(position, ty.clone(), name);
        instructions
    }

    /// [`Self::assert_assignable`] in checked mode only
    pub(crate) fn check_assignable(
        &mut self,
        position: TokenPosition,
        ty: &AbstractType,
        name: &str,
    ) -> Fragment {
        if !self.base.config.checked_mode {
            return self.base.empty();
        }
        self.assert_assignable(position, ty, name)
    }

    pub(crate) fn check_boolean(&mut self) -> Fragment {
        if !self.base.config.checked_mode {
            return self.base.empty();
        }
        self.base.assert_bool()
    }

    /// Test the value on top of the stack against `ty`
    pub(crate) fn instance_of(
        &mut self,
        position: TokenPosition,
        ty: AbstractType,
    ) -> Fragment {
        let mut instructions = self.load_type_arguments_for(&ty);
        instructions += self.base.instance_of(position, ty);
        instructions
    }

    // ===== 函数体 =====

    fn build_graph_of_function(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let entry = function
            .kernel_offset
            .and_then(|offset| self.helper.reader().function_at(offset))
            .ok_or_else(|| self.missing_body())?;
        let node = entry.node;
        self.prepare_scopes(node.offset)?;

        let normal_entry = self.base.build_target_entry();
        let mut prologue = Fragment::from_instr(self.base.graph(), normal_entry);
        prologue += self.base.check_stack_overflow(node.position, 0);
        if function.kind == FunctionKind::Closure {
            prologue += self.restore_closure_context();
            if function.type_parameters.is_empty() {
                prologue += self.load_parent_function_type_arguments();
            }
        }

        let mut body = self.enter_scope(node.offset);
        body += self.copy_parameters();
        body += self.check_argument_count(function);
        body += self.check_parameter_types(node);
        body += self.check_null_parameters(node, function);
        if function.is_generative_constructor() {
            body += self.build_initializers(entry)?;
        }
        if let Some(statement) = &node.body {
            body += self.build_statement(statement)?;
        }
        if body.is_open() {
            body += self.base.null_constant();
            body += self.base.return_(node.end_position);
        }

        if self.yield_continuations.is_empty() {
            prologue += body;
        } else {
            prologue += self.build_yield_dispatch(body);
        }
        Ok(normal_entry)
    }

    /// A closure runs in the context it was created in
    fn restore_closure_context(&mut self) -> Fragment {
        let closure = self.function_scope().parameters[0];
        let context = self.base.context_variable;
        let mut instructions = self.base.load_local(closure);
        instructions += self.base.load_field(Slot::ClosureContext);
        instructions += self.base.store_local_raw(TokenPosition::NO_SOURCE, context);
        instructions += self.base.drop();
        instructions
    }

    /// A non-generic closure sees the type arguments of its generic parents
    fn load_parent_function_type_arguments(&mut self) -> Fragment {
        let Some(type_arguments) = self.function_scope().function_type_arguments else {
            return self.base.empty();
        };
        let closure = self.function_scope().parameters[0];
        let mut instructions = self.base.load_local(closure);
        instructions += self.base.load_field(Slot::ClosureFunctionTypeArguments);
        instructions += self.base.store_local(TokenPosition::NO_SOURCE, type_arguments);
        instructions += self.base.drop();
        instructions
    }

    /// Captured parameters move from their incoming slot into the context
    fn copy_parameters(&mut self) -> Fragment {
        let raw_parameters = self.function_scope().raw_parameters.clone();
        let mut instructions = self.base.empty();
        for (declared, raw) in raw_parameters {
            instructions += self.base.load_local_raw(raw);
            instructions += self.base.store_local(TokenPosition::NO_SOURCE, declared);
            instructions += self.base.drop();
        }
        instructions
    }

    /// Closures without optional parameters check the passed argument count
    fn check_argument_count(
        &mut self,
        function: &Function,
    ) -> Fragment {
        let descriptor = self.function_scope().argument_descriptor;
        let Some(descriptor) = descriptor else {
            return self.base.empty();
        };
        if !self.base.config.check_argument_counts || function.num_optional_parameters > 0 {
            return self.base.empty();
        }
        let mut instructions = self.base.load_local(descriptor);
        instructions += self.base.load_field(Slot::ArgumentCount);
        instructions += self.base.int_constant(function.num_fixed_parameters as i64);
        let (branch, succeed, fail) = self.base.branch_if_equal(false);
        instructions += branch;

        let mut failure = Fragment::from_instr(self.base.graph(), fail);
        failure += self.base.tail_call("CallClosureNoSuchMethod");
        instructions.continue_at(succeed)
    }

    /// Type parameter bounds and parameter types checked on entry
    fn check_parameter_types(
        &mut self,
        node: &FunctionNode,
    ) -> Fragment {
        let checked = self.base.config.checked_mode;
        let strong = self.base.config.strong_mode;
        let mut instructions = self.base.empty();
        if !checked && !strong {
            return instructions;
        }

        for parameter in &node.type_parameters {
            let bound = self.translate_type(&parameter.bound);
            if self.is_top_type(&bound) {
                continue;
            }
            let name = self.helper.string(parameter.name);
            let sub_type = self.translate_type(&KernelType::TypeParameter { name: parameter.name });
            instructions += self.load_instantiator_type_arguments();
            instructions += self.load_function_type_arguments();
            instructions += self.base.assert_subtype(node.position, sub_type, bound, name);
        }

        let parameters = self.function_scope().parameters.clone();
        let implicit = parameters.len().saturating_sub(node.parameter_count());
        for (declaration, &variable) in node.parameters().zip(&parameters[implicit..]) {
            let needs_check = checked || declaration.is_covariant || declaration.is_generic_covariant_impl;
            if !needs_check {
                continue;
            }
            let (ty, name) = {
                let v = self.base.variable(variable);
                (v.ty.clone(), v.name.clone())
            };
            if self.is_top_type(&ty) {
                continue;
            }
            instructions += self.base.load_local(variable);
            instructions += self.assert_assignable(declaration.position, &ty, &name);
            instructions += self.base.drop();
        }
        instructions
    }

    fn check_null_parameters(
        &mut self,
        node: &FunctionNode,
        function: &Function,
    ) -> Fragment {
        let mut instructions = self.base.empty();
        if !self.base.config.null_checks {
            return instructions;
        }
        let parameters = self.function_scope().parameters.clone();
        let implicit = parameters.len().saturating_sub(node.parameter_count());
        for (declaration, &variable) in node.parameters().zip(&parameters[implicit..]) {
            if declaration.null_check {
                instructions += self.base.check_null(declaration.position, variable, &function.name);
            }
        }
        instructions
    }

    // ===== 构造函数 =====

    /// Instance field initializers, then the initializer list
    fn build_initializers(
        &mut self,
        entry: &'a FunctionEntry<'a>,
    ) -> BuildResult<Fragment> {
        let mut instructions = self.base.empty();
        let FunctionOwner::Constructor(constructor) = entry.owner else {
            return Ok(instructions);
        };
        let this = self
            .scopes
            .this_variable
            .ok_or_else(|| self.report_error(constructor.position, "constructor without receiver"))?;

        let is_redirecting = constructor
            .initializers
            .iter()
            .any(|i| matches!(i, Initializer::Redirecting { .. }));
        if !is_redirecting {
            if let Some(class) = entry.class {
                for field in class.fields.iter().filter(|f| !f.is_static) {
                    if let Some(initializer) = &field.initializer {
                        let field = self
                            .helper
                            .lookup_field(field.canonical_name)
                            .map_err(self.located(field.position))?;
                        instructions += self.build_field_initialization(this, field, initializer)?;
                    }
                }
            }
        }

        for initializer in &constructor.initializers {
            instructions += match initializer {
                Initializer::Invalid => {
                    return Err(self.report_error(constructor.position, "invalid constructor initializer"));
                }
                Initializer::Field { field, value } => {
                    let field = self
                        .helper
                        .lookup_field(*field)
                        .map_err(self.located(value.position))?;
                    self.build_field_initialization(this, field, value)?
                }
                Initializer::Super {
                    position,
                    target,
                    arguments,
                }
                | Initializer::Redirecting {
                    position,
                    target,
                    arguments,
                } => {
                    let target = self.helper.lookup_function(*target).map_err(|_| {
                        let name = self.helper.member_name(*target);
                        self.report_error(*position, format!("cannot resolve constructor '{}'", name))
                    })?;
                    let mut call = self.base.load_local(this);
                    call += self.base.push_argument();
                    let (values, names) = self.build_argument_values(arguments)?;
                    call += values;
                    let shape = CallShape::new(0, arguments.count() + 1, names);
                    call += self.base.static_call(*position, target, shape);
                    call += self.base.drop();
                    call
                }
                Initializer::Local { variable } => self.build_variable_declaration(variable)?,
            };
        }
        Ok(instructions)
    }

    fn build_field_initialization(
        &mut self,
        this: VarId,
        field: FieldId,
        value: &'a Expression,
    ) -> BuildResult<Fragment> {
        let (ty, name, class_guard, length_guard) = {
            let f = self.helper.store().field(field);
            (f.static_type.clone(), f.name.clone(), f.needs_class_guard(), f.needs_length_guard())
        };
        let mut instructions = self.base.load_local(this);
        instructions += self.build_expression(value)?;
        instructions += self.check_assignable(value.position, &ty, &name);
        instructions += self
            .base
            .store_instance_field_guarded(TokenPosition::NO_SOURCE, field, class_guard, length_guard, true);
        Ok(instructions)
    }

    // ===== 生成器恢复 =====

    /// Dispatch on the jump variable to the normal entry or a resumption
    /// point. Runs before any nested context exists.
    fn build_yield_dispatch(
        &mut self,
        body: Fragment,
    ) -> Fragment {
        let scope = self.function_scope();
        let jump = scope.yield_jump_variable;
        let saved_context = scope.yield_context_variable;
        let switch = scope.switch_variable;
        let (Some(jump), Some(saved_context), Some(switch)) = (jump, saved_context, switch) else {
            panic!("yielding function without resumption variables");
        };

        let current_context_depth = self.base.context_depth;
        self.base.context_depth = self.base.variable(jump).context_level;

        // 正常入口作为第 0 个延续
        let anchor = self.base.add_instruction(Instruction::new(InstrKind::DropTemps { count: 0 }));
        if let Some(entry) = body.entry {
            self.base.graph().borrow_mut().link(anchor, entry);
        }
        let mut continuations = vec![YieldContinuation {
            entry: anchor,
            try_index: None,
        }];
        continuations.append(&mut self.yield_continuations);
        trace!(continuations = continuations.len(), "yield dispatch");

        let context = self.base.context_variable;
        let mut dispatch = self.base.load_local(jump);
        dispatch += self.base.store_local(TokenPosition::NO_SOURCE, switch);
        dispatch += self.base.drop();

        let mut last_block: Option<InstrId> = None;
        for (i, continuation) in continuations.iter().enumerate() {
            if i == 1 {
                // 恢复执行：从 :await_ctx_var 取回上下文
                dispatch += self.base.load_local(saved_context);
                dispatch += self.base.store_local_raw(TokenPosition::NO_SOURCE, context);
                dispatch += self.base.drop();
            }
            let target = self.continuation_target(continuation.entry);
            if i == continuations.len() - 1 {
                if let Some(block) = last_block {
                    self.base.graph().borrow_mut()[block].set_try_index(continuation.try_index);
                }
                dispatch <<= target;
                break;
            }
            dispatch += self.base.load_local(switch);
            dispatch += self.base.int_constant(i as i64);
            let (branch, then, otherwise) = self.base.branch_if_strict_equal();
            dispatch += branch;
            {
                let mut graph = self.base.graph().borrow_mut();
                graph.link(then, target);
                graph[then].set_try_index(continuation.try_index);
            }
            dispatch = dispatch.continue_at(otherwise);
            last_block = Some(otherwise);
        }

        self.base.context_depth = current_context_depth;
        dispatch
    }

    /// First instruction after a continuation anchor
    fn continuation_target(
        &self,
        anchor: InstrId,
    ) -> InstrId {
        self.base.graph().borrow()[anchor].next.unwrap_or(anchor)
    }

    /// `==` on two pushed arguments
    pub(crate) fn equals_call(
        &mut self,
        position: TokenPosition,
    ) -> Fragment {
        let shape = CallShape::positional(2);
        self.base.instance_call(position, "==", Token::Eq, shape, 2, None)
    }
}
