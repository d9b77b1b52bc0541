//! 合成函数体
//!
//! Graphs of functions the program has no body for: implicit field
//! accessors, static field initializers, method extractors, the bodies of
//! torn-off methods, `noSuchMethod` and invoke-field dispatchers, and native
//! functions. Apart from field initializers none of them runs the scope
//! pre-pass; their parameters are declared straight from the function's
//! parameter names.

use crate::frontend::error::BuildResult;
use crate::frontend::flow_graph_builder::FlowGraphBuilder;
use crate::frontend::fragment::Fragment;
use crate::frontend::scope::{LocalVariable, VarId, VariableKind};
use crate::frontend::scope_builder::FUNCTION_TYPE_ARGUMENTS_VAR;
use crate::il::instruction::{CallShape, ConstantValue, InstrId, Slot, Token};
use crate::object::{FunctionKind, ObjectStore};
use crate::util::span::TokenPosition;
use tracing::trace;

/// Selector of closure invocation
const CALL: &str = "call";

impl<'a> FlowGraphBuilder<'a> {
    /// Declare the incoming parameters, receiver first
    fn declare_parameters(&mut self) -> Vec<VarId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let parameters: Vec<VarId> = function
            .parameter_names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                self.base
                    .add_variable(LocalVariable::new(name.as_str(), VariableKind::Parameter(index)))
            })
            .collect();
        if function.has_receiver() {
            self.scopes.this_variable = parameters.first().copied();
        }
        trace!(parameters = parameters.len(), "synthetic parameters");
        parameters
    }

    /// Normal entry followed by the prologue stack check
    fn synthetic_entry(&mut self) -> (InstrId, Fragment) {
        let normal_entry = self.base.build_target_entry();
        let mut body = Fragment::from_instr(self.base.graph(), normal_entry);
        body += self.base.check_stack_overflow(TokenPosition::NO_SOURCE, 0);
        (normal_entry, body)
    }

    // ===== 字段 =====

    /// `get:x` / `set:x` of an instance field, `get:x` of a lazily
    /// initialized static field
    pub(crate) fn build_graph_of_field_accessor(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let field_id = function.field.ok_or_else(|| self.missing_body())?;
        let field = store.field(field_id);
        let parameters = self.declare_parameters();
        let (normal_entry, mut body) = self.synthetic_entry();

        match function.kind {
            FunctionKind::ImplicitSetter => {
                let (this, value) = match parameters[..] {
                    [this, value] => (this, value),
                    _ => return Err(self.missing_body()),
                };
                body += self.base.load_local(this);
                body += self.base.load_local(value);
                body += self.check_assignable(field.position, &field.static_type, &field.name);
                body += self.base.store_instance_field_guarded(
                    TokenPosition::NO_SOURCE,
                    field_id,
                    field.needs_class_guard(),
                    field.needs_length_guard(),
                    false,
                );
                body += self.base.null_constant();
            }
            FunctionKind::ImplicitGetter => {
                let this = parameters.first().copied().ok_or_else(|| self.missing_body())?;
                body += self.base.load_local(this);
                body += self.base.load_field(Slot::Field(field_id));
            }
            _ => {
                // 静态字段：首次读取时运行初始化器
                body += self.base.init_static_field(field_id);
                body += self.base.constant(ConstantValue::Field(field_id));
                body += self.base.load_static_field();
            }
        }
        body += self.base.return_(TokenPosition::NO_SOURCE);
        Ok(normal_entry)
    }

    /// Evaluates the initializer of a static field
    pub(crate) fn build_graph_of_field_initializer(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let field_id = function.field.ok_or_else(|| self.missing_body())?;
        let field = store.field(field_id);
        let kernel_field = field
            .kernel_offset
            .and_then(|offset| self.helper.reader().field_at(offset))
            .ok_or_else(|| self.missing_body())?;
        let initializer = kernel_field.initializer.as_ref().ok_or_else(|| self.missing_body())?;
        self.prepare_scopes(kernel_field.offset)?;

        let normal_entry = self.base.build_target_entry();
        let mut body = Fragment::from_instr(self.base.graph(), normal_entry);
        body += self.base.check_stack_overflow(field.position, 0);
        body += self.enter_scope(kernel_field.offset);
        if field.is_const {
            let value = self
                .evaluator()
                .evaluate_expression(initializer, self.active_class.type_scope())
                .map_err(self.located(initializer.position))?;
            body += self.base.constant(value);
        } else {
            body += self.build_expression(initializer)?;
            body += self.check_assignable(initializer.position, &field.static_type, &field.name);
        }
        body += self.base.return_(TokenPosition::NO_SOURCE);
        Ok(normal_entry)
    }

    // ===== 方法拆分 =====

    /// `get:m` of a method `m`: the bound closure
    pub(crate) fn build_graph_of_method_extractor(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let closure = store
            .function(self.function)
            .target
            .and_then(|target| store.function(target).implicit_closure)
            .ok_or_else(|| self.missing_body())?;
        self.declare_parameters();
        let this = self.scopes.this_variable.ok_or_else(|| self.missing_body())?;

        let (normal_entry, mut body) = self.synthetic_entry();
        body += self.build_implicit_closure_creation(closure, this);
        body += self.base.return_(TokenPosition::NO_SOURCE);
        Ok(normal_entry)
    }

    /// Body of a torn-off method: forward the arguments to the target, with
    /// the receiver taken from the closure context
    pub(crate) fn build_graph_of_implicit_closure(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let target = function.target.ok_or_else(|| self.missing_body())?;
        let target_is_static = store.function(target).is_static;
        let named = if function.has_named_parameters {
            function.parameter_names[function.num_fixed_parameters..].to_vec()
        } else {
            Vec::new()
        };
        let parameters = self.declare_parameters();
        let closure = parameters.first().copied().ok_or_else(|| self.missing_body())?;

        let (normal_entry, mut body) = self.synthetic_entry();
        let context = self.base.context_variable;
        body += self.base.load_local(closure);
        body += self.base.load_field(Slot::ClosureContext);
        body += self.base.store_local_raw(TokenPosition::NO_SOURCE, context);
        body += self.base.drop();

        let mut argument_count = parameters.len() - 1;
        if !target_is_static {
            body += self.base.load_local_raw(context);
            body += self.base.load_field(Slot::ContextVariable(0));
            body += self.base.push_argument();
            argument_count += 1;
        }
        for &parameter in &parameters[1..] {
            body += self.base.load_local(parameter);
            body += self.base.push_argument();
        }
        let shape = CallShape::new(0, argument_count, named);
        body += self.base.static_call(TokenPosition::NO_SOURCE, target, shape);
        body += self.base.return_(function.end_position);
        Ok(normal_entry)
    }

    // ===== 分派器 =====

    /// Calls `name` on the value of the getter `get:name`, or invokes a
    /// closure receiver directly
    pub(crate) fn build_graph_of_invoke_field_dispatcher(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let descriptor = function.dispatcher_descriptor.clone().ok_or_else(|| self.missing_body())?;
        let is_closure_call = function.owner == store.core().closure && function.name == CALL;
        let getter = format!("get:{}", function.name);
        let parameters = self.declare_parameters();
        let receiver = parameters.first().copied().ok_or_else(|| self.missing_body())?;

        let (normal_entry, mut body) = self.synthetic_entry();
        if descriptor.type_args_len > 0 {
            let type_arguments = self.function_type_arguments_parameter();
            body += self.base.load_local(type_arguments);
            body += self.base.push_argument();
        }
        if is_closure_call {
            body += self.base.load_local(receiver);
        } else {
            body += self.base.load_local(receiver);
            body += self.base.push_argument();
            body += self
                .base
                .instance_call(TokenPosition::NO_SOURCE, &getter, Token::Get, CallShape::positional(1), 1, None);
        }
        body += self.base.push_argument();
        for &parameter in parameters.iter().take(descriptor.count).skip(1) {
            body += self.base.load_local(parameter);
            body += self.base.push_argument();
        }

        let shape = CallShape::new(descriptor.type_args_len, descriptor.count, descriptor.named.clone());
        if is_closure_call {
            body += self.base.load_local(receiver);
            body += self.base.load_field(Slot::ClosureFunction);
            body += self.base.closure_call(TokenPosition::NO_SOURCE, shape);
        } else {
            body += self
                .base
                .instance_call(TokenPosition::NO_SOURCE, CALL, Token::Illegal, shape, 1, None);
        }
        body += self.base.return_(TokenPosition::NO_SOURCE);
        Ok(normal_entry)
    }

    /// Packs the call into an invocation mirror and hands it to `noSuchMethod`
    pub(crate) fn build_graph_of_no_such_method_dispatcher(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let descriptor = function.dispatcher_descriptor.clone().ok_or_else(|| self.missing_body())?;
        let name = function.name.clone();
        let no_such_method = resolve_no_such_method(store, function.owner);
        let allocate_mirror = store.core().allocate_invocation_mirror;
        let parameters = self.declare_parameters();
        let receiver = parameters.first().copied().ok_or_else(|| self.missing_body())?;

        let (normal_entry, mut body) = self.synthetic_entry();
        body += self.base.load_local(receiver);
        body += self.base.push_argument();

        // 调用镜像：名称、参数描述符、实参数组、是否 super
        body += self.base.constant(ConstantValue::String(name));
        body += self.base.push_argument();
        body += self.base.constant(ConstantValue::ArgumentsDescriptor(descriptor.clone()));
        body += self.base.push_argument();

        let receiver_index = usize::from(descriptor.type_args_len > 0);
        body += self.base.null_constant();
        body += self.base.int_constant((receiver_index + descriptor.count) as i64);
        body += self.base.create_array();
        let array = self.base.make_temporary();
        if receiver_index > 0 {
            let type_arguments = self.function_type_arguments_parameter();
            body += self.base.load_local(array);
            body += self.base.int_constant(0);
            body += self.base.load_local(type_arguments);
            body += self.base.store_indexed();
        }
        for (index, &parameter) in parameters.iter().take(descriptor.count).enumerate() {
            body += self.base.load_local(array);
            body += self.base.int_constant((receiver_index + index) as i64);
            body += self.base.load_local(parameter);
            body += self.base.store_indexed();
        }
        body += self.base.push_argument();
        body += self.base.bool_constant(false);
        body += self.base.push_argument();
        body += self
            .base
            .static_call(TokenPosition::NO_SOURCE, allocate_mirror, CallShape::positional(4));

        body += self.base.push_argument();
        body += self
            .base
            .static_call(TokenPosition::NO_SOURCE, no_such_method, CallShape::positional(2));
        body += self.base.return_(TokenPosition::NO_SOURCE);
        Ok(normal_entry)
    }

    /// Hidden type argument vector passed to a generic dispatcher
    fn function_type_arguments_parameter(&mut self) -> VarId {
        self.base
            .add_variable(LocalVariable::new(FUNCTION_TYPE_ARGUMENTS_VAR, VariableKind::Synthetic))
    }

    // ===== 原生函数 =====

    /// Pass every parameter to the native implementation and return its result
    pub(crate) fn build_graph_of_native(&mut self) -> BuildResult<InstrId> {
        let store = self.helper.store();
        let function = store.function(self.function);
        let native_name = function.native_name.clone().ok_or_else(|| self.missing_body())?;
        let parameters = self.declare_parameters();

        let (normal_entry, mut body) = self.synthetic_entry();
        for &parameter in &parameters {
            body += self.base.load_local(parameter);
            body += self.base.push_argument();
        }
        body += self.base.native_call(&native_name, self.function, parameters.len());
        body += self.base.return_(function.end_position);
        Ok(normal_entry)
    }
}

/// `noSuchMethod` as found on `class`, falling back to `Object`'s
fn resolve_no_such_method(
    store: &ObjectStore,
    class: crate::object::ClassId,
) -> crate::object::FunctionId {
    store
        .resolve_dynamic(class, "noSuchMethod")
        .unwrap_or(store.core().object_no_such_method)
}
