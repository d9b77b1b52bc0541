//! 表达式翻译
//!
//! Every expression leaves exactly one value on the expression stack. Calls
//! push their receiver and arguments with `PushArgument` and consume them;
//! an expression that throws still leaves a placeholder value, the fragment
//! is closed.

use crate::frontend::error::BuildResult;
use crate::frontend::flow_graph_builder::FlowGraphBuilder;
use crate::frontend::fragment::Fragment;
use crate::frontend::scope::VarId;
use crate::frontend::translation_helper::StaticMember;
use crate::il::instruction::{CallShape, ConstantValue, Slot, Token};
use crate::kernel::ast::{
    Arguments, Expression, ExpressionKind, FunctionNode, KernelConstant, KernelType, LogicalOperator, MapEntry, Name,
    ProcedureKind,
};
use crate::kernel::reader::MemberRef;
use crate::kernel::NameIndex;
use crate::object::store::{GETTER_PREFIX, SETTER_PREFIX};
use crate::object::{AbstractType, ClassId, FunctionId, FunctionKind, CORE_LIBRARY_URI};
use crate::util::span::TokenPosition;
use tracing::trace;

impl<'a> FlowGraphBuilder<'a> {
    pub(crate) fn build_expression(
        &mut self,
        expression: &'a Expression,
    ) -> BuildResult<Fragment> {
        let position = expression.position;
        match &expression.kind {
            ExpressionKind::Invalid => Err(self.report_error(position, "invalid expression")),
            ExpressionKind::VariableGet { variable } => {
                let variable = self.scopes.local(*variable);
                Ok(self.base.load_local(variable))
            }
            ExpressionKind::VariableSet { variable, value } => {
                let variable = self.scopes.local(*variable);
                self.build_variable_set(position, variable, value)
            }
            ExpressionKind::PropertyGet { receiver, name, .. } => self.build_property_get(position, receiver, name),
            ExpressionKind::PropertySet {
                receiver, name, value, ..
            } => self.build_property_set(position, receiver, name, value),
            ExpressionKind::DirectPropertyGet { receiver, target } => {
                self.build_direct_property_get(position, receiver, *target)
            }
            ExpressionKind::DirectPropertySet { receiver, target, value } => {
                self.build_direct_property_set(position, receiver, *target, value)
            }
            ExpressionKind::DirectMethodInvocation {
                receiver,
                target,
                arguments,
            } => self.build_direct_method_invocation(position, receiver, *target, arguments),
            ExpressionKind::SuperMethodInvocation { name, arguments, .. } => {
                self.build_super_method_invocation(position, name, arguments)
            }
            ExpressionKind::StaticGet { target } => self.build_static_get(expression, *target),
            ExpressionKind::StaticSet { target, value } => self.build_static_set(position, *target, value),
            ExpressionKind::MethodInvocation {
                receiver,
                name,
                arguments,
                interface_target,
            } => self.build_method_invocation(position, receiver, name, arguments, *interface_target),
            ExpressionKind::StaticInvocation {
                target,
                arguments,
                is_const,
            } => {
                if *is_const {
                    return self.build_constant_expression(expression);
                }
                self.build_static_invocation(position, *target, arguments)
            }
            ExpressionKind::ConstructorInvocation {
                target,
                arguments,
                is_const,
            } => {
                if *is_const {
                    return self.build_constant_expression(expression);
                }
                self.build_constructor_invocation(position, *target, arguments)
            }
            ExpressionKind::Not(operand) => {
                let mut instructions = self.build_expression(operand)?;
                instructions += self.check_boolean();
                instructions += self.base.boolean_negate();
                Ok(instructions)
            }
            ExpressionKind::Logical { left, operator, right } => self.build_logical(left, *operator, right),
            ExpressionKind::Conditional {
                condition,
                then,
                otherwise,
            } => self.build_conditional(condition, then, otherwise),
            ExpressionKind::StringConcatenation(parts) => self.build_string_concatenation(position, parts),
            ExpressionKind::Is { operand, ty } => self.build_is(position, operand, ty),
            ExpressionKind::As {
                operand,
                ty,
                is_type_error,
            } => self.build_as(position, operand, ty, *is_type_error),
            ExpressionKind::StringLiteral(index) => {
                let text = self.helper.string(*index).to_string();
                Ok(self.base.constant(ConstantValue::String(text)))
            }
            ExpressionKind::IntLiteral(value) => Ok(self.base.int_constant(*value)),
            ExpressionKind::DoubleLiteral(value) => Ok(self.base.constant(ConstantValue::Double(*value))),
            ExpressionKind::BoolLiteral(value) => Ok(self.base.bool_constant(*value)),
            ExpressionKind::NullLiteral => Ok(self.base.null_constant()),
            ExpressionKind::SymbolLiteral(index) => {
                let symbol = self.helper.symbol(*index, self.script);
                Ok(self.base.constant(ConstantValue::Symbol(symbol)))
            }
            ExpressionKind::TypeLiteral(ty) => self.build_type_literal(position, ty),
            ExpressionKind::This => match self.scopes.this_variable.filter(|&this| self.is_accessible(this)) {
                Some(this) => Ok(self.base.load_local(this)),
                None => Err(self.report_error(position, "'this' is not available here")),
            },
            ExpressionKind::Rethrow => self.build_rethrow(position),
            ExpressionKind::Throw(value) => {
                let mut instructions = self.build_expression(value)?;
                instructions = self.base.debug_step_check(position) + instructions;
                instructions += self.base.throw_exception(position);
                Ok(instructions)
            }
            ExpressionKind::ListLiteral {
                element_type,
                elements,
                is_const,
            } => {
                if *is_const {
                    return self.build_constant_expression(expression);
                }
                self.build_list_literal(position, element_type, elements)
            }
            ExpressionKind::MapLiteral {
                key_type,
                value_type,
                entries,
                is_const,
            } => {
                if *is_const {
                    return self.build_constant_expression(expression);
                }
                self.build_map_literal(position, key_type, value_type, entries)
            }
            ExpressionKind::FunctionExpression(function) => self.build_closure(function),
            ExpressionKind::Let { variable, body } => {
                let mut instructions = self.build_variable_declaration(variable)?;
                instructions += self.build_expression(body)?;
                Ok(instructions)
            }
            ExpressionKind::Constant(index) => {
                let value = self
                    .evaluator()
                    .evaluate_constant(*index, self.active_class.type_scope())
                    .map_err(self.located(position))?;
                Ok(self.base.constant(value))
            }
        }
    }

    fn build_constant_expression(
        &mut self,
        expression: &'a Expression,
    ) -> BuildResult<Fragment> {
        let value = self
            .evaluator()
            .evaluate_expression(expression, self.active_class.type_scope())
            .map_err(self.located(expression.position))?;
        Ok(self.base.constant(value))
    }

    // ===== 参数 =====

    /// Push the positional then the named argument values; returns the names
    pub(crate) fn build_argument_values(
        &mut self,
        arguments: &'a Arguments,
    ) -> BuildResult<(Fragment, Vec<String>)> {
        let mut instructions = self.base.empty();
        for argument in &arguments.positional {
            instructions += self.build_expression(argument)?;
            instructions += self.base.push_argument();
        }
        let mut names = Vec::with_capacity(arguments.named.len());
        for named in &arguments.named {
            instructions += self.build_expression(&named.value)?;
            instructions += self.base.push_argument();
            names.push(self.helper.string(named.name).to_string());
        }
        Ok((instructions, names))
    }

    /// Push the explicit type argument vector of a generic call, if any
    fn build_type_arguments(
        &mut self,
        arguments: &'a Arguments,
    ) -> Fragment {
        if arguments.type_arguments.is_empty() {
            return self.base.empty();
        }
        let type_arguments = self
            .helper
            .translate_type_arguments(&arguments.type_arguments, self.active_class.type_scope());
        let mut instructions = self.translate_instantiated_type_arguments(type_arguments);
        instructions += self.base.push_argument();
        instructions
    }

    /// Type argument vector handed to a factory or an allocation of `class`.
    /// Missing arguments of a generic class default to `dynamic`.
    fn build_class_type_arguments(
        &mut self,
        class: ClassId,
        given: &[KernelType],
    ) -> Fragment {
        let count = self.helper.store().class(class).type_parameters.len();
        if count == 0 {
            return self.base.null_constant();
        }
        let type_arguments = if given.len() == count {
            self.helper.translate_type_arguments(given, self.active_class.type_scope())
        } else {
            vec![AbstractType::Dynamic; count]
        };
        self.translate_instantiated_type_arguments(type_arguments)
    }

    /// `x == null` and `x != null` compare identity
    fn is_null_comparison(
        &self,
        selector: &str,
        arguments: &Arguments,
    ) -> bool {
        if selector != "==" && selector != "!=" {
            return false;
        }
        if arguments.positional.len() != 1 || !arguments.named.is_empty() {
            return false;
        }
        match &arguments.positional[0].kind {
            ExpressionKind::NullLiteral => true,
            ExpressionKind::Constant(index) => {
                matches!(self.helper.constant(*index), Ok(KernelConstant::Null))
            }
            _ => false,
        }
    }

    fn build_null_comparison(
        &mut self,
        selector: &str,
        receiver: &'a Expression,
        arguments: &'a Arguments,
    ) -> BuildResult<Fragment> {
        let mut instructions = self.build_expression(receiver)?;
        instructions += self.build_expression(&arguments.positional[0])?;
        let kind = if selector == "==" { Token::EqStrict } else { Token::NeStrict };
        instructions += self.base.strict_compare(kind, true);
        Ok(instructions)
    }

    // ===== 局部变量 =====

    fn build_variable_set(
        &mut self,
        position: TokenPosition,
        variable: VarId,
        value: &'a Expression,
    ) -> BuildResult<Fragment> {
        let mut instructions = self.build_expression(value)?;
        instructions = self.base.debug_step_check(position) + instructions;
        let (ty, name) = {
            let v = self.base.variable(variable);
            (v.ty.clone(), v.name.clone())
        };
        instructions += self.check_assignable(position, &ty, &name);
        instructions += self.base.store_local(position, variable);
        Ok(instructions)
    }

    // ===== 实例成员 =====

    fn build_property_get(
        &mut self,
        position: TokenPosition,
        receiver: &'a Expression,
        name: &'a Name,
    ) -> BuildResult<Fragment> {
        let getter = self.helper.getter_name(name);
        let mut instructions = self.build_expression(receiver)?;
        instructions += self.base.push_argument();
        instructions += self
            .base
            .instance_call(position, &getter, Token::Get, CallShape::positional(1), 1, None);
        Ok(instructions)
    }

    /// The assigned value is the result; the setter's return value is dropped
    fn build_property_set(
        &mut self,
        position: TokenPosition,
        receiver: &'a Expression,
        name: &'a Name,
        value: &'a Expression,
    ) -> BuildResult<Fragment> {
        let setter = self.helper.setter_name(name);
        let mut instructions = self.base.null_constant();
        let result = self.base.make_temporary();
        instructions += self.build_expression(receiver)?;
        instructions += self.base.push_argument();
        instructions += self.build_expression(value)?;
        instructions += self.base.store_local(TokenPosition::NO_SOURCE, result);
        instructions += self.base.push_argument();
        instructions += self
            .base
            .instance_call(position, &setter, Token::Set, CallShape::positional(2), 1, None);
        instructions += self.base.drop();
        Ok(instructions)
    }

    fn build_method_invocation(
        &mut self,
        position: TokenPosition,
        receiver: &'a Expression,
        name: &'a Name,
        arguments: &'a Arguments,
        interface_target: Option<NameIndex>,
    ) -> BuildResult<Fragment> {
        let selector = self.helper.dynamic_name(name);
        if self.is_null_comparison(&selector, arguments) {
            return self.build_null_comparison(&selector, receiver, arguments);
        }

        let mut instructions = self.build_type_arguments(arguments);
        instructions += self.build_expression(receiver)?;
        instructions += self.base.push_argument();
        let (values, names) = self.build_argument_values(arguments)?;
        instructions += values;

        let token = Token::from_method_name(&selector);
        let target = interface_target.and_then(|t| self.helper.lookup_function(t).ok());
        let shape = CallShape::new(arguments.type_arguments.len(), arguments.count() + 1, names);
        instructions += self
            .base
            .instance_call(position, &selector, token, shape, token.checked_argument_count(), target);
        Ok(instructions)
    }

    /// Implicit accessor `prefix + field name` declared next to the field
    fn field_accessor(
        &self,
        position: TokenPosition,
        target: NameIndex,
        prefix: &str,
    ) -> BuildResult<FunctionId> {
        let store = self.helper.store();
        let field = self.helper.lookup_field(target).map_err(self.located(position))?;
        let field = store.field(field);
        let name = format!("{}{}", prefix, field.name);
        store
            .lookup_function(field.owner, &name)
            .ok_or_else(|| self.report_error(position, format!("field '{}' has no accessor '{}'", field.name, name)))
    }

    fn procedure_kind(
        &self,
        target: NameIndex,
    ) -> Option<ProcedureKind> {
        match self.helper.reader().member(target) {
            Some(MemberRef::Procedure(procedure)) => Some(procedure.kind),
            _ => None,
        }
    }

    fn build_direct_property_get(
        &mut self,
        position: TokenPosition,
        receiver: &'a Expression,
        target: NameIndex,
    ) -> BuildResult<Fragment> {
        let function = match self.procedure_kind(target) {
            Some(ProcedureKind::Getter) => self.helper.lookup_function(target).map_err(self.located(position))?,
            Some(_) => {
                // 方法拆分：闭包的上下文保存接收者
                let method = self.helper.lookup_function(target).map_err(self.located(position))?;
                let closure = self.helper.store().function(method).implicit_closure.ok_or_else(|| {
                    let name = self.helper.member_name(target);
                    self.report_error(position, format!("'{}' cannot be torn off", name))
                })?;
                let mut instructions = self.build_expression(receiver)?;
                let receiver = self.base.make_temporary();
                instructions += self.build_implicit_closure_creation(closure, receiver);
                instructions += self.base.drop_temps_preserve_top(1);
                return Ok(instructions);
            }
            None => self.field_accessor(position, target, GETTER_PREFIX)?,
        };
        let mut instructions = self.build_expression(receiver)?;
        instructions += self.base.push_argument();
        instructions += self.base.static_call(position, function, CallShape::positional(1));
        Ok(instructions)
    }

    fn build_direct_property_set(
        &mut self,
        position: TokenPosition,
        receiver: &'a Expression,
        target: NameIndex,
        value: &'a Expression,
    ) -> BuildResult<Fragment> {
        let function = match self.procedure_kind(target) {
            Some(_) => self.helper.lookup_function(target).map_err(self.located(position))?,
            None => self.field_accessor(position, target, SETTER_PREFIX)?,
        };
        let mut instructions = self.base.null_constant();
        let result = self.base.make_temporary();
        instructions += self.build_expression(receiver)?;
        instructions += self.base.push_argument();
        instructions += self.build_expression(value)?;
        instructions += self.base.store_local(TokenPosition::NO_SOURCE, result);
        instructions += self.base.push_argument();
        instructions += self.base.static_call(position, function, CallShape::positional(2));
        instructions += self.base.drop();
        Ok(instructions)
    }

    fn build_direct_method_invocation(
        &mut self,
        position: TokenPosition,
        receiver: &'a Expression,
        target: NameIndex,
        arguments: &'a Arguments,
    ) -> BuildResult<Fragment> {
        let selector = self.helper.name_string(target);
        if self.is_null_comparison(selector, arguments) {
            return self.build_null_comparison(selector, receiver, arguments);
        }
        let function = self.helper.lookup_function(target).map_err(self.located(position))?;
        let mut instructions = self.build_type_arguments(arguments);
        instructions += self.build_expression(receiver)?;
        instructions += self.base.push_argument();
        let (values, names) = self.build_argument_values(arguments)?;
        instructions += values;
        let shape = CallShape::new(arguments.type_arguments.len(), arguments.count() + 1, names);
        instructions += self.base.static_call(position, function, shape);
        Ok(instructions)
    }

    /// Statically bound call of the superclass implementation
    fn build_super_method_invocation(
        &mut self,
        position: TokenPosition,
        name: &'a Name,
        arguments: &'a Arguments,
    ) -> BuildResult<Fragment> {
        let store = self.helper.store();
        let selector = self.helper.dynamic_name(name);
        let super_class = self
            .active_class
            .class
            .and_then(|class| store.class(class).super_class)
            .ok_or_else(|| self.report_error(position, "super call in a class without a superclass"))?;
        let target = store
            .resolve_dynamic(super_class, &selector)
            .ok_or_else(|| self.report_error(position, format!("no superclass method '{}'", selector)))?;
        let this = self
            .scopes
            .this_variable
            .filter(|&this| self.is_accessible(this))
            .ok_or_else(|| self.report_error(position, "super call outside an instance member"))?;

        let mut instructions = self.build_type_arguments(arguments);
        instructions += self.base.load_local(this);
        instructions += self.base.push_argument();
        let (values, names) = self.build_argument_values(arguments)?;
        instructions += values;
        let shape = CallShape::new(arguments.type_arguments.len(), arguments.count() + 1, names);
        instructions += self.base.static_call(position, target, shape);
        Ok(instructions)
    }

    // ===== 静态成员 =====

    fn build_static_get(
        &mut self,
        expression: &'a Expression,
        target: NameIndex,
    ) -> BuildResult<Fragment> {
        let position = expression.position;
        let store = self.helper.store();
        match self.helper.lookup_static_member(target).map_err(self.located(position))? {
            StaticMember::Field(field) => {
                let f = store.field(field);
                if f.is_const {
                    return self.build_constant_expression(expression);
                }
                if self.helper.is_deferred(target) {
                    // 延迟加载的库：首次访问时初始化
                    let mut instructions = self.base.init_static_field(field);
                    instructions += self.base.constant(ConstantValue::Field(field));
                    instructions += self.base.load_static_field();
                    return Ok(instructions);
                }
                let getter = format!("{}{}", GETTER_PREFIX, f.name);
                match store.lookup_function(f.owner, &getter) {
                    Some(getter) if f.has_initializer => {
                        Ok(self.base.static_call(position, getter, CallShape::positional(0)))
                    }
                    _ => {
                        let mut instructions = self.base.constant(ConstantValue::Field(field));
                        instructions += self.base.load_static_field();
                        Ok(instructions)
                    }
                }
            }
            StaticMember::Function(function) => match self.procedure_kind(target) {
                Some(ProcedureKind::Getter) => Ok(self.base.static_call(position, function, CallShape::positional(0))),
                Some(ProcedureKind::Method) => self.build_constant_expression(expression),
                _ => {
                    let name = self.helper.member_name(target);
                    Err(self.report_error(position, format!("cannot read static member '{}'", name)))
                }
            },
        }
    }

    /// The stored value is the result
    fn build_static_set(
        &mut self,
        position: TokenPosition,
        target: NameIndex,
        value: &'a Expression,
    ) -> BuildResult<Fragment> {
        match self.helper.lookup_static_member(target).map_err(self.located(position))? {
            StaticMember::Field(field) => {
                let (ty, name) = {
                    let f = self.helper.store().field(field);
                    (f.static_type.clone(), f.name.clone())
                };
                let mut instructions = self.build_expression(value)?;
                instructions = self.base.debug_step_check(position) + instructions;
                instructions += self.check_assignable(position, &ty, &name);
                let variable = self.base.make_temporary();
                instructions += self.base.load_local(variable);
                instructions += self.base.store_static_field(position, field);
                Ok(instructions)
            }
            StaticMember::Function(setter) => {
                let mut instructions = self.build_expression(value)?;
                let variable = self.base.make_temporary();
                instructions += self.base.load_local(variable);
                instructions += self.base.push_argument();
                instructions += self.base.static_call(position, setter, CallShape::positional(1));
                instructions += self.base.drop();
                Ok(instructions)
            }
        }
    }

    /// Top-level `identical(a, b)` of the core library
    fn is_identical(
        &self,
        function: FunctionId,
        arguments: &Arguments,
    ) -> bool {
        let store = self.helper.store();
        let f = store.function(function);
        let owner = store.class(f.owner);
        f.name == "identical"
            && owner.is_toplevel()
            && store.library(owner.library).uri == CORE_LIBRARY_URI
            && arguments.positional.len() == 2
            && arguments.named.is_empty()
    }

    fn build_static_invocation(
        &mut self,
        position: TokenPosition,
        target: NameIndex,
        arguments: &'a Arguments,
    ) -> BuildResult<Fragment> {
        let function = self.helper.lookup_function(target).map_err(self.located(position))?;
        if self.is_identical(function, arguments) {
            let mut instructions = self.build_expression(&arguments.positional[0])?;
            instructions += self.build_expression(&arguments.positional[1])?;
            instructions += self.base.strict_compare(Token::EqStrict, true);
            return Ok(instructions);
        }

        let (kind, owner) = {
            let f = self.helper.store().function(function);
            (f.kind, f.owner)
        };
        let mut instructions = self.base.empty();
        let mut type_args_len = 0;
        let mut argument_count = arguments.count();
        if kind == FunctionKind::Factory {
            // 工厂的第一个参数是类的类型参数
            instructions += self.build_class_type_arguments(owner, &arguments.type_arguments);
            instructions += self.base.push_argument();
            argument_count += 1;
        } else if !arguments.type_arguments.is_empty() {
            type_args_len = arguments.type_arguments.len();
            instructions += self.build_type_arguments(arguments);
        }
        let (values, names) = self.build_argument_values(arguments)?;
        instructions += values;
        let shape = CallShape::new(type_args_len, argument_count, names);
        instructions += self.base.static_call(position, function, shape);
        Ok(instructions)
    }

    /// Allocate, run the constructor on the new object, leave the object
    fn build_constructor_invocation(
        &mut self,
        position: TokenPosition,
        target: NameIndex,
        arguments: &'a Arguments,
    ) -> BuildResult<Fragment> {
        let store = self.helper.store();
        let constructor = self.helper.lookup_function(target).map_err(self.located(position))?;
        let class = store.function(constructor).owner;
        if store.class(class).is_abstract {
            let name = &store.class(class).name;
            return Err(self.report_error(position, format!("cannot instantiate abstract class '{}'", name)));
        }

        let mut instructions = if store.class(class).is_generic() {
            let mut instructions = self.build_class_type_arguments(class, &arguments.type_arguments);
            instructions += self.base.push_argument();
            instructions += self.base.allocate_object(position, class, None, 1);
            instructions
        } else {
            self.base.allocate_object(position, class, None, 0)
        };
        let object = self.base.make_temporary();
        instructions += self.base.load_local(object);
        instructions += self.base.push_argument();
        let (values, names) = self.build_argument_values(arguments)?;
        instructions += values;
        let shape = CallShape::new(0, arguments.count() + 1, names);
        instructions += self.base.static_call(position, constructor, shape);
        instructions += self.base.drop();
        Ok(instructions)
    }

    // ===== 控制流表达式 =====

    fn expression_temp(&self) -> VarId {
        match self.function_scope().expression_temp {
            Some(variable) => variable,
            None => panic!("expression temp not allocated"),
        }
    }

    /// `a && b` / `a || b`; both arms store into the expression temp
    fn build_logical(
        &mut self,
        left: &'a Expression,
        operator: LogicalOperator,
        right: &'a Expression,
    ) -> BuildResult<Fragment> {
        let temp = self.expression_temp();
        let (mut instructions, negate) = self.translate_condition(left)?;
        let (branch, then, otherwise) = self.base.branch_if_true(negate);
        instructions += branch;
        let (right_entry, constant_entry) = match operator {
            LogicalOperator::And => (then, otherwise),
            LogicalOperator::Or => (otherwise, then),
        };

        let mut right_fragment = Fragment::from_instr(self.base.graph(), right_entry);
        let (condition, negate) = self.translate_condition(right)?;
        right_fragment += condition;
        right_fragment += self.base.bool_constant(true);
        let kind = if negate { Token::NeStrict } else { Token::EqStrict };
        right_fragment += self.base.strict_compare(kind, false);
        right_fragment += self.base.store_local(TokenPosition::NO_SOURCE, temp);
        right_fragment += self.base.drop();

        let mut constant_fragment = Fragment::from_instr(self.base.graph(), constant_entry);
        constant_fragment += self.base.bool_constant(operator == LogicalOperator::Or);
        constant_fragment += self.base.store_local(TokenPosition::NO_SOURCE, temp);
        constant_fragment += self.base.drop();

        let join = self.base.build_join_entry();
        right_fragment += self.base.goto(join);
        constant_fragment += self.base.goto(join);

        let mut instructions = instructions.continue_at(join);
        instructions += self.base.load_local(temp);
        Ok(instructions)
    }

    fn build_conditional(
        &mut self,
        condition: &'a Expression,
        then: &'a Expression,
        otherwise: &'a Expression,
    ) -> BuildResult<Fragment> {
        let temp = self.expression_temp();
        let (mut instructions, negate) = self.translate_condition(condition)?;
        let (branch, then_entry, otherwise_entry) = self.base.branch_if_true(negate);
        instructions += branch;

        let join = self.base.build_join_entry();
        for (entry, arm) in [(then_entry, then), (otherwise_entry, otherwise)] {
            let mut fragment = Fragment::from_instr(self.base.graph(), entry);
            fragment += self.build_expression(arm)?;
            fragment += self.base.store_local(TokenPosition::NO_SOURCE, temp);
            fragment += self.base.drop();
            fragment += self.base.goto(join);
        }

        let mut instructions = instructions.continue_at(join);
        instructions += self.base.load_local(temp);
        Ok(instructions)
    }

    // ===== 字符串与集合 =====

    fn build_string_concatenation(
        &mut self,
        position: TokenPosition,
        parts: &'a [Expression],
    ) -> BuildResult<Fragment> {
        let core = self.helper.store().core();
        match parts {
            [] => Ok(self.base.constant(ConstantValue::String(String::new()))),
            [single] => {
                let interpolate_single = core.interpolate_single;
                let mut instructions = self.build_expression(single)?;
                instructions += self.base.push_argument();
                instructions += self
                    .base
                    .static_call(position, interpolate_single, CallShape::positional(1));
                Ok(instructions)
            }
            _ => {
                let mut instructions = self.build_array(parts.iter(), ConstantValue::Null)?;
                instructions += self.base.string_interpolate(position);
                Ok(instructions)
            }
        }
    }

    /// Allocate an array and store `elements` into it; the array is left on
    /// the stack
    fn build_array(
        &mut self,
        elements: impl ExactSizeIterator<Item = &'a Expression>,
        element_type: ConstantValue,
    ) -> BuildResult<Fragment> {
        let mut instructions = self.base.constant(element_type);
        instructions += self.base.int_constant(elements.len() as i64);
        instructions += self.base.create_array();
        let array = self.base.make_temporary();
        for (index, element) in elements.enumerate() {
            instructions += self.base.load_local(array);
            instructions += self.base.int_constant(index as i64);
            instructions += self.build_expression(element)?;
            instructions += self.base.store_indexed();
        }
        Ok(instructions)
    }

    /// `GrowableList.literal<E>(array)`
    fn build_list_literal(
        &mut self,
        position: TokenPosition,
        element_type: &KernelType,
        elements: &'a [Expression],
    ) -> BuildResult<Fragment> {
        let factory = self.helper.store().core().growable_list_literal;
        let element_type = self.translate_type(element_type);
        let mut instructions = self.translate_instantiated_type_arguments(vec![element_type.clone()]);
        instructions += self.base.push_argument();
        instructions += if elements.is_empty() {
            self.base.constant(ConstantValue::Array(Vec::new()))
        } else {
            self.build_array(elements.iter(), ConstantValue::TypeArguments(vec![element_type]))?
        };
        instructions += self.base.push_argument();
        instructions += self.base.static_call(position, factory, CallShape::positional(2));
        Ok(instructions)
    }

    /// `LinkedHashMap.fromLiteral<K, V>([k0, v0, k1, v1, ...])`
    fn build_map_literal(
        &mut self,
        position: TokenPosition,
        key_type: &KernelType,
        value_type: &KernelType,
        entries: &'a [MapEntry],
    ) -> BuildResult<Fragment> {
        let factory = self.helper.store().core().map_from_literal;
        let type_arguments = vec![self.translate_type(key_type), self.translate_type(value_type)];
        let mut instructions = self.translate_instantiated_type_arguments(type_arguments);
        instructions += self.base.push_argument();
        instructions += if entries.is_empty() {
            self.base.constant(ConstantValue::Array(Vec::new()))
        } else {
            let flattened = entries.iter().flat_map(|entry| [&entry.key, &entry.value]).collect::<Vec<_>>();
            self.build_array(flattened.into_iter(), ConstantValue::Null)?
        };
        instructions += self.base.push_argument();
        instructions += self.base.static_call(position, factory, CallShape::positional(2));
        Ok(instructions)
    }

    // ===== 类型测试 =====

    fn build_is(
        &mut self,
        position: TokenPosition,
        operand: &'a Expression,
        ty: &KernelType,
    ) -> BuildResult<Fragment> {
        let ty = self.translate_type(ty);
        let mut instructions = self.build_expression(operand)?;
        if ty.is_instantiated() && self.is_top_type(&ty) {
            // 任何值都是顶类型的实例
            instructions += self.base.drop();
            instructions += self.base.bool_constant(true);
        } else {
            instructions += self.instance_of(position, ty);
        }
        Ok(instructions)
    }

    fn build_as(
        &mut self,
        position: TokenPosition,
        operand: &'a Expression,
        ty: &KernelType,
        is_type_error: bool,
    ) -> BuildResult<Fragment> {
        let ty = self.translate_type(ty);
        let mut instructions = self.build_expression(operand)?;
        if ty.is_instantiated() && self.is_top_type(&ty) {
            return Ok(instructions);
        }
        if is_type_error {
            // 隐式转换：检查副本，保留原值
            let value = self.base.make_temporary();
            instructions += self.base.load_local(value);
            instructions += self.assert_assignable(position, &ty, "");
            instructions += self.base.drop();
        } else {
            instructions += self.assert_assignable(position, &ty, "");
        }
        Ok(instructions)
    }

    fn build_type_literal(
        &mut self,
        position: TokenPosition,
        ty: &KernelType,
    ) -> BuildResult<Fragment> {
        let ty = self.translate_type(ty);
        if ty.is_malformed() {
            return Err(self.report_error(position, format!("malformed type literal {}", ty)));
        }
        if ty.is_instantiated() {
            return Ok(self.base.constant(ConstantValue::Type(ty)));
        }
        let mut instructions = self.load_type_arguments_for(&ty);
        instructions += self.base.instantiate_type(position, ty);
        Ok(instructions)
    }

    fn build_rethrow(
        &mut self,
        position: TokenPosition,
    ) -> BuildResult<Fragment> {
        let Some(catch_block) = self.base.control.catch_block().cloned() else {
            return Err(self.report_error(position, "rethrow outside of a catch clause"));
        };
        let mut instructions = self.base.load_local(catch_block.exception_var);
        instructions += self.base.load_local(catch_block.stack_trace_var);
        instructions += self
            .base
            .rethrow_exception(position, Some(catch_block.catch_try_index));
        Ok(instructions)
    }

    // ===== 闭包 =====

    /// Allocate the closure of a local function; it captures the current
    /// context and the type arguments in scope
    pub(crate) fn build_closure(
        &mut self,
        node: &'a FunctionNode,
    ) -> BuildResult<Fragment> {
        let store = self.helper.store();
        let function = store
            .function_at(node.offset)
            .ok_or_else(|| self.report_error(node.position, format!("no function for closure {}", node.offset)))?;
        trace!(closure = %store.qualified_name(function), "closure creation");
        let closure_class = store.core().closure;

        let mut instructions = self.base.allocate_object(node.position, closure_class, Some(function), 0);
        let closure = self.base.make_temporary();
        if !self.active_class.class_type_parameters.is_empty() {
            instructions += self.base.load_local(closure);
            instructions += self.load_instantiator_type_arguments();
            instructions +=
                self.base
                    .store_instance_field(TokenPosition::NO_SOURCE, Slot::ClosureInstantiatorTypeArguments, true);
        }
        instructions += self.base.load_local(closure);
        instructions += self.load_function_type_arguments();
        instructions += self
            .base
            .store_instance_field(TokenPosition::NO_SOURCE, Slot::ClosureFunctionTypeArguments, true);
        instructions += self.base.load_local(closure);
        instructions += self.base.constant(ConstantValue::Function(function));
        instructions += self
            .base
            .store_instance_field(TokenPosition::NO_SOURCE, Slot::ClosureFunction, true);
        instructions += self.base.load_local(closure);
        instructions += self.base.load_local_raw(self.base.context_variable);
        instructions += self
            .base
            .store_instance_field(TokenPosition::NO_SOURCE, Slot::ClosureContext, true);
        Ok(instructions)
    }

    /// Closure of the torn-off method `target`; a fresh one-slot context
    /// holds `receiver`
    pub(crate) fn build_implicit_closure_creation(
        &mut self,
        closure_function: FunctionId,
        receiver: VarId,
    ) -> Fragment {
        let closure_class = self.helper.store().core().closure;
        let mut instructions = self
            .base
            .allocate_object(TokenPosition::NO_SOURCE, closure_class, Some(closure_function), 0);
        let closure = self.base.make_temporary();
        if !self.active_class.class_type_parameters.is_empty() {
            instructions += self.base.load_local(closure);
            instructions += self.load_instantiator_type_arguments();
            instructions +=
                self.base
                    .store_instance_field(TokenPosition::NO_SOURCE, Slot::ClosureInstantiatorTypeArguments, true);
        }
        instructions += self.base.allocate_context(1);
        let context = self.base.make_temporary();
        instructions += self.base.load_local(closure);
        instructions += self.base.constant(ConstantValue::Function(closure_function));
        instructions += self
            .base
            .store_instance_field(TokenPosition::NO_SOURCE, Slot::ClosureFunction, true);
        instructions += self.base.load_local(closure);
        instructions += self.base.load_local(context);
        instructions += self
            .base
            .store_instance_field(TokenPosition::NO_SOURCE, Slot::ClosureContext, true);
        // 上下文仍在栈顶，存入接收者后被消耗
        instructions += self.base.load_local(receiver);
        instructions += self
            .base
            .store_instance_field(TokenPosition::NO_SOURCE, Slot::ContextVariable(0), true);
        instructions
    }
}
