//! 语句翻译
//!
//! Every statement becomes a [`Fragment`]. A closed fragment ends in a
//! control transfer; the caller stops appending to it. Jumps out of
//! try/finally regions inline the pending finalizers at the jump site.

use crate::frontend::control_stack::FrameId;
use crate::frontend::error::BuildResult;
use crate::frontend::flow_graph_builder::{FlowGraphBuilder, YieldContinuation};
use crate::frontend::fragment::Fragment;
use crate::frontend::scope::VarId;
use crate::il::instruction::{CallShape, ConstantValue, InstrId, InstrKind, Instruction, Token};
use crate::kernel::ast::{
    AsyncMarker, Catch, Expression, ExpressionKind, FunctionNode, Statement, StatementKind, SwitchCase,
    VariableDeclaration,
};
use crate::kernel::NodeOffset;
use crate::object::{AbstractType, FunctionKind};
use crate::util::span::TokenPosition;
use tracing::trace;

impl<'a> FlowGraphBuilder<'a> {
    pub(crate) fn build_statement(
        &mut self,
        statement: &'a Statement,
    ) -> BuildResult<Fragment> {
        let position = statement.position;
        match &statement.kind {
            StatementKind::Expression(expression) => {
                let mut instructions = self.build_expression(expression)?;
                instructions += self.base.drop();
                Ok(instructions)
            }
            StatementKind::Block(statements) => self.build_block(statement.offset, statements),
            StatementKind::Empty => Ok(self.base.empty()),
            StatementKind::Assert { condition, message } => self.build_assert(position, condition, message.as_ref()),
            StatementKind::Labeled(body) => self.build_labeled(body),
            StatementKind::Break { label } => self.build_break(*label),
            StatementKind::While { condition, body } => {
                self.loop_depth += 1;
                let result = self.build_while(position, condition, body);
                self.loop_depth -= 1;
                result
            }
            StatementKind::Do { body, condition } => {
                self.loop_depth += 1;
                let result = self.build_do(position, body, condition);
                self.loop_depth -= 1;
                result
            }
            StatementKind::For {
                variables,
                condition,
                updates,
                body,
            } => self.build_for(statement.offset, position, variables, condition.as_ref(), updates, body),
            StatementKind::ForIn {
                variable,
                iterable,
                body,
                is_async,
            } => {
                if *is_async {
                    return Err(self.report_error(position, "asynchronous for-in loops must be desugared"));
                }
                self.build_for_in(statement.offset, position, variable, iterable, body)
            }
            StatementKind::Switch { condition, cases } => self.build_switch(condition, cases),
            StatementKind::ContinueSwitch { target } => self.build_continue_switch(position, *target),
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => self.build_if(condition, then, otherwise.as_deref()),
            StatementKind::Return(value) => self.build_return(position, value.as_ref()),
            StatementKind::TryCatch { body, catches } => self.build_try_catch(body, catches),
            StatementKind::TryFinally { body, finalizer } => self.build_try_finally(body, finalizer),
            StatementKind::Yield { expression, is_native } => {
                if !*is_native {
                    return Err(self.report_error(position, "yield statements must be desugared"));
                }
                self.build_yield(position, expression)
            }
            StatementKind::VariableDeclaration(declaration) => self.build_variable_declaration(declaration),
            StatementKind::FunctionDeclaration { variable, function } => {
                self.build_function_declaration(position, variable, function)
            }
        }
    }

    fn build_block(
        &mut self,
        offset: NodeOffset,
        statements: &'a [Statement],
    ) -> BuildResult<Fragment> {
        let mut instructions = self.enter_scope(offset);
        for statement in statements {
            if instructions.is_closed() {
                break;
            }
            instructions += self.build_statement(statement)?;
        }
        let open = instructions.is_open();
        instructions += self.exit_scope(offset, open);
        Ok(instructions)
    }

    /// `assert(condition, message)` calls `AssertionError.throwNew` when the
    /// condition does not hold
    fn build_assert(
        &mut self,
        position: TokenPosition,
        condition: &'a Expression,
        message: Option<&'a Expression>,
    ) -> BuildResult<Fragment> {
        if !self.base.config.enable_asserts {
            return Ok(self.base.empty());
        }
        let core = self.helper.store().core();
        let (evaluate, throw_new) = (core.evaluate_assertion, core.assertion_throw_new);

        let mut instructions = self.build_expression(condition)?;
        instructions += self.base.push_argument();
        instructions += self.base.static_call(condition.position, evaluate, CallShape::positional(1));
        instructions += self.check_boolean();
        let (branch, then, otherwise) = self.base.branch_if_true(false);
        instructions += branch;

        let after_assert = self.base.build_join_entry();
        let mut then_fragment = Fragment::from_instr(self.base.graph(), then);
        then_fragment += self.base.goto(after_assert);

        let mut failure = Fragment::from_instr(self.base.graph(), otherwise);
        failure += self.base.int_constant(position.value() as i64);
        failure += self.base.push_argument();
        failure += self.base.int_constant(condition.position.value() as i64);
        failure += self.base.push_argument();
        failure += match message {
            Some(message) => self.build_expression(message)?,
            None => self.base.null_constant(),
        };
        failure += self.base.push_argument();
        failure += self.base.static_call(position, throw_new, CallShape::positional(3));
        failure += self.base.drop();
        failure += self.base.goto(after_assert);

        Ok(instructions.continue_at(after_assert))
    }

    fn build_labeled(
        &mut self,
        body: &'a Statement,
    ) -> BuildResult<Fragment> {
        let frame = self.base.control.enter_breakable(self.base.context_depth);
        self.with_frame(frame, |b| {
            let mut instructions = b.build_statement(body)?;
            if let Some(join) = b.base.control.breakable_destination(frame) {
                if instructions.is_open() {
                    instructions += b.base.goto(join);
                }
                instructions = match instructions.entry {
                    Some(_) => instructions.continue_at(join),
                    None => Fragment::from_instr(b.base.graph(), join),
                };
            }
            Ok(instructions)
        })
    }

    fn build_break(
        &mut self,
        label: usize,
    ) -> BuildResult<Fragment> {
        let destination = self.base.break_destination(label);
        let mut instructions =
            self.translate_finally_finalizers(destination.outer_finally, Some(destination.context_depth))?;
        if instructions.is_open() {
            instructions += self.base.goto(destination.join);
        }
        Ok(instructions)
    }

    // ===== 循环 =====

    /// Condition with a leading `!` folded into the branch
    pub(crate) fn translate_condition(
        &mut self,
        condition: &'a Expression,
    ) -> BuildResult<(Fragment, bool)> {
        let (expression, negate) = match &condition.kind {
            ExpressionKind::Not(operand) => (&**operand, true),
            _ => (condition, false),
        };
        let mut instructions = self.build_expression(expression)?;
        instructions += self.check_boolean();
        Ok((instructions, negate))
    }

    fn build_while(
        &mut self,
        position: TokenPosition,
        condition: &'a Expression,
        body: &'a Statement,
    ) -> BuildResult<Fragment> {
        let (mut test, negate) = self.translate_condition(condition)?;
        let (branch, body_entry, loop_exit) = self.base.branch_if_true(negate);
        test += branch;
        let Some(test_entry) = test.entry else {
            unreachable!("a branch always emits instructions");
        };

        let mut body_fragment = Fragment::from_instr(self.base.graph(), body_entry);
        body_fragment += self.build_statement(body)?;

        let entry = if body_fragment.is_open() {
            let join = self.base.build_join_entry();
            body_fragment += self.base.goto(join);
            let mut loop_head = Fragment::from_instr(self.base.graph(), join);
            loop_head += self.base.check_stack_overflow(position, self.loop_depth);
            loop_head += test;
            self.enter_loop(join)
        } else {
            test_entry
        };
        Ok(Fragment::with_bounds(self.base.graph(), entry, loop_exit))
    }

    fn build_do(
        &mut self,
        position: TokenPosition,
        body: &'a Statement,
        condition: &'a Expression,
    ) -> BuildResult<Fragment> {
        let body_fragment = self.build_statement(body)?;
        if body_fragment.is_closed() {
            return Ok(body_fragment);
        }

        let join = self.base.build_join_entry();
        let mut loop_body = Fragment::from_instr(self.base.graph(), join);
        loop_body += self.base.check_stack_overflow(position, self.loop_depth);
        loop_body += body_fragment;
        let (test, negate) = self.translate_condition(condition)?;
        loop_body += test;
        let (branch, repeat, loop_exit) = self.base.branch_if_true(negate);
        loop_body += branch;

        let mut back_edge = Fragment::from_instr(self.base.graph(), repeat);
        back_edge += self.base.goto(join);

        let entry = self.enter_loop(join);
        Ok(Fragment::with_bounds(self.base.graph(), entry, loop_exit))
    }

    /// Unlinked goto that enters a loop at `join`
    fn enter_loop(
        &mut self,
        join: InstrId,
    ) -> InstrId {
        self.base.add_instruction(Instruction::new(InstrKind::Goto { target: join }))
    }

    fn build_for(
        &mut self,
        offset: NodeOffset,
        position: TokenPosition,
        variables: &'a [VariableDeclaration],
        condition: Option<&'a Expression>,
        updates: &'a [Expression],
        body: &'a Statement,
    ) -> BuildResult<Fragment> {
        let context_size = self.scopes.scope_at(offset).map_or(0, |s| s.num_context_variables);
        let mut declarations = self.enter_scope(offset);
        for variable in variables {
            declarations += self.build_variable_declaration(variable)?;
        }

        self.loop_depth += 1;
        let result = self.build_for_loop(position, declarations, context_size, condition, updates, body);
        self.loop_depth -= 1;
        let mut instructions = result?;
        instructions += self.exit_scope(offset, true);
        Ok(instructions)
    }

    fn build_for_loop(
        &mut self,
        position: TokenPosition,
        mut declarations: Fragment,
        context_size: usize,
        condition: Option<&'a Expression>,
        updates: &'a [Expression],
        body: &'a Statement,
    ) -> BuildResult<Fragment> {
        let (mut test, negate) = match condition {
            Some(condition) => self.translate_condition(condition)?,
            None => (self.base.bool_constant(true), false),
        };
        let (branch, body_entry, loop_exit) = self.base.branch_if_true(negate);
        test += branch;

        let mut update_fragment = self.base.empty();
        for update in updates {
            update_fragment += self.build_expression(update)?;
            update_fragment += self.base.drop();
        }

        let mut body_fragment = Fragment::from_instr(self.base.graph(), body_entry);
        body_fragment += self.build_statement(body)?;

        if body_fragment.is_open() {
            // 每次迭代使用新的上下文副本
            if context_size > 0 {
                body_fragment += self.base.clone_context(context_size);
            }
            body_fragment += update_fragment;
            let join = self.base.build_join_entry();
            declarations += self.base.goto(join);
            body_fragment += self.base.goto(join);

            let mut loop_head = Fragment::from_instr(self.base.graph(), join);
            loop_head += self.base.check_stack_overflow(position, self.loop_depth);
            loop_head += test;
        } else {
            declarations += test;
        }

        let Some(entry) = declarations.entry else {
            unreachable!("a loop always emits instructions");
        };
        Ok(Fragment::with_bounds(self.base.graph(), entry, loop_exit))
    }

    fn build_for_in(
        &mut self,
        offset: NodeOffset,
        position: TokenPosition,
        variable: &'a VariableDeclaration,
        iterable: &'a Expression,
        body: &'a Statement,
    ) -> BuildResult<Fragment> {
        let iterator = self.function_scope().iterator_variables[self.for_in_depth];
        let mut instructions = self.build_expression(iterable)?;
        instructions += self.base.push_argument();
        instructions += self
            .base
            .instance_call(iterable.position, "get:iterator", Token::Get, CallShape::positional(1), 1, None);
        instructions += self.base.store_local(TokenPosition::NO_SOURCE, iterator);
        instructions += self.base.drop();

        self.for_in_depth += 1;
        self.loop_depth += 1;
        let result = self.build_for_in_loop(offset, position, iterator, variable, iterable.position, body, instructions);
        self.loop_depth -= 1;
        self.for_in_depth -= 1;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn build_for_in_loop(
        &mut self,
        offset: NodeOffset,
        position: TokenPosition,
        iterator: VarId,
        variable: &'a VariableDeclaration,
        iterable_position: TokenPosition,
        body: &'a Statement,
        mut instructions: Fragment,
    ) -> BuildResult<Fragment> {
        let mut test = self.base.load_local(iterator);
        test += self.base.push_argument();
        test += self
            .base
            .instance_call(iterable_position, "moveNext", Token::Illegal, CallShape::positional(1), 1, None);
        let (branch, body_entry, loop_exit) = self.base.branch_if_true(false);
        test += branch;

        let mut body_fragment = Fragment::from_instr(self.base.graph(), body_entry);
        body_fragment += self.enter_scope(offset);
        body_fragment += self.base.load_local(iterator);
        body_fragment += self.base.push_argument();
        body_fragment += self
            .base
            .instance_call(position, "get:current", Token::Get, CallShape::positional(1), 1, None);
        let loop_variable = self.scopes.local(variable.offset);
        body_fragment += self.base.store_local(TokenPosition::NO_SOURCE, loop_variable);
        body_fragment += self.base.drop();
        body_fragment += self.build_statement(body)?;
        let open = body_fragment.is_open();
        body_fragment += self.exit_scope(offset, open);

        if body_fragment.is_open() {
            let join = self.base.build_join_entry();
            instructions += self.base.goto(join);
            body_fragment += self.base.goto(join);
            let mut loop_head = Fragment::from_instr(self.base.graph(), join);
            loop_head += self.base.check_stack_overflow(position, self.loop_depth);
            loop_head += test;
        } else {
            instructions += test;
        }
        Ok(instructions.continue_at(loop_exit))
    }

    // ===== switch =====

    fn build_switch(
        &mut self,
        condition: &'a Expression,
        cases: &'a [SwitchCase],
    ) -> BuildResult<Fragment> {
        let Some(switch_variable) = self.function_scope().switch_variable else {
            return Err(self.report_error(condition.position, "switch without a switch variable"));
        };
        let mut head = self.build_expression(condition)?;
        head += self.base.store_local(TokenPosition::NO_SOURCE, switch_variable);
        head += self.base.drop();

        let frame = self.base.control.enter_switch(cases.len(), self.base.context_depth);
        self.with_frame(frame, |b| b.build_switch_cases(frame, switch_variable, head, cases))
    }

    /// First the case bodies, then the chain of comparisons that selects one.
    /// Bodies reached from more than one place get a join in front.
    fn build_switch_cases(
        &mut self,
        frame: FrameId,
        switch_variable: VarId,
        head: Fragment,
        cases: &'a [SwitchCase],
    ) -> BuildResult<Fragment> {
        let case_count = cases.len();
        let default_case = cases.iter().position(|c| c.is_default);
        if let Some(index) = default_case {
            if index + 1 != case_count {
                return Err(self.report_error(cases[index].body.position, "default must be the last switch case"));
            }
        }

        let mut bodies = Vec::with_capacity(case_count);
        for (i, case) in cases.iter().enumerate() {
            let mut body = self.build_statement(&case.body)?;
            if body.is_empty() {
                body += self.base.null_constant();
                body += self.base.drop();
            }
            if !case.is_default && body.is_open() && i + 1 < case_count {
                body += self.build_fall_through_error();
            }
            if case.expressions.len() > 1 {
                self.base.switch_destination_direct(frame, i);
            }
            bodies.push(body);
        }

        let Some(head_entry) = head.entry else {
            unreachable!("switch head stores the switch variable");
        };
        let mut current = head;
        for (i, case) in cases.iter().enumerate() {
            let body_join = if self.base.control.switch_had_jumper(frame, i) {
                let join = self.base.switch_destination_direct(frame, i).join;
                let joined = Fragment::from_instr(self.base.graph(), join) + bodies[i].clone();
                bodies[i] = joined;
                Some(join)
            } else {
                None
            };

            if Some(i) == default_case {
                // 默认分支的表达式只做常量检查
                for expression in &case.expressions {
                    self.evaluate_case_expression(expression)?;
                }
                match body_join {
                    Some(join) => {
                        current += self.base.goto(join);
                        // switch 之后的代码接在默认分支体之后
                        current = bodies[i].clone();
                    }
                    None => current += bodies[i].clone(),
                }
                continue;
            }

            for expression in &case.expressions {
                let value = self.evaluate_case_expression(expression)?;
                current += self.base.constant(value);
                current += self.base.push_argument();
                current += self.base.load_local(switch_variable);
                current += self.base.push_argument();
                current += self.equals_call(expression.position);
                let (branch, then, otherwise) = self.base.branch_if_true(false);
                current += branch;

                let mut then_fragment = Fragment::from_instr(self.base.graph(), then);
                then_fragment += match body_join {
                    Some(join) => self.base.goto(join),
                    None => bodies[i].clone(),
                };
                current = Fragment::from_instr(self.base.graph(), otherwise);
            }
        }

        if case_count > 0 && default_case.is_none() {
            // 最后一个 otherwise 与落空的最后一个分支汇合
            let last = case_count - 1;
            if bodies[last].is_open() {
                let join = self.base.build_join_entry();
                current += self.base.goto(join);
                bodies[last] += self.base.goto(join);
                current = Fragment::from_instr(self.base.graph(), join);
            }
        }

        trace!(cases = case_count, "switch");
        Ok(match current.current {
            Some(last) => Fragment::with_bounds(self.base.graph(), head_entry, last),
            None => Fragment::from_instr(self.base.graph(), head_entry).closed(),
        })
    }

    fn evaluate_case_expression(
        &self,
        expression: &'a Expression,
    ) -> BuildResult<ConstantValue> {
        self.evaluator()
            .evaluate_expression(expression, self.active_class.type_scope())
            .map_err(self.located(expression.position))
    }

    /// Falling off the end of a case is a runtime error
    fn build_fall_through_error(&mut self) -> Fragment {
        let create = self.helper.store().core().fall_through_create;
        let url = self.script.to_string();
        let mut instructions = self.base.constant(ConstantValue::String(url));
        instructions += self.base.push_argument();
        instructions += self.base.null_constant();
        instructions += self.base.push_argument();
        instructions += self.base.static_call(TokenPosition::NO_SOURCE, create, CallShape::positional(2));
        instructions += self.base.throw_exception(TokenPosition::NO_SOURCE);
        self.base.drop();
        instructions
    }

    fn build_continue_switch(
        &mut self,
        position: TokenPosition,
        target: usize,
    ) -> BuildResult<Fragment> {
        let destination = self.base.switch_destination(target);
        let mut instructions =
            self.translate_finally_finalizers(destination.outer_finally, Some(destination.context_depth))?;
        if instructions.is_open() {
            instructions += self.base.debug_step_check(position);
            instructions += self.base.goto(destination.join);
        }
        Ok(instructions)
    }

    fn build_if(
        &mut self,
        condition: &'a Expression,
        then: &'a Statement,
        otherwise: Option<&'a Statement>,
    ) -> BuildResult<Fragment> {
        let (mut instructions, negate) = self.translate_condition(condition)?;
        let (branch, then_entry, otherwise_entry) = self.base.branch_if_true(negate);
        instructions += branch;

        let mut then_fragment = Fragment::from_instr(self.base.graph(), then_entry);
        then_fragment += self.build_statement(then)?;
        let mut otherwise_fragment = Fragment::from_instr(self.base.graph(), otherwise_entry);
        if let Some(otherwise) = otherwise {
            otherwise_fragment += self.build_statement(otherwise)?;
        }

        Ok(match (then_fragment.current, otherwise_fragment.current) {
            (Some(_), Some(_)) => {
                let join = self.base.build_join_entry();
                then_fragment += self.base.goto(join);
                otherwise_fragment += self.base.goto(join);
                instructions.continue_at(join)
            }
            (Some(last), None) | (None, Some(last)) => instructions.continue_at(last),
            (None, None) => instructions,
        })
    }

    fn build_return(
        &mut self,
        position: TokenPosition,
        value: Option<&'a Expression>,
    ) -> BuildResult<Fragment> {
        let inside_try_finally = self.base.control.try_finally_top().is_some();
        let mut instructions = match value {
            Some(value) => self.build_expression(value)?,
            None => self.base.null_constant(),
        };
        if instructions.is_closed() {
            self.base.pop();
            return Ok(instructions);
        }
        instructions += self.check_return_value(position);

        if !inside_try_finally {
            instructions += self.base.return_(position);
            return Ok(instructions);
        }

        let Some(finally_return) = self.function_scope().finally_return_variable else {
            return Err(self.report_error(position, "return inside finally without a result variable"));
        };
        instructions += self.base.debug_step_check(position);
        instructions += self.base.store_local(position, finally_return);
        instructions += self.base.drop();
        instructions += self.translate_finally_finalizers(None, None)?;
        if instructions.is_open() {
            instructions += self.base.load_local(finally_return);
            instructions += self.base.return_(TokenPosition::NO_SOURCE);
        }
        Ok(instructions)
    }

    /// Checked mode verifies the result of ordinary synchronous functions
    fn check_return_value(
        &mut self,
        position: TokenPosition,
    ) -> Fragment {
        let function = self.helper.store().function(self.function);
        let checks_result = matches!(
            function.kind,
            FunctionKind::Regular | FunctionKind::Getter | FunctionKind::Closure | FunctionKind::Factory
        ) && function.async_marker == AsyncMarker::Sync;
        if !checks_result {
            return self.base.empty();
        }
        let result_type = function.result_type.clone();
        self.check_assignable(position, &result_type, "function result")
    }

    // ===== 异常处理 =====

    fn build_try_catch(
        &mut self,
        body: &'a Statement,
        catches: &'a [Catch],
    ) -> BuildResult<Fragment> {
        self.check_inlinable("try/catch")?;

        let try_index = self.base.allocate_try_index();
        let mut try_body = self.enter_try(try_index);
        let after_try = self.base.build_join_entry();

        self.try_depth += 1;
        let frame = self.base.control.enter_try_catch(try_index);
        let result = self.with_frame(frame, |b| b.build_statement(body));
        self.try_depth -= 1;
        try_body += result?;
        if try_body.is_open() {
            try_body += self.base.goto(after_try);
        }

        self.catch_depth += 1;
        let result = self.build_catch_handlers(try_index, after_try, catches);
        self.catch_depth -= 1;
        result?;

        Ok(try_body.continue_at(after_try))
    }

    /// Save the context for the handler and enter a block in the new region
    fn enter_try(
        &mut self,
        try_index: usize,
    ) -> Fragment {
        let saved_context = self.function_scope().catch_context_variables[self.try_depth];
        let context = self.base.context_variable;
        let entry = self.base.build_join_entry_in(Some(try_index));
        let mut instructions = self.base.load_local_raw(context);
        instructions += self.base.store_local(TokenPosition::NO_SOURCE, saved_context);
        instructions += self.base.drop();
        instructions += self.base.goto(entry);
        instructions.continue_at(entry)
    }

    fn current_exception(&self) -> VarId {
        self.function_scope().exception_variables[self.catch_depth - 1]
    }

    fn current_stack_trace(&self) -> VarId {
        self.function_scope().stack_trace_variables[self.catch_depth - 1]
    }

    /// Handler entry of region `try_index`; restores the saved context
    fn catch_block_entry(
        &mut self,
        try_index: usize,
        handler_types: Vec<AbstractType>,
        needs_stacktrace: bool,
    ) -> Fragment {
        let block_id = self.base.blocks.allocate_block_id();
        let current_try_index = self.base.current_try_index();
        let deopt_id = self.base.get_next_deopt_id();
        let exception_var = self.current_exception();
        let stacktrace_var = self.current_stack_trace();
        let entry = self.base.add_instruction(
            Instruction::new(InstrKind::CatchBlockEntry {
                block_id,
                try_index: current_try_index,
                catch_try_index: try_index,
                handler_types,
                exception_var,
                stacktrace_var,
                needs_stacktrace,
            })
            .with_deopt_id(deopt_id),
        );
        self.catch_entries.push(entry);

        let saved_context = self.function_scope().catch_context_variables[self.try_depth];
        let context = self.base.context_variable;
        let saved_depth = self.base.context_depth;
        self.base.context_depth = 0;
        let mut instructions = Fragment::from_instr(self.base.graph(), entry);
        instructions += self.base.load_local(saved_context);
        instructions += self.base.store_local_raw(TokenPosition::NO_SOURCE, context);
        instructions += self.base.drop();
        self.base.context_depth = saved_depth;
        instructions
    }

    fn build_catch_handlers(
        &mut self,
        try_index: usize,
        after_try: InstrId,
        catches: &'a [Catch],
    ) -> BuildResult<()> {
        let guards: Vec<_> = catches.iter().map(|c| self.translate_type(&c.guard)).collect();
        let has_catch_all = guards.iter().any(|g| self.is_top_type(g));
        let needs_stacktrace = !has_catch_all || catches.iter().any(|c| c.stack_trace.is_some());
        let mut catch_body = self.catch_block_entry(try_index, guards.clone(), needs_stacktrace);

        let exception = self.current_exception();
        let stack_trace = self.current_stack_trace();
        for (catch, guard) in catches.iter().zip(guards) {
            let mut handler = self.enter_scope(catch.offset);
            if let Some(declaration) = &catch.exception {
                let variable = self.scopes.local(declaration.offset);
                handler += self.base.load_local(exception);
                handler += self.base.store_local(TokenPosition::NO_SOURCE, variable);
                handler += self.base.drop();
            }
            if let Some(declaration) = &catch.stack_trace {
                let variable = self.scopes.local(declaration.offset);
                handler += self.base.load_local(stack_trace);
                handler += self.base.store_local(TokenPosition::NO_SOURCE, variable);
                handler += self.base.drop();
            }

            let frame = self.base.control.enter_catch(exception, stack_trace, try_index);
            let body = self.with_frame(frame, |b| b.build_statement(&catch.body));
            handler += body?;
            // 即使分支已关闭也要恢复上下文深度
            let open = handler.is_open();
            handler += self.exit_scope(catch.offset, open);
            if handler.is_open() {
                handler += self.base.goto(after_try);
            }

            if self.is_top_type(&guard) {
                catch_body += handler;
            } else {
                catch_body += self.base.load_local(exception);
                catch_body += self.instance_of(catch.position, guard);
                let (branch, matched, next) = self.base.branch_if_true(false);
                catch_body += branch;
                let mut matched_fragment = Fragment::from_instr(self.base.graph(), matched);
                matched_fragment += handler;
                catch_body = Fragment::from_instr(self.base.graph(), next);
            }
        }

        if catch_body.is_open() {
            catch_body += self.base.load_local(exception);
            catch_body += self.base.load_local(stack_trace);
            catch_body += self.base.rethrow_exception(TokenPosition::NO_SOURCE, Some(try_index));
            self.base.drop();
        }
        Ok(())
    }

    fn build_try_finally(
        &mut self,
        body: &'a Statement,
        finalizer: &'a Statement,
    ) -> BuildResult<Fragment> {
        self.check_inlinable("try/finally")?;

        // 正常退出时内联终结块；异常路径由 catch-all 处理后重新抛出
        let try_index = self.base.allocate_try_index();
        let mut try_body = self.enter_try(try_index);
        let after_try = self.base.build_join_entry();

        self.try_depth += 1;
        let finally_frame = self
            .base
            .control
            .enter_try_finally(finalizer, self.base.context_depth, self.try_depth);
        let result = self.with_frame(finally_frame, |b| {
            let frame = b.base.control.enter_try_catch(try_index);
            b.with_frame(frame, |b| b.build_statement(body))
        });
        self.try_depth -= 1;
        try_body += result?;

        if try_body.is_open() {
            let finally_entry = self.base.build_join_entry();
            try_body += self.base.goto(finally_entry);
            let mut finally_body = Fragment::from_instr(self.base.graph(), finally_entry);
            finally_body += self.build_statement(finalizer)?;
            if finally_body.is_open() {
                finally_body += self.base.goto(after_try);
            }
        }

        self.catch_depth += 1;
        let result = self.build_finally_handler(try_index, finalizer);
        self.catch_depth -= 1;
        result?;

        Ok(try_body.continue_at(after_try))
    }

    fn build_finally_handler(
        &mut self,
        try_index: usize,
        finalizer: &'a Statement,
    ) -> BuildResult<()> {
        let mut handler = self.catch_block_entry(try_index, vec![AbstractType::Dynamic], true);
        handler += self.build_statement(finalizer)?;
        if handler.is_open() {
            let exception = self.current_exception();
            let stack_trace = self.current_stack_trace();
            handler += self.base.load_local(exception);
            handler += self.base.load_local(stack_trace);
            handler += self.base.rethrow_exception(TokenPosition::NO_SOURCE, Some(try_index));
            self.base.drop();
        }
        Ok(())
    }

    /// Inline the finalizers between the innermost try/finally and
    /// `outer_finally`, each in the state its try statement was entered in
    pub(crate) fn translate_finally_finalizers(
        &mut self,
        outer_finally: Option<FrameId>,
        target_context_depth: Option<usize>,
    ) -> BuildResult<Fragment> {
        let saved_tops = self.base.control.tops();
        let saved_context_depth = self.base.context_depth;
        let saved_try_depth = self.try_depth;

        let result = self.inline_finalizers(outer_finally, target_context_depth);

        self.base.control.set_tops(saved_tops);
        self.base.context_depth = saved_context_depth;
        self.try_depth = saved_try_depth;
        result
    }

    fn inline_finalizers(
        &mut self,
        outer_finally: Option<FrameId>,
        target_context_depth: Option<usize>,
    ) -> BuildResult<Fragment> {
        let mut instructions = self.base.empty();
        while let Some(current) = self.base.control.try_finally_top() {
            if Some(current) == outer_finally {
                break;
            }
            let block = self.base.control.try_finally(current).clone();
            trace!(try_depth = block.try_depth, "inline finalizer");
            self.try_depth = block.try_depth;
            instructions += self.base.adjust_context_to(block.context_depth);

            // 终结块属于 try 语句外层的异常区域
            let mut tops = self.base.control.tops();
            let mut changed_try_index = false;
            while self.base.control.current_try_index() != block.try_index {
                let Some(try_catch) = tops.try_catch else {
                    break;
                };
                tops.try_catch = self.base.control.outer(try_catch);
                self.base.control.set_tops(tops);
                changed_try_index = true;
            }
            if changed_try_index {
                let entry = self.base.build_join_entry();
                instructions += self.base.goto(entry);
                instructions = instructions.continue_at(entry);
            }

            tops.try_finally = self.base.control.outer(current);
            tops.breakable = block.breakable_top;
            tops.switch = block.switch_top;
            self.base.control.set_tops(tops);
            instructions += self.build_statement(block.finalizer)?;
            if instructions.is_closed() {
                break;
            }
        }

        if instructions.is_open() {
            if let Some(depth) = target_context_depth {
                instructions += self.base.adjust_context_to(depth);
            }
        }
        Ok(instructions)
    }

    // ===== yield =====

    /// Save the resumption state and return the value. Code after the
    /// statement hangs off an anchor the resumption dispatch jumps past.
    fn build_yield(
        &mut self,
        position: TokenPosition,
        expression: &'a Expression,
    ) -> BuildResult<Fragment> {
        let scope = self.function_scope();
        let (Some(jump), Some(saved_context)) = (scope.yield_jump_variable, scope.yield_context_variable) else {
            return Err(self.report_error(position, "yield outside a yielding function"));
        };
        let context = self.base.context_variable;

        let mut instructions = self.base.int_constant(self.yield_continuations.len() as i64 + 1);
        instructions += self.base.store_local(TokenPosition::NO_SOURCE, jump);
        instructions += self.base.drop();
        instructions += self.base.load_local_raw(context);
        instructions += self.base.store_local(TokenPosition::NO_SOURCE, saved_context);
        instructions += self.base.drop();
        instructions += self.build_expression(expression)?;
        instructions += self.base.return_(TokenPosition::NO_SOURCE);

        let anchor = self.base.add_instruction(Instruction::new(InstrKind::DropTemps { count: 0 }));
        let try_index = self.base.current_try_index();
        self.yield_continuations.push(YieldContinuation { entry: anchor, try_index });
        let Some(entry) = instructions.entry else {
            unreachable!("yield always emits instructions");
        };
        let mut continuation = Fragment::with_bounds(self.base.graph(), entry, anchor);

        if self.helper.store().is_async_closure(self.function) {
            // 恢复时若传入了异常则重新抛出
            let parameters = &self.function_scope().parameters;
            let (exception, stack_trace) = (parameters[2], parameters[3]);
            continuation += self.base.load_local(exception);
            let (branch, no_error, error) = self.base.branch_if_null(false);
            continuation += branch;

            let mut rethrow = Fragment::from_instr(self.base.graph(), error);
            rethrow += self.base.load_local(exception);
            rethrow += self.base.load_local(stack_trace);
            rethrow += self.base.rethrow_exception(position, None);
            self.base.drop();
            continuation = continuation.continue_at(no_error);
        }
        Ok(continuation)
    }

    // ===== 声明 =====

    pub(crate) fn build_variable_declaration(
        &mut self,
        declaration: &'a VariableDeclaration,
    ) -> BuildResult<Fragment> {
        let variable = self.scopes.local(declaration.offset);
        let mut instructions = match &declaration.initializer {
            None => self.base.null_constant(),
            Some(initializer) if declaration.is_const => {
                let value = self
                    .evaluator()
                    .evaluate_expression(initializer, self.active_class.type_scope())
                    .map_err(self.located(initializer.position))?;
                self.base.constant(value)
            }
            Some(initializer) => {
                let mut instructions = self.build_expression(initializer)?;
                let (ty, name) = {
                    let v = self.base.variable(variable);
                    (v.ty.clone(), v.name.clone())
                };
                instructions += self.check_assignable(declaration.position, &ty, &name);
                instructions
            }
        };
        instructions = self.base.debug_step_check(declaration.position) + instructions;
        instructions += self.base.store_local(declaration.position, variable);
        instructions += self.base.drop();
        Ok(instructions)
    }

    fn build_function_declaration(
        &mut self,
        position: TokenPosition,
        variable: &'a VariableDeclaration,
        function: &'a FunctionNode,
    ) -> BuildResult<Fragment> {
        let mut instructions = self.base.debug_step_check(position);
        instructions += self.build_closure(function)?;
        let variable = self.scopes.local(variable.offset);
        instructions += self.base.store_local(position, variable);
        instructions += self.base.drop();
        Ok(instructions)
    }
}
