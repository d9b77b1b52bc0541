//! 基础图构建器
//!
//! [`BaseFlowGraphBuilder`] owns the per-function translation session: the
//! instruction arena, the expression stack that mirrors the stack machine
//! semantics of kernel expressions, block and deopt id counters, and the
//! control stack. Every emission primitive returns a [`Fragment`]; callers
//! glue fragments together with `+` and `<<`.
//!
//! Stack discipline: a primitive that consumes values pops them, one that
//! produces a value pushes its own instruction. A pushed definition records
//! its stack slot in `temp_index`; [`BaseFlowGraphBuilder::make_temporary`]
//! turns the top slot into an addressable local.

use crate::frontend::control_stack::{ControlStack, Destination, FrameId, JoinEntryFactory};
use crate::frontend::fragment::{Fragment, GraphHandle};
use crate::frontend::scope::{LocalVariable, VarId, VariableKind};
use crate::il::graph::GraphArena;
use crate::il::instruction::{CallShape, ConstantValue, InstrId, InstrKind, Instruction, Slot, Token};
use crate::object::{AbstractType, ClassId, FieldId, FunctionId};
use crate::util::config::BuilderConfig;
use crate::util::span::TokenPosition;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Hands out block ids and creates block entries
#[derive(Debug)]
pub struct BlockAllocator {
    graph: GraphHandle,
    last_used_block_id: usize,
}

impl BlockAllocator {
    pub fn new(
        graph: &GraphHandle,
        first_block_id: usize,
    ) -> Self {
        Self {
            graph: Rc::clone(graph),
            last_used_block_id: first_block_id.saturating_sub(1),
        }
    }

    pub fn allocate_block_id(&mut self) -> usize {
        self.last_used_block_id += 1;
        self.last_used_block_id
    }

    #[inline]
    pub fn last_used_block_id(&self) -> usize {
        self.last_used_block_id
    }

    pub fn build_target_entry(
        &mut self,
        try_index: Option<usize>,
    ) -> InstrId {
        let block_id = self.allocate_block_id();
        self.graph
            .borrow_mut()
            .add(Instruction::new(InstrKind::TargetEntry { block_id, try_index }))
    }
}

impl JoinEntryFactory for BlockAllocator {
    fn build_join_entry(
        &mut self,
        try_index: Option<usize>,
    ) -> InstrId {
        let block_id = self.allocate_block_id();
        self.graph
            .borrow_mut()
            .add(Instruction::new(InstrKind::JoinEntry { block_id, try_index }))
    }
}

/// What is left of a session once translation is over
#[derive(Debug)]
pub struct FinishedSession {
    pub arena: GraphArena,
    pub variables: Vec<LocalVariable>,
    pub max_block_id: usize,
    pub deopt_id_count: usize,
    pub context_level_array: Option<Vec<(usize, usize)>>,
}

/// Translation session of one function
#[derive(Debug)]
pub struct BaseFlowGraphBuilder<'a> {
    pub(crate) graph: GraphHandle,
    pub(crate) blocks: BlockAllocator,
    pub(crate) control: ControlStack<'a>,
    pub(crate) config: BuilderConfig,
    /// Every local of the member being translated, temporaries included
    pub(crate) variables: Vec<LocalVariable>,
    /// `:current_context_var`
    pub(crate) context_variable: VarId,
    /// Number of contexts between the function entry and the current code
    pub(crate) context_depth: usize,
    pub(crate) pending_argument_count: usize,
    stack: Vec<InstrId>,
    next_deopt_id: usize,
    next_used_try_index: usize,
    context_level_array: Option<Vec<(usize, usize)>>,
    temporaries: Vec<Option<VarId>>,
}

impl<'a> BaseFlowGraphBuilder<'a> {
    pub fn new(
        config: BuilderConfig,
        variables: Vec<LocalVariable>,
        context_variable: VarId,
        context_depth: usize,
    ) -> Self {
        let graph: GraphHandle = Rc::new(RefCell::new(GraphArena::new()));
        let blocks = BlockAllocator::new(&graph, config.first_block_id);
        let context_level_array = config.track_context_levels.then(Vec::new);
        Self {
            graph,
            blocks,
            control: ControlStack::new(),
            config,
            variables,
            context_variable,
            context_depth,
            pending_argument_count: 0,
            stack: Vec::new(),
            next_deopt_id: 0,
            next_used_try_index: 0,
            context_level_array,
            temporaries: Vec::new(),
        }
    }

    // ===== 基础设施 =====

    #[inline]
    pub fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    pub fn empty(&self) -> Fragment {
        Fragment::new(&self.graph)
    }

    pub(crate) fn add_instruction(
        &mut self,
        instruction: Instruction,
    ) -> InstrId {
        self.graph.borrow_mut().add(instruction)
    }

    /// Add an instruction that produces no value
    pub(crate) fn emit(
        &mut self,
        instruction: Instruction,
    ) -> Fragment {
        let id = self.add_instruction(instruction);
        Fragment::from_instr(&self.graph, id)
    }

    /// Add an instruction and push its value
    pub(crate) fn emit_value(
        &mut self,
        instruction: Instruction,
    ) -> Fragment {
        let id = self.add_instruction(instruction);
        self.push(id);
        Fragment::from_instr(&self.graph, id)
    }

    pub fn variable(
        &self,
        id: VarId,
    ) -> &LocalVariable {
        &self.variables[id.index()]
    }

    pub(crate) fn add_variable(
        &mut self,
        variable: LocalVariable,
    ) -> VarId {
        self.variables.push(variable);
        VarId(self.variables.len() as u32 - 1)
    }

    pub fn get_next_deopt_id(&mut self) -> usize {
        let id = self.next_deopt_id;
        self.next_deopt_id += 1;
        if let Some(levels) = &mut self.context_level_array {
            levels.push((id, self.context_depth));
        }
        id
    }

    #[inline]
    pub fn deopt_id_count(&self) -> usize {
        self.next_deopt_id
    }

    pub fn allocate_try_index(&mut self) -> usize {
        let index = self.next_used_try_index;
        self.next_used_try_index += 1;
        index
    }

    #[inline]
    pub fn try_index_count(&self) -> usize {
        self.next_used_try_index
    }

    /// Exception region enclosing the code being emitted
    #[inline]
    pub fn current_try_index(&self) -> Option<usize> {
        self.control.current_try_index()
    }

    pub(crate) fn take_context_level_array(&mut self) -> Option<Vec<(usize, usize)>> {
        self.context_level_array.take()
    }

    /// End the session, handing out the arena and the counters
    pub fn finish(self) -> FinishedSession {
        debug_assert_eq!(self.control.depth(), 0, "control frames left open");
        trace!(values = self.stack.len(), "session finished");
        let max_block_id = self.blocks.last_used_block_id();
        let deopt_id_count = self.next_deopt_id;
        let context_level_array = self.context_level_array;
        let variables = self.variables;
        drop(self.blocks);
        drop(self.control);
        let arena = Rc::try_unwrap(self.graph)
            .map(RefCell::into_inner)
            .unwrap_or_else(|shared| shared.borrow().clone());
        FinishedSession {
            arena,
            variables,
            max_block_id,
            deopt_id_count,
            context_level_array,
        }
    }

    // ===== 表达式栈 =====

    pub(crate) fn push(
        &mut self,
        definition: InstrId,
    ) {
        let index = self.stack.len();
        self.graph.borrow_mut()[definition].temp_index = Some(index);
        self.stack.push(definition);
    }

    pub(crate) fn pop(&mut self) -> InstrId {
        match self.stack.pop() {
            Some(value) => value,
            None => panic!("expression stack underflow"),
        }
    }

    pub(crate) fn top(&self) -> InstrId {
        match self.stack.last() {
            Some(&value) => value,
            None => panic!("expression stack is empty"),
        }
    }

    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Pop `count` values, returned bottom first
    pub(crate) fn pop_values(
        &mut self,
        count: usize,
    ) -> Vec<InstrId> {
        assert!(count <= self.stack.len(), "expression stack underflow");
        self.stack.split_off(self.stack.len() - count)
    }

    /// Pop the pushed arguments of a call
    pub(crate) fn get_arguments(
        &mut self,
        count: usize,
    ) -> Vec<InstrId> {
        let arguments = self.pop_values(count);
        self.pending_argument_count = self.pending_argument_count.saturating_sub(count);
        arguments
    }

    /// Make the value on top of the stack addressable as a local
    pub fn make_temporary(&mut self) -> VarId {
        let top = self.top();
        let index = {
            let mut graph = self.graph.borrow_mut();
            let definition = &mut graph[top];
            definition.used_as_temp = true;
            definition.temp_index.unwrap_or(self.stack.len() - 1)
        };
        if self.temporaries.len() <= index {
            self.temporaries.resize(index + 1, None);
        }
        if let Some(existing) = self.temporaries[index] {
            return existing;
        }
        let id = self.add_variable(LocalVariable::new(
            format!(":temp{}", index),
            VariableKind::Temporary(index),
        ));
        self.temporaries[index] = Some(id);
        id
    }

    pub fn drop(&mut self) -> Fragment {
        let top = self.pop();
        let needs_instruction = {
            let mut graph = self.graph.borrow_mut();
            let definition = &mut graph[top];
            if definition.used_as_temp || matches!(definition.kind, InstrKind::LoadLocal { .. }) {
                true
            } else {
                definition.temp_index = None;
                false
            }
        };
        if needs_instruction {
            self.emit(Instruction::new(InstrKind::DropTemps { count: 1 }))
        } else {
            self.empty()
        }
    }

    /// Drop `count` values below the top, keeping the top value
    pub fn drop_temps_preserve_top(
        &mut self,
        count: usize,
    ) -> Fragment {
        let top = self.pop();
        self.pop_values(count);
        self.emit_value(Instruction::new(InstrKind::DropTemps { count }).with_inputs([top]))
    }

    pub fn push_argument(&mut self) -> Fragment {
        let value = self.pop();
        self.pending_argument_count += 1;
        self.emit_value(Instruction::new(InstrKind::PushArgument).with_inputs([value]))
    }

    // ===== 常量与局部变量 =====

    pub fn constant(
        &mut self,
        value: ConstantValue,
    ) -> Fragment {
        self.emit_value(Instruction::new(InstrKind::Constant(value)))
    }

    pub fn null_constant(&mut self) -> Fragment {
        self.constant(ConstantValue::Null)
    }

    pub fn int_constant(
        &mut self,
        value: i64,
    ) -> Fragment {
        self.constant(ConstantValue::Int(value))
    }

    pub fn bool_constant(
        &mut self,
        value: bool,
    ) -> Fragment {
        self.constant(ConstantValue::Bool(value))
    }

    pub fn load_local(
        &mut self,
        variable: VarId,
    ) -> Fragment {
        let (captured, level, index) = {
            let v = self.variable(variable);
            (v.is_captured, v.context_level, v.context_index)
        };
        match (captured, index) {
            (true, Some(index)) => {
                let mut instructions = self.load_context_at(level);
                instructions += self.load_field(Slot::ContextVariable(index));
                instructions
            }
            _ => self.load_local_raw(variable),
        }
    }

    /// Load a stack-allocated local, ignoring capture
    pub fn load_local_raw(
        &mut self,
        variable: VarId,
    ) -> Fragment {
        self.emit_value(Instruction::new(InstrKind::LoadLocal { variable }))
    }

    /// Store the top value into `variable`, leaving the stored value on the stack
    pub fn store_local(
        &mut self,
        position: TokenPosition,
        variable: VarId,
    ) -> Fragment {
        let (captured, level, index) = {
            let v = self.variable(variable);
            (v.is_captured, v.context_level, v.context_index)
        };
        match (captured, index) {
            (true, Some(index)) => {
                let value = self.make_temporary();
                let mut instructions = self.load_context_at(level);
                instructions += self.load_local_raw(value);
                instructions += self.store_instance_field(position, Slot::ContextVariable(index), false);
                instructions
            }
            _ => self.store_local_raw(position, variable),
        }
    }

    pub fn store_local_raw(
        &mut self,
        position: TokenPosition,
        variable: VarId,
    ) -> Fragment {
        let value = self.pop();
        self.emit_value(
            Instruction::new(InstrKind::StoreLocal { variable })
                .with_inputs([value])
                .at(position),
        )
    }

    // ===== 上下文 =====

    /// Context at level `depth` of the chain
    pub fn load_context_at(
        &mut self,
        depth: usize,
    ) -> Fragment {
        assert!(
            depth <= self.context_depth,
            "context level {} is deeper than the current depth {}",
            depth,
            self.context_depth
        );
        let delta = self.context_depth - depth;
        let mut instructions = self.load_local_raw(self.context_variable);
        for _ in 0..delta {
            instructions += self.load_field(Slot::ContextParent);
        }
        instructions
    }

    pub fn allocate_context(
        &mut self,
        num_variables: usize,
    ) -> Fragment {
        self.emit_value(Instruction::new(InstrKind::AllocateContext { num_variables }))
    }

    /// Allocate a context linked to the current one and make it current
    pub fn push_context(
        &mut self,
        num_variables: usize,
    ) -> Fragment {
        assert!(num_variables > 0);
        let mut instructions = self.allocate_context(num_variables);
        let context = self.make_temporary();
        instructions += self.load_local_raw(context);
        instructions += self.load_local_raw(self.context_variable);
        instructions += self.store_instance_field(TokenPosition::NO_SOURCE, Slot::ContextParent, false);
        instructions += self.store_local_raw(TokenPosition::NO_SOURCE, self.context_variable);
        self.context_depth += 1;
        trace!(depth = self.context_depth, "push context");
        instructions
    }

    pub fn pop_context(&mut self) -> Fragment {
        let depth = self.context_depth.saturating_sub(1);
        self.adjust_context_to(depth)
    }

    /// Unwind the current context to level `depth`
    pub fn adjust_context_to(
        &mut self,
        depth: usize,
    ) -> Fragment {
        assert!(depth <= self.context_depth);
        let mut instructions = self.empty();
        if depth < self.context_depth {
            instructions += self.load_context_at(depth);
            instructions += self.store_local_raw(TokenPosition::NO_SOURCE, self.context_variable);
            instructions += self.drop();
            self.context_depth = depth;
            trace!(depth, "adjust context");
        }
        instructions
    }

    /// Replace the current context with a copy of itself
    pub fn clone_context(
        &mut self,
        num_variables: usize,
    ) -> Fragment {
        let mut instructions = self.load_local_raw(self.context_variable);
        let context = self.pop();
        instructions += self.emit_value(Instruction::new(InstrKind::CloneContext { num_variables }).with_inputs([context]));
        instructions += self.store_local_raw(TokenPosition::NO_SOURCE, self.context_variable);
        instructions += self.drop();
        instructions
    }

    // ===== 字段与数组 =====

    pub fn load_field(
        &mut self,
        slot: Slot,
    ) -> Fragment {
        let receiver = self.pop();
        self.emit_value(Instruction::new(InstrKind::LoadField { slot }).with_inputs([receiver]))
    }

    pub fn store_instance_field(
        &mut self,
        position: TokenPosition,
        slot: Slot,
        is_initialization: bool,
    ) -> Fragment {
        let value = self.pop();
        let instance = self.pop();
        let emit_store_barrier = self.config.emit_store_barriers;
        self.emit(
            Instruction::new(InstrKind::StoreInstanceField {
                slot,
                emit_store_barrier,
                is_initialization,
            })
            .with_inputs([instance, value])
            .at(position),
        )
    }

    /// Instance field store preceded by the field guards
    pub fn store_instance_field_guarded(
        &mut self,
        position: TokenPosition,
        field: FieldId,
        needs_class_guard: bool,
        needs_length_guard: bool,
        is_initialization: bool,
    ) -> Fragment {
        let mut instructions = self.empty();
        if self.config.use_field_guards && (needs_class_guard || needs_length_guard) {
            let value = self.make_temporary();
            if needs_class_guard {
                instructions += self.load_local_raw(value);
                instructions += self.guard_field_class(field);
            }
            if needs_length_guard {
                instructions += self.load_local_raw(value);
                instructions += self.guard_field_length(field);
            }
        }
        instructions += self.store_instance_field(position, Slot::Field(field), is_initialization);
        instructions
    }

    pub fn guard_field_class(
        &mut self,
        field: FieldId,
    ) -> Fragment {
        let value = self.pop();
        let deopt_id = self.get_next_deopt_id();
        self.emit(
            Instruction::new(InstrKind::GuardFieldClass { field })
                .with_inputs([value])
                .with_deopt_id(deopt_id),
        )
    }

    pub fn guard_field_length(
        &mut self,
        field: FieldId,
    ) -> Fragment {
        let value = self.pop();
        let deopt_id = self.get_next_deopt_id();
        self.emit(
            Instruction::new(InstrKind::GuardFieldLength { field })
                .with_inputs([value])
                .with_deopt_id(deopt_id),
        )
    }

    pub fn load_indexed(&mut self) -> Fragment {
        let index = self.pop();
        let array = self.pop();
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::LoadIndexed)
                .with_inputs([array, index])
                .with_deopt_id(deopt_id),
        )
    }

    pub fn store_indexed(&mut self) -> Fragment {
        let value = self.pop();
        let index = self.pop();
        let array = self.pop();
        let deopt_id = self.get_next_deopt_id();
        self.emit(
            Instruction::new(InstrKind::StoreIndexed)
                .with_inputs([array, index, value])
                .with_deopt_id(deopt_id),
        )
    }

    pub fn create_array(&mut self) -> Fragment {
        let length = self.pop();
        let element_type = self.pop();
        self.emit_value(Instruction::new(InstrKind::CreateArray).with_inputs([element_type, length]))
    }

    // ===== 静态字段 =====

    /// Load the static field whose constant is on the stack
    pub fn load_static_field(&mut self) -> Fragment {
        let field = self.pop();
        self.emit_value(Instruction::new(InstrKind::LoadStaticField).with_inputs([field]))
    }

    pub fn init_static_field(
        &mut self,
        field: FieldId,
    ) -> Fragment {
        let mut instructions = self.constant(ConstantValue::Field(field));
        let value = self.pop();
        let deopt_id = self.get_next_deopt_id();
        instructions += self.emit(
            Instruction::new(InstrKind::InitStaticField { field })
                .with_inputs([value])
                .with_deopt_id(deopt_id),
        );
        instructions
    }

    pub fn store_static_field(
        &mut self,
        position: TokenPosition,
        field: FieldId,
    ) -> Fragment {
        let value = self.pop();
        self.emit(
            Instruction::new(InstrKind::StoreStaticField { field })
                .with_inputs([value])
                .at(position),
        )
    }

    // ===== 调用 =====

    #[allow(clippy::too_many_arguments)]
    pub fn instance_call(
        &mut self,
        position: TokenPosition,
        name: &str,
        token: Token,
        shape: CallShape,
        checked_argument_count: usize,
        interface_target: Option<FunctionId>,
    ) -> Fragment {
        let arguments = self.get_arguments(shape.pushed_count());
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::InstanceCall {
                name: name.to_string(),
                token,
                shape,
                checked_argument_count,
                interface_target,
            })
            .with_inputs(arguments)
            .with_deopt_id(deopt_id)
            .at(position),
        )
    }

    pub fn static_call(
        &mut self,
        position: TokenPosition,
        target: FunctionId,
        shape: CallShape,
    ) -> Fragment {
        let arguments = self.get_arguments(shape.pushed_count());
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::StaticCall { target, shape })
                .with_inputs(arguments)
                .with_deopt_id(deopt_id)
                .at(position),
        )
    }

    /// Call the closure function on top of the stack with the pushed arguments
    pub fn closure_call(
        &mut self,
        position: TokenPosition,
        shape: CallShape,
    ) -> Fragment {
        let function = self.pop();
        let mut inputs = vec![function];
        inputs.extend(self.get_arguments(shape.pushed_count()));
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::ClosureCall { shape })
                .with_inputs(inputs)
                .with_deopt_id(deopt_id)
                .at(position),
        )
    }

    pub fn native_call(
        &mut self,
        name: &str,
        function: FunctionId,
        argument_count: usize,
    ) -> Fragment {
        let arguments = self.get_arguments(argument_count);
        self.emit_value(
            Instruction::new(InstrKind::NativeCall {
                name: name.to_string(),
                function,
            })
            .with_inputs(arguments),
        )
    }

    pub fn allocate_object(
        &mut self,
        position: TokenPosition,
        class: ClassId,
        closure_function: Option<FunctionId>,
        argument_count: usize,
    ) -> Fragment {
        let arguments = self.get_arguments(argument_count);
        self.emit_value(
            Instruction::new(InstrKind::AllocateObject {
                class,
                closure_function,
            })
            .with_inputs(arguments)
            .at(position),
        )
    }

    pub fn string_interpolate(
        &mut self,
        position: TokenPosition,
    ) -> Fragment {
        let array = self.pop();
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::StringInterpolate)
                .with_inputs([array])
                .with_deopt_id(deopt_id)
                .at(position),
        )
    }

    // ===== 比较与类型检查 =====

    pub fn strict_compare(
        &mut self,
        kind: Token,
        needs_number_check: bool,
    ) -> Fragment {
        let right = self.pop();
        let left = self.pop();
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::StrictCompare {
                kind,
                needs_number_check,
            })
            .with_inputs([left, right])
            .with_deopt_id(deopt_id),
        )
    }

    pub fn boolean_negate(&mut self) -> Fragment {
        let value = self.pop();
        self.emit_value(Instruction::new(InstrKind::BooleanNegate).with_inputs([value]))
    }

    pub fn assert_bool(&mut self) -> Fragment {
        let value = self.pop();
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::AssertBoolean)
                .with_inputs([value])
                .with_deopt_id(deopt_id),
        )
    }

    /// Stack: value, instantiator type arguments, function type arguments
    pub fn instance_of(
        &mut self,
        position: TokenPosition,
        ty: AbstractType,
    ) -> Fragment {
        let inputs = self.pop_values(3);
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::InstanceOf { ty })
                .with_inputs(inputs)
                .with_deopt_id(deopt_id)
                .at(position),
        )
    }

    /// Stack: value, instantiator type arguments, function type arguments
    pub fn assert_assignable_raw(
        &mut self,
        position: TokenPosition,
        ty: AbstractType,
        name: &str,
    ) -> Fragment {
        let inputs = self.pop_values(3);
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::AssertAssignable {
                ty,
                name: name.to_string(),
            })
            .with_inputs(inputs)
            .with_deopt_id(deopt_id)
            .at(position),
        )
    }

    /// Stack: instantiator type arguments, function type arguments
    pub fn assert_subtype(
        &mut self,
        position: TokenPosition,
        sub_type: AbstractType,
        super_type: AbstractType,
        name: &str,
    ) -> Fragment {
        let inputs = self.pop_values(2);
        let deopt_id = self.get_next_deopt_id();
        self.emit(
            Instruction::new(InstrKind::AssertSubtype {
                sub_type,
                super_type,
                name: name.to_string(),
            })
            .with_inputs(inputs)
            .with_deopt_id(deopt_id)
            .at(position),
        )
    }

    pub fn check_null(
        &mut self,
        position: TokenPosition,
        receiver: VarId,
        function_name: &str,
    ) -> Fragment {
        let mut instructions = self.load_local(receiver);
        let value = self.pop();
        let deopt_id = self.get_next_deopt_id();
        instructions += self.emit(
            Instruction::new(InstrKind::CheckNull {
                function_name: function_name.to_string(),
            })
            .with_inputs([value])
            .with_deopt_id(deopt_id)
            .at(position),
        );
        instructions
    }

    pub fn check_stack_overflow(
        &mut self,
        position: TokenPosition,
        loop_depth: usize,
    ) -> Fragment {
        let deopt_id = self.get_next_deopt_id();
        self.emit(
            Instruction::new(InstrKind::CheckStackOverflow { loop_depth })
                .with_deopt_id(deopt_id)
                .at(position),
        )
    }

    /// Single-step check, only at positions a debugger can pause on
    pub fn debug_step_check(
        &mut self,
        position: TokenPosition,
    ) -> Fragment {
        if !self.config.emit_debug_step_checks || !position.is_debug_pause() {
            return self.empty();
        }
        self.emit(Instruction::new(InstrKind::DebugStepCheck).at(position))
    }

    /// Stack: instantiator type arguments, function type arguments
    pub fn instantiate_type(
        &mut self,
        position: TokenPosition,
        ty: AbstractType,
    ) -> Fragment {
        let inputs = self.pop_values(2);
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::InstantiateType { ty })
                .with_inputs(inputs)
                .with_deopt_id(deopt_id)
                .at(position),
        )
    }

    /// Stack: instantiator type arguments, function type arguments
    pub fn instantiate_type_arguments(
        &mut self,
        type_arguments: Vec<AbstractType>,
    ) -> Fragment {
        let inputs = self.pop_values(2);
        let deopt_id = self.get_next_deopt_id();
        self.emit_value(
            Instruction::new(InstrKind::InstantiateTypeArguments { type_arguments })
                .with_inputs(inputs)
                .with_deopt_id(deopt_id),
        )
    }

    pub fn load_class_id(&mut self) -> Fragment {
        let value = self.pop();
        self.emit_value(Instruction::new(InstrKind::LoadClassId).with_inputs([value]))
    }

    // ===== 控制转移 =====

    pub fn build_target_entry(&mut self) -> InstrId {
        let try_index = self.current_try_index();
        self.blocks.build_target_entry(try_index)
    }

    pub fn build_join_entry(&mut self) -> InstrId {
        let try_index = self.current_try_index();
        self.blocks.build_join_entry(try_index)
    }

    pub fn build_join_entry_in(
        &mut self,
        try_index: Option<usize>,
    ) -> InstrId {
        self.blocks.build_join_entry(try_index)
    }

    pub fn goto(
        &mut self,
        target: InstrId,
    ) -> Fragment {
        self.emit(Instruction::new(InstrKind::Goto { target })).closed()
    }

    /// Branch on the comparison `compare`, which stays out of the chain
    fn branch(
        &mut self,
        compare: InstrId,
    ) -> (Fragment, InstrId, InstrId) {
        let true_successor = self.build_target_entry();
        let false_successor = self.build_target_entry();
        let deopt_id = self.get_next_deopt_id();
        let branch = self.emit(
            Instruction::new(InstrKind::Branch {
                true_successor,
                false_successor,
            })
            .with_inputs([compare])
            .with_deopt_id(deopt_id),
        );
        (branch.closed(), true_successor, false_successor)
    }

    /// Branch on the two values on top of the stack being identical
    pub fn branch_if_equal(
        &mut self,
        negate: bool,
    ) -> (Fragment, InstrId, InstrId) {
        let right = self.pop();
        let left = self.pop();
        let kind = if negate { Token::NeStrict } else { Token::EqStrict };
        let deopt_id = self.get_next_deopt_id();
        let compare = self.add_instruction(
            Instruction::new(InstrKind::StrictCompare {
                kind,
                needs_number_check: false,
            })
            .with_inputs([left, right])
            .with_deopt_id(deopt_id),
        );
        self.branch(compare)
    }

    pub fn branch_if_true(
        &mut self,
        negate: bool,
    ) -> (Fragment, InstrId, InstrId) {
        let instructions = self.bool_constant(true);
        let (branch, then_entry, otherwise_entry) = self.branch_if_equal(negate);
        (instructions + branch, then_entry, otherwise_entry)
    }

    pub fn branch_if_null(
        &mut self,
        negate: bool,
    ) -> (Fragment, InstrId, InstrId) {
        let instructions = self.null_constant();
        let (branch, then_entry, otherwise_entry) = self.branch_if_equal(negate);
        (instructions + branch, then_entry, otherwise_entry)
    }

    pub fn branch_if_strict_equal(&mut self) -> (Fragment, InstrId, InstrId) {
        self.branch_if_equal(false)
    }

    pub fn return_(
        &mut self,
        position: TokenPosition,
    ) -> Fragment {
        let mut instructions = self.debug_step_check(position);
        let value = self.pop();
        instructions += self.emit(Instruction::new(InstrKind::Return).with_inputs([value]).at(position));
        instructions.closed()
    }

    /// Throw the value on top of the stack. A null is left on the stack in
    /// place of the expression value; it is not part of the graph.
    pub fn throw_exception(
        &mut self,
        position: TokenPosition,
    ) -> Fragment {
        let exception = self.pop();
        let deopt_id = self.get_next_deopt_id();
        let instructions = self.emit(
            Instruction::new(InstrKind::Throw)
                .with_inputs([exception])
                .with_deopt_id(deopt_id)
                .at(position),
        );
        self.null_constant();
        instructions.closed()
    }

    /// Stack: exception, stack trace
    pub fn rethrow_exception(
        &mut self,
        position: TokenPosition,
        catch_try_index: Option<usize>,
    ) -> Fragment {
        let mut instructions = self.debug_step_check(position);
        let inputs = self.pop_values(2);
        let deopt_id = self.get_next_deopt_id();
        instructions += self.emit(
            Instruction::new(InstrKind::ReThrow { catch_try_index })
                .with_inputs(inputs)
                .with_deopt_id(deopt_id)
                .at(position),
        );
        self.null_constant();
        instructions.closed()
    }

    pub fn tail_call(
        &mut self,
        code: &str,
    ) -> Fragment {
        self.emit(Instruction::new(InstrKind::TailCall { code: code.to_string() })).closed()
    }

    // ===== 控制栈 =====

    pub fn break_destination(
        &mut self,
        label: usize,
    ) -> Destination {
        self.control.break_destination(label, &mut self.blocks)
    }

    pub fn switch_destination(
        &mut self,
        target: usize,
    ) -> Destination {
        self.control.switch_destination(target, &mut self.blocks)
    }

    pub fn switch_destination_direct(
        &mut self,
        switch: FrameId,
        case: usize,
    ) -> Destination {
        self.control.switch_destination_direct(switch, case, &mut self.blocks)
    }
}
