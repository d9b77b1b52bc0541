//! 控制结构栈
//!
//! Frames for the lexical constructs that non-local control transfers can
//! leave: labeled statements, switches, try/catch, try/finally and catch
//! handlers. Frames live in one arena; each kind keeps its own chain through
//! `outer` links and the builder sees the top of every chain.
//!
//! Frames are entered and exited in strict LIFO order across all kinds.
//! Exiting a frame that is not the most recently entered live frame, or
//! touching a frame after it was exited, is an internal error and panics.

use crate::frontend::scope::VarId;
use crate::il::instruction::InstrId;
use crate::kernel::ast::Statement;
use hashbrown::HashMap;

/// Creates the join blocks that frames hand out as jump destinations
pub trait JoinEntryFactory {
    fn build_join_entry(
        &mut self,
        try_index: Option<usize>,
    ) -> InstrId;
}

/// Handle of a frame in the control stack arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a jump lands and what it has to unwind on the way
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub join: InstrId,
    /// Innermost try/finally outside the target construct
    pub outer_finally: Option<FrameId>,
    /// Context depth at the target construct
    pub context_depth: usize,
}

/// Labeled statement
#[derive(Debug, Clone)]
pub struct BreakableBlock {
    /// Nesting depth among labeled statements
    pub index: usize,
    destination: Option<InstrId>,
    pub outer_finally: Option<FrameId>,
    pub context_depth: usize,
    pub try_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SwitchBlock {
    destinations: HashMap<usize, InstrId>,
    pub outer_finally: Option<FrameId>,
    pub case_count: usize,
    /// Case count of all enclosing switches
    pub depth: usize,
    pub context_depth: usize,
    pub try_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TryCatchBlock {
    pub try_index: usize,
}

#[derive(Debug, Clone)]
pub struct TryFinallyBlock<'a> {
    pub finalizer: &'a Statement,
    pub context_depth: usize,
    /// Finalizers run outside their own try region
    pub try_depth: usize,
    pub try_index: Option<usize>,
    /// Labeled statement and switch visible from the finalizer
    pub breakable_top: Option<FrameId>,
    pub switch_top: Option<FrameId>,
}

#[derive(Debug, Clone)]
pub struct CatchBlock {
    pub exception_var: VarId,
    pub stack_trace_var: VarId,
    pub catch_try_index: usize,
}

#[derive(Debug, Clone)]
pub enum FrameKind<'a> {
    Breakable(BreakableBlock),
    Switch(SwitchBlock),
    TryCatch(TryCatchBlock),
    TryFinally(TryFinallyBlock<'a>),
    Catch(CatchBlock),
}

impl FrameKind<'_> {
    fn name(&self) -> &'static str {
        match self {
            FrameKind::Breakable(_) => "breakable block",
            FrameKind::Switch(_) => "switch block",
            FrameKind::TryCatch(_) => "try/catch block",
            FrameKind::TryFinally(_) => "try/finally block",
            FrameKind::Catch(_) => "catch block",
        }
    }
}

#[derive(Debug, Clone)]
struct Frame<'a> {
    outer: Option<FrameId>,
    live: bool,
    kind: FrameKind<'a>,
}

/// Top of every frame chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainTops {
    pub breakable: Option<FrameId>,
    pub switch: Option<FrameId>,
    pub try_catch: Option<FrameId>,
    pub try_finally: Option<FrameId>,
    pub catch: Option<FrameId>,
}

#[derive(Debug, Clone, Default)]
pub struct ControlStack<'a> {
    frames: Vec<Frame<'a>>,
    live: Vec<FrameId>,
    tops: ChainTops,
}

impl<'a> ControlStack<'a> {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            live: Vec::new(),
            tops: ChainTops::default(),
        }
    }

    // ===== Entry and exit =====

    pub fn enter_breakable(
        &mut self,
        context_depth: usize,
    ) -> FrameId {
        let index = self
            .tops
            .breakable
            .map_or(0, |outer| self.breakable(outer).index + 1);
        let block = BreakableBlock {
            index,
            destination: None,
            outer_finally: self.tops.try_finally,
            context_depth,
            try_index: self.current_try_index(),
        };
        let id = self.push(self.tops.breakable, FrameKind::Breakable(block));
        self.tops.breakable = Some(id);
        id
    }

    pub fn enter_switch(
        &mut self,
        case_count: usize,
        context_depth: usize,
    ) -> FrameId {
        let depth = self.tops.switch.map_or(0, |outer| {
            let outer = self.switch(outer);
            outer.depth + outer.case_count
        });
        let block = SwitchBlock {
            destinations: HashMap::new(),
            outer_finally: self.tops.try_finally,
            case_count,
            depth,
            context_depth,
            try_index: self.current_try_index(),
        };
        let id = self.push(self.tops.switch, FrameKind::Switch(block));
        self.tops.switch = Some(id);
        id
    }

    pub fn enter_try_catch(
        &mut self,
        try_index: usize,
    ) -> FrameId {
        let id = self.push(self.tops.try_catch, FrameKind::TryCatch(TryCatchBlock { try_index }));
        self.tops.try_catch = Some(id);
        id
    }

    /// `try_depth` is the builder's try depth inside the protected body
    pub fn enter_try_finally(
        &mut self,
        finalizer: &'a Statement,
        context_depth: usize,
        try_depth: usize,
    ) -> FrameId {
        let block = TryFinallyBlock {
            finalizer,
            context_depth,
            try_depth: try_depth.saturating_sub(1),
            try_index: self.current_try_index(),
            breakable_top: self.tops.breakable,
            switch_top: self.tops.switch,
        };
        let id = self.push(self.tops.try_finally, FrameKind::TryFinally(block));
        self.tops.try_finally = Some(id);
        id
    }

    pub fn enter_catch(
        &mut self,
        exception_var: VarId,
        stack_trace_var: VarId,
        catch_try_index: usize,
    ) -> FrameId {
        let block = CatchBlock {
            exception_var,
            stack_trace_var,
            catch_try_index,
        };
        let id = self.push(self.tops.catch, FrameKind::Catch(block));
        self.tops.catch = Some(id);
        id
    }

    fn push(
        &mut self,
        outer: Option<FrameId>,
        kind: FrameKind<'a>,
    ) -> FrameId {
        let id = FrameId(self.frames.len() as u32);
        self.frames.push(Frame {
            outer,
            live: true,
            kind,
        });
        self.live.push(id);
        id
    }

    /// Leave `id`, which must be the most recently entered live frame
    pub fn exit(
        &mut self,
        id: FrameId,
    ) {
        let top = self.live.last().copied();
        assert_eq!(
            top,
            Some(id),
            "{} exited out of order",
            self.frames[id.index()].kind.name()
        );
        self.live.pop();
        let frame = &mut self.frames[id.index()];
        frame.live = false;
        let outer = frame.outer;
        let chain = match frame.kind {
            FrameKind::Breakable(_) => &mut self.tops.breakable,
            FrameKind::Switch(_) => &mut self.tops.switch,
            FrameKind::TryCatch(_) => &mut self.tops.try_catch,
            FrameKind::TryFinally(_) => &mut self.tops.try_finally,
            FrameKind::Catch(_) => &mut self.tops.catch,
        };
        // The chain may be temporarily rewired while finalizers are inlined;
        // only restore when it still points at this frame.
        if *chain == Some(id) {
            *chain = outer;
        }
    }

    /// Live frames, innermost last
    #[inline]
    pub fn depth(&self) -> usize {
        self.live.len()
    }

    // ===== Chain tops =====

    #[inline]
    pub fn tops(&self) -> ChainTops {
        self.tops
    }

    /// Rewire the chains, e.g. while a finalizer is inlined at a jump
    pub fn set_tops(
        &mut self,
        tops: ChainTops,
    ) {
        self.tops = tops;
    }

    #[inline]
    pub fn try_finally_top(&self) -> Option<FrameId> {
        self.tops.try_finally
    }

    #[inline]
    pub fn try_catch_top(&self) -> Option<FrameId> {
        self.tops.try_catch
    }

    /// Exception region new code belongs to
    pub fn current_try_index(&self) -> Option<usize> {
        self.tops.try_catch.map(|id| self.try_catch(id).try_index)
    }

    /// Innermost catch handler
    pub fn catch_block(&self) -> Option<&CatchBlock> {
        self.tops.catch.map(|id| match &self.frame(id).kind {
            FrameKind::Catch(block) => block,
            other => panic!("expected catch block, found {}", other.name()),
        })
    }

    // ===== Frame access =====

    fn frame(
        &self,
        id: FrameId,
    ) -> &Frame<'a> {
        let frame = &self.frames[id.index()];
        assert!(frame.live, "{} used after exit", frame.kind.name());
        frame
    }

    fn frame_mut(
        &mut self,
        id: FrameId,
    ) -> &mut Frame<'a> {
        let frame = &mut self.frames[id.index()];
        assert!(frame.live, "{} used after exit", frame.kind.name());
        frame
    }

    pub fn outer(
        &self,
        id: FrameId,
    ) -> Option<FrameId> {
        self.frame(id).outer
    }

    pub fn breakable(
        &self,
        id: FrameId,
    ) -> &BreakableBlock {
        match &self.frame(id).kind {
            FrameKind::Breakable(block) => block,
            other => panic!("expected breakable block, found {}", other.name()),
        }
    }

    pub fn switch(
        &self,
        id: FrameId,
    ) -> &SwitchBlock {
        match &self.frame(id).kind {
            FrameKind::Switch(block) => block,
            other => panic!("expected switch block, found {}", other.name()),
        }
    }

    pub fn try_catch(
        &self,
        id: FrameId,
    ) -> &TryCatchBlock {
        match &self.frame(id).kind {
            FrameKind::TryCatch(block) => block,
            other => panic!("expected try/catch block, found {}", other.name()),
        }
    }

    pub fn try_finally(
        &self,
        id: FrameId,
    ) -> &TryFinallyBlock<'a> {
        match &self.frame(id).kind {
            FrameKind::TryFinally(block) => block,
            other => panic!("expected try/finally block, found {}", other.name()),
        }
    }

    // ===== Destinations =====

    /// A jump to the end of the labeled statement was emitted
    pub fn breakable_had_jumper(
        &self,
        id: FrameId,
    ) -> bool {
        self.breakable(id).destination.is_some()
    }

    pub fn breakable_destination(
        &self,
        id: FrameId,
    ) -> Option<InstrId> {
        self.breakable(id).destination
    }

    /// Destination of `break label`, searched from the current breakable top
    pub fn break_destination(
        &mut self,
        label: usize,
        factory: &mut impl JoinEntryFactory,
    ) -> Destination {
        let mut current = self.tops.breakable;
        let id = loop {
            let Some(id) = current else {
                panic!("no labeled statement with index {}", label);
            };
            if self.breakable(id).index == label {
                break id;
            }
            current = self.outer(id);
        };
        let block = match &mut self.frame_mut(id).kind {
            FrameKind::Breakable(block) => block,
            _ => unreachable!(),
        };
        let join = match block.destination {
            Some(join) => join,
            None => {
                let join = factory.build_join_entry(block.try_index);
                block.destination = Some(join);
                join
            }
        };
        Destination {
            join,
            outer_finally: block.outer_finally,
            context_depth: block.context_depth,
        }
    }

    pub fn switch_had_jumper(
        &self,
        id: FrameId,
        case: usize,
    ) -> bool {
        self.switch(id).destinations.contains_key(&case)
    }

    /// Destination of the case with index `target` across all enclosing
    /// switches
    pub fn switch_destination(
        &mut self,
        target: usize,
        factory: &mut impl JoinEntryFactory,
    ) -> Destination {
        let Some(mut id) = self.tops.switch else {
            panic!("no switch for case {}", target);
        };
        while self.switch(id).depth > target {
            match self.outer(id) {
                Some(outer) => id = outer,
                None => panic!("no switch for case {}", target),
            }
        }
        let depth = self.switch(id).depth;
        self.ensure_switch_destination(id, target - depth, factory)
    }

    /// Destination of case `case` of switch `id`
    pub fn switch_destination_direct(
        &mut self,
        id: FrameId,
        case: usize,
        factory: &mut impl JoinEntryFactory,
    ) -> Destination {
        self.ensure_switch_destination(id, case, factory)
    }

    fn ensure_switch_destination(
        &mut self,
        id: FrameId,
        case: usize,
        factory: &mut impl JoinEntryFactory,
    ) -> Destination {
        let block = match &mut self.frame_mut(id).kind {
            FrameKind::Switch(block) => block,
            other => panic!("expected switch block, found {}", other.name()),
        };
        let try_index = block.try_index;
        let join = *block
            .destinations
            .entry(case)
            .or_insert_with(|| factory.build_join_entry(try_index));
        Destination {
            join,
            outer_finally: block.outer_finally,
            context_depth: block.context_depth,
        }
    }
}
