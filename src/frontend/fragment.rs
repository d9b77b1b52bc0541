//! 指令片段
//!
//! A [`Fragment`] is a straight-line run of instructions under construction.
//! `entry` is its first instruction and `current` the one new code is linked
//! after. A fragment whose `current` is gone ends in a control transfer and
//! is closed; appending to it is a no-op.
//!
//! ```text
//! a + b     link a.current -> b.entry
//! a << i    link a.current -> i
//! ```

use crate::il::graph::GraphArena;
use crate::il::instruction::InstrId;
use std::cell::RefCell;
use std::ops::{Add, AddAssign, Shl, ShlAssign};
use std::rc::Rc;

/// Arena shared between a builder and the fragments it hands out
pub type GraphHandle = Rc<RefCell<GraphArena>>;

#[derive(Debug, Clone)]
pub struct Fragment {
    graph: GraphHandle,
    pub entry: Option<InstrId>,
    pub current: Option<InstrId>,
}

impl Fragment {
    /// Empty, open fragment
    pub fn new(graph: &GraphHandle) -> Self {
        Self {
            graph: Rc::clone(graph),
            entry: None,
            current: None,
        }
    }

    /// Fragment holding a single instruction
    pub fn from_instr(
        graph: &GraphHandle,
        instruction: InstrId,
    ) -> Self {
        Self::with_bounds(graph, instruction, instruction)
    }

    /// Fragment spanning `entry` to `current`, which must already be linked
    pub fn with_bounds(
        graph: &GraphHandle,
        entry: InstrId,
        current: InstrId,
    ) -> Self {
        Self {
            graph: Rc::clone(graph),
            entry: Some(entry),
            current: Some(current),
        }
    }

    /// Same entry, continuing at `current`
    pub fn continue_at(
        &self,
        current: InstrId,
    ) -> Self {
        Self {
            graph: Rc::clone(&self.graph),
            entry: self.entry.or(Some(current)),
            current: Some(current),
        }
    }

    #[inline]
    pub fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Code can still be appended
    #[inline]
    pub fn is_open(&self) -> bool {
        self.entry.is_none() || self.current.is_some()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Mark the fragment as ending in a control transfer
    pub fn closed(mut self) -> Self {
        self.current = None;
        self
    }

    /// Instructions from `entry` to `current` (or to the end of the chain)
    pub fn instructions(&self) -> Vec<InstrId> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };
        let graph = self.graph.borrow();
        let mut out = Vec::new();
        for id in graph.chain(entry) {
            out.push(id);
            if Some(id) == self.current {
                break;
            }
        }
        out
    }
}

impl AddAssign for Fragment {
    fn add_assign(
        &mut self,
        other: Fragment,
    ) {
        if self.entry.is_none() {
            self.entry = other.entry;
            self.current = other.current;
        } else if let (Some(current), Some(next)) = (self.current, other.entry) {
            self.graph.borrow_mut().link(current, next);
            self.current = other.current;
        }
    }
}

impl Add for Fragment {
    type Output = Fragment;

    fn add(
        mut self,
        other: Fragment,
    ) -> Fragment {
        self += other;
        self
    }
}

impl ShlAssign<InstrId> for Fragment {
    fn shl_assign(
        &mut self,
        next: InstrId,
    ) {
        if self.entry.is_none() {
            self.entry = Some(next);
            self.current = Some(next);
        } else if let Some(current) = self.current {
            self.graph.borrow_mut().link(current, next);
            self.current = Some(next);
        }
    }
}

impl Shl<InstrId> for Fragment {
    type Output = Fragment;

    fn shl(
        mut self,
        next: InstrId,
    ) -> Fragment {
        self <<= next;
        self
    }
}
