//! Flow graph
//!
//! [`GraphArena`] owns every instruction created while a function is being
//! translated. [`FlowGraph`] is the finished artifact: the arena plus the
//! reachable blocks in preorder, their predecessors, and the side tables the
//! downstream stages need.

use crate::frontend::scope::{LocalVariable, VarId};
use crate::il::instruction::{InstrId, InstrKind, Instruction};
use crate::object::FunctionId;
use indexmap::IndexMap;
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Instruction storage of one graph
#[derive(Debug, Clone, Default)]
pub struct GraphArena {
    instructions: Vec<Instruction>,
}

impl GraphArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        instruction: Instruction,
    ) -> InstrId {
        self.instructions.push(instruction);
        InstrId(self.instructions.len() as u32 - 1)
    }

    #[inline]
    pub fn get(
        &self,
        id: InstrId,
    ) -> &Instruction {
        &self.instructions[id.index()]
    }

    #[inline]
    pub fn get_mut(
        &mut self,
        id: InstrId,
    ) -> &mut Instruction {
        &mut self.instructions[id.index()]
    }

    /// Make `to` follow `from` in its block
    #[inline]
    pub fn link(
        &mut self,
        from: InstrId,
        to: InstrId,
    ) {
        self.instructions[from.index()].next = Some(to);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instructions of the chain starting at `entry`
    pub fn chain(
        &self,
        entry: InstrId,
    ) -> ChainIter<'_> {
        ChainIter {
            arena: self,
            current: Some(entry),
        }
    }
}

impl Index<InstrId> for GraphArena {
    type Output = Instruction;

    fn index(
        &self,
        id: InstrId,
    ) -> &Instruction {
        self.get(id)
    }
}

impl IndexMut<InstrId> for GraphArena {
    fn index_mut(
        &mut self,
        id: InstrId,
    ) -> &mut Instruction {
        self.get_mut(id)
    }
}

/// Walks `next` links
pub struct ChainIter<'a> {
    arena: &'a GraphArena,
    current: Option<InstrId>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = InstrId;

    fn next(&mut self) -> Option<InstrId> {
        let id = self.current?;
        self.current = self.arena.get(id).next;
        Some(id)
    }
}

/// Structural defects found by [`FlowGraph::verify`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph entry {0} is not a GraphEntry instruction")]
    BadGraphEntry(InstrId),

    #[error("block B{block} does not start with a block entry")]
    NotABlockEntry { block: usize },

    #[error("second graph entry at {0}")]
    DuplicateGraphEntry(InstrId),

    #[error("block B{block} has no terminator")]
    MissingTerminator { block: usize },

    #[error("block B{block} has a terminator before its last instruction")]
    EarlyTerminator { block: usize },

    #[error("block B{block} contains nested block entry {instruction}")]
    NestedBlockEntry { block: usize, instruction: InstrId },

    #[error("block B{block} jumps to {successor}, which is not a block entry")]
    BadSuccessor { block: usize, successor: InstrId },

    #[error("block id {0} used twice")]
    DuplicateBlockId(usize),
}

/// The built graph of one function
#[derive(Debug, Clone)]
pub struct FlowGraph {
    pub function: FunctionId,
    pub name: String,
    arena: GraphArena,
    graph_entry: InstrId,
    /// Reachable blocks, preorder from the graph entry
    blocks: Vec<InstrId>,
    predecessors: IndexMap<InstrId, Vec<InstrId>>,
    max_block_id: usize,
    deopt_id_count: usize,
    context_level_array: Option<Vec<(usize, usize)>>,
    variables: Vec<LocalVariable>,
}

impl FlowGraph {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        function: FunctionId,
        name: String,
        arena: GraphArena,
        graph_entry: InstrId,
        variables: Vec<LocalVariable>,
        max_block_id: usize,
        deopt_id_count: usize,
        context_level_array: Option<Vec<(usize, usize)>>,
    ) -> Self {
        let mut graph = FlowGraph {
            function,
            name,
            arena,
            graph_entry,
            blocks: Vec::new(),
            predecessors: IndexMap::new(),
            max_block_id,
            deopt_id_count,
            context_level_array,
            variables,
        };
        graph.discover_blocks();
        graph
    }

    /// Recompute the reachable blocks and their predecessors
    pub fn discover_blocks(&mut self) {
        self.blocks.clear();
        self.predecessors.clear();
        let mut visited = hashbrown::HashSet::new();
        let mut worklist = vec![self.graph_entry];
        visited.insert(self.graph_entry);
        self.predecessors.insert(self.graph_entry, Vec::new());
        while let Some(block) = worklist.pop() {
            self.blocks.push(block);
            let last = self.last_instruction(block);
            let successors = self.arena.get(last).successors();
            for &successor in successors.iter() {
                self.predecessors.entry(successor).or_default().push(block);
            }
            // Reverse so the first successor is visited first.
            for &successor in successors.iter().rev() {
                if visited.insert(successor) {
                    worklist.push(successor);
                }
            }
        }
    }

    #[inline]
    pub fn arena(&self) -> &GraphArena {
        &self.arena
    }

    #[inline]
    pub fn instruction(
        &self,
        id: InstrId,
    ) -> &Instruction {
        self.arena.get(id)
    }

    #[inline]
    pub fn graph_entry(&self) -> InstrId {
        self.graph_entry
    }

    /// First block of the function body
    pub fn normal_entry(&self) -> Option<InstrId> {
        match &self.arena.get(self.graph_entry).kind {
            InstrKind::GraphEntry { normal_entry, .. } => *normal_entry,
            _ => None,
        }
    }

    pub fn catch_entries(&self) -> &[InstrId] {
        match &self.arena.get(self.graph_entry).kind {
            InstrKind::GraphEntry { catch_entries, .. } => catch_entries,
            _ => &[],
        }
    }

    #[inline]
    pub fn blocks(&self) -> &[InstrId] {
        &self.blocks
    }

    /// Reachable blocks including the graph entry
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Reachable blocks that hold code; the graph entry only names successors
    #[inline]
    pub fn body_block_count(&self) -> usize {
        self.blocks.len().saturating_sub(1)
    }

    /// Control transfers over all reachable blocks
    pub fn terminator_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|&&b| self.arena.get(self.last_instruction(b)).is_control_transfer())
            .count()
    }

    pub fn predecessors(
        &self,
        block: InstrId,
    ) -> &[InstrId] {
        self.predecessors
            .get(&block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn successors(
        &self,
        block: InstrId,
    ) -> Vec<InstrId> {
        self.arena
            .get(self.last_instruction(block))
            .successors()
            .into_vec()
    }

    /// Instructions of a block, entry first
    pub fn block_instructions(
        &self,
        block: InstrId,
    ) -> impl Iterator<Item = InstrId> + '_ {
        self.arena.chain(block)
    }

    pub fn last_instruction(
        &self,
        block: InstrId,
    ) -> InstrId {
        self.arena.chain(block).last().unwrap_or(block)
    }

    /// Block entry with the given block number
    pub fn find_block(
        &self,
        block_id: usize,
    ) -> Option<InstrId> {
        self.blocks
            .iter()
            .copied()
            .find(|&b| self.arena.get(b).block_id() == Some(block_id))
    }

    #[inline]
    pub fn max_block_id(&self) -> usize {
        self.max_block_id
    }

    #[inline]
    pub fn deopt_id_count(&self) -> usize {
        self.deopt_id_count
    }

    /// `(deopt id, context depth)` pairs, when tracked
    pub fn context_level_array(&self) -> Option<&[(usize, usize)]> {
        self.context_level_array.as_deref()
    }

    #[inline]
    pub fn variables(&self) -> &[LocalVariable] {
        &self.variables
    }

    #[inline]
    pub fn variable(
        &self,
        id: VarId,
    ) -> &LocalVariable {
        &self.variables[id.index()]
    }

    /// Number of instructions of the given mnemonic in reachable blocks
    pub fn count(
        &self,
        mnemonic: &str,
    ) -> usize {
        self.blocks
            .iter()
            .flat_map(|&b| self.block_instructions(b))
            .filter(|&i| self.arena.get(i).mnemonic() == mnemonic)
            .count()
    }

    /// Check the single-entry, single-terminator shape
    pub fn verify(&self) -> Result<(), GraphError> {
        if !matches!(self.arena.get(self.graph_entry).kind, InstrKind::GraphEntry { .. }) {
            return Err(GraphError::BadGraphEntry(self.graph_entry));
        }
        let mut seen_ids = hashbrown::HashSet::new();
        for &block in &self.blocks {
            let entry = self.arena.get(block);
            let Some(block_id) = entry.block_id() else {
                return Err(GraphError::NotABlockEntry {
                    block: self.blocks.iter().position(|&b| b == block).unwrap_or(0),
                });
            };
            if !seen_ids.insert(block_id) {
                return Err(GraphError::DuplicateBlockId(block_id));
            }
            if block != self.graph_entry && matches!(entry.kind, InstrKind::GraphEntry { .. }) {
                return Err(GraphError::DuplicateGraphEntry(block));
            }

            let chain: Vec<InstrId> = self.arena.chain(block).collect();
            for &id in &chain[1..] {
                if self.arena.get(id).is_block_entry() {
                    return Err(GraphError::NestedBlockEntry {
                        block: block_id,
                        instruction: id,
                    });
                }
            }
            let Some((&last, body)) = chain.split_last() else {
                continue;
            };
            if body.iter().any(|&id| self.arena.get(id).is_control_transfer()) {
                return Err(GraphError::EarlyTerminator { block: block_id });
            }
            let last = self.arena.get(last);
            if block != self.graph_entry && !last.is_control_transfer() {
                return Err(GraphError::MissingTerminator { block: block_id });
            }
            for successor in last.successors() {
                let target = self.arena.get(successor);
                if !target.is_block_entry() || matches!(target.kind, InstrKind::GraphEntry { .. }) {
                    return Err(GraphError::BadSuccessor {
                        block: block_id,
                        successor,
                    });
                }
            }
        }
        Ok(())
    }
}
