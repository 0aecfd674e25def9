//! Control-flow graph construction and dominator analysis.
//!
//! Blocks live in an arena (`ControlFlowGraph::blocks`) and every
//! cross-reference — successors, predecessors, immediate dominators, loop
//! headers — is an index into it, which keeps the cyclic graph in plain
//! owned data.

pub mod conditionals;
pub mod loops;

pub use self::conditionals::{detect_conditionals, Conditional, ConditionalKind};
pub use self::loops::{detect_loops, Loop};

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::{Address, Function, Instruction, InstructionCategory};

/// A basic block: a maximal straight-line instruction sequence.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: usize,
    pub start_addr: Address,
    /// Address of the last instruction in the block
    pub end_addr: Address,
    pub instructions: Vec<Instruction>,
    /// Successor block ids, duplicate-free
    pub successors: Vec<usize>,
    /// Predecessor block ids, duplicate-free
    pub predecessors: Vec<usize>,
    pub is_entry: bool,
    pub is_exit: bool,
    /// Immediate dominator; the entry block dominates itself
    pub idom: Option<usize>,
    /// Header of the innermost-detected loop containing this block
    pub loop_header: Option<usize>,
}

impl BasicBlock {
    fn new(id: usize, start_addr: Address) -> Self {
        Self {
            id,
            start_addr,
            end_addr: start_addr,
            instructions: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            is_entry: false,
            is_exit: false,
            idom: None,
            loop_header: None,
        }
    }

    pub fn first_instruction(&self) -> Option<&Instruction> {
        self.instructions.first()
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// True if the block ends with a conditional branch.
    pub fn is_conditional_branch(&self) -> bool {
        self.last_instruction()
            .map(|i| i.is_conditional && i.is_branch)
            .unwrap_or(false)
    }

    /// True if the block ends with an unconditional branch.
    pub fn is_unconditional_branch(&self) -> bool {
        self.last_instruction()
            .map(|i| {
                !i.is_conditional && i.is_branch && i.category != InstructionCategory::Return
            })
            .unwrap_or(false)
    }

    /// True if the block ends with a return.
    pub fn ends_with_return(&self) -> bool {
        self.last_instruction()
            .map(|i| i.category == InstructionCategory::Return)
            .unwrap_or(false)
    }
}

/// Per-function control-flow graph over an arena of blocks.
#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    /// Blocks in start-address order; ids equal vector positions
    pub blocks: Vec<BasicBlock>,
    /// Entry block id (the first instruction's block)
    pub entry: Option<usize>,
    /// Blocks that end in a return or have no successors
    pub exit_blocks: Vec<usize>,
    /// Start address to block id
    pub block_by_addr: HashMap<Address, usize>,
}

impl ControlFlowGraph {
    /// Build the CFG for one function. An empty function yields an
    /// empty, valid graph.
    pub fn build(function: &Function) -> Self {
        let mut cfg = ControlFlowGraph::default();

        if function.instructions.is_empty() {
            return cfg;
        }

        let leaders = identify_leaders(function);
        cfg.blocks = create_blocks(function, &leaders);

        for block in &cfg.blocks {
            cfg.block_by_addr.insert(block.start_addr, block.id);
        }

        cfg.connect_blocks();

        cfg.entry = Some(0);
        cfg.blocks[0].is_entry = true;

        for id in 0..cfg.blocks.len() {
            let block = &cfg.blocks[id];
            if block.ends_with_return() || block.successors.is_empty() {
                cfg.blocks[id].is_exit = true;
                cfg.exit_blocks.push(id);
            }
        }

        cfg.compute_dominators();
        cfg
    }

    pub fn block(&self, id: usize) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Add an edge, suppressing duplicates and keeping the predecessor
    /// list symmetric.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.blocks[from].successors.contains(&to) {
            self.blocks[from].successors.push(to);
        }
        if !self.blocks[to].predecessors.contains(&from) {
            self.blocks[to].predecessors.push(from);
        }
    }

    /// True if block `a` dominates block `b`.
    ///
    /// Walks `b`'s immediate-dominator chain; the walk stops at the entry
    /// block, whose immediate dominator is itself.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.blocks[current].idom {
                Some(idom) if idom != current => current = idom,
                _ => return false,
            }
        }
    }

    /// Wire edges from each block's last instruction.
    fn connect_blocks(&mut self) {
        let mut edges: Vec<(usize, usize)> = Vec::new();

        for (i, block) in self.blocks.iter().enumerate() {
            let Some(last) = block.last_instruction() else {
                continue;
            };

            match last.category {
                InstructionCategory::Jump => {
                    if last.is_conditional {
                        // Conditional jump: branch target plus the next
                        // block in program order
                        if let Some(&target) = self.block_by_addr.get(&last.branch_target) {
                            edges.push((i, target));
                        }
                        if i + 1 < self.blocks.len() {
                            edges.push((i, i + 1));
                        }
                    } else if let Some(&target) = self.block_by_addr.get(&last.branch_target) {
                        edges.push((i, target));
                    }
                }
                InstructionCategory::Call => {
                    // A call falls through to the next block
                    if i + 1 < self.blocks.len() {
                        edges.push((i, i + 1));
                    }
                }
                InstructionCategory::Return => {}
                _ => {
                    if i + 1 < self.blocks.len() {
                        edges.push((i, i + 1));
                    }
                }
            }
        }

        for (from, to) in edges {
            self.add_edge(from, to);
        }
    }

    /// Iterative dominator fixed point.
    ///
    /// Initializes the entry to dominate itself, then repeatedly
    /// intersects each block's predecessors until nothing changes; the
    /// iteration is capped at |blocks|² as a hard bound.
    fn compute_dominators(&mut self) {
        let Some(entry) = self.entry else {
            return;
        };
        if self.blocks.is_empty() {
            return;
        }

        self.blocks[entry].idom = Some(entry);

        let mut changed = true;
        let mut max_iterations = self.blocks.len() * self.blocks.len();

        while changed && max_iterations > 0 {
            changed = false;
            max_iterations -= 1;

            for id in 0..self.blocks.len() {
                if id == entry {
                    continue;
                }

                let mut new_idom: Option<usize> = None;
                for &pred in &self.blocks[id].predecessors {
                    if self.blocks[pred].idom.is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => self.intersect(pred, current),
                    });
                }

                if new_idom.is_some() && new_idom != self.blocks[id].idom {
                    self.blocks[id].idom = new_idom;
                    changed = true;
                }
            }
        }
    }

    /// Walk two fingers up the dominator tree until they meet, advancing
    /// whichever sits at the higher block id.
    fn intersect(&self, a: usize, b: usize) -> usize {
        let mut finger1 = a;
        let mut finger2 = b;

        while finger1 != finger2 {
            while finger1 > finger2 {
                match self.blocks[finger1].idom {
                    Some(idom) if idom != finger1 => finger1 = idom,
                    _ => return finger2,
                }
            }
            while finger2 > finger1 {
                match self.blocks[finger2].idom {
                    Some(idom) if idom != finger2 => finger2 = idom,
                    _ => return finger1,
                }
            }
        }

        finger1
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Blocks: {}", self.blocks.len())?;
        for block in &self.blocks {
            writeln!(
                f,
                "Block {} (0x{:x} - 0x{:x}): {} instructions",
                block.id,
                block.start_addr,
                block.end_addr,
                block.instructions.len()
            )?;
            writeln!(f, "  Predecessors: {:?}", block.predecessors)?;
            writeln!(f, "  Successors: {:?}", block.successors)?;
            if let Some(idom) = block.idom {
                writeln!(f, "  Dominated by: {}", idom)?;
            }
        }
        Ok(())
    }
}

/// The leader set: first instruction, branch targets, and instructions
/// following a control-flow instruction that falls through or is a call.
fn identify_leaders(function: &Function) -> HashSet<Address> {
    let mut leaders = HashSet::new();

    leaders.insert(function.instructions[0].address);

    for (i, inst) in function.instructions.iter().enumerate() {
        if inst.is_branch && inst.branch_target != 0 {
            leaders.insert(inst.branch_target);
        }

        if inst.is_control_flow() && i + 1 < function.instructions.len() {
            if inst.falls_through || inst.category == InstructionCategory::Call {
                leaders.insert(function.instructions[i + 1].address);
            }
        }
    }

    leaders
}

/// Partition the instruction list into blocks at the leaders.
///
/// A terminator ends its block only when the next instruction is a
/// leader; otherwise the block continues. This keeps a fall-through call
/// inside a single block when no later leader intervenes.
fn create_blocks(function: &Function, leaders: &HashSet<Address>) -> Vec<BasicBlock> {
    let mut blocks: Vec<BasicBlock> = Vec::new();
    let mut current: Option<BasicBlock> = None;
    let mut next_id = 0;

    for (i, inst) in function.instructions.iter().enumerate() {
        if leaders.contains(&inst.address) {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some(BasicBlock::new(next_id, inst.address));
            next_id += 1;
        }

        if let Some(block) = current.as_mut() {
            block.end_addr = inst.address;
            block.instructions.push(inst.clone());
        }

        // a terminator closes the block only when the next instruction
        // starts one
        if inst.is_terminator()
            && i + 1 < function.instructions.len()
            && leaders.contains(&function.instructions[i + 1].address)
        {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
        }
    }

    if let Some(block) = current.take() {
        blocks.push(block);
    }

    blocks
}
