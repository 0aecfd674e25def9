//! Recognition of two-way and multi-way conditional structures.

use std::collections::{HashSet, VecDeque};

use crate::cfg::ControlFlowGraph;

/// Shape of a recognized conditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalKind {
    IfThen,
    IfThenElse,
    Switch,
}

impl ConditionalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionalKind::IfThen => "if-then",
            ConditionalKind::IfThenElse => "if-then-else",
            ConditionalKind::Switch => "switch",
        }
    }
}

/// A recognized conditional structure over CFG block ids.
#[derive(Debug, Clone)]
pub struct Conditional {
    pub kind: ConditionalKind,
    /// Block ending in the conditional branch
    pub condition: usize,
    pub then_block: usize,
    pub else_block: usize,
    /// Where the branches rejoin, when discoverable
    pub merge: Option<usize>,
    /// Case blocks, for switches
    pub cases: Vec<usize>,
}

/// Find if-then / if-then-else / switch structures in the CFG.
pub fn detect_conditionals(cfg: &ControlFlowGraph) -> Vec<Conditional> {
    let mut conditionals = Vec::new();

    for block in &cfg.blocks {
        if !block.is_conditional_branch() {
            continue;
        }

        if block.successors.len() == 2 {
            conditionals.push(analyze_if_else(cfg, block.id));
        } else if block.successors.len() > 2 {
            conditionals.push(analyze_switch(cfg, block.id));
        }
    }

    conditionals
}

/// Classify a two-way branch.
fn analyze_if_else(cfg: &ControlFlowGraph, condition: usize) -> Conditional {
    let then_block = cfg.blocks[condition].successors[0];
    let else_block = cfg.blocks[condition].successors[1];

    let mut cond = Conditional {
        kind: ConditionalKind::IfThen,
        condition,
        then_block,
        else_block,
        merge: None,
        cases: Vec::new(),
    };

    if let Some(merge) = find_merge_point(cfg, then_block, else_block) {
        cond.merge = Some(merge);
        cond.kind = ConditionalKind::IfThenElse;
    } else if cfg.blocks[else_block].instructions.is_empty()
        && cfg.blocks[else_block].successors.len() == 1
    {
        cond.kind = ConditionalKind::IfThen;
        cond.merge = Some(cfg.blocks[else_block].successors[0]);
    } else if cfg.blocks[then_block].instructions.is_empty()
        && cfg.blocks[then_block].successors.len() == 1
    {
        cond.kind = ConditionalKind::IfThen;
        cond.merge = Some(cfg.blocks[then_block].successors[0]);
    }

    cond
}

/// Find where two branches rejoin: BFS collects everything reachable
/// from the first branch, then a BFS from the second reports the first
/// shared block that is neither branch head.
fn find_merge_point(cfg: &ControlFlowGraph, branch1: usize, branch2: usize) -> Option<usize> {
    let mut from_first: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<usize> = VecDeque::new();
    queue.push_back(branch1);

    while let Some(block) = queue.pop_front() {
        if !from_first.insert(block) {
            continue;
        }
        queue.extend(cfg.blocks[block].successors.iter().copied());
    }

    let mut visited: HashSet<usize> = HashSet::new();
    queue.push_back(branch2);

    while let Some(block) = queue.pop_front() {
        if !visited.insert(block) {
            continue;
        }
        if from_first.contains(&block) && block != branch1 && block != branch2 {
            return Some(block);
        }
        queue.extend(cfg.blocks[block].successors.iter().copied());
    }

    None
}

/// Classify a multi-way branch as a candidate switch.
fn analyze_switch(cfg: &ControlFlowGraph, condition: usize) -> Conditional {
    let successors = cfg.blocks[condition].successors.clone();

    let mut cond = Conditional {
        kind: ConditionalKind::Switch,
        condition,
        then_block: successors[0],
        else_block: successors[1],
        merge: None,
        cases: successors.clone(),
    };

    // The merge point is any block every case flows into.
    for &succ in &successors {
        if cfg.blocks[succ].successors.len() == 1 {
            let candidate = cfg.blocks[succ].successors[0];
            if is_common_successor(cfg, candidate, &successors) {
                cond.merge = Some(candidate);
                break;
            }
        }
    }

    cond
}

fn is_common_successor(cfg: &ControlFlowGraph, target: usize, blocks: &[usize]) -> bool {
    blocks
        .iter()
        .all(|&b| cfg.blocks[b].successors.contains(&target))
}
