//! Natural-loop detection from back edges.
//!
//! A back edge is an edge whose head dominates its tail; each one defines
//! exactly one natural loop, gathered by walking predecessors from the
//! tail until the header is reached.

use std::collections::HashSet;

use crate::cfg::ControlFlowGraph;

/// A natural loop: header, member blocks, and exit blocks, all as block
/// ids; `parent`/`nested` index into the loop list returned by
/// [`detect_loops`].
#[derive(Debug, Clone)]
pub struct Loop {
    pub header: usize,
    /// Member blocks, header included
    pub blocks: Vec<usize>,
    /// Members with at least one successor outside the loop
    pub exits: Vec<usize>,
    /// Index of the smallest strictly-containing loop
    pub parent: Option<usize>,
    /// Indices of directly nested loops
    pub nested: Vec<usize>,
}

impl Loop {
    /// True when the loop has no exit edges.
    pub fn is_infinite(&self) -> bool {
        self.exits.is_empty()
    }

    /// Nesting depth (0 = outermost), following the parent chain
    /// through `loops`.
    pub fn depth(&self, loops: &[Loop]) -> usize {
        let mut depth = 0;
        let mut parent = self.parent;
        while let Some(p) = parent {
            depth += 1;
            parent = loops[p].parent;
        }
        depth
    }
}

/// Detect all natural loops and mark each member block's `loop_header`.
pub fn detect_loops(cfg: &mut ControlFlowGraph) -> Vec<Loop> {
    let mut loops = Vec::new();

    for (tail, header) in find_back_edges(cfg) {
        let lp = construct_loop(cfg, tail, header);
        loops.push(lp);
    }

    for lp in &loops {
        for &block in &lp.blocks {
            cfg.blocks[block].loop_header = Some(lp.header);
        }
    }

    build_hierarchy(&mut loops);
    loops
}

/// Edges whose target dominates their source.
fn find_back_edges(cfg: &ControlFlowGraph) -> Vec<(usize, usize)> {
    let mut back_edges = Vec::new();

    for block in &cfg.blocks {
        for &succ in &block.successors {
            if cfg.dominates(succ, block.id) {
                back_edges.push((block.id, succ));
            }
        }
    }

    back_edges
}

/// Worklist construction of the natural loop for one back edge: every
/// block that can reach `tail` without passing through `header`.
fn construct_loop(cfg: &ControlFlowGraph, tail: usize, header: usize) -> Loop {
    let mut blocks = vec![header];
    let mut worklist = vec![tail];
    let mut visited: HashSet<usize> = HashSet::new();
    visited.insert(header);

    while let Some(block) = worklist.pop() {
        if !visited.insert(block) {
            continue;
        }
        blocks.push(block);

        for &pred in &cfg.blocks[block].predecessors {
            if !visited.contains(&pred) {
                worklist.push(pred);
            }
        }
    }

    let members: HashSet<usize> = blocks.iter().copied().collect();
    let mut exits = Vec::new();
    for &block in &blocks {
        if cfg.blocks[block]
            .successors
            .iter()
            .any(|succ| !members.contains(succ))
        {
            exits.push(block);
        }
    }

    Loop {
        header,
        blocks,
        exits,
        parent: None,
        nested: Vec::new(),
    }
}

/// Parent each loop under its smallest strictly-containing loop.
fn build_hierarchy(loops: &mut [Loop]) {
    let sets: Vec<HashSet<usize>> = loops
        .iter()
        .map(|l| l.blocks.iter().copied().collect())
        .collect();

    for j in 0..loops.len() {
        for i in 0..loops.len() {
            if i == j {
                continue;
            }
            // strict containment: every block of j in i, and i larger
            if sets[i].len() > sets[j].len() && loops[j].blocks.iter().all(|b| sets[i].contains(b))
            {
                match loops[j].parent {
                    None => loops[j].parent = Some(i),
                    Some(p) if sets[i].len() < sets[p].len() => loops[j].parent = Some(i),
                    _ => {}
                }
            }
        }
    }

    for j in 0..loops.len() {
        if let Some(p) = loops[j].parent {
            loops[p].nested.push(j);
        }
    }
}
