//! Physical plan fragments.
//!
//! Enforcer insertion produces new plan alternatives by wrapping an already
//! optimized subtree in a Motion node. The driver keeps the real plan inside
//! its memo; this module only provides the small shared tree those
//! alternatives are expressed in.

use std::collections::HashSet;
use std::mem::swap;
use std::sync::Arc;

use crate::operator::PhysicalOperator;

pub type PlanNodeId = u32;

pub type PlanNodeRef = Arc<PlanNode>;

#[derive(Debug, Default)]
pub struct PlanNodeIdGen {
    next: PlanNodeId,
}

impl PlanNodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gen_next(&mut self) -> PlanNodeId {
        self.next += 1;
        self.next
    }
}

/// One node in a physical plan fragment.
#[derive(Debug)]
pub struct PlanNode {
    id: PlanNodeId,
    operator: PhysicalOperator,
    inputs: Vec<PlanNodeRef>,
}

/// The `eq` should ignore `id`.
impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator && self.inputs == other.inputs
    }
}

impl PlanNode {
    pub fn new(id: PlanNodeId, operator: PhysicalOperator, inputs: Vec<PlanNodeRef>) -> Self {
        Self {
            id,
            operator,
            inputs,
        }
    }

    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    pub fn operator(&self) -> &PhysicalOperator {
        &self.operator
    }

    pub fn inputs(&self) -> &[PlanNodeRef] {
        &self.inputs
    }
}

/// A plan fragment with a single root.
#[derive(Debug, PartialEq)]
pub struct Plan {
    root: PlanNodeRef,
}

impl Plan {
    pub fn new(root: PlanNodeRef) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PlanNodeRef {
        self.root.clone()
    }

    /// Breadth first traversal of the fragment.
    pub fn bfs_iterator(&self) -> impl Iterator<Item = PlanNodeRef> {
        let mut visited = HashSet::new();
        visited.insert(self.root.id);

        BfsPlanNodeIter {
            visited,
            cur_level: vec![self.root.clone()],
            next_level: vec![],
        }
    }
}

struct BfsPlanNodeIter {
    visited: HashSet<PlanNodeId>,
    cur_level: Vec<PlanNodeRef>,
    next_level: Vec<PlanNodeRef>,
}


impl Iterator for BfsPlanNodeIter {
    type Item = PlanNodeRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_level.is_empty() {
            swap(&mut self.cur_level, &mut self.next_level);
        }

        if let Some(p) = self.cur_level.pop() {
            for input in &p.inputs {
                if !self.visited.contains(&input.id) {
                    self.next_level.push(input.clone());
                    self.visited.insert(input.id);
                }
            }

            Some(p)
        } else {
            None
        }
    }
}
