//! Physical distribution properties of relational plans.
//!
//! [`DistributionSpec`] describes how rows are placed across the cluster,
//! [`EnfdDistribution`] pairs a required spec with a matching mode, and
//! [`PartIndexMap`] carries the partition-propagation facts the enforcement
//! decision depends on.

mod distribution;
pub use distribution::*;
mod enforced;
pub use enforced::*;
mod partition;
pub use partition::*;

use std::fmt::Debug;
use std::hash::Hash;

pub trait PhysicalProp: Debug + Hash {
    /// Tests whether self satisfies `other`.
    fn satisfies(&self, other: &Self) -> bool;
}

/// Plan properties derived bottom-up for one optimized subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedPlanProps {
    pub distribution: DistributionSpec,
    pub part_index_map: PartIndexMap,
}

impl DerivedPlanProps {
    pub fn new(distribution: DistributionSpec) -> Self {
        Self {
            distribution,
            part_index_map: PartIndexMap::default(),
        }
    }

    pub fn with_part_index_map(mut self, part_index_map: PartIndexMap) -> Self {
        self.part_index_map = part_index_map;
        self
    }
}
