//! Glue to the partition-propagation subsystem.
//!
//! Dynamic partition elimination pairs a partition *selector* with the scan
//! that *consumes* the selected partitions. A Motion placed between the two
//! would ship partition ids across the cluster and break the pairing, so the
//! enforcement decision must know whether a subtree still has consumers
//! waiting for their selector. Only that bookkeeping lives here; selector
//! placement itself is the propagation subsystem's job.

use std::collections::BTreeSet;

/// Identifier of a partitioned table scan taking part in dynamic elimination.
pub type ScanId = u32;

/// Partition consumers tracked on one subtree, split by whether their
/// selector has been placed below already.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PartIndexMap {
    unresolved: BTreeSet<ScanId>,
    resolved: BTreeSet<ScanId>,
}

impl PartIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a consumer whose selector is still expected from above. Must be
    /// called before the map is shared.
    pub fn add_unresolved(&mut self, scan_id: ScanId) {
        self.unresolved.insert(scan_id);
    }

    /// Record a consumer whose selector was placed inside the subtree.
    pub fn add_resolved(&mut self, scan_id: ScanId) {
        self.resolved.insert(scan_id);
    }

    pub fn contains_unresolved(&self) -> bool {
        !self.unresolved.is_empty()
    }

    /// All scan ids tracked by this map appear in `other`.
    pub fn is_subset(&self, other: &PartIndexMap) -> bool {
        self.scan_ids().all(|id| {
            other.unresolved.contains(&id) || other.resolved.contains(&id)
        })
    }

    pub fn scan_ids(&self) -> impl Iterator<Item = ScanId> + '_ {
        self.unresolved.iter().chain(self.resolved.iter()).copied()
    }
}

/// Required partition propagation of a group; the enforcement decision only
/// reads its index map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PartitionPropagationSpec {
    pim: PartIndexMap,
}

impl PartitionPropagationSpec {
    pub fn new(pim: PartIndexMap) -> Self {
        Self { pim }
    }

    pub fn part_index_map(&self) -> &PartIndexMap {
        &self.pim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_covers_resolved_and_unresolved() {
        let mut derived = PartIndexMap::new();
        derived.add_unresolved(1);

        let mut required = PartIndexMap::new();
        required.add_resolved(1);
        assert!(derived.is_subset(&required));

        derived.add_unresolved(2);
        assert!(!derived.is_subset(&required));

        required.add_unresolved(2);
        assert!(derived.is_subset(&required));
    }

    #[test]
    fn test_contains_unresolved() {
        let mut pim = PartIndexMap::new();
        assert!(!pim.contains_unresolved());

        pim.add_resolved(7);
        assert!(!pim.contains_unresolved());

        pim.add_unresolved(8);
        assert!(pim.contains_unresolved());
    }
}
