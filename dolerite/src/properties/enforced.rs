//! Enforceable distribution property.
//!
//! A required distribution is always paired with a matching mode: how close
//! the derived guarantee has to come to the requirement before the optimizer
//! stops considering a Motion. The pair is immutable and owned by the
//! operator's required-properties object for one optimization pass.

use std::fmt;
use std::sync::Arc;

use log::debug;
use strum_macros::AsRefStr;

use crate::config::OptimizerConfig;
use crate::error::{OptError, OptResult};
use crate::operator::{DistributionContract, PhysicalOperator};
use crate::plan::{PlanNodeIdGen, PlanNodeRef};
use crate::properties::{DerivedPlanProps, DistributionSpec, PartitionPropagationSpec};

/// How a derived distribution must line up with the required one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum DistributionMatching {
    /// Identical specs.
    Exact,
    /// The derived guarantee implies the requirement.
    Satisfy,
    /// The required expression list is a subset of the derived one; legal
    /// between two hashed specs only.
    Subset,
}

/// Verdict on inserting a Motion above a candidate plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum EnforcingType {
    /// The candidate already provides the requirement.
    #[display(fmt = "unnecessary")]
    Unnecessary,
    /// Enforcing here and enforcing below are both legal.
    #[display(fmt = "optional")]
    Optional,
    /// A Motion must be added on top of the candidate.
    #[display(fmt = "required")]
    Required,
    /// A Motion here would be incorrect; the branch dies unless another
    /// alternative provides the requirement.
    #[display(fmt = "prohibited")]
    Prohibited,
}

/// Required distribution spec plus matching mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnfdDistribution {
    spec: Arc<DistributionSpec>,
    matching: DistributionMatching,
}

impl EnfdDistribution {
    pub fn new(spec: Arc<DistributionSpec>, matching: DistributionMatching) -> Self {
        debug_assert!(
            matching != DistributionMatching::Subset || spec.as_hashed().is_some(),
            "subset matching on a {:?} requirement",
            spec.kind()
        );
        Self { spec, matching }
    }

    pub fn exact(spec: DistributionSpec) -> Self {
        Self::new(Arc::new(spec), DistributionMatching::Exact)
    }

    pub fn satisfy(spec: DistributionSpec) -> Self {
        Self::new(Arc::new(spec), DistributionMatching::Satisfy)
    }

    pub fn subset(spec: DistributionSpec) -> Self {
        Self::new(Arc::new(spec), DistributionMatching::Subset)
    }

    pub fn spec(&self) -> &DistributionSpec {
        &self.spec
    }

    pub fn matching(&self) -> DistributionMatching {
        self.matching
    }

    /// Is `derived` close enough to the requirement under this matching mode?
    pub fn is_compatible(&self, derived: &DistributionSpec) -> bool {
        match self.matching {
            DistributionMatching::Exact => derived.matches(&self.spec),
            DistributionMatching::Satisfy => derived.satisfies(&self.spec),
            DistributionMatching::Subset => derived.matches_subset(&self.spec),
        }
    }

    /// Enforcement verdict for one candidate plan.
    ///
    /// Pure in all inputs: identical arguments always produce the identical
    /// verdict. The partition check keeps a Motion from separating a
    /// partition selector from its consumer: a subtree with unresolved
    /// consumers that are not handed back to the required scope must not be
    /// re-distributed.
    pub fn epet(
        &self,
        operator: &PhysicalOperator,
        derived: &DerivedPlanProps,
        required_parts: &PartitionPropagationSpec,
        distribution_required: bool,
    ) -> EnforcingType {
        if !distribution_required {
            return EnforcingType::Unnecessary;
        }

        if self.matching == DistributionMatching::Satisfy
            && matches!(derived.distribution, DistributionSpec::Replicated)
            && self.spec.as_hashed().is_some()
        {
            // a replicated child meets any hashed requirement when only
            // satisfiability is asked for
            return EnforcingType::Unnecessary;
        }

        if derived.part_index_map.contains_unresolved()
            && !self.is_compatible(&derived.distribution)
            && !derived
                .part_index_map
                .is_subset(required_parts.part_index_map())
        {
            debug!(
                "prohibiting motion over unresolved partition consumers: {:?}",
                derived.part_index_map
            );
            return EnforcingType::Prohibited;
        }

        operator.enforcing_type(self, &derived.distribution)
    }

    /// Resolve one enforcement decision into the plan alternatives the driver
    /// should keep: the bare candidate, the candidate wrapped in a Motion, or
    /// neither (the branch is infeasible).
    pub fn enforced_alternatives(
        &self,
        operator: &PhysicalOperator,
        derived: &DerivedPlanProps,
        required_parts: &PartitionPropagationSpec,
        config: &OptimizerConfig,
        id_gen: &mut PlanNodeIdGen,
        candidate: PlanNodeRef,
    ) -> OptResult<Vec<PlanNodeRef>> {
        match self.epet(operator, derived, required_parts, true) {
            EnforcingType::Unnecessary => Ok(vec![candidate]),
            EnforcingType::Optional => {
                let mut alternatives = vec![candidate.clone()];
                self.spec
                    .append_enforcers(config, id_gen, candidate, &mut alternatives);
                Ok(alternatives)
            }
            EnforcingType::Required => {
                let mut alternatives = vec![];
                self.spec
                    .append_enforcers(config, id_gen, candidate, &mut alternatives);
                if alternatives.is_empty() {
                    return Err(OptError::NoFeasibleDistribution);
                }
                Ok(alternatives)
            }
            EnforcingType::Prohibited => Err(OptError::NoFeasibleDistribution),
        }
    }
}

impl fmt::Display for EnfdDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} match: {}", self.spec, self.matching.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{BroadcastMotion, UnionAll};
    use crate::plan::PlanNode;
    use crate::properties::{PartIndexMap, SingletonScope};
    use crate::test_utils::{columns, hashed_on};

    fn union_all_op() -> PhysicalOperator {
        UnionAll::new(columns(&["o1", "o2"]), vec![columns(&["a1", "a2"])]).into()
    }

    #[test]
    fn test_compatibility_per_matching_mode() {
        let derived = hashed_on(&["a", "b"]);

        assert!(EnfdDistribution::exact(hashed_on(&["a", "b"])).is_compatible(&derived));
        assert!(!EnfdDistribution::exact(hashed_on(&["a"])).is_compatible(&derived));
        assert!(EnfdDistribution::subset(hashed_on(&["a"])).is_compatible(&derived));
        assert!(
            EnfdDistribution::satisfy(hashed_on(&["a"]))
                .is_compatible(&DistributionSpec::singleton_master())
        );
    }

    #[test]
    #[should_panic(expected = "subset matching requires hashed specs")]
    fn test_subset_compatibility_rejects_non_hashed() {
        EnfdDistribution::subset(hashed_on(&["a"])).is_compatible(&DistributionSpec::Replicated);
    }

    #[test]
    fn test_replicated_child_meets_hashed_satisfy_requirement() {
        let enfd = EnfdDistribution::satisfy(hashed_on(&["a"]));
        let derived = DerivedPlanProps::new(DistributionSpec::Replicated);

        assert_eq!(
            EnforcingType::Unnecessary,
            enfd.epet(
                &union_all_op(),
                &derived,
                &PartitionPropagationSpec::default(),
                true
            )
        );

        // under exact matching the same child needs a motion
        let enfd = EnfdDistribution::exact(hashed_on(&["a"]));
        assert_eq!(
            EnforcingType::Required,
            enfd.epet(
                &union_all_op(),
                &derived,
                &PartitionPropagationSpec::default(),
                true
            )
        );
    }

    #[test]
    fn test_unresolved_partition_consumers_prohibit_enforcement() {
        let enfd = EnfdDistribution::satisfy(hashed_on(&["a"]));

        let mut pim = PartIndexMap::new();
        pim.add_unresolved(3);
        let derived = DerivedPlanProps::new(DistributionSpec::random()).with_part_index_map(pim);

        assert_eq!(
            EnforcingType::Prohibited,
            enfd.epet(
                &union_all_op(),
                &derived,
                &PartitionPropagationSpec::default(),
                true
            )
        );

        // consumers covered by the required scope are enforced in the group
        let mut required_pim = PartIndexMap::new();
        required_pim.add_unresolved(3);
        assert_eq!(
            EnforcingType::Required,
            enfd.epet(
                &union_all_op(),
                &derived,
                &PartitionPropagationSpec::new(required_pim),
                true
            )
        );
    }

    #[test]
    fn test_epet_is_deterministic() {
        let enfd = EnfdDistribution::satisfy(DistributionSpec::singleton_master());
        let derived = DerivedPlanProps::new(hashed_on(&["a"]));
        let parts = PartitionPropagationSpec::default();

        let first = enfd.epet(&union_all_op(), &derived, &parts, true);
        let second = enfd.epet(&union_all_op(), &derived, &parts, true);
        assert_eq!(first, second);
        assert_eq!(EnforcingType::Required, first);
    }

    #[test]
    fn test_epet_skips_when_distribution_not_required() {
        let enfd = EnfdDistribution::exact(DistributionSpec::singleton_master());
        let derived = DerivedPlanProps::new(DistributionSpec::random());

        assert_eq!(
            EnforcingType::Unnecessary,
            enfd.epet(
                &union_all_op(),
                &derived,
                &PartitionPropagationSpec::default(),
                false
            )
        );
    }

    #[test]
    fn test_enforced_alternatives_wraps_candidate() {
        let enfd = EnfdDistribution::satisfy(DistributionSpec::singleton_master());
        let derived = DerivedPlanProps::new(hashed_on(&["a"]));
        let mut id_gen = PlanNodeIdGen::new();
        let candidate = std::sync::Arc::new(PlanNode::new(
            id_gen.gen_next(),
            union_all_op(),
            vec![],
        ));

        let alternatives = enfd
            .enforced_alternatives(
                &union_all_op(),
                &derived,
                &PartitionPropagationSpec::default(),
                &OptimizerConfig::default(),
                &mut id_gen,
                candidate.clone(),
            )
            .unwrap();

        assert_eq!(1, alternatives.len());
        match alternatives[0].operator() {
            PhysicalOperator::GatherMotion(gather) => {
                assert_eq!(SingletonScope::Master, gather.scope())
            }
            other => panic!("expected a gather motion, got {other:?}"),
        }
        assert_eq!(candidate.id(), alternatives[0].inputs()[0].id());
    }

    #[test]
    fn test_enforced_alternatives_reports_infeasibility() {
        // random spray disabled and a non-singleton requirement unmet
        let enfd = EnfdDistribution::satisfy(DistributionSpec::non_singleton_without_replicated());
        let derived = DerivedPlanProps::new(DistributionSpec::Replicated);
        let config = OptimizerConfig {
            disable_random_motion: true,
            ..OptimizerConfig::default()
        };
        let mut id_gen = PlanNodeIdGen::new();
        let candidate = std::sync::Arc::new(PlanNode::new(
            id_gen.gen_next(),
            BroadcastMotion::new().into(),
            vec![],
        ));

        // a motion operator prohibits further enforcement on top of itself
        let result = enfd.enforced_alternatives(
            &BroadcastMotion::new().into(),
            &derived,
            &PartitionPropagationSpec::default(),
            &config,
            &mut id_gen,
            candidate.clone(),
        );
        assert!(matches!(result, Err(OptError::NoFeasibleDistribution)));

        // a regular operator hits the disabled-random fallback instead
        let result = enfd.enforced_alternatives(
            &union_all_op(),
            &derived,
            &PartitionPropagationSpec::default(),
            &config,
            &mut id_gen,
            candidate,
        );
        assert!(matches!(result, Err(OptError::NoFeasibleDistribution)));
    }
}
