//! Motion enforcers.
//!
//! A Motion changes row placement and nothing else. Motions are never
//! produced by implementation rules; they enter the plan exclusively through
//! [`DistributionSpec::append_enforcers`](crate::properties::DistributionSpec::append_enforcers)
//! when an enforcement verdict demands one. Stacking a second Motion
//! directly on top of one is never useful, which is why their enforcement
//! hook answers Prohibited instead of Required.

use crate::error::OptResult;
use crate::operator::{DeriveDistrContext, DistributionContract, RequiredDistrContext};
use crate::properties::{
    DistributionSpec, EnfdDistribution, EnforcingType, HashedSpec, RandomSpec, SingletonScope,
};

fn motion_required(ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
    debug_assert_eq!(0, ctx.child_index);
    Ok(DistributionSpec::any())
}

fn motion_enforcing_type(enfd: &EnfdDistribution, derived: &DistributionSpec) -> EnforcingType {
    if enfd.is_compatible(derived) {
        EnforcingType::Unnecessary
    } else {
        EnforcingType::Prohibited
    }
}

/// Collects all rows on one node.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct GatherMotion {
    scope: SingletonScope,
}

impl GatherMotion {
    pub fn new(scope: SingletonScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> SingletonScope {
        self.scope
    }
}

impl DistributionContract for GatherMotion {
    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        motion_required(ctx)
    }

    fn derive_distribution(&self, _ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        Ok(DistributionSpec::Singleton(self.scope))
    }

    fn enforcing_type(
        &self,
        enfd: &EnfdDistribution,
        derived: &DistributionSpec,
    ) -> EnforcingType {
        motion_enforcing_type(enfd, derived)
    }
}

/// Copies all rows to every node.
#[derive(Clone, Debug, Hash, PartialEq, Default)]
pub struct BroadcastMotion;

impl BroadcastMotion {
    pub fn new() -> Self {
        Self
    }
}

impl DistributionContract for BroadcastMotion {
    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        motion_required(ctx)
    }

    fn derive_distribution(&self, _ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        Ok(DistributionSpec::Replicated)
    }

    fn enforcing_type(
        &self,
        enfd: &EnfdDistribution,
        derived: &DistributionSpec,
    ) -> EnforcingType {
        motion_enforcing_type(enfd, derived)
    }
}

/// Redistributes rows by hash of an expression list.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct HashDistributeMotion {
    spec: HashedSpec,
}

impl HashDistributeMotion {
    pub fn new(spec: HashedSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &HashedSpec {
        &self.spec
    }
}

impl DistributionContract for HashDistributeMotion {
    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        motion_required(ctx)
    }

    fn derive_distribution(&self, _ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        Ok(DistributionSpec::Hashed(self.spec.clone()))
    }

    fn enforcing_type(
        &self,
        enfd: &EnfdDistribution,
        derived: &DistributionSpec,
    ) -> EnforcingType {
        motion_enforcing_type(enfd, derived)
    }
}

/// Sprays rows across segments with no placement rule.
#[derive(Clone, Debug, Hash, PartialEq, Default)]
pub struct RandomMotion {
    spec: RandomSpec,
}

impl RandomMotion {
    pub fn new(spec: RandomSpec) -> Self {
        Self { spec }
    }
}

impl DistributionContract for RandomMotion {
    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        motion_required(ctx)
    }

    fn derive_distribution(&self, _ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        Ok(DistributionSpec::Random(self.spec))
    }

    fn enforcing_type(
        &self,
        enfd: &EnfdDistribution,
        derived: &DistributionSpec,
    ) -> EnforcingType {
        motion_enforcing_type(enfd, derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::operator::ExprContext;
    use crate::test_utils::{hashed_on, int_catalog, request_ctx};

    #[test]
    fn test_motions_require_any_and_deliver_their_spec() {
        let catalog = int_catalog(&["a"]);
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = DistributionSpec::singleton_master();
        let children = [DistributionSpec::random()];
        let derive_ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };

        let gather = GatherMotion::new(SingletonScope::Master);
        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        assert_eq!(
            DistributionSpec::any(),
            gather.required_distribution(&ctx).unwrap()
        );
        assert_eq!(
            DistributionSpec::singleton_master(),
            gather.derive_distribution(&derive_ctx).unwrap()
        );

        assert_eq!(
            DistributionSpec::Replicated,
            BroadcastMotion::new()
                .derive_distribution(&derive_ctx)
                .unwrap()
        );

        let hashed = hashed_on(&["a"]);
        let motion = HashDistributeMotion::new(hashed.as_hashed().unwrap().clone());
        assert_eq!(hashed, motion.derive_distribution(&derive_ctx).unwrap());

        assert_eq!(
            DistributionSpec::random(),
            RandomMotion::new(RandomSpec::default())
                .derive_distribution(&derive_ctx)
                .unwrap()
        );
    }

    #[test]
    fn test_motion_prohibits_stacked_enforcement() {
        let gather = GatherMotion::new(SingletonScope::Master);

        let satisfied = EnfdDistribution::satisfy(DistributionSpec::singleton_master());
        assert_eq!(
            EnforcingType::Unnecessary,
            gather.enforcing_type(&satisfied, &DistributionSpec::singleton_master())
        );

        let unsatisfied = EnfdDistribution::satisfy(hashed_on(&["a"]));
        assert_eq!(
            EnforcingType::Prohibited,
            gather.enforcing_type(&unsatisfied, &DistributionSpec::singleton_master())
        );
    }
}
