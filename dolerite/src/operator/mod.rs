//! Physical operators and their distribution contracts.
//!
//! Each operator implements the three-method contract the search driver
//! drives: [`DistributionContract::required_distribution`] top-down once per
//! (child, request) pair, [`DistributionContract::derive_distribution`]
//! bottom-up once the children are optimized, and
//! [`DistributionContract::enforcing_type`] as the operator hook of the
//! enforcement decision. The operator set is a closed enum so the branch
//! tables stay exhaustive under the compiler's eye.

mod join;
pub use join::*;
mod union_all;
pub use union_all::*;
mod aggregate;
pub use aggregate::*;
mod motion;
pub use motion::*;

use enum_dispatch::enum_dispatch;
use smallvec::SmallVec;

use crate::config::OptimizerConfig;
use crate::error::OptResult;
use crate::metadata::MetadataCatalog;
use crate::properties::{
    DistributionMatching, DistributionSpec, EnfdDistribution, EnforcingType,
};

/// Which child the search driver optimizes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChildExecOrder {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl ChildExecOrder {
    pub fn first_child(&self) -> usize {
        match self {
            ChildExecOrder::LeftToRight => 0,
            ChildExecOrder::RightToLeft => 1,
        }
    }
}

/// Driver-supplied facts about the expression being optimized.
///
/// The memo derives these from the logical subtree; this crate only consumes
/// them. Per-child vectors are indexed by child position and default to
/// `false` past their end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExprContext {
    /// The subtree must run on the coordinator, e.g. a master-only function
    /// below.
    pub master_only: bool,
    /// The subtree references columns produced outside of it.
    pub has_outer_refs: bool,
    pub child_outer_refs: SmallVec<[bool; 2]>,
    pub child_volatile_scan: SmallVec<[bool; 2]>,
}

impl ExprContext {
    pub fn child_has_outer_refs(&self, child_index: usize) -> bool {
        self.child_outer_refs
            .get(child_index)
            .copied()
            .unwrap_or(false)
    }

    pub fn child_has_volatile_scan(&self, child_index: usize) -> bool {
        self.child_volatile_scan
            .get(child_index)
            .copied()
            .unwrap_or(false)
    }
}

/// Inputs of one required-distribution computation.
pub struct RequiredDistrContext<'a> {
    pub expr: &'a ExprContext,
    /// Requirement arriving from the parent.
    pub required: &'a DistributionSpec,
    /// Child whose requirement is being computed.
    pub child_index: usize,
    /// Derived distributions of the siblings optimized before this child, in
    /// optimization order.
    pub optimized_children: &'a [DistributionSpec],
    /// Which of the operator's alternative requests is being built.
    pub request_index: usize,
    pub config: &'a OptimizerConfig,
    pub catalog: &'a dyn MetadataCatalog,
}

impl RequiredDistrContext<'_> {
    /// Derived spec of the first child the driver optimized.
    pub fn first_optimized(&self) -> Option<&DistributionSpec> {
        self.optimized_children.first()
    }
}

/// Inputs of one derive-distribution computation; children are in plan
/// order, all of them optimized.
pub struct DeriveDistrContext<'a> {
    pub expr: &'a ExprContext,
    pub children: &'a [DistributionSpec],
}

/// Per-operator distribution contract.
#[enum_dispatch(PhysicalOperator)]
pub trait DistributionContract {
    /// How many alternative child-requirement sets this operator offers.
    fn distribution_requests(&self) -> usize {
        1
    }

    fn child_exec_order(&self) -> ChildExecOrder {
        ChildExecOrder::default()
    }

    /// Requirement for the child in `ctx`, one of
    /// [`DistributionContract::distribution_requests`] alternatives.
    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec>;

    /// Distribution this operator delivers given its children's.
    fn derive_distribution(&self, ctx: &DeriveDistrContext) -> OptResult<DistributionSpec>;

    /// Matching mode for the child in `ctx`.
    fn matching_type(&self, _ctx: &RequiredDistrContext) -> DistributionMatching {
        DistributionMatching::Satisfy
    }

    /// Operator hook of the enforcement decision;
    /// [`EnfdDistribution::epet`] consults it after the partition checks.
    fn enforcing_type(
        &self,
        enfd: &EnfdDistribution,
        derived: &DistributionSpec,
    ) -> EnforcingType {
        if enfd.is_compatible(derived) {
            EnforcingType::Unnecessary
        } else {
            EnforcingType::Required
        }
    }
}

/// Physical relational operator.
#[derive(Clone, Debug, Hash, PartialEq)]
#[enum_dispatch]
pub enum PhysicalOperator {
    HashJoin(HashJoin),
    InnerNLJoin(InnerNLJoin),
    InnerIndexNLJoin(InnerIndexNLJoin),
    CorrelatedNLJoin(CorrelatedNLJoin),
    UnionAll(UnionAll),
    HashAggregate(HashAggregate),
    GatherMotion(GatherMotion),
    BroadcastMotion(BroadcastMotion),
    HashDistributeMotion(HashDistributeMotion),
    RandomMotion(RandomMotion),
}
