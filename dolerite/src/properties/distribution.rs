//! Distribution specifications and the satisfaction engine.
//!
//! A [`DistributionSpec`] states how a relation's rows are placed across the
//! nodes of a shared-nothing cluster. Specs are used both as requirements
//! (what a parent operator needs from a child) and as derived guarantees
//! (what an optimized subtree actually delivers). The whole correctness of
//! distributed planning hangs on [`DistributionSpec::satisfies`]: a missing
//! edge in the relation loses or duplicates rows, a spurious edge costs a
//! network shuffle.
//!
//! Specs are immutable after construction. Flags that the original engines
//! set through mutate-then-freeze calls (duplicate sensitivity, singleton
//! satisfiability) are builder options here, so an instance can be shared
//! across optimizer threads as `Arc<DistributionSpec>` with no further
//! synchronization.

use std::sync::Arc;

use datafusion_common::Column;
use datafusion_expr::Expr;
use enum_as_inner::EnumAsInner;
use enumset::EnumSetType;
use log::debug;
use strum_macros::AsRefStr;

use crate::config::OptimizerConfig;
use crate::error::OptResult;
use crate::metadata::MetadataCatalog;
use crate::operator::{
    BroadcastMotion, GatherMotion, HashDistributeMotion, PhysicalOperator, RandomMotion,
};
use crate::plan::{PlanNode, PlanNodeIdGen, PlanNodeRef};
use crate::properties::PhysicalProp;

/// Where a singleton distribution places its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, AsRefStr)]
pub enum SingletonScope {
    /// The coordinator node.
    #[default]
    Master,
    /// Any one segment, chosen by the executor.
    AnySegment,
}

/// No placement requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AnySpec {
    /// The subtree may reference columns of a sibling, which pins it to
    /// wherever those columns live. Only the inner side of an index
    /// nested-loops join requests this.
    pub allow_outer_refs: bool,
}

/// Rows with equal values of the distribution expressions are co-located.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashedSpec {
    exprs: Vec<Expr>,
    /// NULL-valued rows of the distribution expressions land on one node.
    nulls_colocated: bool,
    /// Rows duplicated by the delivering side would be a correctness hazard
    /// for whoever requires this spec.
    duplicate_sensitive: bool,
    /// Single-node data trivially meets this spec. Cleared to force a genuine
    /// spread across segments.
    satisfied_by_singleton: bool,
    /// An alternate hashed spec proven equivalent by a join predicate;
    /// satisfaction checks retry through it before failing.
    equiv: Option<Box<HashedSpec>>,
}

/// No placement guarantee at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RandomSpec {
    pub duplicate_sensitive: bool,
    pub satisfied_by_singleton: bool,
}

impl Default for RandomSpec {
    fn default() -> Self {
        Self {
            duplicate_sensitive: false,
            satisfied_by_singleton: true,
        }
    }
}

/// Rows spread over more than one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonSingletonSpec {
    /// Whether a replicated relation counts as a valid instance.
    pub allow_replicated: bool,
}

impl Default for NonSingletonSpec {
    fn default() -> Self {
        Self {
            allow_replicated: true,
        }
    }
}

/// Discriminant of [`DistributionSpec`].
#[derive(EnumSetType, Debug, Hash, AsRefStr)]
pub enum DistributionKind {
    Any,
    Hashed,
    Random,
    Replicated,
    Singleton,
    NonSingleton,
    Universal,
}

/// A guarantee about row placement across the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner)]
pub enum DistributionSpec {
    /// No requirement.
    Any(AnySpec),
    /// Co-located by hash of an expression list.
    Hashed(HashedSpec),
    /// Spread with no rule.
    Random(RandomSpec),
    /// A full copy on every node.
    Replicated,
    /// All rows on exactly one node.
    Singleton(SingletonScope),
    /// Spread over more than one node; request-only, never derived.
    NonSingleton(NonSingletonSpec),
    /// One logical row, available everywhere.
    Universal,
}

impl Default for DistributionSpec {
    fn default() -> Self {
        DistributionSpec::Random(RandomSpec::default())
    }
}

impl HashedSpec {
    /// `exprs` must be non-empty. Use [`HashedSpec::maximal_hashable`] when
    /// the column set may contain nothing hashable.
    pub fn new(exprs: Vec<Expr>, nulls_colocated: bool) -> Self {
        assert!(
            !exprs.is_empty(),
            "hashed distribution with no expressions"
        );
        Self {
            exprs,
            nulls_colocated,
            duplicate_sensitive: false,
            satisfied_by_singleton: true,
            equiv: None,
        }
    }

    pub fn from_columns(columns: &[Column], nulls_colocated: bool) -> Self {
        Self::new(
            columns.iter().cloned().map(Expr::Column).collect(),
            nulls_colocated,
        )
    }

    /// Hashed spec over the hashable subset of `columns`, or `None` when no
    /// column is hashable.
    pub fn maximal_hashable(
        columns: &[Column],
        catalog: &dyn MetadataCatalog,
        nulls_colocated: bool,
    ) -> OptResult<Option<Self>> {
        let mut exprs = Vec::with_capacity(columns.len());
        for column in columns {
            if catalog.is_hashable(column)? {
                exprs.push(Expr::Column(column.clone()));
            }
        }

        if exprs.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(exprs, nulls_colocated)))
    }

    pub fn with_duplicate_sensitive(mut self) -> Self {
        self.duplicate_sensitive = true;
        self
    }

    pub fn not_satisfied_by_singleton(mut self) -> Self {
        self.satisfied_by_singleton = false;
        self
    }

    /// Attach an equivalent spec. Chains stay one level deep: `equiv` must
    /// not carry an equivalent of its own.
    pub fn with_equiv(mut self, equiv: HashedSpec) -> Self {
        debug_assert!(equiv.equiv.is_none(), "equivalent spec chains must be flat");
        self.equiv = Some(Box::new(equiv));
        self
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    pub fn nulls_colocated(&self) -> bool {
        self.nulls_colocated
    }

    pub fn is_duplicate_sensitive(&self) -> bool {
        self.duplicate_sensitive
    }

    pub fn is_satisfied_by_singleton(&self) -> bool {
        self.satisfied_by_singleton
    }

    pub fn equiv(&self) -> Option<&HashedSpec> {
        self.equiv.as_deref()
    }

    /// This spec without its equivalent link.
    pub fn primary(&self) -> HashedSpec {
        HashedSpec {
            equiv: None,
            ..self.clone()
        }
    }

    // HD1 satisfies HD2 when HD1 colocates NULLs or HD2 does not care.
    fn nulls_compatible(&self, required: &HashedSpec) -> bool {
        self.nulls_colocated || !required.nulls_colocated
    }

    // HD1 satisfies HD2 when HD1 is duplicate sensitive or HD2 does not care.
    fn duplicates_compatible(&self, required: &HashedSpec) -> bool {
        self.duplicate_sensitive || !required.duplicate_sensitive
    }

    /// Does holding this guarantee meet the `required` hashed spec?
    ///
    /// Co-location on a coarser key implies co-location on any refinement, so
    /// this spec's expression list must be an order-preserving subsequence of
    /// the required one, with compatible NULL handling. Duplicate sensitivity
    /// does not weaken satisfaction between hashed specs: the flag rejects
    /// row-duplicating deliveries (replicated, universal), which a hashed one
    /// never is. On failure the check retries through the equivalent spec of
    /// either side.
    pub fn satisfies_hashed(&self, required: &HashedSpec) -> bool {
        if is_subsequence(&self.exprs, &required.exprs) && self.nulls_compatible(required) {
            return true;
        }

        if let Some(equiv) = self.equiv() {
            if equiv.satisfies_hashed(required) {
                return true;
            }
        }
        if let Some(equiv) = required.equiv() {
            if self.satisfies_hashed(equiv) {
                return true;
            }
        }

        false
    }

    /// `required`'s expression list is an order-preserving subsequence of
    /// this spec's, with compatible NULL and duplicate handling.
    pub fn matches_subset(&self, required: &HashedSpec) -> bool {
        if is_subsequence(&required.exprs, &self.exprs)
            && self.nulls_compatible(required)
            && self.duplicates_compatible(required)
        {
            return true;
        }

        if let Some(equiv) = self.equiv() {
            if equiv.matches_subset(required) {
                return true;
            }
        }
        if let Some(equiv) = required.equiv() {
            if self.matches_subset(equiv) {
                return true;
            }
        }

        false
    }
}

/// Every element of `needle` occurs in `haystack`, in order.
fn is_subsequence(needle: &[Expr], haystack: &[Expr]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|e| rest.any(|h| h == e))
}

impl DistributionSpec {
    pub fn any() -> Self {
        DistributionSpec::Any(AnySpec::default())
    }

    pub fn any_with_outer_refs() -> Self {
        DistributionSpec::Any(AnySpec {
            allow_outer_refs: true,
        })
    }

    pub fn hashed(exprs: Vec<Expr>, nulls_colocated: bool) -> Self {
        DistributionSpec::Hashed(HashedSpec::new(exprs, nulls_colocated))
    }

    pub fn random() -> Self {
        DistributionSpec::Random(RandomSpec::default())
    }

    pub fn singleton_master() -> Self {
        DistributionSpec::Singleton(SingletonScope::Master)
    }

    pub fn non_singleton() -> Self {
        DistributionSpec::NonSingleton(NonSingletonSpec::default())
    }

    pub fn non_singleton_without_replicated() -> Self {
        DistributionSpec::NonSingleton(NonSingletonSpec {
            allow_replicated: false,
        })
    }

    pub fn kind(&self) -> DistributionKind {
        match self {
            DistributionSpec::Any(_) => DistributionKind::Any,
            DistributionSpec::Hashed(_) => DistributionKind::Hashed,
            DistributionSpec::Random(_) => DistributionKind::Random,
            DistributionSpec::Replicated => DistributionKind::Replicated,
            DistributionSpec::Singleton(_) => DistributionKind::Singleton,
            DistributionSpec::NonSingleton(_) => DistributionKind::NonSingleton,
            DistributionSpec::Universal => DistributionKind::Universal,
        }
    }

    /// Whether rows live on a proper subset of nodes each. Replicated,
    /// singleton and universal data is complete wherever it is.
    pub fn is_partitioned(&self) -> bool {
        matches!(
            self,
            DistributionSpec::Any(_)
                | DistributionSpec::Hashed(_)
                | DistributionSpec::Random(_)
                | DistributionSpec::NonSingleton(_)
        )
    }

    /// Strict equality; the memo uses this for deduplication, so two specs
    /// that merely satisfy each other must not match.
    pub fn matches(&self, other: &DistributionSpec) -> bool {
        self == other
    }

    /// Does holding this guarantee also meet `required`?
    ///
    /// The relation is a preorder and deliberately not symmetric. Singleton
    /// data meets hashed, random and replicated
    /// requirements (everything sits on one node) unless the requirement is
    /// marked unsatisfiable by singletons. Replicated data meets any per-row
    /// requirement that is not duplicate sensitive.
    pub fn satisfies(&self, required: &DistributionSpec) -> bool {
        use DistributionSpec::*;

        match (self, required) {
            (_, Any(_)) => true,
            (Any(_), _) => false,

            (Universal, Hashed(h)) => !h.duplicate_sensitive,
            (Universal, Random(r)) => !r.duplicate_sensitive,
            (Universal, NonSingleton(ns)) => ns.allow_replicated,
            (Universal, _) => true,

            (Hashed(h1), Hashed(h2)) => h1.satisfies_hashed(h2),
            (Hashed(h), Random(r)) => h.duplicate_sensitive || !r.duplicate_sensitive,
            (Hashed(_), NonSingleton(_)) => true,
            (Hashed(_), _) => false,

            (Random(r1), Random(r2)) => r1.duplicate_sensitive || !r2.duplicate_sensitive,
            (Random(_), NonSingleton(_)) => true,
            (Random(_), _) => false,

            (Replicated, Replicated) => true,
            (Replicated, Hashed(h)) => !h.duplicate_sensitive,
            (Replicated, Random(r)) => !r.duplicate_sensitive,
            (Replicated, NonSingleton(ns)) => ns.allow_replicated,
            (Replicated, _) => false,

            (Singleton(s1), Singleton(s2)) => s1 == s2,
            (Singleton(_), Hashed(h)) => h.satisfied_by_singleton,
            (Singleton(_), Random(r)) => r.satisfied_by_singleton,
            (Singleton(_), Replicated) => true,
            (Singleton(_), _) => false,

            // NonSingleton is request-only; the arm keeps the relation
            // reflexive. Narrowing allow_replicated is not satisfaction.
            (NonSingleton(n1), NonSingleton(n2)) => !n1.allow_replicated || n2.allow_replicated,
            (NonSingleton(_), _) => false,
        }
    }

    /// Subset matching is defined for hashed specs only; calling it with any
    /// other variant is a caller bug.
    pub fn matches_subset(&self, required: &DistributionSpec) -> bool {
        match (self, required) {
            (DistributionSpec::Hashed(h1), DistributionSpec::Hashed(h2)) => h1.matches_subset(h2),
            _ => panic!(
                "subset matching requires hashed specs, got {:?} against {:?}",
                self.kind(),
                required.kind()
            ),
        }
    }

    /// Append Motion alternatives that realize this spec on top of `child`.
    ///
    /// Appending nothing is how an unenforceable requirement (e.g. random
    /// spray disabled) surfaces; the driver then abandons the branch. Must
    /// not be called at all when motions are globally disabled.
    pub fn append_enforcers(
        &self,
        config: &OptimizerConfig,
        id_gen: &mut PlanNodeIdGen,
        child: PlanNodeRef,
        enforcers: &mut Vec<PlanNodeRef>,
    ) {
        assert!(
            !config.disable_motions,
            "motion enforcement requested while motions are disabled"
        );

        let operator: PhysicalOperator = match self {
            DistributionSpec::Any(_) | DistributionSpec::Universal => return,
            DistributionSpec::Replicated => {
                if config.disable_broadcast_motion {
                    return;
                }
                BroadcastMotion::new().into()
            }
            DistributionSpec::Hashed(hashed) => {
                HashDistributeMotion::new(hashed.primary()).into()
            }
            DistributionSpec::Singleton(scope) => GatherMotion::new(*scope).into(),
            DistributionSpec::Random(random) => {
                if config.disable_random_motion {
                    return;
                }
                RandomMotion::new(*random).into()
            }
            DistributionSpec::NonSingleton(_) => {
                if config.disable_random_motion {
                    return;
                }
                RandomMotion::new(RandomSpec::default()).into()
            }
        };

        debug!("appending {:?} enforcer for {:?}", operator, self.kind());
        enforcers.push(Arc::new(PlanNode::new(
            id_gen.gen_next(),
            operator,
            vec![child],
        )));
    }
}

impl PhysicalProp for DistributionSpec {
    fn satisfies(&self, other: &Self) -> bool {
        DistributionSpec::satisfies(self, other)
    }
}
