//! Join operators.
//!
//! All binary joins share one request/derive skeleton: the outer child is
//! free to deliver anything, and the inner child is then asked to line up
//! with whatever the outer side actually delivered. The concrete operators
//! layer their own alternatives on top: a hash join co-locates both sides on
//! the equi-join keys, an inner nested-loops join may broadcast its outer
//! side instead, an index nested-loops join works in the reversed direction
//! because the index subtree cannot be moved, and correlated joins serialize
//! whatever correlated execution demands.

use datafusion_common::Column;
use datafusion_expr::logical_plan::JoinType;
use datafusion_expr::Expr;
use log::debug;

use crate::error::{OptError, OptResult};
use crate::operator::{
    ChildExecOrder, DeriveDistrContext, DistributionContract, RequiredDistrContext,
};
use crate::properties::{DistributionMatching, DistributionSpec, HashedSpec};

/// Requirement for either child of a binary join.
///
/// Master-only subtrees gather everything to the coordinator; correlated
/// subtrees replicate so the outer reference can be resolved locally; the
/// inner child otherwise mirrors the outer child's delivered distribution.
fn binary_join_required(ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
    debug_assert!(ctx.child_index < 2);

    if ctx.expr.master_only {
        return Ok(DistributionSpec::singleton_master());
    }

    if ctx.expr.has_outer_refs {
        return Ok(outer_ref_requirement(ctx.required));
    }

    if ctx.child_index == 1 {
        let outer = ctx
            .first_optimized()
            .expect("outer child must be optimized before the inner requirement is computed");
        return Ok(match_outer_for_inner(outer));
    }

    Ok(DistributionSpec::any())
}

/// A correlated subtree keeps a Singleton or Replicated requirement and
/// replicates otherwise.
fn outer_ref_requirement(required: &DistributionSpec) -> DistributionSpec {
    match required {
        DistributionSpec::Singleton(_) | DistributionSpec::Replicated => required.clone(),
        _ => DistributionSpec::Replicated,
    }
}

/// Inner-child requirement mirroring the outer child's delivered spec.
fn match_outer_for_inner(outer: &DistributionSpec) -> DistributionSpec {
    match outer {
        // a universal outer would duplicate the join on every segment;
        // keep the inner on the coordinator
        DistributionSpec::Universal => DistributionSpec::singleton_master(),
        DistributionSpec::Singleton(scope) => DistributionSpec::Singleton(*scope),
        _ => DistributionSpec::Replicated,
    }
}

/// Join output distribution: the outer side's, unless the outer side carries
/// no real placement constraint.
fn binary_join_derive(ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
    let [outer, inner] = ctx.children else {
        return Err(OptError::InvalidPlan(format!(
            "binary join with {} children",
            ctx.children.len()
        )));
    };

    if matches!(
        outer,
        DistributionSpec::Replicated | DistributionSpec::Universal
    ) {
        return Ok(inner.clone());
    }
    Ok(outer.clone())
}

/// Matching mode: the first child optimized only needs to satisfy the
/// requirement; later children must match it exactly, unless the sibling
/// delivered a spec with no real placement constraint.
fn binary_join_matching(order: ChildExecOrder, ctx: &RequiredDistrContext) -> DistributionMatching {
    if ctx.child_index == order.first_child() {
        return DistributionMatching::Satisfy;
    }

    match ctx.first_optimized() {
        Some(DistributionSpec::Replicated) | Some(DistributionSpec::Universal) => {
            DistributionMatching::Satisfy
        }
        _ => DistributionMatching::Exact,
    }
}

/// Hash join over equi-join key pairs.
///
/// The keys come from equality (or is-not-distinct-from) predicates whose
/// sides split cleanly between the two children; the driver only builds this
/// operator for hashable key types.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct HashJoin {
    join_type: JoinType,
    outer_keys: Vec<Expr>,
    inner_keys: Vec<Expr>,
}

impl HashJoin {
    pub fn new(join_type: JoinType, outer_keys: Vec<Expr>, inner_keys: Vec<Expr>) -> Self {
        assert_eq!(
            outer_keys.len(),
            inner_keys.len(),
            "hash join key lists must pair up"
        );
        assert!(!outer_keys.is_empty(), "hash join without keys");
        Self {
            join_type,
            outer_keys,
            inner_keys,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn outer_keys(&self) -> &[Expr] {
        &self.outer_keys
    }

    pub fn inner_keys(&self) -> &[Expr] {
        &self.inner_keys
    }
}

impl DistributionContract for HashJoin {
    /// Request 0 co-locates both sides on the join keys, request 1 falls
    /// back to replicating the inner side.
    fn distribution_requests(&self) -> usize {
        2
    }

    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        debug_assert!(ctx.child_index < 2);
        debug_assert!(ctx.request_index < self.distribution_requests());

        if ctx.expr.master_only || ctx.expr.has_outer_refs || ctx.request_index == 1 {
            return binary_join_required(ctx);
        }

        if ctx.child_index == 0 {
            // equality predicates drop NULL keys, no co-location needed
            return Ok(DistributionSpec::Hashed(HashedSpec::new(
                self.outer_keys.clone(),
                false,
            )));
        }

        match ctx.first_optimized() {
            Some(DistributionSpec::Universal) => Ok(DistributionSpec::singleton_master()),
            Some(DistributionSpec::Singleton(scope)) => Ok(DistributionSpec::Singleton(*scope)),
            Some(DistributionSpec::Hashed(outer)) => {
                // ask the inner side for its keys, proven equivalent to what
                // the outer side delivered
                let spec =
                    HashedSpec::new(self.inner_keys.clone(), false).with_equiv(outer.primary());
                Ok(DistributionSpec::Hashed(spec))
            }
            _ => Ok(DistributionSpec::Hashed(HashedSpec::new(
                self.inner_keys.clone(),
                false,
            ))),
        }
    }

    fn derive_distribution(&self, ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        let derived = binary_join_derive(ctx)?;

        // an inner equi-join co-locates both key sides, so the output is
        // equivalently hashed on the inner keys
        if self.join_type == JoinType::Inner {
            if let DistributionSpec::Hashed(outer) = &derived {
                if outer.equiv().is_none() && outer.exprs() == self.outer_keys {
                    let equiv = HashedSpec::new(self.inner_keys.clone(), outer.nulls_colocated());
                    return Ok(DistributionSpec::Hashed(outer.primary().with_equiv(equiv)));
                }
            }
        }

        Ok(derived)
    }

    fn matching_type(&self, ctx: &RequiredDistrContext) -> DistributionMatching {
        binary_join_matching(self.child_exec_order(), ctx)
    }
}

/// Inner nested-loops join.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct InnerNLJoin {
    predicate: Option<Expr>,
}

impl InnerNLJoin {
    pub fn new(predicate: Option<Expr>) -> Self {
        Self { predicate }
    }

    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }
}

impl DistributionContract for InnerNLJoin {
    /// Request 0 replicates the inner child, request 1 explores broadcasting
    /// the outer child and spreading the inner one instead.
    fn distribution_requests(&self) -> usize {
        2
    }

    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        debug_assert!(ctx.child_index < 2);
        debug_assert!(ctx.request_index < self.distribution_requests());

        if ctx.expr.master_only || ctx.expr.has_outer_refs {
            return binary_join_required(ctx);
        }

        if ctx.request_index == 0 || ctx.config.disable_inner_nlj_outer_broadcast {
            return binary_join_required(ctx);
        }

        if ctx.child_index == 0 {
            return Ok(DistributionSpec::Replicated);
        }

        match ctx.first_optimized() {
            // a universal outer duplicated per segment would duplicate results
            Some(DistributionSpec::Universal) => Ok(DistributionSpec::singleton_master()),
            _ => Ok(DistributionSpec::non_singleton()),
        }
    }

    fn derive_distribution(&self, ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        binary_join_derive(ctx)
    }

    fn matching_type(&self, ctx: &RequiredDistrContext) -> DistributionMatching {
        binary_join_matching(self.child_exec_order(), ctx)
    }
}

/// Inner nested-loops join probing an index on the inner side.
///
/// The inner subtree dereferences `outer_ref_columns` of the outer child per
/// probe, so it can never be moved; the outer child is distributed to meet
/// the inner side instead.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct InnerIndexNLJoin {
    outer_ref_columns: Vec<Column>,
}

impl InnerIndexNLJoin {
    pub fn new(outer_ref_columns: Vec<Column>) -> Self {
        Self { outer_ref_columns }
    }

    pub fn outer_ref_columns(&self) -> &[Column] {
        &self.outer_ref_columns
    }
}

impl DistributionContract for InnerIndexNLJoin {
    /// The inner (index) child is optimized first; its derived spec decides
    /// the outer requirement.
    fn child_exec_order(&self) -> ChildExecOrder {
        ChildExecOrder::RightToLeft
    }

    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        debug_assert!(ctx.child_index < 2);

        if ctx.child_index == 1 {
            // the index scan stays put; outer references into the probe side
            // are expected here
            return Ok(DistributionSpec::any_with_outer_refs());
        }

        let inner = ctx
            .first_optimized()
            .expect("inner child must be optimized before the outer requirement is computed");

        match inner {
            DistributionSpec::Singleton(_) | DistributionSpec::Universal => {
                Ok(DistributionSpec::singleton_master())
            }
            DistributionSpec::Hashed(hashed) => match hashed.equiv() {
                // distribute the outer side on the columns the index side is
                // proven equivalent on
                Some(equiv) => Ok(DistributionSpec::Hashed(HashedSpec::new(
                    equiv.exprs().to_vec(),
                    equiv.nulls_colocated(),
                ))),
                None => Ok(DistributionSpec::Replicated),
            },
            _ => Ok(DistributionSpec::Replicated),
        }
    }

    fn derive_distribution(&self, ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        binary_join_derive(ctx)
    }

    fn matching_type(&self, ctx: &RequiredDistrContext) -> DistributionMatching {
        binary_join_matching(self.child_exec_order(), ctx)
    }
}

/// Nested-loops join executing a correlated subplan per outer row.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct CorrelatedNLJoin {
    join_type: JoinType,
}

impl CorrelatedNLJoin {
    pub fn new(join_type: JoinType) -> Self {
        Self { join_type }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }
}

impl DistributionContract for CorrelatedNLJoin {
    /// Request 0 passes an incoming Singleton requirement through to both
    /// children to comply with correlated execution; request 1 is the
    /// ordinary join logic.
    fn distribution_requests(&self) -> usize {
        2
    }

    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        debug_assert!(ctx.child_index < 2);
        debug_assert!(ctx.request_index < self.distribution_requests());

        if ctx.request_index == 0 {
            if let DistributionSpec::Singleton(scope) = ctx.required {
                return Ok(DistributionSpec::Singleton(*scope));
            }
        }

        if ctx.expr.child_has_volatile_scan(1) && ctx.expr.child_has_outer_refs(1) {
            // serialize a side-effecting table function on the coordinator
            debug!("forcing correlated join with volatile inner scan to the master");
            return Ok(DistributionSpec::singleton_master());
        }

        if ctx.child_index == 1 {
            if let Some(DistributionSpec::Universal) = ctx.first_optimized() {
                // match a Singleton so that more than one row generated at
                // runtime is detected, e.g. 'select (select 1 union select 2)'
                return Ok(DistributionSpec::singleton_master());
            }
        }

        binary_join_required(ctx)
    }

    fn derive_distribution(&self, ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        binary_join_derive(ctx)
    }

    fn matching_type(&self, ctx: &RequiredDistrContext) -> DistributionMatching {
        binary_join_matching(self.child_exec_order(), ctx)
    }
}
