//! Hash aggregate operator.

use datafusion_common::Column;
use datafusion_expr::Expr;

use crate::error::{OptError, OptResult};
use crate::operator::{DeriveDistrContext, DistributionContract, RequiredDistrContext};
use crate::properties::{DistributionSpec, HashedSpec};

/// Aggregation grouped by a column list; an empty list is a scalar
/// aggregate.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct HashAggregate {
    grouping_columns: Vec<Column>,
    aggregate_exprs: Vec<Expr>,
}

impl HashAggregate {
    pub fn new(grouping_columns: Vec<Column>, aggregate_exprs: Vec<Expr>) -> Self {
        Self {
            grouping_columns,
            aggregate_exprs,
        }
    }

    pub fn grouping_columns(&self) -> &[Column] {
        &self.grouping_columns
    }

    pub fn aggregate_exprs(&self) -> &[Expr] {
        &self.aggregate_exprs
    }
}

impl DistributionContract for HashAggregate {
    /// Request 0 spreads groups by hash of the grouping columns, request 1
    /// gathers everything and aggregates on the coordinator.
    fn distribution_requests(&self) -> usize {
        2
    }

    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        debug_assert_eq!(0, ctx.child_index);
        debug_assert!(ctx.request_index < self.distribution_requests());

        if ctx.expr.master_only || ctx.request_index == 1 || self.grouping_columns.is_empty() {
            return Ok(DistributionSpec::singleton_master());
        }

        // a motion that duplicated input rows would double-count, so the
        // hashed request is duplicate sensitive
        match HashedSpec::maximal_hashable(&self.grouping_columns, ctx.catalog, true)? {
            Some(hashed) => Ok(DistributionSpec::Hashed(hashed.with_duplicate_sensitive())),
            None => Ok(DistributionSpec::singleton_master()),
        }
    }

    fn derive_distribution(&self, ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        let [child] = ctx.children else {
            return Err(OptError::InvalidPlan(format!(
                "aggregate with {} children",
                ctx.children.len()
            )));
        };
        Ok(child.clone())
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_expr::col;

    use super::*;
    use crate::config::OptimizerConfig;
    use crate::operator::ExprContext;
    use crate::test_utils::{columns, int_catalog, request_ctx};

    fn sum_agg(grouping: &[&str]) -> HashAggregate {
        HashAggregate::new(columns(grouping), vec![col("v")])
    }

    #[test]
    fn test_grouped_aggregate_spreads_by_group_hash() {
        let catalog = int_catalog(&["g1", "g2"]);
        let agg = sum_agg(&["g1", "g2"]);
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = DistributionSpec::any();

        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        let expected = DistributionSpec::Hashed(
            HashedSpec::new(vec![col("g1"), col("g2")], true).with_duplicate_sensitive(),
        );
        assert_eq!(expected, agg.required_distribution(&ctx).unwrap());

        // request 1 gathers instead
        let ctx = request_ctx(&expr, &required, 0, &[], 1, &config, &catalog);
        assert_eq!(
            DistributionSpec::singleton_master(),
            agg.required_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_partially_hashable_grouping_keeps_hashable_subset() {
        let mut catalog = int_catalog(&["g1"]);
        catalog.register(Column::from_name("g2"), DataType::Null);

        let agg = sum_agg(&["g1", "g2"]);
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = DistributionSpec::any();

        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        let expected = DistributionSpec::Hashed(
            HashedSpec::new(vec![col("g1")], true).with_duplicate_sensitive(),
        );
        assert_eq!(expected, agg.required_distribution(&ctx).unwrap());
    }

    #[test]
    fn test_unhashable_grouping_degrades_to_singleton() {
        let mut catalog = int_catalog(&[]);
        catalog.register(Column::from_name("g1"), DataType::Null);

        let agg = sum_agg(&["g1"]);
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = DistributionSpec::any();

        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        assert_eq!(
            DistributionSpec::singleton_master(),
            agg.required_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_scalar_aggregate_requires_singleton() {
        let catalog = int_catalog(&[]);
        let agg = sum_agg(&[]);
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = DistributionSpec::any();

        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        assert_eq!(
            DistributionSpec::singleton_master(),
            agg.required_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_derive_passes_child_through() {
        let agg = sum_agg(&["g1"]);
        let expr = ExprContext::default();
        let children = [DistributionSpec::singleton_master()];
        let ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };

        assert_eq!(
            DistributionSpec::singleton_master(),
            agg.derive_distribution(&ctx).unwrap()
        );
    }
}
