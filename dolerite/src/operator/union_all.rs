//! UnionAll operator.
//!
//! UnionAll concatenates children with positionally aligned columns. Its
//! distribution handling revolves around one column mapping: requirement
//! specs arriving from above talk about output columns and must be remapped
//! to each child's input columns, while derivation walks the opposite way
//! and only yields a hashed output when every child's hashed delivery lands
//! on the same output positions.

use datafusion_common::Column;
use datafusion_expr::Expr;
use enumset::{enum_set, EnumSet};
use itertools::Itertools;
use log::debug;

use crate::error::{OptError, OptResult};
use crate::metadata::MetadataCatalog;
use crate::operator::{DeriveDistrContext, DistributionContract, RequiredDistrContext};
use crate::properties::{
    DistributionKind, DistributionMatching, DistributionSpec, HashedSpec,
};

#[derive(Clone, Debug, Hash, PartialEq)]
pub struct UnionAll {
    output_columns: Vec<Column>,
    input_columns: Vec<Vec<Column>>,
    /// Hashed distribution over each child's full input column list, the
    /// reference point for hashed derivation.
    child_hashed: Vec<HashedSpec>,
}

impl UnionAll {
    pub fn new(output_columns: Vec<Column>, input_columns: Vec<Vec<Column>>) -> Self {
        assert!(!input_columns.is_empty(), "union all without children");
        assert!(
            input_columns
                .iter()
                .all(|cols| cols.len() == output_columns.len()),
            "union all children must align with the output columns"
        );

        let child_hashed = input_columns
            .iter()
            .map(|cols| HashedSpec::from_columns(cols, true))
            .collect();

        Self {
            output_columns,
            input_columns,
            child_hashed,
        }
    }

    pub fn output_columns(&self) -> &[Column] {
        &self.output_columns
    }

    pub fn input_columns(&self) -> &[Vec<Column>] {
        &self.input_columns
    }

    /// Remap a hashed requirement over output columns onto the given child's
    /// input columns. Non-column expressions and unhashable columns are
    /// skipped; when nothing maps, the requirement's equivalent spec is
    /// tried before giving up.
    fn hashed_pass_thru(
        &self,
        required: &HashedSpec,
        child_index: usize,
        catalog: &dyn MetadataCatalog,
    ) -> OptResult<Option<HashedSpec>> {
        let child_columns = &self.input_columns[child_index];

        let mut mapped = Vec::new();
        for expr in required.exprs() {
            let Expr::Column(column) = expr else {
                continue;
            };
            if !catalog.is_hashable(column)? {
                continue;
            }
            for (pos, output) in self.output_columns.iter().enumerate() {
                if output == column {
                    mapped.push(Expr::Column(child_columns[pos].clone()));
                }
            }
        }

        if !mapped.is_empty() {
            return Ok(Some(HashedSpec::new(mapped, true)));
        }

        if let Some(equiv) = required.equiv() {
            return self.hashed_pass_thru(equiv, child_index, catalog);
        }

        Ok(None)
    }

    /// Positions of the given child's hashed expressions within that child's
    /// input column list; `None` when nothing maps.
    fn map_to_positions(&self, exprs: &[Expr], child_index: usize) -> Option<Vec<usize>> {
        let child_columns = &self.input_columns[child_index];

        let mut positions = Vec::new();
        for expr in exprs {
            let Expr::Column(column) = expr else {
                continue;
            };
            for (pos, input) in child_columns.iter().enumerate() {
                if input == column {
                    positions.push(pos);
                }
            }
        }

        if positions.is_empty() {
            None
        } else {
            Some(positions)
        }
    }

    fn output_hashed(&self, positions: &[usize]) -> HashedSpec {
        let exprs = positions
            .iter()
            .map(|pos| Expr::Column(self.output_columns[*pos].clone()))
            .collect();
        HashedSpec::new(exprs, true)
    }

    /// Hashed output distribution, available only when every child delivers
    /// a hashed spec over its input columns and all of them land on the same
    /// output positions.
    fn derive_hashed(&self, children: &[DistributionSpec]) -> Option<HashedSpec> {
        let mut hashed_children = Vec::with_capacity(children.len());
        for (child_index, child) in children.iter().enumerate() {
            match child {
                DistributionSpec::Hashed(hashed)
                    if hashed.satisfies_hashed(&self.child_hashed[child_index]) =>
                {
                    hashed_children.push(hashed)
                }
                _ => return None,
            }
        }

        let positions = hashed_children
            .iter()
            .enumerate()
            .map(|(child_index, hashed)| self.map_to_positions(hashed.exprs(), child_index))
            .collect::<Option<Vec<_>>>()?;

        if !positions.iter().all_equal() {
            return None;
        }

        Some(self.output_hashed(&positions[0]))
    }

    fn assert_valid_child_distributions(
        children: &[DistributionSpec],
        expected: EnumSet<DistributionKind>,
    ) {
        for child in children {
            debug_assert!(
                expected.contains(child.kind()),
                "unexpected {:?} child distribution in union all, expected one of {:?}",
                child.kind(),
                expected
            );
        }
    }
}

impl DistributionContract for UnionAll {
    /// Request 0 passes a hashed requirement down to the children, request 1
    /// requests ANY from the outer child and matches its delivery on the
    /// rest.
    fn distribution_requests(&self) -> usize {
        2
    }

    fn required_distribution(&self, ctx: &RequiredDistrContext) -> OptResult<DistributionSpec> {
        debug_assert!(ctx.child_index < self.input_columns.len());
        debug_assert!(ctx.request_index < self.distribution_requests());

        if ctx.expr.master_only {
            return Ok(DistributionSpec::singleton_master());
        }

        if matches!(ctx.required, DistributionSpec::Replicated) {
            return Ok(DistributionSpec::Replicated);
        }

        if ctx.request_index == 0 {
            if let DistributionSpec::Hashed(required) = ctx.required {
                if let Some(passed) =
                    self.hashed_pass_thru(required, ctx.child_index, ctx.catalog)?
                {
                    return Ok(DistributionSpec::Hashed(passed));
                }
            }
        }

        if ctx.child_index == 0 {
            return Ok(DistributionSpec::any());
        }

        let outer = ctx.first_optimized().ok_or_else(|| {
            OptError::InvalidPlan(
                "union all inner child requested before the outer child was optimized".into(),
            )
        })?;

        Ok(match outer {
            DistributionSpec::Singleton(scope) => DistributionSpec::Singleton(*scope),
            // a universal outer duplicated per segment would duplicate rows,
            // e.g. 'select 1 union all select i from x'
            DistributionSpec::Universal => DistributionSpec::singleton_master(),
            DistributionSpec::Replicated => DistributionSpec::Replicated,
            // the outer child is spread across segments; force the rest to a
            // genuine spread so no segment contributes a full copy
            _ => DistributionSpec::non_singleton_without_replicated(),
        })
    }

    fn derive_distribution(&self, ctx: &DeriveDistrContext) -> OptResult<DistributionSpec> {
        debug_assert_eq!(self.input_columns.len(), ctx.children.len());

        if let Some(hashed) = self.derive_hashed(ctx.children) {
            return Ok(DistributionSpec::Hashed(hashed));
        }

        let universal_outer = matches!(ctx.children.first(), Some(DistributionSpec::Universal));

        for child in ctx.children {
            if matches!(child, DistributionSpec::Singleton(_)) {
                Self::assert_valid_child_distributions(
                    ctx.children,
                    enum_set!(DistributionKind::Singleton | DistributionKind::Universal),
                );
                return Ok(child.clone());
            }
            if matches!(child, DistributionSpec::Replicated) {
                Self::assert_valid_child_distributions(
                    ctx.children,
                    enum_set!(DistributionKind::Replicated | DistributionKind::Universal),
                );
                return Ok(child.clone());
            }
        }

        if universal_outer {
            return Ok(DistributionSpec::Universal);
        }

        debug!("union all children do not align, deriving random");
        Ok(DistributionSpec::random())
    }

    fn matching_type(&self, ctx: &RequiredDistrContext) -> DistributionMatching {
        if ctx.request_index == 0 && matches!(ctx.required, DistributionSpec::Hashed(_)) {
            DistributionMatching::Exact
        } else {
            DistributionMatching::Satisfy
        }
    }
}

#[cfg(test)]
mod tests {
    use datafusion_expr::col;

    use super::*;
    use crate::config::OptimizerConfig;
    use crate::operator::ExprContext;
    use crate::test_utils::{columns, hashed_on, int_catalog, request_ctx};

    /// `(o1, o2) = t1(a1, a2) union all t2(b1, b2)`.
    fn union_all() -> UnionAll {
        UnionAll::new(
            columns(&["o1", "o2"]),
            vec![columns(&["a1", "a2"]), columns(&["b1", "b2"])],
        )
    }

    fn full_catalog() -> crate::metadata::MemoryCatalog {
        int_catalog(&["o1", "o2", "a1", "a2", "b1", "b2"])
    }

    #[test]
    fn test_hashed_requirement_remaps_to_child_columns() {
        let catalog = full_catalog();
        let op = union_all();
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = hashed_on(&["o2"]);

        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        assert_eq!(
            hashed_on(&["a2"]),
            op.required_distribution(&ctx).unwrap()
        );

        let ctx = request_ctx(&expr, &required, 1, &[], 0, &config, &catalog);
        assert_eq!(
            hashed_on(&["b2"]),
            op.required_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_hashed_requirement_remaps_through_equivalent() {
        let catalog = full_catalog();
        let op = union_all();
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();

        // the primary spec talks about foreign columns, the equivalent about ours
        let required = DistributionSpec::Hashed(
            HashedSpec::new(vec![col("elsewhere")], true)
                .with_equiv(HashedSpec::new(vec![col("o1")], true)),
        );

        let mut catalog = catalog;
        catalog.register(Column::from_name("elsewhere"), arrow_schema::DataType::Null);

        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        assert_eq!(
            hashed_on(&["a1"]),
            op.required_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_unhashable_requirement_falls_back_to_any() {
        let mut catalog = full_catalog();
        catalog.register(Column::from_name("o1"), arrow_schema::DataType::Null);

        let op = union_all();
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = hashed_on(&["o1"]);

        let ctx = request_ctx(&expr, &required, 0, &[], 0, &config, &catalog);
        assert_eq!(
            DistributionSpec::any(),
            op.required_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_later_children_mirror_outer_delivery() {
        let catalog = full_catalog();
        let op = union_all();
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();
        let required = DistributionSpec::any();

        let cases = [
            (
                DistributionSpec::singleton_master(),
                DistributionSpec::singleton_master(),
            ),
            (
                DistributionSpec::Universal,
                DistributionSpec::singleton_master(),
            ),
            (DistributionSpec::Replicated, DistributionSpec::Replicated),
            (
                hashed_on(&["a1"]),
                DistributionSpec::non_singleton_without_replicated(),
            ),
            (
                DistributionSpec::random(),
                DistributionSpec::non_singleton_without_replicated(),
            ),
        ];

        for (outer_delivery, expected) in cases {
            let outer_derived = [outer_delivery];
            let ctx = request_ctx(&expr, &required, 1, &outer_derived, 1, &config, &catalog);
            assert_eq!(expected, op.required_distribution(&ctx).unwrap());
        }
    }

    #[test]
    fn test_derive_hashed_when_children_align() {
        let op = union_all();
        let expr = ExprContext::default();

        let children = [hashed_on(&["a1"]), hashed_on(&["b1"])];
        let ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };
        assert_eq!(hashed_on(&["o1"]), op.derive_distribution(&ctx).unwrap());
    }

    #[test]
    fn test_derive_falls_back_when_positions_differ() {
        let op = union_all();
        let expr = ExprContext::default();

        // first child hashed on column 0, second on column 1
        let children = [hashed_on(&["a1"]), hashed_on(&["b2"])];
        let ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };
        assert_eq!(
            DistributionSpec::random(),
            op.derive_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_derive_falls_back_when_a_child_is_random() {
        let op = union_all();
        let expr = ExprContext::default();

        let children = [hashed_on(&["a1"]), DistributionSpec::random()];
        let ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };
        assert_eq!(
            DistributionSpec::random(),
            op.derive_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_derive_singleton_and_replicated_children() {
        let op = union_all();
        let expr = ExprContext::default();

        let children = [
            DistributionSpec::singleton_master(),
            DistributionSpec::Universal,
        ];
        let ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };
        assert_eq!(
            DistributionSpec::singleton_master(),
            op.derive_distribution(&ctx).unwrap()
        );

        let children = [DistributionSpec::Replicated, DistributionSpec::Universal];
        let ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };
        assert_eq!(
            DistributionSpec::Replicated,
            op.derive_distribution(&ctx).unwrap()
        );

        let children = [DistributionSpec::Universal, DistributionSpec::Universal];
        let ctx = DeriveDistrContext {
            expr: &expr,
            children: &children,
        };
        assert_eq!(
            DistributionSpec::Universal,
            op.derive_distribution(&ctx).unwrap()
        );
    }

    #[test]
    fn test_matching_type_exact_for_hashed_pass_thru() {
        let catalog = full_catalog();
        let op = union_all();
        let expr = ExprContext::default();
        let config = OptimizerConfig::default();

        let hashed = hashed_on(&["o1"]);
        let ctx = request_ctx(&expr, &hashed, 0, &[], 0, &config, &catalog);
        assert_eq!(DistributionMatching::Exact, op.matching_type(&ctx));

        let ctx = request_ctx(&expr, &hashed, 0, &[], 1, &config, &catalog);
        assert_eq!(DistributionMatching::Satisfy, op.matching_type(&ctx));

        let any = DistributionSpec::any();
        let ctx = request_ctx(&expr, &any, 0, &[], 0, &config, &catalog);
        assert_eq!(DistributionMatching::Satisfy, op.matching_type(&ctx));
    }
}
