//! Shared fixtures for distribution tests.

use arrow_schema::DataType;
use datafusion_common::Column;
use datafusion_expr::Expr;

use crate::config::OptimizerConfig;
use crate::metadata::{MemoryCatalog, MetadataCatalog};
use crate::operator::{ExprContext, RequiredDistrContext};
use crate::properties::{DistributionSpec, HashedSpec};

pub fn columns(names: &[&str]) -> Vec<Column> {
    names.iter().map(|name| Column::from_name(*name)).collect()
}

/// Hashed spec over the named columns, NULLs colocated.
pub fn hashed_on(names: &[&str]) -> DistributionSpec {
    let exprs = names
        .iter()
        .map(|name| Expr::Column(Column::from_name(*name)))
        .collect();
    DistributionSpec::Hashed(HashedSpec::new(exprs, true))
}

/// Catalog mapping every named column to `Int32`.
pub fn int_catalog(names: &[&str]) -> MemoryCatalog {
    names
        .iter()
        .map(|name| (Column::from_name(*name), DataType::Int32))
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub fn request_ctx<'a>(
    expr: &'a ExprContext,
    required: &'a DistributionSpec,
    child_index: usize,
    optimized_children: &'a [DistributionSpec],
    request_index: usize,
    config: &'a OptimizerConfig,
    catalog: &'a dyn MetadataCatalog,
) -> RequiredDistrContext<'a> {
    RequiredDistrContext {
        expr,
        required,
        child_index,
        optimized_children,
        request_index,
        config,
        catalog,
    }
}
