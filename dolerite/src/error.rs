use datafusion_common::Column;
use thiserror::Error;

/// Errors surfaced to the search driver.
///
/// [`OptError::NoFeasibleDistribution`] is a sentinel, not a failure of this
/// subsystem: it tells the driver that every strategy for the current search
/// branch is disabled or contradictory, and the branch should be abandoned.
/// Caller contract violations (wrong discriminant conversions, enforcing with
/// motions disabled) are panics and never reach this type.
#[derive(Debug, Error)]
pub enum OptError {
    #[error("no feasible distribution for this request")]
    NoFeasibleDistribution,

    #[error("column {0} is unknown to the metadata catalog")]
    UnknownColumn(Column),

    #[error("invalid plan shape: {0}")]
    InvalidPlan(String),

    #[error("interval endpoints are not comparable: {0}")]
    IncomparableValues(String),
}

pub type OptResult<T> = Result<T, OptError>;
