//! Column constraints.
//!
//! Partition pruning reasons about the rows a predicate can select. The
//! interval representation keeps that reasoning exact for one column:
//! ordered, non-overlapping value ranges plus an explicit NULL marker.

mod interval;
pub use interval::*;
