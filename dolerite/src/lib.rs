//! ## Background
//!
//! A cost-based optimizer for a shared-nothing SQL engine has to reason
//! about data placement on top of ordinary plan shape: every physical
//! operator must state what placement guarantee it needs from each child,
//! what guarantee it delivers given its children, and whether a network
//! redistribution (a Motion) has to be inserted to reconcile the two. The
//! search driver enumerates alternatives in a cascades style [1] and asks
//! these questions thousands of times per query, so the answers must be pure
//! and safe to share across optimizer threads.
//!
//! This crate is that distribution-property framework, following the
//! architecture of Orca [2]: a closed set of distribution specifications
//! with a precise satisfaction relation, an enforceable property combining
//! a required spec with a matching mode, per-operator request/derive
//! contracts for the join family, union-all, aggregates and motions, and
//! the enforcement verdict that decides where Motions may be placed. Search
//! scheduling, costing and statistics live with the driver, not here.
//!
//! ## Design
//!
//! * [`properties`] Distribution specs, satisfaction rules, enforcement.
//! * [`operator`] Physical operators and their distribution contracts.
//! * [`plan`] Plan fragments produced by enforcer insertion.
//! * [`constraint`] Column constraint intervals used by partition pruning.
//! * [`metadata`] Catalog interface for hashability of column types.
//! * [`config`] Per-pass optimizer switches.
//!
//! ## Reference
//!
//! 1. Graefe, G., 1995. The cascades framework for query optimization. IEEE
//! Data Eng. Bull., 18(3), pp.19-29.
//! 2. Soliman, M.A., Antova, L., Raghavan, V., El-Helw, A., Gu, Z., Shen, E.,
//! Caragea, G.C., Garcia-Alvarado, C., Rahman, F., Petropoulos, M. and Waas,
//! F., 2014, June. Orca: a modular query optimizer architecture for big data.
//! In Proceedings of the 2014 ACM SIGMOD international conference on
//! Management of data (pp. 337-348).

pub use datafusion_common::Column;
pub use datafusion_expr::Expr;

pub mod config;
pub mod constraint;
pub mod error;
pub mod metadata;
pub mod operator;
pub mod plan;
pub mod properties;
pub mod test_utils;
