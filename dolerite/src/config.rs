/// Read-only switches for one optimization pass.
///
/// The search driver owns one instance per pass and threads it by reference
/// through every request, derivation and enforcement call; nothing in this
/// crate reads ambient process state. When a switch removes a strategy the
/// affected operator falls back to a remaining legal one, or the driver sees
/// [`OptError::NoFeasibleDistribution`](crate::error::OptError) if none is
/// left.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Disable all Motion enforcers. Asking for an enforcer under this switch
    /// is a caller bug, see
    /// [`DistributionSpec::append_enforcers`](crate::properties::DistributionSpec::append_enforcers).
    pub disable_motions: bool,

    /// Disable the random-spray Motion. Random and NonSingleton requirements
    /// become unenforceable.
    pub disable_random_motion: bool,

    /// Disable the broadcast Motion. Replicated requirements become
    /// unenforceable.
    pub disable_broadcast_motion: bool,

    /// Drop the inner nested-loops join alternative that broadcasts the outer
    /// child instead of the inner one.
    pub disable_inner_nlj_outer_broadcast: bool,
}
