//! Error type for simulation construction and backend initialization.

/// Errors surfaced by [`Simulation`](crate::Simulation) construction,
/// parameter updates, and backend setup.
///
/// Numerical degeneracies inside a frame are not reported here; the solver
/// prevents them structurally (regularized denominators, histogram-sized
/// buckets).
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A construction argument or parameter is out of range.
    InvalidConfig(String),
    /// The compute backend could not be initialized (no adapter, device
    /// request failure, shader or pipeline validation failure).
    Backend(String),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            SimulationError::Backend(msg) => write!(f, "backend initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Shorthand for building an [`SimulationError::InvalidConfig`].
pub(crate) fn invalid(msg: impl Into<String>) -> SimulationError {
    SimulationError::InvalidConfig(msg.into())
}
