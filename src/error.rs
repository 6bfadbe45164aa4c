use thiserror::Error;

/// Errors surfaced by instance loading, configuration, and the solver API.
///
/// All of these are fatal: constructors validate eagerly, and once an
/// instance and configuration have been accepted the search itself does not
/// fail at runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// The instance file is missing, malformed, or violates an invariant
    /// (unsupported edge weight type, dimension mismatch, depot rules).
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    /// A configuration value is outside its domain.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Client-facing misuse of the API, e.g. a route count that does not
    /// match the fleet size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
