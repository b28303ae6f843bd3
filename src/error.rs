use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the particle core.
///
/// The push itself never fails; these errors come from construction, insertion and
/// configuration, where bad input is rejected before it can reach the hot path.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical or geometric issue (e.g., degenerate segment, zero-width mesh).
    #[error("numerical error: {0}")]
    MathError(String),

    /// A mesh id that no store or domain entry knows about.
    #[error("unknown mesh id {0}")]
    UnknownMesh(usize),

    /// Position or index outside the region it was required to lie in.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// Malformed configuration document.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Propagated I/O errors (configuration files).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
