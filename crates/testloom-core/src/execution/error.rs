use thiserror::Error;

/// Errors that prevent a run from starting.
///
/// Adapter failures are not among them: they degrade to empty results.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Session has been disposed")]
    Disposed,
}
