use thiserror::Error;

/// Errors that stop a discovery pass before or while it runs.
///
/// Per-file problems never surface here; they only leave that file's tests
/// out of the tree.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No project root is open")]
    NoProjectRoot,

    #[error("Session has been disposed")]
    Disposed,
}
