use std::io;
use std::path::PathBuf;

/// Process-level failures. Per-file problems never surface here; they are
/// recorded next to the moved file instead.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to create sink directory {path}: {source}")]
    Setup { path: PathBuf, source: io::Error },
    #[error("Failed to list intake tree at {path}: {source}")]
    Discover {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("Filesystem notifications unavailable for {path}: {source}")]
    Notify {
        path: PathBuf,
        source: notify::Error,
    },
    #[error("Notification stream closed unexpectedly")]
    WatchClosed,
    #[error("Cannot {operation} while watcher is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures while relocating a file out of the intake tree. The file stays
/// where it was whenever one of these is returned for the move itself.
#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("Source has no file name: {0}")]
    InvalidSource(PathBuf),
    #[error("Failed to create destination directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("Verification failed for {path}: {reason}")]
    Verify { path: PathBuf, reason: String },
    #[error("Failed to write error sidecar {path}: {source}")]
    Sidecar { path: PathBuf, source: io::Error },
}
