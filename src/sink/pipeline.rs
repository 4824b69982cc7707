use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::mover::OutcomeMover;
use super::resolver::{IgnoreReason, PathResolver, Rejection};
use super::worker::ImportWorker;
use crate::models::{ErrorKind, ImportOutcome};

/// What happened to a single discovered path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Imported { destination: PathBuf },
    Failed { kind: ErrorKind, destination: PathBuf },
    Ignored(IgnoreReason),
    /// The file could not be relocated and is still in the intake tree.
    MoveFailed { kind: Option<ErrorKind> },
}

/// Resolve → import → move for one file.
#[derive(Clone)]
pub struct SinkPipeline {
    resolver: PathResolver,
    worker: ImportWorker,
    mover: Arc<OutcomeMover>,
}

impl SinkPipeline {
    pub fn new(resolver: PathResolver, worker: ImportWorker, mover: OutcomeMover) -> Self {
        Self {
            resolver,
            worker,
            mover: Arc::new(mover),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub async fn handle(&self, path: &Path) -> Disposition {
        let (source, username, outcome) = match self.resolver.resolve(path) {
            Ok(request) => {
                let outcome = self.worker.process(&request).await;
                (
                    request.source_path().to_path_buf(),
                    Some(request.username().to_string()),
                    outcome,
                )
            }
            Err(Rejection::Ignored(reason)) => {
                debug!("Ignoring {}: {}", path.display(), reason);
                return Disposition::Ignored(reason);
            }
            Err(Rejection::Invalid(invalid)) => {
                debug!(
                    "Rejected {}: {}",
                    invalid.source_path.display(),
                    invalid.failure
                );
                (
                    invalid.source_path,
                    invalid.username,
                    ImportOutcome::Failed(invalid.failure),
                )
            }
        };

        let kind = outcome.error_kind();
        if let Some(kind) = kind {
            warn!(
                path = %source.display(),
                username = username.as_deref().unwrap_or("-"),
                kind = %kind,
                "Moving file to error folder"
            );
        }

        let mover = Arc::clone(&self.mover);
        let move_source = source.clone();
        let moved = tokio::task::spawn_blocking(move || {
            mover.apply(&move_source, username.as_deref(), &outcome)
        })
        .await;

        match moved {
            Ok(Ok(moved)) => {
                debug!("Moved {} to {}", source.display(), moved.destination.display());
                match kind {
                    None => Disposition::Imported {
                        destination: moved.destination,
                    },
                    Some(kind) => Disposition::Failed {
                        kind,
                        destination: moved.destination,
                    },
                }
            }
            Ok(Err(err)) => {
                error!(
                    kind = %ErrorKind::MoveFailed,
                    "Failed to move file {}: {}", source.display(), err
                );
                Disposition::MoveFailed { kind }
            }
            Err(join_err) => {
                error!(
                    kind = %ErrorKind::MoveFailed,
                    "Move task for {} panicked: {}", source.display(), join_err
                );
                Disposition::MoveFailed { kind }
            }
        }
    }
}
