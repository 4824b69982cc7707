//! The intake tree treated as a work queue.
//!
//! `discover` lists candidate files, `claim` hands out an exclusive in-process
//! lock on one of them for the duration of its import and move. Claims are
//! released on drop. Exclusivity only holds within one process: running two
//! watchers against the same sink root is not supported.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::layout::SinkLayout;
use crate::error::SinkError;

pub trait WorkQueue: Send + Sync {
    /// Snapshot of the files currently waiting.
    fn discover(&self) -> Result<Vec<PathBuf>, SinkError>;

    /// `None` if the path is already claimed or no longer queued.
    fn claim(&self, path: &Path) -> Option<Claim>;
}

#[derive(Debug, Clone, Default)]
struct ClaimSet(Arc<Mutex<HashSet<PathBuf>>>);

impl ClaimSet {
    fn try_claim(&self, path: &Path) -> Option<Claim> {
        let mut held = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(path.to_path_buf()) {
            return None;
        }
        Some(Claim {
            path: path.to_path_buf(),
            claims: self.clone(),
            on_release: None,
        })
    }

    fn release(&self, path: &Path) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

type ReleaseHook = Box<dyn FnOnce(&Path) + Send>;

/// Exclusive handle on one queued file.
pub struct Claim {
    path: PathBuf,
    claims: ClaimSet,
    on_release: Option<ReleaseHook>,
}

impl Claim {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claim").field("path", &self.path).finish()
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook(&self.path);
        }
        self.claims.release(&self.path);
    }
}

/// Queue backed by the real intake tree.
#[derive(Debug, Clone)]
pub struct FsWorkQueue {
    layout: SinkLayout,
    claims: ClaimSet,
}

impl FsWorkQueue {
    pub fn new(layout: SinkLayout) -> Self {
        Self {
            layout,
            claims: ClaimSet::default(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.claims.len()
    }
}

impl WorkQueue for FsWorkQueue {
    fn discover(&self) -> Result<Vec<PathBuf>, SinkError> {
        self.layout.intake_files()
    }

    fn claim(&self, path: &Path) -> Option<Claim> {
        if !path.is_file() {
            return None;
        }
        self.claims.try_claim(path)
    }
}

/// In-memory queue for exercising the watcher without touching disk
/// discovery. A claimed path is consumed once its claim is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkQueue {
    pending: Arc<Mutex<BTreeSet<PathBuf>>>,
    claims: ClaimSet,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, path: impl Into<PathBuf>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into());
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkQueue for MemoryWorkQueue {
    fn discover(&self) -> Result<Vec<PathBuf>, SinkError> {
        Ok(self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect())
    }

    fn claim(&self, path: &Path) -> Option<Claim> {
        if !self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
        {
            return None;
        }
        let mut claim = self.claims.try_claim(path)?;
        let pending = Arc::clone(&self.pending);
        claim.on_release = Some(Box::new(move |path| {
            pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(path);
        }));
        Some(claim)
    }
}
