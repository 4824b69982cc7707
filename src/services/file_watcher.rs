// src/services/file_watcher.rs
//! Folder watcher for the sink root.
//!
//! Lifecycle: `Uninitialized → Ready → (Scanning | Watching) → Ready → … →
//! Stopped`. `setup` moves to `Ready`; `scan` and `watch` borrow the watcher
//! exclusively so they can never overlap. `Stopped` is only reached when the
//! shutdown token fires during `watch`.
//!
//! Files are handled one at a time. Waiting for the next change and waiting
//! for a file to settle are both interruptible; once a file is claimed its
//! import and move always run to completion.
//!
//! While watching, files that were still being written at the settle timeout
//! or could not be moved are kept on a retry list and dispatched again with a
//! doubling delay, whether or not the change source reports them again.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::services::change_source::{Change, ChangeSource};
use crate::sink::{Disposition, SinkLayout, SinkPipeline, WorkQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Uninitialized,
    Ready,
    Scanning,
    Watching,
    Stopped,
}

impl WatcherState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Scanning => "scanning",
            Self::Watching => "watching",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long to wait for a freshly dropped file to stop growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Size and mtime must be unchanged across this window.
    pub interval: Duration,
    /// Give up on a file that is still changing after this long.
    pub timeout: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    /// Still being written when the settle timeout ran out.
    Unsettled,
    /// Removed or replaced by a non-file before it settled.
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileSnapshot {
    len: u64,
    modified: Option<SystemTime>,
}

async fn snapshot(path: &Path) -> Option<FileSnapshot> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    Some(FileSnapshot {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

/// Waits until `path` stops changing.
///
/// In relaxed mode (scans) a file whose mtime is already older than one
/// settle interval counts as stable without waiting. Empty files keep waiting
/// for the full timeout and are then treated as stable, so an empty drop is
/// still imported (and rejected) instead of lingering forever.
pub async fn wait_until_stable(path: &Path, policy: SettlePolicy, relaxed: bool) -> Stability {
    let Some(mut previous) = snapshot(path).await else {
        return Stability::Gone;
    };

    if relaxed && previous.len > 0 {
        let age = previous
            .modified
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        if age.is_some_and(|age| age >= policy.interval) {
            return Stability::Stable;
        }
    }

    let deadline = Instant::now() + policy.timeout;
    loop {
        tokio::time::sleep(policy.interval).await;
        let Some(current) = snapshot(path).await else {
            return Stability::Gone;
        };

        let expired = Instant::now() >= deadline;
        if current == previous && (current.len > 0 || expired) {
            return Stability::Stable;
        }
        if expired {
            return Stability::Unsettled;
        }
        previous = current;
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub imported: usize,
    pub failed: usize,
    pub ignored: usize,
    pub move_failed: usize,
    pub unsettled: usize,
}

impl ScanReport {
    pub fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Imported { .. } => self.imported += 1,
            Disposition::Failed { .. } => self.failed += 1,
            Disposition::Ignored(_) => self.ignored += 1,
            Disposition::MoveFailed { .. } => self.move_failed += 1,
        }
    }

    pub fn handled(&self) -> usize {
        self.imported + self.failed
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imported, {} failed, {} left in place ({} move errors, {} still changing), {} ignored",
            self.imported,
            self.failed,
            self.move_failed + self.unsettled,
            self.move_failed,
            self.unsettled,
            self.ignored
        )
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Retry {
    due: Instant,
    delay: Duration,
}

/// Files left in place during `watch` that get another attempt later.
#[derive(Debug, Default)]
struct RetryQueue {
    entries: BTreeMap<PathBuf, Retry>,
}

impl RetryQueue {
    /// Schedules `path` after `base`, or after twice its previous delay when it
    /// is already waiting. Returns the delay used.
    fn defer(&mut self, path: &Path, base: Duration, now: Instant) -> Duration {
        let delay = match self.entries.get(path) {
            Some(retry) => (retry.delay * 2).min(MAX_RETRY_DELAY),
            None => base.min(MAX_RETRY_DELAY),
        };
        self.entries.insert(
            path.to_path_buf(),
            Retry {
                due: now + delay,
                delay,
            },
        );
        delay
    }

    fn forget(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    fn next_due(&self) -> Option<Instant> {
        self.entries.values().map(|retry| retry.due).min()
    }

    fn due(&self, now: Instant) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, retry)| retry.due <= now)
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn retry_timer(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

/// What became of one dispatched path.
#[derive(Debug)]
enum Dispatch {
    Handled(Disposition),
    Unsettled,
    Gone,
    /// Claimed elsewhere.
    Busy,
    Interrupted,
}

impl Dispatch {
    fn needs_retry(&self) -> bool {
        matches!(
            self,
            Dispatch::Unsettled | Dispatch::Busy | Dispatch::Handled(Disposition::MoveFailed { .. })
        )
    }
}

enum Wake {
    Shutdown,
    Retry,
    Change(Result<Change, SinkError>),
}

pub struct FolderWatcher {
    layout: SinkLayout,
    pipeline: Arc<SinkPipeline>,
    settle: SettlePolicy,
    state: WatcherState,
}

impl fmt::Debug for FolderWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderWatcher")
            .field("root", &self.layout.root())
            .field("settle", &self.settle)
            .field("state", &self.state)
            .finish()
    }
}

impl FolderWatcher {
    pub fn new(layout: SinkLayout, pipeline: Arc<SinkPipeline>, settle: SettlePolicy) -> Self {
        Self {
            layout,
            pipeline,
            settle,
            state: WatcherState::Uninitialized,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn layout(&self) -> &SinkLayout {
        &self.layout
    }

    /// Ensures the sink root and fixed subtrees exist. Idempotent.
    pub fn setup(&mut self) -> Result<(), SinkError> {
        self.require(&[WatcherState::Uninitialized, WatcherState::Ready], "set up")?;
        self.layout.setup()?;
        self.state = WatcherState::Ready;
        Ok(())
    }

    /// Processes a snapshot of the queue sequentially. Files that appear
    /// during the scan may or may not be included.
    pub async fn scan(
        &mut self,
        queue: &dyn WorkQueue,
        shutdown: &CancellationToken,
    ) -> Result<ScanReport, SinkError> {
        self.require(&[WatcherState::Ready], "scan")?;
        self.state = WatcherState::Scanning;
        let result = self.scan_pass(queue, shutdown).await;
        self.state = WatcherState::Ready;
        result
    }

    async fn scan_pass(
        &self,
        queue: &dyn WorkQueue,
        shutdown: &CancellationToken,
    ) -> Result<ScanReport, SinkError> {
        let paths = queue.discover()?;
        info!(
            "Scanning {} existing file(s) in {}",
            paths.len(),
            self.layout.root().display()
        );

        let mut report = ScanReport::default();
        for path in paths {
            if shutdown.is_cancelled() {
                info!("Scan interrupted, remaining files stay queued");
                break;
            }
            self.dispatch(queue, &path, true, shutdown, &mut report)
                .await;
        }
        Ok(report)
    }

    /// Consumes `source` until `shutdown` fires. A failing file never stops
    /// the loop; only the change source itself can end it with an error.
    pub async fn watch(
        &mut self,
        mut source: Box<dyn ChangeSource>,
        queue: &dyn WorkQueue,
        shutdown: CancellationToken,
    ) -> Result<ScanReport, SinkError> {
        self.require(&[WatcherState::Ready], "watch")?;
        self.state = WatcherState::Watching;
        info!("👀 Watching sink folder: {}", self.layout.root().display());

        let mut report = ScanReport::default();
        let mut retries = RetryQueue::default();
        let result = loop {
            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Wake::Shutdown,
                _ = retry_timer(retries.next_due()) => Wake::Retry,
                change = source.next_change() => Wake::Change(change),
            };

            let paths = match wake {
                Wake::Shutdown => break Ok(()),
                Wake::Retry => retries.due(Instant::now()),
                Wake::Change(Err(err)) => break Err(err),
                Wake::Change(Ok(Change::Paths(paths))) => paths,
                Wake::Change(Ok(Change::Rescan)) => match queue.discover() {
                    Ok(paths) => paths,
                    Err(err) => break Err(err),
                },
            };

            for path in paths {
                if shutdown.is_cancelled() {
                    break;
                }
                let outcome = self
                    .dispatch(queue, &path, false, &shutdown, &mut report)
                    .await;
                if matches!(outcome, Dispatch::Interrupted) {
                    break;
                }
                if outcome.needs_retry() {
                    let delay = retries.defer(&path, self.settle.interval, Instant::now());
                    debug!("Retrying {} in {:?}", path.display(), delay);
                } else {
                    retries.forget(&path);
                }
            }
        };

        if !retries.is_empty() {
            info!("{} file(s) awaiting retry stay in place", retries.len());
        }
        info!("Stopping sink folder watcher ({})", report);
        self.state = match result {
            Ok(()) => WatcherState::Stopped,
            Err(_) => WatcherState::Ready,
        };
        result.map(|()| report)
    }

    async fn dispatch(
        &self,
        queue: &dyn WorkQueue,
        path: &Path,
        relaxed: bool,
        shutdown: &CancellationToken,
        report: &mut ScanReport,
    ) -> Dispatch {
        let stability = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Dispatch::Interrupted,
            stability = wait_until_stable(path, self.settle, relaxed) => stability,
        };
        match stability {
            Stability::Stable => {}
            Stability::Gone => {
                debug!("{} disappeared before it settled", path.display());
                return Dispatch::Gone;
            }
            Stability::Unsettled => {
                warn!(
                    "{} is still changing after {:?}, leaving it in place",
                    path.display(),
                    self.settle.timeout
                );
                report.unsettled += 1;
                return Dispatch::Unsettled;
            }
        }

        let Some(claim) = queue.claim(path) else {
            debug!("{} is already being handled", path.display());
            return Dispatch::Busy;
        };
        let disposition = self.pipeline.handle(claim.path()).await;
        report.record(&disposition);
        Dispatch::Handled(disposition)
    }

    fn require(&self, allowed: &[WatcherState], operation: &'static str) -> Result<(), SinkError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SinkError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }
}
