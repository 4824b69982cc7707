// src/services/change_source.rs
//! Directory-change feeds for the watch loop.
//!
//! Two backends share one interface: `notify` for native filesystem
//! notifications and a polling differ for filesystems where notifications are
//! unavailable (network mounts, some container volumes). Both yield candidate
//! file paths under the sink root; anything that can't be attributed to a
//! specific file becomes a full rescan.

use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::SinkError;
use crate::sink::SinkLayout;

const CHANNEL_CAPACITY: usize = 1024;

/// Which change source to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackend {
    /// Native notifications, polling if they cannot be set up.
    #[default]
    Auto,
    Native,
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Files that appeared (created or renamed into place).
    Paths(Vec<PathBuf>),
    /// Events were lost or unattributable; re-list the intake tree.
    Rescan,
}

#[async_trait]
pub trait ChangeSource: Send {
    /// Waits for the next change. Cancel-safe.
    async fn next_change(&mut self) -> Result<Change, SinkError>;
}

enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Native backend built on `notify::RecommendedWatcher`.
pub struct NotifyChangeSource {
    layout: SinkLayout,
    /// Canonical form of the sink root, as reported by the OS.
    watched: PathBuf,
    rx: mpsc::Receiver<WatchMessage>,
    _watcher: RecommendedWatcher,
}

impl fmt::Debug for NotifyChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyChangeSource")
            .field("root", &self.layout.root())
            .field("watched", &self.watched)
            .finish()
    }
}

impl NotifyChangeSource {
    pub fn new(layout: SinkLayout) -> Result<Self, SinkError> {
        let root = layout.root().to_path_buf();
        let watched = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        let (tx, rx) = mpsc::channel::<WatchMessage>(CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(err) = tx.blocking_send(WatchMessage::Event(event)) {
                        debug!("Dropping notification after shutdown: {}", err);
                    }
                }
                Err(err) => {
                    let _ = tx.blocking_send(WatchMessage::Error(err.to_string()));
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|source| SinkError::Notify {
            path: root.clone(),
            source,
        })?;

        watcher
            .watch(&watched, RecursiveMode::Recursive)
            .map_err(|source| SinkError::Notify {
                path: root.clone(),
                source,
            })?;

        Ok(Self {
            layout,
            watched,
            rx,
            _watcher: watcher,
        })
    }

    /// Maps a reported path back under the configured sink root.
    fn to_sink_path(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(relative) = path.strip_prefix(&self.watched) {
            return Some(self.layout.root().join(relative));
        }
        path.starts_with(self.layout.root()).then(|| path.to_path_buf())
    }

    fn candidates(&self, event: &Event) -> Vec<PathBuf> {
        let reported: Vec<&PathBuf> = match event.kind {
            EventKind::Create(_) => event.paths.iter().collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.last().into_iter().collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
                event.paths.iter().collect()
            }
            _ => Vec::new(),
        };

        let mut files = Vec::new();
        for path in reported {
            let Some(path) = self.to_sink_path(path) else {
                continue;
            };
            if in_reserved_tree(self.layout.root(), &path) {
                continue;
            }
            if path.is_dir() {
                // Files copied in together with their folder may predate the
                // recursive watch on that folder.
                files.extend(files_under(&path));
            } else if path.is_file() {
                files.push(path);
            }
        }
        files
    }
}

#[async_trait]
impl ChangeSource for NotifyChangeSource {
    async fn next_change(&mut self) -> Result<Change, SinkError> {
        loop {
            let message = self.rx.recv().await.ok_or(SinkError::WatchClosed)?;
            match message {
                WatchMessage::Event(event) => {
                    if event.need_rescan() || matches!(event.kind, EventKind::Other) {
                        return Ok(Change::Rescan);
                    }
                    let paths = self.candidates(&event);
                    if !paths.is_empty() {
                        return Ok(Change::Paths(paths));
                    }
                }
                WatchMessage::Error(message) => {
                    warn!("Filesystem watcher error, rescanning: {}", message);
                    return Ok(Change::Rescan);
                }
            }
        }
    }
}

/// Identity of a listed file: a re-dropped file under a known name differs in
/// at least one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
    inode: u64,
}

impl Stamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
            inode: inode(&metadata),
        })
    }
}

#[cfg(unix)]
fn inode(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode(_metadata: &fs::Metadata) -> u64 {
    0
}

fn stamped_listing(layout: &SinkLayout) -> Result<HashMap<PathBuf, Stamp>, SinkError> {
    Ok(layout
        .intake_files()?
        .into_iter()
        .filter_map(|path| Stamp::of(&path).map(|stamp| (path, stamp)))
        .collect())
}

/// Polling backend: diffs successive listings of the intake tree.
///
/// A path is reported when it is new or when its size, mtime or inode changed
/// since the previous listing, so a file dropped again under a name that was
/// just moved away is still seen. Files present when the source is created are
/// the baseline and are not reported; run a scan to pick those up.
#[derive(Debug)]
pub struct PollingChangeSource {
    layout: SinkLayout,
    interval: Duration,
    /// Kept across calls so a cancelled wait does not push the next listing out.
    next_poll: Instant,
    known: HashMap<PathBuf, Stamp>,
}

impl PollingChangeSource {
    pub fn new(layout: SinkLayout, interval: Duration) -> Result<Self, SinkError> {
        let known = stamped_listing(&layout)?;
        Ok(Self {
            layout,
            interval,
            next_poll: Instant::now() + interval,
            known,
        })
    }
}

#[async_trait]
impl ChangeSource for PollingChangeSource {
    async fn next_change(&mut self) -> Result<Change, SinkError> {
        loop {
            tokio::time::sleep_until(self.next_poll).await;
            self.next_poll = Instant::now() + self.interval;

            let layout = self.layout.clone();
            let current =
                tokio::task::spawn_blocking(move || stamped_listing(&layout)).await??;

            let mut changed: Vec<PathBuf> = current
                .iter()
                .filter(|(path, stamp)| self.known.get(*path) != Some(*stamp))
                .map(|(path, _)| path.clone())
                .collect();
            self.known = current;

            if !changed.is_empty() {
                changed.sort();
                return Ok(Change::Paths(changed));
            }
        }
    }
}

/// Builds the source selected by `backend`.
pub fn open_change_source(
    backend: WatchBackend,
    layout: &SinkLayout,
    poll_interval: Duration,
) -> Result<Box<dyn ChangeSource>, SinkError> {
    match backend {
        WatchBackend::Native => Ok(Box::new(NotifyChangeSource::new(layout.clone())?)),
        WatchBackend::Polling => Ok(Box::new(PollingChangeSource::new(
            layout.clone(),
            poll_interval,
        )?)),
        WatchBackend::Auto => match NotifyChangeSource::new(layout.clone()) {
            Ok(source) => Ok(Box::new(source)),
            Err(err) => {
                warn!(
                    "⚠️ Native notifications unavailable ({}), polling every {:?}",
                    err, poll_interval
                );
                Ok(Box::new(PollingChangeSource::new(
                    layout.clone(),
                    poll_interval,
                )?))
            }
        },
    }
}

fn in_reserved_tree(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .ok()
        .and_then(|relative| relative.components().next())
        .is_some_and(|first| SinkLayout::is_reserved(first.as_os_str()))
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
