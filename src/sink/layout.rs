use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::SinkError;

pub const SINK_FOLDER_NAME: &str = "sink";
pub const PROCESSED_FOLDER_NAME: &str = "processed";
pub const ERROR_FOLDER_NAME: &str = "error";
/// Appended to the original file name for error sidecars.
pub const ERROR_SIDECAR_SUFFIX: &str = ".error";
/// Destination folder used when a file has no owning username segment.
pub const UNKNOWN_USER_FOLDER: &str = "unknown";

/// The fixed folder contract of a sink root:
///
/// ```text
/// <upload_folder>/sink/
///   {username}/                  intake, default sport
///   {username}/{sport_id}/       intake, explicit sport
///   processed/{username}/        success destination
///   error/{username}/            failure destination (+ "<file>.error")
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkLayout {
    root: PathBuf,
}

impl SinkLayout {
    /// Sink root directly. Relative paths are resolved against the current
    /// directory so notification paths can be matched against it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(root)
        };
        Self { root }
    }

    pub fn from_upload_folder(upload_folder: impl AsRef<Path>) -> Self {
        Self::new(upload_folder.as_ref().join(SINK_FOLDER_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_FOLDER_NAME)
    }

    pub fn error_dir(&self) -> PathBuf {
        self.root.join(ERROR_FOLDER_NAME)
    }

    pub fn processed_dir_for(&self, username: Option<&str>) -> PathBuf {
        self.processed_dir()
            .join(username.unwrap_or(UNKNOWN_USER_FOLDER))
    }

    pub fn error_dir_for(&self, username: Option<&str>) -> PathBuf {
        self.error_dir().join(username.unwrap_or(UNKNOWN_USER_FOLDER))
    }

    /// `processed` and `error` are destinations, never intake.
    pub fn is_reserved(name: &OsStr) -> bool {
        name == PROCESSED_FOLDER_NAME || name == ERROR_FOLDER_NAME
    }

    /// Creates the sink root and its fixed subtrees. Safe to call on every
    /// startup.
    pub fn setup(&self) -> Result<(), SinkError> {
        for dir in [self.root.clone(), self.processed_dir(), self.error_dir()] {
            fs::create_dir_all(&dir).map_err(|source| SinkError::Setup {
                path: dir.clone(),
                source,
            })?;
        }

        info!("Sink folder initialized at: {}", self.root.display());
        info!(
            "Structure:\n  {root}/\n    ├── {{username}}/           # Place files here per user\n    │   └── {{sport_id}}/       # Optional: subfolder for sport\n    ├── {processed}/            # Successfully processed files\n    └── {error}/                # Failed files",
            root = self.root.display(),
            processed = PROCESSED_FOLDER_NAME,
            error = ERROR_FOLDER_NAME,
        );
        Ok(())
    }

    /// Lists every regular file currently in the intake tree, skipping the
    /// destination subtrees. Sorted for a stable processing order.
    pub fn intake_files(&self) -> Result<Vec<PathBuf>, SinkError> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.depth() == 1
                    && entry.file_type().is_dir()
                    && Self::is_reserved(entry.file_name()))
            });

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(err) if err.depth() == 0 => {
                    return Err(SinkError::Discover {
                        path: self.root.clone(),
                        source: err,
                    });
                }
                Err(err) => warn!("Skipping unreadable intake entry: {}", err),
            }
        }
        Ok(files)
    }
}
