use std::path::{Path, PathBuf};

use super::workout::{SportId, WorkoutExtension};

/// A workout file found in the intake tree, resolved to its owner and sport.
///
/// Built once by the path resolver for each discovered file; the fields are
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    source_path: PathBuf,
    username: String,
    sport_id: Option<SportId>,
    extension: WorkoutExtension,
}

impl ImportRequest {
    pub fn new(
        source_path: PathBuf,
        username: impl Into<String>,
        sport_id: Option<SportId>,
        extension: WorkoutExtension,
    ) -> Self {
        Self {
            source_path,
            username: username.into(),
            sport_id,
            extension,
        }
    }

    /// Absolute path of the file inside the intake tree.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Sport from the `{username}/{sport_id}/` folder. `None` means the
    /// configured default sport applies.
    pub fn sport_id(&self) -> Option<SportId> {
        self.sport_id
    }

    pub fn extension(&self) -> WorkoutExtension {
        self.extension
    }
}
