use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use super::layout::SinkLayout;
use crate::models::{ErrorKind, ImportFailure, ImportRequest, SportId, WorkoutExtension};

/// What to do with `{username}/{segment}/file` when `segment` is not a
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SportDirPolicy {
    /// Route the file to the error area as an invalid path shape.
    #[default]
    Reject,
    /// Treat the file as a username-level drop and apply the default sport.
    DefaultSport,
}

/// Why a path was not turned into an [`ImportRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Not sink input at all. Left untouched.
    Ignored(IgnoreReason),
    /// Sink input that can never be imported. Routed to the error area.
    Invalid(InvalidFile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OutsideSink,
    ReservedTree,
    Hidden,
    NotAFile,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::OutsideSink => "outside sink root",
            Self::ReservedTree => "inside processed/error tree",
            Self::Hidden => "hidden file",
            Self::NotAFile => "not a regular file",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFile {
    pub source_path: PathBuf,
    /// First segment under the sink root, when the file has one.
    pub username: Option<String>,
    pub failure: ImportFailure,
}

/// Maps a discovered path to the user and sport it was dropped for.
#[derive(Debug, Clone)]
pub struct PathResolver {
    layout: SinkLayout,
    sport_dir_policy: SportDirPolicy,
}

impl PathResolver {
    pub fn new(layout: SinkLayout, sport_dir_policy: SportDirPolicy) -> Self {
        Self {
            layout,
            sport_dir_policy,
        }
    }

    pub fn layout(&self) -> &SinkLayout {
        &self.layout
    }

    /// Resolves `path`, either absolute under the sink root or relative to it.
    pub fn resolve(&self, path: &Path) -> Result<ImportRequest, Rejection> {
        let root = self.layout.root();
        let relative = if path.is_absolute() {
            path.strip_prefix(root)
                .map_err(|_| Rejection::Ignored(IgnoreReason::OutsideSink))?
        } else {
            path
        };
        let source_path = root.join(relative);

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(seg) => segments.push(seg),
                Component::CurDir => {}
                _ => return Err(Rejection::Ignored(IgnoreReason::OutsideSink)),
            }
        }

        let (Some(first), Some(file_name)) = (segments.first(), segments.last()) else {
            return Err(Rejection::Ignored(IgnoreReason::OutsideSink));
        };
        if SinkLayout::is_reserved(first) {
            return Err(Rejection::Ignored(IgnoreReason::ReservedTree));
        }
        if file_name.to_string_lossy().starts_with('.') {
            return Err(Rejection::Ignored(IgnoreReason::Hidden));
        }
        if !source_path.is_file() {
            return Err(Rejection::Ignored(IgnoreReason::NotAFile));
        }

        let username = (segments.len() > 1).then(|| first.to_string_lossy().into_owned());
        let invalid = |kind: ErrorKind, detail: String| {
            Rejection::Invalid(InvalidFile {
                source_path: source_path.clone(),
                username: username.clone(),
                failure: ImportFailure::new(kind, detail),
            })
        };

        let Some(extension) = WorkoutExtension::from_path(&source_path) else {
            let expected: Vec<&str> = WorkoutExtension::ALL.iter().map(|e| e.as_str()).collect();
            return Err(invalid(
                ErrorKind::UnsupportedExtension,
                format!(
                    "Unsupported file extension for '{}'. Expected one of: {}",
                    file_name.to_string_lossy(),
                    expected.join(", ")
                ),
            ));
        };

        let sport_id = match segments.len() {
            1 => {
                return Err(invalid(
                    ErrorKind::InvalidPathShape,
                    "File is not inside a user folder. Expected: sink/username/file or sink/username/sport_id/file".to_string(),
                ));
            }
            2 => None,
            3 => self.parse_sport_segment(&segments[1].to_string_lossy(), &invalid)?,
            depth => {
                return Err(invalid(
                    ErrorKind::InvalidPathShape,
                    format!(
                        "Path is nested {} levels deep. Expected: sink/username/file or sink/username/sport_id/file",
                        depth - 1
                    ),
                ));
            }
        };

        let Some(username) = first.to_str() else {
            return Err(invalid(
                ErrorKind::InvalidPathShape,
                format!(
                    "Username folder '{}' is not valid UTF-8",
                    first.to_string_lossy()
                ),
            ));
        };

        Ok(ImportRequest::new(source_path, username, sport_id, extension))
    }

    fn parse_sport_segment(
        &self,
        segment: &str,
        invalid: &dyn Fn(ErrorKind, String) -> Rejection,
    ) -> Result<Option<SportId>, Rejection> {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            return match segment.parse::<u32>() {
                Ok(id) if id > 0 => Ok(Some(SportId(id))),
                _ => Err(invalid(
                    ErrorKind::InvalidSport,
                    format!("Sport folder '{}' is not a valid sport ID", segment),
                )),
            };
        }

        match self.sport_dir_policy {
            SportDirPolicy::DefaultSport => Ok(None),
            SportDirPolicy::Reject => Err(invalid(
                ErrorKind::InvalidPathShape,
                format!(
                    "Second-level folder '{}' is not a numeric sport ID",
                    segment
                ),
            )),
        }
    }
}
