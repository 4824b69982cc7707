use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::workout::WorkoutId;

/// Per-file failure classes. The names are written verbatim into `.error`
/// sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidPathShape,
    UnsupportedExtension,
    UnknownUser,
    SuspendedUser,
    InvalidSport,
    ImportFailed,
    MoveFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPathShape => "InvalidPathShape",
            Self::UnsupportedExtension => "UnsupportedExtension",
            Self::UnknownUser => "UnknownUser",
            Self::SuspendedUser => "SuspendedUser",
            Self::InvalidSport => "InvalidSport",
            Self::ImportFailed => "ImportFailed",
            Self::MoveFailed => "MoveFailed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ImportFailure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Renders the plain-text body of an `.error` sidecar.
    pub fn render_sidecar(&self, source: &str, at: DateTime<Utc>) -> String {
        format!(
            "Timestamp: {}\nKind: {}\nError: {}\nSource: {}\n",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.kind,
            self.detail.replace('\n', " "),
            source
        )
    }
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Result of pushing one file through the import worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { workout_id: WorkoutId },
    Failed(ImportFailure),
}

impl ImportOutcome {
    pub fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Failed(ImportFailure::new(kind, detail))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Imported { .. })
    }

    pub fn workout_id(&self) -> Option<&WorkoutId> {
        match self {
            Self::Imported { workout_id } => Some(workout_id),
            Self::Failed(_) => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Imported { .. } => None,
            Self::Failed(failure) => Some(failure.kind),
        }
    }

    pub fn error_detail(&self) -> Option<&str> {
        match self {
            Self::Imported { .. } => None,
            Self::Failed(failure) => Some(&failure.detail),
        }
    }
}
