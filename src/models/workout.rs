use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Account identifier as known by the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sport identifier from the sport catalog. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SportId(pub u32);

impl fmt::Display for SportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the importer hands back for a stored workout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkoutId(pub String);

impl fmt::Display for WorkoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Workout file formats accepted by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutExtension {
    Fit,
    Gpx,
    Tcx,
    Kml,
    Kmz,
}

impl WorkoutExtension {
    pub const ALL: [WorkoutExtension; 5] = [
        WorkoutExtension::Fit,
        WorkoutExtension::Gpx,
        WorkoutExtension::Tcx,
        WorkoutExtension::Kml,
        WorkoutExtension::Kmz,
    ];

    /// Case-insensitive parse of a bare extension (no leading dot).
    pub fn parse(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "fit" => Some(Self::Fit),
            "gpx" => Some(Self::Gpx),
            "tcx" => Some(Self::Tcx),
            "kml" => Some(Self::Kml),
            "kmz" => Some(Self::Kmz),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Gpx => "gpx",
            Self::Tcx => "tcx",
            Self::Kml => "kml",
            Self::Kmz => "kmz",
        }
    }
}

impl fmt::Display for WorkoutExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
