//! Workout Sink - folder-drop importer for workout files

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod sink;

// Re-export main types for convenience
pub use crate::config::Config;
pub use crate::error::{MoveError, SinkError};
pub use crate::models::{ErrorKind, ImportOutcome, ImportRequest, SportId, UserId, WorkoutId};
pub use crate::orchestrator::SinkService;
pub use crate::services::{FolderWatcher, ScanReport, WatchBackend, WorkoutApiClient};
pub use crate::sink::{Disposition, SinkLayout, SinkPipeline};
