// src/services/collaborators.rs
//! Seams to the workout application: who owns a file, which sports exist,
//! and who turns a file into stored workouts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{SportId, UserId, WorkoutId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserLookupError {
    #[error("No account named '{0}'")]
    NotFound(String),
    #[error("User {0} is suspended")]
    Suspended(String),
    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Sport catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Rejected(String),
    #[error("Importer unavailable: {0}")]
    Unavailable(String),
}

/// Looks up accounts by the username folder a file was dropped in.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve_user(&self, username: &str) -> Result<UserId, UserLookupError>;
}

#[async_trait]
pub trait SportCatalog: Send + Sync {
    /// `Ok(false)` when the sport does not exist.
    async fn validate_sport(&self, sport_id: SportId) -> Result<bool, CatalogError>;
}

/// Parses and persists a workout file. Must not move or delete `file`.
#[async_trait]
pub trait WorkoutImporter: Send + Sync {
    async fn import_workout(
        &self,
        owner: UserId,
        sport_id: SportId,
        file: &Path,
    ) -> Result<WorkoutId, ImportError>;
}
