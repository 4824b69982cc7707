use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{ErrorKind, ImportOutcome, ImportRequest, SportId};
use crate::services::collaborators::{
    SportCatalog, UserDirectory, UserLookupError, WorkoutImporter,
};

/// Validates a request against the user directory and sport catalog, then
/// hands the file to the importer. Never touches the file on disk.
#[derive(Clone)]
pub struct ImportWorker {
    users: Arc<dyn UserDirectory>,
    sports: Arc<dyn SportCatalog>,
    importer: Arc<dyn WorkoutImporter>,
    default_sport_id: SportId,
}

impl ImportWorker {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        sports: Arc<dyn SportCatalog>,
        importer: Arc<dyn WorkoutImporter>,
        default_sport_id: SportId,
    ) -> Self {
        Self {
            users,
            sports,
            importer,
            default_sport_id,
        }
    }

    pub async fn process(&self, request: &ImportRequest) -> ImportOutcome {
        let path = request.source_path();
        debug!(
            "Processing file: {} (user={}, sport={:?})",
            path.display(),
            request.username(),
            request.sport_id()
        );

        let owner = match self.users.resolve_user(request.username()).await {
            Ok(owner) => owner,
            Err(err) => {
                let kind = match err {
                    UserLookupError::NotFound(_) => ErrorKind::UnknownUser,
                    UserLookupError::Suspended(_) => ErrorKind::SuspendedUser,
                    UserLookupError::Unavailable(_) => ErrorKind::ImportFailed,
                };
                return ImportOutcome::failed(kind, err.to_string());
            }
        };

        if let Some(sport_id) = request.sport_id() {
            match self.sports.validate_sport(sport_id).await {
                Ok(true) => {}
                Ok(false) => {
                    return ImportOutcome::failed(
                        ErrorKind::InvalidSport,
                        format!("Sport ID {} not found", sport_id),
                    );
                }
                Err(err) => return ImportOutcome::failed(ErrorKind::ImportFailed, err.to_string()),
            }
        }

        let sport_id = request.sport_id().unwrap_or(self.default_sport_id);
        match self.importer.import_workout(owner, sport_id, path).await {
            Ok(workout_id) => {
                info!(
                    "Successfully imported workout for user {}: {} (sport {})",
                    request.username(),
                    workout_id,
                    sport_id
                );
                ImportOutcome::Imported { workout_id }
            }
            Err(err) => {
                debug!("Importer rejected {}: {}", path.display(), err);
                ImportOutcome::failed(ErrorKind::ImportFailed, err.to_string())
            }
        }
    }
}
