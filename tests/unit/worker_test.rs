use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workout_sink::models::{
    ErrorKind, ImportOutcome, ImportRequest, SportId, UserId, WorkoutExtension, WorkoutId,
};
use workout_sink::services::{
    CatalogError, ImportError, SportCatalog, UserDirectory, UserLookupError, WorkoutImporter,
};
use workout_sink::sink::ImportWorker;

mock! {
    pub Users {}

    #[async_trait]
    impl UserDirectory for Users {
        async fn resolve_user(&self, username: &str) -> Result<UserId, UserLookupError>;
    }
}

mock! {
    pub Sports {}

    #[async_trait]
    impl SportCatalog for Sports {
        async fn validate_sport(&self, sport_id: SportId) -> Result<bool, CatalogError>;
    }
}

mock! {
    pub Importer {}

    #[async_trait]
    impl WorkoutImporter for Importer {
        async fn import_workout(&self, owner: UserId, sport_id: SportId, file: &Path) -> Result<WorkoutId, ImportError>;
    }
}

// ============================================
// Helpers
// ============================================

fn request(sport: Option<u32>) -> ImportRequest {
    ImportRequest::new(
        PathBuf::from("/data/sink/alice/ride.fit"),
        "alice",
        sport.map(SportId),
        WorkoutExtension::Fit,
    )
}

fn worker(users: MockUsers, sports: MockSports, importer: MockImporter) -> ImportWorker {
    ImportWorker::new(
        Arc::new(users),
        Arc::new(sports),
        Arc::new(importer),
        SportId(1),
    )
}

fn known_alice() -> MockUsers {
    let mut users = MockUsers::new();
    users
        .expect_resolve_user()
        .withf(|name| name == "alice")
        .returning(|_| Ok(UserId(42)));
    users
}

// ============================================
// Successful imports
// ============================================

#[tokio::test]
async fn test_default_sport_applied_without_catalog_lookup() {
    let mut sports = MockSports::new();
    sports.expect_validate_sport().never();

    let mut importer = MockImporter::new();
    importer
        .expect_import_workout()
        .withf(|owner, sport, file| {
            *owner == UserId(42)
                && *sport == SportId(1)
                && file == Path::new("/data/sink/alice/ride.fit")
        })
        .times(1)
        .returning(|_, _, _| Ok(WorkoutId("w-1".to_string())));

    let outcome = worker(known_alice(), sports, importer)
        .process(&request(None))
        .await;

    assert_eq!(
        outcome,
        ImportOutcome::Imported {
            workout_id: WorkoutId("w-1".to_string())
        }
    );
}

#[tokio::test]
async fn test_explicit_sport_is_validated_and_used() {
    let mut sports = MockSports::new();
    sports
        .expect_validate_sport()
        .with(eq(SportId(5)))
        .times(1)
        .returning(|_| Ok(true));

    let mut importer = MockImporter::new();
    importer
        .expect_import_workout()
        .withf(|_, sport, _| *sport == SportId(5))
        .times(1)
        .returning(|_, _, _| Ok(WorkoutId("w-5".to_string())));

    let outcome = worker(known_alice(), sports, importer)
        .process(&request(Some(5)))
        .await;
    assert!(outcome.is_success());
}

// ============================================
// Failures
// ============================================

#[tokio::test]
async fn test_unknown_user() {
    let mut users = MockUsers::new();
    users
        .expect_resolve_user()
        .returning(|name| Err(UserLookupError::NotFound(name.to_string())));
    let mut importer = MockImporter::new();
    importer.expect_import_workout().never();

    let outcome = worker(users, MockSports::new(), importer)
        .process(&request(None))
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::UnknownUser));
    assert_eq!(outcome.error_detail(), Some("No account named 'alice'"));
}

#[tokio::test]
async fn test_suspended_user() {
    let mut users = MockUsers::new();
    users
        .expect_resolve_user()
        .returning(|name| Err(UserLookupError::Suspended(name.to_string())));

    let outcome = worker(users, MockSports::new(), MockImporter::new())
        .process(&request(None))
        .await;
    assert_eq!(outcome.error_kind(), Some(ErrorKind::SuspendedUser));
}

#[tokio::test]
async fn test_directory_outage_is_import_failure() {
    let mut users = MockUsers::new();
    users
        .expect_resolve_user()
        .returning(|_| Err(UserLookupError::Unavailable("connection refused".to_string())));

    let outcome = worker(users, MockSports::new(), MockImporter::new())
        .process(&request(None))
        .await;
    assert_eq!(outcome.error_kind(), Some(ErrorKind::ImportFailed));
}

#[tokio::test]
async fn test_unknown_sport() {
    let mut sports = MockSports::new();
    sports.expect_validate_sport().returning(|_| Ok(false));
    let mut importer = MockImporter::new();
    importer.expect_import_workout().never();

    let outcome = worker(known_alice(), sports, importer)
        .process(&request(Some(99)))
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::InvalidSport));
    assert_eq!(outcome.error_detail(), Some("Sport ID 99 not found"));
}

#[tokio::test]
async fn test_catalog_outage_is_import_failure() {
    let mut sports = MockSports::new();
    sports
        .expect_validate_sport()
        .returning(|_| Err(CatalogError::Unavailable("timeout".to_string())));

    let outcome = worker(known_alice(), sports, MockImporter::new())
        .process(&request(Some(3)))
        .await;
    assert_eq!(outcome.error_kind(), Some(ErrorKind::ImportFailed));
}

#[tokio::test]
async fn test_importer_rejection_keeps_message() {
    let mut importer = MockImporter::new();
    importer
        .expect_import_workout()
        .returning(|_, _, _| Err(ImportError::Rejected("No tracks in file".to_string())));

    let outcome = worker(known_alice(), MockSports::new(), importer)
        .process(&request(None))
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ImportFailed));
    assert_eq!(outcome.error_detail(), Some("No tracks in file"));
    assert!(outcome.workout_id().is_none());
}
