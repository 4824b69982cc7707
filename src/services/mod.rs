pub mod api_client;
pub mod change_source;
pub mod collaborators;
pub mod file_watcher;

// Re-export for convenience
pub use api_client::{ApiClientError, WorkoutApiClient};
pub use change_source::{open_change_source, Change, ChangeSource, WatchBackend};
pub use collaborators::{
    CatalogError, ImportError, SportCatalog, UserDirectory, UserLookupError, WorkoutImporter,
};
pub use file_watcher::{FolderWatcher, ScanReport, SettlePolicy, WatcherState};
