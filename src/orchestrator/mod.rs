//! Entry points behind the `setup`, `batch-process` and `watch` commands.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::SinkError;
use crate::models::SportId;
use crate::services::{
    open_change_source, FolderWatcher, ScanReport, SettlePolicy, SportCatalog, UserDirectory,
    WorkoutImporter,
};
use crate::sink::{FsWorkQueue, ImportWorker, OutcomeMover, PathResolver, SinkLayout, SinkPipeline};

pub struct SinkService {
    config: Config,
    layout: SinkLayout,
    pipeline: Arc<SinkPipeline>,
}

impl SinkService {
    pub fn new(
        config: Config,
        users: Arc<dyn UserDirectory>,
        sports: Arc<dyn SportCatalog>,
        importer: Arc<dyn WorkoutImporter>,
    ) -> Self {
        let layout = SinkLayout::from_upload_folder(&config.upload_folder);
        let worker = ImportWorker::new(
            users,
            sports,
            importer,
            SportId(config.default_sport_id),
        );
        let pipeline = SinkPipeline::new(
            PathResolver::new(layout.clone(), config.non_numeric_sport_dir),
            worker,
            OutcomeMover::new(layout.clone()),
        );

        Self {
            config,
            layout,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn layout(&self) -> &SinkLayout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn folder_watcher(&self) -> FolderWatcher {
        FolderWatcher::new(
            self.layout.clone(),
            Arc::clone(&self.pipeline),
            SettlePolicy {
                interval: self.config.settle_interval(),
                timeout: self.config.settle_timeout(),
            },
        )
    }

    /// Creates the sink folder structure.
    pub fn setup(&self) -> Result<(), SinkError> {
        self.folder_watcher().setup()
    }

    /// One pass over every file currently in the intake tree.
    pub async fn batch_process(&self, shutdown: &CancellationToken) -> Result<ScanReport, SinkError> {
        let mut watcher = self.folder_watcher();
        watcher.setup()?;
        let queue = FsWorkQueue::new(self.layout.clone());

        let report = watcher.scan(&queue, shutdown).await?;
        info!("✅ Batch processing complete: {}", report);
        Ok(report)
    }

    /// Watches the sink root until `shutdown` fires, optionally after an
    /// initial scan. The returned report covers the watch phase only.
    pub async fn watch(
        &self,
        initial_scan: bool,
        shutdown: CancellationToken,
    ) -> Result<ScanReport, SinkError> {
        let mut watcher = self.folder_watcher();
        watcher.setup()?;
        let queue = FsWorkQueue::new(self.layout.clone());

        // Open the source before scanning so drops during the scan are seen.
        let source = open_change_source(
            self.config.watch_backend,
            &self.layout,
            self.config.poll_interval(),
        )?;

        if initial_scan {
            let report = watcher.scan(&queue, &shutdown).await?;
            info!("✅ Initial scan complete: {}", report);
        }

        watcher.watch(source, &queue, shutdown).await
    }
}
