//! Two-stage mirror: `import` clears the destination, copies the value
//! columns in chunks, restores the template formulas and schedules
//! `normalize`; `normalize` formats dates and freezes the formula columns.

pub mod copier;
pub mod normalize;
pub mod restore;

pub use copier::{CopyReport, clear_destination, copy_chunks, plan_batches};
pub use normalize::{format_dates, freeze_formulas};
pub use restore::{RestoreReport, restore_formulas};

use crate::backend::{Sheet, SheetBackend};
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::model::{ContainerId, SheetRegion};
use crate::scheduler::{Scheduler, Trigger, TriggerTarget};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub cleared: Option<SheetRegion>,
    pub copy: CopyReport,
    pub restore: Option<RestoreReport>,
    pub restore_error: Option<String>,
    pub trigger: Trigger,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizeReport {
    pub cancelled_triggers: usize,
    pub last_row: u32,
    pub dates_formatted: usize,
    pub frozen: Option<SheetRegion>,
}

pub struct SyncPipeline {
    config: Arc<SyncConfig>,
    backend: Arc<dyn SheetBackend>,
    scheduler: Scheduler,
}

impl SyncPipeline {
    pub fn new(
        config: Arc<SyncConfig>,
        backend: Arc<dyn SheetBackend>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            config,
            backend,
            scheduler,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    async fn open(&self, container: &ContainerId) -> Result<Arc<dyn Sheet>, SyncError> {
        self.backend
            .open_sheet(container, &self.config.sheet_name)
            .await
            .map_err(SyncError::Setup)
    }

    /// First stage. Transfer errors abort before restoration and scheduling;
    /// a restoration error is recorded and scheduling still happens.
    pub async fn import_stage(&self) -> Result<ImportReport, SyncError> {
        let started = Instant::now();
        let layout = &self.config.layout;

        let source = self.open(&self.config.source_id).await?;
        let dest = self.open(&self.config.destination_id).await?;
        let source_last_row = source.last_row().await.map_err(SyncError::Setup)?;

        let transfer = async {
            let cleared = clear_destination(dest.as_ref(), layout).await?;
            let copy = copy_chunks(source.as_ref(), dest.as_ref(), layout, source_last_row).await?;
            Ok::<_, SyncError>((cleared, copy))
        }
        .await;

        let (cleared, copy) = match transfer {
            Ok(done) => done,
            Err(err) => {
                // Batches written before the failure are kept.
                if let Err(flush_err) = dest.flush().await {
                    tracing::warn!(error = %format!("{flush_err:#}"), "failed to flush partial copy");
                }
                return Err(err);
            }
        };

        let (restore, restore_error) =
            match restore_formulas(dest.as_ref(), layout, self.config.translate_template).await {
                Ok(report) => (Some(report), None),
                Err(err) => {
                    let err = SyncError::Restore(err);
                    tracing::warn!(error = %err, "formula restore failed; continuing");
                    (None, Some(err.to_string()))
                }
            };

        dest.flush()
            .await
            .map_err(|source| SyncError::Transfer {
                row: layout.source_first_row(),
                source,
            })?;

        let elapsed = started.elapsed();
        tracing::info!(
            backend = self.backend.name(),
            rows = copy.rows,
            batches = copy.batches.len(),
            seconds = %format!("{:.1}", elapsed.as_secs_f64()),
            "import completed"
        );

        let trigger = self
            .scheduler
            .schedule_once(TriggerTarget::Normalize, self.config.normalize_delay())
            .map_err(SyncError::Schedule)?;

        Ok(ImportReport {
            cleared,
            copy,
            restore,
            restore_error,
            trigger,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Second stage. Pending normalization triggers are consumed before any
    /// sheet work, so a failing run never leaves one behind.
    pub async fn normalize_stage(&self) -> Result<NormalizeReport, SyncError> {
        let cancelled_triggers = self
            .scheduler
            .consume(TriggerTarget::Normalize)
            .map_err(SyncError::Schedule)?;

        let layout = &self.config.layout;
        let dest_id = &self.config.destination_id;

        if let Err(err) = self.backend.recalculate(dest_id).await {
            tracing::warn!(error = %format!("{err:#}"), "recalculation failed; freezing cached values");
        }

        let dest = self.open(dest_id).await?;
        let last_row = dest.last_row().await.map_err(SyncError::Normalize)?;
        tracing::info!(
            sheet = dest.name(),
            first_row = layout.data_start_row,
            last_row,
            "normalizing destination"
        );

        let dates_formatted = format_dates(
            dest.as_ref(),
            layout,
            last_row,
            &self.config.date_format,
        )
        .await
        .map_err(SyncError::Normalize)?;
        tracing::info!(dates_formatted, format = %self.config.date_format, "date column formatted");

        let frozen = freeze_formulas(dest.as_ref(), layout, last_row)
            .await
            .map_err(SyncError::Normalize)?;
        if let Some(region) = frozen {
            tracing::info!(region = %region, "formula columns frozen to values");
        }

        dest.flush().await.map_err(SyncError::Normalize)?;

        Ok(NormalizeReport {
            cancelled_triggers,
            last_row,
            dates_formatted,
            frozen,
        })
    }

    /// Entry point for the first stage: failures are logged, never propagated.
    pub async fn import(&self) -> Option<ImportReport> {
        match self.import_stage().await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(kind = err.kind(), error = %err, "import failed");
                None
            }
        }
    }

    /// Entry point for the second stage: failures are logged, never propagated.
    pub async fn normalize(&self) -> Option<NormalizeReport> {
        match self.normalize_stage().await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(kind = err.kind(), error = %err, "normalization failed");
                None
            }
        }
    }
}
