use crate::model::{ContainerId, SheetRegion};
use thiserror::Error;

/// Failures raised by backend adapters. Backends return `anyhow::Result`, so
/// callers find these by downcasting the root cause.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("container '{0}' not found")]
    ContainerNotFound(ContainerId),
    #[error("sheet '{sheet}' not found in container '{container}'")]
    SheetNotFound {
        container: ContainerId,
        sheet: String,
    },
    #[error("container '{container}' resolves outside the workspace ({path})")]
    OutsideWorkspace { container: ContainerId, path: String },
    #[error(
        "data for {region} has shape {actual_rows}x{actual_cols}, expected {expected_rows}x{expected_cols}"
    )]
    RegionShape {
        region: SheetRegion,
        expected_rows: u32,
        expected_cols: u32,
        actual_rows: usize,
        actual_cols: usize,
    },
    #[error("injected failure: {0}")]
    Injected(String),
}

/// One variant per stage failure class. No variant crosses an entry point.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("setup failed: {0:#}")]
    Setup(#[source] anyhow::Error),
    #[error("transfer failed at source row {row}: {source:#}")]
    Transfer {
        row: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("formula restore failed: {0:#}")]
    Restore(#[source] anyhow::Error),
    #[error("normalization failed: {0:#}")]
    Normalize(#[source] anyhow::Error),
    #[error("scheduling failed: {0:#}")]
    Schedule(#[source] anyhow::Error),
}

impl SyncError {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Setup(_) => "setup",
            SyncError::Transfer { .. } => "transfer",
            SyncError::Restore(_) => "restore",
            SyncError::Normalize(_) => "normalize",
            SyncError::Schedule(_) => "schedule",
        }
    }
}
