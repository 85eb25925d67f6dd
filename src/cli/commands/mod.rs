pub mod stage;
pub mod triggers;

use crate::backend::XlsxBackend;
use crate::config::{CliArgs, SyncConfig};
use crate::errors::SyncError;
use crate::pipeline::SyncPipeline;
use crate::scheduler::{FileTriggerStore, Scheduler, TriggerRunner};
use anyhow::Result;
use std::sync::Arc;

pub struct CommandContext {
    pub pipeline: Arc<SyncPipeline>,
}

impl CommandContext {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = SyncConfig::from_args(args)?;
        config.ensure_workspace_root()?;
        Ok(Self::from_config(Arc::new(config)))
    }

    pub fn from_config(config: Arc<SyncConfig>) -> Self {
        let backend = Arc::new(XlsxBackend::from_config(&config));
        let store = Arc::new(FileTriggerStore::new(config.trigger_store.clone()));
        let pipeline = SyncPipeline::new(config, backend, Scheduler::new(store));
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn runner(&self) -> TriggerRunner {
        TriggerRunner::new(self.pipeline.clone())
    }
}

/// Entry-point boundary: stage errors are logged here and reported, never raised further.
pub(crate) fn log_stage_error(stage: &str, err: &SyncError) {
    tracing::error!(stage, kind = err.kind(), error = %err, "stage failed");
}
