mod executor;
mod fallback;
mod fire_and_forget;
mod formualizer_backend;

pub use executor::{RecalcExecutor, RecalcResult};
pub use fallback::FallbackExecutor;
pub use fire_and_forget::FireAndForgetExecutor;
pub use formualizer_backend::FormualizerExecutor;

use crate::config::{RecalcBackendKind, SyncConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RecalcConfig {
    pub backend: RecalcBackendKind,
    pub soffice_path: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
}

impl RecalcConfig {
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        Self {
            backend: config.recalc_backend,
            soffice_path: Some(config.soffice_path.clone()),
            timeout_ms: config.recalc_timeout().map(|t| t.as_millis() as u64),
        }
    }
}

/// Executor for the configured backend; `None` when recalculation is off.
/// `Auto` evaluates in-process and falls back to LibreOffice when that fails.
pub fn create_executor(config: &RecalcConfig) -> Option<Arc<dyn RecalcExecutor>> {
    let formualizer = || -> Arc<dyn RecalcExecutor> {
        Arc::new(FormualizerExecutor::new(config.timeout_ms))
    };
    let libreoffice =
        || -> Arc<dyn RecalcExecutor> { Arc::new(FireAndForgetExecutor::new(config)) };

    match config.backend {
        RecalcBackendKind::Off => None,
        RecalcBackendKind::Formualizer => Some(formualizer()),
        RecalcBackendKind::Libreoffice => Some(libreoffice()),
        RecalcBackendKind::Auto => Some(Arc::new(FallbackExecutor::new(
            formualizer(),
            Some(libreoffice()),
        ))),
    }
}
