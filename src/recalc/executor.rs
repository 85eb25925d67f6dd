use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Recomputes every formula in a workbook file and saves the cached results in place.
#[async_trait]
pub trait RecalcExecutor: Send + Sync {
    async fn recalculate(&self, workbook_path: &Path) -> Result<RecalcResult>;
    fn is_available(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RecalcResult {
    pub duration_ms: u64,
    pub executor_type: &'static str,
}
