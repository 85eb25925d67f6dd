use super::executor::{RecalcExecutor, RecalcResult};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Runs `primary`; when it fails and `fallback` is usable, retries with it.
pub struct FallbackExecutor {
    primary: Arc<dyn RecalcExecutor>,
    fallback: Option<Arc<dyn RecalcExecutor>>,
}

impl FallbackExecutor {
    pub fn new(primary: Arc<dyn RecalcExecutor>, fallback: Option<Arc<dyn RecalcExecutor>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl RecalcExecutor for FallbackExecutor {
    async fn recalculate(&self, workbook_path: &Path) -> Result<RecalcResult> {
        let err = match self.primary.recalculate(workbook_path).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };
        let Some(fallback) = self.fallback.as_ref().filter(|f| f.is_available()) else {
            return Err(err);
        };
        tracing::warn!(
            error = %format!("{err:#}"),
            path = %workbook_path.display(),
            "in-process recalculation failed; retrying with fallback"
        );
        fallback.recalculate(workbook_path).await
    }

    fn is_available(&self) -> bool {
        self.primary.is_available() || self.fallback.as_ref().is_some_and(|f| f.is_available())
    }
}
