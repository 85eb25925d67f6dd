use super::executor::{RecalcExecutor, RecalcResult};
use crate::model::cell_address;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use formualizer::eval::engine::ingest::EngineLoadStream;
use formualizer::eval::engine::{Engine, EvalConfig};
use formualizer::workbook::workbook::WBResolver;
use formualizer::workbook::{LiteralValue, SpreadsheetReader, SpreadsheetWriter, UmyaAdapter};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Evaluates the workbook in-process and writes every formula's result back
/// as its cached value.
pub struct FormualizerExecutor {
    timeout_ms: Option<u64>,
}

impl FormualizerExecutor {
    pub fn new(timeout_ms: Option<u64>) -> Self {
        Self { timeout_ms }
    }
}

#[async_trait]
impl RecalcExecutor for FormualizerExecutor {
    async fn recalculate(&self, workbook_path: &Path) -> Result<RecalcResult> {
        let path = workbook_path.to_path_buf();
        let timeout_ms = self.timeout_ms;
        tokio::task::spawn_blocking(move || recalc_sync(&path, timeout_ms)).await?
    }

    fn is_available(&self) -> bool {
        true
    }
}

type WorkbookEngine = Engine<WBResolver>;

fn recalc_sync(path: &Path, timeout_ms: Option<u64>) -> Result<RecalcResult> {
    let start = Instant::now();

    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read workbook {}", path.display()))?;
    let mut adapter = UmyaAdapter::open_bytes(bytes)
        .or_else(|_| UmyaAdapter::open_path(path))
        .map_err(|e| anyhow!("failed to open workbook adapter {}: {e}", path.display()))?;

    let formula_cells = adapter.formula_cells();

    let mut engine = WorkbookEngine::new(WBResolver::default(), EvalConfig::default());
    adapter
        .stream_into_engine(&mut engine)
        .map_err(|e| anyhow!("failed to load workbook into formualizer engine: {e}"))?;

    let (evaluated, cycles) = evaluate_with_optional_timeout(&mut engine, timeout_ms)
        .map_err(|e| anyhow!("formualizer evaluate_all failed: {e}"))?;
    if cycles > 0 {
        tracing::warn!(cycles, path = %path.display(), "circular references left unresolved");
    }

    let date_system = engine.config.date_system;
    for (sheet_name, row, col) in formula_cells {
        let value = engine
            .get_cell_value(&sheet_name, row, col)
            .unwrap_or(LiteralValue::Empty);
        adapter
            .set_formula_cached_value(&sheet_name, row, col, &value, date_system)
            .map_err(|e| {
                anyhow!(
                    "failed to write cached result for {}!{}: {e}",
                    sheet_name,
                    cell_address(col, row)
                )
            })?;
    }

    save_atomically(&mut adapter, path)?;

    tracing::debug!(evaluated, path = %path.display(), "formualizer recalculation finished");
    Ok(RecalcResult {
        duration_ms: start.elapsed().as_millis() as u64,
        executor_type: "formualizer",
    })
}

fn save_atomically(adapter: &mut UmyaAdapter, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("workbook path {} has no parent", path.display()))?;
    let tmp = tempfile::Builder::new()
        .prefix(".sheet-mirror-recalc-")
        .suffix(".xlsx")
        .tempfile_in(dir)?;
    adapter
        .save_as_path(tmp.path())
        .map_err(|e| anyhow!("failed to save recalculated workbook {}: {e}", path.display()))?;
    tmp.persist(path)?;
    Ok(())
}

fn evaluate_with_optional_timeout(
    engine: &mut WorkbookEngine,
    timeout_ms: Option<u64>,
) -> Result<(u64, u64)> {
    let Some(timeout_ms) = timeout_ms else {
        let eval = engine.evaluate_all()?;
        return Ok((eval.computed_vertices as u64, eval.cycle_errors as u64));
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let watchdog = {
        let cancel = cancel.clone();
        let done = done.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_millis(timeout_ms);
            while !done.load(Ordering::Relaxed) {
                if Instant::now() >= deadline {
                    cancel.store(true, Ordering::Relaxed);
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let result = engine.evaluate_all_cancellable(cancel);
    done.store(true, Ordering::Relaxed);
    let _ = watchdog.join();

    let eval = result?;
    Ok((eval.computed_vertices as u64, eval.cycle_errors as u64))
}
