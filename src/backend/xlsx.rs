use super::{Sheet, SheetBackend, empty_grid, ensure_shape, is_date_format};
use crate::config::SyncConfig;
use crate::errors::BackendError;
use crate::model::{CellValue, ContainerId, Grid, SheetRegion, datetime_to_serial, serial_to_datetime};
use crate::recalc::{FormualizerExecutor, RecalcConfig, RecalcExecutor, create_executor};
use crate::security::{canonicalize_and_enforce_within_workspace, sanitize_filename_component};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use umya_spreadsheet::{Cell, Spreadsheet, Worksheet};

const DATE_WRITE_FORMAT: &str = "yyyy-mm-dd";

/// Workbook files under a workspace directory. A container id names a file
/// relative to the workspace root; `.xlsx` is appended when missing.
pub struct XlsxBackend {
    workspace_root: PathBuf,
    recalc: Option<Arc<dyn RecalcExecutor>>,
}

impl XlsxBackend {
    /// Backend that recalculates in-process before formulas are frozen.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            recalc: Some(Arc::new(FormualizerExecutor::new(None))),
        }
    }

    pub fn with_recalc(mut self, executor: Arc<dyn RecalcExecutor>) -> Self {
        self.recalc = Some(executor);
        self
    }

    /// Formulas are frozen from whatever results the file already caches.
    pub fn without_recalc(mut self) -> Self {
        self.recalc = None;
        self
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        let backend = Self::new(config.workspace_root.clone()).without_recalc();
        let Some(executor) = create_executor(&RecalcConfig::from_sync_config(config)) else {
            return backend;
        };
        if !executor.is_available() {
            tracing::warn!(
                soffice = %config.soffice_path.display(),
                "recalc requested but soffice not found; formulas are frozen from cached values"
            );
            return backend;
        }
        backend.with_recalc(executor)
    }

    pub fn resolve(&self, container: &ContainerId) -> Result<PathBuf> {
        let component = sanitize_filename_component(container.as_str().trim());
        let file_name = if component.to_ascii_lowercase().ends_with(".xlsx") {
            component
        } else {
            format!("{component}.xlsx")
        };
        canonicalize_and_enforce_within_workspace(
            &self.workspace_root,
            &self.workspace_root.join(file_name),
            container,
        )
    }
}

#[async_trait]
impl SheetBackend for XlsxBackend {
    async fn open_sheet(&self, container: &ContainerId, sheet_name: &str) -> Result<Arc<dyn Sheet>> {
        let path = self.resolve(container)?;
        if !path.is_file() {
            return Err(BackendError::ContainerNotFound(container.clone()).into());
        }

        let book = tokio::task::spawn_blocking({
            let path = path.clone();
            move || umya_spreadsheet::reader::xlsx::read(&path)
        })
        .await?
        .with_context(|| format!("failed to read workbook {}", path.display()))?;

        if book.get_sheet_by_name(sheet_name).is_none() {
            return Err(BackendError::SheetNotFound {
                container: container.clone(),
                sheet: sheet_name.to_string(),
            }
            .into());
        }

        Ok(Arc::new(XlsxSheet {
            path,
            sheet_name: sheet_name.to_string(),
            book: Mutex::new(book),
            dirty: AtomicBool::new(false),
        }))
    }

    async fn recalculate(&self, container: &ContainerId) -> Result<()> {
        let Some(executor) = self.recalc.as_ref() else {
            return Ok(());
        };
        let path = self.resolve(container)?;
        let result = executor.recalculate(&path).await?;
        tracing::info!(
            container = %container,
            duration_ms = result.duration_ms,
            executor = result.executor_type,
            "workbook recalculated"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "xlsx"
    }
}

/// One sheet of a workbook loaded into memory. Writes land in the loaded
/// workbook and reach disk on `flush`.
pub struct XlsxSheet {
    path: PathBuf,
    sheet_name: String,
    book: Mutex<Spreadsheet>,
    dirty: AtomicBool,
}

impl XlsxSheet {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_sheet<T>(&self, f: impl FnOnce(&Worksheet) -> T) -> Result<T> {
        let book = self.book.lock();
        let sheet = book
            .get_sheet_by_name(&self.sheet_name)
            .ok_or_else(|| anyhow!("sheet '{}' disappeared", self.sheet_name))?;
        Ok(f(sheet))
    }

    fn with_sheet_mut<T>(&self, f: impl FnOnce(&mut Worksheet) -> T) -> Result<T> {
        let mut book = self.book.lock();
        let sheet = book
            .get_sheet_by_name_mut(&self.sheet_name)
            .ok_or_else(|| anyhow!("sheet '{}' disappeared", self.sheet_name))?;
        let out = f(sheet);
        self.dirty.store(true, Ordering::Release);
        Ok(out)
    }
}

#[async_trait]
impl Sheet for XlsxSheet {
    fn name(&self) -> &str {
        &self.sheet_name
    }

    async fn last_row(&self) -> Result<u32> {
        self.with_sheet(last_populated_row)
    }

    async fn max_rows(&self) -> Result<u32> {
        self.with_sheet(|sheet| sheet.get_highest_row().max(last_populated_row(sheet)))
    }

    async fn read_values(&self, region: SheetRegion) -> Result<Grid> {
        self.with_sheet(|sheet| {
            let mut grid = empty_grid(region);
            for (r, row) in grid.iter_mut().enumerate() {
                for (c, value) in row.iter_mut().enumerate() {
                    let coord = (region.first_col + c as u32, region.first_row + r as u32);
                    if let Some(cell) = sheet.get_cell(coord) {
                        *value = read_cell(cell);
                    }
                }
            }
            grid
        })
    }

    async fn write_values(&self, region: SheetRegion, values: Grid) -> Result<()> {
        ensure_shape(region, &values)?;
        self.with_sheet_mut(|sheet| {
            for (r, row) in values.into_iter().enumerate() {
                for (c, value) in row.into_iter().enumerate() {
                    write_cell(
                        sheet,
                        region.first_col + c as u32,
                        region.first_row + r as u32,
                        value,
                    );
                }
            }
        })
    }

    async fn write_formulas(&self, region: SheetRegion, formulas: Vec<Vec<String>>) -> Result<()> {
        ensure_shape(region, &formulas)?;
        self.with_sheet_mut(|sheet| {
            for (r, row) in formulas.into_iter().enumerate() {
                for (c, text) in row.into_iter().enumerate() {
                    let coord = (region.first_col + c as u32, region.first_row + r as u32);
                    if text.is_empty() {
                        if sheet.get_cell(coord).is_some() {
                            sheet.get_cell_mut(coord).set_blank();
                        }
                    } else if let Some(body) = text.strip_prefix('=') {
                        sheet.get_cell_mut(coord).set_formula(body.to_string());
                    } else {
                        // xlsx has no formula form for plain text; it lands as a literal.
                        sheet.get_cell_mut(coord).set_value_string(text);
                    }
                }
            }
        })
    }

    async fn set_number_format(&self, region: SheetRegion, format: &str) -> Result<()> {
        if region.is_empty() {
            return Ok(());
        }
        self.with_sheet_mut(|sheet| {
            for row in region.first_row..=region.last_row() {
                for col in region.first_col..=region.last_col() {
                    sheet
                        .get_style_mut((col, row))
                        .get_number_format_mut()
                        .set_format_code(format);
                }
            }
        })
    }

    async fn clear_content(&self, region: SheetRegion) -> Result<()> {
        if region.is_empty() {
            return Ok(());
        }
        self.with_sheet_mut(|sheet| {
            let last_row = region.last_row().min(sheet.get_highest_row());
            for row in region.first_row..=last_row {
                for col in region.first_col..=region.last_col() {
                    if sheet.get_cell((col, row)).is_some() {
                        sheet.get_cell_mut((col, row)).set_blank();
                    }
                }
            }
        })
    }

    async fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let book = self.book.lock().clone();
        let path = self.path.clone();
        let written = tokio::task::spawn_blocking(move || write_atomically(&book, &path)).await?;
        if written.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        written
    }
}

fn write_atomically(book: &Spreadsheet, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("workbook path {} has no parent", path.display()))?;
    let tmp = tempfile::Builder::new()
        .prefix(".sheet-mirror-")
        .suffix(".xlsx")
        .tempfile_in(dir)?;
    umya_spreadsheet::writer::xlsx::write(book, tmp.path())
        .with_context(|| format!("failed to write workbook {}", path.display()))?;
    tmp.persist(path)?;
    Ok(())
}

fn cell_has_content(cell: &Cell) -> bool {
    cell.is_formula() || !cell.get_value().is_empty()
}

fn last_populated_row(sheet: &Worksheet) -> u32 {
    let highest_col = sheet.get_highest_column();
    (1..=sheet.get_highest_row())
        .rev()
        .find(|row| {
            (1..=highest_col).any(|col| sheet.get_cell((col, *row)).is_some_and(cell_has_content))
        })
        .unwrap_or(0)
}

fn cell_is_date_formatted(cell: &Cell) -> bool {
    cell.get_style()
        .get_number_format()
        .is_some_and(|fmt| is_date_format(fmt.get_format_code()))
}

/// Computed value of a cell; formula cells report their cached result.
fn read_cell(cell: &Cell) -> CellValue {
    let raw = cell.get_value();
    match cell.get_data_type() {
        "b" => return CellValue::Bool(raw == "1" || raw.eq_ignore_ascii_case("true")),
        "e" => return CellValue::Error(raw.to_string()),
        _ => {}
    }
    // Cached formula results may be stored as text.
    let number = cell
        .get_value_number()
        .or_else(|| cell.is_formula().then(|| raw.parse::<f64>().ok()).flatten());
    if let Some(number) = number {
        if cell_is_date_formatted(cell) {
            if let Some(date) = serial_to_datetime(number) {
                return CellValue::Date(date);
            }
        }
        return CellValue::Number(number);
    }
    if raw.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(raw.to_string())
    }
}

fn write_cell(sheet: &mut Worksheet, col: u32, row: u32, value: CellValue) {
    match value {
        CellValue::Empty => {
            if sheet.get_cell((col, row)).is_some() {
                sheet.get_cell_mut((col, row)).set_blank();
            }
        }
        CellValue::Text(text) | CellValue::Error(text) => {
            sheet.get_cell_mut((col, row)).set_value_string(text);
        }
        CellValue::Number(number) => {
            sheet.get_cell_mut((col, row)).set_value_number(number);
        }
        CellValue::Bool(flag) => {
            sheet.get_cell_mut((col, row)).set_value_bool(flag);
        }
        CellValue::Date(date) => {
            let keep_format = sheet.get_cell((col, row)).is_some_and(cell_is_date_formatted);
            sheet
                .get_cell_mut((col, row))
                .set_value_number(datetime_to_serial(date));
            if !keep_format {
                sheet
                    .get_style_mut((col, row))
                    .get_number_format_mut()
                    .set_format_code(DATE_WRITE_FORMAT);
            }
        }
        CellValue::Formula(text) => {
            let body = text.strip_prefix('=').unwrap_or(&text).to_string();
            sheet.get_cell_mut((col, row)).set_formula(body);
        }
    }
}
