//! In-process backend. Formula cells are evaluated on every read through the
//! formualizer engine, which stands in for the recalculation a hosted
//! spreadsheet performs.

use super::{Sheet, SheetBackend, empty_grid, ensure_shape};
use crate::errors::BackendError;
use crate::formula::evaluate_sheet;
use crate::model::{CellValue, ContainerId, Grid, SheetRegion};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const DEFAULT_HEIGHT: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum SheetOp {
    Read(SheetRegion),
    WriteValues(SheetRegion),
    WriteFormulas(SheetRegion),
    NumberFormat(SheetRegion, String),
    Clear(SheetRegion),
    Flush,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailurePoint {
    /// Any read whose region covers this row.
    ReadAtRow(u32),
    WriteFormulas,
    NumberFormat,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryCell {
    pub content: CellValue,
    pub number_format: Option<String>,
}

#[derive(Debug, Default)]
struct SheetState {
    cells: BTreeMap<(u32, u32), MemoryCell>,
    height: u32,
}

impl SheetState {
    fn content(&self, row: u32, col: u32) -> CellValue {
        self.cells
            .get(&(row, col))
            .map(|c| c.content.clone())
            .unwrap_or_default()
    }

    fn last_row(&self) -> u32 {
        self.cells
            .iter()
            .rev()
            .find(|(_, cell)| !cell.content.is_empty())
            .map(|((row, _), _)| *row)
            .unwrap_or(0)
    }

    fn put(&mut self, row: u32, col: u32, content: CellValue) {
        if row > self.height {
            self.height = row;
        }
        let cell = self.cells.entry((row, col)).or_default();
        cell.content = content;
        if cell.content.is_empty() && cell.number_format.is_none() {
            self.cells.remove(&(row, col));
        }
    }

    fn has_formulas(&self) -> bool {
        self.cells
            .values()
            .any(|cell| matches!(cell.content, CellValue::Formula(_)))
    }

    /// Computed values of every formula cell, keyed by `(row, col)`.
    fn formula_values(&self, sheet_name: &str) -> Result<BTreeMap<(u32, u32), CellValue>> {
        if !self.has_formulas() {
            return Ok(BTreeMap::new());
        }
        evaluate_sheet(
            sheet_name,
            self.cells.iter().map(|(key, cell)| (*key, &cell.content)),
        )
    }
}

pub struct MemorySheet {
    name: String,
    state: RwLock<SheetState>,
    journal: Mutex<Vec<SheetOp>>,
    failures: Mutex<Vec<FailurePoint>>,
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_height(name, DEFAULT_HEIGHT)
    }

    pub fn with_height(name: impl Into<String>, height: u32) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(SheetState {
                cells: BTreeMap::new(),
                height,
            }),
            journal: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn set_cell(&self, row: u32, col: u32, content: CellValue) {
        self.state.write().put(row, col, content);
    }

    pub fn set_rows(&self, first_row: u32, first_col: u32, rows: Grid) {
        let mut state = self.state.write();
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                state.put(first_row + r as u32, first_col + c as u32, value);
            }
        }
    }

    /// Raw content, including formula text.
    pub fn content(&self, row: u32, col: u32) -> CellValue {
        self.state.read().content(row, col)
    }

    pub fn value(&self, row: u32, col: u32) -> CellValue {
        let state = self.state.read();
        match state.content(row, col) {
            CellValue::Formula(_) => state
                .formula_values(&self.name)
                .ok()
                .and_then(|mut values| values.remove(&(row, col)))
                .unwrap_or_else(|| CellValue::Error("#VALUE!".to_string())),
            other => other,
        }
    }

    pub fn number_format(&self, row: u32, col: u32) -> Option<String> {
        self.state
            .read()
            .cells
            .get(&(row, col))
            .and_then(|c| c.number_format.clone())
    }

    pub fn ops(&self) -> Vec<SheetOp> {
        self.journal.lock().clone()
    }

    pub fn clear_ops(&self) {
        self.journal.lock().clear();
    }

    pub fn fail_on(&self, failure: FailurePoint) {
        self.failures.lock().push(failure);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    fn record(&self, op: SheetOp) {
        self.journal.lock().push(op);
    }

    fn check_failure(&self, matches: impl Fn(&FailurePoint) -> bool, what: &str) -> Result<()> {
        if self.failures.lock().iter().any(matches) {
            return Err(BackendError::Injected(format!("{} on '{}'", what, self.name)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Sheet for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn last_row(&self) -> Result<u32> {
        Ok(self.state.read().last_row())
    }

    async fn max_rows(&self) -> Result<u32> {
        let state = self.state.read();
        Ok(state.height.max(state.last_row()))
    }

    async fn read_values(&self, region: SheetRegion) -> Result<Grid> {
        self.check_failure(
            |f| matches!(f, FailurePoint::ReadAtRow(row) if region.contains(*row, region.first_col)),
            &format!("read {}", region),
        )?;
        self.record(SheetOp::Read(region));
        let state = self.state.read();
        let mut computed = state.formula_values(&self.name)?;
        let mut grid = empty_grid(region);
        for (r, row) in grid.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                let key = (region.first_row + r as u32, region.first_col + c as u32);
                *cell = match state.content(key.0, key.1) {
                    CellValue::Formula(_) => computed.remove(&key).unwrap_or_default(),
                    other => other,
                };
            }
        }
        Ok(grid)
    }

    async fn write_values(&self, region: SheetRegion, values: Grid) -> Result<()> {
        ensure_shape(region, &values)?;
        self.record(SheetOp::WriteValues(region));
        self.set_rows(region.first_row, region.first_col, values);
        Ok(())
    }

    async fn write_formulas(&self, region: SheetRegion, formulas: Vec<Vec<String>>) -> Result<()> {
        ensure_shape(region, &formulas)?;
        self.check_failure(
            |f| matches!(f, FailurePoint::WriteFormulas),
            &format!("write formulas {}", region),
        )?;
        self.record(SheetOp::WriteFormulas(region));
        let mut state = self.state.write();
        for (r, row) in formulas.into_iter().enumerate() {
            for (c, text) in row.into_iter().enumerate() {
                let content = if text.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Formula(text)
                };
                state.put(region.first_row + r as u32, region.first_col + c as u32, content);
            }
        }
        Ok(())
    }

    async fn set_number_format(&self, region: SheetRegion, format: &str) -> Result<()> {
        self.check_failure(
            |f| matches!(f, FailurePoint::NumberFormat),
            &format!("number format {}", region),
        )?;
        self.record(SheetOp::NumberFormat(region, format.to_string()));
        if region.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();
        for row in region.first_row..=region.last_row() {
            for col in region.first_col..=region.last_col() {
                state.cells.entry((row, col)).or_default().number_format =
                    Some(format.to_string());
            }
        }
        Ok(())
    }

    async fn clear_content(&self, region: SheetRegion) -> Result<()> {
        self.record(SheetOp::Clear(region));
        if region.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();
        let keys: Vec<(u32, u32)> = state
            .cells
            .range((region.first_row, 0)..=(region.last_row(), u32::MAX))
            .filter(|((_, col), _)| *col >= region.first_col && *col <= region.last_col())
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            if let Some(cell) = state.cells.get_mut(&key) {
                cell.content = CellValue::Empty;
                if cell.number_format.is_none() {
                    state.cells.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.record(SheetOp::Flush);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    containers: RwLock<HashMap<ContainerId, HashMap<String, Arc<MemorySheet>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a sheet and hand back a handle for seeding and inspection.
    pub fn add_sheet(&self, container: &ContainerId, sheet: MemorySheet) -> Arc<MemorySheet> {
        let sheet = Arc::new(sheet);
        self.containers
            .write()
            .entry(container.clone())
            .or_default()
            .insert(sheet.name.clone(), sheet.clone());
        sheet
    }

    pub fn sheet(&self, container: &ContainerId, name: &str) -> Option<Arc<MemorySheet>> {
        self.containers
            .read()
            .get(container)
            .and_then(|sheets| sheets.get(name).cloned())
    }
}

#[async_trait]
impl SheetBackend for MemoryBackend {
    async fn open_sheet(&self, container: &ContainerId, sheet_name: &str) -> Result<Arc<dyn Sheet>> {
        let containers = self.containers.read();
        let sheets = containers
            .get(container)
            .ok_or_else(|| BackendError::ContainerNotFound(container.clone()))?;
        let sheet = sheets
            .get(sheet_name)
            .ok_or_else(|| BackendError::SheetNotFound {
                container: container.clone(),
                sheet: sheet_name.to_string(),
            })?;
        Ok(sheet.clone() as Arc<dyn Sheet>)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
