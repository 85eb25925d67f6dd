use crate::errors::BackendError;
use crate::model::{CellValue, ContainerId, Grid, SheetRegion};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;
pub mod xlsx;

pub use memory::{FailurePoint, MemoryBackend, MemorySheet, SheetOp};
pub use xlsx::XlsxBackend;

/// A single sheet inside an opened container, addressed by rectangular regions.
#[async_trait]
pub trait Sheet: Send + Sync {
    fn name(&self) -> &str;

    /// Last row holding any content; 0 for an empty sheet.
    async fn last_row(&self) -> Result<u32>;

    /// Full sheet height, at least `last_row`.
    async fn max_rows(&self) -> Result<u32>;

    /// Computed values. Formula cells yield their last computed result.
    async fn read_values(&self, region: SheetRegion) -> Result<Grid>;

    async fn write_values(&self, region: SheetRegion, values: Grid) -> Result<()>;

    /// Each non-empty string becomes a live formula assignment; empty strings clear the cell.
    async fn write_formulas(&self, region: SheetRegion, formulas: Vec<Vec<String>>) -> Result<()>;

    async fn set_number_format(&self, region: SheetRegion, format: &str) -> Result<()>;

    /// Clears content only; number formats survive.
    async fn clear_content(&self, region: SheetRegion) -> Result<()>;

    /// Commit buffered writes. Live backends have nothing to do.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait SheetBackend: Send + Sync {
    async fn open_sheet(&self, container: &ContainerId, sheet_name: &str) -> Result<Arc<dyn Sheet>>;

    /// Bring computed values up to date before they are read back.
    async fn recalculate(&self, _container: &ContainerId) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

pub(crate) fn ensure_shape<T>(region: SheetRegion, rows: &[Vec<T>]) -> Result<()> {
    let actual_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let uniform = rows.iter().all(|r| r.len() == region.cols as usize);
    if rows.len() != region.rows as usize || !uniform {
        return Err(BackendError::RegionShape {
            region,
            expected_rows: region.rows,
            expected_cols: region.cols,
            actual_rows: rows.len(),
            actual_cols,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn empty_grid(region: SheetRegion) -> Grid {
    vec![vec![CellValue::Empty; region.cols as usize]; region.rows as usize]
}

/// Date/time detection for a number format code. Quoted literals and
/// bracketed sections (colors, elapsed markers) are ignored.
pub fn is_date_format(format_code: &str) -> bool {
    let lower = format_code.to_lowercase();
    if lower == "general" || lower == "@" {
        return false;
    }

    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut cleaned = String::new();
    for c in lower.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            _ if !in_quotes && !in_brackets => cleaned.push(c),
            _ => {}
        }
    }

    cleaned.contains('y')
        || (cleaned.contains('m') && !cleaned.contains('#') && !cleaned.contains('0'))
        || cleaned.contains('d')
        || cleaned.contains('h')
        || (cleaned.contains('s') && cleaned.contains(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_format_detection() {
        assert!(is_date_format("m/d"));
        assert!(is_date_format("yyyy-mm-dd"));
        assert!(is_date_format("[$-409]mmm d, yyyy"));
        assert!(is_date_format("h:mm:ss"));
        assert!(!is_date_format("General"));
        assert!(!is_date_format("#,##0.00"));
        assert!(!is_date_format("0.00%"));
        assert!(!is_date_format("\"Qty\" 0"));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let region = SheetRegion::new(1, 1, 2, 2);
        let rows = vec![vec![1, 2], vec![3]];
        let err = ensure_shape(region, &rows).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::RegionShape { .. })
        ));
    }
}
