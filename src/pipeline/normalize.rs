use crate::backend::Sheet;
use crate::config::SheetLayout;
use crate::model::SheetRegion;
use anyhow::Result;

/// Apply `format` to every date-valued cell of the date column. Consecutive
/// date rows share one format call. Returns the number of date cells.
pub async fn format_dates(
    sheet: &dyn Sheet,
    layout: &SheetLayout,
    last_row: u32,
    format: &str,
) -> Result<usize> {
    let region = layout.date_region(last_row);
    if region.is_empty() {
        return Ok(0);
    }

    let values = sheet.read_values(region).await?;
    let flags: Vec<bool> = values
        .iter()
        .map(|row| row.first().is_some_and(|v| v.is_date()))
        .collect();

    let mut formatted = 0;
    for (offset, rows) in date_runs(&flags) {
        let run = SheetRegion::new(region.first_row + offset, layout.date_column, rows, 1);
        sheet.set_number_format(run, format).await?;
        formatted += rows as usize;
    }
    Ok(formatted)
}

/// `(offset, len)` of each maximal run of `true`.
fn date_runs(flags: &[bool]) -> Vec<(u32, u32)> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, flag) in flags.iter().enumerate() {
        match (flag, start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                runs.push((s as u32, (idx - s) as u32));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s as u32, (flags.len() - s) as u32));
    }
    runs
}

/// Replace the live formulas of the formula region with their computed values.
pub async fn freeze_formulas(
    sheet: &dyn Sheet,
    layout: &SheetLayout,
    last_row: u32,
) -> Result<Option<SheetRegion>> {
    let region = layout.formula_region(last_row);
    if region.is_empty() {
        return Ok(None);
    }
    let values = sheet.read_values(region).await?;
    sheet.write_values(region, values).await?;
    Ok(Some(region))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_group_consecutive_dates() {
        let flags = [true, true, false, true, false, false, true];
        assert_eq!(date_runs(&flags), vec![(0, 2), (3, 1), (6, 1)]);
        assert!(date_runs(&[false, false]).is_empty());
        assert_eq!(date_runs(&[true; 4]), vec![(0, 4)]);
    }
}
