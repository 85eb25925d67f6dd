use crate::backend::Sheet;
use crate::config::SheetLayout;
use crate::errors::SyncError;
use crate::model::SheetRegion;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub rows: u32,
    /// Rows moved by each read/write pair, in order.
    pub batches: Vec<u32>,
}

/// `(first_row, rows)` for each batch covering `first_row..=last_row`.
pub fn plan_batches(first_row: u32, last_row: u32, chunk_size: u32) -> Vec<(u32, u32)> {
    let chunk_size = chunk_size.max(1);
    let mut batches = Vec::new();
    let mut cursor = first_row;
    while cursor <= last_row {
        let rows = chunk_size.min(last_row - cursor + 1);
        batches.push((cursor, rows));
        cursor += rows;
    }
    batches
}

/// Clear content from the data start row to the bottom of the sheet across
/// the value and formula regions, so no stale rows outlive a shorter dataset.
pub async fn clear_destination(
    dest: &dyn Sheet,
    layout: &SheetLayout,
) -> Result<Option<SheetRegion>, SyncError> {
    let transfer_error = |source| SyncError::Transfer {
        row: layout.source_first_row(),
        source,
    };
    let max_rows = dest.max_rows().await.map_err(transfer_error)?;
    let region = layout.clear_region(max_rows);
    if region.is_empty() {
        return Ok(None);
    }
    dest.clear_content(region).await.map_err(transfer_error)?;
    tracing::info!(sheet = dest.name(), region = %region, "cleared stale destination rows");
    Ok(Some(region))
}

/// Copy the value columns of every source data row into the destination one
/// row lower, `chunk_size` rows per read/write pair. The first failure aborts
/// the copy; batches already written stay written.
pub async fn copy_chunks(
    source: &dyn Sheet,
    dest: &dyn Sheet,
    layout: &SheetLayout,
    source_last_row: u32,
) -> Result<CopyReport, SyncError> {
    let mut report = CopyReport {
        rows: 0,
        batches: Vec::new(),
    };

    let batches = plan_batches(layout.source_first_row(), source_last_row, layout.chunk_size);
    for (index, (cursor, rows)) in batches.into_iter().enumerate() {
        let read = SheetRegion::new(cursor, 1, rows, layout.value_columns);
        let write = SheetRegion::new(cursor + 1, 1, rows, layout.value_columns);

        let data = source
            .read_values(read)
            .await
            .map_err(|source| SyncError::Transfer { row: cursor, source })?;
        dest.write_values(write, data)
            .await
            .map_err(|source| SyncError::Transfer { row: cursor, source })?;

        report.rows += rows;
        report.batches.push(rows);
        tracing::debug!(batch = index + 1, rows, cursor, from = %read, to = %write, "copied batch");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cover_every_row_once() {
        assert_eq!(plan_batches(2, 5002, 3000), vec![(2, 3000), (3002, 2001)]);
        assert_eq!(plan_batches(2, 6001, 3000), vec![(2, 3000), (3002, 3000)]);
        assert_eq!(plan_batches(2, 2, 3000), vec![(2, 1)]);
        assert!(plan_batches(2, 1, 3000).is_empty());
        assert!(plan_batches(2, 0, 3000).is_empty());
    }

    #[test]
    fn batch_count_is_ceiling_of_rows_over_chunk() {
        for rows in 0u32..40 {
            for chunk in 1u32..9 {
                let batches = plan_batches(2, 1 + rows, chunk);
                assert_eq!(batches.len() as u32, rows.div_ceil(chunk));
                assert_eq!(batches.iter().map(|(_, n)| n).sum::<u32>(), rows);
                if let Some((_, last)) = batches.last() {
                    let expected = if rows % chunk == 0 { chunk } else { rows % chunk };
                    assert_eq!(*last, expected);
                }
            }
        }
    }
}
