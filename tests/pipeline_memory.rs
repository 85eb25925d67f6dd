use anyhow::Result;
use assert_matches::assert_matches;
use sheet_mirror::backend::{FailurePoint, SheetOp};
use sheet_mirror::model::{CellValue, SheetRegion};
use sheet_mirror::{SyncError, TriggerTarget};

mod support;

use support::builders::date;
use support::{MemoryFixture, memory_fixture, small_config};

fn num(n: f64) -> CellValue {
    CellValue::Number(n)
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

/// Header in row 1, then `rows` data rows from row 2: A = index, B = date or
/// label, C = label.
fn seed_source(fixture: &MemoryFixture, rows: u32) {
    fixture
        .source
        .set_rows(1, 1, vec![vec![text("id"), text("when"), text("name")]]);
    let data = (0..rows)
        .map(|i| {
            let when = if i % 2 == 0 {
                CellValue::Date(date(2024, 1, 1 + i))
            } else {
                text("pending")
            };
            vec![num(f64::from(i + 1)), when, text(&format!("row {}", i + 1))]
        })
        .collect();
    fixture.source.set_rows(2, 1, data);
}

fn seed_template(fixture: &MemoryFixture) {
    fixture.dest.set_cell(2, 4, text("'=A3*2"));
    fixture.dest.set_cell(2, 5, CellValue::Empty);
}

fn snapshot(fixture: &MemoryFixture, rows: u32) -> Vec<(CellValue, Option<String>)> {
    let mut cells = Vec::new();
    for row in 1..=rows {
        for col in 1..=5 {
            cells.push((fixture.dest.content(row, col), fixture.dest.number_format(row, col)));
        }
    }
    cells
}

#[tokio::test(flavor = "current_thread")]
async fn import_copies_each_source_row_one_row_down() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 5);
    fixture.dest.set_cell(1, 1, text("dest header"));

    let report = fixture.pipeline.import_stage().await?;

    assert_eq!(report.copy.rows, 5);
    assert_eq!(report.copy.batches, vec![2, 2, 1]);
    for row in 2..=6 {
        for col in 1..=3 {
            assert_eq!(
                fixture.dest.content(row + 1, col),
                fixture.source.content(row, col),
                "source row {row} col {col}"
            );
        }
    }
    assert_eq!(fixture.dest.content(1, 1), text("dest header"));
    assert_eq!(fixture.dest.content(2, 1), CellValue::Empty);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn large_source_is_copied_in_ceiling_batches() -> Result<()> {
    let mut config = small_config();
    config.layout.chunk_size = 3000;
    let fixture = memory_fixture(config);
    let data = (0..5001u32)
        .map(|i| vec![num(f64::from(i)), text("x"), text("y")])
        .collect();
    fixture.source.set_rows(2, 1, data);

    let report = fixture.pipeline.import_stage().await?;

    assert_eq!(report.copy.rows, 5001);
    assert_eq!(report.copy.batches, vec![3000, 2001]);
    let reads: Vec<SheetRegion> = fixture
        .source
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            SheetOp::Read(region) => Some(region),
            _ => None,
        })
        .collect();
    assert_eq!(
        reads,
        vec![SheetRegion::new(2, 1, 3000, 3), SheetRegion::new(3002, 1, 2001, 3)]
    );
    assert_eq!(fixture.dest.content(5003, 1), num(5000.0));
    assert_eq!(fixture.dest.content(5004, 1), CellValue::Empty);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn shorter_dataset_leaves_no_stale_rows() -> Result<()> {
    let fixture = memory_fixture(small_config());
    for row in 3..=20 {
        for col in 1..=5 {
            fixture.dest.set_cell(row, col, text("stale"));
        }
    }
    seed_source(&fixture, 3);

    fixture.pipeline.import_stage().await?;

    assert_eq!(fixture.dest.content(5, 1), num(3.0));
    for row in 6..=20 {
        for col in 1..=5 {
            assert_eq!(fixture.dest.content(row, col), CellValue::Empty, "row {row} col {col}");
        }
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn template_formulas_are_restored_on_first_data_row() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 4);
    seed_template(&fixture);

    let report = fixture.pipeline.import_stage().await?;

    let restore = report.restore.expect("restore report");
    assert_eq!(restore.region, SheetRegion::new(3, 4, 1, 2));
    assert_eq!(restore.formulas, 1);
    assert_eq!(fixture.dest.content(3, 4), CellValue::Formula("=A3*2".into()));
    assert_eq!(fixture.dest.content(3, 5), CellValue::Empty);
    assert_eq!(fixture.dest.value(3, 4), num(2.0));
    // The template row itself keeps its escaped text.
    assert_eq!(fixture.dest.content(2, 4), text("'=A3*2"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn normalize_formats_dates_only() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 5);
    fixture.pipeline.import_stage().await?;

    let report = fixture.pipeline.normalize_stage().await?;

    assert_eq!(report.last_row, 7);
    assert_eq!(report.dates_formatted, 3);
    for row in 3..=7 {
        let expected = fixture.dest.content(row, 2).is_date().then(|| "m/d".to_string());
        assert_eq!(fixture.dest.number_format(row, 2), expected, "row {row}");
    }
    assert_eq!(fixture.dest.number_format(3, 1), None);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn templates_using_functions_freeze_to_computed_values() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 3);
    fixture.dest.set_cell(2, 4, text("'=IF(A3>1,A3*10,0)"));
    fixture.dest.set_cell(2, 5, text("'=SUM(A3:A5)"));

    fixture.pipeline.import_stage().await?;
    assert_eq!(fixture.dest.value(3, 4), num(0.0));
    assert_eq!(fixture.dest.value(3, 5), num(6.0));

    fixture.pipeline.normalize_stage().await?;
    assert_eq!(fixture.dest.content(3, 4), num(0.0));
    assert_eq!(fixture.dest.content(3, 5), num(6.0));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn frozen_formulas_do_not_follow_later_changes() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 2);
    seed_template(&fixture);
    fixture.pipeline.import_stage().await?;
    assert_eq!(fixture.dest.value(3, 4), num(2.0));

    let report = fixture.pipeline.normalize_stage().await?;
    assert_eq!(report.frozen, Some(SheetRegion::new(3, 4, 2, 2)));

    assert_eq!(fixture.dest.content(3, 4), num(2.0));
    fixture.dest.set_cell(3, 1, num(50.0));
    assert_eq!(fixture.dest.value(3, 4), num(2.0));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn repeated_imports_leave_exactly_one_trigger() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 2);

    let first = fixture.pipeline.import_stage().await?;
    let second = fixture.pipeline.import_stage().await?;

    let pending = fixture.pipeline.scheduler().pending_for(TriggerTarget::Normalize)?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.trigger.id);
    assert_ne!(first.trigger.id, second.trigger.id);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn transfer_failure_skips_restore_and_scheduling() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 5);
    seed_template(&fixture);
    fixture.source.fail_on(FailurePoint::ReadAtRow(4));

    let err = fixture.pipeline.import_stage().await.unwrap_err();

    assert_matches!(err, SyncError::Transfer { row: 4, .. });
    // The first batch stays written.
    assert_eq!(fixture.dest.content(3, 1), num(1.0));
    assert_eq!(fixture.dest.content(4, 1), num(2.0));
    assert_eq!(fixture.dest.content(5, 1), CellValue::Empty);
    assert!(
        !fixture
            .dest
            .ops()
            .iter()
            .any(|op| matches!(op, SheetOp::WriteFormulas(_)))
    );
    assert!(fixture.pipeline.scheduler().pending()?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn restore_failure_still_schedules_normalization() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 3);
    seed_template(&fixture);
    fixture.dest.fail_on(FailurePoint::WriteFormulas);

    let report = fixture.pipeline.import_stage().await?;

    assert!(report.restore.is_none());
    assert!(report.restore_error.is_some());
    assert_eq!(report.copy.rows, 3);
    assert_eq!(
        fixture.pipeline.scheduler().pending_for(TriggerTarget::Normalize)?.len(),
        1
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn failed_normalization_still_consumes_its_trigger() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 3);
    fixture.pipeline.import_stage().await?;
    fixture.dest.fail_on(FailurePoint::NumberFormat);

    let err = fixture.pipeline.normalize_stage().await.unwrap_err();

    assert_matches!(err, SyncError::Normalize(_));
    assert!(fixture.pipeline.scheduler().pending()?.is_empty());
    assert!(fixture.pipeline.normalize().await.is_none());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn full_cycle_is_idempotent() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 5);
    seed_template(&fixture);

    fixture.pipeline.import_stage().await?;
    fixture.pipeline.normalize_stage().await?;
    let first = snapshot(&fixture, 10);

    fixture.pipeline.import_stage().await?;
    fixture.pipeline.normalize_stage().await?;
    let second = snapshot(&fixture, 10);

    assert_eq!(first, second);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn empty_source_copies_nothing_but_still_schedules() -> Result<()> {
    let fixture = memory_fixture(small_config());
    seed_source(&fixture, 0);
    fixture.dest.set_cell(9, 1, text("stale"));

    let report = fixture.pipeline.import_stage().await?;

    assert_eq!(report.copy.rows, 0);
    assert!(report.copy.batches.is_empty());
    assert_eq!(fixture.dest.content(9, 1), CellValue::Empty);
    assert_eq!(fixture.pipeline.scheduler().pending()?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn missing_containers_and_sheets_are_setup_errors() -> Result<()> {
    let mut config = small_config();
    config.source_id = sheet_mirror::ContainerId::new("missing");
    let fixture = memory_fixture(config);
    let err = fixture.pipeline.import_stage().await.unwrap_err();
    assert_matches!(err, SyncError::Setup(_));
    assert!(fixture.pipeline.import().await.is_none());

    let mut config = small_config();
    config.sheet_name = "Other".to_string();
    let fixture = memory_fixture(config);
    let err = fixture.pipeline.import_stage().await.unwrap_err();
    assert_matches!(err, SyncError::Setup(_));
    assert!(err.to_string().contains("Other"));
    assert!(fixture.pipeline.scheduler().pending()?.is_empty());
    Ok(())
}
