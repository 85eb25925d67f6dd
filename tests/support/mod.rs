#![allow(dead_code)]

pub mod builders;

use sheet_mirror::backend::{MemoryBackend, MemorySheet};
use sheet_mirror::{ContainerId, Scheduler, SyncConfig, SyncPipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use umya_spreadsheet::Spreadsheet;

pub const SHEET: &str = "Sheet1";
pub const SOURCE: &str = "source";
pub const DEST: &str = "dest";

pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    pub fn create_workbook<F>(&self, name: &str, f: F) -> PathBuf
    where
        F: FnOnce(&mut Spreadsheet),
    {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        let mut book = umya_spreadsheet::new_file();
        f(&mut book);
        umya_spreadsheet::writer::xlsx::write(&book, &path).expect("write workbook");
        path
    }

    pub fn open_workbook(&self, name: &str) -> Spreadsheet {
        umya_spreadsheet::reader::xlsx::read(self.path(name)).expect("read workbook")
    }

    pub fn config(&self) -> SyncConfig {
        SyncConfig::new(self.root(), SOURCE, DEST, SHEET)
    }

    pub fn config_with<F>(&self, f: F) -> SyncConfig
    where
        F: FnOnce(&mut SyncConfig),
    {
        let mut config = self.config();
        f(&mut config);
        config
    }
}

/// In-memory source and destination sharing `config`'s sheet name.
pub struct MemoryFixture {
    pub backend: Arc<MemoryBackend>,
    pub source: Arc<MemorySheet>,
    pub dest: Arc<MemorySheet>,
    pub pipeline: Arc<SyncPipeline>,
}

pub fn memory_fixture(config: SyncConfig) -> MemoryFixture {
    memory_fixture_with(config, Scheduler::in_memory())
}

pub fn memory_fixture_with(config: SyncConfig, scheduler: Scheduler) -> MemoryFixture {
    let backend = Arc::new(MemoryBackend::new());
    let source = backend.add_sheet(&ContainerId::new(SOURCE), MemorySheet::new(SHEET));
    let dest = backend.add_sheet(&ContainerId::new(DEST), MemorySheet::new(SHEET));
    let pipeline = Arc::new(SyncPipeline::new(
        Arc::new(config),
        backend.clone(),
        scheduler,
    ));
    MemoryFixture {
        backend,
        source,
        dest,
        pipeline,
    }
}

/// Small layout used by most pipeline tests: values in A:C, formulas in D:E,
/// dates in B, data from row 3.
pub fn small_config() -> SyncConfig {
    let mut config = SyncConfig::new(".", SOURCE, DEST, SHEET);
    config.layout.value_columns = 3;
    config.layout.formula_start_col = 4;
    config.layout.formula_end_col = 5;
    config.layout.date_column = 2;
    config.layout.chunk_size = 2;
    config.normalize_delay_ms = 0;
    config
}
