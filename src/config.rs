use crate::model::{ContainerId, SheetRegion};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_VALUE_COLUMNS: u32 = 35;
const DEFAULT_FORMULA_START_COL: u32 = 36;
const DEFAULT_FORMULA_END_COL: u32 = 46;
const DEFAULT_DATA_START_ROW: u32 = 3;
const DEFAULT_CHUNK_SIZE: u32 = 3000;
const DEFAULT_DATE_COLUMN: u32 = 11;
const DEFAULT_DATE_FORMAT: &str = "m/d";
const DEFAULT_NORMALIZE_DELAY_MS: u64 = 10_000;
const DEFAULT_SOFFICE_PATH: &str = "/usr/bin/soffice";
const DEFAULT_RECALC_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_TRIGGER_STORE: &str = ".sheet-mirror/triggers.json";

/// Fixed column/row layout shared by source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    pub value_columns: u32,
    pub formula_start_col: u32,
    pub formula_end_col: u32,
    pub data_start_row: u32,
    pub chunk_size: u32,
    pub date_column: u32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            value_columns: DEFAULT_VALUE_COLUMNS,
            formula_start_col: DEFAULT_FORMULA_START_COL,
            formula_end_col: DEFAULT_FORMULA_END_COL,
            data_start_row: DEFAULT_DATA_START_ROW,
            chunk_size: DEFAULT_CHUNK_SIZE,
            date_column: DEFAULT_DATE_COLUMN,
        }
    }
}

impl SheetLayout {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.value_columns > 0, "value_columns must be at least 1");
        anyhow::ensure!(
            self.formula_start_col == self.value_columns + 1,
            "formula_start_col ({}) must immediately follow the value columns ({})",
            self.formula_start_col,
            self.value_columns
        );
        anyhow::ensure!(
            self.formula_end_col >= self.formula_start_col,
            "formula_end_col ({}) must not precede formula_start_col ({})",
            self.formula_end_col,
            self.formula_start_col
        );
        anyhow::ensure!(
            self.data_start_row >= 3,
            "data_start_row ({}) must be at least 3 so the row above can hold the template",
            self.data_start_row
        );
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be at least 1");
        anyhow::ensure!(self.date_column > 0, "date_column must be at least 1");
        anyhow::ensure!(
            self.date_column < self.formula_start_col || self.date_column > self.formula_end_col,
            "date_column ({}) must not fall inside the formula region",
            self.date_column
        );
        Ok(())
    }

    pub fn formula_cols(&self) -> u32 {
        self.formula_end_col - self.formula_start_col + 1
    }

    pub fn template_row(&self) -> u32 {
        self.data_start_row - 1
    }

    /// Source data begins one row above the destination data start.
    pub fn source_first_row(&self) -> u32 {
        self.data_start_row - 1
    }

    /// Number of source data rows given the source's last populated row.
    pub fn source_row_count(&self, source_last_row: u32) -> u32 {
        (source_last_row + 1).saturating_sub(self.source_first_row())
    }

    pub fn template_region(&self) -> SheetRegion {
        SheetRegion::new(
            self.template_row(),
            self.formula_start_col,
            1,
            self.formula_cols(),
        )
    }

    pub fn first_formula_row_region(&self) -> SheetRegion {
        SheetRegion::new(
            self.data_start_row,
            self.formula_start_col,
            1,
            self.formula_cols(),
        )
    }

    /// Everything from the data start row through the formula region's last column.
    pub fn clear_region(&self, max_rows: u32) -> SheetRegion {
        SheetRegion::new(
            self.data_start_row,
            1,
            (max_rows + 1).saturating_sub(self.data_start_row),
            self.formula_end_col,
        )
    }

    pub fn data_rows(&self, last_row: u32) -> u32 {
        (last_row + 1).saturating_sub(self.data_start_row)
    }

    pub fn date_region(&self, last_row: u32) -> SheetRegion {
        SheetRegion::new(self.data_start_row, self.date_column, self.data_rows(last_row), 1)
    }

    pub fn formula_region(&self, last_row: u32) -> SheetRegion {
        SheetRegion::new(
            self.data_start_row,
            self.formula_start_col,
            self.data_rows(last_row),
            self.formula_cols(),
        )
    }
}

/// How the destination is recalculated before its formulas are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecalcBackendKind {
    Formualizer,
    Libreoffice,
    /// Freeze whatever results are cached in the file.
    Off,
    #[default]
    Auto,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub source_id: ContainerId,
    pub destination_id: ContainerId,
    pub sheet_name: String,
    pub layout: SheetLayout,
    pub date_format: String,
    pub normalize_delay_ms: u64,
    pub translate_template: bool,
    pub trigger_store: PathBuf,
    pub recalc_backend: RecalcBackendKind,
    pub soffice_path: PathBuf,
    pub recalc_timeout_ms: u64,
    pub sync_interval_secs: Option<u64>,
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    /// Configuration with reference defaults, for embedding and tests.
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            trigger_store: workspace_root.join(DEFAULT_TRIGGER_STORE),
            workspace_root,
            source_id: ContainerId::new(source_id),
            destination_id: ContainerId::new(destination_id),
            sheet_name: sheet_name.into(),
            layout: SheetLayout::default(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            normalize_delay_ms: DEFAULT_NORMALIZE_DELAY_MS,
            translate_template: false,
            recalc_backend: RecalcBackendKind::default(),
            soffice_path: PathBuf::from(DEFAULT_SOFFICE_PATH),
            recalc_timeout_ms: DEFAULT_RECALC_TIMEOUT_MS,
            sync_interval_secs: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            workspace_root: cli_workspace_root,
            source_id: cli_source_id,
            destination_id: cli_destination_id,
            sheet_name: cli_sheet_name,
            value_columns: cli_value_columns,
            formula_start_col: cli_formula_start_col,
            formula_end_col: cli_formula_end_col,
            data_start_row: cli_data_start_row,
            chunk_size: cli_chunk_size,
            date_column: cli_date_column,
            date_format: cli_date_format,
            normalize_delay_ms: cli_normalize_delay_ms,
            translate_template: cli_translate_template,
            trigger_store: cli_trigger_store,
            recalc_backend: cli_recalc_backend,
            soffice_path: cli_soffice_path,
            recalc_timeout_ms: cli_recalc_timeout_ms,
            sync_interval_secs: cli_sync_interval_secs,
            poll_interval_ms: cli_poll_interval_ms,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            workspace_root: file_workspace_root,
            source_id: file_source_id,
            destination_id: file_destination_id,
            sheet_name: file_sheet_name,
            value_columns: file_value_columns,
            formula_start_col: file_formula_start_col,
            formula_end_col: file_formula_end_col,
            data_start_row: file_data_start_row,
            chunk_size: file_chunk_size,
            date_column: file_date_column,
            date_format: file_date_format,
            normalize_delay_ms: file_normalize_delay_ms,
            translate_template: file_translate_template,
            trigger_store: file_trigger_store,
            recalc_backend: file_recalc_backend,
            soffice_path: file_soffice_path,
            recalc_timeout_ms: file_recalc_timeout_ms,
            sync_interval_secs: file_sync_interval_secs,
            poll_interval_ms: file_poll_interval_ms,
        } = file_config;

        let workspace_root = cli_workspace_root
            .or(file_workspace_root)
            .unwrap_or_else(|| PathBuf::from("."));

        let source_id = cli_source_id
            .or(file_source_id)
            .map(|id| id.trim().to_string())
            .unwrap_or_default();
        let destination_id = cli_destination_id
            .or(file_destination_id)
            .map(|id| id.trim().to_string())
            .unwrap_or_default();
        let sheet_name = cli_sheet_name.or(file_sheet_name).unwrap_or_default();

        let defaults = SheetLayout::default();
        let value_columns = cli_value_columns
            .or(file_value_columns)
            .unwrap_or(defaults.value_columns);
        let layout = SheetLayout {
            value_columns,
            // Follows the value columns unless pinned explicitly.
            formula_start_col: cli_formula_start_col
                .or(file_formula_start_col)
                .unwrap_or(value_columns + 1),
            formula_end_col: cli_formula_end_col
                .or(file_formula_end_col)
                .unwrap_or(defaults.formula_end_col),
            data_start_row: cli_data_start_row
                .or(file_data_start_row)
                .unwrap_or(defaults.data_start_row),
            chunk_size: cli_chunk_size
                .or(file_chunk_size)
                .unwrap_or(defaults.chunk_size),
            date_column: cli_date_column
                .or(file_date_column)
                .unwrap_or(defaults.date_column),
        };

        let date_format = cli_date_format
            .or(file_date_format)
            .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());

        let normalize_delay_ms = cli_normalize_delay_ms
            .or(file_normalize_delay_ms)
            .unwrap_or(DEFAULT_NORMALIZE_DELAY_MS);

        let translate_template =
            cli_translate_template || file_translate_template.unwrap_or(false);

        let trigger_store = cli_trigger_store
            .or(file_trigger_store)
            .map(|p| {
                if p.is_absolute() {
                    p
                } else {
                    workspace_root.join(p)
                }
            })
            .unwrap_or_else(|| workspace_root.join(DEFAULT_TRIGGER_STORE));

        let recalc_backend = cli_recalc_backend
            .or(file_recalc_backend)
            .unwrap_or_default();
        let soffice_path = cli_soffice_path
            .or(file_soffice_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOFFICE_PATH));
        let recalc_timeout_ms = cli_recalc_timeout_ms
            .or(file_recalc_timeout_ms)
            .unwrap_or(DEFAULT_RECALC_TIMEOUT_MS);

        let sync_interval_secs = cli_sync_interval_secs
            .or(file_sync_interval_secs)
            .filter(|secs| *secs > 0);
        let poll_interval_ms = cli_poll_interval_ms
            .or(file_poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(1);

        let config = Self {
            workspace_root,
            source_id: ContainerId::new(source_id),
            destination_id: ContainerId::new(destination_id),
            sheet_name,
            layout,
            date_format,
            normalize_delay_ms,
            translate_template,
            trigger_store,
            recalc_backend,
            soffice_path,
            recalc_timeout_ms,
            sync_interval_secs,
            poll_interval_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.source_id.as_str().is_empty(),
            "source_id is required"
        );
        anyhow::ensure!(
            !self.destination_id.as_str().is_empty(),
            "destination_id is required"
        );
        anyhow::ensure!(
            self.source_id != self.destination_id,
            "source_id and destination_id must differ (both '{}')",
            self.source_id
        );
        anyhow::ensure!(
            !self.sheet_name.trim().is_empty(),
            "sheet_name is required"
        );
        anyhow::ensure!(
            !self.date_format.trim().is_empty(),
            "date_format must not be empty"
        );
        self.layout.validate()
    }

    pub fn ensure_workspace_root(&self) -> Result<()> {
        anyhow::ensure!(
            self.workspace_root.exists(),
            "workspace root {:?} does not exist",
            self.workspace_root
        );
        anyhow::ensure!(
            self.workspace_root.is_dir(),
            "workspace root {:?} is not a directory",
            self.workspace_root
        );
        Ok(())
    }

    pub fn normalize_delay(&self) -> Duration {
        Duration::from_millis(self.normalize_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs.map(Duration::from_secs)
    }

    pub fn recalc_timeout(&self) -> Option<Duration> {
        if self.recalc_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.recalc_timeout_ms))
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SHEET_MIRROR_WORKSPACE",
        value_name = "DIR",
        help = "Workspace root containing workbook files",
        global = true
    )]
    pub workspace_root: Option<PathBuf>,

    #[arg(
        long,
        env = "SHEET_MIRROR_SOURCE_ID",
        value_name = "ID",
        help = "Source workbook identifier",
        global = true
    )]
    pub source_id: Option<String>,

    #[arg(
        long,
        env = "SHEET_MIRROR_DESTINATION_ID",
        value_name = "ID",
        help = "Destination workbook identifier",
        global = true
    )]
    pub destination_id: Option<String>,

    #[arg(
        long,
        env = "SHEET_MIRROR_SHEET_NAME",
        value_name = "NAME",
        help = "Sheet name shared by source and destination",
        global = true
    )]
    pub sheet_name: Option<String>,

    #[arg(
        long,
        env = "SHEET_MIRROR_VALUE_COLUMNS",
        value_name = "N",
        help = "Number of leading value columns copied from the source (default: 35)",
        global = true
    )]
    pub value_columns: Option<u32>,

    #[arg(
        long,
        env = "SHEET_MIRROR_FORMULA_START_COL",
        value_name = "COL",
        help = "First formula column (default: value_columns + 1)",
        global = true
    )]
    pub formula_start_col: Option<u32>,

    #[arg(
        long,
        env = "SHEET_MIRROR_FORMULA_END_COL",
        value_name = "COL",
        help = "Last formula column (default: 46)",
        global = true
    )]
    pub formula_end_col: Option<u32>,

    #[arg(
        long,
        env = "SHEET_MIRROR_DATA_START_ROW",
        value_name = "ROW",
        help = "First destination data row; the row above holds the formula template (default: 3)",
        global = true
    )]
    pub data_start_row: Option<u32>,

    #[arg(
        long,
        env = "SHEET_MIRROR_CHUNK_SIZE",
        value_name = "ROWS",
        help = "Rows copied per batch (default: 3000)",
        global = true
    )]
    pub chunk_size: Option<u32>,

    #[arg(
        long,
        env = "SHEET_MIRROR_DATE_COLUMN",
        value_name = "COL",
        help = "Column whose date cells are reformatted (default: 11)",
        global = true
    )]
    pub date_column: Option<u32>,

    #[arg(
        long,
        env = "SHEET_MIRROR_DATE_FORMAT",
        value_name = "FORMAT",
        help = "Number format applied to date cells (default: m/d)",
        global = true
    )]
    pub date_format: Option<String>,

    #[arg(
        long,
        env = "SHEET_MIRROR_NORMALIZE_DELAY_MS",
        value_name = "MS",
        help = "Delay between import and normalization (default: 10000)",
        global = true
    )]
    pub normalize_delay_ms: Option<u64>,

    #[arg(
        long,
        env = "SHEET_MIRROR_TRANSLATE_TEMPLATE",
        help = "Shift relative row references in template formulas onto the first data row",
        global = true
    )]
    pub translate_template: bool,

    #[arg(
        long,
        env = "SHEET_MIRROR_TRIGGER_STORE",
        value_name = "FILE",
        help = "Pending trigger store (default: <workspace_root>/.sheet-mirror/triggers.json)",
        global = true
    )]
    pub trigger_store: Option<PathBuf>,

    #[arg(
        long,
        env = "SHEET_MIRROR_RECALC_BACKEND",
        value_enum,
        value_name = "KIND",
        help = "Recalculation before freezing: auto, formualizer, libreoffice or off (default: auto)",
        global = true
    )]
    pub recalc_backend: Option<RecalcBackendKind>,

    #[arg(
        long,
        env = "SHEET_MIRROR_SOFFICE_PATH",
        value_name = "PATH",
        help = "LibreOffice binary used for recalculation",
        global = true
    )]
    pub soffice_path: Option<PathBuf>,

    #[arg(
        long,
        env = "SHEET_MIRROR_RECALC_TIMEOUT_MS",
        value_name = "MS",
        help = "Recalculation timeout in milliseconds (default: 30000; 0 disables)",
        global = true
    )]
    pub recalc_timeout_ms: Option<u64>,

    #[arg(
        long,
        env = "SHEET_MIRROR_SYNC_INTERVAL_SECS",
        value_name = "SECS",
        help = "Daemon: run a full sync on this period (0 disables)",
        global = true
    )]
    pub sync_interval_secs: Option<u64>,

    #[arg(
        long,
        env = "SHEET_MIRROR_POLL_INTERVAL_MS",
        value_name = "MS",
        help = "Daemon: how often pending triggers are checked (default: 1000)",
        global = true
    )]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    workspace_root: Option<PathBuf>,
    source_id: Option<String>,
    destination_id: Option<String>,
    sheet_name: Option<String>,
    value_columns: Option<u32>,
    formula_start_col: Option<u32>,
    formula_end_col: Option<u32>,
    data_start_row: Option<u32>,
    chunk_size: Option<u32>,
    date_column: Option<u32>,
    date_format: Option<String>,
    normalize_delay_ms: Option<u64>,
    translate_template: Option<bool>,
    trigger_store: Option<PathBuf>,
    recalc_backend: Option<RecalcBackendKind>,
    soffice_path: Option<PathBuf>,
    recalc_timeout_ms: Option<u64>,
    sync_interval_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
