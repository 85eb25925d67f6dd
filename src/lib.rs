pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod formula;
pub mod model;
pub mod pipeline;
pub mod recalc;
pub mod scheduler;
pub mod security;

pub use backend::{MemoryBackend, MemorySheet, Sheet, SheetBackend, XlsxBackend};
pub use config::{CliArgs, RecalcBackendKind, SheetLayout, SyncConfig};
pub use errors::{BackendError, SyncError};
pub use model::{CellValue, ContainerId, Grid, SheetRegion};
pub use pipeline::{ImportReport, NormalizeReport, SyncPipeline};
pub use scheduler::{
    FileTriggerStore, MemoryTriggerStore, Scheduler, Trigger, TriggerRunner, TriggerStore,
    TriggerTarget,
};
