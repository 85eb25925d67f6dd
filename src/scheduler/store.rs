use super::{Trigger, TriggerId, TriggerTarget};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Pending one-shot triggers. Implementations must make each call atomic.
pub trait TriggerStore: Send + Sync {
    fn create(&self, target: TriggerTarget, fire_at: DateTime<Utc>) -> Result<Trigger>;
    fn list(&self) -> Result<Vec<Trigger>>;
    /// Returns false when the trigger was already gone.
    fn cancel(&self, id: &TriggerId) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryTriggerStore {
    triggers: Mutex<Vec<Trigger>>,
}

impl MemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerStore for MemoryTriggerStore {
    fn create(&self, target: TriggerTarget, fire_at: DateTime<Utc>) -> Result<Trigger> {
        let trigger = Trigger::new(target, fire_at);
        self.triggers.lock().push(trigger.clone());
        Ok(trigger)
    }

    fn list(&self) -> Result<Vec<Trigger>> {
        Ok(self.triggers.lock().clone())
    }

    fn cancel(&self, id: &TriggerId) -> Result<bool> {
        let mut triggers = self.triggers.lock();
        let before = triggers.len();
        triggers.retain(|t| &t.id != id);
        Ok(triggers.len() != before)
    }
}

const STORE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TriggerDocument {
    version: u32,
    triggers: Vec<Trigger>,
}

/// JSON document on disk, rewritten through a temp file on every change so a
/// crash never leaves a torn store behind.
pub struct FileTriggerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTriggerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<TriggerDocument> {
        if !self.path.exists() {
            return Ok(TriggerDocument {
                version: STORE_VERSION,
                triggers: Vec::new(),
            });
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read trigger store {:?}", self.path))?;
        if contents.trim().is_empty() {
            return Ok(TriggerDocument {
                version: STORE_VERSION,
                triggers: Vec::new(),
            });
        }
        let doc: TriggerDocument = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse trigger store {:?}", self.path))?;
        anyhow::ensure!(
            doc.version == STORE_VERSION,
            "trigger store {:?} has unsupported version {}",
            self.path,
            doc.version
        );
        Ok(doc)
    }

    fn save(&self, doc: &TriggerDocument) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create trigger store dir {:?}", dir))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, doc)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to persist trigger store {:?}", self.path))?;
        Ok(())
    }
}

impl TriggerStore for FileTriggerStore {
    fn create(&self, target: TriggerTarget, fire_at: DateTime<Utc>) -> Result<Trigger> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        let trigger = Trigger::new(target, fire_at);
        doc.triggers.push(trigger.clone());
        self.save(&doc)?;
        Ok(trigger)
    }

    fn list(&self) -> Result<Vec<Trigger>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.triggers)
    }

    fn cancel(&self, id: &TriggerId) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        let before = doc.triggers.len();
        doc.triggers.retain(|t| &t.id != id);
        if doc.triggers.len() == before {
            return Ok(false);
        }
        self.save(&doc)?;
        Ok(true)
    }
}
