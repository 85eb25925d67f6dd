//! One-shot deferred work with a single-consumer guarantee: scheduling a
//! target first cancels whatever is pending for it, and the consumer cancels
//! its own triggers before running.

mod runner;
mod store;

pub use runner::{DispatchOutcome, TriggerRunner};
pub use store::{FileTriggerStore, MemoryTriggerStore, TriggerStore};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerTarget {
    Normalize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(pub String);

impl TriggerId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub target: TriggerTarget,
    pub created_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(target: TriggerTarget, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: TriggerId::generate(),
            target,
            created_at: Utc::now(),
            fire_at,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn TriggerStore>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TriggerStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTriggerStore::new()))
    }

    /// Replace any pending trigger for `target` with one firing after `delay`.
    pub fn schedule_once(&self, target: TriggerTarget, delay: Duration) -> Result<Trigger> {
        let replaced = self.cancel_pending(target)?;
        let fire_at = Utc::now() + chrono::Duration::from_std(delay)?;
        let trigger = self.store.create(target, fire_at)?;
        tracing::info!(
            trigger_target = %target,
            trigger_id = %trigger.id,
            fire_at = %trigger.fire_at.to_rfc3339(),
            replaced,
            "trigger scheduled"
        );
        Ok(trigger)
    }

    /// Cancel every pending trigger for `target`. Called by the target itself on entry.
    pub fn consume(&self, target: TriggerTarget) -> Result<usize> {
        self.cancel_pending(target)
    }

    fn cancel_pending(&self, target: TriggerTarget) -> Result<usize> {
        let mut cancelled = 0;
        for trigger in self.pending_for(target)? {
            if self.store.cancel(&trigger.id)? {
                tracing::debug!(trigger_target = %target, trigger_id = %trigger.id, "trigger cancelled");
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    pub fn pending(&self) -> Result<Vec<Trigger>> {
        let mut triggers = self.store.list()?;
        triggers.sort_by_key(|t| t.fire_at);
        Ok(triggers)
    }

    pub fn pending_for(&self, target: TriggerTarget) -> Result<Vec<Trigger>> {
        Ok(self
            .pending()?
            .into_iter()
            .filter(|t| t.target == target)
            .collect())
    }

    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>> {
        Ok(self
            .pending()?
            .into_iter()
            .filter(|t| t.is_due(now))
            .collect())
    }

    pub fn next_fire_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.pending()?.first().map(|t| t.fire_at))
    }
}
