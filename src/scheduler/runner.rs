use super::{TriggerId, TriggerTarget};
use crate::pipeline::{NormalizeReport, SyncPipeline};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub target: TriggerTarget,
    pub trigger_ids: Vec<TriggerId>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<NormalizeReport>,
}

/// Fires due triggers against the pipeline. Several due triggers for one
/// target collapse into a single run, since the run consumes all of them.
pub struct TriggerRunner {
    pipeline: Arc<SyncPipeline>,
}

impl TriggerRunner {
    pub fn new(pipeline: Arc<SyncPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<DispatchOutcome>> {
        let mut grouped: BTreeMap<String, (TriggerTarget, Vec<TriggerId>)> = BTreeMap::new();
        for trigger in self.pipeline.scheduler().due(now)? {
            grouped
                .entry(trigger.target.to_string())
                .or_insert_with(|| (trigger.target, Vec::new()))
                .1
                .push(trigger.id);
        }

        let mut outcomes = Vec::with_capacity(grouped.len());
        for (_, (target, trigger_ids)) in grouped {
            tracing::info!(trigger_target = %target, count = trigger_ids.len(), "dispatching due trigger");
            let outcome = match target {
                TriggerTarget::Normalize => {
                    let report = self.pipeline.normalize().await;
                    DispatchOutcome {
                        target,
                        trigger_ids,
                        ok: report.is_some(),
                        normalize: report,
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Sleep until the earliest pending trigger is due, then dispatch.
    /// Returns immediately when nothing is pending.
    pub async fn wait_and_run(&self) -> Result<Vec<DispatchOutcome>> {
        let Some(fire_at) = self.pipeline.scheduler().next_fire_at()? else {
            return Ok(Vec::new());
        };
        if let Ok(wait) = (fire_at - Utc::now()).to_std() {
            tracing::info!(fire_at = %fire_at.to_rfc3339(), wait_ms = wait.as_millis() as u64, "waiting for trigger");
            tokio::time::sleep(wait).await;
        }
        self.run_due(Utc::now()).await
    }

    /// Poll for due triggers (and run imports on the sync interval, when set)
    /// until `shutdown` is cancelled.
    pub async fn run_until(&self, shutdown: CancellationToken) -> Result<()> {
        let config = self.pipeline.config();
        let mut poll = tokio::time::interval(config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sync = config.sync_interval().map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        tracing::info!(
            poll_ms = config.poll_interval().as_millis() as u64,
            sync_secs = config.sync_interval().map(|d| d.as_secs()),
            "trigger runner started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("trigger runner stopping");
                    return Ok(());
                }
                _ = poll.tick() => {
                    if let Err(err) = self.run_due(Utc::now()).await {
                        tracing::warn!(error = %format!("{err:#}"), "failed to read pending triggers");
                    }
                }
                _ = async {
                    match sync.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.pipeline.import().await;
                }
            }
        }
    }
}
