use super::CommandContext;
use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub fn list(context: &CommandContext) -> Result<Value> {
    let pending = context.pipeline.scheduler().pending()?;
    Ok(json!({
        "ok": true,
        "count": pending.len(),
        "triggers": pending,
    }))
}

pub async fn run_due(context: &CommandContext) -> Result<Value> {
    let dispatched = context.runner().run_due(Utc::now()).await?;
    let ok = dispatched.iter().all(|outcome| outcome.ok);
    Ok(json!({ "ok": ok, "dispatched": dispatched }))
}

pub async fn daemon(context: &CommandContext) -> Result<Value> {
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        signal.cancel();
    });

    context.runner().run_until(shutdown).await?;
    Ok(json!({ "ok": true, "stopped": true }))
}
