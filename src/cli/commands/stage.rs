use super::{CommandContext, log_stage_error};
use anyhow::Result;
use serde_json::{Value, json};

pub async fn sync(context: &CommandContext, wait: bool) -> Result<Value> {
    let report = context.pipeline.import_stage().await.map_err(|err| {
        log_stage_error("import", &err);
        err
    })?;

    if !wait {
        return Ok(json!({ "ok": true, "import": report }));
    }

    let dispatched = context.runner().wait_and_run().await?;
    let ok = dispatched.iter().all(|outcome| outcome.ok);
    Ok(json!({ "ok": ok, "import": report, "dispatched": dispatched }))
}

pub async fn normalize(context: &CommandContext) -> Result<Value> {
    let report = context.pipeline.normalize_stage().await.map_err(|err| {
        log_stage_error("normalize", &err);
        err
    })?;
    Ok(json!({ "ok": true, "normalize": report }))
}
