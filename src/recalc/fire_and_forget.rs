use super::RecalcConfig;
use super::executor::{RecalcExecutor, RecalcResult};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::process::Command;
use tokio::time;

/// Spawns a throwaway headless LibreOffice per recalculation. The workbook is
/// round-tripped through `--convert-to xlsx`, which loads, recalculates and
/// re-saves it with fresh cached values.
pub struct FireAndForgetExecutor {
    soffice_path: PathBuf,
    timeout: Option<Duration>,
}

impl FireAndForgetExecutor {
    pub fn new(config: &RecalcConfig) -> Self {
        Self {
            soffice_path: config
                .soffice_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("/usr/bin/soffice")),
            timeout: config.timeout_ms.map(Duration::from_millis),
        }
    }
}

#[async_trait]
impl RecalcExecutor for FireAndForgetExecutor {
    async fn recalculate(&self, workbook_path: &Path) -> Result<RecalcResult> {
        let start = Instant::now();

        let abs_path = workbook_path
            .canonicalize()
            .map_err(|e| anyhow!("failed to canonicalize path: {}", e))?;
        let file_name = abs_path
            .file_name()
            .ok_or_else(|| anyhow!("workbook path has no file name"))?
            .to_owned();

        let scratch = tempfile::Builder::new()
            .prefix(&format!("sheet-mirror-lo-{}-", uuid::Uuid::new_v4()))
            .tempdir()
            .map_err(|e| anyhow!("failed to create scratch dir: {}", e))?;
        let profile_dir = scratch.path().join("profile");
        let out_dir = scratch.path().join("out");
        fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| anyhow!("failed to create output dir: {}", e))?;

        let mut command = Command::new(&self.soffice_path);
        command
            .args([
                "--headless",
                "--norestore",
                "--nodefault",
                "--nofirststartwizard",
                "--nolockcheck",
                "--calc",
            ])
            .arg(format!("-env:UserInstallation=file://{}", profile_dir.display()))
            .arg("--convert-to")
            .arg("xlsx")
            .arg("--outdir")
            .arg(&out_dir)
            .arg(&abs_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => time::timeout(timeout, command.output())
                .await
                .map_err(|_| anyhow!("soffice timed out after {:?}", timeout))?,
            None => command.output().await,
        }
        .map_err(|e| anyhow!("failed to spawn soffice: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(anyhow!(
                "soffice failed (exit {}): stderr={}, stdout={}",
                output.status.code().unwrap_or(-1),
                stderr,
                stdout
            ));
        }

        let converted = out_dir.join(&file_name).with_extension("xlsx");
        fs::copy(&converted, &abs_path).await.map_err(|e| {
            anyhow!(
                "failed to replace {} with recalculated copy: {}",
                abs_path.display(),
                e
            )
        })?;

        Ok(RecalcResult {
            duration_ms: start.elapsed().as_millis() as u64,
            executor_type: "fire_and_forget",
        })
    }

    fn is_available(&self) -> bool {
        self.soffice_path.exists()
    }
}
