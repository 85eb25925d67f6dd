use crate::errors::BackendError;
use crate::model::ContainerId;
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

/// Canonicalize `candidate` and ensure it remains within `workspace_root`.
///
/// This is symlink-aware: we canonicalize both the workspace root and the candidate path.
///
/// If `candidate` does not exist, we canonicalize its parent directory and then re-join
/// the final path segment, which is sufficient for boundary enforcement prior to a write.
pub fn canonicalize_and_enforce_within_workspace(
    workspace_root: &Path,
    candidate: &Path,
    container: &ContainerId,
) -> Result<PathBuf> {
    let workspace_root = workspace_root
        .canonicalize()
        .map_err(|e| anyhow!("failed to canonicalize workspace_root: {e}"))?;

    let canonical_candidate = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| anyhow!("container '{container}' could not be canonicalized: {e}"))?
    } else {
        let parent = candidate
            .parent()
            .ok_or_else(|| anyhow!("container '{container}' must have a parent directory"))?;
        let file_name = candidate
            .file_name()
            .ok_or_else(|| anyhow!("container '{container}' must include a file name"))?;
        let canonical_parent = parent.canonicalize().map_err(|_| {
            BackendError::ContainerNotFound(container.clone())
        })?;
        canonical_parent.join(file_name)
    };

    if !canonical_candidate.starts_with(&workspace_root) {
        return Err(BackendError::OutsideWorkspace {
            container: container.clone(),
            path: canonical_candidate.display().to_string(),
        }
        .into());
    }

    Ok(canonical_candidate)
}

/// Sanitize a container id for use as a single path component.
pub fn sanitize_filename_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_control() || ch == '\\' {
            out.push('_');
        } else {
            out.push(ch);
        }
    }

    if out == "." || out == ".." {
        return "_".to_string();
    }

    out
}
