use crate::errors::{BackendError, SyncError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_this: Option<String>,
}

impl ErrorEnvelope {
    fn new(code: &str, message: String) -> Self {
        Self {
            ok: false,
            code: code.to_string(),
            message,
            row: None,
            try_this: None,
        }
    }

    fn try_this(mut self, hint: &str) -> Self {
        self.try_this = Some(hint.to_string());
        self
    }
}

pub fn envelope_for(error: &anyhow::Error) -> ErrorEnvelope {
    // SyncError already renders its cause.
    let message = if error.downcast_ref::<SyncError>().is_some() {
        error.to_string()
    } else {
        format!("{error:#}")
    };

    if let Some(backend) = error.chain().find_map(|e| e.downcast_ref::<BackendError>()) {
        let code = match backend {
            BackendError::ContainerNotFound(_) => "CONTAINER_NOT_FOUND",
            BackendError::SheetNotFound { .. } => "SHEET_NOT_FOUND",
            BackendError::OutsideWorkspace { .. } => "OUTSIDE_WORKSPACE",
            BackendError::RegionShape { .. } => "REGION_SHAPE",
            BackendError::Injected(_) => "INJECTED_FAILURE",
        };
        let mut envelope = ErrorEnvelope::new(code, message);
        if let Some(SyncError::Transfer { row, .. }) = error.downcast_ref::<SyncError>() {
            envelope.row = Some(*row);
        }
        return match backend {
            BackendError::ContainerNotFound(_) => envelope
                .try_this("check --workspace-root and that the workbook file exists"),
            BackendError::SheetNotFound { .. } => {
                envelope.try_this("source and destination must both carry --sheet-name")
            }
            _ => envelope,
        };
    }

    if let Some(sync) = error.downcast_ref::<SyncError>() {
        let code = match sync {
            SyncError::Setup(_) => "SETUP_FAILED",
            SyncError::Transfer { .. } => "TRANSFER_FAILED",
            SyncError::Restore(_) => "RESTORE_FAILED",
            SyncError::Normalize(_) => "NORMALIZE_FAILED",
            SyncError::Schedule(_) => "SCHEDULE_FAILED",
        };
        let mut envelope = ErrorEnvelope::new(code, message);
        if let SyncError::Transfer { row, .. } = sync {
            envelope.row = Some(*row);
        }
        return envelope;
    }

    if message.contains("config file") || message.contains("config extension") {
        return ErrorEnvelope::new("INVALID_CONFIG", message)
            .try_this("pass a .yaml, .yml or .json file to --config");
    }

    if message.contains("must")
        || message.contains("is required")
        || message.contains("does not exist")
    {
        return ErrorEnvelope::new("INVALID_ARGUMENT", message);
    }

    ErrorEnvelope::new("COMMAND_FAILED", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContainerId;

    #[test]
    fn transfer_errors_carry_the_failing_row() {
        let err: anyhow::Error = SyncError::Transfer {
            row: 3002,
            source: BackendError::Injected("read failed".into()).into(),
        }
        .into();
        let envelope = envelope_for(&err);
        assert_eq!(envelope.code, "INJECTED_FAILURE");
        assert_eq!(envelope.row, Some(3002));
        assert!(!envelope.ok);
    }

    #[test]
    fn missing_container_gets_a_hint() {
        let err: anyhow::Error =
            SyncError::Setup(BackendError::ContainerNotFound(ContainerId::new("src")).into())
                .into();
        let envelope = envelope_for(&err);
        assert_eq!(envelope.code, "CONTAINER_NOT_FOUND");
        assert!(envelope.try_this.is_some());
    }
}
