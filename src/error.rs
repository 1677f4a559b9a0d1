use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `revenant`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum RevenantError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Storage ──────────────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    // ── Sinks ────────────────────────────────────────────────────────────
    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Storage errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
}

// ─── Sink errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("notifier setup failed: {0}")]
    Notifier(String),

    #[error("record sink failed: {0}")]
    Persist(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, RevenantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_correctly() {
        let err = RevenantError::Config(ConfigError::Validation("missing webhook".into()));
        assert!(err.to_string().contains("validation failed"));
        assert!(err.to_string().contains("missing webhook"));
    }

    #[test]
    fn storage_error_names_the_path() {
        let err = RevenantError::Storage(StorageError::CreateDir {
            path: "/data/temp".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert!(err.to_string().contains("/data/temp"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let err: RevenantError = anyhow_err.into();
        assert!(err.to_string().contains("something went wrong"));
    }
}
