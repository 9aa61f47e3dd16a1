//! Crate-wide error taxonomy.
//!
//! Error kinds mirror the propagation rule in the specification: failures attributable to a
//! single package are logged and skipped by the caller, never constructed as a top-level
//! `AuditError`; only failures attributable to inputs the caller controls (missing/unreadable
//! manifest, unknown ecosystem) or to the orchestrator itself reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("manifest malformed: {0}")]
    ManifestMalformed(String),

    #[error("no ecosystem analyzer could detect a manifest in {0}")]
    UnknownEcosystem(String),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("package not found in registry: {0}")]
    RegistryNotFound(String),

    #[error("cache backend unavailable: {0}")]
    CacheUnavailable(String),

    #[error("LLM provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("analysis was cancelled")]
    Cancelled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML decode failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = AuditError::ManifestNotFound("package.json".to_string());
        assert_eq!(err.to_string(), "manifest not found: package.json");

        let err = AuditError::Cancelled;
        assert_eq!(err.to_string(), "analysis was cancelled");
    }
}
