//! Error types for the broke core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The config file does not carry the expected extension.
    #[error("invalid file extension on configuration file '{0}', must be *.broke.toml")]
    InvalidExtension(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

/// Errors from the HTTP clients talking to sources and targets.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The API answered with a success status but reported a failure in the body.
    #[error("API rejected request: {0}")]
    Rejected(String),

    /// Could not obtain an access token.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Response body could not be interpreted.
    #[error("response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// Run-fatal errors raised while planning or applying a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A source client could not return its user list.
    #[error("user source '{source_name}' unavailable: {error}")]
    SourceUnavailable {
        source_name: String,
        #[source]
        error: ClientError,
    },

    /// A target client failed a state query or a mutation.
    #[error("user target '{target}' unavailable: {error}")]
    TargetUnavailable {
        target: String,
        #[source]
        error: ClientError,
    },

    /// A target lookup did not return exactly one match.
    #[error("expected exactly one {kind} matching '{key}' in user target '{target}', found {matches}")]
    AmbiguousLookup {
        target: String,
        kind: &'static str,
        key: String,
        matches: usize,
    },

    /// A configured mapping cannot be turned into a target call.
    #[error("invalid mapping on user target '{target}': {detail}")]
    InvalidMapping { target: String, detail: String },

    /// The client set has no client registered under a configured name.
    #[error("no client registered for '{0}'")]
    MissingClient(String),
}

impl ReconcileError {
    pub(crate) fn target(target: &str, error: ClientError) -> Self {
        Self::TargetUnavailable {
            target: target.to_string(),
            error,
        }
    }

    pub(crate) fn invalid_mapping(target: &str, detail: impl Into<String>) -> Self {
        Self::InvalidMapping {
            target: target.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConfigError::EnvVarMissing {
            var: "MAILCOW_API_KEY".into(),
            field: "user_targets.mailcow.api_key_env".into(),
        };
        assert!(err.to_string().contains("MAILCOW_API_KEY"));

        let err = ReconcileError::AmbiguousLookup {
            target: "wiki".into(),
            kind: "user",
            key: "alice@example.com".into(),
            matches: 2,
        };
        assert_eq!(
            err.to_string(),
            "expected exactly one user matching 'alice@example.com' in user target 'wiki', found 2"
        );

        let err = ReconcileError::target(
            "mail",
            ClientError::ApiError {
                status: 502,
                body: "bad gateway".into(),
            },
        );
        assert!(err.to_string().starts_with("user target 'mail' unavailable"));
    }

    #[test]
    fn test_reconcile_error_keeps_source_chain() {
        let err = ReconcileError::SourceUnavailable {
            source_name: "keycloak".into(),
            error: ClientError::AuthenticationFailed("invalid_grant".into()),
        };
        let source = std::error::Error::source(&err).expect("missing source");
        assert!(source.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err: CoreError = ConfigError::FileNotFound("x.broke.toml".into()).into();
        assert!(matches!(err, CoreError::Config(_)));

        let err: CoreError = ReconcileError::invalid_mapping("gitlab", "no effect").into();
        assert!(matches!(err, CoreError::Reconcile(_)));
    }
}
