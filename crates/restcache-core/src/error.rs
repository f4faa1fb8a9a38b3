// ── Core error types ──
//
// Structural errors from restcache-core. Failed API calls are NOT
// reported here: the orchestrator turns them into `RequestFailure` data
// on the state tree. What remains are caller defects (malformed events
// or intents) and lifecycle misuse.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Orchestrator is not running")]
    Stopped,

    #[error("Orchestrator already started")]
    AlreadyStarted,

    // ── Caller defects ───────────────────────────────────────────────
    #[error("Malformed {kind} event: {reason}")]
    MalformedEvent { kind: String, reason: String },

    #[error("Malformed {kind} intent for model {model}: {reason}")]
    MalformedIntent {
        kind: String,
        model: String,
        reason: String,
    },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<restcache_api::Error> for CoreError {
    fn from(err: restcache_api::Error) -> Self {
        match err {
            restcache_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            restcache_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            restcache_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            other => CoreError::Api {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_keep_status() {
        let err = CoreError::from(restcache_api::Error::Http {
            status: 503,
            message: "maintenance".into(),
            body: serde_json::Value::Null,
        });
        match err {
            CoreError::Api { status, message } => {
                assert_eq!(status, Some(503));
                assert_eq!(message, "HTTP 503: maintenance");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tls_errors_are_configuration_problems() {
        let err = CoreError::from(restcache_api::Error::Tls("bad ca".into()));
        assert_eq!(err.to_string(), "Configuration error: TLS error: bad ca");
    }
}
