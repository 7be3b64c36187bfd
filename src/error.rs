//! Error taxonomy for healing operations.
//!
//! Every per-pod and per-namespace failure is caught at the smallest scope
//! and converted into a log line plus a counter increment; only failures
//! outside those loops abort a cycle.

use thiserror::Error;

/// Errors that can occur while inspecting or remediating cluster objects.
#[derive(Debug, Error)]
pub enum HealerError {
    /// Network, timeout, or 5xx-class API error. Treated as skip-this-target.
    #[error("transient API error: {0}")]
    TransientApi(String),

    /// Object vanished mid-cycle. Skip, not escalated.
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Invalid configuration. Fatal at startup, before any cycle runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Mutation rejected by the API server (conflict, validation).
    #[error("patch rejected: {0}")]
    PatchRejected(String),
}

impl HealerError {
    /// Label value for the `auto_healer_errors_total` counter.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::TransientApi(_) => "api_error",
            Self::NotFound { .. } => "not_found",
            Self::Config(_) => "config_error",
            Self::PatchRejected(_) => "patch_failed",
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Map a `kube::Error` into the healer taxonomy.
///
/// `kind` and `name` identify the object the call was for, so NotFound
/// carries a useful message instead of the raw API response.
pub fn from_kube(kind: &str, name: &str, err: &kube::Error) -> HealerError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => HealerError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 || resp.code == 422 => {
            HealerError::PatchRejected(format!("{kind} {name}: {}", resp.message))
        }
        other => HealerError::TransientApi(format!("{kind} {name}: {other}")),
    }
}
