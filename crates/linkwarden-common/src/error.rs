//! Error taxonomy (§7). These are kinds, not exception types — every
//! variant documents how the core loop reacts to it.

use thiserror::Error;

/// Core error taxonomy. Only [`CoreError::bootstrap_fatal`] cases are
/// allowed to exit the process; everything else is recorded and the loop
/// continues (§7 propagation policy).
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    /// A config field was invalid or missing and a default was substituted.
    /// Always `WARN`, never fatal.
    #[error("config field invalid: {field}: {detail}")]
    ConfigInvalid { field: String, detail: String },

    /// A single probe failed. The engine still scores with degraded
    /// confidence; retried next tick.
    #[error("collector transient failure on {member}: {reason}")]
    CollectorTransient { member: String, reason: String },

    /// The class-specific provider is missing or has failed repeatedly.
    /// Marks the member ineligible after N consecutive failures.
    #[error("collector permanent failure on {member}: {reason}")]
    CollectorPermanent { member: String, reason: String },

    /// Policy daemon reload failed but re-readable state is sane; retry
    /// once then roll back.
    #[error("host integration transient error: {detail}")]
    HostIntegrationTransient { detail: String },

    /// Verification failed even after rollback. Keeps current selection,
    /// emits a reject event, and alerts.
    #[error("host integration fatal error: {detail}")]
    HostIntegrationFatal { detail: String },

    /// An invariant was violated in core state. Logged at ERROR with a
    /// dump; the offending component is reset if safe.
    #[error("internal invariant violated: {detail}")]
    InternalInvariant { detail: String },

    /// Bootstrap-only: cannot open config, or cannot allocate the telemetry
    /// ring within `max_ram_mb`. The only variants that may exit the process.
    #[error("bootstrap failure: {detail}")]
    Bootstrap { detail: String },
}

impl CoreError {
    /// Whether this error is one of the two bootstrap-fatal cases from §7.
    pub fn is_bootstrap_fatal(&self) -> bool {
        matches!(self, CoreError::Bootstrap { .. })
    }

    /// Severity bucket used when deciding whether to additionally emit a
    /// notifier-facing event (§7: "critical categories ... additionally
    /// emit an event consumed by notifiers").
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            CoreError::HostIntegrationFatal { .. } | CoreError::InternalInvariant { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bootstrap_is_fatal() {
        assert!(CoreError::Bootstrap {
            detail: "x".into()
        }
        .is_bootstrap_fatal());
        assert!(!CoreError::ConfigInvalid {
            field: "x".into(),
            detail: "y".into()
        }
        .is_bootstrap_fatal());
    }

    #[test]
    fn critical_categories() {
        assert!(CoreError::InternalInvariant {
            detail: "x".into()
        }
        .is_critical());
        assert!(CoreError::HostIntegrationFatal {
            detail: "x".into()
        }
        .is_critical());
        assert!(!CoreError::CollectorTransient {
            member: "x".into(),
            reason: "y".into()
        }
        .is_critical());
    }
}
