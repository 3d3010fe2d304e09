//! Advisory audit trail for authentication decisions.
//!
//! Sinks only observe; nothing they do can change an accept/reject outcome.

/// Receives one human-readable line per authentication decision.
///
/// Implementations must be cheap and must never see raw tokens.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, message: &str);
}

/// Writes audit lines as `tracing` events on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, message: &str) {
        tracing::info!(target: "audit", "{}", message);
    }
}
