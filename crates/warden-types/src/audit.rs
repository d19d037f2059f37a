//! Injected audit sink for every component that can refuse or fail a
//! request.
//!
//! The core owns no global logger or audit singleton. Every component that
//! can refuse or fail accepts a `&dyn AuditSink` and calls it fire-and-forget
//! — `emit` must never be allowed to block or panic the caller.

use serde::{Deserialize, Serialize};

use crate::violation::Violation;

/// Current wall-clock time as Unix epoch milliseconds, for [`AuditEvent::t`].
///
/// Falls back to `0` only if the system clock is set before the epoch.
#[must_use]
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// One audit record, emitted for every non-`NONE` validation result and
/// every blocked or failed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unix epoch milliseconds at emission time.
    pub t: u64,
    /// Component that raised the event (`"validator"`, `"sandbox"`,
    /// `"shell_exec"`, `"workflow"`).
    pub component: String,
    /// Short description of the action under evaluation.
    pub action: String,
    /// Decision taken (`"allow"`, `"block"`, `"timeout"`, ...).
    pub decision: String,
    /// Every violation associated with this decision.
    pub violations: Vec<Violation>,
    /// Free-form structured context (session id, policy level, ...). Never
    /// the raw attacker payload.
    pub context: serde_json::Value,
}

/// Fire-and-forget sink for [`AuditEvent`]s.
///
/// Implementations must not block or propagate errors back to the caller —
/// a failing audit backend must never fail a request.
pub trait AuditSink: Send + Sync {
    /// Record `event`. Must not panic or block meaningfully.
    fn emit(&self, event: AuditEvent);
}

/// Discards every event. The default sink when a caller configures none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl AuditSink for NoopSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Routes audit events through `tracing`, matching the ambient logging
/// stack used across the rest of the core.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::warn!(
            component = %event.component,
            action = %event.action,
            decision = %event.decision,
            violation_count = event.violations.len(),
            context = %event.context,
            "audit event",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopSink;
        sink.emit(AuditEvent {
            t: 0,
            component: "validator".into(),
            action: "validate".into(),
            decision: "block".into(),
            violations: Vec::new(),
            context: serde_json::json!({}),
        });
    }

    #[test]
    fn tracing_sink_does_not_panic() {
        let sink = TracingAuditSink;
        sink.emit(AuditEvent {
            t: 0,
            component: "shell_exec".into(),
            action: "run_shell".into(),
            decision: "block".into(),
            violations: Vec::new(),
            context: serde_json::json!({"cmd": "[redacted]"}),
        });
    }
}
