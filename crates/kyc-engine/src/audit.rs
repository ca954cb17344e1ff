//! # Audit Sinks
//!
//! [`TracingAuditSink`] forwards events to `tracing` under the `kyc::audit`
//! target; [`MemoryAuditSink`] keeps them in a vector for inspection.

use std::sync::Arc;

use parking_lot::Mutex;

use kyc_core::KycError;

use crate::ports::{AuditAction, AuditEvent, AuditSink};

/// Emits every audit event as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), KycError> {
        let session = event.session_id.map(|s| s.to_string()).unwrap_or_default();
        let subject = event
            .subject_id
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default();
        tracing::info!(
            target: "kyc::audit",
            action = event.action.as_str(),
            session = %session,
            subject = %subject,
            actor = event.actor.as_deref().unwrap_or("system"),
            at = %event.at,
            "{}",
            event.detail
        );
        Ok(())
    }
}

/// Collects audit events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.events.lock().iter().filter(|e| e.action == action).count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), KycError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_core::{FlowType, Score, StepSet, SubjectId};
    use kyc_state::{FlowPlan, VerificationSession};

    #[test]
    fn memory_sink_counts_by_action() {
        let session = VerificationSession::new(
            SubjectId::new("audit-subject").unwrap(),
            FlowPlan {
                flow_type: FlowType::Standard,
                required_steps: StepSet::all(),
                optional_steps: StepSet::empty(),
                manual_review_forced: false,
                estimated_minutes: 15,
            },
            Score::new(75.0),
            Score::new(80.0),
        );
        let sink = MemoryAuditSink::new();
        sink.record(&AuditEvent::for_session(&session, AuditAction::SessionInitiated, "created"))
            .unwrap();
        sink.record(
            &AuditEvent::for_session(&session, AuditAction::CredentialRevoked, "fraud")
                .with_actor("admin-1"),
        )
        .unwrap();

        assert_eq!(sink.count(AuditAction::SessionInitiated), 1);
        let events = sink.events();
        assert_eq!(events[1].actor.as_deref(), Some("admin-1"));
        assert_eq!(events[1].subject_id.as_ref().unwrap().as_str(), "audit-subject");
    }

    #[test]
    fn tracing_sink_never_fails() {
        let event = AuditEvent {
            at: kyc_core::Timestamp::now(),
            action: AuditAction::RiskComputed,
            session_id: None,
            subject_id: None,
            detail: "detached".into(),
            actor: None,
        };
        assert!(TracingAuditSink.record(&event).is_ok());
    }
}
