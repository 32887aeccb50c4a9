//! Access controller - recognition event to gate cycle
//!
//! Every event runs Normalizer → gate reservation → registry resolve →
//! gate cycle. The gate is reserved before the registry is touched so a
//! grant is never committed for a gate that cannot open; when the gate is
//! busy the registry is only read, never written.
//!
//! Fail-closed: registry faults deny, actuator faults while opening roll the
//! committed transition back.

use crate::domain::error::{AccessError, GateError, GatePhase};
use crate::domain::policy::{decide, Decision};
use crate::domain::types::{Channel, GateId, Identity, RecognitionEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::audit::{AccessAudit, AccessRecord};
use crate::services::display::DisplayCoordinator;
use crate::services::gate::GateController;
use crate::services::normalizer::Normalizer;
use crate::services::registry::OccupancyRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A completed grant: registry updated and the gate cycled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Granted {
    pub identity: Identity,
    pub decision: Decision,
    pub gate: GateId,
}

pub struct AccessController {
    normalizer: Normalizer,
    registry: Arc<OccupancyRegistry>,
    gates: Arc<GateController>,
    display: Arc<DisplayCoordinator>,
    audit: Option<Arc<AccessAudit>>,
    metrics: Arc<Metrics>,
    entry_gate: GateId,
    exit_gate: GateId,
    message_hold: Duration,
}

impl AccessController {
    pub fn new(
        config: &Config,
        normalizer: Normalizer,
        registry: Arc<OccupancyRegistry>,
        gates: Arc<GateController>,
        display: Arc<DisplayCoordinator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            normalizer,
            registry,
            gates,
            display,
            audit: None,
            metrics,
            entry_gate: config.gate_for(Channel::Entry).id.clone(),
            exit_gate: config.gate_for(Channel::Exit).id.clone(),
            message_hold: Duration::from_millis(config.message_hold_ms()),
        }
    }

    /// Record every processed event to the audit trail
    pub fn with_audit(mut self, audit: Arc<AccessAudit>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn gate_for(&self, channel: Channel) -> &GateId {
        match channel {
            Channel::Entry => &self.entry_gate,
            Channel::Exit => &self.exit_gate,
        }
    }

    /// Process one recognition event end to end
    ///
    /// The event is consumed: rejected input is logged and dropped, never
    /// retried. Latency is measured up to the decision; the gate cycle that
    /// follows a grant is not part of it.
    pub async fn handle(&self, event: RecognitionEvent, channel: Channel) -> Result<Granted, AccessError> {
        let mut decided_at = None;
        let result = self.process(&event, channel, &mut decided_at).await;
        let decided_at = decided_at.unwrap_or_else(Instant::now);
        let latency_us = decided_at.duration_since(event.received_at).as_micros() as u64;
        self.metrics.record_event_processed(latency_us);

        match &result {
            Ok(granted) => {
                self.metrics.record_grant(granted.decision);
                info!(
                    event_id = %event.event_id,
                    identity = %granted.identity,
                    channel = %channel.as_str(),
                    gate = %granted.gate,
                    latency_us = %latency_us,
                    cycle_ms = %decided_at.elapsed().as_millis(),
                    "access_cycle_complete"
                );
            }
            Err(e) => {
                self.metrics.record_access_error(e);
                self.report_error(&event, channel, e).await;
            }
        }

        if let Some(audit) = &self.audit {
            audit.write_record(&self.audit_record(&event, channel, &result, latency_us));
        }

        result
    }

    async fn process(
        &self,
        event: &RecognitionEvent,
        channel: Channel,
        decided_at: &mut Option<Instant>,
    ) -> Result<Granted, AccessError> {
        let identity = self.normalizer.normalize(&event.payload, event.source)?;
        debug!(
            event_id = %event.event_id,
            source = %event.source.as_str(),
            identity = %identity,
            "recognition_normalized"
        );

        let gate_id = self.gate_for(channel).clone();
        let cycle = match self.gates.try_acquire(&gate_id) {
            Ok(cycle) => cycle,
            Err(GateError::Busy(gate)) => {
                // Still report the real denial; only a would-be grant is a collision
                let status = self.registry.lookup(&identity).map_err(|source| {
                    AccessError::StorageUnavailable { identity: identity.clone(), source }
                })?;
                return match decide(channel, status) {
                    decision if decision.is_grant() => Err(AccessError::GateBusy { identity, gate }),
                    decision => Err(denial(identity, decision)),
                };
            }
            Err(source) => return Err(AccessError::ActuatorFault { identity, source }),
        };

        let resolution = self
            .registry
            .resolve(&identity, |status| decide(channel, status))
            .map_err(|source| AccessError::StorageUnavailable { identity: identity.clone(), source })?;

        let decision = resolution.decision;
        if !decision.is_grant() {
            return Err(denial(identity, decision));
        }

        *decided_at = Some(Instant::now());
        info!(
            event_id = %event.event_id,
            identity = %identity,
            decision = %decision.as_str(),
            gate = %gate_id,
            "access_granted"
        );
        self.show_message(&format!("Welcome\n{identity}")).await;

        match cycle.run().await {
            Ok(()) => Ok(Granted { identity, decision, gate: gate_id }),
            Err(source) => {
                if let GateError::ActuatorFault { phase: GatePhase::Opening, .. } = &source {
                    self.roll_back(&identity, decision, resolution.previous);
                }
                Err(AccessError::ActuatorFault { identity, source })
            }
        }
    }

    /// Undo a committed transition for a vehicle that never passed the gate
    fn roll_back(&self, identity: &Identity, decision: Decision, previous: Option<bool>) {
        let (Some(target), Some(previous)) = (decision.target_status(), previous) else {
            return;
        };
        match self.registry.compare_and_set(identity, Some(target), previous) {
            Ok(true) => warn!(identity = %identity, restored = previous, "registry_grant_rolled_back"),
            Ok(false) => warn!(identity = %identity, "registry_rollback_skipped_record_moved"),
            Err(e) => error!(identity = %identity, error = %e, "registry_rollback_failed"),
        }
    }

    async fn report_error(&self, event: &RecognitionEvent, channel: Channel, e: &AccessError) {
        match e {
            AccessError::FormatRejected(reason) => {
                debug!(
                    event_id = %event.event_id,
                    source = %event.source.as_str(),
                    reason = %reason,
                    "recognition_rejected"
                );
                return;
            }
            AccessError::UnknownIdentity(identity) => {
                info!(event_id = %event.event_id, identity = %identity, channel = %channel.as_str(), "access_denied_unknown");
            }
            AccessError::PolicyDenied { identity, decision } => {
                info!(
                    event_id = %event.event_id,
                    identity = %identity,
                    channel = %channel.as_str(),
                    decision = %decision.as_str(),
                    "access_denied"
                );
            }
            AccessError::StorageUnavailable { identity, source } => {
                error!(
                    event_id = %event.event_id,
                    identity = %identity,
                    decision = %Decision::DenyUnknown.as_str(),
                    error = %source,
                    "registry_storage_unavailable"
                );
            }
            AccessError::GateBusy { identity, gate } => {
                warn!(event_id = %event.event_id, identity = %identity, gate = %gate, "gate_busy");
            }
            AccessError::ActuatorFault { identity, source } => {
                error!(event_id = %event.event_id, identity = %identity, error = %source, "gate_actuator_fault");
            }
        }

        let message = match e {
            AccessError::ActuatorFault { .. } | AccessError::StorageUnavailable { .. } => "Out of service",
            AccessError::GateBusy { .. } => "Please wait",
            _ => "Access denied",
        };
        self.show_message(message).await;
    }

    async fn show_message(&self, text: &str) {
        if let Err(e) = self.display.show_message(text, self.message_hold).await {
            warn!(error = %e, "display_message_failed");
        }
    }

    fn audit_record(
        &self,
        event: &RecognitionEvent,
        channel: Channel,
        result: &Result<Granted, AccessError>,
        latency_us: u64,
    ) -> AccessRecord {
        let (identity, outcome, detail) = match result {
            Ok(granted) => (Some(granted.identity.to_string()), granted.decision.as_str(), None),
            Err(e) => (e.identity().map(Identity::to_string), e.as_label(), Some(e.to_string())),
        };
        AccessRecord {
            event_id: event.event_id.clone(),
            received_at_ms: event.received_at_ms,
            source: event.source.as_str(),
            channel: channel.as_str(),
            identity,
            outcome,
            detail,
            latency_us,
        }
    }
}

fn denial(identity: Identity, decision: Decision) -> AccessError {
    match decision {
        Decision::DenyUnknown => AccessError::UnknownIdentity(identity),
        decision => AccessError::PolicyDenied { identity, decision },
    }
}
