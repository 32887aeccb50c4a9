//! Gate control - open, dwell, close cycles per physical gate
//!
//! Each gate has its own transition lock. A cycle holds it from the open
//! command until the close command completes; a second request for the same
//! gate fails fast with `GateError::Busy` instead of queuing. Gates never
//! share a lock, so entry and exit cycle independently.

use crate::domain::error::{ActuatorError, GateError, GatePhase};
use crate::domain::types::{GateId, GatePosition};
use crate::infra::config::GateSettings;
use crate::infra::metrics::Metrics;
use crate::io::drivers::ActuatorDriver;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Observable state of one gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateState {
    pub id: GateId,
    pub position: GatePosition,
    pub last_command_at: Option<Instant>,
}

struct Gate {
    settings: GateSettings,
    transition: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<GateState>,
}

impl Gate {
    fn new(settings: GateSettings) -> Self {
        let state =
            GateState { id: settings.id.clone(), position: GatePosition::Closed, last_command_at: None };
        Self { settings, transition: Arc::new(tokio::sync::Mutex::new(())), state: Mutex::new(state) }
    }

    async fn command(
        &self,
        actuator: &dyn ActuatorDriver,
        position: GatePosition,
    ) -> Result<(), ActuatorError> {
        let value = match position {
            GatePosition::Open => self.settings.open_position,
            GatePosition::Closed => self.settings.closed_position,
        };
        let result = actuator.set_position(&self.settings.id, value).await;

        let mut state = self.state.lock();
        state.last_command_at = Some(Instant::now());
        if result.is_ok() {
            state.position = position;
        }
        result
    }
}

pub struct GateController {
    gates: FxHashMap<GateId, Arc<Gate>>,
    actuator: Arc<dyn ActuatorDriver>,
    dwell: Duration,
    metrics: Arc<Metrics>,
}

impl GateController {
    pub fn new(
        gates: &[GateSettings],
        dwell: Duration,
        actuator: Arc<dyn ActuatorDriver>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let gates = gates
            .iter()
            .map(|settings| (settings.id.clone(), Arc::new(Gate::new(settings.clone()))))
            .collect();
        Self { gates, actuator, dwell, metrics }
    }

    /// Reserve a gate for one cycle without touching the actuator
    ///
    /// Fails with `Busy` if the gate is mid-transition.
    pub fn try_acquire(&self, gate_id: &GateId) -> Result<GateCycle, GateError> {
        let gate = self.gates.get(gate_id).ok_or_else(|| GateError::UnknownGate(gate_id.clone()))?;
        let permit = gate
            .transition
            .clone()
            .try_lock_owned()
            .map_err(|_| GateError::Busy(gate_id.clone()))?;

        Ok(GateCycle {
            gate: gate.clone(),
            _permit: permit,
            actuator: self.actuator.clone(),
            dwell: self.dwell,
            metrics: self.metrics.clone(),
        })
    }

    /// Open a gate, hold it for the dwell duration, then close it
    pub async fn open(&self, gate_id: &GateId) -> Result<(), GateError> {
        self.try_acquire(gate_id)?.run().await
    }

    pub fn state(&self, gate_id: &GateId) -> Option<GateState> {
        self.gates.get(gate_id).map(|gate| gate.state.lock().clone())
    }

    /// Command every gate to its closed position
    ///
    /// Used at startup and shutdown. Ignores transition locks: a cycle that was
    /// cancelled mid-dwell must not leave its gate open.
    pub async fn close_all(&self) {
        for gate in self.gates.values() {
            match gate.command(self.actuator.as_ref(), GatePosition::Closed).await {
                Ok(()) => info!(gate = %gate.settings.id, "gate_closed_safe"),
                Err(e) => error!(gate = %gate.settings.id, error = %e, "gate_close_safe_failed"),
            }
        }
    }
}

/// Exclusive reservation of one gate for a single open/dwell/close cycle
///
/// Dropping it without running releases the gate untouched.
pub struct GateCycle {
    gate: Arc<Gate>,
    _permit: OwnedMutexGuard<()>,
    actuator: Arc<dyn ActuatorDriver>,
    dwell: Duration,
    metrics: Arc<Metrics>,
}

impl GateCycle {
    pub fn gate_id(&self) -> &GateId {
        &self.gate.settings.id
    }

    pub async fn run(self) -> Result<(), GateError> {
        let gate_id = self.gate_id().clone();
        let start = Instant::now();

        if let Err(source) = self.gate.command(self.actuator.as_ref(), GatePosition::Open).await {
            error!(gate = %gate_id, error = %source, "gate_open_fault");
            self.force_closed().await;
            return Err(GateError::ActuatorFault { phase: GatePhase::Opening, source });
        }
        info!(gate = %gate_id, dwell_ms = %self.dwell.as_millis(), "gate_opened");

        tokio::time::sleep(self.dwell).await;

        if let Err(source) = self.gate.command(self.actuator.as_ref(), GatePosition::Closed).await {
            error!(gate = %gate_id, error = %source, "gate_close_fault");
            self.force_closed().await;
            return Err(GateError::ActuatorFault { phase: GatePhase::Closing, source });
        }

        self.metrics.record_gate_cycle();
        info!(gate = %gate_id, cycle_ms = %start.elapsed().as_millis(), "gate_closed");
        Ok(())
    }

    /// One more attempt at the closed position after a fault
    async fn force_closed(&self) {
        if let Err(e) = self.gate.command(self.actuator.as_ref(), GatePosition::Closed).await {
            warn!(gate = %self.gate_id(), error = %e, "gate_force_close_failed");
        }
    }
}
