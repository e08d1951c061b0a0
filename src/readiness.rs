//! Provider readiness gate.
//!
//! A scheduling run must not start before every scenario provider its plan
//! references has been registered. The tracker records the set of required
//! names, funnels registrations into the shared registry, and completes a
//! single-fire readiness signal the first time the pending set becomes empty.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::registry::ScenarioRegistry;
use crate::scenario::ScenarioProvider;

struct Pending {
    names: HashSet<String>,
    /// Registrations only complete the gate once tracking has been activated
    /// with the run's name set.
    tracking: bool,
}

/// Tracks provider registrations for one scheduling run.
///
/// Registration and observation race freely: the pending set lives behind a
/// mutex and the ready signal is a `watch` channel, whose `wait_for` checks
/// the current value before parking, so an observer subscribing between "set
/// became empty" and "signal sent" cannot miss the wake-up. All concurrent
/// observers are released by the same transition; observers subscribing after
/// completion resolve immediately.
pub struct ProviderTracker {
    registry: Arc<ScenarioRegistry>,
    pending: Mutex<Pending>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl ProviderTracker {
    pub fn new(registry: Arc<ScenarioRegistry>) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            registry,
            pending: Mutex::new(Pending {
                names: HashSet::new(),
                tracking: false,
            }),
            ready_tx,
            ready_rx,
        }
    }

    /// Records the scenario names the upcoming run requires and activates
    /// tracking. Names already present in the registry are not considered
    /// pending. An empty outcome completes the gate immediately.
    pub fn track_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pending = self.pending.lock().expect("readiness lock poisoned");
        for name in names {
            let name = name.into();
            if self.registry.lookup(&name).is_none() {
                pending.names.insert(name);
            }
        }
        pending.tracking = true;
        if pending.names.is_empty() {
            tracing::debug!("all scenario providers already registered");
            self.ready_tx.send_replace(true);
        } else {
            tracing::info!(waiting = pending.names.len(), "waiting for scenario providers");
        }
    }

    /// Registers a provider and updates readiness. Names outside the tracked
    /// set (duplicates, scenarios no stage references) still land in the
    /// registry but do not affect the gate.
    pub fn register(&self, scenario_name: impl Into<String>, provider: Arc<dyn ScenarioProvider>) {
        let name = scenario_name.into();
        self.registry.register(name.clone(), provider);
        let mut pending = self.pending.lock().expect("readiness lock poisoned");
        if pending.names.remove(&name) && pending.tracking && pending.names.is_empty() {
            tracing::info!("all scenario providers registered, releasing scheduler");
            self.ready_tx.send_replace(true);
        }
    }

    /// Single-fire completion signal: resolves once every tracked provider
    /// has registered. If a required provider never registers this never
    /// completes; callers needing a timeout must impose one externally.
    pub async fn observe_readiness(&self) {
        let mut ready = self.ready_rx.clone();
        // The sender lives in self, so wait_for can only fail if the tracker
        // is dropped while observing — at which point nobody is listening.
        let _ = ready.wait_for(|ready| *ready).await;
    }
}
