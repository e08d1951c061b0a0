//! The interface boundary between the scheduling engine and the code that
//! actually executes load: scenario instances, the providers that produce
//! them, and the opaque service handles providers are initialized with.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;

/// One unit of executable load-generation work.
///
/// The scheduler hands out freshly produced, configured instances; starting
/// and stopping them is entirely the caller's responsibility. Execution is
/// fire-and-forget from the engine's perspective — instances already
/// dispatched are never cancelled when their stage stops.
pub trait Scenario: Send {
    fn start(&mut self);

    fn stop(&mut self);

    /// Returns this instance configured with the stage's scenario parameters.
    fn with_parameters(self: Box<Self>, parameters: &HashMap<String, String>) -> Box<dyn Scenario>;

    /// Passes the identifier of the arrival interval within which this
    /// instance was scheduled, for scenarios that branch on it.
    fn with_arrival_interval(self: Box<Self>, interval_id: &str) -> Box<dyn Scenario>;

    /// Creates an action instance for one scheduled action arrival. Called by
    /// the consumer of the schedule stream, never by the engine itself.
    fn create_action(
        &mut self,
        action: &str,
        parameters: &HashMap<String, String>,
        interval_id: &str,
    ) -> Box<dyn ScenarioAction>;
}

/// One executable action of a running scenario, produced by
/// [`Scenario::create_action`] in response to a scheduled action arrival.
pub trait ScenarioAction: Send {
    fn run(&mut self);
}

/// Factory for [`Scenario`] instances, keyed by scenario name in the
/// [`ScenarioRegistry`](crate::registry::ScenarioRegistry).
///
/// A stage resolves its provider once, lazily, when it first becomes active;
/// `initialize` may run long-lived setup (sessions, warm-up requests) and is
/// therefore async. `get` is then called once per scheduled arrival.
#[async_trait]
pub trait ScenarioProvider: Send + Sync {
    async fn initialize(
        &self,
        context: &ScenarioContext,
        parameters: &HashMap<String, String>,
    ) -> Result<(), BoxError>;

    fn get(&self) -> Box<dyn Scenario>;
}

/// Metrics sink handle, passed through to providers unchanged.
///
/// The engine never looks inside these service handles; they exist so a
/// single context can carry whatever concrete services the embedding
/// application wires up. Providers hold their own typed references to the
/// same services when they need more than the handle.
pub trait MetricsSink: Send + Sync {}

/// Request execution service handle, passed through to providers unchanged.
pub trait RequestExecutor: Send + Sync {}

/// Runtime service handle (timers, spawning, host facilities), passed through
/// to providers unchanged.
pub trait RuntimeService: Send + Sync {}

/// Shared services handed to every provider at initialization. Cheap to
/// clone; all stages of a run see the same underlying handles.
#[derive(Clone)]
pub struct ScenarioContext {
    pub metrics: Arc<dyn MetricsSink>,
    pub request_executor: Arc<dyn RequestExecutor>,
    pub runtime: Arc<dyn RuntimeService>,
}
