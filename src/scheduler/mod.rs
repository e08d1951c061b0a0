//! Schedule orchestration — one timer task per stage, fan-in merged into a
//! single readiness-gated stream.
//!
//! The orchestrator compiles every stage of a [`StressPlan`] up front (the
//! fail-fast point for configuration errors), waits for the provider
//! readiness gate, then spawns the per-stage timer tasks. Their event
//! sequences are merged as a concurrent union: every stage offsets its own
//! start by its own delay, and no stage is sequenced relative to another.
//!
//! Failures stay scoped: a stage that cannot resolve or initialize its
//! scenario provider terminates with a single `Err` item on the merged
//! stream, and everything else keeps running.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};
use typed_builder::TypedBuilder;

use crate::error::{ConfigError, StageError};
use crate::plan::StressPlan;
use crate::readiness::ProviderTracker;
use crate::registry::ScenarioRegistry;
use crate::scenario::{Scenario, ScenarioContext};

pub(crate) mod actions;
pub(crate) mod stage;

use stage::CompiledStage;

/// One scheduled scenario invocation: a fresh, fully configured instance
/// plus the labels identifying where in the plan it came from. The caller
/// owns the instance and is responsible for starting and stopping it.
pub struct ScheduledScenario {
    pub stage: Arc<str>,
    pub scenario_name: Arc<str>,
    pub interval_id: Arc<str>,
    pub scenario: Box<dyn Scenario>,
    /// Action arrivals scheduled for this instance. Ends immediately when
    /// the stage defines no actions.
    pub actions: ActionStream,
}

impl fmt::Debug for ScheduledScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledScenario")
            .field("stage", &self.stage)
            .field("scenario_name", &self.scenario_name)
            .field("interval_id", &self.interval_id)
            .finish_non_exhaustive()
    }
}

/// Item of the merged schedule stream. `Err` marks the death of a single
/// stage, never of the run.
pub type ScheduleItem = Result<ScheduledScenario, StageError>;

/// One scheduled action arrival, addressed to a specific scenario instance.
/// The consumer turns it into an executable action via
/// [`Scenario::create_action`].
#[derive(Clone, Debug)]
pub struct ActionInvocation {
    pub action: Arc<str>,
    pub parameters: Arc<HashMap<String, String>>,
    pub interval_id: Arc<str>,
}

/// Per-scenario stream of scheduled action arrivals.
///
/// Ends once every action window of the owning stage has closed (or the run
/// is cancelled). Dropping the stream marks the scenario as unavailable for
/// further action distribution.
pub struct ActionStream {
    rx: mpsc::UnboundedReceiver<ActionInvocation>,
}

impl ActionStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ActionInvocation>) -> Self {
        Self { rx }
    }

    /// The next scheduled action, or `None` once all action windows closed.
    pub async fn recv(&mut self) -> Option<ActionInvocation> {
        self.rx.recv().await
    }
}

impl Stream for ActionStream {
    type Item = ActionInvocation;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Builds and runs the schedule for a stress plan.
#[derive(TypedBuilder)]
pub struct ScenarioScheduler {
    registry: Arc<ScenarioRegistry>,
    tracker: Arc<ProviderTracker>,
    context: ScenarioContext,
}

impl ScenarioScheduler {
    /// Turns the plan into a live stream of scenario invocations.
    ///
    /// Compiles every stage first and fails fast on the first configuration
    /// error — nothing is scheduled in that case. Then waits until every
    /// scenario name the plan references has a registered provider; if the
    /// providers are already there, scheduling starts without delay, and if
    /// one never registers this call never returns (callers needing a
    /// timeout must impose one externally).
    pub async fn observe_scenarios(&self, plan: &StressPlan) -> Result<ScheduleStream, ConfigError> {
        let compiled: Vec<Arc<CompiledStage>> = plan
            .stages
            .iter()
            .map(|stage| CompiledStage::compile(stage).map(Arc::new))
            .collect::<Result<_, _>>()?;

        tracing::info!(
            stages = compiled.len(),
            scenarios = plan.scenario_names().len(),
            "schedule compiled, waiting for scenario providers"
        );
        self.tracker.track_names(plan.scenario_names());
        self.tracker.observe_readiness().await;
        tracing::info!("scenario providers ready, starting stage schedulers");

        // Unbounded on purpose: a slow consumer must never skew the timers.
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        for stage in compiled {
            tokio::spawn(stage::run_stage(
                stage,
                self.context.clone(),
                self.registry.clone(),
                tx.clone(),
                shutdown_rx.clone(),
            ));
        }
        Ok(ScheduleStream {
            rx,
            shutdown: shutdown_tx,
        })
    }
}

/// The merged, readiness-gated event stream of a scheduling run.
///
/// Ends (`None`) once every stage has closed its window, hit its scenarios
/// limit, or failed. Dropping the stream cancels the run.
#[derive(Debug)]
pub struct ScheduleStream {
    rx: mpsc::UnboundedReceiver<ScheduleItem>,
    shutdown: watch::Sender<bool>,
}

impl ScheduleStream {
    /// The next scheduled scenario, or `None` once the run is over.
    pub async fn recv(&mut self) -> Option<ScheduleItem> {
        self.rx.recv().await
    }

    /// Cancels the run: every stage's timers stop immediately. Scenario
    /// instances already handed out are not touched.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Stream for ScheduleStream {
    type Item = ScheduleItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
