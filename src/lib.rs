//! Cadenza — a load-generation scheduling engine.
//!
//! Cadenza turns a declarative stress plan — an ordered set of stages, each
//! with a start delay, duration, target arrival rate and optional rate ramp —
//! into a live, time-accurate stream of "run this scenario now" events. It is
//! a generator of invocations, not an executor: the caller consumes the
//! stream and decides how each scenario instance actually runs.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`StressPlan`] / [`Stage`]: the immutable plan model — timing, rates,
//!   ramps, free-form per-scenario parameters.
//! - [`RampProfile`]: the pure linear rate trajectory a ramping stage walks.
//! - [`ScenarioRegistry`] and [`ProviderTracker`]: the provider registry and
//!   the readiness gate that holds scheduling back until every scenario the
//!   plan references has a registered provider.
//! - [`ScenarioScheduler`]: builds one timer task per stage, merges their
//!   event sequences into a single [`ScheduleStream`], gated on readiness.
//! - [`Scenario`] / [`ScenarioProvider`]: the interface boundary to the code
//!   that executes load.
//! - [`ActionInvocation`] / [`ActionStream`]: action arrivals scheduled on
//!   top of running scenarios, per instance or distributed round-robin or
//!   randomly over a stage's live instances.
//!
//! # Design goals
//!
//! - Stages are independent: each one offsets its start by its own delay and
//!   closes on its own deadline; no stage is sequenced after another, and a
//!   stage failing to resolve its provider never takes the run down with it.
//! - The engine never blocks after readiness: timers fire independently and
//!   dispatch is fire-and-forget.
//! - No backpressure promises: the stream is a generator of events, not a
//!   bounded queue.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use cadenza::{
//!     ArrivalDefinition, ProviderTracker, ScenarioContext, ScenarioRegistry,
//!     ScenarioScheduler, Stage, StressPlan,
//! };
//!
//! # async fn run(context: ScenarioContext, provider: Arc<dyn cadenza::ScenarioProvider>) {
//! let registry = Arc::new(ScenarioRegistry::new());
//! let tracker = Arc::new(ProviderTracker::new(registry.clone()));
//! tracker.register("checkout", provider);
//!
//! let plan = StressPlan {
//!     stages: vec![
//!         Stage::builder()
//!             .name("ramp up")
//!             .scenario_name("checkout")
//!             .stage_duration("10min")
//!             .arrival(
//!                 ArrivalDefinition::builder()
//!                     .arrival_rate(10.0)
//!                     .ramp_arrival(20.0)
//!                     .ramp_arrival_rate(2.0)
//!                     .ramp_duration("10s")
//!                     .build(),
//!             )
//!             .build(),
//!     ],
//! };
//!
//! let scheduler = ScenarioScheduler::builder()
//!     .registry(registry)
//!     .tracker(tracker)
//!     .context(context)
//!     .build();
//!
//! let mut schedule = scheduler.observe_scenarios(&plan).await.unwrap();
//! while let Some(item) = schedule.recv().await {
//!     match item {
//!         Ok(mut event) => event.scenario.start(),
//!         Err(err) => eprintln!("stage failed: {err}"),
//!     }
//! }
//! # }
//! ```

/// Error taxonomy: configuration vs per-stage runtime failures
pub mod error;
/// The immutable stress plan model
pub mod plan;
/// Pure linear rate trajectories for ramping stages
pub mod ramp;
/// Provider readiness gate
pub mod readiness;
/// Shared scenario provider registry
pub mod registry;
/// Interface boundary to scenario execution
pub mod scenario;
/// Stage timers, stream merge and orchestration
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BoxError, ConfigError, StageError};
pub use plan::{
    ActionDefinition, ArrivalDefinition, ArrivalInterval, DistributionMode, Stage, StressPlan,
};
pub use ramp::RampProfile;
pub use readiness::ProviderTracker;
pub use registry::ScenarioRegistry;
pub use scenario::{
    MetricsSink, RequestExecutor, RuntimeService, Scenario, ScenarioAction, ScenarioContext,
    ScenarioProvider,
};
pub use scheduler::{
    ActionInvocation, ActionStream, ScenarioScheduler, ScheduleItem, ScheduleStream,
    ScheduledScenario,
};
