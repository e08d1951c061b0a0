//! The stress plan data model.
//!
//! A plan is produced once at startup by an external configuration loader
//! (YAML, DSL, hand-built in code) and is read-only for the lifetime of the
//! run. Field names follow the camelCase convention of the configuration
//! format, durations are human-readable strings (`"500ms"`, `"10s"`,
//! `"5min"`) parsed with [`humantime`].

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::ConfigError;
use crate::scheduler::stage::CompiledStage;

/// An ordered set of stages. Stages are scheduled concurrently; the order
/// only matters for reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StressPlan {
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl StressPlan {
    /// The distinct scenario names this plan references, i.e. the providers
    /// that must be registered before scheduling can start.
    pub fn scenario_names(&self) -> BTreeSet<&str> {
        self.stages
            .iter()
            .map(|stage| stage.scenario_name.as_str())
            .collect()
    }

    /// Checks every stage against the configuration invariants (parseable
    /// durations, positive rates, usable ramp step) without scheduling
    /// anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for stage in &self.stages {
            CompiledStage::compile(stage)?;
        }
        Ok(())
    }
}

/// One phase of a stress plan with its own timing and rate.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Stage label; not required to be unique.
    #[builder(setter(into))]
    pub name: String,

    /// Key into the scenario provider registry.
    #[builder(setter(into))]
    pub scenario_name: String,

    /// Delay before the stage starts emitting, duration string. Defaults to
    /// no delay.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub stage_delay: Option<String>,

    /// Emission window length, duration string. The stage stops
    /// `stage_delay + stage_duration` after scheduling starts.
    #[builder(setter(into))]
    pub stage_duration: String,

    /// Rate and ramp definition applied when no explicit arrival intervals
    /// are configured.
    #[serde(flatten)]
    #[builder(default)]
    pub arrival: ArrivalDefinition,

    /// Free-form parameters applied to every scenario instance the stage
    /// emits. Opaque to the engine.
    #[serde(default)]
    #[builder(default)]
    pub scenario_parameters: HashMap<String, String>,

    /// Free-form parameters handed to the provider at initialization. Opaque
    /// to the engine.
    #[serde(default)]
    #[builder(default)]
    pub scenario_provider_parameters: HashMap<String, String>,

    /// Caps the total number of scenarios the stage may emit.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub scenarios_limit: Option<u64>,

    /// Actions scheduled on top of the stage's scenarios, each with its own
    /// arrival definition and window.
    #[serde(default)]
    #[builder(default)]
    pub actions: Vec<ActionDefinition>,

    /// Independently timed arrival windows. When non-empty they replace the
    /// stage-level arrival definition and run concurrently within the stage.
    #[serde(default)]
    #[builder(default)]
    pub arrival_intervals: Vec<ArrivalInterval>,
}

/// Rate definition shared by stages and arrival intervals.
///
/// Ramping is active iff `ramp_arrival`, `ramp_duration` and one of
/// `ramp_arrival_rate` / `ramp_arrival_period` are all present; partial ramp
/// configuration degrades to a constant `arrival_rate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalDefinition {
    /// Scenario invocations per second. Defaults to 1.0; must be positive.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub arrival_rate: Option<f64>,

    /// Target arrival rate a ramp converges to.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub ramp_arrival: Option<f64>,

    /// How many rate adjustments per second the ramp performs. Takes
    /// priority over `ramp_arrival_period` when both are set.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub ramp_arrival_rate: Option<f64>,

    /// Interval between rate adjustments, duration string. Convenience
    /// alternative to `ramp_arrival_rate`.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub ramp_arrival_period: Option<String>,

    /// Total ramp window, duration string.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub ramp_duration: Option<String>,

    /// Model arrivals as a Poisson process with exponentially distributed
    /// inter-arrival times instead of a fixed period.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub poisson_arrival: Option<bool>,

    /// Upper bound for the random factor in the Poisson formula; values
    /// below 1.0 stretch the intervals between arrivals. The wire key is
    /// `poissonMinRandom` for configuration compatibility.
    #[serde(default, rename = "poissonMinRandom", alias = "poissonMaxRandom")]
    #[builder(default, setter(strip_option))]
    pub poisson_max_random: Option<f64>,

    /// Emit each arrival at a uniformly random offset within its rate period
    /// instead of at the period boundary.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub randomize_arrival: Option<bool>,
}

/// An action scheduled on top of a stage's running scenarios, with its own
/// arrival definition and window (both measured from the moment the owning
/// scenario — or, for distributed actions, the stage's first scenario — is
/// scheduled).
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    /// Action name, passed through to `Scenario::create_action`.
    #[builder(setter(into))]
    pub name: String,

    /// Free-form parameters for the action. Opaque to the engine.
    #[serde(default)]
    #[builder(default)]
    pub action_parameters: HashMap<String, String>,

    /// When set, arrivals are shared across every live scenario of the stage
    /// and each one is dispatched to a single scenario picked by the mode.
    /// When absent, every scheduled scenario gets its own arrival timers.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub distribution_mode: Option<DistributionMode>,

    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub delay: Option<String>,

    #[builder(setter(into))]
    pub duration: String,

    #[serde(flatten)]
    #[builder(default)]
    pub arrival: ArrivalDefinition,

    #[serde(default)]
    #[builder(default)]
    pub arrival_intervals: Vec<ArrivalInterval>,
}

/// How a distributed action's arrivals are spread over the stage's live
/// scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionMode {
    /// Each arrival goes to the next live scenario in rotation.
    RoundRobin,
    /// Each arrival goes to a uniformly random live scenario.
    Random,
    /// The action is disabled: no arrivals are scheduled for it.
    None,
}

/// A named arrival window with its own delay, duration and rate definition.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalInterval {
    /// Identifier passed to scenarios scheduled within this window.
    #[builder(setter(into))]
    pub id: String,

    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub delay: Option<String>,

    #[builder(setter(into))]
    pub duration: String,

    #[serde(flatten)]
    #[builder(default)]
    pub arrival: ArrivalDefinition,
}
