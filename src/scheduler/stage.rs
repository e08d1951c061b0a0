//! Per-stage scheduling: compiling a [`Stage`] into timed arrival windows
//! and driving those windows as timer tasks.
//!
//! A stage moves through three states: pending (before its delay elapses),
//! active (emitting arrivals) and stopped. The hard stop is always the outer
//! window — `stage_delay + stage_duration` measured from schedule start — or
//! cancellation of the whole run. Within the window, arrivals tick at a
//! constant rate, along a ramp trajectory, or with Poisson/randomized
//! jitter, depending on the compiled arrival definition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

use crate::error::{ConfigError, StageError};
use crate::plan::{ActionDefinition, ArrivalDefinition, DistributionMode, Stage};
use crate::ramp::RampProfile;
use crate::registry::ScenarioRegistry;
use crate::scenario::{ScenarioContext, ScenarioProvider};

use super::actions::{ActionRoster, Strategy};
use super::{ActionInvocation, ActionStream, ScheduleItem, ScheduledScenario};

// Default arrival interval identifiers, used when an interval has no
// explicit id of its own.
const CONSTANT_RATE_ID: &str = "ConstantArrivalRate";
const CONSTANT_POISSON_ID: &str = "ConstantPoissonArrival";
const CONSTANT_RANDOMIZED_ID: &str = "ConstantRandomizedArrival";
const RAMPING_RATE_ID: &str = "RampingArrivalRate";
const RAMPING_POISSON_ID: &str = "RampingPoissonArrival";
const RAMPING_RANDOMIZED_ID: &str = "RampingRandomizedArrival";

#[derive(Clone, Debug)]
pub(crate) enum RateProfile {
    Constant(f64),
    Ramping(RampProfile),
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Jitter {
    None,
    Poisson { max_random: f64 },
    Uniform,
}

/// One timed emission window of a stage: its own delay, duration and rate.
/// Stages without explicit arrival intervals compile to exactly one of
/// these.
#[derive(Clone, Debug)]
pub(crate) struct ArrivalSchedule {
    pub id: Arc<str>,
    pub delay: Duration,
    pub duration: Duration,
    pub rate: RateProfile,
    pub jitter: Jitter,
}

/// An action with its window parsed and its arrival rates validated.
/// `strategy` is `None` for per-scenario actions; actions configured with
/// an explicit `NONE` distribution mode are dropped during compilation.
#[derive(Clone, Debug)]
pub(crate) struct CompiledAction {
    pub name: Arc<str>,
    pub parameters: Arc<HashMap<String, String>>,
    pub strategy: Option<Strategy>,
    pub arrivals: Vec<ArrivalSchedule>,
}

/// A stage with every duration parsed and every rate validated. Construction
/// is the fail-fast point for configuration errors: no timer exists yet.
#[derive(Clone, Debug)]
pub(crate) struct CompiledStage {
    pub name: Arc<str>,
    pub scenario_name: Arc<str>,
    pub scenario_parameters: HashMap<String, String>,
    pub provider_parameters: HashMap<String, String>,
    pub limit: Option<u64>,
    pub arrivals: Vec<ArrivalSchedule>,
    pub actions: Vec<CompiledAction>,
}

impl CompiledStage {
    pub(crate) fn compile(stage: &Stage) -> Result<Self, ConfigError> {
        let stage_delay = parse_duration(&stage.name, stage.stage_delay.as_deref().unwrap_or("0s"))?;
        let stage_duration = parse_duration(&stage.name, &stage.stage_duration)?;

        let arrivals = if stage.arrival_intervals.is_empty() {
            vec![compile_arrival(
                &stage.name,
                &stage.arrival,
                stage_delay,
                stage_duration,
                None,
            )?]
        } else {
            stage
                .arrival_intervals
                .iter()
                .map(|interval| {
                    let delay =
                        parse_duration(&stage.name, interval.delay.as_deref().unwrap_or("0s"))?;
                    let duration = parse_duration(&stage.name, &interval.duration)?;
                    compile_arrival(&stage.name, &interval.arrival, delay, duration, Some(&interval.id))
                })
                .collect::<Result<_, _>>()?
        };

        let actions = stage
            .actions
            .iter()
            .filter_map(|action| compile_action(&stage.name, action).transpose())
            .collect::<Result<_, _>>()?;

        Ok(Self {
            name: stage.name.as_str().into(),
            scenario_name: stage.scenario_name.as_str().into(),
            scenario_parameters: stage.scenario_parameters.clone(),
            provider_parameters: stage.scenario_provider_parameters.clone(),
            limit: stage.scenarios_limit,
            arrivals,
            actions,
        })
    }
}

/// Compiles one action of a stage. Returns `None` for actions explicitly
/// disabled with the `NONE` distribution mode (their configuration is still
/// validated).
fn compile_action(
    stage: &str,
    action: &ActionDefinition,
) -> Result<Option<CompiledAction>, ConfigError> {
    let delay = parse_duration(stage, action.delay.as_deref().unwrap_or("0s"))?;
    let duration = parse_duration(stage, &action.duration)?;

    let arrivals = if action.arrival_intervals.is_empty() {
        vec![compile_arrival(stage, &action.arrival, delay, duration, None)?]
    } else {
        action
            .arrival_intervals
            .iter()
            .map(|interval| {
                let delay = parse_duration(stage, interval.delay.as_deref().unwrap_or("0s"))?;
                let duration = parse_duration(stage, &interval.duration)?;
                compile_arrival(stage, &interval.arrival, delay, duration, Some(&interval.id))
            })
            .collect::<Result<_, _>>()?
    };

    let strategy = match action.distribution_mode {
        Some(DistributionMode::RoundRobin) => Some(Strategy::RoundRobin),
        Some(DistributionMode::Random) => Some(Strategy::Random),
        Some(DistributionMode::None) => {
            tracing::debug!(stage, action = %action.name, "action disabled by distribution mode");
            return Ok(None);
        }
        None => None,
    };

    Ok(Some(CompiledAction {
        name: action.name.as_str().into(),
        parameters: Arc::new(action.action_parameters.clone()),
        strategy,
        arrivals,
    }))
}

fn compile_arrival(
    stage: &str,
    definition: &ArrivalDefinition,
    delay: Duration,
    duration: Duration,
    custom_id: Option<&str>,
) -> Result<ArrivalSchedule, ConfigError> {
    let base_rate = definition.arrival_rate.unwrap_or(1.0);
    check_rate(stage, base_rate)?;

    let jitter = if definition.poisson_arrival == Some(true) {
        Jitter::Poisson {
            max_random: definition.poisson_max_random.unwrap_or(1.0),
        }
    } else if definition.randomize_arrival == Some(true) {
        Jitter::Uniform
    } else {
        Jitter::None
    };

    let ramp = compile_ramp(stage, definition, base_rate)?;
    let id = custom_id.unwrap_or(match (&ramp, jitter) {
        (None, Jitter::None) => CONSTANT_RATE_ID,
        (None, Jitter::Poisson { .. }) => CONSTANT_POISSON_ID,
        (None, Jitter::Uniform) => CONSTANT_RANDOMIZED_ID,
        (Some(_), Jitter::None) => RAMPING_RATE_ID,
        (Some(_), Jitter::Poisson { .. }) => RAMPING_POISSON_ID,
        (Some(_), Jitter::Uniform) => RAMPING_RANDOMIZED_ID,
    });

    Ok(ArrivalSchedule {
        id: id.into(),
        delay,
        duration,
        rate: match ramp {
            Some(profile) => RateProfile::Ramping(profile),
            None => RateProfile::Constant(base_rate),
        },
        jitter,
    })
}

/// Ramping requires the target, the window, and one of rate/period; with any
/// of them missing the arrival runs at the constant base rate.
fn compile_ramp(
    stage: &str,
    definition: &ArrivalDefinition,
    base_rate: f64,
) -> Result<Option<RampProfile>, ConfigError> {
    let (Some(target), Some(ramp_duration)) =
        (definition.ramp_arrival, definition.ramp_duration.as_deref())
    else {
        warn_on_partial_ramp(stage, definition);
        return Ok(None);
    };
    // The ramp rate has priority over the period form.
    let step_interval = match (&definition.ramp_arrival_rate, &definition.ramp_arrival_period) {
        (Some(rate), _) => {
            check_rate(stage, *rate)?;
            period_of(*rate)
        }
        (None, Some(period)) => parse_duration(stage, period)?,
        (None, None) => {
            warn_on_partial_ramp(stage, definition);
            return Ok(None);
        }
    };
    check_rate(stage, target)?;
    if step_interval.is_zero() {
        return Err(ConfigError::ZeroRampStep {
            stage: stage.to_string(),
        });
    }

    let ramp_duration = parse_duration(stage, ramp_duration)?;
    let steps = ramp_duration.as_millis() as u64 / step_interval.as_millis() as u64;
    if steps == 0 {
        tracing::warn!(
            stage,
            "ramp window shorter than one ramp step, the stage will emit no arrivals"
        );
    }
    Ok(Some(RampProfile {
        start: base_rate,
        target,
        step_interval,
        steps,
    }))
}

fn warn_on_partial_ramp(stage: &str, definition: &ArrivalDefinition) {
    let any_ramp_field = definition.ramp_arrival.is_some()
        || definition.ramp_arrival_rate.is_some()
        || definition.ramp_arrival_period.is_some()
        || definition.ramp_duration.is_some();
    if any_ramp_field {
        tracing::warn!(stage, "incomplete ramp configuration, running at constant rate");
    }
}

fn parse_duration(stage: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
        stage: stage.to_string(),
        value: value.to_string(),
        source,
    })
}

fn check_rate(stage: &str, rate: f64) -> Result<(), ConfigError> {
    if rate > 0.0 && rate.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate {
            stage: stage.to_string(),
            rate,
        })
    }
}

/// Emission period for a rate, truncated to whole milliseconds and clamped
/// so rates above 1000/s still produce a non-zero timer period.
fn period_of(rate: f64) -> Duration {
    Duration::from_millis(((1000.0 / rate) as u64).max(1))
}

/// Inter-arrival time of a Poisson process: `-1/λ · ln(max_random · U) · 1000`
/// milliseconds, `U` uniform in `[0, 1)`.
fn next_poisson_arrival(rate: f64, max_random: f64) -> Duration {
    let millis = (-1.0 / rate) * (max_random * rand::random::<f64>()).ln() * 1000.0;
    // ln(0) pushes this to +inf; the saturating cast turns that into a sleep
    // far beyond any stage window.
    Duration::from_millis(millis as u64)
}

/// Drives one stage: spawns a ticker per arrival schedule, resolves the
/// scenario provider lazily on the first arrival, and forwards configured
/// scenario instances into the merged channel until every window closes, the
/// scenarios limit is hit, or the run shuts down.
pub(crate) async fn run_stage(
    stage: Arc<CompiledStage>,
    context: ScenarioContext,
    registry: Arc<ScenarioRegistry>,
    tx: mpsc::UnboundedSender<ScheduleItem>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (arrival_tx, mut arrival_rx) = mpsc::unbounded_channel::<Arc<str>>();
    let mut tickers = Vec::with_capacity(stage.arrivals.len());
    for schedule in stage.arrivals.iter().cloned() {
        tickers.push(tokio::spawn(run_arrival(schedule, arrival_tx.clone())));
    }
    drop(arrival_tx);
    tracing::debug!(stage = %stage.name, windows = tickers.len(), "stage schedule started");

    // One roster per distributed action; their shared tickers start with the
    // first scheduled scenario.
    let rosters: Vec<Option<Arc<ActionRoster>>> = stage
        .actions
        .iter()
        .map(|action| action.strategy.map(|strategy| Arc::new(ActionRoster::new(strategy))))
        .collect();

    let action_shutdown = shutdown.clone();
    let dispatch = async {
        let mut provider: Option<Arc<dyn ScenarioProvider>> = None;
        let mut emitted: u64 = 0;
        let mut distributed_started = false;
        while let Some(interval_id) = arrival_rx.recv().await {
            let resolved = match &provider {
                Some(resolved) => resolved.clone(),
                None => match resolve_provider(&stage, &registry, &context).await {
                    Ok(resolved) => {
                        provider = Some(resolved.clone());
                        resolved
                    }
                    Err(err) => {
                        tracing::error!(stage = %stage.name, error = %err, "stage failed");
                        let _ = tx.send(Err(err));
                        return;
                    }
                },
            };

            let scenario = resolved
                .get()
                .with_parameters(&stage.scenario_parameters)
                .with_arrival_interval(&interval_id);

            let (action_tx, action_rx) = mpsc::unbounded_channel();
            for (action, roster) in stage.actions.iter().zip(&rosters) {
                match roster {
                    // Distributed: this scenario joins the shared roster.
                    Some(roster) => roster.add(action_tx.clone()),
                    // Per-scenario: the scenario gets its own arrival timers.
                    None => run_action_pipeline(
                        action.clone(),
                        ActionSink::Scenario(action_tx.clone()),
                        action_shutdown.clone(),
                    ),
                }
            }
            if !distributed_started {
                distributed_started = true;
                for (action, roster) in stage.actions.iter().zip(&rosters) {
                    if let Some(roster) = roster {
                        run_action_pipeline(
                            action.clone(),
                            ActionSink::Distributed(roster.clone()),
                            action_shutdown.clone(),
                        );
                    }
                }
            }

            let event = ScheduledScenario {
                stage: stage.name.clone(),
                scenario_name: stage.scenario_name.clone(),
                interval_id,
                scenario,
                actions: ActionStream::new(action_rx),
            };
            if tx.send(Ok(event)).is_err() {
                // Consumer dropped the schedule stream.
                return;
            }
            emitted += 1;
            if stage.limit.is_some_and(|limit| emitted >= limit) {
                tracing::debug!(stage = %stage.name, emitted, "scenarios limit reached");
                return;
            }
        }
        tracing::debug!(stage = %stage.name, emitted, "stage window closed");
    };

    tokio::select! {
        _ = dispatch => {}
        _ = shutdown.wait_for(|stop| *stop) => {
            tracing::debug!(stage = %stage.name, "stage cancelled");
        }
    }
    for ticker in &tickers {
        ticker.abort();
    }
}

async fn resolve_provider(
    stage: &CompiledStage,
    registry: &ScenarioRegistry,
    context: &ScenarioContext,
) -> Result<Arc<dyn ScenarioProvider>, StageError> {
    let provider =
        registry
            .lookup(&stage.scenario_name)
            .ok_or_else(|| StageError::UnknownScenario {
                stage: stage.name.to_string(),
                scenario: stage.scenario_name.to_string(),
            })?;
    provider
        .initialize(context, &stage.provider_parameters)
        .await
        .map_err(|source| StageError::ProviderInit {
            stage: stage.name.to_string(),
            scenario: stage.scenario_name.to_string(),
            source,
        })?;
    tracing::debug!(stage = %stage.name, scenario = %stage.scenario_name, "provider resolved");
    Ok(provider)
}

/// Where one action pipeline delivers its arrivals.
enum ActionSink {
    /// Straight into one scenario's action stream.
    Scenario(mpsc::UnboundedSender<ActionInvocation>),
    /// Through the stage-wide roster of a distributed action.
    Distributed(Arc<ActionRoster>),
}

impl ActionSink {
    /// Returns `false` once delivery can never succeed again.
    fn deliver(&self, invocation: ActionInvocation) -> bool {
        match self {
            ActionSink::Scenario(tx) => tx.send(invocation).is_ok(),
            ActionSink::Distributed(roster) => {
                roster.dispatch(invocation);
                true
            }
        }
    }
}

/// Spawns the arrival timers of one action and forwards every tick into the
/// sink as an invocation. The pipeline outlives its stage's dispatch loop
/// (action windows may extend past the last scenario arrival) and winds
/// down on its own: when its windows close, when the sink's consumer is
/// gone, or when the run shuts down.
fn run_action_pipeline(
    action: CompiledAction,
    sink: ActionSink,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let (id_tx, mut id_rx) = mpsc::unbounded_channel::<Arc<str>>();
        let tickers: Vec<_> = action
            .arrivals
            .iter()
            .cloned()
            .map(|schedule| tokio::spawn(run_arrival(schedule, id_tx.clone())))
            .collect();
        drop(id_tx);

        let forward = async {
            while let Some(interval_id) = id_rx.recv().await {
                let invocation = ActionInvocation {
                    action: action.name.clone(),
                    parameters: action.parameters.clone(),
                    interval_id,
                };
                if !sink.deliver(invocation) {
                    return;
                }
            }
        };
        tokio::select! {
            _ = forward => {}
            _ = shutdown.wait_for(|stop| *stop) => {}
        }
        for ticker in &tickers {
            ticker.abort();
        }
    });
}

/// Ticks one arrival window. The deadline is `delay + duration` from the
/// moment scheduling starts; ticks landing exactly on a boundary belong to
/// the next window.
async fn run_arrival(schedule: ArrivalSchedule, tx: mpsc::UnboundedSender<Arc<str>>) {
    let deadline = Instant::now() + schedule.delay + schedule.duration;
    time::sleep(schedule.delay).await;

    match schedule.rate {
        RateProfile::Constant(rate) => {
            emit_until(deadline, rate, schedule.jitter, &schedule.id, &tx).await;
        }
        RateProfile::Ramping(profile) => {
            let mut step_end = Instant::now();
            for rate in profile.rates() {
                step_end += profile.step_interval;
                if !emit_until(step_end.min(deadline), rate, schedule.jitter, &schedule.id, &tx)
                    .await
                {
                    return;
                }
                if Instant::now() >= deadline {
                    return;
                }
            }
            // Ramp trajectory exhausted: the stage goes quiet here. There is
            // no fallback to the base rate; the outer window is the only
            // hard stop.
        }
    }
}

/// Emits arrival ticks at `rate` until `until`. Returns `false` once the
/// consumer side is gone.
async fn emit_until(
    until: Instant,
    rate: f64,
    jitter: Jitter,
    id: &Arc<str>,
    tx: &mpsc::UnboundedSender<Arc<str>>,
) -> bool {
    match jitter {
        Jitter::None => {
            let mut ticks = time::interval_at(Instant::now(), period_of(rate));
            loop {
                tokio::select! {
                    biased;
                    _ = time::sleep_until(until) => return true,
                    _ = ticks.tick() => {
                        if tx.send(id.clone()).is_err() {
                            return false;
                        }
                    }
                }
            }
        }
        Jitter::Poisson { max_random } => loop {
            let wait = next_poisson_arrival(rate, max_random);
            tokio::select! {
                biased;
                _ = time::sleep_until(until) => return true,
                _ = time::sleep(wait) => {
                    if tx.send(id.clone()).is_err() {
                        return false;
                    }
                }
            }
        },
        Jitter::Uniform => {
            // One arrival per period, at a random offset inside it.
            let period = period_of(rate);
            let mut window = Instant::now();
            loop {
                let offset = period.mul_f64(rand::random::<f64>());
                tokio::select! {
                    biased;
                    _ = time::sleep_until(until) => return true,
                    _ = time::sleep_until(window + offset) => {
                        if tx.send(id.clone()).is_err() {
                            return false;
                        }
                    }
                }
                window += period;
                tokio::select! {
                    biased;
                    _ = time::sleep_until(until) => return true,
                    _ = time::sleep_until(window) => {}
                }
            }
        }
    }
}
