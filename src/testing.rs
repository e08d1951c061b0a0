//! Shared test doubles: a provider/scenario pair that records how the
//! engine drives it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::BoxError;
use crate::scenario::{
    MetricsSink, RequestExecutor, RuntimeService, Scenario, ScenarioAction, ScenarioContext,
    ScenarioProvider,
};

struct NoopServices;

impl MetricsSink for NoopServices {}
impl RequestExecutor for NoopServices {}
impl RuntimeService for NoopServices {}

pub(crate) fn test_context() -> ScenarioContext {
    ScenarioContext {
        metrics: Arc::new(NoopServices),
        request_executor: Arc::new(NoopServices),
        runtime: Arc::new(NoopServices),
    }
}

/// Configuration the engine applied to a scenario instance before handing
/// it out.
#[derive(Debug, Default, Clone)]
pub(crate) struct AppliedConfig {
    pub parameters: HashMap<String, String>,
    pub interval_id: Option<String>,
}

struct RecordedScenario {
    config: AppliedConfig,
    started: Arc<Mutex<Vec<AppliedConfig>>>,
    actions_run: Arc<Mutex<Vec<(String, String)>>>,
}

struct RecordedAction {
    action: String,
    interval_id: String,
    runs: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScenarioAction for RecordedAction {
    fn run(&mut self) {
        self.runs
            .lock()
            .unwrap()
            .push((self.action.clone(), self.interval_id.clone()));
    }
}

impl Scenario for RecordedScenario {
    fn start(&mut self) {
        self.started
            .lock()
            .unwrap()
            .push(self.config.clone());
    }

    fn stop(&mut self) {}

    fn with_parameters(
        mut self: Box<Self>,
        parameters: &HashMap<String, String>,
    ) -> Box<dyn Scenario> {
        self.config.parameters = parameters.clone();
        self
    }

    fn with_arrival_interval(mut self: Box<Self>, interval_id: &str) -> Box<dyn Scenario> {
        self.config.interval_id = Some(interval_id.to_string());
        self
    }

    fn create_action(
        &mut self,
        action: &str,
        _parameters: &HashMap<String, String>,
        interval_id: &str,
    ) -> Box<dyn ScenarioAction> {
        Box::new(RecordedAction {
            action: action.to_string(),
            interval_id: interval_id.to_string(),
            runs: self.actions_run.clone(),
        })
    }
}

/// Counters observing a [`TestProvider`] from the outside.
#[derive(Clone)]
pub(crate) struct Probe {
    pub instances: Arc<AtomicUsize>,
    pub init_calls: Arc<AtomicUsize>,
    /// Configs of every instance whose `start` was called.
    pub started: Arc<Mutex<Vec<AppliedConfig>>>,
    /// `(action, interval_id)` of every action whose `run` was called.
    pub actions_run: Arc<Mutex<Vec<(String, String)>>>,
}

pub(crate) struct TestProvider {
    fail_init: bool,
    probe: Probe,
}

impl TestProvider {
    pub(crate) fn ok() -> (Arc<dyn ScenarioProvider>, Probe) {
        Self::build(false)
    }

    pub(crate) fn failing_init() -> (Arc<dyn ScenarioProvider>, Probe) {
        Self::build(true)
    }

    fn build(fail_init: bool) -> (Arc<dyn ScenarioProvider>, Probe) {
        let probe = Probe {
            instances: Arc::new(AtomicUsize::new(0)),
            init_calls: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(Mutex::new(Vec::new())),
            actions_run: Arc::new(Mutex::new(Vec::new())),
        };
        let provider = Arc::new(TestProvider {
            fail_init,
            probe: probe.clone(),
        });
        (provider, probe)
    }
}

#[async_trait]
impl ScenarioProvider for TestProvider {
    async fn initialize(
        &self,
        _context: &ScenarioContext,
        _parameters: &HashMap<String, String>,
    ) -> Result<(), BoxError> {
        self.probe.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err("provider initialization refused".into());
        }
        Ok(())
    }

    fn get(&self) -> Box<dyn Scenario> {
        self.probe.instances.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordedScenario {
            config: AppliedConfig::default(),
            started: self.probe.started.clone(),
            actions_run: self.probe.actions_run.clone(),
        })
    }
}
