use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::scenario::ScenarioProvider;

/// Shared provider registry, keyed by scenario name.
///
/// All concurrently running stages resolve providers against the same
/// registry, so lookups only take a read lock. Re-registering a name replaces
/// the previous provider; stages that already resolved it keep their handle.
#[derive(Default)]
pub struct ScenarioRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ScenarioProvider>>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, scenario_name: impl Into<String>, provider: Arc<dyn ScenarioProvider>) {
        let name = scenario_name.into();
        tracing::debug!(scenario = %name, "registering scenario provider");
        self.providers
            .write()
            .expect("scenario registry lock poisoned")
            .insert(name, provider);
    }

    pub fn lookup(&self, scenario_name: &str) -> Option<Arc<dyn ScenarioProvider>> {
        self.providers
            .read()
            .expect("scenario registry lock poisoned")
            .get(scenario_name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::TestProvider;

    #[test]
    fn lookup_returns_registered_provider() {
        let registry = ScenarioRegistry::new();
        let (provider, _) = TestProvider::ok();
        registry.register("checkout", provider);
        assert!(registry.lookup("checkout").is_some());
        assert!(registry.lookup("browse").is_none());
    }

    #[test]
    fn re_registration_replaces_the_provider() {
        let registry = ScenarioRegistry::new();
        let (old, old_probe) = TestProvider::ok();
        let (new, new_probe) = TestProvider::ok();
        registry.register("checkout", old);
        registry.register("checkout", new);

        registry.lookup("checkout").unwrap().get();
        assert_eq!(old_probe.instances.load(Ordering::SeqCst), 0);
        assert_eq!(new_probe.instances.load(Ordering::SeqCst), 1);
    }
}
