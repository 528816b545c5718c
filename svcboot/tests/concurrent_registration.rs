//! Concurrency tests for late registration.
//!
//! Once bootstrap has finished, factories may be registered from several
//! threads at once. These tests verify the configured conflict action still
//! decides the outcome and that lookups stay consistent meanwhile.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{events, recorders, store};
use serde_json::json;
use svcboot::config::Scope;
use svcboot::service::{Feature, ServiceFactory};
use svcboot::{
    ConflictAction, LifecycleOrchestrator, Service, ServiceDetail, SingletonPolicy, SingletonScope,
};

struct Plugin {
    version: &'static str,
}

impl Service for Plugin {
    fn as_factory(&self) -> Option<&dyn ServiceFactory> {
        Some(self)
    }
}

impl ServiceFactory for Plugin {
    fn service_detail(&self) -> ServiceDetail {
        ServiceDetail::new("plugin", self.version)
    }

    fn supported_features(&self) -> Vec<Feature> {
        vec![Feature::new("plugins")]
    }

    fn is_compatible(&self, version: &str) -> bool {
        !version.is_empty() && version == self.version
    }

    fn create(&self, _configuration: Option<&Scope>) -> anyhow::Result<Arc<dyn Service>> {
        Ok(Arc::new(Plugin {
            version: self.version,
        }))
    }
}

fn running_orchestrator() -> Arc<LifecycleOrchestrator> {
    let events = events();
    let store = store(json!({"ServiceManager": {"services": {"core": {"className": "core"}}}}));
    let orchestrator = LifecycleOrchestrator::new(Arc::new(store), recorders(&events, &["core"]));
    orchestrator.initialize().unwrap();
    Arc::new(orchestrator)
}

fn register_concurrently(
    orchestrator: &Arc<LifecycleOrchestrator>,
    threads: usize,
    policy: SingletonPolicy,
) -> Vec<bool> {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let orchestrator = Arc::clone(orchestrator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let plugin = Arc::new(Plugin { version: "1" });
                orchestrator
                    .register_factory(format!("plugin-{i}"), plugin, policy)
                    .map(|handle| handle.is_some())
                    .unwrap_or(false)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_error_policy_admits_one() {
    let orchestrator = running_orchestrator();
    let policy = SingletonPolicy::new(SingletonScope::NameVersion, ConflictAction::Error);

    let outcomes = register_concurrently(&orchestrator, 8, policy);

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let winner = orchestrator
        .service_by_detail(&ServiceDetail::new("plugin", "1"))
        .unwrap();
    assert!(orchestrator.service(winner.id()).is_some());
    let factory = orchestrator.factory_for(&Feature::new("plugins")).unwrap();
    assert_eq!(factory.id(), winner.id());
    // core plus the single winner
    assert_eq!(orchestrator.services().len(), 2);
}

#[test]
fn test_concurrent_ignore_policy_keeps_first() {
    let orchestrator = running_orchestrator();
    let policy = SingletonPolicy::new(SingletonScope::Name, ConflictAction::Ignore);

    let outcomes = register_concurrently(&orchestrator, 8, policy);

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let kept = orchestrator.service_by_name("plugin").unwrap();
    assert_eq!(orchestrator.services().len(), 2);
    assert!(orchestrator.service(kept.id()).is_some());
}

#[test]
fn test_concurrent_replace_policy_registers_all() {
    let orchestrator = running_orchestrator();
    let policy = SingletonPolicy::default();

    let outcomes = register_concurrently(&orchestrator, 8, policy);

    assert!(outcomes.iter().all(|ok| *ok));
    assert_eq!(orchestrator.services().len(), 9);
    let holder = orchestrator
        .service_by_detail(&ServiceDetail::new("plugin", "1"))
        .unwrap();
    assert!(holder.id().starts_with("plugin-"));

    orchestrator.destroy();
    assert!(orchestrator.services().is_empty());
    assert!(orchestrator.factory_for(&Feature::new("plugins")).is_none());
}

#[test]
fn test_lookups_during_registration() {
    let orchestrator = running_orchestrator();
    let reader = {
        let orchestrator = Arc::clone(&orchestrator);
        thread::spawn(move || {
            for _ in 0..1000 {
                assert!(orchestrator.service("core").is_some());
                let _ = orchestrator.service_by_detail(&ServiceDetail::new("plugin", "1"));
            }
        })
    };

    register_concurrently(&orchestrator, 4, SingletonPolicy::default());
    reader.join().unwrap();
    assert_eq!(orchestrator.services().len(), 5);
}
