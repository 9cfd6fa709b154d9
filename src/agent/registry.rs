use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::error::GatewayError;

use super::factory::AgentFactory;
use super::Agent;

/// An agent shared between requests. Hold the lock for a whole turn.
pub(crate) type SharedAgent = Arc<Mutex<Box<dyn Agent>>>;

/// Identifies one agent: a conversation with one model of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AgentKey {
    pub session_id: String,
    pub provider_id: String,
    pub model_name: String,
}

impl AgentKey {
    pub fn new(session_id: &str, provider_id: &str, model_name: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            provider_id: provider_id.to_string(),
            model_name: model_name.to_string(),
        }
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.session_id, self.provider_id, self.model_name)
    }
}

/// Live agents keyed by (session, provider, model).
///
/// Owned by the gateway for the life of the process. Live entries are only
/// removed by `evict_session`; a failed creation drops its empty entry.
pub(crate) struct AgentRegistry {
    factory: AgentFactory,
    agent_type: String,
    // The map lock is only held for lookups; creation is serialized per key
    // by the cell so a slow model validation does not block other sessions.
    entries: Mutex<HashMap<AgentKey, Arc<OnceCell<SharedAgent>>>>,
}

impl AgentRegistry {
    pub fn new(factory: AgentFactory, agent_type: impl Into<String>) -> Self {
        Self {
            factory,
            agent_type: agent_type.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &AgentFactory {
        &self.factory
    }

    /// Return the agent for this key, creating and validating it on first use.
    ///
    /// Concurrent callers with the same key wait on a single creation. A
    /// failed creation is not cached; the next call tries again.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        provider_id: &str,
        model_name: &str,
        api_key: &str,
    ) -> Result<SharedAgent, GatewayError> {
        let key = AgentKey::new(session_id, provider_id, model_name);
        let cell = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let created = cell
            .get_or_try_init(|| {
                tracing::debug!(key = %key, "no live agent, creating");
                self.factory
                    .create(&self.agent_type, provider_id, api_key, model_name)
            })
            .await;

        match created {
            Ok(agent) => Ok(agent.clone()),
            Err(e) => {
                let mut entries = self.entries.lock().await;
                let stale = entries
                    .get(&key)
                    .is_some_and(|c| Arc::ptr_eq(c, &cell) && !c.initialized());
                if stale {
                    entries.remove(&key);
                }
                Err(e)
            }
        }
    }

    /// Drop every agent belonging to `session_id`. Returns how many were live.
    pub async fn evict_session(&self, session_id: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let mut removed = 0;
        entries.retain(|key, cell| {
            if key.session_id != session_id {
                return true;
            }
            if cell.initialized() {
                removed += 1;
            }
            false
        });
        if removed > 0 {
            tracing::info!(session = %session_id, agents = removed, "evicted session agents");
        }
        removed
    }

    /// The live agent for this key, without creating one.
    pub async fn get(
        &self,
        session_id: &str,
        provider_id: &str,
        model_name: &str,
    ) -> Option<SharedAgent> {
        let key = AgentKey::new(session_id, provider_id, model_name);
        self.entries
            .lock()
            .await
            .get(&key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of live agents.
    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::agent::clock::SystemClock;
    use crate::llm::mock::{self, MockProvider};
    use crate::llm::{GenerateOptions, ProviderFactory};

    fn registry_with(template: MockProvider) -> AgentRegistry {
        let mut providers = ProviderFactory::with_defaults(Duration::from_secs(1), HashMap::new());
        mock::register(&mut providers, template);
        let factory = AgentFactory::new(
            providers,
            "sys",
            GenerateOptions::default(),
            Arc::new(SystemClock),
        );
        AgentRegistry::new(factory, "chat")
    }

    #[test]
    fn test_agent_key_display() {
        let key = AgentKey::new("s1", "openai", "gpt-4");
        assert_eq!(key.to_string(), "s1_openai_gpt-4");
    }

    #[tokio::test]
    async fn test_same_key_returns_same_agent() {
        let template = MockProvider::new("m");
        let registry = registry_with(template.clone());

        let a = registry.get_or_create("s1", "mock", "m", "key").await.unwrap();
        let b = registry.get_or_create("s1", "mock", "m", "key").await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(template.constructed(), 1);
        assert_eq!(template.validate_calls(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_models_get_independent_agents() {
        let registry = registry_with(MockProvider::new("m"));

        let a = registry.get_or_create("s1", "mock", "m1", "key").await.unwrap();
        let b = registry.get_or_create("s1", "mock", "m2", "key").await.unwrap();
        let c = registry.get_or_create("s2", "mock", "m1", "key").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        a.lock().await.process_message("hello").await;
        assert_eq!(a.lock().await.history().len(), 2);
        assert!(b.lock().await.history().is_empty());
        assert!(c.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_persists_across_lookups() {
        let registry = registry_with(MockProvider::new("m"));

        let first = registry.get_or_create("s1", "mock", "m", "key").await.unwrap();
        first.lock().await.process_message("one").await;

        let again = registry.get_or_create("s1", "mock", "m", "key").await.unwrap();
        again.lock().await.process_message("two").await;

        assert_eq!(first.lock().await.history().len(), 4);
    }

    #[tokio::test]
    async fn test_evict_session_only_touches_that_session() {
        let registry = registry_with(MockProvider::new("m"));
        registry.get_or_create("s1", "mock", "m1", "k").await.unwrap();
        registry.get_or_create("s1", "mock", "m2", "k").await.unwrap();
        registry.get_or_create("s10", "mock", "m1", "k").await.unwrap();
        registry.get_or_create("s2", "mock", "m1", "k").await.unwrap();

        let removed = registry.evict_session("s1").await;

        assert_eq!(removed, 2);
        assert!(registry.get("s1", "mock", "m1").await.is_none());
        assert!(registry.get("s1", "mock", "m2").await.is_none());
        // "s10" shares a prefix with "s1" but is a different session.
        assert!(registry.get("s10", "mock", "m1").await.is_some());
        assert!(registry.get("s2", "mock", "m1").await.is_some());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_evicted_key_builds_fresh_agent() {
        let template = MockProvider::new("m");
        let registry = registry_with(template.clone());
        let old = registry.get_or_create("s1", "mock", "m", "k").await.unwrap();
        old.lock().await.process_message("hi").await;

        registry.evict_session("s1").await;
        let new = registry.get_or_create("s1", "mock", "m", "k").await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(new.lock().await.history().is_empty());
        assert_eq!(template.constructed(), 2);
    }

    #[tokio::test]
    async fn test_failed_creation_is_not_cached() {
        let template = MockProvider::new("m").with_valid(false);
        let registry = registry_with(template.clone());

        for _ in 0..2 {
            let err = registry.get_or_create("s1", "mock", "bad", "k").await.err().unwrap();
            assert!(matches!(err, GatewayError::ModelNotFound { .. }));
        }

        assert_eq!(template.validate_calls(), 2);
        assert_eq!(registry.len().await, 0);
        assert!(registry.get("s1", "mock", "bad").await.is_none());
        assert!(registry.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_surfaces_immediately() {
        let registry = registry_with(MockProvider::new("m"));
        let err = registry.get_or_create("s1", "bogus", "m", "k").await.err().unwrap();
        assert!(matches!(err, GatewayError::UnsupportedProvider(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_builds_one_agent() {
        let template = MockProvider::new("m").with_validate_delay(Duration::from_millis(50));
        let registry = Arc::new(registry_with(template.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create("s1", "mock", "m", "k").await.unwrap()
            }));
        }
        let mut agents = Vec::new();
        for handle in handles {
            agents.push(handle.await.unwrap());
        }

        assert_eq!(template.constructed(), 1);
        assert_eq!(template.validate_calls(), 1);
        assert!(agents.iter().all(|a| Arc::ptr_eq(a, &agents[0])));
    }
}
