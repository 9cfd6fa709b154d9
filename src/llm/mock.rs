// Scripted provider for tests.
//
// Clones share their script and counters, so a template registered with a
// `ProviderFactory` can be inspected after the factory built providers from it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerateOptions, Provider, ProviderError, ProviderFactory, ProviderSettings};
use crate::agent::types::ContextMessage;

#[derive(Clone)]
pub(crate) struct MockProvider {
    model_name: String,
    valid: bool,
    validate_delay: Duration,
    responses: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    contexts: Arc<Mutex<Vec<Vec<ContextMessage>>>>,
    generate_calls: Arc<AtomicUsize>,
    validate_calls: Arc<AtomicUsize>,
    constructed: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            valid: true,
            validate_delay: Duration::ZERO,
            responses: Arc::new(Mutex::new(VecDeque::new())),
            contexts: Arc::new(Mutex::new(Vec::new())),
            generate_calls: Arc::new(AtomicUsize::new(0)),
            validate_calls: Arc::new(AtomicUsize::new(0)),
            constructed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue responses; once exhausted every call answers `"mock response"`.
    pub fn with_responses(self, responses: Vec<Result<String, ProviderError>>) -> Self {
        self.responses.lock().unwrap().extend(responses);
        self
    }

    pub fn with_valid(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    pub fn with_validate_delay(mut self, delay: Duration) -> Self {
        self.validate_delay = delay;
        self
    }

    pub fn recorded_contexts(&self) -> Vec<Vec<ContextMessage>> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }
}

/// Register `template` under `"mock"`; each created provider shares its state.
pub(crate) fn register(factory: &mut ProviderFactory, template: MockProvider) {
    factory.register(
        "mock",
        Arc::new(
            move |settings: ProviderSettings| -> Result<Arc<dyn Provider>, ProviderError> {
                template.constructed.fetch_add(1, Ordering::SeqCst);
                let mut provider = template.clone();
                provider.model_name = settings.model_name;
                Ok(Arc::new(provider))
            },
        ),
    );
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate_response(
        &self,
        context: &[ContextMessage],
        _options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_vec());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("mock response".to_string()))
    }

    async fn validate_model(&self) -> bool {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.validate_delay.is_zero() {
            tokio::time::sleep(self.validate_delay).await;
        }
        self.valid
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
