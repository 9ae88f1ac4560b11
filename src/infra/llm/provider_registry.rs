use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{GenerationError, ProviderKind};

use super::{ChatCompletionsProvider, GeminiProvider, SvgProvider};

/// The configured provider set for one process. Read-only after construction;
/// generation calls only ever look providers up.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderKind, Arc<dyn SvgProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds clients for every known provider from process environment.
    /// Missing API keys do not fail here; they surface as per-call
    /// authentication failures.
    pub fn from_env() -> Result<Self, GenerationError> {
        let mut registry = Self::new();
        registry.register(ChatCompletionsProvider::from_env(ProviderKind::Deepseek)?)?;
        registry.register(GeminiProvider::from_env()?)?;
        registry.register(ChatCompletionsProvider::from_env(ProviderKind::OpenAi)?)?;
        Ok(registry)
    }

    pub fn register<P>(&mut self, provider: P) -> Result<(), GenerationError>
    where
        P: SvgProvider + 'static,
    {
        self.register_shared(Arc::new(provider))
    }

    pub fn register_shared(&mut self, provider: Arc<dyn SvgProvider>) -> Result<(), GenerationError> {
        let kind = provider.kind();
        if self.providers.contains_key(&kind) {
            return Err(GenerationError::invalid_request(format!(
                "provider '{}' is already registered",
                kind.as_str()
            )));
        }

        self.providers.insert(kind, provider);
        Ok(())
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn SvgProvider>> {
        self.providers.get(&kind).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
