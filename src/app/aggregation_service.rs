use std::thread;
use std::time::Duration;

use crate::domain::{
    GenerationError, GenerationRequest, GenerationResultSet, ProviderKind, RawGeneration,
    SvgMarkup,
};
use crate::infra::llm::{ProviderRegistry, SvgProvider};

/// Per-provider retry policy. The default performs a single attempt:
/// provider failures degrade the aggregated result instead of being retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for GenerationRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl GenerationRetryConfig {
    fn validate(&self) -> Result<(), GenerationError> {
        if self.max_attempts == 0 {
            return Err(GenerationError::invalid_request("max_attempts must be greater than 0"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(GenerationError::invalid_request(
                "max_backoff must not be shorter than initial_backoff",
            ));
        }
        Ok(())
    }
}

/// Fans one prompt out to every registered provider concurrently and folds
/// the per-provider outcomes into a single result set.
#[derive(Clone)]
pub struct AggregationService {
    registry: ProviderRegistry,
    retry: GenerationRetryConfig,
}

impl AggregationService {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            retry: GenerationRetryConfig::default(),
        }
    }

    pub fn with_retry_config(
        registry: ProviderRegistry,
        retry: GenerationRetryConfig,
    ) -> Result<Self, GenerationError> {
        retry.validate()?;
        Ok(Self { registry, retry })
    }

    /// Runs every known provider against `request` and returns one entry per
    /// provider. Provider failures and unusable output become the empty
    /// sentinel for that provider only; the call itself fails only on an
    /// invalid request or on a defect in the fan-out itself.
    pub fn generate_all(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResultSet, GenerationError> {
        request.validate()?;

        // Each branch owns its provider handle and resolves independently;
        // the only merge point is the join below, after every branch is done.
        let outcomes = thread::scope(|scope| {
            let handles: Vec<_> = ProviderKind::ALL
                .iter()
                .map(|kind| {
                    let provider = self.registry.get(*kind);
                    let handle = scope.spawn(move || {
                        provider.map(|provider| {
                            self.generate_with_retry(provider.as_ref(), request)
                        })
                    });
                    (*kind, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(kind, handle)| {
                    let joined = handle.join().map_err(|_| {
                        GenerationError::fault(format!(
                            "generation branch for provider '{}' panicked",
                            kind.as_str()
                        ))
                    });
                    (kind, joined)
                })
                .collect::<Vec<_>>()
        });

        let mut entries = Vec::with_capacity(ProviderKind::ALL.len());
        for (kind, joined) in outcomes {
            match joined? {
                None => {
                    tracing::debug!(
                        "provider '{}' is not registered, recording empty entry",
                        kind.as_str()
                    );
                }
                Some(Ok(raw)) => {
                    let markup = Self::normalize_outcome(kind, &raw);
                    entries.push((kind, markup));
                }
                Some(Err(error)) => {
                    tracing::warn!("{} generation failed: {}", kind.display_name(), error);
                }
            }
        }

        Ok(GenerationResultSet::from_entries(entries))
    }

    fn normalize_outcome(kind: ProviderKind, raw: &RawGeneration) -> SvgMarkup {
        let markup = SvgMarkup::normalize(&raw.text);
        if markup.is_empty() {
            tracing::warn!(
                "{} responded but produced no usable markup",
                kind.display_name()
            );
        } else {
            tracing::debug!(
                "provider '{}' produced {} bytes of markup in {} ms",
                kind.as_str(),
                markup.as_str().len(),
                raw.metadata.latency_ms.unwrap_or_default()
            );
        }
        markup
    }

    fn generate_with_retry(
        &self,
        provider: &dyn SvgProvider,
        request: &GenerationRequest,
    ) -> Result<RawGeneration, GenerationError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match provider.generate(request) {
                Ok(raw) => return Ok(raw),
                Err(error) if error.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::debug!(
                        "provider '{}' attempt {attempt} failed ({error}), retrying",
                        provider.kind().as_str()
                    );
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::{AggregationService, GenerationRetryConfig};
    use crate::domain::{
        GenerationError, GenerationMetadata, GenerationRequest, ProviderKind, RawGeneration,
    };
    use crate::infra::llm::{ProviderRegistry, SvgProvider};

    struct StaticProvider {
        kind: ProviderKind,
        text: &'static str,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl StaticProvider {
        fn new(kind: ProviderKind, text: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    kind,
                    text,
                    calls: Arc::clone(&calls),
                    delay: Duration::ZERO,
                },
                calls,
            )
        }
    }

    impl SvgProvider for StaticProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn generate(&self, _request: &GenerationRequest) -> Result<RawGeneration, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(RawGeneration {
                text: self.text.to_string(),
                metadata: GenerationMetadata::default(),
            })
        }
    }

    struct FailingProvider {
        kind: ProviderKind,
        error: GenerationError,
    }

    impl SvgProvider for FailingProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn generate(&self, _request: &GenerationRequest) -> Result<RawGeneration, GenerationError> {
            Err(self.error.clone())
        }
    }

    struct FlakyProvider {
        kind: ProviderKind,
        calls: Arc<AtomicUsize>,
        failures_before_success: usize,
    }

    impl SvgProvider for FlakyProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn generate(&self, _request: &GenerationRequest) -> Result<RawGeneration, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(GenerationError::DeadlineExceeded);
            }
            Ok(RawGeneration {
                text: "<svg><g/></svg>".to_string(),
                metadata: GenerationMetadata::default(),
            })
        }
    }

    fn full_registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        let (deepseek, _) = StaticProvider::new(ProviderKind::Deepseek, "<svg><g/></svg>");
        let (gemini, _) = StaticProvider::new(
            ProviderKind::Gemini,
            "```svg\n<svg><circle r=\"10\"/></svg>\n```",
        );
        let (openai, _) = StaticProvider::new(ProviderKind::OpenAi, "<svg><rect/></svg>");
        registry.register(deepseek).expect("deepseek registers");
        registry.register(gemini).expect("gemini registers");
        registry.register(openai).expect("openai registers");
        registry
    }

    #[test]
    fn generate_all_returns_one_normalized_entry_per_provider() {
        let service = AggregationService::new(full_registry());

        let set = service
            .generate_all(&GenerationRequest::new("a red circle"))
            .expect("aggregation should succeed");

        assert_eq!(set.usable_count(), 3);
        assert_eq!(
            set.markup(ProviderKind::Gemini).as_str(),
            "<svg viewBox=\"0 0 100 100\" width=\"100%\" height=\"100%\"><circle r=\"10\"/></svg>"
        );
        for (_, markup) in set.iter() {
            assert!(markup.as_str().starts_with("<svg"));
            assert!(markup.as_str().ends_with("</svg>"));
        }
    }

    #[test]
    fn generate_all_rejects_empty_prompt_before_invoking_providers() {
        let mut registry = ProviderRegistry::new();
        let (provider, calls) = StaticProvider::new(ProviderKind::Deepseek, "<svg/></svg>");
        registry.register(provider).expect("provider registers");
        let service = AggregationService::new(registry);

        let error = service
            .generate_all(&GenerationRequest::new("   "))
            .expect_err("blank prompt should fail the whole call");

        assert!(matches!(error, GenerationError::InvalidRequest { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn generate_all_isolates_a_failing_provider() {
        let mut registry = ProviderRegistry::new();
        let (deepseek, _) = StaticProvider::new(ProviderKind::Deepseek, "<svg><g/></svg>");
        let (openai, openai_calls) = StaticProvider::new(ProviderKind::OpenAi, "<svg><rect/></svg>");
        registry.register(deepseek).expect("deepseek registers");
        registry
            .register(FailingProvider {
                kind: ProviderKind::Gemini,
                error: GenerationError::Unreachable {
                    message: "connection refused".to_string(),
                },
            })
            .expect("gemini registers");
        registry.register(openai).expect("openai registers");
        let service = AggregationService::new(registry);

        let set = service
            .generate_all(&GenerationRequest::new("a red circle"))
            .expect("one failing provider must not fail the call");

        assert!(set.markup(ProviderKind::Gemini).is_empty());
        assert!(!set.markup(ProviderKind::Deepseek).is_empty());
        assert!(!set.markup(ProviderKind::OpenAi).is_empty());
        assert_eq!(openai_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn generate_all_records_empty_entry_for_garbage_output() {
        let mut registry = ProviderRegistry::new();
        let (deepseek, _) =
            StaticProvider::new(ProviderKind::Deepseek, "I cannot help with that request.");
        registry.register(deepseek).expect("deepseek registers");
        let service = AggregationService::new(registry);

        let set = service
            .generate_all(&GenerationRequest::new("a red circle"))
            .expect("garbage output degrades, never fails");

        assert!(set.markup(ProviderKind::Deepseek).is_empty());
        assert_eq!(set.usable_count(), 0);
        assert_eq!(set.iter().count(), ProviderKind::ALL.len());
    }

    #[test]
    fn generate_all_covers_unregistered_providers_with_empty_entries() {
        let service = AggregationService::new(ProviderRegistry::new());

        let set = service
            .generate_all(&GenerationRequest::new("a red circle"))
            .expect("an empty registry still yields a complete set");

        assert_eq!(set.iter().count(), ProviderKind::ALL.len());
        assert_eq!(set.usable_count(), 0);
    }

    #[test]
    fn generate_all_runs_provider_branches_concurrently() {
        let mut registry = ProviderRegistry::new();
        for (kind, text) in [
            (ProviderKind::Deepseek, "<svg><g/></svg>"),
            (ProviderKind::Gemini, "<svg><g/></svg>"),
            (ProviderKind::OpenAi, "<svg><g/></svg>"),
        ] {
            let (mut provider, _) = StaticProvider::new(kind, text);
            provider.delay = Duration::from_millis(100);
            registry.register(provider).expect("provider registers");
        }
        let service = AggregationService::new(registry);

        let started = Instant::now();
        let set = service
            .generate_all(&GenerationRequest::new("a red circle"))
            .expect("aggregation should succeed");
        let elapsed = started.elapsed();

        assert_eq!(set.usable_count(), 3);
        // Sequential execution would take at least 300ms.
        assert!(
            elapsed < Duration::from_millis(250),
            "fan-out took {elapsed:?}, expected concurrent branches"
        );
    }

    #[test]
    fn retry_config_replays_retryable_failures_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ProviderRegistry::new();
        registry
            .register(FlakyProvider {
                kind: ProviderKind::OpenAi,
                calls: Arc::clone(&calls),
                failures_before_success: 2,
            })
            .expect("provider registers");

        let service = AggregationService::with_retry_config(
            registry,
            GenerationRetryConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        )
        .expect("retry config should be valid");

        let set = service
            .generate_all(&GenerationRequest::new("a red circle"))
            .expect("aggregation should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!set.markup(ProviderKind::OpenAi).is_empty());
    }

    #[test]
    fn default_retry_config_performs_a_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ProviderRegistry::new();
        registry
            .register(FlakyProvider {
                kind: ProviderKind::OpenAi,
                calls: Arc::clone(&calls),
                failures_before_success: 1,
            })
            .expect("provider registers");
        let service = AggregationService::new(registry);

        let set = service
            .generate_all(&GenerationRequest::new("a red circle"))
            .expect("aggregation should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(set.markup(ProviderKind::OpenAi).is_empty());
    }

    #[test]
    fn with_retry_config_rejects_invalid_policies() {
        let zero_attempts = AggregationService::with_retry_config(
            ProviderRegistry::new(),
            GenerationRetryConfig {
                max_attempts: 0,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        );
        let inverted_backoff = AggregationService::with_retry_config(
            ProviderRegistry::new(),
            GenerationRetryConfig {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(1),
            },
        );

        assert!(matches!(zero_attempts, Err(GenerationError::InvalidRequest { .. })));
        assert!(matches!(inverted_backoff, Err(GenerationError::InvalidRequest { .. })));
    }
}
