use crate::domain::{GenerationError, GenerationRequest, ProviderKind, RawGeneration};

/// One external text-generation service. Implementations hide the
/// provider-specific request and response envelope behind a uniform
/// raw-text result; markup extraction happens later in the domain layer.
pub trait SvgProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn generate(&self, request: &GenerationRequest) -> Result<RawGeneration, GenerationError>;
}
