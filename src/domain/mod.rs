mod errors;
mod generation_contract;
mod markup;

pub use errors::GenerationError;
pub use generation_contract::{
    GenerationMetadata, GenerationParams, GenerationRequest, GenerationResultSet, GenerationUsage,
    ProviderKind, RawGeneration,
};
pub use markup::{DEFAULT_VIEW_BOX, SvgMarkup};
