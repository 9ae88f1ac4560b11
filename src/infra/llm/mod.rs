mod chat_completions;
mod env;
mod gemini;
mod prompt_builder;
mod provider;
mod provider_registry;
mod response_parsing;

pub use chat_completions::ChatCompletionsProvider;
pub use gemini::GeminiProvider;
pub use prompt_builder::{BuiltPrompt, PromptBuilder};
pub use provider::SvgProvider;
pub use provider_registry::ProviderRegistry;
