use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{GenerationError, SvgMarkup};

/// The closed set of generation services this crate knows how to call.
/// Providers are compiled in, never discovered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Deepseek,
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Deepseek,
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Deepseek => "DeepSeek",
            Self::Gemini => "Gemini",
            Self::OpenAi => "OpenAI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub params: GenerationParams,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::invalid_request("prompt must not be empty"));
        }
        self.params.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u16>,
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(GenerationError::invalid_request(format!(
                "temperature must be in 0.0..=2.0 (got {temperature})"
            )));
        }
        if let Some(top_p) = self.top_p
            && !(0.0..=1.0).contains(&top_p)
        {
            return Err(GenerationError::invalid_request(format!(
                "top_p must be in 0.0..=1.0 (got {top_p})"
            )));
        }
        if let Some(max_tokens) = self.max_tokens
            && max_tokens == 0
        {
            return Err(GenerationError::invalid_request("max_tokens must be greater than 0"));
        }
        Ok(())
    }
}

/// Raw generated text as returned by one provider, before any markup
/// extraction or repair. Lives only within a single aggregated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGeneration {
    pub text: String,
    pub metadata: GenerationMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationMetadata {
    pub latency_ms: Option<u64>,
    pub provider_request_id: Option<String>,
    pub stop_reason: Option<String>,
    pub usage: Option<GenerationUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// One aggregated outcome per known provider. The key set is always exactly
/// `ProviderKind::ALL`; a provider that failed or produced no usable markup
/// is present with the empty sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GenerationResultSet {
    entries: BTreeMap<ProviderKind, SvgMarkup>,
}

impl GenerationResultSet {
    pub fn from_entries(entries: impl IntoIterator<Item = (ProviderKind, SvgMarkup)>) -> Self {
        let mut map: BTreeMap<ProviderKind, SvgMarkup> = ProviderKind::ALL
            .iter()
            .map(|kind| (*kind, SvgMarkup::empty()))
            .collect();
        for (kind, markup) in entries {
            map.insert(kind, markup);
        }
        Self { entries: map }
    }

    pub fn markup(&self, kind: ProviderKind) -> &SvgMarkup {
        // from_entries seeds every variant, so the lookup cannot miss.
        &self.entries[&kind]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProviderKind, &SvgMarkup)> {
        self.entries.iter().map(|(kind, markup)| (*kind, markup))
    }

    pub fn usable_count(&self) -> usize {
        self.entries
            .values()
            .filter(|markup| !markup.is_empty())
            .count()
    }
}
