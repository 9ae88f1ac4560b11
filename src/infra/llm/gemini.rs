use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::domain::{
    GenerationError, GenerationMetadata, GenerationRequest, GenerationUsage, ProviderKind,
    RawGeneration,
};

use super::env;
use super::response_parsing::{non_empty_owned, truncate_message};
use super::{PromptBuilder, SvgProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const ENV_API_KEY: &str = "SVGSMITH_GEMINI_API_KEY";
const ENV_API_KEY_FALLBACK: &str = "GEMINI_API_KEY";
const ENV_API_KEY_FALLBACK_GOOGLE: &str = "GOOGLE_API_KEY";
const ENV_BASE_URL: &str = "SVGSMITH_GEMINI_BASE_URL";
const ENV_MODEL: &str = "SVGSMITH_GEMINI_MODEL";
const ENV_TIMEOUT_SECS: &str = "SVGSMITH_GEMINI_TIMEOUT_SECS";

/// Client for Google's `generateContent` endpoint. Unlike the
/// chat-completions providers the API key travels in the URL query string.
pub struct GeminiProvider {
    api_key: String,
    api_base_url: String,
    model: String,
    client: Client,
}

impl GeminiProvider {
    pub fn from_env() -> Result<Self, GenerationError> {
        // A missing key is not a construction failure: the provider call
        // fails authentication at the HTTP layer instead.
        let api_key = env::first_string_var(&[
            ENV_API_KEY,
            ENV_API_KEY_FALLBACK,
            ENV_API_KEY_FALLBACK_GOOGLE,
        ])?
        .unwrap_or_default();
        let api_base_url = env::string_var(ENV_BASE_URL)?.unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let model = env::string_var(ENV_MODEL)?.unwrap_or_else(|| DEFAULT_MODEL.into());
        let timeout = env::request_timeout(ENV_TIMEOUT_SECS)?;
        Self::with_config(api_key, api_base_url, model, timeout)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        api_base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let api_base_url = api_base_url.into();
        if api_base_url.trim().is_empty() {
            return Err(GenerationError::invalid_request(
                "Gemini API base URL must not be empty",
            ));
        }

        let model = model.into();
        if model.trim().is_empty() {
            return Err(GenerationError::invalid_request("Gemini model must not be empty"));
        }

        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            GenerationError::fault(format!("failed to create Gemini HTTP client: {err}"))
        })?;

        Ok(Self {
            api_key: api_key.into(),
            api_base_url,
            model,
            client,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.api_base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }

    fn build_request_payload(&self, request: &GenerationRequest) -> GeminiGenerateRequest {
        let prompt = PromptBuilder::build(request);

        GeminiGenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart {
                        text: Some(prompt.system),
                    },
                    GeminiPart {
                        text: Some(prompt.user),
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.params.temperature,
                top_p: request.params.top_p,
                max_output_tokens: request.params.max_tokens,
            },
        }
    }

    fn map_success_response(
        &self,
        response_body: &str,
        latency_ms: u64,
    ) -> Result<RawGeneration, GenerationError> {
        let response: GeminiGenerateResponse =
            serde_json::from_str(response_body).map_err(|err| {
                GenerationError::malformed(format!("Gemini response decode failed: {err}"))
            })?;

        let candidate = response.candidates.first().ok_or_else(|| {
            GenerationError::malformed("Gemini response did not include a candidate")
        })?;

        let joined_text = candidate
            .content
            .as_ref()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if joined_text.trim().is_empty() {
            return Err(GenerationError::malformed(
                "Gemini candidate did not include a text part",
            ));
        }

        let stop_reason = candidate
            .finish_reason
            .as_deref()
            .and_then(|reason| non_empty_owned(reason));
        let usage = response.usage_metadata.and_then(map_usage);

        Ok(RawGeneration {
            text: joined_text,
            metadata: GenerationMetadata {
                latency_ms: Some(latency_ms),
                provider_request_id: None,
                stop_reason,
                usage,
            },
        })
    }
}

impl SvgProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn generate(&self, request: &GenerationRequest) -> Result<RawGeneration, GenerationError> {
        let payload = self.build_request_payload(request);
        let started = Instant::now();

        let response = self
            .client
            .post(self.endpoint_url())
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .map_err(map_transport_error)?;

        let status = response.status();
        let response_body = response.text().map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_http_error(status, &response_body));
        }

        let elapsed_ms = started.elapsed().as_millis();
        let latency_ms = u64::try_from(elapsed_ms).unwrap_or(u64::MAX);
        self.map_success_response(&response_body, latency_ms)
    }
}

#[derive(Debug, Serialize)]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
    #[serde(default)]
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    #[serde(default)]
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn map_usage(usage: GeminiUsageMetadata) -> Option<GenerationUsage> {
    let mapped = GenerationUsage {
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count.or_else(|| {
            let (Some(input), Some(output)) =
                (usage.prompt_token_count, usage.candidates_token_count)
            else {
                return None;
            };
            input.checked_add(output)
        }),
    };

    if mapped.input_tokens.is_some()
        || mapped.output_tokens.is_some()
        || mapped.total_tokens.is_some()
    {
        Some(mapped)
    } else {
        None
    }
}

fn map_http_error(status: StatusCode, body: &str) -> GenerationError {
    let parsed_error = serde_json::from_str::<GeminiErrorEnvelope>(body).ok();
    let error_status = parsed_error
        .as_ref()
        .and_then(|envelope| envelope.error.as_ref())
        .and_then(|detail| detail.status.as_deref());

    if matches!(error_status, Some("UNAUTHENTICATED" | "PERMISSION_DENIED"))
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
    {
        return GenerationError::CredentialsRejected;
    }
    if matches!(error_status, Some("RESOURCE_EXHAUSTED"))
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return GenerationError::Throttled;
    }
    if matches!(error_status, Some("DEADLINE_EXCEEDED"))
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::GATEWAY_TIMEOUT
    {
        return GenerationError::DeadlineExceeded;
    }

    let message = parsed_error
        .as_ref()
        .and_then(|envelope| envelope.error.as_ref())
        .map(|detail| detail.message.clone())
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| truncate_message(body));
    GenerationError::Unreachable {
        message: format!("Gemini API returned HTTP {status}: {message}"),
    }
}

fn map_transport_error(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        return GenerationError::DeadlineExceeded;
    }
    GenerationError::Unreachable {
        message: format!("Gemini transport error: {error}"),
    }
}
