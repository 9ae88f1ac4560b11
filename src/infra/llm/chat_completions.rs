use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    GenerationError, GenerationMetadata, GenerationRequest, GenerationUsage, ProviderKind,
    RawGeneration,
};

use super::env;
use super::response_parsing::{non_empty_owned, truncate_message};
use super::{PromptBuilder, SvgProvider};

/// Client for the OpenAI-style `/v1/chat/completions` wire shape. DeepSeek
/// and OpenAI expose the same envelope, so one implementation serves both,
/// configured per provider.
#[derive(Debug)]
pub struct ChatCompletionsProvider {
    kind: ProviderKind,
    api_key: String,
    api_base_url: String,
    model: String,
    client: Client,
}

struct ChatCompletionsDefaults {
    base_url: &'static str,
    model: &'static str,
    env_api_key: &'static str,
    env_api_key_fallback: &'static str,
    env_base_url: &'static str,
    env_model: &'static str,
    env_timeout_secs: &'static str,
}

fn defaults_for(kind: ProviderKind) -> Result<ChatCompletionsDefaults, GenerationError> {
    match kind {
        ProviderKind::Deepseek => Ok(ChatCompletionsDefaults {
            base_url: "https://api.deepseek.com",
            model: "deepseek-chat",
            env_api_key: "SVGSMITH_DEEPSEEK_API_KEY",
            env_api_key_fallback: "DEEPSEEK_API_KEY",
            env_base_url: "SVGSMITH_DEEPSEEK_BASE_URL",
            env_model: "SVGSMITH_DEEPSEEK_MODEL",
            env_timeout_secs: "SVGSMITH_DEEPSEEK_TIMEOUT_SECS",
        }),
        ProviderKind::OpenAi => Ok(ChatCompletionsDefaults {
            base_url: "https://api.openai.com",
            model: "gpt-4o",
            env_api_key: "SVGSMITH_OPENAI_API_KEY",
            env_api_key_fallback: "OPENAI_API_KEY",
            env_base_url: "SVGSMITH_OPENAI_BASE_URL",
            env_model: "SVGSMITH_OPENAI_MODEL",
            env_timeout_secs: "SVGSMITH_OPENAI_TIMEOUT_SECS",
        }),
        ProviderKind::Gemini => Err(GenerationError::invalid_request(
            "gemini does not speak the chat-completions wire shape",
        )),
    }
}

impl ChatCompletionsProvider {
    pub fn from_env(kind: ProviderKind) -> Result<Self, GenerationError> {
        let defaults = defaults_for(kind)?;

        // A missing key is not a construction failure: the provider call
        // fails authentication at the HTTP layer instead.
        let api_key =
            env::first_string_var(&[defaults.env_api_key, defaults.env_api_key_fallback])?
                .unwrap_or_default();
        let api_base_url =
            env::string_var(defaults.env_base_url)?.unwrap_or_else(|| defaults.base_url.to_string());
        let model =
            env::string_var(defaults.env_model)?.unwrap_or_else(|| defaults.model.to_string());
        let timeout = env::request_timeout(defaults.env_timeout_secs)?;

        Self::with_config(kind, api_key, api_base_url, model, timeout)
    }

    pub fn with_config(
        kind: ProviderKind,
        api_key: impl Into<String>,
        api_base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        defaults_for(kind)?;

        let api_base_url = api_base_url.into();
        if api_base_url.trim().is_empty() {
            return Err(GenerationError::invalid_request(format!(
                "{} API base URL must not be empty",
                kind.as_str()
            )));
        }

        let model = model.into();
        if model.trim().is_empty() {
            return Err(GenerationError::invalid_request(format!(
                "{} model must not be empty",
                kind.as_str()
            )));
        }

        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            GenerationError::fault(format!(
                "failed to create {} HTTP client: {err}",
                kind.as_str()
            ))
        })?;

        Ok(Self {
            kind,
            api_key: api_key.into(),
            api_base_url,
            model,
            client,
        })
    }

    fn endpoint_url(&self) -> String {
        build_v1_url(&self.api_base_url, "chat/completions")
    }

    fn build_request_payload(&self, request: &GenerationRequest) -> ChatCompletionsRequest {
        let prompt = PromptBuilder::build(request);

        ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user,
                },
            ],
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            max_tokens: request.params.max_tokens,
        }
    }

    fn map_success_response(
        &self,
        response_body: &str,
        latency_ms: u64,
        header_request_id: Option<String>,
    ) -> Result<RawGeneration, GenerationError> {
        let response: ChatCompletionsResponse =
            serde_json::from_str(response_body).map_err(|err| {
                GenerationError::malformed(format!(
                    "{} response decode failed: {err}",
                    self.kind.as_str()
                ))
            })?;

        let mut text = None;
        let mut stop_reason = None;
        for choice in &response.choices {
            if let Some(extracted) = choice.extract_text() {
                text = Some(extracted);
                stop_reason = choice
                    .finish_reason
                    .as_deref()
                    .and_then(|reason| non_empty_owned(reason));
                break;
            }
        }

        let text = text.ok_or_else(|| {
            GenerationError::malformed(format!(
                "{} response did not include text content",
                self.kind.as_str()
            ))
        })?;

        let usage = response.usage.and_then(map_usage);
        let provider_request_id = header_request_id
            .or_else(|| response.id.as_deref().and_then(|id| non_empty_owned(id)));

        Ok(RawGeneration {
            text,
            metadata: GenerationMetadata {
                latency_ms: Some(latency_ms),
                provider_request_id,
                stop_reason,
                usage,
            },
        })
    }
}

impl SvgProvider for ChatCompletionsProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn generate(&self, request: &GenerationRequest) -> Result<RawGeneration, GenerationError> {
        let payload = self.build_request_payload(request);
        let started = Instant::now();

        let response = self
            .client
            .post(self.endpoint_url())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .map_err(|err| map_transport_error(self.kind, err))?;

        let status = response.status();
        let header_request_id = response
            .headers()
            .get("x-request-id")
            .or_else(|| response.headers().get("request-id"))
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let response_body = response
            .text()
            .map_err(|err| map_transport_error(self.kind, err))?;
        if !status.is_success() {
            return Err(map_http_error(self.kind, status, &response_body));
        }

        let elapsed_ms = started.elapsed().as_millis();
        let latency_ms = u64::try_from(elapsed_ms).unwrap_or(u64::MAX);
        self.map_success_response(&response_body, latency_ms, header_request_id)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u16>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    message: Option<ChatChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

impl ChatChoice {
    fn extract_text(&self) -> Option<String> {
        if let Some(text) = self.text.as_deref().and_then(|text| non_empty_owned(text)) {
            return Some(text);
        }

        let content = self.message.as_ref()?.content.as_ref()?;
        extract_message_content(content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorEnvelope {
    #[serde(default)]
    error: Option<ChatErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn map_usage(usage: ChatUsage) -> Option<GenerationUsage> {
    let total_tokens = usage.total_tokens.or_else(|| {
        let (Some(prompt_tokens), Some(completion_tokens)) =
            (usage.prompt_tokens, usage.completion_tokens)
        else {
            return None;
        };
        prompt_tokens.checked_add(completion_tokens)
    });

    let mapped = GenerationUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens,
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

fn extract_message_content(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => non_empty_owned(text),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter_map(extract_content_part_text)
                .collect::<String>();
            non_empty_owned(&joined)
        }
        _ => None,
    }
}

fn extract_content_part_text(part: &Value) -> Option<String> {
    match part {
        Value::String(text) => Some(text.to_string()),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        _ => None,
    }
}

fn map_http_error(kind: ProviderKind, status: StatusCode, body: &str) -> GenerationError {
    let parsed_error = serde_json::from_str::<ChatErrorEnvelope>(body).ok();
    let error_type = parsed_error
        .as_ref()
        .and_then(|envelope| envelope.error.as_ref())
        .and_then(|detail| detail.error_type.as_deref());
    let error_code = parsed_error
        .as_ref()
        .and_then(|envelope| envelope.error.as_ref())
        .and_then(|detail| detail.code.as_deref());

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || matches!(error_type, Some("authentication_error"))
        || matches!(
            error_code,
            Some("invalid_api_key" | "invalid_authentication")
        )
    {
        return GenerationError::CredentialsRejected;
    }

    if status == StatusCode::TOO_MANY_REQUESTS
        || matches!(error_type, Some("rate_limit_error" | "insufficient_quota"))
        || matches!(
            error_code,
            Some("rate_limit_exceeded" | "insufficient_quota")
        )
    {
        return GenerationError::Throttled;
    }

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::GATEWAY_TIMEOUT
        || matches!(error_type, Some("timeout" | "server_timeout"))
        || matches!(error_code, Some("request_timeout"))
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
        message: format!(
            "{} API returned HTTP {status}: {message}",
            kind.as_str()
        ),
    }
}

fn map_transport_error(kind: ProviderKind, error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        return GenerationError::DeadlineExceeded;
    }

    GenerationError::Unreachable {
        message: format!("{} transport error: {error}", kind.as_str()),
    }
}

fn build_v1_url(api_base_url: &str, endpoint_path: &str) -> String {
    let base = api_base_url.trim_end_matches('/');
    let endpoint_path = endpoint_path.trim_start_matches('/');

    if base.ends_with("/v1") {
        format!("{base}/{endpoint_path}")
    } else {
        format!("{base}/v1/{endpoint_path}")
    }
}
