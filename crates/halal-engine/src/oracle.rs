use std::collections::BTreeMap;
use std::env;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use thiserror::Error;

pub const GEMINI_PROVIDER: &str = "gemini";
pub const DRYRUN_PROVIDER: &str = "dryrun";

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const CREDENTIAL_ENV_KEYS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("{provider} credential missing (set GEMINI_API_KEY, GOOGLE_API_KEY or API_KEY)")]
    MissingCredential { provider: String },
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} request failed ({code}): {body}")]
    Status {
        provider: String,
        code: u16,
        body: String,
    },
    #[error("{provider} returned an invalid payload: {message}")]
    InvalidPayload { provider: String, message: String },
    #[error("no oracle registered for provider '{0}'")]
    UnknownProvider(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OraclePart {
    Text(String),
    InlineImage { mime: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub model: String,
    pub parts: Vec<OraclePart>,
    pub system_instruction: Option<String>,
    /// When set, the oracle is asked for JSON matching this schema.
    pub response_schema: Option<Value>,
}

impl OracleRequest {
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: vec![OraclePart::Text(prompt.into())],
            system_instruction: None,
            response_schema: None,
        }
    }

    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                OraclePart::Text(text) => Some(text.as_str()),
                OraclePart::InlineImage { .. } => None,
            })
            .collect::<Vec<&str>>()
            .join("\n")
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, OraclePart::InlineImage { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OracleReply {
    pub text: String,
    pub warnings: Vec<String>,
}

pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &OracleRequest) -> Result<OracleReply, OracleError>;
}

/// Connection settings for the hosted oracle, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
    pub retries: usize,
    pub retry_backoff: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            timeout: Duration::from_secs(60),
            retries: 0,
            retry_backoff: Duration::from_secs_f64(1.2),
        }
    }
}

impl OracleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: CREDENTIAL_ENV_KEYS.iter().find_map(|key| non_empty_env(key)),
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            timeout: Duration::from_secs_f64(env_f64("HALAL_ORACLE_TIMEOUT", 60.0, 5.0, 300.0)),
            retries: env_f64("HALAL_ORACLE_RETRIES", 0.0, 0.0, 4.0).round() as usize,
            retry_backoff: Duration::from_secs_f64(env_f64(
                "HALAL_ORACLE_RETRY_BACKOFF",
                1.2,
                0.1,
                10.0,
            )),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

pub struct GeminiOracle {
    config: OracleConfig,
    http: HttpClient,
}

impl GeminiOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<HttpResponse, OracleError> {
        let max_retries = self.config.retries;
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(self.config.timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(err) => {
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(OracleError::Transport {
                            provider: GEMINI_PROVIDER.to_string(),
                            message: err.to_string(),
                        });
                    }
                    attempt += 1;
                    warnings.push(format!(
                        "Gemini transport retry {attempt}/{max_retries} after transient request failure."
                    ));
                    thread::sleep(self.config.retry_backoff.mul_f64(attempt as f64));
                }
            }
        }
    }
}

impl Oracle for GeminiOracle {
    fn name(&self) -> &str {
        GEMINI_PROVIDER
    }

    fn generate(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(OracleError::MissingCredential {
                provider: GEMINI_PROVIDER.to_string(),
            });
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = gemini_payload(request);
        let mut warnings = Vec::new();
        let response =
            self.post_with_transport_retries(&endpoint, api_key, &payload, &mut warnings)?;
        let body = response_json_or_error(GEMINI_PROVIDER, response)?;
        Ok(OracleReply {
            text: gemini_response_text(&body),
            warnings,
        })
    }
}

/// Body for `models/{model}:generateContent`.
pub fn gemini_payload(request: &OracleRequest) -> Value {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            OraclePart::Text(text) => json!({ "text": text }),
            OraclePart::InlineImage { mime, bytes } => json!({
                "inlineData": {
                    "mimeType": mime,
                    "data": BASE64.encode(bytes),
                }
            }),
        })
        .collect::<Vec<Value>>();

    let mut payload = json!({
        "contents": [{ "role": "user", "parts": parts }],
    });
    if let Some(instruction) = request.system_instruction.as_ref() {
        payload["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    if let Some(schema) = request.response_schema.as_ref() {
        payload["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    payload
}

/// Concatenated text parts of the first candidate; empty when there is none.
pub fn gemini_response_text(response_payload: &Value) -> String {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Schema of a classified product record.
pub fn product_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "brand": { "type": "STRING" },
            "status": { "type": "STRING", "enum": ["HALAL", "HARAM", "MUSHBOOH"] },
            "ingredients": { "type": "ARRAY", "items": { "type": "STRING" } },
            "explanation": { "type": "STRING" },
            "religiousReference": { "type": "STRING" },
            "category": { "type": "STRING" },
        },
        "required": ["name", "brand", "status", "ingredients", "explanation", "category"],
    })
}

/// Offline oracle. Never claims a verified status.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunOracle;

impl Oracle for DryrunOracle {
    fn name(&self) -> &str {
        DRYRUN_PROVIDER
    }

    fn generate(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        let prompt = request.prompt_text();
        if request.response_schema.is_none() {
            return Ok(OracleReply {
                text: format!("Assalamu Alaikum. [dry run] You asked: {}", prompt.trim()),
                warnings: Vec::new(),
            });
        }

        let name = quoted_subject(&prompt).unwrap_or_else(|| {
            if request.has_image() {
                "Unidentified product (photo)".to_string()
            } else {
                "Unidentified product".to_string()
            }
        });
        let record = json!({
            "name": name,
            "brand": "Unknown",
            "status": "MUSHBOOH",
            "ingredients": [],
            "explanation": "Dry-run oracle: no verified classification is available offline. Check the label and ask a scholar.",
            "category": "uncategorized",
        });
        Ok(OracleReply {
            text: record.to_string(),
            warnings: vec!["dry-run oracle produced a placeholder record".to_string()],
        })
    }
}

fn quoted_subject(prompt: &str) -> Option<String> {
    let start = prompt.find('"')?;
    let rest = &prompt[start + 1..];
    let end = rest.find('"')?;
    let subject = rest[..end].trim();
    if subject.is_empty() {
        return None;
    }
    Some(subject.to_string())
}

#[derive(Default)]
pub struct OracleRegistry {
    oracles: BTreeMap<String, Box<dyn Oracle>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `dryrun` plus `gemini` configured from `config`.
    pub fn with_defaults(config: OracleConfig) -> Self {
        let mut registry = Self::new();
        registry.register(DryrunOracle);
        registry.register(GeminiOracle::new(config));
        registry
    }

    pub fn register<O: Oracle + 'static>(&mut self, oracle: O) {
        self.oracles
            .insert(oracle.name().to_string(), Box::new(oracle));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Oracle> {
        self.oracles.get(name).map(|oracle| oracle.as_ref())
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn Oracle, OracleError> {
        self.get(name)
            .ok_or_else(|| OracleError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.oracles.keys().cloned().collect()
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, OracleError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| OracleError::Transport {
        provider: provider.to_string(),
        message: format!("response body read failed: {err}"),
    })?;
    if !status.is_success() {
        return Err(OracleError::Status {
            provider: provider.to_string(),
            code,
            body: truncate_text(&body, 512),
        });
    }
    serde_json::from_str(&body).map_err(|err| OracleError::InvalidPayload {
        provider: provider.to_string(),
        message: err.to_string(),
    })
}

fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_f64(key: &str, default: f64, min: f64, max: f64) -> f64 {
    non_empty_env(key)
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
