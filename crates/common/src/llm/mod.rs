//! LLM service abstraction: provider-agnostic prompt execution with per-provider
//! rate limiting, retry, ordered-provider fallback, and a four-strategy JSON-mode
//! parse cascade.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, Error as BackoffError, ExponentialBackoff};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Per-provider token bucket, keyed by provider name.
type ProviderRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Provider-agnostic prompt execution contract.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Executes a prompt. `json_mode` hints providers that support a structured
    /// output mode to constrain their response to JSON.
    async fn generate(&self, system: &str, user: &str, json_mode: bool) -> Result<String>;

    fn provider_name(&self) -> &str;
}

/// OpenAI-compatible chat completion provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    name: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(name: String, api_key: String, model: String, base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build LLM HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            name,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            response_format: json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmUnavailable {
                message: format!("request failed: {e}"),
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(30);
            return Err(AppError::RateLimited {
                retry_after_seconds: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmUnavailable {
                message: format!("API error {status}: {body}"),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AppError::LlmUnavailable {
            message: format!("failed to parse response: {e}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::LlmUnavailable {
                message: "empty choices array".to_string(),
            })
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

/// Deterministic, keyword-based provider used as the final fallback for callers
/// that can tolerate degraded output (intent classification, follow-up
/// suggestions). Never fails; never produces well-formed JSON.
pub struct RuleBasedProvider;

#[async_trait]
impl LlmProvider for RuleBasedProvider {
    async fn generate(&self, _system: &str, user: &str, _json_mode: bool) -> Result<String> {
        let lower = user.to_lowercase();
        let answer = if lower.contains("find") || lower.contains("list") || lower.contains("show") {
            "search"
        } else if lower.contains("similar") || lower.contains("like") || lower.contains("about") {
            "vector"
        } else if lower.contains("compare") {
            "compare"
        } else if lower.contains("gap") || lower.contains("opportunity") {
            "identify_gaps"
        } else {
            "explore"
        };
        Ok(answer.to_string())
    }

    fn provider_name(&self) -> &str {
        "rule-based"
    }
}

struct RateLimitedProvider {
    provider: Arc<dyn LlmProvider>,
    limiter: ProviderRateLimiter,
}

/// Executes prompts across an ordered provider chain: primary, then alternates,
/// then a rule-based last resort. Each named provider carries its own
/// requests-per-minute token bucket; retries within a provider use backoff
/// capped at `backoff_cap_secs`.
pub struct LlmService {
    providers: Vec<RateLimitedProvider>,
    rule_based: RuleBasedProvider,
    max_retries: u32,
    backoff_cap_secs: u64,
}

impl LlmService {
    pub fn new(
        providers: Vec<(Arc<dyn LlmProvider>, u32)>,
        max_retries: u32,
        backoff_cap_secs: u64,
    ) -> Self {
        let wrapped = providers
            .into_iter()
            .map(|(provider, requests_per_minute)| {
                let quota = Quota::per_minute(
                    NonZeroU32::new(requests_per_minute.max(1)).unwrap(),
                );
                RateLimitedProvider {
                    provider,
                    limiter: RateLimiter::direct(quota),
                }
            })
            .collect();

        Self {
            providers: wrapped,
            rule_based: RuleBasedProvider,
            max_retries,
            backoff_cap_secs,
        }
    }

    /// Runs a prompt through the provider chain, respecting each provider's
    /// rate-limit bucket and retry budget, falling back in order. Returns
    /// `LlmUnavailable` only if the rule-based fallback also cannot be reached,
    /// which never happens in practice — `RuleBasedProvider::generate` never fails.
    pub async fn generate(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        for entry in &self.providers {
            match self.try_provider(entry, system, user, json_mode).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(
                        provider = entry.provider.provider_name(),
                        error = %e,
                        "LLM provider exhausted, falling back"
                    );
                    continue;
                }
            }
        }

        tracing::warn!("all configured LLM providers exhausted, using rule-based fallback");
        self.rule_based.generate(system, user, json_mode).await
    }

    /// Retries within the provider's own budget: a server-given `retry_after_seconds`
    /// on `RateLimited` overrides the schedule for that one step, otherwise the
    /// exponential backoff (capped at `backoff_cap_secs`) picks the delay. The
    /// overall retry window is bounded by `max_retries + 1` backoff steps.
    async fn try_provider(
        &self,
        entry: &RateLimitedProvider,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<String> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(self.backoff_cap_secs),
            max_elapsed_time: Some(Duration::from_secs(self.backoff_cap_secs * (self.max_retries as u64 + 1))),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            if entry.limiter.check().is_err() {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }

            match entry.provider.generate(system, user, json_mode).await {
                Ok(text) => Ok(text),
                Err(e @ AppError::RateLimited { retry_after_seconds }) => {
                    let delay = Duration::from_secs(retry_after_seconds.min(self.backoff_cap_secs));
                    Err(BackoffError::Transient { err: e, retry_after: Some(delay) })
                }
                Err(e) => {
                    tracing::warn!(error = %e, "LLM request failed, retrying");
                    Err(BackoffError::transient(e))
                }
            }
        })
        .await;

        crate::metrics::record_llm_call(entry.provider.provider_name(), result.is_ok());
        result
    }

    /// Resolves the effective API key following `user-preference → env → default`.
    pub fn resolve_api_key<'a>(user_preference: Option<&'a str>, env: Option<&'a str>, default: Option<&'a str>) -> Option<&'a str> {
        user_preference.or(env).or(default)
    }
}

/// Four-strategy JSON-mode parse cascade: strict parse, fenced code block,
/// first balanced `{...}` span, best-effort key regex. Returns `LlmParseError`
/// rather than guessing when every strategy fails.
pub fn parse_json_cascade<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T> {
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return Ok(value);
    }

    if let Some(fenced) = extract_fenced_block(raw) {
        if let Ok(value) = serde_json::from_str::<T>(&fenced) {
            return Ok(value);
        }
    }

    if let Some(span) = extract_balanced_braces(raw) {
        if let Ok(value) = serde_json::from_str::<T>(&span) {
            return Ok(value);
        }
    }

    if let Some(reconstructed) = best_effort_key_regex(raw) {
        if let Ok(value) = serde_json::from_str::<T>(&reconstructed) {
            return Ok(value);
        }
    }

    Err(AppError::LlmParseError {
        message: format!("all four JSON parse strategies failed on: {}", truncate(raw, 200)),
    })
}

fn extract_fenced_block(raw: &str) -> Option<String> {
    let start_marker = raw.find("```json").map(|i| i + 7).or_else(|| raw.find("```").map(|i| i + 3))?;
    let rest = &raw[start_marker..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn extract_balanced_braces(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Last-resort recovery: scans for `"key": value` pairs with regex-lite and
/// reassembles a minimal JSON object. Only useful for flat schemas.
fn best_effort_key_regex(raw: &str) -> Option<String> {
    use regex_lite::Regex;
    let re = Regex::new(r#""([a-zA-Z_][a-zA-Z0-9_]*)"\s*:\s*("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?|true|false|null)"#).ok()?;
    let mut pairs = Vec::new();
    for cap in re.captures_iter(raw) {
        let key = cap.get(1)?.as_str();
        let value = cap.get(2)?.as_str();
        pairs.push(format!("\"{key}\":{value}"));
    }
    if pairs.is_empty() {
        None
    } else {
        Some(format!("{{{}}}", pairs.join(",")))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Intent {
        intent: String,
        confidence: f32,
    }

    #[test]
    fn strict_parse_succeeds_on_clean_json() {
        let raw = r#"{"intent":"search","confidence":0.9}"#;
        let parsed: Intent = parse_json_cascade(raw).unwrap();
        assert_eq!(parsed.intent, "search");
    }

    #[test]
    fn fenced_block_is_extracted() {
        let raw = "Here is the answer:\n```json\n{\"intent\":\"compare\",\"confidence\":0.5}\n```\nThanks.";
        let parsed: Intent = parse_json_cascade(raw).unwrap();
        assert_eq!(parsed.intent, "compare");
    }

    #[test]
    fn balanced_braces_extracted_from_surrounding_prose() {
        let raw = "I think {\"intent\":\"explore\",\"confidence\":0.7} is right.";
        let parsed: Intent = parse_json_cascade(raw).unwrap();
        assert_eq!(parsed.intent, "explore");
    }

    #[test]
    fn all_strategies_fail_returns_parse_error() {
        let raw = "no json content here at all";
        let result: Result<Intent> = parse_json_cascade(raw);
        assert!(matches!(result, Err(AppError::LlmParseError { .. })));
    }

    #[tokio::test]
    async fn rule_based_provider_classifies_by_keyword() {
        let provider = RuleBasedProvider;
        let result = provider.generate("", "find all papers about X", false).await.unwrap();
        assert_eq!(result, "search");
    }

    #[test]
    fn api_key_precedence_prefers_user_preference() {
        let resolved = LlmService::resolve_api_key(Some("user"), Some("env"), Some("default"));
        assert_eq!(resolved, Some("user"));

        let resolved = LlmService::resolve_api_key(None, Some("env"), Some("default"));
        assert_eq!(resolved, Some("env"));
    }
}
