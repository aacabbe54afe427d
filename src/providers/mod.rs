use anyhow::{Result, anyhow};
use futures_util::{Stream, TryStreamExt, future};
use std::future::Future;
use std::pin::Pin;

use crate::data::DataAttachment;
use crate::sse;

mod gemini;
mod openai;

pub use gemini::Gemini;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub requested_model: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone)]
pub enum MessagePart {
    Text(String),
    Data(DataAttachment),
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            parts: vec![MessagePart::Text(content)],
        }
    }

    pub fn user_data(data: DataAttachment) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::Data(data)],
        }
    }
}

/// Text fragments of one generation, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Resolves once the upstream accepted the request and output can be read.
pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<FragmentStream>> + Send>>;

pub trait Provider: Clone + Send + Sync + 'static {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_data(self, data: DataAttachment) -> Self;
    fn stream_text(self) -> ProviderFuture;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    OpenAI(OpenAI),
    Gemini(Gemini),
}

impl ProviderImpl {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderImpl::OpenAI(_) => ProviderKind::OpenAI,
            ProviderImpl::Gemini(_) => ProviderKind::Gemini,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderImpl::OpenAI(provider) => provider.model(),
            ProviderImpl::Gemini(provider) => provider.model(),
        }
    }
}

impl Provider for ProviderImpl {
    fn append_system_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => {
                ProviderImpl::OpenAI(provider.append_system_input(input))
            }
            ProviderImpl::Gemini(provider) => {
                ProviderImpl::Gemini(provider.append_system_input(input))
            }
        }
    }

    fn append_user_data(self, data: DataAttachment) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => ProviderImpl::OpenAI(provider.append_user_data(data)),
            ProviderImpl::Gemini(provider) => ProviderImpl::Gemini(provider.append_user_data(data)),
        }
    }

    fn stream_text(self) -> ProviderFuture {
        match self {
            ProviderImpl::OpenAI(provider) => provider.stream_text(),
            ProviderImpl::Gemini(provider) => provider.stream_text(),
        }
    }
}

/// Maps an event-stream response body to text fragments. `extract` returns
/// `Ok(None)` for events that carry no text.
pub(crate) fn fragment_stream<F>(response: reqwest::Response, extract: F) -> FragmentStream
where
    F: Fn(&str) -> Result<Option<String>> + Send + Sync + 'static,
{
    let events = sse::decode(response.bytes_stream());
    Box::pin(events.try_filter_map(move |event| future::ready(extract(&event.data))))
}

pub(crate) fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code
        && !code.trim().is_empty()
    {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

pub fn build_provider(provider: ProviderKind, key: String, model: Option<String>) -> ProviderImpl {
    let model = model.unwrap_or_default();
    match provider {
        ProviderKind::OpenAI => ProviderImpl::OpenAI(OpenAI::new(key).with_model(model)),
        ProviderKind::Gemini => ProviderImpl::Gemini(Gemini::new(key).with_model(model)),
    }
}

/// Picks the provider from `--model` / settings, falls back to whichever key
/// is present, and fails when no key can be found.
pub fn provider_from_env(
    model_arg: Option<&str>,
    override_key: Option<&str>,
) -> Result<ProviderImpl> {
    let selection = resolve_provider_selection(model_arg, override_key)?;
    let key = resolve_key(selection.provider, override_key)?;
    Ok(build_provider(
        selection.provider,
        key,
        selection.requested_model,
    ))
}

pub fn resolve_provider_selection(
    model_arg: Option<&str>,
    override_key: Option<&str>,
) -> Result<ProviderSelection> {
    match model_arg {
        Some(model) => parse_model_arg(model),
        None => default_provider_selection(override_key),
    }
}

pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key {
        return Ok(key.to_string());
    }

    match provider {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
        ProviderKind::Gemini => get_env("GEMINI_API_KEY").or_else(|| get_env("GOOGLE_API_KEY")),
    }
    .ok_or_else(|| anyhow!("API_KEY not configured for {}", provider.as_str()))
}

fn default_provider_selection(override_key: Option<&str>) -> Result<ProviderSelection> {
    if get_env("GEMINI_API_KEY").is_some() || get_env("GOOGLE_API_KEY").is_some() {
        return Ok(ProviderSelection {
            provider: ProviderKind::Gemini,
            requested_model: None,
        });
    }

    if get_env("OPENAI_API_KEY").is_some() || override_key.is_some() {
        return Ok(ProviderSelection {
            provider: ProviderKind::OpenAI,
            requested_model: None,
        });
    }

    Err(anyhow!(
        "no API_KEY found (checked GEMINI_API_KEY/GOOGLE_API_KEY, OPENAI_API_KEY)"
    ))
}

fn parse_model_arg(model_arg: &str) -> Result<ProviderSelection> {
    let raw = model_arg.trim();
    if raw.is_empty() {
        return Err(anyhow!("model argument is empty"));
    }

    if let Some(provider) = provider_from_name(&raw.to_lowercase()) {
        return Ok(ProviderSelection {
            provider,
            requested_model: None,
        });
    }

    if let Some((provider, model)) = parse_provider_model_pair(raw) {
        return Ok(ProviderSelection {
            provider,
            requested_model: model,
        });
    }

    if raw.starts_with("gemini") {
        return Ok(ProviderSelection {
            provider: ProviderKind::Gemini,
            requested_model: Some(raw.to_string()),
        });
    }

    if raw.starts_with("gpt") || raw.starts_with("o1") || raw.starts_with("o3") {
        return Ok(ProviderSelection {
            provider: ProviderKind::OpenAI,
            requested_model: Some(raw.to_string()),
        });
    }

    Err(anyhow!(
        "unable to infer provider from model '{}'. Use provider:model (openai:, gemini:)",
        raw
    ))
}

fn parse_provider_model_pair(input: &str) -> Option<(ProviderKind, Option<String>)> {
    let (provider_part, model_part) = input.split_once(':')?;
    let provider = provider_from_name(&provider_part.to_lowercase())?;
    let model = Some(model_part.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    Some((provider, model))
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "openai" => Some(ProviderKind::OpenAI),
        "gemini" | "google" => Some(ProviderKind::Gemini),
        _ => None,
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_argument_forms() {
        assert_eq!(
            parse_model_arg("gemini:gemini-2.5-pro").unwrap(),
            ProviderSelection {
                provider: ProviderKind::Gemini,
                requested_model: Some("gemini-2.5-pro".to_string()),
            }
        );
        assert_eq!(
            parse_model_arg("OpenAI").unwrap(),
            ProviderSelection {
                provider: ProviderKind::OpenAI,
                requested_model: None,
            }
        );
        assert_eq!(
            parse_model_arg("gpt-4o").unwrap().provider,
            ProviderKind::OpenAI
        );
        assert_eq!(
            parse_model_arg("openai:").unwrap().requested_model,
            None
        );
        assert!(parse_model_arg("  ").is_err());
        assert!(parse_model_arg("llama3").is_err());
    }

    #[test]
    fn override_key_wins_and_builds_requested_model() {
        let provider = provider_from_env(Some("gemini:gemini-2.0-flash"), Some("k")).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Gemini);
        assert_eq!(provider.model(), "gemini-2.0-flash");

        let provider = provider_from_env(Some("openai"), Some("k")).unwrap();
        assert_eq!(provider.model(), openai::DEFAULT_MODEL);
    }
}
