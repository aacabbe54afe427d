use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    Message, MessagePart, MessageRole, Provider, ProviderFuture, format_error_parts,
    fragment_stream,
};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    model: String,
    messages: Vec<Message>,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            messages: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self) -> Value {
        let (system_inputs, user_inputs): (Vec<&Message>, Vec<&Message>) = self
            .messages
            .iter()
            .partition(|message| matches!(message.role, MessageRole::System));

        let system_instruction = system_inputs
            .into_iter()
            .flat_map(|message| &message.parts)
            .filter_map(|part| match part {
                MessagePart::Text(text) => Some(text.as_str()),
                MessagePart::Data(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let parts = user_inputs
            .into_iter()
            .flat_map(|message| &message.parts)
            .map(|part| match part {
                MessagePart::Text(text) => json!({"text": text}),
                MessagePart::Data(data) => json!({
                    "inline_data": {
                        "mime_type": data.mime,
                        "data": BASE64.encode(&data.bytes)
                    }
                }),
            })
            .collect::<Vec<_>>();

        json!({
            "contents": [{"role": "user", "parts": parts}],
            "systemInstruction": if system_instruction.trim().is_empty() { Value::Null } else { json!({"parts": [{"text": system_instruction}]}) },
            "generationConfig": {
                "temperature": 1,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192,
                "responseMimeType": "text/plain"
            }
        })
    }
}

impl Provider for Gemini {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_data(mut self, data: crate::data::DataAttachment) -> Self {
        self.messages.push(Message::user_data(data));
        self
    }

    fn stream_text(self) -> ProviderFuture {
        Box::pin(async move {
            let url = format!("{}/{}:streamGenerateContent?alt=sse", BASE_URL, self.model);
            let body = self.request_body();
            debug!(model = %self.model, "opening Gemini stream");

            let response = reqwest::Client::new()
                .post(&url)
                .header("x-goog-api-key", self.key.clone())
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach Gemini")?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "Gemini API error ({}): {}",
                    status,
                    extract_gemini_error(&text).unwrap_or(text)
                ));
            }

            Ok(fragment_stream(response, extract_chunk_text))
        })
    }
}

fn extract_chunk_text(data: &str) -> Result<Option<String>> {
    if let Some(message) = extract_gemini_error(data) {
        return Err(anyhow!("Gemini API error: {}", message));
    }
    let chunk: GeminiChunk =
        serde_json::from_str(data).with_context(|| "failed to parse Gemini stream chunk")?;
    if let Some(reason) = chunk
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(anyhow!("Gemini refused the image: {}", reason));
    }
    let text = chunk
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| &content.parts)
        .filter_map(|part| part.text.as_deref())
        .collect::<String>();
    Ok(Some(text).filter(|value| !value.is_empty()))
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(
        error.message,
        error.status,
        error.code.map(|value| value.to_string()),
    ))
}

#[derive(Debug, Deserialize)]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
