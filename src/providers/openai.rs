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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 4096;
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    messages: Vec<Message>,
}

impl OpenAI {
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
        let messages = self
            .messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                };
                let content = message
                    .parts
                    .iter()
                    .map(|part| match part {
                        MessagePart::Text(text) => json!({"type": "text", "text": text}),
                        MessagePart::Data(data) => {
                            let url =
                                format!("data:{};base64,{}", data.mime, BASE64.encode(&data.bytes));
                            json!({"type": "image_url", "image_url": {"url": url}})
                        }
                    })
                    .collect::<Vec<_>>();
                json!({"role": role, "content": content})
            })
            .collect::<Vec<_>>();

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": MAX_TOKENS,
            "stream": true
        })
    }
}

impl Provider for OpenAI {
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
            let url = format!("{}/chat/completions", base_url());
            let body = self.request_body();
            debug!(model = %self.model, "opening OpenAI stream");

            let response = reqwest::Client::new()
                .post(&url)
                .bearer_auth(self.key.clone())
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach OpenAI")?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "OpenAI API error ({}): {}",
                    status,
                    extract_openai_error(&text).unwrap_or(text)
                ));
            }

            Ok(fragment_stream(response, extract_delta_text))
        })
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_delta_text(data: &str) -> Result<Option<String>> {
    if data.trim() == DONE_MARKER {
        return Ok(None);
    }
    if let Some(message) = extract_openai_error(data) {
        return Err(anyhow!("OpenAI API error: {}", message));
    }
    let chunk: OpenAIChunk =
        serde_json::from_str(data).with_context(|| "failed to parse OpenAI stream chunk")?;
    let text = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.and_then(|delta| delta.content))
        .collect::<String>();
    Ok(Some(text).filter(|value| !value.is_empty()))
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    delta: Option<OpenAIDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataAttachment;
    use insta::assert_json_snapshot;

    #[test]
    fn request_body_sends_image_as_data_url() {
        let provider = OpenAI::new("key")
            .with_model("gpt-4o")
            .append_system_input("transcribe".to_string())
            .append_user_data(DataAttachment {
                bytes: b"jpg".to_vec(),
                mime: "image/jpeg".to_string(),
                name: None,
            });
        assert_json_snapshot!(provider.request_body(), @r#"
        {
          "max_tokens": 4096,
          "messages": [
            {
              "content": [
                {
                  "text": "transcribe",
                  "type": "text"
                }
              ],
              "role": "system"
            },
            {
              "content": [
                {
                  "image_url": {
                    "url": "data:image/jpeg;base64,anBn"
                  },
                  "type": "image_url"
                }
              ],
              "role": "user"
            }
          ],
          "model": "gpt-4o",
          "stream": true
        }
        "#);
    }

    #[test]
    fn deltas_done_marker_and_errors() {
        let chunk = r#"{"choices":[{"index":0,"delta":{"content":"| a |"}}]}"#;
        assert_eq!(
            extract_delta_text(chunk).unwrap().as_deref(),
            Some("| a |")
        );
        let role_only = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(extract_delta_text(role_only).unwrap(), None);
        assert_eq!(extract_delta_text("[DONE]").unwrap(), None);

        let error = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let err = extract_delta_text(error).unwrap_err().to_string();
        assert!(err.contains("Incorrect API key provided"));
    }
}
