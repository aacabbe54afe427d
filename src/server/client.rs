use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt, future};

use super::models::{FragmentPayload, ReceivedError, RecognizeRequest};
use crate::data::DataAttachment;
use crate::error::RelayError;
use crate::relay::RelayEvent;
use crate::sse::{self, SseEvent};

/// Posts images to a running relay and decodes its event stream.
#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    http: reqwest::Client,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Starts a transcription. Rejections before the stream opens come back
    /// as `Err` carrying the relay's error code.
    pub async fn recognize(
        &self,
        image: &DataAttachment,
        domain: Option<&str>,
    ) -> Result<impl Stream<Item = Result<RelayEvent>> + Send + 'static> {
        let request = RecognizeRequest {
            image_data: image.encoded(),
            mime_type: image.mime.clone(),
            domain: domain.map(str::to_string),
        };
        let response = self
            .http
            .post(format!("{}/api/recognize", self.base_url))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to reach relay at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = serde_json::from_str::<ReceivedError>(&text)
                .map(|body| decode_error(body.error))
                .unwrap_or_else(|_| RelayError::Unknown { details: text });
            return Err(anyhow::Error::new(err).context(format!("relay answered {}", status)));
        }

        Ok(sse::decode(response.bytes_stream())
            .filter_map(|event| future::ready(event.and_then(decode_event).transpose())))
    }
}

fn decode_error(payload: super::models::ReceivedErrorPayload) -> RelayError {
    RelayError::from_code(&payload.code, &payload.message, payload.details)
}

/// `Ok(None)` for events that carry nothing (keep-alives).
pub(crate) fn decode_event(event: SseEvent) -> Result<Option<RelayEvent>> {
    if event.is_error() {
        let body: ReceivedError =
            serde_json::from_str(&event.data).with_context(|| "malformed error event")?;
        return Ok(Some(RelayEvent::Failed(decode_error(body.error))));
    }
    if event.data.is_empty() {
        return Ok(None);
    }
    let payload: FragmentPayload =
        serde_json::from_str(&event.data).with_context(|| "malformed fragment event")?;
    Ok(Some(match payload.quality {
        Some(quality) => RelayEvent::Done { quality },
        None => RelayEvent::Fragment(payload.text),
    }))
}
