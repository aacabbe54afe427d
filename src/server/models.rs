use serde::{Deserialize, Serialize};

/// Body of `POST /api/recognize`. `image_data` is base64, optionally as a
/// `data:` URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeRequest {
    pub image_data: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Payload of every non-error event on the response stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct FragmentPayload {
    pub(crate) text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) quality: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReceivedError {
    pub(crate) error: ReceivedErrorPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReceivedErrorPayload {
    pub(crate) code: String,
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) details: Option<String>,
}
