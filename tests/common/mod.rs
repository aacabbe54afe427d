#![allow(dead_code)]

use anyhow::anyhow;
use futures_util::{StreamExt, stream};
use llm_ocr_rust::data::DataAttachment;
use llm_ocr_rust::providers::{FragmentStream, Provider, ProviderFuture};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted upstream: yields `fragments`, then ends, stalls or fails.
#[derive(Debug, Clone, Default)]
pub struct TestProvider {
    pub fragments: Vec<&'static str>,
    pub open_delay: Option<Duration>,
    pub open_error: Option<&'static str>,
    pub stream_error: Option<&'static str>,
    pub stall: bool,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
    pub saw_image: Arc<AtomicBool>,
}

impl TestProvider {
    pub fn with_fragments(fragments: Vec<&'static str>) -> Self {
        Self {
            fragments,
            ..Self::default()
        }
    }
}

struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Provider for TestProvider {
    fn append_system_input(self, _input: String) -> Self {
        self
    }

    fn append_user_data(self, data: DataAttachment) -> Self {
        if data.mime.starts_with("image/") && !data.bytes.is_empty() {
            self.saw_image.store(true, Ordering::SeqCst);
        }
        self
    }

    fn stream_text(self) -> ProviderFuture {
        Box::pin(async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.open_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = self.open_error {
                return Err(anyhow!(message));
            }

            let flag = ReleaseFlag(self.released.clone());
            let fragments = stream::iter(
                self.fragments
                    .into_iter()
                    .map(|text| Ok(text.to_string())),
            );
            let stream: FragmentStream = if let Some(message) = self.stream_error {
                Box::pin(fragments.chain(stream::once(async move { Err(anyhow!(message)) })))
            } else if self.stall {
                Box::pin(fragments.chain(stream::pending()))
            } else {
                Box::pin(fragments)
            };
            Ok(Box::pin(stream.map(move |item| {
                let _held = &flag;
                item
            })) as FragmentStream)
        })
    }
}

/// 1x1 PNG.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xF8,
    0xCF, 0xC0, 0xF0, 0x1F, 0x00, 0x05, 0x00, 0x01, 0xFF, 0x89, 0x99, 0x3D, 0x1D, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

pub fn png_attachment() -> DataAttachment {
    DataAttachment {
        bytes: TINY_PNG.to_vec(),
        mime: "image/png".to_string(),
        name: None,
    }
}
