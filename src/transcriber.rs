use anyhow::Result;
use std::sync::Arc;

use crate::annotate::Annotator;
use crate::data::DataAttachment;
use crate::prompt;
use crate::providers::{FragmentStream, Provider};
use crate::settings::Settings;

/// Binds a provider to the transcription prompt and the annotator built from
/// the same settings.
#[derive(Debug, Clone)]
pub struct Transcriber<P: Provider> {
    provider: P,
    settings: Arc<Settings>,
    annotator: Annotator,
}

impl<P: Provider> Transcriber<P> {
    pub fn new(provider: P, settings: Arc<Settings>) -> Self {
        let annotator = Annotator::new(&settings);
        Self {
            provider,
            settings,
            annotator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Opens one generation call for `image`. Resolves when the upstream has
    /// accepted the request; fragments are read from the returned stream.
    pub async fn open_stream(
        &self,
        image: DataAttachment,
        domain: Option<&str>,
    ) -> Result<FragmentStream> {
        let system_prompt = prompt::render_transcribe_prompt(domain)?;
        self.provider
            .clone()
            .append_system_input(system_prompt)
            .append_user_data(image)
            .stream_text()
            .await
    }
}
