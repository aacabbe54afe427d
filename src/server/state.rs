use std::sync::Arc;

use crate::providers::Provider;
use crate::settings::Settings;
use crate::transcriber::Transcriber;

/// Shared read-only state. `transcriber` is `None` when no API key was found
/// at startup; requests then fail with a configuration error.
pub struct ServerState<P: Provider> {
    pub(crate) settings: Arc<Settings>,
    pub(crate) transcriber: Option<Transcriber<P>>,
}

impl<P: Provider> ServerState<P> {
    pub fn new(settings: Arc<Settings>, provider: Option<P>) -> Self {
        let transcriber = provider.map(|provider| Transcriber::new(provider, settings.clone()));
        Self {
            settings,
            transcriber,
        }
    }
}
