use anyhow::{Context, Result, anyhow};
use futures_util::{Stream, StreamExt, future};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod annotate;
pub mod buffer;
pub mod data;
pub mod editor;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod prompt;
pub mod providers;
pub mod relay;
pub mod render;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod sse;
#[cfg(test)]
mod test_util;
mod transcriber;

pub use annotate::{AnnotatedDocument, Annotation, AnnotationKind, Annotator, ImageContext};
pub use buffer::{Fragment, IncrementBuffer};
pub use editor::{DocumentSession, EditorState, InputEvent, Phase, Workspace};
pub use error::RelayError;
pub use providers::{Gemini, OpenAI, Provider, ProviderImpl, ProviderKind};
pub use relay::{RelayEvent, RelayHandle, open_relay};
pub use server::RelayClient;
pub use settings::Settings;
pub use transcriber::Transcriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Annotated structured text
    Markdown,
    /// Rendered HTML
    Html,
    /// Text without markup, tables or math delimiters
    Plain,
    /// Text, annotations and quality report
    Json,
}

#[derive(Debug, Clone)]
pub enum Command {
    Serve {
        addr: Option<String>,
    },
    Transcribe {
        files: Vec<PathBuf>,
        relay: Option<String>,
        domain: Option<String>,
        format: OutputFormat,
        jobs: Option<usize>,
    },
    Normalize {
        input: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub command: Command,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;

    match config.command {
        Command::Normalize { input } => Ok(normalize::normalize(&input)),
        Command::Serve { addr } => {
            if let Some(addr) = addr {
                settings.addr = addr;
            }
            let model = config.model.or_else(|| settings.model.clone());
            let provider = match providers::provider_from_env(model.as_deref(), config.key.as_deref())
            {
                Ok(provider) => {
                    info!(provider = provider.kind().as_str(), model = provider.model(), "provider ready");
                    Some(provider)
                }
                Err(err) => {
                    warn!(error = %err, "no usable provider");
                    None
                }
            };
            server::run_server(Arc::new(settings), provider).await?;
            Ok(String::new())
        }
        Command::Transcribe {
            files,
            relay,
            domain,
            format,
            jobs,
        } => {
            if files.is_empty() {
                return Err(anyhow!("no image files given"));
            }
            if let Some(jobs) = jobs {
                settings.max_concurrent = jobs;
            }
            let settings = Arc::new(settings);
            let backend = match relay {
                Some(url) => Backend::Relay(RelayClient::new(url)),
                None => {
                    let model = config.model.or_else(|| settings.model.clone());
                    let provider =
                        providers::provider_from_env(model.as_deref(), config.key.as_deref())
                            .with_context(|| "no provider available for direct transcription")?;
                    Backend::Direct(Transcriber::new(provider, settings.clone()))
                }
            };
            let transcriptions =
                transcribe_files(&backend, &settings, files, domain.as_deref()).await?;
            format_transcriptions(&transcriptions, format)
        }
    }
}

/// Where images are sent: straight to a provider, or through a running relay.
pub enum Backend<P: Provider> {
    Direct(Transcriber<P>),
    Relay(RelayClient),
}

#[derive(Debug, Clone, Serialize)]
pub struct Transcription {
    pub path: PathBuf,
    /// Score carried by the stream's closing event.
    pub streamed_quality: f64,
    #[serde(flatten)]
    pub document: AnnotatedDocument,
}

type EventStream = Pin<Box<dyn Stream<Item = Result<RelayEvent>> + Send>>;

/// Transcribes every file with at most `max_concurrent` streams open; results
/// keep the order of `files`.
pub async fn transcribe_files<P: Provider>(
    backend: &Backend<P>,
    settings: &Settings,
    files: Vec<PathBuf>,
    domain: Option<&str>,
) -> Result<Vec<Transcription>> {
    let scheduler = scheduler::Scheduler::new(settings.max_concurrent);
    let jobs = files.into_iter().map(|path| {
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .run(transcribe_file(backend, settings, path, domain))
                .await?
        }
    });
    future::join_all(jobs).await.into_iter().collect()
}

async fn transcribe_file<P: Provider>(
    backend: &Backend<P>,
    settings: &Settings,
    path: PathBuf,
    domain: Option<&str>,
) -> Result<Transcription> {
    let image = data::load_attachment(&path, None)?;
    let context = ImageContext::inspect(&image.bytes, domain, settings.low_quality_min_side);
    debug!(path = %path.display(), mime = %image.mime, ?context, "transcribing");

    let events: EventStream = match backend {
        Backend::Direct(transcriber) => {
            let handle = open_relay(transcriber.clone(), image, domain.map(str::to_string))
                .await
                .map_err(anyhow::Error::new)
                .with_context(|| format!("failed to transcribe {}", path.display()))?;
            Box::pin(handle.into_stream().map(Ok))
        }
        Backend::Relay(client) => Box::pin(client.recognize(&image, domain).await?),
    };

    let mut session = DocumentSession::new();
    let streamed_quality = drive_session(events, &mut session)
        .await
        .with_context(|| format!("failed to transcribe {}", path.display()))?;
    let document = session.finish(&Annotator::new(settings), context)?;
    Ok(Transcription {
        path,
        streamed_quality,
        document,
    })
}

/// Feeds fragments into `session` until the closing event and returns the
/// streamed quality score. A failure event or a stream that ends without
/// closing aborts the session.
pub async fn drive_session<S>(mut events: S, session: &mut DocumentSession) -> Result<f64>
where
    S: Stream<Item = Result<RelayEvent>> + Unpin,
{
    while let Some(event) = events.next().await {
        match event {
            Ok(RelayEvent::Fragment(text)) => {
                session.push_text(&text)?;
            }
            Ok(RelayEvent::Done { quality }) => return Ok(quality),
            Ok(RelayEvent::Failed(err)) => {
                session.abort();
                return Err(anyhow::Error::new(err));
            }
            Err(err) => {
                session.abort();
                return Err(err);
            }
        }
    }
    session.abort();
    Err(anyhow!("stream ended without a closing event"))
}

fn format_transcriptions(transcriptions: &[Transcription], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(transcriptions)
            .with_context(|| "failed to serialize transcriptions");
    }
    let multiple = transcriptions.len() > 1;
    let sections = transcriptions
        .iter()
        .map(|transcription| {
            let text = &transcription.document.text;
            let body = match format {
                OutputFormat::Html => render::render_html(text),
                OutputFormat::Plain => render::plain_text(text),
                _ => text.clone(),
            };
            if multiple {
                format!("==> {} <==\n{}", transcription.path.display(), body)
            } else {
                body
            }
        })
        .collect::<Vec<_>>();
    Ok(sections.join("\n\n"))
}
