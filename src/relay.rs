//! Forwards one generation call as an ordered, cancellable event sequence.
//!
//! [`open_relay`] awaits the upstream open, raced against `request_timeout`,
//! so a call that never opens fails before any event is produced. Dropping
//! that future abandons the open. Every later read is raced against
//! `read_timeout`; whatever settles first wins, and a losing upstream call is
//! dropped, which releases its connection.

use futures_util::{Stream, StreamExt, stream};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::annotate::Annotator;
use crate::data::DataAttachment;
use crate::error::RelayError;
use crate::normalize::normalize;
use crate::providers::{FragmentStream, Provider};
use crate::transcriber::Transcriber;

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Fragment(String),
    /// Sent once after the last fragment.
    Done { quality: f64 },
    /// A failure after the stream opened. Sent at most once; nothing follows it.
    Failed(RelayError),
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub request: Duration,
    pub read: Duration,
}

/// Receiving side of a running relay. Cancelling the token (or dropping the
/// receiver) stops the forwarder at its next read.
#[derive(Debug)]
pub struct RelayHandle {
    pub events: mpsc::Receiver<RelayEvent>,
    pub cancel: CancellationToken,
}

impl RelayHandle {
    /// Event stream that cancels the relay when dropped.
    pub fn into_stream(self) -> impl Stream<Item = RelayEvent> + Send + 'static {
        let RelayHandle { events, cancel } = self;
        stream::unfold(
            (events, cancel.drop_guard()),
            |(mut events, guard)| async move {
                let event = events.recv().await?;
                Some((event, (events, guard)))
            },
        )
    }
}

/// Opens the generation call and, once the upstream accepted it, spawns the
/// forwarder. Open failures come back as the error instead of an event.
pub async fn open_relay<P: Provider>(
    transcriber: Transcriber<P>,
    image: DataAttachment,
    domain: Option<String>,
) -> Result<RelayHandle, RelayError> {
    let timeouts = Timeouts {
        request: transcriber.settings().request_timeout,
        read: transcriber.settings().read_timeout,
    };
    let started = Instant::now();
    let bytes = image.bytes.len();

    let upstream = match timeout(
        timeouts.request,
        transcriber.open_stream(image, domain.as_deref()),
    )
    .await
    {
        Ok(Ok(upstream)) => upstream,
        Ok(Err(err)) => {
            warn!(error = %format!("{:#}", err), "failed to open generation stream");
            return Err(RelayError::classify(&err));
        }
        Err(_) => {
            warn!(timeout = ?timeouts.request, "generation stream did not open in time");
            return Err(RelayError::Timeout {
                details: format!("no response within {:?}", timeouts.request),
            });
        }
    };
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "generation stream opened");

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();
    let forwarder = Forwarder {
        annotator: transcriber.annotator().clone(),
        read_timeout: timeouts.read,
        bytes,
        started,
        token: cancel.clone(),
        tx,
    };
    tokio::spawn(forwarder.run(upstream));
    Ok(RelayHandle { events: rx, cancel })
}

struct Forwarder {
    annotator: Annotator,
    read_timeout: Duration,
    bytes: usize,
    started: Instant,
    token: CancellationToken,
    tx: mpsc::Sender<RelayEvent>,
}

impl Forwarder {
    async fn run(self, mut upstream: FragmentStream) {
        let mut raw = String::new();
        let mut fragments = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!(
                        fragments,
                        elapsed_ms = self.started.elapsed().as_millis() as u64,
                        "client disconnected; dropping generation stream"
                    );
                    return;
                }
                next = timeout(self.read_timeout, upstream.next()) => next,
            };
            match next {
                Ok(Some(Ok(text))) => {
                    raw.push_str(&text);
                    fragments += 1;
                    if self.tx.send(RelayEvent::Fragment(text)).await.is_err() {
                        debug!("event receiver dropped");
                        return;
                    }
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    warn!(error = %format!("{:#}", err), "generation stream failed");
                    let _ = self.tx.send(RelayEvent::Failed(RelayError::classify(&err))).await;
                    return;
                }
                Err(_) => {
                    warn!(timeout = ?self.read_timeout, fragments, "generation stream stalled");
                    let _ = self
                        .tx
                        .send(RelayEvent::Failed(RelayError::Timeout {
                            details: format!("no output for {:?}", self.read_timeout),
                        }))
                        .await;
                    return;
                }
            }
        }

        let quality = self.annotator.quality(&normalize(&raw));
        info!(
            bytes = self.bytes,
            fragments,
            quality,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "transcription stream completed"
        );
        let _ = self.tx.send(RelayEvent::Done { quality }).await;
    }
}
