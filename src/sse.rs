use anyhow::{Error, Result};
use futures_util::{Stream, StreamExt, stream};
use std::collections::VecDeque;

/// One server-sent event. `event` is `None` for the default message type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn is_error(&self) -> bool {
        self.event.as_deref() == Some("error")
    }
}

/// Incremental `text/event-stream` decoder. Bytes are buffered until a blank
/// line closes an event, so chunks may split lines or UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some((end, separator)) = find_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + separator).take(end).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes an event left unterminated when the connection closed.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&block))
    }
}

fn find_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|index| {
        let rest = &buffer[index..];
        if rest.starts_with(b"\n\n") {
            Some((index, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((index, 4))
        } else {
            None
        }
    })
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data = Vec::new();
    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }
    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

/// Decodes a byte stream (such as `reqwest::Response::bytes_stream`) into
/// events. A transport error is yielded once and ends the stream.
pub fn decode<S, B, E>(bytes: S) -> impl Stream<Item = Result<SseEvent>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = (Box::pin(bytes), SseDecoder::new(), VecDeque::new(), false);
    stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (bytes, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(chunk.as_ref())),
                    Some(Err(err)) => {
                        done = true;
                        let err = Error::new(err).context("event stream read failed");
                        return Some((Err(err), (bytes, decoder, pending, done)));
                    }
                    None => {
                        done = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(text: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: text.to_string(),
        }
    }

    #[test]
    fn events_survive_arbitrary_chunking() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"te").is_empty());
        assert!(decoder.push(b"xt\":\"a\"}\n").is_empty());
        let events = decoder.push(b"\ndata: b\n\ndata: c");
        assert_eq!(events, vec![data("{\"text\":\"a\"}"), data("b")]);
        assert_eq!(decoder.finish(), Some(data("c")));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn split_utf8_sequences_are_reassembled() {
        let bytes = "data: 手書き\n\n".as_bytes();
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..8]).is_empty());
        assert_eq!(decoder.push(&bytes[8..]), vec![data("手書き")]);
    }

    #[test]
    fn named_events_comments_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\n\r\nevent: error\r\ndata: one\r\ndata: two\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: Some("error".to_string()),
                data: "one\ntwo".to_string(),
            }]
        );
        assert!(events[0].is_error());
    }

    #[tokio::test]
    async fn decode_flushes_trailing_event_and_stops_on_error() {
        let chunks = vec![
            Ok::<_, std::io::Error>(b"data: x\n\nda".to_vec()),
            Ok(b"ta: y".to_vec()),
        ];
        let events: Vec<_> = decode(stream::iter(chunks)).collect().await;
        let events: Vec<_> = events.into_iter().map(|event| event.unwrap()).collect();
        assert_eq!(events, vec![data("x"), data("y")]);

        let chunks = vec![
            Ok(b"data: x\n\n".to_vec()),
            Err(std::io::Error::other("reset")),
            Ok(b"data: never\n\n".to_vec()),
        ];
        let events: Vec<_> = decode(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].is_err());
    }
}
