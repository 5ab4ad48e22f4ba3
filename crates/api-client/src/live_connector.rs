use crate::error::ApiError;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

/// The longest line the decoder buffers while waiting for a newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A subscription to the backend's price feed. Each item is the raw `data`
/// payload of one Server-Sent Event (a JSON array of quotes). An `Err` item
/// means the transport failed; the stream ends right after it. The stream also
/// ends when the server closes the connection.
///
/// Dropping the stream closes the underlying HTTP connection.
pub type PriceStream = BoxStream<'static, Result<String, ApiError>>;

/// Opens the Server-Sent Events price feed at `GET /market/prices/stream`.
pub struct LiveConnector {
    client: reqwest::Client,
    url: Url,
    open_timeout: Duration,
}

impl LiveConnector {
    /// `base_url` is the REST root (e.g. `http://localhost:8080/api`).
    /// `open_timeout` bounds the wait for the response headers only; the open
    /// stream itself never times out.
    pub fn new(
        client: reqwest::Client,
        base_url: &Url,
        open_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let url = crate::endpoint(base_url, "market/prices/stream")?;
        Ok(Self {
            client,
            url,
            open_timeout,
        })
    }

    /// Connects to the feed. Fails if the connection cannot be opened, the
    /// headers do not arrive within the open timeout, or the server answers
    /// with a non-success status; failures after that surface as an `Err` item
    /// on the returned stream.
    pub async fn subscribe_to_prices(&self) -> Result<PriceStream, ApiError> {
        tracing::debug!(url = %self.url, "[SSE] Opening price stream.");
        let request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();
        let response = tokio::time::timeout(self.open_timeout, request)
            .await
            .map_err(|_| {
                ApiError::Stream(format!(
                    "no response within {} ms",
                    self.open_timeout.as_millis()
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Backend {
                status: status.as_u16(),
                reason: ApiError::status_reason(status.as_u16()),
            });
        }
        tracing::info!("[SSE] Price stream connected.");

        let bytes = Box::pin(response.bytes_stream());
        let events = stream::unfold(
            (bytes, SseDecoder::default(), VecDeque::new(), false),
            |(mut bytes, mut decoder, mut pending, failed)| async move {
                loop {
                    if let Some(data) = pending.pop_front() {
                        return Some((Ok(data), (bytes, decoder, pending, failed)));
                    }
                    if failed {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => match decoder.push(&chunk) {
                            Ok(events) => pending.extend(events),
                            Err(e) => return Some((Err(e), (bytes, decoder, pending, true))),
                        },
                        Some(Err(e)) => {
                            let err = ApiError::Stream(e.to_string());
                            return Some((Err(err), (bytes, decoder, pending, true)));
                        }
                        None => {
                            tracing::debug!("[SSE] Server closed the price stream.");
                            return None;
                        }
                    }
                }
            },
        );
        Ok(events.boxed())
    }
}

/// Incremental decoder for the `text/event-stream` format.
///
/// Only `data` fields matter to the price feed: multi-line data is joined with
/// `\n`, comments and the `event`/`id`/`retry` fields are skipped, and an event
/// with no data is not dispatched. Bytes are buffered until a full line is
/// available so multi-byte characters split across chunks decode correctly.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    max_line: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            data: Vec::new(),
            max_line,
        }
    }

    /// Feeds a chunk and returns the data payloads of every event it completed.
    /// Fails once an unterminated line grows past the line limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ApiError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        if self.buffer.len() > self.max_line {
            self.buffer.clear();
            self.data.clear();
            return Err(ApiError::Stream(format!(
                "event line exceeds {} bytes",
                self.max_line
            )));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: [{\"symbol\":\"BTC\"}]\n\n").unwrap();
        assert_eq!(events, vec!["[{\"symbol\":\"BTC\"}]".to_string()]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: [1,").unwrap().is_empty());
        assert!(decoder.push(b"2]\r\n").unwrap().is_empty());
        assert_eq!(decoder.push(b"\r\n").unwrap(), vec!["[1,2]".to_string()]);
    }

    #[test]
    fn test_multi_line_data_and_ignored_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .push(b": keep-alive\nevent: prices\nid: 7\ndata:first\ndata: second\n\n")
            .unwrap();
        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn test_events_without_data_are_not_dispatched() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"retry: 1000\n\n\n").unwrap().is_empty());
        let events = decoder.push(b"data: a\n\ndata: b\n\n").unwrap();
        assert_eq!(events, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let payload = "data: \u{20ac}\n\n".as_bytes();
        assert!(decoder.push(&payload[..7]).unwrap().is_empty());
        assert_eq!(decoder.push(&payload[7..]).unwrap(), vec!["\u{20ac}".to_string()]);
    }

    #[test]
    fn test_unterminated_line_over_limit_fails() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert!(decoder.push(b"data: 0123456789").unwrap().is_empty());
        assert!(matches!(decoder.push(b"abcdef"), Err(ApiError::Stream(_))));

        // The decoder starts clean afterwards.
        assert_eq!(decoder.push(b"data: ok\n\n").unwrap(), vec!["ok".to_string()]);
    }
}
