//! reqwest-backed inference transport.
//!
//! `GET {base}/stream?context=…&temperature=…` returns an SSE body. The
//! response byte stream is unfolded through [`SseDecoder`] into
//! [`StreamEvent`]s; dropping the returned stream drops the response and
//! with it the connection.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use murmur_core::{
    EventStream, InferenceTransport, StreamError, StreamEvent, StreamRequest, TransportError,
};
use reqwest::header::{ACCEPT, HeaderValue};
use url::Url;

use crate::decode::decode_frame;
use crate::sse::SseDecoder;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error building an HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("Invalid server URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Parse a base URL so that relative joins append to its path.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, ClientBuildError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ClientBuildError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientBuildError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn endpoint(base: &Url, path: &str) -> Url {
    // Joining a relative path onto a base with a trailing slash cannot fail.
    base.join(path).unwrap_or_else(|_| base.clone())
}

/// Inference transport speaking SSE over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    stream_url: Url,
}

impl HttpTransport {
    pub fn new(server_url: &str) -> Result<Self, ClientBuildError> {
        let base = parse_base_url(server_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            stream_url: endpoint(&base, "stream"),
        })
    }
}

#[async_trait]
impl InferenceTransport for HttpTransport {
    async fn open(&self, request: StreamRequest) -> Result<EventStream, TransportError> {
        tracing::debug!(
            url = %self.stream_url,
            context_chars = request.context.chars().count(),
            "Opening stream"
        );

        let response = self
            .client
            .get(self.stream_url.clone())
            .query(&request.query_pairs())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        Ok(sse_event_stream(response.bytes_stream()))
    }
}

/// State threaded through the `unfold` stream.
struct SseState<S> {
    stream: S,
    decoder: SseDecoder,
    finished: bool,
}

/// Turn an SSE byte stream into decoded events.
///
/// The stream ends after `done`, after any terminal error, or after
/// reporting [`TransportError::EndedWithoutDone`] if the body closes first.
pub fn sse_event_stream<S, E>(byte_stream: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let state = SseState {
        stream: byte_stream.boxed(),
        decoder: SseDecoder::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }

        loop {
            if let Some(frame) = st.decoder.next_frame() {
                let item = decode_frame(&frame);
                match &item {
                    Ok(StreamEvent::Done) => st.finished = true,
                    Err(e) if e.is_terminal() => st.finished = true,
                    Err(e) => {
                        tracing::warn!(error = %e, event = %frame.event, "Dropping malformed event");
                    }
                    Ok(_) => {}
                }
                return Some((item, st));
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.decoder.push(&chunk),
                Some(Err(e)) => {
                    st.finished = true;
                    let err = StreamError::Transport(TransportError::Interrupted(e.to_string()));
                    return Some((Err(err), st));
                }
                None => {
                    st.finished = true;
                    if st.decoder.has_partial() {
                        tracing::debug!("Discarding incomplete trailing SSE frame");
                    }
                    return Some((Err(TransportError::EndedWithoutDone.into()), st));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    async fn collect(chunks: &[&'static str]) -> Vec<Result<StreamEvent, StreamError>> {
        let bytes = stream::iter(
            chunks
                .iter()
                .copied()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        );
        sse_event_stream(bytes).collect().await
    }

    #[tokio::test]
    async fn test_stream_stops_after_done() {
        let items =
            collect(&["data: He\n\ndata: llo\n\nevent: done\ndata:\n\ndata: late\n\n"]).await;
        assert_eq!(
            items,
            vec![
                Ok(StreamEvent::TextDelta("He".into())),
                Ok(StreamEvent::TextDelta("llo".into())),
                Ok(StreamEvent::Done),
            ]
        );
    }

    #[tokio::test]
    async fn test_eof_without_done_is_transport_error() {
        let items = collect(&["data: He\n\n", "data: ll"]).await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1],
            Err(StreamError::Transport(TransportError::EndedWithoutDone))
        );
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_end_stream() {
        let items = collect(&[
            "event: token_data\ndata: nope\n\n",
            "data: ok\n\nevent: done\n\n",
        ])
        .await;
        assert!(matches!(items[0], Err(StreamError::Malformed(_))));
        assert_eq!(items[1], Ok(StreamEvent::TextDelta("ok".into())));
        assert_eq!(items[2], Ok(StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_body_error_is_interruption() {
        let bytes = stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err(std::io::Error::other("reset by peer")),
        ]);
        let items: Vec<_> = sse_event_stream(bytes).collect().await;
        assert!(matches!(
            &items[1],
            Err(StreamError::Transport(TransportError::Interrupted(msg))) if msg.contains("reset")
        ));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let base = parse_base_url("http://gpu-box:8000/api").unwrap();
        assert_eq!(endpoint(&base, "stream").as_str(), "http://gpu-box:8000/api/stream");
        assert!(parse_base_url("ftp://nope").is_err());
        assert!(parse_base_url("not a url").is_err());
    }
}
