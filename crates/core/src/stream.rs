use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    client::Backend,
    error::SessionError,
    types::{AnalyzeOptions, ProgressEvent},
};

/// Named events of `GET /analyze/stream`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Progress(ProgressEvent),
    Comments(Vec<Value>),
    /// Raw AI payload, handed to the result parser as-is.
    Result(Value),
    Error {
        message: String,
    },
    /// Stream closed, either by an explicit `done` event or by EOF.
    Done,
}

#[derive(Deserialize)]
struct CommentsPayload {
    #[serde(default)]
    comments: Vec<Value>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

/// Open the SSE variant of the analyze endpoint. Events arrive on the
/// returned channel; the reader task ends on `done`, EOF, a stream error,
/// or when the receiver is dropped.
pub async fn open_analysis_stream(
    client: &reqwest::Client,
    backend: &Backend,
    video_id: &str,
    opts: &AnalyzeOptions,
    token: &str,
) -> Result<mpsc::Receiver<StreamEvent>, SessionError> {
    let base_url = backend.base_url();
    let mut query: Vec<(&str, String)> = vec![
        ("videoId", video_id.to_string()),
        ("commentLimit", opts.comment_limit.to_string()),
        ("summaryLength", opts.summary_length.as_str().to_string()),
        ("token", token.to_string()),
    ];
    if let Some(lang) = &opts.language {
        query.push(("language", lang.clone()));
    }
    if opts.no_cache {
        query.push(("noCache", "true".to_string()));
    }

    let response = client
        .get(format!("{base_url}/analyze/stream"))
        .query(&query)
        .send()
        .await
        .map_err(|e| SessionError::unreachable(base_url, e.to_string()))?;

    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(SessionError::Http {
            status,
            message: format!("stream request failed with status {status}"),
        });
    }

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(process_stream(response.bytes_stream(), tx));
    Ok(rx)
}

/// Decode named SSE events into [`StreamEvent`]s. Malformed per-event JSON
/// is dropped without aborting the stream.
async fn process_stream<S, B, E>(stream: S, tx: mpsc::Sender<StreamEvent>)
where
    S: futures::Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = stream.eventsource();

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "analysis stream broke");
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let outbound = match event.event.as_str() {
            "progress" => match serde_json::from_str::<ProgressEvent>(&event.data) {
                Ok(progress) => Some(StreamEvent::Progress(progress)),
                Err(e) => {
                    tracing::debug!(error = %e, "malformed progress event");
                    None
                }
            },
            "comments" => match serde_json::from_str::<CommentsPayload>(&event.data) {
                Ok(payload) => Some(StreamEvent::Comments(payload.comments)),
                Err(e) => {
                    tracing::debug!(error = %e, "malformed comments event");
                    None
                }
            },
            "result" => {
                // The result payload may itself be fenced text rather than
                // JSON; the parser copes with either.
                let value = serde_json::from_str::<Value>(&event.data)
                    .unwrap_or_else(|_| Value::String(event.data.clone()));
                Some(StreamEvent::Result(value))
            }
            "error" => {
                let message = serde_json::from_str::<ErrorPayload>(&event.data)
                    .map(|p| p.message)
                    .unwrap_or_else(|_| event.data.clone());
                let _ = tx.send(StreamEvent::Error { message }).await;
                return;
            }
            "done" => {
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
            other => {
                tracing::debug!(event = other, "ignoring unknown stream event");
                None
            }
        };

        if let Some(outbound) = outbound {
            if tx.send(outbound).await.is_err() {
                return;
            }
        }
    }

    // EOF without an explicit done still closes the session cleanly.
    let _ = tx.send(StreamEvent::Done).await;
}
