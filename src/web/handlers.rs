//! HTTP request handlers.

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{Html, IntoResponse, Json, Response},
};
use tokio::sync::{broadcast, mpsc};

use super::AppState;
use crate::status::StatusResult;
use crate::store::Subscription;

/// Maximum time allowed for delivering a single SSE frame to the peer.
/// A stalled client trips this and loses its connection rather than
/// pinning the delivery loop. Must be <= the server's shutdown grace.
const SSE_WRITE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// One buffered frame between the delivery loop and the HTTP write path.
/// Keeping it small makes a stalled peer visible to the write timeout.
const SSE_BRIDGE_BUFFER: usize = 1;

const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");

/// Serves the dashboard page with the configured title substituted in.
pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let title = if state.title.is_empty() {
        "PulseWatch"
    } else {
        state.title.as_str()
    };
    Html(DASHBOARD_TEMPLATE.replace("{{title}}", &escape_html(title)))
}

/// Returns all current statuses as a JSON array.
pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Json(state.store.get_all()),
    )
}

/// Streams status updates via Server-Sent Events.
///
/// On connect the client receives one event per stored entry, then one
/// event per subsequent update, until it disconnects, stalls past the
/// write timeout, or the server shuts down. Frames flow through a bounded
/// bridge channel into the response body; each send is wrapped in
/// [`SSE_WRITE_TIMEOUT`], standing in for a per-write socket deadline.
pub async fn handle_sse(State(state): State<AppState>) -> Response {
    let subscription = state.store.subscribe();
    let snapshot = state.store.get_all();
    let shutdown_rx = state.shutdown.subscribe();

    let (frame_tx, frame_rx) = mpsc::channel::<Result<Bytes, Infallible>>(SSE_BRIDGE_BUFFER);
    tokio::spawn(stream_updates(
        state,
        subscription,
        snapshot,
        frame_tx,
        shutdown_rx,
    ));

    let body = Body::from_stream(futures::stream::unfold(frame_rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    }));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response()
}

/// Per-connection delivery loop.
///
/// Exits on subscription close, shutdown signal, client disconnect, or a
/// timed-out write - and always releases its subscription.
async fn stream_updates(
    state: AppState,
    mut subscription: Subscription,
    snapshot: Vec<StatusResult>,
    frame_tx: mpsc::Sender<Result<Bytes, Infallible>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut alive = true;

    for result in snapshot {
        if !send_event(&frame_tx, &result).await {
            alive = false;
            break;
        }
    }

    while alive {
        tokio::select! {
            // hyper drops the body receiver when the client disconnects, so
            // an idle connection is torn down without waiting for an update
            _ = frame_tx.closed() => break,
            _ = shutdown_rx.recv() => break,
            update = subscription.recv() => match update {
                Some(result) => {
                    if !send_event(&frame_tx, &result).await {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    state.store.unsubscribe(subscription);
}

/// Sends one `data: <json>\n\n` frame under the write timeout.
///
/// Returns false when the connection should be torn down. A write that
/// exceeds its deadline is never retried.
async fn send_event(
    frame_tx: &mpsc::Sender<Result<Bytes, Infallible>>,
    result: &StatusResult,
) -> bool {
    let json = match serde_json::to_vec(result) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(endpoint = %result.name, error = %e, "failed to encode sse event");
            return true; // skip this event, keep the connection
        }
    };

    let mut frame = Vec::with_capacity(json.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");

    match tokio::time::timeout(SSE_WRITE_TIMEOUT, frame_tx.send(Ok(Bytes::from(frame)))).await {
        Ok(Ok(())) => true,
        // client disconnected, body stream dropped
        Ok(Err(_)) => false,
        Err(_) => {
            tracing::warn!("sse write timed out, dropping connection");
            false
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>"x"&'y'</script>"#),
            "&lt;script&gt;&quot;x&quot;&amp;&#39;y&#39;&lt;/script&gt;"
        );
    }

    #[tokio::test]
    async fn test_send_event_frames_json() {
        let (tx, mut rx) = mpsc::channel(1);
        let result = StatusResult {
            name: "api".to_string(),
            url: "https://example.com".to_string(),
            status: crate::status::Status::Up,
            labels: Default::default(),
            latency: std::time::Duration::from_millis(5),
            checked_at: chrono::Utc::now(),
            error: None,
            raw_response: Vec::new(),
            status_code: 200,
        };

        assert!(send_event(&tx, &result).await);
        let frame = rx.recv().await.unwrap().unwrap();
        assert!(frame.starts_with(b"data: "));
        assert!(frame.ends_with(b"\n\n"));

        let json: serde_json::Value = serde_json::from_slice(&frame[6..frame.len() - 2]).unwrap();
        assert_eq!(json["name"], "api");
        assert_eq!(json["status"], "up");
    }

    #[tokio::test]
    async fn test_send_event_fails_on_dropped_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = StatusResult {
            name: "api".to_string(),
            url: "https://example.com".to_string(),
            status: crate::status::Status::Up,
            labels: Default::default(),
            latency: std::time::Duration::from_millis(5),
            checked_at: chrono::Utc::now(),
            error: None,
            raw_response: Vec::new(),
            status_code: 200,
        };
        assert!(!send_event(&tx, &result).await);
    }
}
