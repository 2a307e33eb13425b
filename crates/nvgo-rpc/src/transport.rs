//! Bidirectional transport for the editor channel.
//!
//! Newline-delimited JSON-RPC. Either side may issue requests: incoming
//! requests and notifications are forwarded on a channel, incoming
//! responses complete the matching pending outgoing request.

use crate::types::{JsonRpcError, JsonRpcId, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, trace, warn};

/// Default time to wait for the editor to answer a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Remote error: {0}")]
    Remote(JsonRpcError),
}

/// Message from the peer.
#[derive(Debug)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

/// Item on the writer queue.
enum Outgoing {
    Line(String),
    /// Answered once everything queued before it is written.
    Flush(oneshot::Sender<()>),
}

type Pending = Arc<Mutex<HashMap<JsonRpcId, oneshot::Sender<Result<Value, JsonRpcError>>>>>;

/// JSON-RPC transport over an arbitrary byte stream pair.
pub struct Transport {
    /// Sender for outgoing messages.
    outgoing_tx: mpsc::Sender<Outgoing>,
    /// Pending requests awaiting responses.
    pending: Pending,
    /// Next request ID.
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl Transport {
    /// Create a transport over the process stdin/stdout.
    pub fn stdio() -> (Self, mpsc::Receiver<IncomingMessage>) {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Create a transport and start the I/O loops.
    pub fn new<R, W>(reader: R, writer: W) -> (Self, mpsc::Receiver<IncomingMessage>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Outgoing>(100);
        let (incoming_tx, incoming_rx) = mpsc::channel::<IncomingMessage>(100);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let pending_clone = Arc::clone(&pending);
        tokio::spawn(async move {
            Self::read_loop(reader, incoming_tx, pending_clone).await;
        });

        tokio::spawn(async move {
            Self::write_loop(writer, outgoing_rx).await;
        });

        let transport = Self {
            outgoing_tx,
            pending,
            next_id: AtomicI64::new(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };

        (transport, incoming_rx)
    }

    /// Override the outgoing request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read lines and dispatch messages.
    async fn read_loop<R>(reader: R, incoming_tx: mpsc::Sender<IncomingMessage>, pending: Pending)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    trace!(message = %line, "Received");

                    let value: Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "Failed to parse message");
                            continue;
                        }
                    };

                    match classify(value) {
                        Some(Classified::Response(response)) => {
                            let sender = pending.lock().await.remove(&response.id);
                            match sender {
                                Some(sender) => {
                                    let result = match response.error {
                                        Some(error) => Err(error),
                                        None => Ok(response.result.unwrap_or(Value::Null)),
                                    };
                                    let _ = sender.send(result);
                                }
                                None => debug!(id = ?response.id, "Response for unknown request"),
                            }
                        }
                        Some(Classified::Incoming(message)) => {
                            if incoming_tx.send(message).await.is_err() {
                                error!("Incoming channel closed");
                                break;
                            }
                        }
                        None => warn!(message = %line, "Unrecognized message"),
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Error reading input");
                    break;
                }
            }
        }

        // Wake everyone still waiting on an answer that will never come.
        pending.lock().await.clear();
    }

    /// Write messages, one per line.
    async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Outgoing>)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(item) = rx.recv().await {
            let msg = match item {
                Outgoing::Line(msg) => msg,
                Outgoing::Flush(done) => {
                    let _ = done.send(());
                    continue;
                }
            };
            trace!(message = %msg, "Sending");
            if let Err(e) = writer.write_all(msg.as_bytes()).await {
                error!(error = %e, "Error writing message");
                break;
            }
            if let Err(e) = writer.write_all(b"\n").await {
                error!(error = %e, "Error writing newline");
                break;
            }
            if let Err(e) = writer.flush().await {
                error!(error = %e, "Error flushing output");
                break;
            }
        }
    }

    async fn send_raw(&self, json: String) -> Result<(), TransportError> {
        self.outgoing_tx
            .send(Outgoing::Line(json))
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Wait until every message queued so far has been written.
    pub async fn flush(&self) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.outgoing_tx
            .send(Outgoing::Flush(tx))
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        rx.await.map_err(|_| TransportError::ChannelClosed)
    }

    /// Send a response to a request.
    pub async fn send_response(
        &self,
        id: JsonRpcId,
        result: Result<Value, JsonRpcError>,
    ) -> Result<(), TransportError> {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        let response = JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result,
            error,
        };

        self.send_raw(serde_json::to_string(&response)?).await
    }

    /// Send a notification (no response expected).
    pub async fn send_notification(&self, method: &str, params: Value) -> Result<(), TransportError> {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(params),
        };

        self.send_raw(serde_json::to_string(&notification)?).await
    }

    /// Send a request and wait for the response.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(id.clone(), tx);

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(id.clone()),
            method: method.to_string(),
            params: Some(params),
        };

        if let Err(e) = self.send_raw(serde_json::to_string(&request)?).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result.map_err(TransportError::Remote),
            Ok(Err(_)) => Err(TransportError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(TransportError::Timeout(method.to_string()))
            }
        }
    }
}

enum Classified {
    Response(JsonRpcResponse),
    Incoming(IncomingMessage),
}

/// A message with `method` is a request or notification; anything else
/// with an id is a response.
fn classify(value: Value) -> Option<Classified> {
    let has_method = value.get("method").is_some();
    let has_id = value.get("id").map(|id| !id.is_null()).unwrap_or(false);

    if has_method {
        if has_id {
            serde_json::from_value(value)
                .ok()
                .map(|r| Classified::Incoming(IncomingMessage::Request(r)))
        } else {
            serde_json::from_value(value)
                .ok()
                .map(|n| Classified::Incoming(IncomingMessage::Notification(n)))
        }
    } else if has_id {
        serde_json::from_value(value).ok().map(Classified::Response)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[test]
    fn test_classify_request_with_id_is_not_a_response() {
        let value = json!({"jsonrpc": "2.0", "id": 4, "method": "command:GoBuild", "params": {}});
        match classify(value) {
            Some(Classified::Incoming(IncomingMessage::Request(r))) => {
                assert_eq!(r.method, "command:GoBuild")
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn test_classify_notification_and_response() {
        let note = json!({"jsonrpc": "2.0", "method": "autocmd:BufEnter"});
        assert!(matches!(
            classify(note),
            Some(Classified::Incoming(IncomingMessage::Notification(_)))
        ));

        let resp = json!({"jsonrpc": "2.0", "id": 1, "result": [1, 2]});
        assert!(matches!(classify(resp), Some(Classified::Response(_))));

        assert!(classify(json!({"jsonrpc": "2.0"})).is_none());
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, mut their_write) = tokio::io::split(theirs);

        let (transport, _incoming) = Transport::new(our_read, our_write);

        let peer = tokio::spawn(async move {
            let mut lines = BufReader::new(their_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            assert_eq!(request.method, "nvim_get_current_buf");
            let response = json!({"jsonrpc": "2.0", "id": request.id, "result": 3});
            their_write
                .write_all(format!("{response}\n").as_bytes())
                .await
                .unwrap();
        });

        let result = transport
            .send_request("nvim_get_current_buf", json!([]))
            .await
            .unwrap();
        assert_eq!(result, json!(3));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, mut their_write) = tokio::io::split(theirs);

        let (transport, _incoming) = Transport::new(our_read, our_write);

        tokio::spawn(async move {
            let mut lines = BufReader::new(their_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            let response = json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "error": {"code": 1, "message": "Invalid buffer id"}
            });
            their_write
                .write_all(format!("{response}\n").as_bytes())
                .await
                .unwrap();
        });

        let err = transport
            .send_request("nvim_buf_get_lines", json!([99, 0, -1, false]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid buffer id"));
    }

    #[tokio::test]
    async fn test_incoming_request_forwarded() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = tokio::io::split(ours);
        let (_their_read, mut their_write) = tokio::io::split(theirs);

        let (_transport, mut incoming) = Transport::new(our_read, our_write);

        their_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"specs\"}\n")
            .await
            .unwrap();

        match incoming.recv().await {
            Some(IncomingMessage::Request(r)) => assert_eq!(r.method, "specs"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (ours, _theirs) = duplex(4096);
        let (our_read, our_write) = tokio::io::split(ours);
        let (transport, _incoming) = Transport::new(our_read, our_write);
        let transport = transport.with_request_timeout(Duration::from_millis(20));

        let err = transport.send_request("nvim_command", json!(["redraw"])).await;
        assert!(matches!(err, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_responses() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, _their_write) = tokio::io::split(theirs);
        let (transport, _incoming) = Transport::new(our_read, our_write);

        transport
            .send_response(JsonRpcId::Number(7), Ok(json!("done")))
            .await
            .unwrap();
        transport.flush().await.unwrap();

        let mut lines = BufReader::new(their_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"], "done");
    }
}
