//! The serve loop: one task per editor request.

use crate::router::Router;
use nvgo_commands::{Dispatcher, Session};
use nvgo_core::{Config, Environment};
use nvgo_delve::Debugger;
use nvgo_editor::{Editor, RpcClient};
use nvgo_rpc::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long in-flight requests may run after the editor hangs up.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve editor requests read from `reader` until the editor closes the
/// channel or `shutdown` fires.
pub async fn serve<R, W>(reader: R, writer: W, config: Config, env: Environment, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (transport, mut incoming) = Transport::new(reader, writer);
    let transport = Arc::new(transport);

    let editor = Editor::new(Arc::new(RpcClient::new(Arc::clone(&transport))));
    let session = Arc::new(Session::new(editor, config, env));
    let debugger = Arc::new(Debugger::new());
    let registry = Arc::new(Router::registry(&debugger));
    let dispatcher = Arc::new(Dispatcher::new(session, registry));
    let router = Arc::new(Router::new(dispatcher, debugger));

    info!("Serving editor requests");
    let mut requests = JoinSet::new();
    loop {
        tokio::select! {
            message = incoming.recv() => {
                let Some(message) = message else {
                    debug!("Editor closed the channel");
                    break;
                };
                let router = Arc::clone(&router);
                let transport = Arc::clone(&transport);
                requests.spawn(async move {
                    router.serve_message(&transport, message).await;
                });
            }
            Some(_) = requests.join_next(), if !requests.is_empty() => {}
            _ = shutdown.cancelled() => {
                requests.abort_all();
                break;
            }
        }
    }

    let drain = async { while requests.join_next().await.is_some() {} };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(pending = requests.len(), "Abandoning unfinished requests");
        requests.abort_all();
    }

    router.shutdown().await;
    if let Err(e) = transport.flush().await {
        debug!(error = %e, "Output already closed");
    }
    info!("Stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_answers_requests_until_channel_closes() {
        let (editor_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (editor_read, mut editor_write) = tokio::io::split(editor_side);

        let server = tokio::spawn(serve(
            server_read,
            server_write,
            Config::default(),
            Environment::default(),
            CancellationToken::new(),
        ));

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "specs"});
        editor_write
            .write_all(format!("{request}\n").as_bytes())
            .await
            .unwrap();
        let request = json!({"jsonrpc": "2.0", "id": 2, "method": "nope"});
        editor_write
            .write_all(format!("{request}\n").as_bytes())
            .await
            .unwrap();

        let mut lines = BufReader::new(editor_read).lines();
        let mut responses = Vec::new();
        while responses.len() < 2 {
            let line = lines.next_line().await.unwrap().unwrap();
            responses.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        responses.sort_by_key(|r| r["id"].as_i64());

        assert!(responses[0]["result"].as_array().unwrap().len() > 10);
        assert_eq!(responses[1]["error"]["code"], -32601);

        editor_write.shutdown().await.unwrap();
        drop(editor_write);
        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (_editor_side, server_side) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            server_read,
            server_write,
            Config::default(),
            Environment::default(),
            shutdown.clone(),
        ));

        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }
}
