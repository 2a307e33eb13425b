//! The raw request seam between the editor surface and the host.

use crate::error::{EditorError, EditorResult};
use async_trait::async_trait;
use nvgo_rpc::Transport;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// Issues host API requests.
///
/// Every typed operation on [`crate::Editor`] ends up as one `call`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EditorClient: Send + Sync {
    /// Call a host API method with positional arguments.
    async fn call(&self, method: &str, args: Vec<Value>) -> EditorResult<Value>;
}

/// Client backed by the JSON-RPC transport.
pub struct RpcClient {
    transport: Arc<Transport>,
}

impl RpcClient {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl EditorClient for RpcClient {
    async fn call(&self, method: &str, args: Vec<Value>) -> EditorResult<Value> {
        trace!(method, "Editor request");
        self.transport
            .send_request(method, Value::Array(args))
            .await
            .map_err(|e| EditorError::from_transport(method, e))
    }
}
