//! Routes editor requests to commands, functions and autocmds.

use nvgo_commands::autocmd::VIM_LEAVE;
use nvgo_commands::{AutocmdEval, CommandArgs, CommandRegistry, Dispatched, Dispatcher, Orchestrator};
use nvgo_core::CoreError;
use nvgo_delve::Debugger;
use nvgo_rpc::{HandlerSpec, IncomingMessage, JsonRpcError, Transport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Parameters of a `function:<Name>` request. A bare array is taken as
/// the argument list.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FunctionParams {
    args: Vec<Value>,
    eval: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AutocmdParams {
    eval: AutocmdEval,
}

fn decode<T: for<'de> Deserialize<'de> + Default>(params: Option<Value>) -> Result<T, JsonRpcError> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| JsonRpcError::invalid_params(e.to_string())),
    }
}

fn to_rpc_error(err: CoreError) -> JsonRpcError {
    match err {
        CoreError::NotFound(message) => JsonRpcError::invalid_params(message),
        other => JsonRpcError::internal_error(other.to_string()),
    }
}

/// Everything a request may reach.
pub struct Router {
    dispatcher: Arc<Dispatcher>,
    orchestrator: Orchestrator,
    debugger: Arc<Debugger>,
}

impl Router {
    pub fn new(dispatcher: Arc<Dispatcher>, debugger: Arc<Debugger>) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&dispatcher));
        Self {
            dispatcher,
            orchestrator,
            debugger,
        }
    }

    /// Build the registry of built-in and debugger handlers.
    pub fn registry(debugger: &Arc<Debugger>) -> CommandRegistry {
        let mut registry = CommandRegistry::with_builtins();
        nvgo_delve::register(&mut registry, Arc::clone(debugger));
        registry
    }

    /// The registration manifest: commands, functions, then autocmds.
    pub fn specs(registry: &CommandRegistry) -> Vec<HandlerSpec> {
        let mut specs = registry.specs();
        specs.extend(Orchestrator::specs());
        specs
    }

    /// Handle one request and produce its result.
    pub async fn route(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        debug!(method, "Editor request");

        if method == "specs" {
            let specs = Self::specs(self.dispatcher.registry());
            return serde_json::to_value(specs).map_err(|e| JsonRpcError::internal_error(e.to_string()));
        }

        if let Some(name) = method.strip_prefix("command:") {
            let args: CommandArgs = decode(params)?;
            let dispatched = self.dispatcher.dispatch(name, args).await.map_err(to_rpc_error)?;
            return Ok(match dispatched {
                Dispatched::Published(count) => json!({ "published": count }),
                Dispatched::Failed(message) => json!({ "error": message }),
                Dispatched::Cancelled => json!({ "cancelled": true }),
                Dispatched::Success => Value::Null,
            });
        }

        if let Some(name) = method.strip_prefix("function:") {
            let params = match params {
                Some(Value::Array(args)) => FunctionParams { args, eval: None },
                other => decode(other)?,
            };
            return self
                .dispatcher
                .call_function(name, params.args, params.eval)
                .await
                .map_err(to_rpc_error);
        }

        if let Some(event) = method.strip_prefix("autocmd:") {
            let params: AutocmdParams = decode(params)?;
            if event == VIM_LEAVE {
                self.debugger.shutdown().await;
            }
            self.orchestrator
                .handle(event, params.eval)
                .await
                .map_err(to_rpc_error)?;
            return Ok(Value::Null);
        }

        Err(JsonRpcError::method_not_found(method))
    }

    /// Handle an incoming message, answering requests on `transport`.
    pub async fn serve_message(&self, transport: &Transport, message: IncomingMessage) {
        match message {
            IncomingMessage::Request(request) => {
                let result = self.route(&request.method, request.params).await;
                let Some(id) = request.id else {
                    return;
                };
                if let Err(e) = transport.send_response(id, result).await {
                    warn!(method = %request.method, error = %e, "Failed to send response");
                }
            }
            IncomingMessage::Notification(notification) => {
                if let Err(e) = self.route(&notification.method, notification.params).await {
                    warn!(method = %notification.method, error = %e.message, "Notification failed");
                }
            }
        }
    }

    /// Release everything when the editor goes away.
    pub async fn shutdown(&self) {
        self.debugger.shutdown().await;
        self.orchestrator.on_leave().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvgo_commands::Session;
    use nvgo_core::{Config, Environment};
    use nvgo_test_utils::FakeEditor;

    fn router() -> (Arc<FakeEditor>, Router) {
        let fake = Arc::new(FakeEditor::new());
        let debugger = Arc::new(Debugger::new());
        let session = Arc::new(Session::new(fake.editor(), Config::default(), Environment::default()));
        let registry = Arc::new(Router::registry(&debugger));
        let dispatcher = Arc::new(Dispatcher::new(session, registry));
        (fake, Router::new(dispatcher, debugger))
    }

    #[tokio::test]
    async fn test_specs_cover_every_handler_kind() {
        let (_, router) = router();
        let specs = router.route("specs", None).await.unwrap();
        let methods: Vec<String> = serde_json::from_value::<Vec<HandlerSpec>>(specs)
            .unwrap()
            .iter()
            .map(HandlerSpec::method)
            .collect();

        for expected in ["command:GoBuild", "command:DlvStart", "function:GoDebugModes", "autocmd:BufWritePost"] {
            assert!(methods.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_function_params_accept_bare_array() {
        let (_, router) = router();
        let modes = router
            .route("function:GoDebugModes", Some(json!(["t"])))
            .await
            .unwrap();
        assert_eq!(modes, json!(["test"]));

        let modes = router
            .route("function:GoGuruModes", Some(json!({"args": ["w"]})))
            .await
            .unwrap();
        assert_eq!(modes, json!(["whicherrs"]));
    }

    #[tokio::test]
    async fn test_command_failure_is_reported_in_result() {
        let (fake, router) = router();
        let result = router
            .route("command:DlvContinue", Some(json!({"eval": {"cwd": "/p", "file": "/p/main.go"}})))
            .await
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("no debug session is running"));
        assert!(fake.echoes().iter().any(|e| e.contains("DlvContinue")));
    }

    #[tokio::test]
    async fn test_unknown_methods() {
        let (_, router) = router();
        assert_eq!(router.route("frobnicate", None).await.unwrap_err().code, -32601);
        assert!(router.route("command:GoNope", None).await.is_err());
        assert!(router
            .route("command:GoBuild", Some(json!({"args": "not a list"})))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_leave_cancels_session() {
        let (_, router) = router();
        router.route("autocmd:VimLeavePre", Some(json!({"eval": {}}))).await.unwrap();
        assert!(router.dispatcher.session().cancel_token().is_cancelled());
    }
}
