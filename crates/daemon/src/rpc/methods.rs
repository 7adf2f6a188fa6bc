use std::sync::Arc;

use draftsync_common::protocol::jsonrpc::{
    Request, RequestId, Response, RpcError, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use draftsync_common::protocol::rpc_methods;
use draftsync_common::types::{EditorChanges, EndpointId, FileTrackingOperation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::engine::{WorkingCopyError, WorkingCopyManager};
use crate::runtime::InboundEvent;

#[derive(Clone)]
pub struct RpcServerState {
    manager: Arc<WorkingCopyManager>,
    events: mpsc::Sender<InboundEvent>,
    endpoint_id: EndpointId,
    shutdown_notifier: Option<broadcast::Sender<()>>,
}

impl RpcServerState {
    /// Events from this connection are attributed to `endpoint_id`.
    pub fn new(
        manager: Arc<WorkingCopyManager>,
        events: mpsc::Sender<InboundEvent>,
        endpoint_id: impl Into<EndpointId>,
    ) -> Self {
        Self { manager, events, endpoint_id: endpoint_id.into(), shutdown_notifier: None }
    }

    pub fn with_shutdown_notifier(mut self, notifier: broadcast::Sender<()>) -> Self {
        self.shutdown_notifier = Some(notifier);
        self
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    async fn enqueue(&self, event: InboundEvent) -> Result<(), String> {
        self.events.send(event).await.map_err(|_| "event queue is closed".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct PathParams {
    path: String,
}

/// Handle one raw request line. Notifications yield no response.
pub async fn handle_raw_request(raw: &[u8], state: &RpcServerState) -> Option<Response> {
    let request = match serde_json::from_slice::<Request>(raw) {
        Ok(request) => request,
        Err(error) => {
            return Some(Response::error(
                RequestId::Null,
                RpcError {
                    code: PARSE_ERROR,
                    message: "Parse error".to_string(),
                    data: Some(json!({ "reason": error.to_string() })),
                },
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return Some(Response::error(
            request.id.unwrap_or(RequestId::Null),
            RpcError { code: INVALID_REQUEST, message: "Invalid Request".to_string(), data: None },
        ));
    }

    let is_notification = request.is_notification();
    let method = request.method.clone();
    let response = dispatch_request(request, state).await;
    if is_notification {
        if let Some(error) = &response.error {
            debug!(
                method = %method,
                code = error.code,
                message = %error.message,
                "notification failed"
            );
        }
        return None;
    }
    Some(response)
}

pub async fn dispatch_request(request: Request, state: &RpcServerState) -> Response {
    let id = request.id.clone().unwrap_or(RequestId::Null);
    match request.method.as_str() {
        rpc_methods::RPC_PING => Response::success(id, json!({ "ok": true })),
        rpc_methods::DAEMON_SHUTDOWN => {
            if let Some(notifier) = &state.shutdown_notifier {
                let _ = notifier.send(());
            }
            Response::success(id, json!({ "ok": true }))
        }
        rpc_methods::TRACK_EDITOR_FILE => handle_track_editor_file(request, id, state).await,
        rpc_methods::TRACK_EDITOR_CONTENT_CHANGES => {
            handle_track_content_changes(request, id, state).await
        }
        rpc_methods::WORKING_COPY_CONTENT => handle_content(request, id, state).await,
        rpc_methods::WORKING_COPY_PERSISTENT_PATH => {
            handle_persistent_path(request, id, state).await
        }
        rpc_methods::WORKING_COPY_RECOVERABLE => handle_recoverable(request, id, state).await,
        _ => Response::error(
            id,
            RpcError {
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
                data: Some(json!({ "method": request.method })),
            },
        ),
    }
}

async fn handle_track_editor_file(
    request: Request,
    id: RequestId,
    state: &RpcServerState,
) -> Response {
    let operation = match parse_params::<FileTrackingOperation>(&request, id.clone()) {
        Ok(operation) => operation,
        Err(response) => return response,
    };
    let event =
        InboundEvent::FileOperation { endpoint_id: state.endpoint_id.clone(), operation };
    accepted_response(id, state.enqueue(event).await)
}

async fn handle_track_content_changes(
    request: Request,
    id: RequestId,
    state: &RpcServerState,
) -> Response {
    let changes = match parse_params::<EditorChanges>(&request, id.clone()) {
        Ok(changes) => changes,
        Err(response) => return response,
    };
    let event = InboundEvent::ContentChanged { endpoint_id: state.endpoint_id.clone(), changes };
    accepted_response(id, state.enqueue(event).await)
}

async fn handle_content(request: Request, id: RequestId, state: &RpcServerState) -> Response {
    let params = match parse_params::<PathParams>(&request, id.clone()) {
        Ok(params) => params,
        Err(response) => return response,
    };
    match state.manager.get_content_for(&params.path).await {
        Ok(content) => Response::success(id, json!({ "content": content })),
        Err(error) => working_copy_error_response(id, &error),
    }
}

async fn handle_persistent_path(
    request: Request,
    id: RequestId,
    state: &RpcServerState,
) -> Response {
    let params = match parse_params::<PathParams>(&request, id.clone()) {
        Ok(params) => params,
        Err(response) => return response,
    };
    match state.manager.get_persistent_working_copy(&params.path).await {
        Ok(path) => Response::success(
            id,
            json!({ "path": path.map(|path| path.to_string_lossy().into_owned()) }),
        ),
        Err(error) => working_copy_error_response(id, &error),
    }
}

async fn handle_recoverable(request: Request, id: RequestId, state: &RpcServerState) -> Response {
    let params = match parse_params::<PathParams>(&request, id.clone()) {
        Ok(params) => params,
        Err(response) => return response,
    };
    match state.manager.recoverable_content(&params.path).await {
        Ok(content) => Response::success(id, json!({ "content": content })),
        Err(error) => working_copy_error_response(id, &error),
    }
}

fn parse_params<T: DeserializeOwned>(request: &Request, id: RequestId) -> Result<T, Response> {
    let Some(params) = request.params.clone() else {
        return Err(invalid_params_response(id, format!("{} requires params", request.method)));
    };
    serde_json::from_value::<T>(params).map_err(|error| {
        invalid_params_response(
            id,
            format!("failed to decode {} params: {}", request.method, error),
        )
    })
}

fn accepted_response(id: RequestId, queued: Result<(), String>) -> Response {
    match queued {
        Ok(()) => Response::success(id, json!({ "accepted": true })),
        Err(reason) => Response::error(
            id,
            RpcError {
                code: INTERNAL_ERROR,
                message: "Internal error".to_string(),
                data: Some(json!({ "reason": reason })),
            },
        ),
    }
}

/// Query failures carry the same status codes as error notifications.
fn working_copy_error_response(id: RequestId, error: &WorkingCopyError) -> Response {
    Response::error(
        id,
        RpcError {
            code: i32::from(error.status_code()),
            message: error.to_string(),
            data: Some(json!({ "kind": error.kind().as_str() })),
        },
    )
}

fn invalid_params_response(request_id: RequestId, reason: String) -> Response {
    Response::error(
        request_id,
        RpcError {
            code: INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(json!({ "reason": reason })),
        },
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::engine::ManagerOptions;
    use crate::fs::{LocalProjectFs, ProjectFs};
    use crate::transmit::ChannelTransmitter;

    struct Fixture {
        tmp: TempDir,
        state: RpcServerState,
        events: mpsc::Receiver<InboundEvent>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("proj")).unwrap();
        fs::write(tmp.path().join("proj/a.txt"), "alpha").unwrap();
        let project_fs: Arc<dyn ProjectFs> = Arc::new(LocalProjectFs::new(tmp.path()));
        let (transmitter, _outbound) = ChannelTransmitter::channel(4);
        let manager = Arc::new(WorkingCopyManager::new(
            project_fs,
            Arc::new(transmitter),
            ManagerOptions::default(),
        ));
        let (tx, events) = mpsc::channel(8);
        Fixture { tmp, state: RpcServerState::new(manager, tx, "stdio"), events }
    }

    async fn call(state: &RpcServerState, raw: serde_json::Value) -> Option<Response> {
        handle_raw_request(raw.to_string().as_bytes(), state).await
    }

    #[tokio::test]
    async fn ping_returns_ok() {
        let fx = fixture();
        let response = call(&fx.state, json!({"jsonrpc": "2.0", "method": "rpc.ping", "id": 1}))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({ "ok": true })));
        assert_eq!(response.id, RequestId::Number(1));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let fx = fixture();
        let response = handle_raw_request(b"{not json", &fx.state).await.unwrap();
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
        assert_eq!(response.id, RequestId::Null);
    }

    #[tokio::test]
    async fn wrong_version_is_an_invalid_request() {
        let fx = fixture();
        let response = call(&fx.state, json!({"jsonrpc": "1.0", "method": "rpc.ping", "id": 2}))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let fx = fixture();
        let response = call(&fx.state, json!({"jsonrpc": "2.0", "method": "doc.read", "id": 3}))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn lifecycle_notification_is_queued_without_response() {
        let mut fx = fixture();
        let response = call(
            &fx.state,
            json!({
                "jsonrpc": "2.0",
                "method": "track:editor-file",
                "params": {"type": "START", "path": "/proj/a.txt"},
            }),
        )
        .await;

        assert!(response.is_none());
        assert_eq!(
            fx.events.recv().await.unwrap(),
            InboundEvent::FileOperation {
                endpoint_id: "stdio".to_string(),
                operation: FileTrackingOperation::Start { path: "/proj/a.txt".to_string() },
            }
        );
    }

    #[tokio::test]
    async fn content_change_request_is_acknowledged() {
        let mut fx = fixture();
        let response = call(
            &fx.state,
            json!({
                "jsonrpc": "2.0",
                "method": "track:editor-content-changes",
                "params": {"fileLocation": "/proj/a.txt", "type": "REMOVE", "offset": 0, "removedCharCount": 1},
                "id": "c1",
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.result, Some(json!({ "accepted": true })));
        assert!(matches!(fx.events.recv().await, Some(InboundEvent::ContentChanged { .. })));
    }

    #[tokio::test]
    async fn bad_params_are_rejected() {
        let fx = fixture();
        let response = call(
            &fx.state,
            json!({"jsonrpc": "2.0", "method": "track:editor-file", "params": {"type": "OPEN"}, "id": 4}),
        )
        .await
        .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        let response =
            call(&fx.state, json!({"jsonrpc": "2.0", "method": "working_copy.content", "id": 5}))
                .await
                .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn content_query_reads_original_and_maps_missing_to_400() {
        let fx = fixture();
        let response = call(
            &fx.state,
            json!({"jsonrpc": "2.0", "method": "working_copy.content", "params": {"path": "/proj/a.txt"}, "id": 6}),
        )
        .await
        .unwrap();
        assert_eq!(response.result, Some(json!({ "content": "alpha" })));

        let response = call(
            &fx.state,
            json!({"jsonrpc": "2.0", "method": "working_copy.content", "params": {"path": "/proj/none"}, "id": 7}),
        )
        .await
        .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, 400);
        assert_eq!(error.data, Some(json!({ "kind": "NOT_FOUND" })));
    }

    #[tokio::test]
    async fn persistent_path_and_recoverable_for_untracked_file_are_null() {
        let fx = fixture();
        for method in ["working_copy.persistent_path", "working_copy.recoverable"] {
            let response = call(
                &fx.state,
                json!({"jsonrpc": "2.0", "method": method, "params": {"path": "/proj/a.txt"}, "id": 8}),
            )
            .await
            .unwrap();
            let result = response.result.unwrap();
            assert!(result.as_object().unwrap().values().all(|value| value.is_null()));
        }
        assert!(!fx.tmp.path().join("proj/.draftsync").exists());
    }

    #[tokio::test]
    async fn shutdown_notifies_listener() {
        let fx = fixture();
        let (tx, mut rx) = broadcast::channel(1);
        let state = fx.state.clone().with_shutdown_notifier(tx);
        let response =
            call(&state, json!({"jsonrpc": "2.0", "method": "daemon.shutdown", "id": 9}))
                .await
                .unwrap();
        assert_eq!(response.result, Some(json!({ "ok": true })));
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn closed_queue_is_an_internal_error() {
        let fx = fixture();
        drop(fx.events);
        let response = call(
            &fx.state,
            json!({"jsonrpc": "2.0", "method": "track:editor-file", "params": {"type": "STOP", "path": "/proj/a.txt"}, "id": 10}),
        )
        .await
        .unwrap();
        assert_eq!(response.error.unwrap().code, INTERNAL_ERROR);
    }
}
