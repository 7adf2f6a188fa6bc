use std::sync::Arc;

use draftsync_common::path::normalize::{normalize_path, PathError};
use draftsync_common::protocol::jsonrpc::{Request, RequestId};
use draftsync_common::types::{EditorChanges, FileTrackingOperation, ServerError};
use draftsync_daemon::engine::{ErrorKind, ManagerOptions, WorkingCopyManager};
use draftsync_daemon::fs::{LocalProjectFs, ProjectFs};
use draftsync_daemon::rpc::methods::{dispatch_request, RpcServerState};
use draftsync_daemon::transmit::{ChannelTransmitter, OutboundNotification};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn manager_in(root: &TempDir) -> (Arc<WorkingCopyManager>, mpsc::Receiver<OutboundNotification>) {
    let project_fs: Arc<dyn ProjectFs> = Arc::new(LocalProjectFs::new(root.path()));
    let (transmitter, outbound) = ChannelTransmitter::channel(8);
    let manager =
        WorkingCopyManager::new(project_fs, Arc::new(transmitter), ManagerOptions::default());
    (Arc::new(manager), outbound)
}

#[test]
fn rejects_parent_directory_traversal_sequences() {
    assert_eq!(
        normalize_path("../../../etc/passwd"),
        Err(PathError::Traversal("..".to_string()))
    );
    assert_eq!(
        normalize_path("proj/../secrets.md"),
        Err(PathError::Traversal("..".to_string()))
    );
    assert_eq!(
        normalize_path("proj\\..\\secrets.md"),
        Err(PathError::Traversal("..".to_string()))
    );
}

#[test]
fn rejects_null_bytes_and_overlong_paths() {
    assert_eq!(normalize_path("proj/file\0.md"), Err(PathError::NullByte));
    assert_eq!(normalize_path(&"a".repeat(513)), Err(PathError::TooLong));
}

#[tokio::test]
async fn traversal_delta_is_forbidden_and_never_touches_disk() {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("proj")).unwrap();
    let (manager, _outbound) = manager_in(&workspace);

    let changes = EditorChanges::insert("/proj/../../escape.txt", 0, "owned");
    let error = manager.on_editor_content_updated("e", &changes).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Forbidden);
    assert_eq!(error.status_code(), 500);

    assert!(manager.tracked_paths().is_empty());
    let parent = workspace.path().parent().unwrap();
    assert!(!parent.join("escape.txt").exists());
}

#[tokio::test]
async fn traversal_lifecycle_event_reports_a_server_error() {
    let workspace = TempDir::new().unwrap();
    let (manager, mut outbound) = manager_in(&workspace);

    let operation = FileTrackingOperation::Start { path: "../etc/passwd".to_string() };
    manager.on_file_operation("editor-7", &operation).await;

    let notification = outbound.try_recv().unwrap();
    assert_eq!(notification.endpoint_id, "editor-7");
    let error: ServerError =
        serde_json::from_value(notification.notification.params.unwrap()).unwrap();
    assert_eq!(error.code, 500);
    assert!(error.message.contains("invalid path"));
}

#[tokio::test]
async fn traversal_query_is_rejected_over_rpc() {
    let workspace = TempDir::new().unwrap();
    let (manager, _outbound) = manager_in(&workspace);
    let (events, _rx) = mpsc::channel(1);
    let state = RpcServerState::new(manager, events, "editor-1");

    for method in ["working_copy.content", "working_copy.persistent_path"] {
        let params = json!({ "path": "/proj/../../etc/passwd" });
        let request = Request::new(method, Some(params), RequestId::Number(1));
        let response = dispatch_request(request, &state).await;
        let error = response.error.expect("traversal should fail");
        assert_eq!(error.code, 500, "{method}");
        assert_eq!(error.data, Some(json!({ "kind": "FORBIDDEN" })));
    }
}
