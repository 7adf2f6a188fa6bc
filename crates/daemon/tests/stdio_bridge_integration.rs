// Newline-delimited JSON-RPC bridge driven over in-memory pipes.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use draftsync_daemon::engine::{ManagerOptions, WorkingCopyManager};
use draftsync_daemon::fs::{LocalProjectFs, ProjectFs};
use draftsync_daemon::rpc::methods::RpcServerState;
use draftsync_daemon::rpc::stdio::serve_connection;
use draftsync_daemon::runtime::{self, ManagerHandle, RuntimeOptions};
use draftsync_daemon::transmit::ChannelTransmitter;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

struct Client {
    _tmp: TempDir,
    writer: DuplexStream,
    lines: Lines<BufReader<DuplexStream>>,
    server: JoinHandle<anyhow::Result<()>>,
    runtime: ManagerHandle,
}

impl Client {
    async fn send(&mut self, message: Value) {
        let mut encoded = serde_json::to_vec(&message).unwrap();
        encoded.push(b'\n');
        self.writer.write_all(&encoded).await.unwrap();
    }

    async fn next(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("bridge closed the stream");
        serde_json::from_str(&line).unwrap()
    }
}

fn connect() -> Client {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("proj")).unwrap();
    fs::write(tmp.path().join("proj/notes.md"), "# Notes\n").unwrap();

    let project_fs: Arc<dyn ProjectFs> = Arc::new(LocalProjectFs::new(tmp.path()));
    let (transmitter, outbound) = ChannelTransmitter::channel(16);
    let manager = Arc::new(WorkingCopyManager::new(
        project_fs,
        Arc::new(transmitter),
        ManagerOptions::default(),
    ));
    let (events_tx, events_rx) = mpsc::channel(16);
    let runtime = runtime::start(Arc::clone(&manager), events_rx, RuntimeOptions::default());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let state = RpcServerState::new(Arc::clone(&manager), events_tx, "editor-1")
        .with_shutdown_notifier(shutdown_tx);
    let (client_writer, server_reader) = tokio::io::duplex(4096);
    let (server_writer, client_reader) = tokio::io::duplex(4096);
    let updates = manager.subscribe_updates();
    let server = tokio::spawn(async move {
        serve_connection(server_reader, server_writer, state, outbound, updates, shutdown_rx).await
    });

    Client {
        _tmp: tmp,
        writer: client_writer,
        lines: BufReader::new(client_reader).lines(),
        server,
        runtime,
    }
}

#[tokio::test]
async fn edit_round_trip_over_the_bridge() {
    let mut client = connect();

    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "track:editor-file",
            "params": {"type": "START", "path": "/proj/notes.md"},
        }))
        .await;
    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "track:editor-content-changes",
            "params": {
                "fileLocation": "/proj/notes.md",
                "type": "INSERT",
                "offset": 8,
                "text": "- one\n",
            },
            "id": 1,
        }))
        .await;

    let ack = client.next().await;
    assert_eq!(ack["id"], 1);
    assert_eq!(ack["result"], json!({"accepted": true}));

    let update = client.next().await;
    assert_eq!(update["method"], "track:editor-working-copy-updated");
    assert_eq!(update["params"]["endpointId"], "editor-1");
    assert_eq!(update["params"]["changes"]["text"], "- one\n");

    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "working_copy.content",
            "params": {"path": "/proj/notes.md"},
            "id": 2,
        }))
        .await;
    let content = client.next().await;
    assert_eq!(content["result"]["content"], "# Notes\n- one\n");

    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "working_copy.persistent_path",
            "params": {"path": "/proj/notes.md"},
            "id": 3,
        }))
        .await;
    let persistent = client.next().await;
    let path = persistent["result"]["path"].as_str().unwrap().to_string();
    assert_eq!(fs::read_to_string(path).unwrap(), "# Notes\n- one\n");

    client.send(json!({"jsonrpc": "2.0", "method": "daemon.shutdown", "id": 4})).await;
    assert_eq!(client.next().await["result"], json!({"ok": true}));
    client.server.await.unwrap().unwrap();
    client.runtime.wait().await;
}

#[tokio::test]
async fn failed_lifecycle_event_arrives_as_error_notification() {
    let mut client = connect();

    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "track:editor-file",
            "params": {"type": "START", "path": "/proj/missing.md"},
        }))
        .await;

    let notification = client.next().await;
    assert_eq!(notification["method"], "track:editor-working-copy-error");
    assert!(notification.get("id").is_none());
    assert_eq!(notification["params"]["code"], 400);
    let message = notification["params"]["message"].as_str().unwrap();
    assert!(message.starts_with("Can not handle file operation: "));

    drop(client.writer);
    client.server.await.unwrap().unwrap();
    client.runtime.wait().await;
}

#[tokio::test]
async fn garbage_and_blank_lines_are_handled() {
    let mut client = connect();

    client.writer.write_all(b"\r\n   \nnot json\n").await.unwrap();
    let response = client.next().await;
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    client.send(json!({"jsonrpc": "2.0", "method": "rpc.ping", "id": "p"})).await;
    assert_eq!(client.next().await["result"], json!({"ok": true}));

    drop(client.writer);
    client.server.await.unwrap().unwrap();
    client.runtime.wait().await;
}
