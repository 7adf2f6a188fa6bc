// Event dispatcher: feeds inbound editor events to the working copy manager.
//
// Events on different paths run concurrently. Events on the same path run in
// arrival order: each task waits for the previous task registered on any of
// its paths before touching the manager. A MOVE registers on both its paths.

use std::collections::HashMap;
use std::future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use draftsync_common::path::normalize::normalize_path;
use draftsync_common::types::{EditorChanges, EndpointId, FileTrackingOperation};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::engine::{WorkingCopyError, WorkingCopyManager};
use crate::fs::{LocalProjectFs, ProjectFs};
use crate::rpc::methods::RpcServerState;
use crate::rpc::stdio::serve_connection;
use crate::transmit::ChannelTransmitter;

/// Completed-task entries are pruned once this many paths are remembered.
const PRUNE_THRESHOLD: usize = 256;

/// One event from an editor endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    FileOperation { endpoint_id: EndpointId, operation: FileTrackingOperation },
    ContentChanged { endpoint_id: EndpointId, changes: EditorChanges },
}

impl InboundEvent {
    pub fn endpoint_id(&self) -> &str {
        match self {
            Self::FileOperation { endpoint_id, .. } | Self::ContentChanged { endpoint_id, .. } => {
                endpoint_id
            }
        }
    }

    /// Ordering keys: the normalized form of every path the event touches.
    fn keys(&self) -> Vec<String> {
        let paths = match self {
            Self::FileOperation { operation, .. } => operation.paths(),
            Self::ContentChanged { changes, .. } => vec![changes.file_location.as_str()],
        };
        let mut keys: Vec<String> = paths
            .into_iter()
            .map(|path| normalize_path(path).unwrap_or_else(|_| path.to_string()))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Interval of the background persistence sweep; `None` disables it.
    pub persist_interval: Option<Duration>,
}

pub struct ManagerHandle {
    manager: Arc<WorkingCopyManager>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl ManagerHandle {
    pub fn manager(&self) -> &Arc<WorkingCopyManager> {
        &self.manager
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Stop accepting events, finish queued and in-flight ones, then persist
    /// every working copy.
    pub async fn wait(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ManagerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start dispatching `events` to `manager`.
///
/// The loop also exits when every sender of `events` is dropped; `wait`
/// still drains and persists in that case.
pub fn start(
    manager: Arc<WorkingCopyManager>,
    events: mpsc::Receiver<InboundEvent>,
    options: RuntimeOptions,
) -> ManagerHandle {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    info!(persist_interval = ?options.persist_interval, "working copy runtime started");
    let task = tokio::spawn(run_dispatcher(Arc::clone(&manager), events, shutdown_rx, options));
    ManagerHandle { manager, shutdown_tx, task: Some(task) }
}

/// Serve the workspace at `root` to one editor over stdin/stdout until EOF,
/// `daemon.shutdown` or Ctrl-C.
pub async fn run_standalone(root: &Path, config: &DaemonConfig) -> Result<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root `{}` is not accessible", root.display()))?;
    let capacity = config.events.channel_capacity.max(1);

    let project_fs: Arc<dyn ProjectFs> = Arc::new(LocalProjectFs::new(&root));
    let (transmitter, outbound) = ChannelTransmitter::channel(capacity);
    let manager = Arc::new(WorkingCopyManager::new(
        project_fs,
        Arc::new(transmitter),
        config.manager_options(),
    ));
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let handle = start(
        Arc::clone(&manager),
        events_rx,
        RuntimeOptions { persist_interval: config.persist_interval() },
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = ctrl_c_tx.send(());
    });

    let endpoint_id = Uuid::new_v4().to_string();
    let state = RpcServerState::new(Arc::clone(&manager), events_tx, endpoint_id.clone())
        .with_shutdown_notifier(shutdown_tx);
    info!(root = %root.display(), endpoint_id = %endpoint_id, "standalone daemon started");
    let result = serve_connection(
        tokio::io::stdin(),
        tokio::io::stdout(),
        state,
        outbound,
        manager.subscribe_updates(),
        shutdown_rx,
    )
    .await;

    handle.wait().await;
    result.context("stdio bridge exited with error")
}

async fn run_dispatcher(
    manager: Arc<WorkingCopyManager>,
    mut events: mpsc::Receiver<InboundEvent>,
    mut shutdown: broadcast::Receiver<()>,
    options: RuntimeOptions,
) {
    let mut dispatcher = Dispatcher::new(Arc::clone(&manager));
    let mut sweep = options.persist_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("working copy runtime shutting down");
                break;
            }

            maybe_event = events.recv() => match maybe_event {
                Some(event) => dispatcher.dispatch(event),
                None => {
                    info!("inbound event channel closed, runtime exiting");
                    break;
                }
            },

            _ = next_tick(&mut sweep) => {
                let manager = Arc::clone(&manager);
                dispatcher.tasks.spawn(async move {
                    let report = manager.persist_all().await;
                    if report.failed > 0 {
                        warn!(
                            persisted = report.persisted,
                            failed = report.failed,
                            "persistence sweep incomplete"
                        );
                    } else {
                        debug!(persisted = report.persisted, "persistence sweep finished");
                    }
                });
            }

            Some(joined) = dispatcher.tasks.join_next(), if !dispatcher.tasks.is_empty() => {
                if let Err(join_error) = joined {
                    error!(error = %join_error, "event task failed");
                }
            }
        }
    }

    events.close();
    while let Some(event) = events.recv().await {
        dispatcher.dispatch(event);
    }
    dispatcher.drain().await;

    let report = manager.persist_all().await;
    info!(persisted = report.persisted, failed = report.failed, "working copy runtime stopped");
}

async fn next_tick(sweep: &mut Option<Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

struct Dispatcher {
    manager: Arc<WorkingCopyManager>,
    /// Completion signal of the last task registered per path.
    tails: HashMap<String, watch::Receiver<bool>>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    fn new(manager: Arc<WorkingCopyManager>) -> Self {
        Self { manager, tails: HashMap::new(), tasks: JoinSet::new() }
    }

    fn dispatch(&mut self, event: InboundEvent) {
        if self.tails.len() >= PRUNE_THRESHOLD {
            self.tails.retain(|_, done| !*done.borrow() && done.has_changed().is_ok());
        }

        let (done_tx, done_rx) = watch::channel(false);
        let mut predecessors = Vec::new();
        for key in event.keys() {
            if let Some(previous) = self.tails.insert(key, done_rx.clone()) {
                predecessors.push(previous);
            }
        }

        let manager = Arc::clone(&self.manager);
        self.tasks.spawn(async move {
            for mut previous in predecessors {
                // A dropped sender means the predecessor is gone; either way it's done.
                let _ = previous.wait_for(|done| *done).await;
            }
            handle_event(manager, event).await;
            let _ = done_tx.send(true);
        });
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(join_error) = joined {
                error!(error = %join_error, "event task failed");
            }
        }
        self.tails.clear();
    }
}

/// Run one event on its own task so a panic surfaces as an `Unknown` failure.
async fn handle_event(manager: Arc<WorkingCopyManager>, event: InboundEvent) {
    let endpoint_id = event.endpoint_id().to_string();
    let worker = Arc::clone(&manager);
    let outcome = tokio::spawn(async move {
        match event {
            InboundEvent::FileOperation { endpoint_id, operation } => {
                worker.on_file_operation(&endpoint_id, &operation).await;
                Ok(())
            }
            InboundEvent::ContentChanged { endpoint_id, changes } => {
                worker.on_editor_content_updated(&endpoint_id, &changes).await.map(|_| ())
            }
        }
    })
    .await;

    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(join_error) => WorkingCopyError::Unknown(format!("event handler failed: {join_error}")),
    };
    error!(
        endpoint_id = %endpoint_id,
        kind = failure.kind().as_str(),
        error = %failure,
        "editor event failed"
    );
    manager.report_failure(&endpoint_id, &failure);
}
