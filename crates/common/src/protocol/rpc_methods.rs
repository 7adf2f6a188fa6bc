// RPC method name constants for the editor tracking protocol.

// ── Daemon-internal ────────────────────────────────────────────────
pub const RPC_PING: &str = "rpc.ping";
pub const DAEMON_SHUTDOWN: &str = "daemon.shutdown";

// ── Inbound editor events ──────────────────────────────────────────
pub const TRACK_EDITOR_FILE: &str = "track:editor-file";
pub const TRACK_EDITOR_CONTENT_CHANGES: &str = "track:editor-content-changes";

// ── Working copy queries ───────────────────────────────────────────
pub const WORKING_COPY_CONTENT: &str = "working_copy.content";
pub const WORKING_COPY_PERSISTENT_PATH: &str = "working_copy.persistent_path";
pub const WORKING_COPY_RECOVERABLE: &str = "working_copy.recoverable";

// ── Outbound notifications ─────────────────────────────────────────
pub const WORKING_COPY_ERROR: &str = "track:editor-working-copy-error";
pub const WORKING_COPY_UPDATED: &str = "track:editor-working-copy-updated";

/// All inbound methods the daemon dispatches.
pub const IMPLEMENTED_METHODS: &[&str] = &[
    RPC_PING,
    DAEMON_SHUTDOWN,
    TRACK_EDITOR_FILE,
    TRACK_EDITOR_CONTENT_CHANGES,
    WORKING_COPY_CONTENT,
    WORKING_COPY_PERSISTENT_PATH,
    WORKING_COPY_RECOVERABLE,
];

/// Methods the daemon only ever sends.
pub const OUTBOUND_METHODS: &[&str] = &[WORKING_COPY_ERROR, WORKING_COPY_UPDATED];
