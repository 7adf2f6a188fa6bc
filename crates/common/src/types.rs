// Wire types exchanged between editor clients and the working copy daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies the client session (endpoint) an event came from.
pub type EndpointId = String;

/// An incremental edit sent by an editor for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditorChanges {
    /// Original-file path the edit applies to.
    pub file_location: String,
    #[serde(flatten)]
    pub delta: EditDelta,
}

impl EditorChanges {
    pub fn insert(
        file_location: impl Into<String>,
        offset: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            file_location: file_location.into(),
            delta: EditDelta::Insert { offset, text: text.into() },
        }
    }

    pub fn remove(
        file_location: impl Into<String>,
        offset: usize,
        removed_char_count: i64,
    ) -> Self {
        Self {
            file_location: file_location.into(),
            delta: EditDelta::Remove { offset, removed_char_count },
        }
    }
}

/// The two primitive text edits. A replace is a `Remove` followed by an `Insert`.
///
/// Offsets count characters, not bytes; see the daemon's offset unit setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditDelta {
    Insert {
        offset: usize,
        #[serde(default)]
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Remove {
        offset: usize,
        /// Signed on the wire; non-positive counts are tolerated as no-ops.
        #[serde(default)]
        removed_char_count: i64,
    },
}

impl EditDelta {
    /// Whether applying this delta can change content at all.
    pub fn is_effective(&self) -> bool {
        match self {
            Self::Insert { text, .. } => !text.is_empty(),
            Self::Remove { removed_char_count, .. } => *removed_char_count > 0,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Self::Insert { offset, .. } | Self::Remove { offset, .. } => *offset,
        }
    }
}

/// File tracking lifecycle signal sent by an editor client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileTrackingOperation {
    /// The client opened the file for editing.
    Start { path: String },
    /// The client closed the file.
    Stop { path: String },
    /// Tracking paused around an external save; ignored by the working copy layer.
    Suspend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// Tracking resumed after a `Suspend`; ignored by the working copy layer.
    Resume {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// The file was renamed or moved from `old_path` to `path`.
    #[serde(rename_all = "camelCase")]
    Move { old_path: String, path: String },
}

impl FileTrackingOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Suspend { .. } => "suspend",
            Self::Resume { .. } => "resume",
            Self::Move { .. } => "move",
        }
    }

    /// Every original path this operation touches.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::Start { path } | Self::Stop { path } => vec![path.as_str()],
            Self::Suspend { path } | Self::Resume { path } => path.as_deref().into_iter().collect(),
            Self::Move { old_path, path } => vec![old_path.as_str(), path.as_str()],
        }
    }
}

/// Error payload sent to the endpoint whose event failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerError {
    /// HTTP-style status: 400 when the file was not found, 500 otherwise.
    pub code: u16,
    pub message: String,
}

/// Published after an edit delta changed a working copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkingCopyUpdated {
    pub endpoint_id: EndpointId,
    pub changes: EditorChanges,
    pub applied_at: DateTime<Utc>,
}
