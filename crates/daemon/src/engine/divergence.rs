// Divergence detection: does a working copy differ from its original file?
//
// Both sides go through the same decode/re-encode and the same digest, so a
// file with malformed UTF-8 compares equal to an untouched overlay of itself.
// A digest collision reads as "no unsaved data"; accepted.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::warn;

use super::codec::{bytes_to_text, text_to_bytes};
use super::overlay::OverlayStore;
use crate::fs::{FsError, ProjectFs};

/// Hex-encoded SHA-256 digest.
pub type ContentHash = String;

/// SHA-256 of `content`, as lowercase hex.
pub fn sha256_hex(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Digest of the normalized text form of `content`.
pub fn text_digest(content: &[u8]) -> ContentHash {
    sha256_hex(&text_to_bytes(&bytes_to_text(content)))
}

pub fn contents_differ(left: &[u8], right: &[u8]) -> bool {
    text_digest(left) != text_digest(right)
}

pub struct DivergenceDetector {
    fs: Arc<dyn ProjectFs>,
    store: Arc<OverlayStore>,
}

impl DivergenceDetector {
    pub fn new(fs: Arc<dyn ProjectFs>, store: Arc<OverlayStore>) -> Self {
        Self { fs, store }
    }

    /// Whether the overlay for `path` holds edits its original file lacks.
    ///
    /// Never fails. Anything that prevents a comparison (untracked path,
    /// missing or unreadable original) answers `false`.
    pub fn has_unsaved_data(&self, path: &str) -> bool {
        let Some(copy) = self.store.get(path) else {
            return false;
        };
        match self.read_original(path) {
            Ok(Some(original)) => contents_differ(copy.content(), &original),
            Ok(None) => false,
            Err(error) => {
                warn!(path = %path, error = %error, "could not compare working copy with original");
                false
            }
        }
    }

    fn read_original(&self, path: &str) -> Result<Option<Vec<u8>>, FsError> {
        if self.fs.as_file(path)?.is_none() {
            return Ok(None);
        }
        self.fs.read(path).map(Some)
    }
}
