use std::sync::Arc;

use draftsync_common::types::EditDelta;

use super::codec::{
    advance, byte_index, bytes_to_text, text_to_bytes, unit_len, OffsetOutOfRange, OffsetUnit,
};

/// In-memory overlay of one file opened in an editor.
///
/// Content is always complete; every update swaps in a new buffer.
/// A copy is dirty from its first content change until the next flush to its
/// backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    path: String,
    project_path: String,
    content: Arc<[u8]>,
    dirty: bool,
}

impl WorkingCopy {
    /// `path` is the flattened backing file name, not the original path.
    pub fn new(path: impl Into<String>, project_path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            project_path: project_path.into(),
            content: content.into(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn project_path(&self) -> &str {
        &self.project_path
    }

    pub fn set_project_path(&mut self, project_path: impl Into<String>) {
        self.project_path = project_path.into();
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_as_text(&self) -> String {
        bytes_to_text(&self.content)
    }

    pub fn replace_content(&mut self, content: Vec<u8>) {
        self.content = content.into();
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Apply `delta` to the text view of this copy.
    ///
    /// Returns `Ok(false)` when the delta can't change anything (empty insert,
    /// non-positive remove count); content is left untouched.
    pub fn apply(&mut self, delta: &EditDelta, unit: OffsetUnit) -> Result<bool, OffsetOutOfRange> {
        match splice(&self.content_as_text(), delta, unit)? {
            Some(text) => {
                self.replace_content(text_to_bytes(&text));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Apply one delta to `text`, returning the new text or `None` for a no-op delta.
///
/// Inserts must land on or before the end of the text. Removals must start on
/// or before the end; their end is clamped to the text length.
pub fn splice(
    text: &str,
    delta: &EditDelta,
    unit: OffsetUnit,
) -> Result<Option<String>, OffsetOutOfRange> {
    if !delta.is_effective() {
        return Ok(None);
    }

    let out_of_range = |offset: usize| OffsetOutOfRange { offset, len: unit_len(text, unit), unit };

    match delta {
        EditDelta::Insert { offset, text: inserted } => {
            let at = byte_index(text, *offset, unit).ok_or_else(|| out_of_range(*offset))?;
            let mut updated = String::with_capacity(text.len() + inserted.len());
            updated.push_str(&text[..at]);
            updated.push_str(inserted);
            updated.push_str(&text[at..]);
            Ok(Some(updated))
        }
        EditDelta::Remove { offset, removed_char_count } => {
            let start = byte_index(text, *offset, unit).ok_or_else(|| out_of_range(*offset))?;
            let count = usize::try_from(*removed_char_count).unwrap_or(usize::MAX);
            let end = advance(text, start, count, unit);
            let mut updated = String::with_capacity(text.len() - (end - start));
            updated.push_str(&text[..start]);
            updated.push_str(&text[end..]);
            Ok(Some(updated))
        }
    }
}
