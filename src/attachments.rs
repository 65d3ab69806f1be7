//! Attachment materialization.
//!
//! Decodes caller-supplied base64 attachments into files under a scratch
//! directory so the generator and publisher can address them by path. One
//! bad attachment never sinks the batch: it is logged and skipped.

use crate::request::AttachmentUpload;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};

/// An attachment that has been decoded to local disk.
#[derive(Debug, Clone)]
pub struct SavedAttachment {
    /// Original relative path inside the target repository.
    pub name: String,
    pub mime: String,
    /// Where the decoded bytes live locally.
    pub path: PathBuf,
    pub size: u64,
}

/// Decode each upload into `dir`, skipping items that fail to decode or
/// write. Returns the attachments that made it to disk, in input order.
pub fn materialize(uploads: &[AttachmentUpload], dir: &Path) -> Vec<SavedAttachment> {
    if uploads.is_empty() {
        return Vec::new();
    }

    if let Err(err) = fs::create_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %err, "Could not create attachment dir; skipping all attachments");
        return Vec::new();
    }

    let mut saved = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match materialize_one(upload, dir) {
            Ok(attachment) => saved.push(attachment),
            Err(err) => {
                tracing::warn!(name = %upload.name, error = %err, "Skipping attachment that failed to materialize");
            }
        }
    }
    saved
}

fn materialize_one(upload: &AttachmentUpload, dir: &Path) -> anyhow::Result<SavedAttachment> {
    let bytes = STANDARD.decode(strip_data_uri(&upload.content))?;

    // Attachment names are repository paths chosen by the caller; only the
    // final component is used on local disk so names cannot escape `dir`.
    let file_name = Path::new(&upload.name)
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("attachment name has no file component"))?;
    let path = dir.join(file_name);

    fs::write(&path, &bytes)?;

    Ok(SavedAttachment {
        name: upload.name.clone(),
        mime: upload.mime.clone(),
        path,
        size: bytes.len() as u64,
    })
}

/// Accept both bare base64 and `data:<mime>;base64,<payload>` URIs.
fn strip_data_uri(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("data:") {
        match trimmed.split_once(',') {
            Some((_, payload)) => payload,
            None => trimmed,
        }
    } else {
        trimmed
    }
}
