//! Streaming multipart upload of `file` form fields.

use axum::extract::Multipart;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::resolve::sanitize_segments;

/// What the router renders into the upload result page. The transport-level
/// response is always 200; callers read the flag and message out of the body.
#[derive(Debug)]
pub struct UploadOutcome {
    pub success: bool,
    pub message: String,
}

impl UploadOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Writes every `file` field of the multipart body into `dir`, streaming
/// chunk by chunk so large bodies never sit in memory whole. The parse is
/// all-or-nothing: the first failing file ends it with a single aggregate
/// failure message.
pub async fn save_files(dir: &Path, mut multipart: Multipart) -> UploadOutcome {
    let mut saved: Vec<String> = Vec::new();

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return UploadOutcome::failure(format!("Malformed multipart body: {err}"));
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let sanitized = sanitize_segments(&file_name);
        let Some(base) = sanitized
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
        else {
            continue;
        };

        let target = dir.join(&base);
        let mut out = match File::create(&target).await {
            Ok(file) => file,
            Err(err) => {
                warn!(name = %base, error = %err, "upload target not writable");
                return UploadOutcome::failure(format!(
                    "Can't create '{base}' to write, do you have permission to write? ({err})"
                ));
            }
        };

        let mut written: u64 = 0;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(err) = out.write_all(&chunk).await {
                        return UploadOutcome::failure(format!(
                            "Failed while writing '{base}': {err}"
                        ));
                    }
                    written += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(err) => {
                    return UploadOutcome::failure(format!("Unexpected end of data: {err}"));
                }
            }
        }
        info!(name = %base, bytes = written, "file uploaded");
        saved.push(base);
    }

    if saved.is_empty() {
        return UploadOutcome::failure("Can't find a file field in the request.");
    }
    UploadOutcome {
        success: true,
        message: format!("File '{}' upload success!", saved.join("', '")),
    }
}
