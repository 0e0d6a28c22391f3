//! On-the-fly zip archiving of a directory tree.

use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipDateTime, ZipEntryBuilder};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWrite;
use tokio_util::compat::FuturesAsyncWriteCompatExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use walkdir::WalkDir;

const PIPE_BUF_SIZE: usize = 64 * 1024;

/// Streams `dir` to the client as a zip attachment named `<name>.zip`.
///
/// The archive is produced into the write half of an in-memory pipe by a
/// spawned task while the read half feeds the response body, so no archive
/// file ever touches the tree being zipped.
pub fn zip_response(dir: PathBuf, name: &str) -> Response {
    let (mut writer, reader) = tokio::io::duplex(PIPE_BUF_SIZE);
    let label = dir.clone();
    tokio::spawn(async move {
        if let Err(err) = zip_dir(&mut writer, &label).await {
            warn!(path = ?label, error = %err, "zip stream aborted");
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{name}.zip\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    info!(path = ?dir, "zip download started");
    (
        StatusCode::OK,
        headers,
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

/// Writes every regular file under `dir` into `writer` as a Deflate entry
/// named by its slash-separated path relative to `dir`. The walk is sorted,
/// so the same tree yields the same archive. Files that vanish between the
/// walk and the open are skipped rather than aborting the stream.
pub async fn zip_dir<W: AsyncWrite + Unpin>(writer: &mut W, dir: &Path) -> io::Result<()> {
    let mut zip = ZipFileWriter::with_tokio(writer);

    let walk_root = dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || collect_files(&walk_root))
        .await
        .map_err(io::Error::other)?;

    for path in files {
        let Some(filename) = path
            .strip_prefix(dir)
            .ok()
            .and_then(|p| p.to_str())
            .map(|p| p.replace(std::path::MAIN_SEPARATOR, "/"))
        else {
            continue;
        };
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(_) => continue,
        };
        let modified = file
            .metadata()
            .await
            .ok()
            .and_then(|meta| meta.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        let builder = ZipEntryBuilder::new(filename.into(), Compression::Deflate)
            .last_modification_date(ZipDateTime::from_chrono(&modified));
        let entry = zip
            .write_entry_stream(builder)
            .await
            .map_err(io::Error::other)?;
        let mut entry = entry.compat_write();
        tokio::io::copy(&mut file, &mut entry).await?;
        entry.into_inner().close().await.map_err(io::Error::other)?;
    }

    zip.close().await.map_err(io::Error::other)?;
    Ok(())
}

/// Regular files only, sorted by name for a stable entry order. Walk errors
/// (permission, vanished entries) drop the affected subtree instead of
/// failing the archive.
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
