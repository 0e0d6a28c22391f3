//! The request state machine: action dispatch, file serving, and the
//! delete/create-folder operations.

use axum::body::Body;
use axum::extract::{Extension, FromRequest, Multipart, Request};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::AppState;
use crate::archive;
use crate::config::INDEX_NAMES;
use crate::error::AppError;
use crate::html;
use crate::listing::{self, SortKey, SortOrder};
use crate::resolve::{resolve_request_path, sanitize_segments};
use crate::upload::{self, UploadOutcome};

/// One action per request, decided once from the query string. Precedence
/// mirrors the wire protocol: delete, then create-folder, then download,
/// then plain browsing.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Delete { name: String },
    CreateFolder { name: String },
    Download,
    Browse { sort: SortKey, order: SortOrder },
}

pub fn parse_action(query: Option<&str>) -> Action {
    let pairs: Vec<(String, Option<String>)> = query
        .unwrap_or("")
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut kv = part.splitn(2, '=');
            let key = decode(kv.next().unwrap_or(""));
            let value = kv.next().map(decode);
            (key, value)
        })
        .collect();

    let value_of = |wanted: &str| {
        pairs
            .iter()
            .find(|(key, _)| key == wanted)
            .and_then(|(_, value)| value.clone())
    };

    if let Some(name) = value_of("deletefile") {
        return Action::Delete { name };
    }
    if let Some(name) = value_of("createfolder") {
        return Action::CreateFolder { name };
    }
    if pairs.iter().any(|(key, _)| key == "download") {
        return Action::Download;
    }
    Action::Browse {
        sort: SortKey::from_query(value_of("sort").as_deref()),
        order: SortOrder::from_query(value_of("order").as_deref()),
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().to_string()
}

/// Fallback handler for the whole path space: GET/HEAD navigation and POST
/// uploads. Login and logout have their own routes ahead of this one.
pub async fn handle_request(
    Extension(state): Extension<Arc<AppState>>,
    req: Request,
) -> Result<Response, AppError> {
    let method = req.method().clone();
    if method == Method::GET || method == Method::HEAD {
        handle_navigation(&state, req).await
    } else if method == Method::POST {
        handle_upload(&state, req).await
    } else {
        Ok(StatusCode::METHOD_NOT_ALLOWED.into_response())
    }
}

async fn handle_navigation(state: &AppState, req: Request) -> Result<Response, AppError> {
    let head_only = req.method() == Method::HEAD;
    let raw_path = req.uri().path().to_string();
    let action = parse_action(req.uri().query());
    let resolved = resolve_request_path(&state.root, &raw_path);
    debug!(path = %raw_path, ?action, "dispatch");

    match action {
        Action::Delete { name } => Ok(delete_file(&resolved, &name, &raw_path).await),
        Action::CreateFolder { name } => Ok(create_folder(&resolved, &name, &raw_path).await),
        Action::Download => zip_directory(resolved).await,
        Action::Browse { sort, order } => {
            browse(resolved, &raw_path, sort, order, head_only).await
        }
    }
}

/// Removes `name` inside `dir` and renders the verdict. Action route, so the
/// response is 200 either way; the outcome lives in the body.
async fn delete_file(dir: &Path, name: &str, back: &str) -> Response {
    let target = dir.join(sanitize_segments(name));
    let (success, message) = match fs::symlink_metadata(&target).await {
        Ok(meta) if meta.is_dir() => match fs::remove_dir_all(&target).await {
            Ok(()) => (true, format!("Folder '{name}' was removed.")),
            Err(err) => (false, format!("Can't remove folder '{name}': {err}")),
        },
        Ok(_) => match fs::remove_file(&target).await {
            Ok(()) => (true, format!("File '{name}' was removed.")),
            Err(err) => (false, format!("Can't remove '{name}': {err}")),
        },
        Err(_) => (false, format!("No such file: '{name}'")),
    };
    info!(name = %name, success, "delete");
    Html(html::result_page(
        "File removed",
        &format!("Delete \"{name}\""),
        success,
        &message,
        back,
    ))
    .into_response()
}

/// Creates a subfolder of `dir`. A second attempt on the same name reports
/// failure and leaves the tree untouched.
async fn create_folder(dir: &Path, name: &str, back: &str) -> Response {
    let target = dir.join(sanitize_segments(name));
    let (success, message) = if fs::symlink_metadata(&target).await.is_ok() {
        (false, "Folder already exists!".to_string())
    } else {
        match fs::create_dir(&target).await {
            Ok(()) => (true, format!("Folder '{name}' created.")),
            Err(err) => (false, format!("Can't create folder '{name}': {err}")),
        }
    };
    info!(name = %name, success, "create folder");
    Html(html::result_page(
        "Folder Created Page",
        &format!("Folder \"{name}\" Create Page"),
        success,
        &message,
        back,
    ))
    .into_response()
}

async fn zip_directory(resolved: PathBuf) -> Result<Response, AppError> {
    let metadata = fs::metadata(&resolved)
        .await
        .map_err(|_| AppError::NotFound("File not found".into()))?;
    if !metadata.is_dir() {
        return Err(AppError::NotFound("Not a directory".into()));
    }
    let name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());
    Ok(archive::zip_response(resolved, &name))
}

async fn browse(
    resolved: PathBuf,
    raw_path: &str,
    sort: SortKey,
    order: SortOrder,
    head_only: bool,
) -> Result<Response, AppError> {
    let metadata = fs::metadata(&resolved)
        .await
        .map_err(|_| AppError::NotFound("File not found".into()))?;

    if !metadata.is_dir() {
        return stream_file(resolved, head_only).await;
    }

    // Redirect browsers to the trailing-slash form, the way apache does.
    if !raw_path.ends_with('/') {
        let location = HeaderValue::from_str(&format!("{raw_path}/"))
            .map_err(|err| AppError::Internal(err.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, location);
        return Ok((StatusCode::MOVED_PERMANENTLY, headers).into_response());
    }

    for index in INDEX_NAMES {
        let candidate = resolved.join(index);
        if fs::metadata(&candidate).await.is_ok() {
            return stream_file(candidate, head_only).await;
        }
    }

    let entries = listing::list_dir(&resolved, sort, order)
        .await
        .map_err(|_| AppError::NotFound("No permission to list directory".into()))?;
    let display_path = percent_decode_str(raw_path).decode_utf8_lossy();
    let page = html::listing_page(&display_path, raw_path, &entries, sort, order);
    Ok(Html(page).into_response())
}

/// Opens and streams a file, 404 when it cannot be opened. HEAD gets the
/// same headers with the body omitted.
async fn stream_file(path: PathBuf, head_only: bool) -> Result<Response, AppError> {
    let file = File::open(&path)
        .await
        .map_err(|_| AppError::NotFound("File not found".into()))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|err| AppError::Internal(err.to_string()))?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|err| AppError::Internal(err.to_string()))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    if let Ok(modified) = metadata.modified()
        && let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified))
    {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if head_only {
        return Ok((StatusCode::OK, headers).into_response());
    }
    let stream = ReaderStream::new(file);
    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// POST to any non-login path: parse the multipart body into the resolved
/// directory, then render the result page. Always 200; the success flag is
/// in the body.
async fn handle_upload(state: &AppState, req: Request) -> Result<Response, AppError> {
    let raw_path = req.uri().path().to_string();
    let referer = req
        .headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let dir = resolve_request_path(&state.root, &raw_path);

    let outcome = match Multipart::from_request(req, &()).await {
        Ok(multipart) => upload::save_files(&dir, multipart).await,
        Err(err) => UploadOutcome::failure(format!("Not a multipart upload: {err}")),
    };
    info!(path = %raw_path, success = outcome.success, message = %outcome.message, "upload handled");

    let back = referer.unwrap_or(raw_path);
    Ok(Html(html::result_page(
        "Upload Result Page",
        "Upload Result Page",
        outcome.success,
        &outcome.message,
        &back,
    ))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use axum::body::to_bytes;
    use std::time::Duration;
    use tempfile::tempdir;

    fn make_state(root: PathBuf) -> Arc<AppState> {
        Arc::new(AppState {
            root,
            password: None,
            sessions: SessionStore::new(Duration::from_secs(3600)),
        })
    }

    async fn get(state: Arc<AppState>, uri: &str) -> Response {
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        match handle_request(Extension(state), req).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    #[test]
    fn action_precedence_follows_the_wire_protocol() {
        assert_eq!(
            parse_action(Some("deletefile=a.txt&createfolder=b")),
            Action::Delete {
                name: "a.txt".to_string()
            }
        );
        assert_eq!(
            parse_action(Some("createfolder=new%20dir")),
            Action::CreateFolder {
                name: "new dir".to_string()
            }
        );
        assert_eq!(parse_action(Some("download")), Action::Download);
        assert_eq!(
            parse_action(Some("sort=size&order=desc")),
            Action::Browse {
                sort: SortKey::Size,
                order: SortOrder::Desc
            }
        );
        assert_eq!(
            parse_action(None),
            Action::Browse {
                sort: SortKey::Name,
                order: SortOrder::Asc
            }
        );
        assert_eq!(
            parse_action(Some("sort=garbage&order=sideways")),
            Action::Browse {
                sort: SortKey::Name,
                order: SortOrder::Asc
            }
        );
    }

    #[tokio::test]
    async fn missing_directory_is_404() {
        let temp = tempdir().expect("tempdir");
        let state = make_state(temp.path().to_path_buf());
        let response = get(state, "/a/b/").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn directory_without_trailing_slash_redirects() {
        let temp = tempdir().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("a/b")).expect("mkdir");
        let state = make_state(temp.path().to_path_buf());
        let response = get(state, "/a/b").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok()),
            Some("/a/b/")
        );
    }

    #[tokio::test]
    async fn files_are_served_with_type_and_length() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("note.txt"), b"hello").expect("write");
        let state = make_state(temp.path().to_path_buf());
        let response = get(state, "/note.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/plain")
        );
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok()),
            Some("5")
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn head_gets_headers_without_a_body() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("note.txt"), b"hello").expect("write");
        let state = make_state(temp.path().to_path_buf());
        let req = Request::builder()
            .method(Method::HEAD)
            .uri("/note.txt")
            .body(Body::empty())
            .expect("request");
        let response = handle_request(Extension(state), req)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok()),
            Some("5")
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn index_html_shadows_the_listing() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("index.html"), b"<h1>home</h1>").expect("write");
        let state = make_state(temp.path().to_path_buf());
        let response = get(state, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn listing_shows_uploaded_names_and_sizes() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("data.bin"), vec![0u8; 2048]).expect("write");
        let state = make_state(temp.path().to_path_buf());
        let response = get(state, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let page = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(page.contains("data.bin"));
        assert!(page.contains("2.0KiB"));
    }

    #[tokio::test]
    async fn create_folder_twice_fails_the_second_time() {
        let temp = tempdir().expect("tempdir");
        let state = make_state(temp.path().to_path_buf());

        let response = get(state.clone(), "/?createfolder=fotos").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(String::from_utf8_lossy(&body).contains("Success"));
        assert!(temp.path().join("fotos").is_dir());

        let response = get(state, "/?createfolder=fotos").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(String::from_utf8_lossy(&body).contains("already exists"));
        assert!(temp.path().join("fotos").is_dir());
    }

    #[tokio::test]
    async fn delete_removes_the_file_and_reports_missing_ones() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("bye.txt"), b"x").expect("write");
        let state = make_state(temp.path().to_path_buf());

        let response = get(state.clone(), "/?deletefile=bye.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!temp.path().join("bye.txt").exists());

        let response = get(state, "/?deletefile=bye.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(String::from_utf8_lossy(&body).contains("Failed"));
    }

    #[tokio::test]
    async fn delete_name_cannot_escape_the_directory() {
        let temp = tempdir().expect("tempdir");
        let sub = temp.path().join("sub");
        std::fs::create_dir(&sub).expect("mkdir");
        std::fs::write(temp.path().join("outside.txt"), b"keep me").expect("write");
        let state = make_state(temp.path().to_path_buf());

        let response = get(state, "/sub/?deletefile=..%2Foutside.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(temp.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn download_of_a_file_path_is_404() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("f.txt"), b"x").expect("write");
        let state = make_state(temp.path().to_path_buf());
        let response = get(state, "/f.txt?download").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_of_a_directory_streams_a_zip() {
        let temp = tempdir().expect("tempdir");
        let photos = temp.path().join("photos");
        std::fs::create_dir(&photos).expect("mkdir");
        std::fs::write(photos.join("a.jpg"), vec![1u8; 100]).expect("write");
        std::fs::write(photos.join("b.jpg"), vec![2u8; 200]).expect("write");
        let state = make_state(temp.path().to_path_buf());

        let response = get(state, "/photos/?download").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/zip")
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let reader = async_zip::base::read::mem::ZipFileReader::new(body.to_vec())
            .await
            .expect("zip");
        let names: Vec<String> = reader
            .file()
            .entries()
            .iter()
            .map(|entry| entry.filename().as_str().expect("utf8").to_string())
            .collect();
        assert_eq!(names, ["a.jpg", "b.jpg"]);
    }

    #[tokio::test]
    async fn upload_then_list_round_trips() {
        let temp = tempdir().expect("tempdir");
        let state = make_state(temp.path().to_path_buf());
        let boundary = "test-boundary";
        let payload = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"X\"\r\nContent-Type: application/octet-stream\r\n\r\n123456789\r\n--{boundary}--\r\n"
        );
        let req = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(payload))
            .expect("request");
        let response = handle_request(Extension(state.clone()), req)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(String::from_utf8_lossy(&body).contains("Success"));

        let entries = listing::list_dir(temp.path(), SortKey::Name, SortOrder::Asc)
            .await
            .expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "X");
        assert_eq!(entries[0].size, 9);
    }

    #[tokio::test]
    async fn non_multipart_post_reports_failure_with_200() {
        let temp = tempdir().expect("tempdir");
        let state = make_state(temp.path().to_path_buf());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::from("plain body"))
            .expect("request");
        let response = handle_request(Extension(state), req)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(String::from_utf8_lossy(&body).contains("Failed"));
    }
}
