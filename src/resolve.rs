//! Sandboxed resolution of request URL paths onto the served root.

use percent_encoding::percent_decode_str;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Maps a raw request path onto an absolute path under `root`.
///
/// Query string and fragment are stripped, the remainder percent-decoded, and
/// the segments folded left to right: `..` steps back within the already
/// accepted prefix and is discarded when there is nothing to step back over;
/// `.`, root markers, and drive specifiers are skipped outright. No I/O
/// happens here and resolution cannot fail; whether the result exists is the
/// caller's problem.
pub fn resolve_request_path(root: &Path, raw: &str) -> PathBuf {
    let path = raw.split(['?', '#']).next().unwrap_or("");
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    root.join(sanitize_segments(&decoded))
}

/// Folds special components out of a slash-separated name, producing a
/// relative path that cannot climb above its join point. Shared by the
/// resolver and by action parameters (delete/create-folder names, upload
/// filenames).
pub fn sanitize_segments(raw: &str) -> PathBuf {
    let mut kept: Vec<&OsStr> = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(segment) => kept.push(segment),
            Component::ParentDir => {
                kept.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    kept.iter().collect()
}
