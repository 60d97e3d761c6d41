//! Static file serving module
//!
//! Resolves request paths under the static root, guards against traversal,
//! and builds file responses with cache validators and range support.

use std::io;
use std::path::{Path, PathBuf};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use tokio::fs;

use crate::config::AppState;
use crate::handler::router::RequestContext;
use crate::http::{self, cache, cache::CachePolicy, mime, range::RangeParseResult};
use crate::logger;

/// A file resolved and read from the static root
pub struct ResolvedFile {
    pub content: Vec<u8>,
    pub content_type: &'static str,
    /// Resolved on-disk path, used for the per-extension cache policy
    pub path: PathBuf,
}

/// Serve a request path from the static root
pub async fn serve(ctx: &RequestContext<'_>, state: &AppState) -> Response<Full<Bytes>> {
    let index_files = &state.config.static_files.index_files;
    match resolve_and_read(&state.static_root, ctx.path, index_files).await {
        Ok(Some(file)) => {
            let policy = CachePolicy::for_path(&file.path, &state.config.cache);
            build_file_response(&file, policy, ctx)
        }
        Ok(None) => http::build_404_response(),
        Err(e) => {
            logger::log_error(&format!("Failed to read file for '{}': {e}", ctx.path));
            http::build_500_response()
        }
    }
}

/// Map a URL path to a relative filesystem path
///
/// The path is percent-decoded first, so encoded names (`/my%20file.txt`)
/// resolve; invalid sequences and encoded NUL or slash reject the path.
/// Empty and `.` segments are then dropped, and any `..` segment (encoded
/// or not) is a traversal attempt and rejects the whole path.
pub fn sanitize_path(path: &str) -> Option<PathBuf> {
    let decoded = percent_decode(path)?;
    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            segment => relative.push(segment),
        }
    }
    Some(relative)
}

/// Decode percent-encoded bytes in a request path
///
/// An encoded NUL can never name a file, and an encoded slash would let a
/// single segment smuggle a separator past the segment checks, so both
/// reject the path along with malformed or non-UTF-8 sequences.
fn percent_decode(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_value(*bytes.get(i + 1)?)?;
            let lo = hex_value(*bytes.get(i + 2)?)?;
            let byte = hi * 16 + lo;
            if byte == 0 || byte == b'/' {
                return None;
            }
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Resolve a request path under the root and read the file
///
/// `Ok(None)` means nothing to serve (404); `Err` is a genuine I/O failure
/// reading an existing file (500).
async fn resolve_and_read(
    root: &Path,
    request_path: &str,
    index_files: &[String],
) -> io::Result<Option<ResolvedFile>> {
    let Some(relative) = sanitize_path(request_path) else {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {request_path}"
        ));
        return Ok(None);
    };

    let mut file_path = root.join(relative);

    // Directory requests fall back to the default documents
    if file_path.is_dir() {
        match index_files
            .iter()
            .map(|index| file_path.join(index))
            .find(|candidate| candidate.is_file())
        {
            Some(index) => file_path = index,
            None => return Ok(None),
        }
    }

    // Symlinks inside the tree may still point outside the root
    let canonical = match file_path.canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !canonical.starts_with(root) {
        logger::log_warning(&format!(
            "Resolved path escapes static root: {request_path} -> {}",
            canonical.display()
        ));
        return Ok(None);
    }
    if canonical.is_dir() {
        return Ok(None);
    }

    let content = match fs::read(&canonical).await {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let content_type = mime::get_content_type(canonical.extension().and_then(|e| e.to_str()));

    Ok(Some(ResolvedFile {
        content,
        content_type,
        path: canonical,
    }))
}

/// Build the response for a resolved file: `ETag` validation first, then
/// range handling, then the full cached response
fn build_file_response(
    file: &ResolvedFile,
    policy: CachePolicy,
    ctx: &RequestContext<'_>,
) -> Response<Full<Bytes>> {
    let etag = cache::generate_etag(&file.content);
    let total_size = file.content.len();

    if cache::check_etag_match(ctx.if_none_match.as_deref(), &etag) {
        return http::build_304_response(&etag, policy);
    }

    match http::parse_range_header(ctx.range_header.as_deref(), total_size) {
        RangeParseResult::Valid(range) => {
            let start = range.start;
            let end = range.end_position(total_size);
            return http::response::build_partial_response(
                Bytes::from(file.content[start..=end].to_vec()),
                file.content_type,
                &etag,
                policy,
                start,
                end,
                total_size,
                ctx.is_head,
            );
        }
        RangeParseResult::NotSatisfiable => return http::build_416_response(total_size),
        RangeParseResult::None => {}
    }

    http::response::build_cached_response(
        Bytes::from(file.content.clone()),
        file.content_type,
        &etag,
        policy,
        ctx.is_head,
    )
}
