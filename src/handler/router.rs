//! Request routing dispatch module
//!
//! Entry point for HTTP request processing. Runs the ordered pipeline:
//! method gate, encoding negotiation, static resolution, then the
//! compression stage over the built response, and finally access logging.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, Version};

use crate::config::AppState;
use crate::handler::static_files;
use crate::http::{self, encoding};
use crate::logger::{self, AccessLogEntry};

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
    pub if_none_match: Option<String>,
    pub range_header: Option<String>,
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = process(&req, &state).await;

    if state.config.logging.access_log {
        let entry = access_entry(&req, &response, peer_addr);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Run the request pipeline and produce a response
async fn process<B>(req: &Request<B>, state: &Arc<AppState>) -> Response<Full<Bytes>> {
    // 1. Method gate
    if let Some(response) = check_http_method(req.method()) {
        return response;
    }

    // 2. Negotiate the content coding before any file work
    let encoding = if state.config.compression.enabled {
        encoding::negotiate(header_str(req, "accept-encoding").as_deref())
    } else {
        None
    };

    // Header dumps are a development-only diagnostic
    if !state.config.server.environment.is_production() && state.config.logging.show_headers {
        logger::log_request_headers(req.headers());
    }

    // 3. Resolve and serve the file
    let ctx = RequestContext {
        path: req.uri().path(),
        is_head: *req.method() == Method::HEAD,
        if_none_match: header_str(req, "if-none-match"),
        range_header: header_str(req, "range"),
    };
    let response = static_files::serve(&ctx, state).await;

    // 4. Compression stage wraps the built response
    encoding::apply(response, encoding, &state.config.compression).await
}

/// Check HTTP method and return appropriate response for non-GET/HEAD methods
fn check_http_method(method: &Method) -> Option<Response<Full<Bytes>>> {
    match method {
        &Method::GET | &Method::HEAD => None,
        &Method::OPTIONS => Some(http::build_options_response()),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

fn header_str<B>(req: &Request<B>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn access_entry<B>(
    req: &Request<B>,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = match req.version() {
        Version::HTTP_10 => "1.0".to_string(),
        Version::HTTP_2 => "2".to_string(),
        _ => "1.1".to_string(),
    };
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    entry.referer = header_str(req, "referer");
    entry.user_agent = header_str(req, "user-agent");
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn setup_state(files: &[(&str, &[u8])]) -> Arc<AppState> {
        let dir = std::env::temp_dir().join(format!(
            "staticd-router-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }

        let mut config = Config::default();
        config.static_files.root = dir.to_string_lossy().into_owned();
        config.logging.access_log = false;
        Arc::new(AppState::new(config).unwrap())
    }

    fn peer() -> SocketAddr {
        "192.0.2.1:4321".parse().unwrap()
    }

    fn request(method: &str, path: &str, headers: &[(&str, &str)]) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    async fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_get_file_end_to_end() {
        let state = setup_state(&[("app.js", b"console.log(1);")]);
        let response = handle_request(request("GET", "/app.js", &[]), state, peer())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/javascript"
        );
        assert_eq!(
            response.headers().get("cache-control").unwrap(),
            "public, max-age=31536000"
        );
        assert_eq!(&body_bytes(response).await[..], b"console.log(1);");
    }

    #[tokio::test]
    async fn test_gzip_negotiated_body_roundtrips() {
        let body = b"function main() { return 42; }\n".repeat(100);
        let files = [("bundle.js", &body[..])];
        let state = setup_state(&files);

        let response = handle_request(
            request("GET", "/bundle.js", &[("Accept-Encoding", "gzip")]),
            state,
            peer(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");

        let compressed = body_bytes(response).await;
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_brotli_preferred_over_gzip() {
        let body = b"<p>hello world</p>\n".repeat(200);
        let files = [("index.html", &body[..])];
        let state = setup_state(&files);

        let response = handle_request(
            request("GET", "/", &[("Accept-Encoding", "gzip, deflate, br")]),
            state,
            peer(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("content-encoding").unwrap(), "br");

        let compressed = body_bytes(response).await;
        let mut decoded = Vec::new();
        brotli::Decompressor::new(&compressed[..], 4096)
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_no_accept_encoding_sends_identity() {
        let body = b"plain text line\n".repeat(200);
        let files = [("notes.txt", &body[..])];
        let state = setup_state(&files);

        let response = handle_request(request("GET", "/notes.txt", &[]), state, peer())
            .await
            .unwrap();

        assert!(response.headers().get("content-encoding").is_none());
        assert_eq!(&body_bytes(response).await[..], &body[..]);
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let state = setup_state(&[]);
        let response = handle_request(request("GET", "/nonexistent.html", &[]), state, peer())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_post_is_405() {
        let state = setup_state(&[("index.html", b"home")]);
        let response = handle_request(request("POST", "/", &[]), state, peer())
            .await
            .unwrap();
        assert_eq!(response.status(), 405);
        assert_eq!(
            response.headers().get("allow").unwrap(),
            "GET, HEAD, OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_options_is_204() {
        let state = setup_state(&[]);
        let response = handle_request(request("OPTIONS", "/", &[]), state, peer())
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
    }

    #[tokio::test]
    async fn test_head_mirrors_get_encoding_headers() {
        let body = b"<p>hello world</p>\n".repeat(200);
        let files = [("index.html", &body[..])];
        let state = setup_state(&files);

        let response = handle_request(
            request("HEAD", "/", &[("Accept-Encoding", "gzip")]),
            state,
            peer(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
        assert_eq!(response.headers().get("vary").unwrap(), "Accept-Encoding");
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let state = setup_state(&[("page.html", b"<html>page</html>")]);
        let response = handle_request(request("HEAD", "/page.html", &[]), state, peer())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("content-length").unwrap(), "17");
        assert!(body_bytes(response).await.is_empty());
    }
}
