//! Response body compression module
//!
//! Negotiates a content coding from the client's `Accept-Encoding` header
//! (brotli preferred over gzip) and compresses already-built responses, so
//! the headers produced by the static file stage stay subject to it.

use std::io::{self, Cursor, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};

use crate::config::CompressionConfig;
use crate::logger;

/// Content codings supported by the server, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContentEncoding {
    Brotli,
    Gzip,
}

impl ContentEncoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brotli => "br",
            Self::Gzip => "gzip",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "br" => Some(Self::Brotli),
            "gzip" | "x-gzip" => Some(Self::Gzip),
            _ => None,
        }
    }
}

/// Pick the coding to use for a request, if any
///
/// Codings are ranked by q-value (scaled to 0..=1000, the full q-value
/// precision, default 1000); ties go to the server preference order. A
/// coding with `q=0` is never used. Unknown codings and identity fall
/// through to uncompressed output.
pub fn negotiate(accept_encoding: Option<&str>) -> Option<ContentEncoding> {
    let header = accept_encoding?;
    parse_accept_encoding(header)
        .into_iter()
        .map(|(coding, _)| coding)
        .next()
}

fn parse_accept_encoding(header: &str) -> Vec<(ContentEncoding, u16)> {
    let mut codings: Vec<(ContentEncoding, u16)> = header
        .split(',')
        .filter_map(|part| {
            let mut iter = part.trim().split(';');
            let coding = ContentEncoding::from_token(iter.next()?.trim())?;
            let q = iter
                .next()
                .and_then(|q| q.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .map_or(1000, |f| (f * 1000.0) as u16);
            Some((coding, q))
        })
        .filter(|&(_, q)| q > 0)
        .collect();

    codings.sort_by(|(coding_a, a), (coding_b, b)| b.cmp(a).then(coding_a.cmp(coding_b)));
    codings
}

/// Whether a Content-Type benefits from compression
///
/// Image, media, and archive formats are already compressed; SVG is the
/// text-based exception.
pub fn is_compressible(content_type: &str) -> bool {
    let mime = content_type.split(';').next().map_or("", str::trim);
    if mime == "image/svg+xml" {
        return true;
    }
    if mime.starts_with("text/") {
        return true;
    }
    matches!(
        mime,
        "application/javascript"
            | "application/json"
            | "application/xml"
            | "application/wasm"
            | "font/ttf"
            | "font/otf"
    )
}

/// Compress a body with the given coding
pub fn compress(
    data: &[u8],
    encoding: ContentEncoding,
    cfg: &CompressionConfig,
) -> io::Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(cfg.gzip_level.min(9)));
            encoder.write_all(data)?;
            encoder.finish()
        }
        ContentEncoding::Brotli => {
            let params = brotli::enc::BrotliEncoderParams {
                quality: cfg.brotli_quality.min(11) as i32,
                ..Default::default()
            };
            let mut output = Vec::new();
            brotli::BrotliCompress(&mut Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
    }
}

/// Compression stage: wrap an already-built response
///
/// Leaves the response untouched when no coding was negotiated, the status
/// is not 200, a `Content-Encoding` or `Content-Range` is already present,
/// the `Content-Type` is not compressible, or the body is below the
/// configured minimum size. On compression, `Content-Encoding` and
/// `Content-Length` are rewritten and `Vary: Accept-Encoding` is added.
pub async fn apply(
    response: Response<Full<Bytes>>,
    encoding: Option<ContentEncoding>,
    cfg: &CompressionConfig,
) -> Response<Full<Bytes>> {
    let Some(encoding) = encoding else {
        return response;
    };
    if !cfg.enabled || response.status() != StatusCode::OK {
        return response;
    }

    let headers = response.headers();
    if headers.contains_key(header::CONTENT_ENCODING) || headers.contains_key(header::CONTENT_RANGE)
    {
        return response;
    }
    let compressible = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_compressible);
    if !compressible {
        return response;
    }
    let advertised_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if advertised_len < cfg.min_size {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };
    // HEAD responses carry no body but must mirror the headers of the
    // matching GET; the compressed length is unknown without a body, so
    // Content-Length is dropped rather than left at the identity size
    if bytes.is_empty() {
        parts.headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static(encoding.as_str()),
        );
        parts
            .headers
            .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.headers.remove(header::ACCEPT_RANGES);
        return Response::from_parts(parts, Full::new(bytes));
    }

    match compress(&bytes, encoding, cfg) {
        Ok(compressed) if compressed.len() < bytes.len() => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
            parts
                .headers
                .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
            // Byte offsets would no longer match the file
            parts.headers.remove(header::ACCEPT_RANGES);
            Response::from_parts(parts, Full::new(Bytes::from(compressed)))
        }
        Ok(_) => Response::from_parts(parts, Full::new(bytes)),
        Err(e) => {
            logger::log_error(&format!("Compression failed, sending identity: {e}"));
            Response::from_parts(parts, Full::new(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_negotiate_single_coding() {
        assert_eq!(negotiate(Some("gzip")), Some(ContentEncoding::Gzip));
        assert_eq!(negotiate(Some("br")), Some(ContentEncoding::Brotli));
        assert_eq!(negotiate(Some("x-gzip")), Some(ContentEncoding::Gzip));
    }

    #[test]
    fn test_negotiate_prefers_brotli_on_tie() {
        assert_eq!(negotiate(Some("gzip, br")), Some(ContentEncoding::Brotli));
        assert_eq!(
            negotiate(Some("gzip, deflate, br")),
            Some(ContentEncoding::Brotli)
        );
    }

    #[test]
    fn test_negotiate_q_values() {
        assert_eq!(
            negotiate(Some("br;q=0.5, gzip;q=0.9")),
            Some(ContentEncoding::Gzip)
        );
        assert_eq!(negotiate(Some("gzip;q=0, br")), Some(ContentEncoding::Brotli));
        assert_eq!(negotiate(Some("gzip;q=0, br;q=0")), None);
    }

    #[test]
    fn test_negotiate_keeps_tiny_q_values() {
        assert_eq!(negotiate(Some("gzip;q=0.001")), Some(ContentEncoding::Gzip));
        assert_eq!(
            negotiate(Some("br;q=0.001, gzip;q=0.002")),
            Some(ContentEncoding::Gzip)
        );
    }

    #[test]
    fn test_negotiate_unsupported() {
        assert_eq!(negotiate(None), None);
        assert_eq!(negotiate(Some("identity")), None);
        assert_eq!(negotiate(Some("zstd, deflate")), None);
        assert_eq!(negotiate(Some("")), None);
    }

    #[test]
    fn test_is_compressible() {
        assert!(is_compressible("text/html; charset=utf-8"));
        assert!(is_compressible("application/javascript"));
        assert!(is_compressible("image/svg+xml"));
        assert!(!is_compressible("image/png"));
        assert!(!is_compressible("video/mp4"));
        assert!(!is_compressible("application/zip"));
    }

    #[test]
    fn test_gzip_roundtrip() {
        let cfg = CompressionConfig::default();
        let original = b"a body that compresses well ".repeat(50);
        let compressed = compress(&original, ContentEncoding::Gzip, &cfg).unwrap();
        assert!(compressed.len() < original.len());

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_brotli_roundtrip() {
        let cfg = CompressionConfig::default();
        let original = b"a body that compresses well ".repeat(50);
        let compressed = compress(&original, ContentEncoding::Brotli, &cfg).unwrap();
        assert!(compressed.len() < original.len());

        let mut decoded = Vec::new();
        brotli::Decompressor::new(&compressed[..], 4096)
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, original);
    }

    fn test_response(content_type: &str, body: Vec<u8>) -> Response<Full<Bytes>> {
        Response::builder()
            .status(200)
            .header("Content-Type", content_type)
            .header("Content-Length", body.len())
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_compresses_text() {
        let cfg = CompressionConfig::default();
        let body = b"<html>repeated content</html>".repeat(100);
        let response = test_response("text/html; charset=utf-8", body.clone());

        let response = apply(response, Some(ContentEncoding::Gzip), &cfg).await;
        assert_eq!(
            response.headers().get("content-encoding").unwrap(),
            "gzip"
        );
        assert_eq!(response.headers().get("vary").unwrap(), "Accept-Encoding");

        let compressed = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes();
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_apply_skips_small_bodies() {
        let cfg = CompressionConfig::default();
        let response = test_response("text/html", b"tiny".to_vec());
        let response = apply(response, Some(ContentEncoding::Gzip), &cfg).await;
        assert!(response.headers().get("content-encoding").is_none());
    }

    #[tokio::test]
    async fn test_apply_marks_empty_bodies_without_compressing() {
        let cfg = CompressionConfig::default();
        // A HEAD response: full length advertised, no body
        let response = Response::builder()
            .status(200)
            .header("Content-Type", "text/html")
            .header("Content-Length", 4096)
            .header("Accept-Ranges", "bytes")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = apply(response, Some(ContentEncoding::Gzip), &cfg).await;
        assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
        assert_eq!(response.headers().get("vary").unwrap(), "Accept-Encoding");
        assert!(response.headers().get("content-length").is_none());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_apply_skips_images() {
        let cfg = CompressionConfig::default();
        let response = test_response("image/png", vec![0u8; 4096]);
        let response = apply(response, Some(ContentEncoding::Brotli), &cfg).await;
        assert!(response.headers().get("content-encoding").is_none());
    }

    #[tokio::test]
    async fn test_apply_identity_passthrough() {
        let cfg = CompressionConfig::default();
        let body = b"uncompressed content ".repeat(100);
        let response = test_response("text/plain", body.clone());
        let response = apply(response, None, &cfg).await;
        assert!(response.headers().get("content-encoding").is_none());

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], &body[..]);
    }
}
