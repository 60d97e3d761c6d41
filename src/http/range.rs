//! HTTP Range request parsing module
//!
//! Single-range `bytes=` parsing per RFC 7233. Range responses bypass the
//! compression stage, so byte offsets always refer to the on-disk file.

/// Parsed Range request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// Start byte position
    pub start: usize,
    /// End byte position, None means until end of file
    pub end: Option<usize>,
}

impl RangeRequest {
    /// Calculate actual end position (considering file size)
    #[inline]
    pub fn end_position(&self, file_size: usize) -> usize {
        self.end.unwrap_or_else(|| file_size.saturating_sub(1))
    }
}

/// Range header parse result
#[derive(Debug)]
pub enum RangeParseResult {
    /// Valid range request
    Valid(RangeRequest),
    /// Range not satisfiable, should return 416
    NotSatisfiable,
    /// No Range header or malformed (ignore, return full content)
    None,
}

/// Parse HTTP Range header (single range only, bytes unit)
///
/// Supported forms: `bytes=start-end`, `bytes=start-`, `bytes=-suffix`.
/// Multi-range requests and malformed headers are ignored and answered
/// with the full content.
pub fn parse_range_header(range_header: Option<&str>, file_size: usize) -> RangeParseResult {
    let Some(header) = range_header else {
        return RangeParseResult::None;
    };
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeParseResult::None;
    };
    if spec.contains(',') {
        return RangeParseResult::None;
    }

    let Some((start_str, end_str)) = spec.trim().split_once('-') else {
        return RangeParseResult::None;
    };

    // Suffix form: last N bytes
    if start_str.is_empty() {
        let Ok(suffix) = end_str.parse::<usize>() else {
            return RangeParseResult::None;
        };
        // A suffix range on an empty representation is unsatisfiable
        if suffix == 0 || file_size == 0 {
            return RangeParseResult::NotSatisfiable;
        }
        let start = file_size.saturating_sub(suffix);
        return RangeParseResult::Valid(RangeRequest { start, end: None });
    }

    let Ok(start) = start_str.parse::<usize>() else {
        return RangeParseResult::None;
    };
    if start >= file_size {
        return RangeParseResult::NotSatisfiable;
    }

    let end = if end_str.is_empty() {
        None
    } else {
        match end_str.parse::<usize>() {
            // Clamp an over-long end to the last byte
            Ok(end) if end >= start => Some(end.min(file_size.saturating_sub(1))),
            Ok(_) => return RangeParseResult::None,
            Err(_) => return RangeParseResult::None,
        }
    };

    RangeParseResult::Valid(RangeRequest { start, end })
}
