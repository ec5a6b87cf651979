//! `Range: bytes=S-E` parsing.

/// Parses a `Range` header value of the form `bytes=S-` or `bytes=S-E`.
/// Returns the inclusive `(start, end)` byte range, with `end` clamped to
/// `file_size - 1` and a missing `E` defaulting to `file_size - 1`.
///
/// Returns `None` for anything malformed, multi-range, or out of bounds —
/// callers fall back to serving the full stream.
pub fn parse_range(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let spec = header.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None; // multi-range not supported
    }
    let (start_str, end_str) = spec.split_once('-')?;
    let start: u64 = start_str.trim().parse().ok()?;
    if start >= file_size {
        return None;
    }

    let end = if end_str.trim().is_empty() {
        file_size.saturating_sub(1)
    } else {
        let parsed: u64 = end_str.trim().parse().ok()?;
        parsed.min(file_size.saturating_sub(1))
    };

    if end < start {
        return None;
    }

    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_ended_range() {
        assert_eq!(parse_range("bytes=0-", 1000), Some((0, 999)));
    }

    #[test]
    fn parses_closed_range() {
        assert_eq!(parse_range("bytes=10-20", 1000), Some((10, 20)));
    }

    #[test]
    fn clamps_end_to_file_size_minus_one() {
        assert_eq!(parse_range("bytes=10-99999", 1000), Some((10, 999)));
    }

    #[test]
    fn rejects_start_past_end_of_file() {
        assert_eq!(parse_range("bytes=1000-", 1000), None);
    }

    #[test]
    fn rejects_inverted_range() {
        assert_eq!(parse_range("bytes=50-10", 1000), None);
    }

    #[test]
    fn rejects_multi_range() {
        assert_eq!(parse_range("bytes=0-10,20-30", 1000), None);
    }

    #[test]
    fn rejects_malformed_header() {
        assert_eq!(parse_range("nonsense", 1000), None);
        assert_eq!(parse_range("bytes=", 1000), None);
        assert_eq!(parse_range("bytes=abc-def", 1000), None);
    }
}
