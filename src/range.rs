#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range; serve the whole file.
    Full,
    /// Inclusive byte offsets, already clamped to the file.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

impl RangeRequest {
    pub fn content_length(&self, size: u64) -> u64 {
        match *self {
            RangeRequest::Full => size,
            RangeRequest::Partial { start, end } => end - start + 1,
            RangeRequest::Unsatisfiable => 0,
        }
    }
}

/// Interprets a `Range` header against a file of `size` bytes. Only a single
/// `bytes=` range is honored; anything else falls back to the full file.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeRequest {
    let Some(value) = header else {
        return RangeRequest::Full;
    };
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    let spec = spec.trim();
    if spec.is_empty() || spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeRequest::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // "-N" is the last N bytes
        let Ok(suffix) = end.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if suffix == 0 || size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial {
            start: size.saturating_sub(suffix),
            end: size - 1,
        };
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if end.is_empty() {
        u64::MAX
    } else {
        match end.parse::<u64>() {
            Ok(end) => end,
            Err(_) => return RangeRequest::Full,
        }
    };

    if end < start {
        return RangeRequest::Full;
    }
    if start >= size {
        return RangeRequest::Unsatisfiable;
    }

    RangeRequest::Partial {
        start,
        end: end.min(size - 1),
    }
}
