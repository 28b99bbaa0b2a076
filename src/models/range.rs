//! `Range` header parsing and resolution against a file length.
//!
//! Parsing is total: every header value maps to either a list of range specs
//! or a [`RangeError::Malformed`]. Resolution then clamps each spec to the
//! file and drops the ones that cannot be satisfied.

use thiserror::Error;

/// Upper bound on ranges accepted in a single header.
pub const MAX_RANGES: usize = 16;

/// A byte-range spec as written by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=a-b`
    FromTo(u64, u64),
    /// `bytes=a-`
    From(u64),
    /// `bytes=-n`, the last `n` bytes.
    Suffix(u64),
}

/// A resolved, inclusive byte range. Always `start <= end < file length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header: {0}")]
    Malformed(String),
    #[error("range not satisfiable for length {0}")]
    Unsatisfiable(u64),
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

impl RangeSpec {
    /// Clamp this spec to a file of `total` bytes, or `None` when it falls
    /// entirely outside the file.
    pub fn resolve(self, total: u64) -> Option<ByteRange> {
        if total == 0 {
            return None;
        }
        let last = total - 1;
        let (start, end) = match self {
            Self::FromTo(start, end) => {
                if end < start {
                    return None;
                }
                (start, end.min(last))
            }
            Self::From(start) => (start, last),
            Self::Suffix(0) => return None,
            Self::Suffix(n) => (total - n.min(total), last),
        };
        if start > end {
            return None;
        }
        Some(ByteRange { start, end })
    }
}

/// Parse a `Range` header value such as `bytes=0-499, -200`.
pub fn parse_range_header(value: &str) -> Result<Vec<RangeSpec>, RangeError> {
    let (unit, set) = value
        .split_once('=')
        .ok_or_else(|| RangeError::Malformed(format!("missing `=` in `{}`", value)))?;

    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(RangeError::Malformed(format!(
            "unsupported range unit `{}`",
            unit.trim()
        )));
    }

    let specs = set
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_spec)
        .collect::<Result<Vec<_>, _>>()?;

    if specs.is_empty() {
        return Err(RangeError::Malformed("empty range set".into()));
    }
    if specs.len() > MAX_RANGES {
        return Err(RangeError::Malformed(format!(
            "{} ranges requested, at most {} allowed",
            specs.len(),
            MAX_RANGES
        )));
    }

    Ok(specs)
}

/// Parse and resolve a header in one step.
///
/// Returns the satisfiable ranges in request order, or
/// [`RangeError::Unsatisfiable`] when none overlap the file.
pub fn resolve_range_header(value: &str, total: u64) -> Result<Vec<ByteRange>, RangeError> {
    let resolved: Vec<ByteRange> = parse_range_header(value)?
        .into_iter()
        .filter_map(|spec| spec.resolve(total))
        .collect();

    if resolved.is_empty() {
        return Err(RangeError::Unsatisfiable(total));
    }
    Ok(resolved)
}

fn parse_spec(item: &str) -> Result<RangeSpec, RangeError> {
    let (first, last) = item
        .split_once('-')
        .ok_or_else(|| RangeError::Malformed(format!("missing `-` in `{}`", item)))?;
    let (first, last) = (first.trim(), last.trim());

    match (first.is_empty(), last.is_empty()) {
        (true, true) => Err(RangeError::Malformed(format!("empty range `{}`", item))),
        (true, false) => Ok(RangeSpec::Suffix(parse_offset(last)?)),
        (false, true) => Ok(RangeSpec::From(parse_offset(first)?)),
        (false, false) => Ok(RangeSpec::FromTo(parse_offset(first)?, parse_offset(last)?)),
    }
}

fn parse_offset(raw: &str) -> Result<u64, RangeError> {
    // u64::from_str accepts a leading `+`, which is not valid here.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed(format!("invalid offset `{}`", raw)));
    }
    raw.parse::<u64>()
        .map_err(|_| RangeError::Malformed(format!("offset `{}` out of range", raw)))
}
