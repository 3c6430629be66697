// Copyright (c) 2018 Weihang Lo
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

/// A satisfiable byte range, clamped to the content size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    /// Value of the matching `Content-Range` response header
    pub fn content_range(&self, size: u64) -> String {
        if self.length == 0 {
            return format!("bytes */{}", size);
        }
        format!("bytes {}-{}/{}", self.start, self.start + self.length - 1, size)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid range")]
    Invalid,
    /// Every range starts past the end of the content
    #[error("invalid range: failed to overlap")]
    NoOverlap,
}

/// Parse a `Range` header against content of `size` bytes
///
/// Ranges starting past the end are dropped; if that leaves none,
/// [`RangeError::NoOverlap`] is returned. Syntax errors make the whole header
/// invalid.
///
/// [RFC7233: Range](https://tools.ietf.org/html/rfc7233#section-3.1)
pub fn parse_range(header: &str, size: u64) -> Result<Vec<ByteRange>, RangeError> {
    let specs = header.strip_prefix("bytes=").ok_or(RangeError::Invalid)?;

    let mut ranges = Vec::new();
    let mut no_overlap = false;
    for spec in specs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (start, end) = spec.split_once('-').ok_or(RangeError::Invalid)?;
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            // suffix range, the last `end` bytes
            if end.is_empty() || end.starts_with('-') {
                return Err(RangeError::Invalid);
            }
            let suffix = end.parse::<u64>().map_err(|_| RangeError::Invalid)?.min(size);
            ranges.push(ByteRange {
                start: size - suffix,
                length: suffix,
            });
            continue;
        }

        let start = start.parse::<u64>().map_err(|_| RangeError::Invalid)?;
        if start >= size {
            no_overlap = true;
            continue;
        }
        let length = if end.is_empty() {
            size - start
        } else {
            let end = end.parse::<u64>().map_err(|_| RangeError::Invalid)?;
            if start > end {
                return Err(RangeError::Invalid);
            }
            end.min(size - 1) - start + 1
        };
        ranges.push(ByteRange { start, length });
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NoOverlap);
    }
    Ok(ranges)
}
