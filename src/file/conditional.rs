// Copyright (c) 2018 Weihang Lo
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::time::SystemTime;

use http::{
    header::{
        CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE,
        LAST_MODIFIED, RANGE,
    },
    HeaderName, HeaderValue, Method, StatusCode,
};
use time::{
    format_description::{well_known::Rfc2822, FormatItem},
    macros::format_description,
    OffsetDateTime, PrimitiveDateTime,
};

use crate::{file::etag::EntityTag, request::Request, writer::ResponseWriter};

const HTTP_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");
const ASCTIME_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]");

/// Outcome of a single precondition header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Condition {
    /// The header is absent or unusable
    None,
    True,
    False,
}

/// What to do once preconditions are evaluated
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Precondition {
    /// A `304` or `412` was written, nothing left to send
    Done,
    /// Serve the content, honoring `range` if any
    Serve { range: Option<String> },
}

/// Format a time as an HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(time: SystemTime) -> String {
    OffsetDateTime::from(time).format(HTTP_DATE_FORMAT).unwrap_or_default()
}

/// Parse an HTTP date in any of the formats a client may send
pub fn parse_http_date(date: &str) -> Option<OffsetDateTime> {
    let date = date.trim();
    PrimitiveDateTime::parse(date, HTTP_DATE_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .or_else(|_| OffsetDateTime::parse(date, &Rfc2822))
        .or_else(|_| PrimitiveDateTime::parse(date, ASCTIME_DATE_FORMAT).map(PrimitiveDateTime::assume_utc))
        .ok()
}

/// Seconds since the epoch, `None` for an unknown or epoch modification time
pub(crate) fn unix_seconds(modtime: Option<SystemTime>) -> Option<i64> {
    modtime
        .filter(|t| *t != SystemTime::UNIX_EPOCH)
        .map(|t| OffsetDateTime::from(t).unix_timestamp())
}

fn is_method_get_head(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

fn header_str<'r>(r: &'r Request, name: &HeaderName) -> Option<&'r str> {
    r.headers().get(name).and_then(|h| h.to_str().ok()).filter(|s| !s.trim().is_empty())
}

fn response_etag(w: &dyn ResponseWriter) -> Option<EntityTag> {
    w.header(&ETAG).and_then(|v| v.to_str().ok().and_then(EntityTag::parse))
}

/// `If-Match` uses the strong comparison
///
/// [RFC7232: If-Match](https://tools.ietf.org/html/rfc7232#section-3.1)
fn check_if_match(w: &dyn ResponseWriter, r: &Request) -> Condition {
    let if_match = match header_str(r, &IF_MATCH) {
        Some(h) => h,
        None => return Condition::None,
    };
    if if_match.trim() == "*" {
        return Condition::True;
    }
    let etag = response_etag(w);
    let matched = etag.map_or(false, |etag| EntityTag::parse_list(if_match).any(|t| etag.strong_eq(&t)));
    if matched {
        Condition::True
    } else {
        Condition::False
    }
}

fn check_if_unmodified_since(r: &Request, modtime: Option<SystemTime>) -> Condition {
    let (since, modified) = match (header_str(r, &IF_UNMODIFIED_SINCE).and_then(parse_http_date), unix_seconds(modtime)) {
        (Some(since), Some(modified)) => (since, modified),
        _ => return Condition::None,
    };
    if modified <= since.unix_timestamp() {
        Condition::True
    } else {
        Condition::False
    }
}

/// `If-None-Match` uses the weak comparison
///
/// [RFC7232: If-None-Match](https://tools.ietf.org/html/rfc7232#section-3.2)
fn check_if_none_match(w: &dyn ResponseWriter, r: &Request) -> Condition {
    let if_none_match = match header_str(r, &IF_NONE_MATCH) {
        Some(h) => h,
        None => return Condition::None,
    };
    if if_none_match.trim() == "*" {
        return Condition::False;
    }
    let etag = response_etag(w);
    let matched = etag.map_or(false, |etag| EntityTag::parse_list(if_none_match).any(|t| etag.weak_eq(&t)));
    if matched {
        Condition::False
    } else {
        Condition::True
    }
}

pub(crate) fn check_if_modified_since(r: &Request, modtime: Option<SystemTime>) -> Condition {
    if !is_method_get_head(r.method()) {
        return Condition::None;
    }
    let (since, modified) = match (header_str(r, &IF_MODIFIED_SINCE).and_then(parse_http_date), unix_seconds(modtime)) {
        (Some(since), Some(modified)) => (since, modified),
        _ => return Condition::None,
    };
    if modified <= since.unix_timestamp() {
        Condition::False
    } else {
        Condition::True
    }
}

/// `If-Range` accepts a strong validator or the exact modification date
fn check_if_range(w: &dyn ResponseWriter, r: &Request, modtime: Option<SystemTime>) -> Condition {
    if !is_method_get_head(r.method()) {
        return Condition::None;
    }
    let if_range = match header_str(r, &IF_RANGE) {
        Some(h) => h.trim(),
        None => return Condition::None,
    };

    if if_range.starts_with('"') || if_range.starts_with("W/\"") {
        let matched = match (response_etag(w), EntityTag::parse(if_range)) {
            (Some(etag), Some(tag)) => etag.strong_eq(&tag),
            _ => false,
        };
        return if matched { Condition::True } else { Condition::False };
    }

    match (unix_seconds(modtime), parse_http_date(if_range)) {
        (Some(modified), Some(date)) if modified == date.unix_timestamp() => Condition::True,
        _ => Condition::False,
    }
}

/// Set `Last-Modified` when the modification time is known
pub(crate) fn set_last_modified(w: &dyn ResponseWriter, modtime: Option<SystemTime>) {
    if unix_seconds(modtime).is_none() {
        return;
    }
    if let Some(v) = modtime.and_then(|t| HeaderValue::from_str(&format_http_date(t)).ok()) {
        w.set_header(LAST_MODIFIED, v);
    }
}

/// Reply `304`, dropping the headers that describe a body
pub(crate) fn write_not_modified(w: &dyn ResponseWriter) {
    w.remove_header(&CONTENT_TYPE);
    w.remove_header(&CONTENT_LENGTH);
    w.remove_header(&CONTENT_ENCODING);
    if w.header(&ETAG).is_some() {
        w.remove_header(&LAST_MODIFIED);
    }
    w.write_header(StatusCode::NOT_MODIFIED);
}

/// Evaluate the request preconditions against the response `ETag` and
/// `modtime`, writing a `304` or `412` if they end the exchange
///
/// Precedence follows [RFC7232 section 6](https://tools.ietf.org/html/rfc7232#section-6).
pub(crate) fn check_preconditions(w: &dyn ResponseWriter, r: &Request, modtime: Option<SystemTime>) -> Precondition {
    let mut condition = check_if_match(w, r);
    if condition == Condition::None {
        condition = check_if_unmodified_since(r, modtime);
    }
    if condition == Condition::False {
        w.write_header(StatusCode::PRECONDITION_FAILED);
        return Precondition::Done;
    }

    match check_if_none_match(w, r) {
        Condition::False if is_method_get_head(r.method()) => {
            write_not_modified(w);
            return Precondition::Done;
        }
        Condition::False => {
            w.write_header(StatusCode::PRECONDITION_FAILED);
            return Precondition::Done;
        }
        Condition::None if check_if_modified_since(r, modtime) == Condition::False => {
            write_not_modified(w);
            return Precondition::Done;
        }
        _ => {}
    }

    let range = header_str(r, &RANGE).map(str::to_string);
    let range = range.filter(|_| check_if_range(w, r, modtime) != Condition::False);
    Precondition::Serve { range }
}
