use std::{io, sync::Arc};

use http::{
    header::{HeaderName, CONTENT_TYPE},
    HeaderMap, HeaderValue, Response as RawResponse, StatusCode,
};
use hyper::body::{Body as RawBody, Bytes};
use parking_lot::Mutex;

use crate::binding::Binding;

/// Shared handle to the response of the request being handled
pub type Writer = Arc<dyn ResponseWriter>;

/// The native response-writer calling convention
///
/// Headers can be changed until the status is written, either explicitly
/// with [`write_header`](#tymethod.write_header) or implicitly by the first
/// [`write`](#tymethod.write). Changes made afterward have no effect.
///
/// All methods take `&self` so a writer can be shared through a [`Context`].
/// Implementations are expected to be used by a single task at a time.
///
/// [`Context`]: crate::context::Context
pub trait ResponseWriter: Send + Sync {
    /// Run `f` against the response headers
    fn with_headers(&self, f: &mut dyn FnMut(&mut HeaderMap));

    /// Send the response status. Only the first call has an effect
    fn write_header(&self, status: StatusCode);

    /// Append `buf` to the response body, writing a `200` status first if
    /// none was written yet
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// The status written so far, if any
    fn status(&self) -> Option<StatusCode>;

    #[doc(hidden)]
    fn binding(&self) -> Option<&Binding> {
        None
    }

    /// Value of the first header named `name`
    fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        let mut value = None;
        self.with_headers(&mut |h| value = h.get(name).cloned());
        value
    }

    /// Replace every header named `name` by `value`
    fn set_header(&self, name: HeaderName, value: HeaderValue) {
        let mut entry = Some((name, value));
        self.with_headers(&mut |h| {
            if let Some((name, value)) = entry.take() {
                h.insert(name, value);
            }
        });
    }

    /// Add a header named `name`, keeping existing ones
    fn append_header(&self, name: HeaderName, value: HeaderValue) {
        let mut entry = Some((name, value));
        self.with_headers(&mut |h| {
            if let Some((name, value)) = entry.take() {
                h.append(name, value);
            }
        });
    }

    /// Remove every header named `name`
    fn remove_header(&self, name: &HeaderName) {
        self.with_headers(&mut |h| {
            h.remove(name);
        });
    }
}

impl dyn ResponseWriter + '_ {
    /// Borrow this writer as an [`io::Write`] so `write!`, `serde_json` and
    /// template engines can target the response body
    pub fn io(&self) -> WriterIo<'_> {
        WriterIo { inner: self }
    }
}

/// [`io::Write`] adapter over a [`ResponseWriter`]
pub struct WriterIo<'w> {
    inner: &'w dyn ResponseWriter,
}

impl io::Write for WriterIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecorderState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// Buffered [`ResponseWriter`]
///
/// The service bridge hands a recorder to every handler and turns it into the
/// hyper response once the handler returns. It is also the natural writer to
/// use in tests.
///
/// ```rust
/// use contextual::writer::{Recorder, ResponseWriter};
///
/// let rec = Recorder::new();
/// rec.write(b"hello").unwrap();
/// assert_eq!(rec.status(), Some(http::StatusCode::OK));
/// assert_eq!(rec.body_string(), "hello");
/// ```
#[derive(Default)]
pub struct Recorder {
    state: Mutex<RecorderState>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the headers
    pub fn headers(&self) -> HeaderMap {
        self.state.lock().headers.clone()
    }

    /// Snapshot of the body
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().body)
    }

    /// The body decoded as utf-8, lossily
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().body).into_owned()
    }

    /// Drain the recorded response into a hyper response
    ///
    /// A recorder nobody wrote to answers `200` with an empty body.
    pub fn take_response(&self) -> RawResponse<RawBody> {
        let RecorderState { status, headers, body } = std::mem::take(&mut *self.state.lock());
        let mut res = RawResponse::new(RawBody::from(body));
        *res.status_mut() = status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = headers;
        res
    }
}

impl ResponseWriter for Recorder {
    fn with_headers(&self, f: &mut dyn FnMut(&mut HeaderMap)) {
        let mut state = self.state.lock();
        if state.status.is_some() {
            let mut discarded = state.headers.clone();
            f(&mut discarded);
        } else {
            f(&mut state.headers);
        }
    }

    fn write_header(&self, status: StatusCode) {
        let mut state = self.state.lock();
        if let Some(current) = state.status {
            warn!("superfluous write_header({}), status {} was already written", status.as_u16(), current.as_u16());
            return;
        }
        state.status = Some(status);
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.status.is_none() {
            if !state.headers.contains_key(CONTENT_TYPE) {
                state.headers.insert(CONTENT_TYPE, HeaderValue::from_static(detect_content_type(buf)));
            }
            state.status = Some(StatusCode::OK);
        }
        if !allows_body(state.status.unwrap_or(StatusCode::OK)) {
            return Err(io::Error::new(io::ErrorKind::Other, "response status does not allow a body"));
        }
        state.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn status(&self) -> Option<StatusCode> {
        self.state.lock().status
    }
}

fn allows_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

/// Guess a content type from the first bytes of a body
///
/// Only the distinctions a browser cares about for rendering are made:
/// markup, text, and anything else.
pub(crate) fn detect_content_type(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(512)];
    let trimmed = match head.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(i) => &head[i..],
        None => return "text/plain; charset=utf-8",
    };

    const HTML_SIGNATURES: [&[u8]; 6] = [b"<!doctype html", b"<html", b"<head", b"<body", b"<h1", b"<p"];
    if HTML_SIGNATURES.iter().any(|sig| trimmed.len() >= sig.len() && trimmed[..sig.len()].eq_ignore_ascii_case(sig)) {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    if trimmed.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if trimmed.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }

    match std::str::from_utf8(head) {
        Ok(_) => "text/plain; charset=utf-8",
        // a multi-byte character cut at the sniffing window is still text
        Err(e) if e.error_len().is_none() => "text/plain; charset=utf-8",
        Err(_) => "application/octet-stream",
    }
}
