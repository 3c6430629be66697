use std::io::Write;

use http::{
    header::{CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    HeaderValue, StatusCode,
};

use crate::writer::ResponseWriter;

pub(crate) const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub(crate) const TEXT_HTML_UTF8: &str = "text/html; charset=utf-8";

/// Reply with `message` as a plain text error
///
/// The body is the message followed by a newline. Headers meant for the
/// successful response, like a `Content-Length`, are dropped.
pub fn error(w: &dyn ResponseWriter, message: &str, status: StatusCode) {
    w.remove_header(&CONTENT_LENGTH);
    w.set_header(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF8));
    w.set_header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    w.write_header(status);
    if let Err(e) = writeln!(w.io(), "{}", message) {
        warn!("unable to write error response: {}", e);
    }
}

/// Reply with `404 page not found`
pub fn not_found(w: &dyn ResponseWriter) {
    error(w, "404 page not found", StatusCode::NOT_FOUND)
}

/// Escape the characters that are significant in HTML text and attributes
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::writer::Recorder;

    #[test]
    fn error_is_plain_text() {
        let rec = Recorder::new();
        rec.set_header(CONTENT_LENGTH, HeaderValue::from_static("42"));
        error(&rec, "nope", StatusCode::FORBIDDEN);

        let headers = rec.headers();
        assert_eq!(rec.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(headers[CONTENT_TYPE], TEXT_PLAIN_UTF8);
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(rec.body_string(), "nope\n");
    }

    #[test]
    fn not_found_body() {
        let rec = Recorder::new();
        not_found(&rec);
        assert_eq!(rec.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(rec.body_string(), "404 page not found\n");
    }

    #[test]
    fn escapes() {
        assert_eq!(escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#), "&lt;a href=&#34;x&#34;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;");
    }
}
