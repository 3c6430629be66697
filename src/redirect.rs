use std::io::Write;

use http::{
    header::{CONTENT_TYPE, LOCATION},
    HeaderValue, Method, StatusCode,
};
use percent_encoding::{utf8_percent_encode, CONTROLS};

use crate::{
    request::Request,
    response::{escape_html, TEXT_HTML_UTF8},
    writer::ResponseWriter,
};

/// Reply with a redirection to `url`
///
/// A `url` without scheme or host is taken relative to the request path and
/// cleaned of `.` and `..` segments; a trailing slash is kept. Unless a
/// content type was already set, `GET` and `HEAD` get an HTML content type
/// and `GET` a short HTML body linking to the target.
pub fn redirect(w: &dyn ResponseWriter, r: &Request, url: &str, status: StatusCode) {
    let location = if is_absolute(url) { url.to_string() } else { resolve(r.uri().path(), url) };

    let had_content_type = w.header(&CONTENT_TYPE).is_some();
    match HeaderValue::from_str(&utf8_percent_encode(&location, CONTROLS).to_string()) {
        Ok(v) => w.set_header(LOCATION, v),
        Err(e) => warn!("unable to set redirect location `{}`: {}", location, e),
    }
    if !had_content_type && (r.method() == Method::GET || r.method() == Method::HEAD) {
        w.set_header(CONTENT_TYPE, HeaderValue::from_static(TEXT_HTML_UTF8));
    }
    w.write_header(status);

    if !had_content_type && r.method() == Method::GET {
        let reason = status.canonical_reason().unwrap_or_default();
        if let Err(e) = writeln!(w.io(), "<a href=\"{}\">{}</a>.", escape_html(&location), reason) {
            warn!("unable to write redirect body: {}", e);
        }
    }
}

/// Permanent redirect to `new_path`, keeping the query string
pub(crate) fn local_redirect(w: &dyn ResponseWriter, r: &Request, new_path: &str) {
    let location = match r.uri().query() {
        Some(q) if !q.is_empty() => format!("{}?{}", new_path, q),
        _ => new_path.to_string(),
    };
    match HeaderValue::from_str(&location) {
        Ok(v) => w.set_header(LOCATION, v),
        Err(e) => warn!("unable to set redirect location `{}`: {}", location, e),
    }
    w.write_header(StatusCode::MOVED_PERMANENTLY);
}

/// Whether `url` carries a scheme or an authority
fn is_absolute(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    let scheme_end = match url.find(|c: char| c == ':' || c == '/' || c == '?' || c == '#') {
        Some(i) if url[i..].starts_with(':') => i,
        _ => return false,
    };
    let scheme = &url[..scheme_end];
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

fn resolve(current: &str, url: &str) -> String {
    let current = if current.is_empty() { "/" } else { current };
    let mut target = if url.starts_with('/') {
        url.to_string()
    } else {
        let dir = &current[..current.rfind('/').map(|i| i + 1).unwrap_or(0)];
        format!("{}{}", dir, url)
    };

    let query = match target.find('?') {
        Some(i) => target.split_off(i),
        None => String::new(),
    };
    let trailing = target.ends_with('/');
    let mut cleaned = clean_path(&target);
    if trailing && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned + &query
}

/// Lexically simplify a slash separated path
///
/// Repeated slashes collapse, `.` segments disappear and `..` removes the
/// segment before it. `..` cannot climb above the root of a rooted path. An
/// empty result becomes `.`.
pub(crate) fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().map_or(false, |last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::writer::Recorder;
    use hyper::body::Bytes;

    fn req(method: &str, uri: &str) -> Request {
        Request::from(http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap())
    }

    #[test]
    fn cleaning() {
        let cases = [
            ("", "."),
            ("/", "/"),
            ("a/b/../c", "a/c"),
            ("/a//b/./c/", "/a/b/c"),
            ("/../a", "/a"),
            ("../../a", "../../a"),
            ("a/../..", ".."),
            ("/a/b/../../..", "/"),
        ];
        for (input, expected) in cases {
            assert_eq!(clean_path(input), expected, "cleaning {:?}", input);
        }
    }

    #[test]
    fn absolute_detection() {
        assert!(is_absolute("https://example.com/x"));
        assert!(is_absolute("//cdn.example.com/x"));
        assert!(is_absolute("mailto:fred@example.com"));
        assert!(!is_absolute("/login"));
        assert!(!is_absolute("edit?next=a:b"));
        assert!(!is_absolute("1abc:def"));
    }

    #[test]
    fn relative_target_is_resolved() {
        let rec = Recorder::new();
        redirect(&rec, &req("GET", "/users/fred/profile?tab=1"), "../bob/?x=1", StatusCode::FOUND);

        assert_eq!(rec.status(), Some(StatusCode::FOUND));
        assert_eq!(rec.headers()[LOCATION], "/users/bob/?x=1");
        assert_eq!(rec.headers()[CONTENT_TYPE], TEXT_HTML_UTF8);
        assert_eq!(rec.body_string(), "<a href=\"/users/bob/?x=1\">Found</a>.\n");
    }

    #[test]
    fn absolute_target_is_kept() {
        let rec = Recorder::new();
        redirect(&rec, &req("POST", "/login"), "https://example.com/home", StatusCode::SEE_OTHER);

        assert_eq!(rec.headers()[LOCATION], "https://example.com/home");
        assert!(rec.headers().get(CONTENT_TYPE).is_none());
        assert!(rec.body().is_empty());
    }

    #[test]
    fn head_has_no_body() {
        let rec = Recorder::new();
        redirect(&rec, &req("HEAD", "/a/b"), "c", StatusCode::MOVED_PERMANENTLY);
        assert_eq!(rec.headers()[LOCATION], "/a/c");
        assert_eq!(rec.headers()[CONTENT_TYPE], TEXT_HTML_UTF8);
        assert!(rec.body().is_empty());
    }

    #[test]
    fn non_ascii_is_escaped() {
        let rec = Recorder::new();
        redirect(&rec, &req("GET", "/"), "/café", StatusCode::FOUND);
        assert_eq!(rec.headers()[LOCATION], "/caf%C3%A9");
    }

    #[test]
    fn local_redirect_keeps_query() {
        let rec = Recorder::new();
        local_redirect(&rec, &req("GET", "/dir?sort=name"), "dir/");
        assert_eq!(rec.status(), Some(StatusCode::MOVED_PERMANENTLY));
        assert_eq!(rec.headers()[LOCATION], "dir/?sort=name");
    }
}
