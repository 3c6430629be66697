use http::{header::SET_COOKIE, HeaderValue};

pub use cookie::{Cookie, CookieBuilder, SameSite};

use crate::writer::ResponseWriter;

/// Add a `Set-Cookie` header for `cookie`
///
/// A cookie without a name, or one that does not serialize to a valid header
/// value, is silently dropped.
pub fn set_cookie(w: &dyn ResponseWriter, cookie: &Cookie<'_>) {
    if cookie.name().is_empty() {
        debug!("dropping cookie without a name");
        return;
    }
    match HeaderValue::from_str(cookie.to_string().as_str()) {
        Ok(v) => w.append_header(SET_COOKIE, v),
        Err(e) => debug!("dropping invalid cookie `{}`: {}", cookie.name(), e),
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::writer::Recorder;

    #[test]
    fn appends_every_cookie() {
        let rec = Recorder::new();
        set_cookie(&rec, &Cookie::new("user", "fred"));
        set_cookie(&rec, &Cookie::build(("theme", "dark")).path("/").http_only(true).build());

        let values: Vec<_> = rec.headers().get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap().to_string()).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], "user=fred");
        assert!(values[1].starts_with("theme=dark; "));
        assert!(values[1].contains("HttpOnly"));
        assert!(values[1].contains("Path=/"));
    }

    #[test]
    fn drops_invalid() {
        let rec = Recorder::new();
        set_cookie(&rec, &Cookie::new("", "anonymous"));
        set_cookie(&rec, &Cookie::new("bad", "line\nbreak"));
        assert!(rec.headers().get(SET_COOKIE).is_none());
    }
}
