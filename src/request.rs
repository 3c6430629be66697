use std::{net::SocketAddr, ops::Deref, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine};
use cookie::Cookie;
use http::{
    header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, REFERER, USER_AGENT},
    Method, Request as RawRequest,
};
use hyper::body::Bytes;
use mime::Mime;

use crate::{body::Body, error::ContextualError};
#[cfg(feature = "multipart")]
use crate::multipart::{self, MultipartForm};
#[cfg(feature = "multipart")]
use std::sync::Arc;
#[cfg(feature = "multipart")]
use tokio::sync::OnceCell;

/// Ordered list of decoded form values
///
/// A key can appear more than once; [`get`](#method.get) returns the first
/// value, as browsers send repeated fields in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormValues(Vec<(String, String)>);

impl FormValues {
    /// Decode `application/x-www-form-urlencoded` data
    pub fn parse(data: &[u8]) -> Result<Self, ContextualError> {
        Ok(FormValues(serde_urlencoded::from_bytes(data)?))
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in order
    pub fn get_all<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a str> + use<'a, 'k> {
        self.0.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for FormValues {
    fn from(values: Vec<(String, String)>) -> Self {
        FormValues(values)
    }
}

impl Extend<(String, String)> for FormValues {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

/// An incoming request
///
/// The body is read lazily through [`Body`]: urlencoded forms buffer it,
/// multipart forms stream it. Dereferences to the underlying
/// [`http::Request`].
pub struct Request {
    #[doc(hidden)]
    inner: RawRequest<Body>,
    #[doc(hidden)]
    peer_addr: Option<SocketAddr>,
    #[cfg(feature = "multipart")]
    #[doc(hidden)]
    multipart: OnceCell<Arc<MultipartForm>>,
}

impl Request {
    pub fn new(raw: RawRequest<Body>, peer_addr: Option<SocketAddr>) -> Self {
        Request {
            inner: raw,
            peer_addr,
            #[cfg(feature = "multipart")]
            multipart: OnceCell::new(),
        }
    }

    /// Return the Peer SocketAddr if one was available when receiving the request
    #[inline]
    pub fn peer_addr(&self) -> Option<&SocketAddr> {
        self.peer_addr.as_ref()
    }

    /// Cookies sent with the request, in header order
    ///
    /// Malformed pairs are skipped.
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        self.inner
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|h| h.split(';'))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match Cookie::parse(s.to_string()) {
                Ok(c) => Some(c),
                Err(e) => {
                    debug!("skipping malformed cookie `{}`: {}", s, e);
                    None
                }
            })
            .collect()
    }

    /// The first cookie named `name`
    pub fn cookie(&self, name: &str) -> Result<Cookie<'static>, ContextualError> {
        self.cookies().into_iter().find(|c| c.name() == name).ok_or(ContextualError::NoCookie)
    }

    /// Values decoded from the query string
    pub fn query_values(&self) -> Result<FormValues, ContextualError> {
        FormValues::parse(self.inner.uri().query().unwrap_or_default().as_bytes())
    }

    /// Parsed `Content-Type` header, if present and valid
    pub fn content_type(&self) -> Option<Mime> {
        self.inner
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|c_t| c_t.to_str().ok())
            .and_then(|c_t_str| Mime::from_str(c_t_str).ok())
    }

    fn has_form_body(&self) -> bool {
        matches!(*self.inner.method(), Method::POST | Method::PUT | Method::PATCH)
    }

    #[cfg(feature = "multipart")]
    fn is_multipart(&self) -> bool {
        self.content_type()
            .map(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
            .unwrap_or(false)
    }

    /// Values decoded from an urlencoded POST, PUT or PATCH body
    ///
    /// Other methods and other content types yield no values.
    pub async fn post_form(&self) -> Result<FormValues, ContextualError> {
        if !self.has_form_body() {
            return Ok(FormValues::default());
        }
        match self.content_type() {
            Some(m) if m.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() => {
                FormValues::parse(&self.inner.body().bytes().await?)
            }
            _ => Ok(FormValues::default()),
        }
    }

    /// Every body value, urlencoded or multipart, parsing the multipart form
    /// with the default memory budget if needed
    async fn body_values(&self) -> Result<FormValues, ContextualError> {
        #[cfg(feature = "multipart")]
        {
            if self.has_form_body() && self.is_multipart() {
                return self.parse_multipart_form(multipart::DEFAULT_MAX_MEMORY).await.map(|f| f.values().clone());
            }
        }
        self.post_form().await
    }

    /// First body value for `key`, ignoring parse errors
    pub async fn post_form_value(&self, key: &str) -> Option<String> {
        match self.body_values().await {
            Ok(values) => values.get(key).map(str::to_string),
            Err(e) => {
                debug!("ignoring form error while looking up `{}`: {}", key, e);
                None
            }
        }
    }

    /// First value for `key`, body values taking precedence over the query
    /// string, ignoring parse errors
    pub async fn form_value(&self, key: &str) -> Option<String> {
        if let Some(v) = self.post_form_value(key).await {
            return Some(v);
        }
        match self.query_values() {
            Ok(values) => values.get(key).map(str::to_string),
            Err(e) => {
                debug!("ignoring query error while looking up `{}`: {}", key, e);
                None
            }
        }
    }

    /// Parse a `multipart/form-data` body
    ///
    /// The body is streamed to the parser, bypassing the service body limit.
    /// File parts are kept in memory up to `max_memory` bytes in total, the
    /// rest go to temporary files. The form is parsed once; later calls return
    /// the same form whatever `max_memory` they pass.
    #[cfg(feature = "multipart")]
    #[cfg_attr(docsrs, doc(cfg(feature = "multipart")))]
    pub async fn parse_multipart_form(&self, max_memory: u64) -> Result<Arc<MultipartForm>, ContextualError> {
        if !self.is_multipart() {
            return Err(ContextualError::NotMultipart);
        }
        self.multipart
            .get_or_try_init(|| async {
                let content_type = self.inner.headers().get(CONTENT_TYPE).map(|h| h.to_str()).transpose()?.unwrap_or_default();
                let boundary = multer::parse_boundary(content_type)?;
                let body = self.inner.body().stream().await?;
                multipart::read_form(body, &boundary, max_memory).await.map(Arc::new)
            })
            .await
            .cloned()
    }

    /// The `Referer` header
    pub fn referer(&self) -> Option<&str> {
        self.inner.headers().get(REFERER).and_then(|h| h.to_str().ok())
    }

    /// The `User-Agent` header
    pub fn user_agent(&self) -> Option<&str> {
        self.inner.headers().get(USER_AGENT).and_then(|h| h.to_str().ok())
    }

    /// Username and password from an `Authorization: Basic` header
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let header = self.inner.headers().get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, encoded) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }
}

impl Deref for Request {
    type Target = RawRequest<Body>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<RawRequest<Body>> for Request {
    fn from(raw: RawRequest<Body>) -> Self {
        Request::new(raw, None)
    }
}

impl From<RawRequest<Bytes>> for Request {
    fn from(raw: RawRequest<Bytes>) -> Self {
        Request::new(raw.map(Body::from), None)
    }
}
