//! Native HTTP helpers taking a [`Context`] instead of a writer and request.
//!
//! Each function recovers the bound pair with [`unbind`] and hands it to the
//! native primitive of the same name, returning whatever it returns. Calling
//! any of them on a context no request was bound to panics.

#[cfg(feature = "file")]
use std::{path::Path, time::SystemTime};

use cookie::Cookie;
use http::StatusCode;
#[cfg(feature = "file")]
use tokio::io::{AsyncRead, AsyncSeek};

use crate::{binding::unbind, context::Context, error::ContextualError, response};
#[cfg(feature = "multipart")]
use crate::multipart::MultipartForm;
#[cfg(feature = "multipart")]
use std::sync::Arc;

/// Reply with a plain text `message` and `status`
pub fn error(c: &Context, message: &str, status: StatusCode) {
    let (w, _) = unbind(c);
    response::error(&*w, message, status)
}

/// Reply with `404 page not found`
pub fn not_found(c: &Context) {
    let (w, _) = unbind(c);
    response::not_found(&*w)
}

/// Redirect to `url`, resolved against the request path when relative
pub fn redirect(c: &Context, url: &str, status: StatusCode) {
    let (w, r) = unbind(c);
    crate::redirect::redirect(&*w, &r, url, status)
}

/// Add a `Set-Cookie` header to the response
pub fn set_cookie(c: &Context, cookie: &Cookie<'_>) {
    let (w, _) = unbind(c);
    crate::cookie::set_cookie(&*w, cookie)
}

/// Reply with the file or directory at `path`
#[cfg(feature = "file")]
#[cfg_attr(docsrs, doc(cfg(feature = "file")))]
pub async fn serve_file(c: &Context, path: impl AsRef<Path>) {
    let (w, r) = unbind(c);
    crate::file::serve_file(&*w, &r, path).await
}

/// Reply with `content`, honouring conditional and range requests
#[cfg(feature = "file")]
#[cfg_attr(docsrs, doc(cfg(feature = "file")))]
pub async fn serve_content<C>(c: &Context, name: &str, modtime: Option<SystemTime>, content: C)
where
    C: AsyncRead + AsyncSeek + Unpin + Send,
{
    let (w, r) = unbind(c);
    crate::file::serve_content(&*w, &r, name, modtime, content).await
}

pub fn cookies(c: &Context) -> Vec<Cookie<'static>> {
    let (_, r) = unbind(c);
    r.cookies()
}

pub fn cookie(c: &Context, name: &str) -> Result<Cookie<'static>, ContextualError> {
    let (_, r) = unbind(c);
    r.cookie(name)
}

pub async fn post_form_value(c: &Context, key: &str) -> Option<String> {
    let (_, r) = unbind(c);
    r.post_form_value(key).await
}

pub async fn form_value(c: &Context, key: &str) -> Option<String> {
    let (_, r) = unbind(c);
    r.form_value(key).await
}

#[cfg(feature = "multipart")]
#[cfg_attr(docsrs, doc(cfg(feature = "multipart")))]
pub async fn parse_multipart_form(c: &Context, max_memory: u64) -> Result<Arc<MultipartForm>, ContextualError> {
    let (_, r) = unbind(c);
    r.parse_multipart_form(max_memory).await
}

pub fn referer(c: &Context) -> Option<String> {
    let (_, r) = unbind(c);
    r.referer().map(str::to_string)
}

pub fn user_agent(c: &Context) -> Option<String> {
    let (_, r) = unbind(c);
    r.user_agent().map(str::to_string)
}

pub fn basic_auth(c: &Context) -> Option<(String, String)> {
    let (_, r) = unbind(c);
    r.basic_auth()
}
