//! Associating a request with a [`Context`] and recovering it later.
//!
//! [`bind`] stores the writer and request of the current exchange in a slot
//! keyed by a private type, so nothing outside this crate can read or forge
//! it, along with an empty template variable map. [`unbind`] hands the pair
//! back, wrapping the writer in a proxy that remembers the context it came
//! from. Binding that proxy again returns the remembered context instead of
//! stacking a second binding, which is what makes
//! `from_handler(to_handler(f))` behave like `f`.

use std::{io, sync::Arc};

use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::{
    context::Context,
    request::Request,
    writer::{ResponseWriter, Writer},
};

/// The pair bound to a context
struct RequestTag {
    writer: Writer,
    request: Arc<Request>,
}

/// Per request template variables, mutated in place
#[derive(Default)]
pub(crate) struct TemplateVars(Mutex<Map<String, Value>>);

impl TemplateVars {
    pub(crate) fn insert(&self, key: String, value: Value) {
        self.0.lock().insert(key, value);
    }

    pub(crate) fn snapshot(&self) -> Map<String, Value> {
        self.0.lock().clone()
    }
}

/// Where a [`BoundWriter`] was extracted from
#[doc(hidden)]
pub struct Binding {
    context: Context,
    request: Arc<Request>,
}

/// Writer handed out by [`unbind`]
///
/// Forwards everything to the writer that was bound and carries the context
/// it was extracted from.
pub struct BoundWriter {
    inner: Writer,
    binding: Binding,
}

impl BoundWriter {
    /// The writer that was originally bound
    pub fn inner(&self) -> &Writer {
        &self.inner
    }

    /// The context this writer was extracted from
    pub fn context(&self) -> &Context {
        &self.binding.context
    }
}

impl ResponseWriter for BoundWriter {
    fn with_headers(&self, f: &mut dyn FnMut(&mut HeaderMap)) {
        self.inner.with_headers(f)
    }

    fn write_header(&self, status: StatusCode) {
        self.inner.write_header(status)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn status(&self) -> Option<StatusCode> {
        self.inner.status()
    }

    fn binding(&self) -> Option<&Binding> {
        Some(&self.binding)
    }
}

/// Derive a context carrying `writer`, `request` and a fresh template
/// variable map
///
/// If `writer` came from [`unbind`], the context it was extracted from is
/// returned unchanged.
///
/// # Panics
///
/// If `writer` came from [`unbind`] on a context bound to another request.
pub fn bind(context: &Context, writer: Writer, request: Arc<Request>) -> Context {
    if let Some(binding) = writer.binding() {
        if !Arc::ptr_eq(&binding.request, &request) {
            panic!("contextual: cannot bind a writer returned by `unbind` to another request");
        }
        return binding.context.clone();
    }

    context.with(RequestTag { writer, request }).with(TemplateVars::default())
}

/// Recover the writer and request bound to `context`
///
/// # Panics
///
/// If no request was bound to `context`. Use [`try_unbind`] to probe.
pub fn unbind(context: &Context) -> (Writer, Arc<Request>) {
    match try_unbind(context) {
        Some(pair) => pair,
        None => panic!("contextual: context does not contain a request or a response"),
    }
}

/// Recover the writer and request bound to `context`, if any
pub fn try_unbind(context: &Context) -> Option<(Writer, Arc<Request>)> {
    let tag = context.get::<RequestTag>()?;
    let writer: Writer = Arc::new(BoundWriter {
        inner: tag.writer.clone(),
        binding: Binding {
            context: context.clone(),
            request: tag.request.clone(),
        },
    });
    Some((writer, tag.request.clone()))
}

/// Whether a request was bound to `context`
pub fn is_bound(context: &Context) -> bool {
    context.get::<RequestTag>().is_some()
}

pub(crate) fn template_vars(context: &Context) -> &TemplateVars {
    match context.get::<TemplateVars>() {
        Some(vars) => vars,
        None => panic!("contextual: template variables are not bound to this context"),
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::writer::Recorder;
    use hyper::body::Bytes;

    fn pair() -> (Arc<Recorder>, Arc<Request>) {
        let raw = http::Request::builder().uri("/hello").body(Bytes::new()).unwrap();
        (Arc::new(Recorder::new()), Arc::new(Request::from(raw)))
    }

    #[test]
    fn unbind_returns_the_bound_pair() {
        let (rec, req) = pair();
        let c = bind(&Context::background(), rec.clone(), req.clone());

        let (w, r) = unbind(&c);
        assert!(Arc::ptr_eq(&r, &req));

        w.write(b"through the proxy").unwrap();
        assert_eq!(rec.body_string(), "through the proxy");
    }

    #[test]
    fn rebinding_a_proxy_returns_its_context() {
        let (rec, req) = pair();
        let c = bind(&Context::background(), rec, req).with_value("user", "fred");

        let (w, r) = unbind(&c);
        let again = bind(&Context::background(), w, r);
        assert_eq!(again, c);
        assert_eq!(again.value::<&str>("user"), Some(&"fred"));
    }

    #[test]
    #[should_panic(expected = "another request")]
    fn rebinding_a_proxy_to_another_request_panics() {
        let (rec, req) = pair();
        let c = bind(&Context::background(), rec, req);
        let (w, _) = unbind(&c);
        let (_, other) = pair();
        bind(&c, w, other);
    }

    #[test]
    #[should_panic(expected = "does not contain a request")]
    fn unbind_on_fresh_context_panics() {
        unbind(&Context::background());
    }

    #[test]
    #[should_panic(expected = "template variables are not bound")]
    fn template_vars_on_fresh_context_panics() {
        template_vars(&Context::background());
    }

    #[test]
    fn probing() {
        let (rec, req) = pair();
        let base = Context::background().with_value("k", 1);
        let c = bind(&base, rec, req);

        assert!(!is_bound(&base));
        assert!(try_unbind(&base).is_none());
        assert!(is_bound(&c));
        assert_eq!(c.value::<i32>("k"), Some(&1));
    }

    #[test]
    fn each_binding_gets_fresh_vars() {
        let (rec, req) = pair();
        let first = bind(&Context::background(), rec.clone(), req.clone());
        template_vars(&first).insert("name".into(), Value::from("Bob Jones"));

        let second = bind(&first, rec, req);
        assert!(template_vars(&second).snapshot().is_empty());
        assert_eq!(template_vars(&first).snapshot().len(), 1);
    }
}
