//! Per request template variables and rendering.
//!
//! Every [`bind`](crate::binding::bind) starts an empty variable map that
//! middleware and handlers fill with [`set`]. The map is rendered either
//! through a [`Templates`] engine as HTML, or as JSON with [`render_json`].
//!
//! ```rust
//! use contextual::template::{self, template_fn};
//! # use contextual::{binding::bind, writer::Recorder, request::Request, Context};
//! # use std::sync::Arc;
//! # let rec = Arc::new(Recorder::new());
//! # let req = http::Request::builder().body(hyper::body::Bytes::new()).unwrap();
//! # let c = bind(&Context::background(), rec.clone(), Arc::new(Request::from(req)));
//!
//! let templates = template_fn(|_name, vars, out| {
//!     let name = vars.get("name").and_then(|v| v.as_str()).unwrap_or_default();
//!     write!(out, "<h1>{}</h1>", template::escape(name))?;
//!     Ok(())
//! });
//!
//! template::set(&c, "name", "Bob <Jones>");
//! template::render(&c, &templates, "index.html").unwrap();
//! # assert_eq!(rec.body_string(), "<h1>Bob &lt;Jones&gt;</h1>");
//! ```

use std::io;

use http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    binding::{template_vars, unbind},
    context::Context,
    error::{BoxError, ContextualError},
    response::{self, TEXT_HTML_UTF8},
};

/// Content type of [`render_json`] responses
pub const JSON_API: &str = "application/vnd.api+json";

/// A template engine
///
/// Implemented for any `Fn(&str, &Map<String, Value>, &mut dyn io::Write) -> Result<(), BoxError>`,
/// see [`template_fn`] to help closures get that signature.
pub trait Templates: Send + Sync {
    /// Evaluate the template `name` against `vars`, writing the output to `out`
    fn execute(&self, name: &str, vars: &Map<String, Value>, out: &mut dyn io::Write) -> Result<(), BoxError>;
}

impl<F> Templates for F
where
    F: Fn(&str, &Map<String, Value>, &mut dyn io::Write) -> Result<(), BoxError> + Send + Sync,
{
    fn execute(&self, name: &str, vars: &Map<String, Value>, out: &mut dyn io::Write) -> Result<(), BoxError> {
        (*self)(name, vars, out)
    }
}

/// Use a closure as [`Templates`]
pub fn template_fn<F>(f: F) -> F
where
    F: Fn(&str, &Map<String, Value>, &mut dyn io::Write) -> Result<(), BoxError> + Send + Sync,
{
    f
}

/// Escape `s` for HTML text and attribute values
///
/// Closure engines must escape variables they write into markup themselves;
/// [`Jinja`] does it for `.html` templates.
pub fn escape(s: &str) -> String {
    response::escape_html(s)
}

/// [`Templates`] backed by a [`minijinja::Environment`]
///
/// Templates are looked up by name when rendered. Output of templates named
/// `*.html`, `*.htm` or `*.xml` is HTML-escaped.
#[cfg(feature = "minijinja")]
#[cfg_attr(docsrs, doc(cfg(feature = "minijinja")))]
pub struct Jinja {
    env: minijinja::Environment<'static>,
}

#[cfg(feature = "minijinja")]
impl Jinja {
    pub fn new() -> Self {
        Jinja {
            env: minijinja::Environment::new(),
        }
    }

    /// Register `source` as the template `name`, failing on syntax errors
    pub fn add(&mut self, name: &'static str, source: &'static str) -> Result<(), ContextualError> {
        self.env.add_template(name, source).map_err(|e| ContextualError::Template(e.into()))
    }

    /// The environment, to register filters, globals or a loader
    pub fn environment_mut(&mut self) -> &mut minijinja::Environment<'static> {
        &mut self.env
    }
}

#[cfg(feature = "minijinja")]
impl Default for Jinja {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "minijinja")]
impl From<minijinja::Environment<'static>> for Jinja {
    fn from(env: minijinja::Environment<'static>) -> Self {
        Jinja { env }
    }
}

#[cfg(feature = "minijinja")]
impl Templates for Jinja {
    fn execute(&self, name: &str, vars: &Map<String, Value>, out: &mut dyn io::Write) -> Result<(), BoxError> {
        self.env.get_template(name)?.render_to_write(vars, out)?;
        Ok(())
    }
}

/// Set the template variable `key` for the rest of the request
///
/// # Panics
///
/// If no request was bound to `c`.
pub fn set(c: &Context, key: impl Into<String>, value: impl Into<Value>) {
    template_vars(c).insert(key.into(), value.into())
}

/// Set the template variable `key` to the JSON form of `value`
pub fn set_serialized<T: Serialize + ?Sized>(c: &Context, key: impl Into<String>, value: &T) -> Result<(), ContextualError> {
    let value = serde_json::to_value(value)?;
    template_vars(c).insert(key.into(), value);
    Ok(())
}

/// Snapshot of the template variables
pub fn vars(c: &Context) -> Map<String, Value> {
    template_vars(c).snapshot()
}

/// Render the template `name` as an HTML response
///
/// The template is evaluated into a buffer first. If it fails, nothing of it
/// is sent: the response becomes a `500` and the engine error is returned.
pub fn render<T: Templates + ?Sized>(c: &Context, templates: &T, name: &str) -> Result<(), ContextualError> {
    let (w, _) = unbind(c);
    let vars = template_vars(c).snapshot();

    w.set_header(CONTENT_TYPE, HeaderValue::from_static(TEXT_HTML_UTF8));
    let mut out = Vec::new();
    if let Err(e) = templates.execute(name, &vars, &mut out) {
        warn!("unable to render template `{}`: {}", name, e);
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        response::error(&*w, status.canonical_reason().unwrap_or_default(), status);
        return Err(ContextualError::Template(e));
    }

    w.write(&out)?;
    Ok(())
}

/// Render the template variables as a JSON object
pub fn render_json(c: &Context) -> Result<(), ContextualError> {
    let (w, _) = unbind(c);
    let body = serde_json::to_vec(&template_vars(c).snapshot())?;

    w.set_header(CONTENT_TYPE, HeaderValue::from_static(JSON_API));
    w.write(&body)?;
    Ok(())
}
