//! ### Contextual is a context-carrying handler layer over hyper
//! Handlers and middleware receive a single immutable [`Context`] carrying
//! the response writer, the request and any request-scoped value bound along
//! the way, and can move back and forth between that convention and plain
//! `(writer, request)` handlers.
//!
//! Just `use` the prelude module, and you're ready to go!
//!
//! ## Quick setup
//! ```rust,no_run
//! use contextual::prelude::*;
//! use std::convert::Infallible;
//!
//! fn with_user(next: ContextFunc) -> ContextFunc {
//!     ContextFunc::new(move |c: Context| next.call(c.with_value("user", "fred")))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     env_logger::init();
//!
//!     let app = ContextFunc::new(|c: Context| async move {
//!         let user = c.value::<&str>("user").copied().unwrap_or("nobody");
//!         let (w, _) = unbind(&c);
//!         let _ = w.write(format!("user is {}", user).as_bytes());
//!     });
//!
//!     let service = HandlerService::builder().build(to_handler(with_user(app)))?;
//!     let make = hyper::service::make_service_fn(move |_| {
//!         let service = service.clone();
//!         async move { Ok::<_, Infallible>(service) }
//!     });
//!     hyper::Server::bind(&([127, 0, 0, 1], 3000).into()).serve(make).await?;
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate log;

/// Binding a request to a context and getting it back
pub mod binding;
/// Lazily read request bodies
pub mod body;
/// Immutable request-scoped values
pub mod context;
/// Cookie helpers
pub mod cookie;
/// Error definitions
pub mod error;
/// Serving files and seekable content
#[cfg(feature = "file")]
#[cfg_attr(docsrs, doc(cfg(feature = "file")))]
pub mod file;
/// Context functions and the bridge to native handlers
pub mod func;
/// Definition of types which can handle an http request
pub mod handler;
/// Native helpers taking a context
pub mod helpers;
/// Multipart form parsing
#[cfg(feature = "multipart")]
#[cfg_attr(docsrs, doc(cfg(feature = "multipart")))]
pub mod multipart;
/// Redirections
pub mod redirect;
/// The Http Request type
pub mod request;
/// Plain text error replies
pub mod response;
/// Running a handler as a hyper service
pub mod service;
/// Per request template variables and rendering
pub mod template;
/// The response writer and its buffered implementation
pub mod writer;

pub use crate::context::Context;
pub use crate::error::ContextualError as Error;
///
pub use http;
///
pub use hyper;

/// Contains everything you need to write handlers and middleware
///
/// ```rust
/// use contextual::prelude::*;
///
/// // implement magic
/// ```
pub mod prelude {
    ///
    pub use crate::binding::bind;
    ///
    pub use crate::binding::unbind;
    ///
    pub use crate::context::Context;
    ///
    pub use crate::cookie::Cookie;
    ///
    pub use crate::cookie::CookieBuilder;
    ///
    pub use crate::error::ContextualError;
    ///
    pub use crate::func::from_handler;
    ///
    pub use crate::func::to_handler;
    ///
    pub use crate::func::ContextFunc;
    ///
    pub use crate::handler::Handler;
    ///
    pub use crate::helpers;
    ///
    pub use crate::request::Request;
    ///
    pub use crate::service::HandlerService;
    ///
    pub use crate::template;
    ///
    pub use crate::template::Templates;
    ///
    pub use crate::writer::ResponseWriter;
    ///
    pub use crate::writer::Writer;
    ///
    pub use http::header;
    ///
    pub use http::Method;
    ///
    pub use http::StatusCode;
}
