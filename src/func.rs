//! Context functions and the bridge to native handlers.
//!
//! A [`ContextFunc`] is the context-carrying counterpart of a [`Handler`]:
//! instead of a writer and a request it receives a [`Context`] the request is
//! bound to. Middleware written against it can derive child contexts with
//! extra values and hand them down the chain.
//!
//! ```rust
//! use contextual::{binding, func::{to_handler, ContextFunc}, Context};
//!
//! fn with_user(inner: ContextFunc) -> ContextFunc {
//!     ContextFunc::new(move |c: Context| inner.call(c.with_value("user", "fred")))
//! }
//!
//! let app = ContextFunc::new(|c: Context| async move {
//!     let (w, _) = binding::unbind(&c);
//!     let user = c.value::<&str>("user").copied().unwrap_or("nobody");
//!     let _ = w.write(format!("user is {}", user).as_bytes());
//! });
//!
//! let _handler = to_handler(with_user(app));
//! ```

use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

use futures::future::{BoxFuture, Future, FutureExt};

use crate::{
    binding::{bind, unbind},
    context::Context,
    handler::Handler,
    request::Request,
    writer::{ResponseWriter, Writer},
};

/// Builds the context a request is bound onto
pub type BaseContextFn = fn(&dyn ResponseWriter, &Request) -> Context;

/// A cloneable, type erased `Fn(Context) -> impl Future<Output = ()>`
#[derive(Clone)]
pub struct ContextFunc {
    inner: Arc<dyn Fn(Context) -> BoxFuture<'static, ()> + Send + Sync>,
}

impl ContextFunc {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: 'static + Future<Output = ()> + Send,
    {
        ContextFunc {
            inner: Arc::new(move |c| f(c).boxed()),
        }
    }

    /// Run the function against `c`
    #[inline]
    pub fn call(&self, c: Context) -> BoxFuture<'static, ()> {
        (self.inner)(c)
    }
}

impl Debug for ContextFunc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextFunc").finish_non_exhaustive()
    }
}

fn background(_w: &dyn ResponseWriter, _r: &Request) -> Context {
    Context::background()
}

/// Native [`Handler`] running a [`ContextFunc`], see [`to_handler`]
#[derive(Clone)]
pub struct ContextHandler {
    func: ContextFunc,
    base: BaseContextFn,
}

impl ContextHandler {
    /// Bind requests onto the context built by `base` rather than onto
    /// [`Context::background`]
    ///
    /// This is where a platform that derives its own per request context
    /// (credentials, tracing, deadlines) plugs in.
    pub fn with_base_context(mut self, base: BaseContextFn) -> Self {
        self.base = base;
        self
    }
}

impl Handler for ContextHandler {
    fn serve_http(&self, w: Writer, r: Arc<Request>) -> BoxFuture<'static, ()> {
        let base = (self.base)(&*w, &r);
        self.func.call(bind(&base, w, r))
    }
}

impl Debug for ContextHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandler").field("func", &self.func).finish()
    }
}

/// Turn a context function into a native handler
///
/// Every request is bound onto a base context, [`Context::background`] unless
/// changed with [`ContextHandler::with_base_context`], and `f` runs with the
/// result.
pub fn to_handler(f: ContextFunc) -> ContextHandler {
    ContextHandler { func: f, base: background }
}

/// Turn a native handler into a context function
///
/// The writer and request bound to the context are recovered and passed to
/// `h`. Running the result on a context without a bound request panics.
pub fn from_handler<H: Handler>(h: H) -> ContextFunc {
    let h = Arc::new(h);
    ContextFunc::new(move |c: Context| {
        let (w, r) = unbind(&c);
        h.serve_http(w, r)
    })
}
