use std::sync::Arc;

use futures::future::{BoxFuture, Future, FutureExt};

use crate::{request::Request, writer::Writer};

/// The native calling convention: something that answers a request through a
/// response writer
///
/// Implemented by default on any `Fn(Writer, Arc<Request>) -> impl Future<Output = ()>`.
pub trait Handler: Send + Sync + 'static {
    /// Handle the request, writing the response to `w`
    fn serve_http(&self, w: Writer, r: Arc<Request>) -> BoxFuture<'static, ()>;
}

impl<Fun, Fut> Handler for Fun
where
    Fun: Fn(Writer, Arc<Request>) -> Fut + Send + Sync + 'static,
    Fut: 'static + Future<Output = ()> + Send,
{
    #[inline]
    fn serve_http(&self, w: Writer, r: Arc<Request>) -> BoxFuture<'static, ()> {
        (*self)(w, r).boxed()
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::writer::Recorder;
    use hyper::body::Bytes;

    #[tokio::test]
    async fn closures_are_handlers() {
        async fn hello(w: Writer, r: Arc<Request>) {
            let _ = w.write(r.uri().path().as_bytes());
        }

        let rec = Arc::new(Recorder::new());
        let req = Arc::new(Request::from(http::Request::builder().uri("/fred").body(Bytes::new()).unwrap()));
        hello.serve_http(rec.clone(), req).await;
        assert_eq!(rec.body_string(), "/fred");
    }
}
