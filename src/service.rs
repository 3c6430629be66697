//! Running a [`Handler`] as a hyper [`Service`].
//!
//! [`HandlerService`] wraps the request body in a lazy [`Body`], hands the
//! handler a [`Recorder`] and turns what was recorded into the hyper response.
//! A body announcing more than the body limit is answered with `413` before
//! the handler runs, unless it is a multipart form, which is streamed. A panic
//! raised while handling a request, such as unbinding a context nothing was
//! bound to, only fails that request: it is logged and answered with a `500`.
//!
//! ```rust,no_run
//! use std::{convert::Infallible, sync::Arc};
//! use contextual::{service::HandlerService, request::Request, writer::Writer};
//! use hyper::{server::conn::AddrStream, service::make_service_fn, Server};
//!
//! async fn hello(w: Writer, _r: Arc<Request>) {
//!     let _ = w.write(b"hello");
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = HandlerService::builder().server_name("hello").build(hello)?;
//! let make = make_service_fn(move |conn: &AddrStream| {
//!     let service = service.with_peer_addr(conn.remote_addr());
//!     async move { Ok::<_, Infallible>(service) }
//! });
//! Server::bind(&([127, 0, 0, 1], 3000).into()).serve(make).await?;
//! # Ok(())
//! # }
//! ```

use std::{
    any::Any,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::Arc,
    task::{Context, Poll},
};

use futures::future::{BoxFuture, FutureExt};
use http::{
    header::{CONTENT_TYPE, SERVER},
    request::Parts,
    HeaderValue, Request as RawRequest, Response as RawResponse, StatusCode,
};
use hyper::{body::HttpBody, service::Service, Body as RawBody};
use mime::Mime;

use crate::{
    body::Body,
    error::{BoxError, ContextualError},
    handler::Handler,
    request::Request,
    response,
    writer::{Recorder, Writer},
};

/// Default `Server` header value
pub const DEFAULT_SERVER_NAME: &str = "contextual";
/// Default limit on request bodies buffered in memory, 10 MiB
pub const DEFAULT_BODY_LIMIT: usize = 10 << 20;

/// Builder for [`HandlerService`]
pub struct ServiceBuilder {
    server_name: Option<String>,
    body_limit: Option<usize>,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBuilder {
    #[inline]
    pub fn new() -> Self {
        ServiceBuilder {
            server_name: None,
            body_limit: Some(DEFAULT_BODY_LIMIT),
        }
    }

    /// Value of the `Server` header added to every response
    #[inline]
    pub fn server_name(mut self, name: &str) -> Self {
        self.server_name = Some(name.to_string());
        self
    }

    /// Largest request body buffered in memory, in bytes. Bodies whose
    /// length is known to be larger are answered with `413`; chunked ones
    /// fail with `BodyTooLarge` when read. Multipart forms are streamed and
    /// only bound by their own memory budget. `None` accepts any size.
    #[inline]
    pub fn body_limit<T: Into<Option<usize>>>(mut self, limit: T) -> Self {
        self.body_limit = limit.into();
        self
    }

    /// Fails if the server name is not a valid header value
    pub fn build<H: Handler>(self, handler: H) -> Result<HandlerService<H>, ContextualError> {
        let ServiceBuilder { server_name, body_limit } = self;

        let server_name = match server_name {
            Some(name) => HeaderValue::from_str(&name)?,
            None => HeaderValue::from_static(DEFAULT_SERVER_NAME),
        };

        Ok(HandlerService {
            handler: Arc::new(handler),
            server_name,
            body_limit,
            peer_addr: None,
        })
    }
}

/// hyper [`Service`] running a [`Handler`]
pub struct HandlerService<H> {
    handler: Arc<H>,
    server_name: HeaderValue,
    body_limit: Option<usize>,
    peer_addr: Option<SocketAddr>,
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        HandlerService {
            handler: self.handler.clone(),
            server_name: self.server_name.clone(),
            body_limit: self.body_limit,
            peer_addr: self.peer_addr,
        }
    }
}

impl<H: Handler> HandlerService<H> {
    /// Service with the default configuration
    pub fn new(handler: H) -> Self {
        HandlerService {
            handler: Arc::new(handler),
            server_name: HeaderValue::from_static(DEFAULT_SERVER_NAME),
            body_limit: Some(DEFAULT_BODY_LIMIT),
            peer_addr: None,
        }
    }
}

impl HandlerService<()> {
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }
}

impl<H> HandlerService<H> {
    /// A copy of this service reporting `addr` as the peer of its requests
    ///
    /// Meant to be called once per connection, from a `make_service_fn`.
    pub fn with_peer_addr(&self, addr: SocketAddr) -> Self {
        let mut service = self.clone();
        service.peer_addr = Some(addr);
        service
    }
}

impl<H, B> Service<RawRequest<B>> for HandlerService<H>
where
    H: Handler,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError> + Send,
{
    type Error = ContextualError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = RawResponse<RawBody>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RawRequest<B>) -> Self::Future {
        let handler = self.handler.clone();
        let server_name = self.server_name.clone();
        let body_limit = self.body_limit;
        let peer_addr = self.peer_addr;

        async move {
            let (parts, body) = req.into_parts();
            if let Some(limit) = body_limit {
                if body.size_hint().lower() > limit as u64 && !is_multipart(&parts) {
                    debug!("rejecting {} {}: body exceeds {} bytes", parts.method, parts.uri, limit);
                    return Ok(status_response(StatusCode::PAYLOAD_TOO_LARGE, &server_name));
                }
            }
            let body = Body::from_raw(body, body_limit);

            let method = parts.method.clone();
            let uri = parts.uri.clone();
            let request = Arc::new(Request::new(RawRequest::from_parts(parts, body), peer_addr));
            let recorder = Arc::new(Recorder::new());
            let writer: Writer = recorder.clone();

            let outcome = AssertUnwindSafe(async move { handler.serve_http(writer, request).await })
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                error!("handler panicked on {} {}: {}", method, uri, panic_message(&*panic));
                return Ok(status_response(StatusCode::INTERNAL_SERVER_ERROR, &server_name));
            }

            Ok(finish(&recorder, &server_name))
        }
        .boxed()
    }
}

fn is_multipart(parts: &Parts) -> bool {
    cfg!(feature = "multipart")
        && parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|c_t| c_t.to_str().ok())
            .and_then(|c_t| c_t.parse::<Mime>().ok())
            .map(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
            .unwrap_or(false)
}

fn finish(recorder: &Recorder, server_name: &HeaderValue) -> RawResponse<RawBody> {
    let mut res = recorder.take_response();
    res.headers_mut().insert(SERVER, server_name.clone());
    res
}

fn status_response(status: StatusCode, server_name: &HeaderValue) -> RawResponse<RawBody> {
    let recorder = Recorder::new();
    response::error(&recorder, status.canonical_reason().unwrap_or_default(), status);
    finish(&recorder, server_name)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::binding::unbind;
    use crate::context::Context as Ctx;

    async fn call<H: Handler>(service: &mut HandlerService<H>, req: RawRequest<RawBody>) -> RawResponse<RawBody> {
        service.call(req).await.unwrap()
    }

    async fn body_string(res: RawResponse<RawBody>) -> String {
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post(body: &'static str) -> RawRequest<RawBody> {
        RawRequest::builder().method("POST").uri("/").body(RawBody::from(body)).unwrap()
    }

    #[tokio::test]
    async fn handler_reads_the_body() {
        let mut service = HandlerService::new(|w: Writer, r: Arc<Request>| async move {
            let body = r.body().bytes().await.unwrap_or_default();
            let _ = w.write(&body);
        });

        let res = call(&mut service, post("echo")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[SERVER], DEFAULT_SERVER_NAME);
        assert_eq!(body_string(res).await, "echo");
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let mut service = HandlerService::builder()
            .body_limit(4)
            .build(|w: Writer, _r: Arc<Request>| async move {
                let _ = w.write(b"unreachable");
            })
            .unwrap();

        let res = call(&mut service, post("too large")).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_string(res).await, "Payload Too Large\n");

        let res = call(&mut service, post("fits")).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chunked_bodies_over_the_limit_fail_when_read() {
        let mut service = HandlerService::builder()
            .body_limit(4)
            .build(|w: Writer, r: Arc<Request>| async move {
                match r.body().bytes().await {
                    Ok(body) => {
                        let _ = w.write(&body);
                    }
                    Err(e) => response::error(&*w, &e.to_string(), StatusCode::PAYLOAD_TOO_LARGE),
                }
            })
            .unwrap();

        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("too "), Ok("large")];
        let req = RawRequest::builder().method("POST").uri("/").body(RawBody::wrap_stream(futures::stream::iter(chunks))).unwrap();
        let res = call(&mut service, req).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_string(res).await, "Request body exceeds 4 bytes\n");
    }

    #[cfg(feature = "multipart")]
    #[tokio::test]
    async fn multipart_forms_bypass_the_limit() {
        let mut service = HandlerService::builder()
            .body_limit(16)
            .build(|w: Writer, r: Arc<Request>| async move {
                match r.parse_multipart_form(8).await {
                    Ok(form) => {
                        let spilled = form.file("upload").map(|f| f.path().is_some()).unwrap_or_default();
                        let _ = w.write(format!("spilled: {}", spilled).as_bytes());
                    }
                    Err(e) => response::error(&*w, &e.to_string(), StatusCode::BAD_REQUEST),
                }
            })
            .unwrap();

        let body = format!(
            "--X\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a.bin\"\r\n\r\n{}\r\n--X--\r\n",
            "a".repeat(256)
        );
        let req = RawRequest::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=X")
            .body(RawBody::from(body))
            .unwrap();
        let res = call(&mut service, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "spilled: true");
    }

    #[tokio::test]
    async fn no_limit() {
        let mut service = HandlerService::builder()
            .body_limit(None)
            .build(|w: Writer, r: Arc<Request>| async move {
                let len = r.body().bytes().await.map(|b| b.len()).unwrap_or_default();
                let _ = w.write(len.to_string().as_bytes());
            })
            .unwrap();

        let res = call(&mut service, RawRequest::new(RawBody::from(vec![b'a'; DEFAULT_BODY_LIMIT + 1]))).await;
        assert_eq!(body_string(res).await, (DEFAULT_BODY_LIMIT + 1).to_string());
    }

    #[tokio::test]
    async fn panics_only_fail_their_request() {
        let mut service = HandlerService::builder()
            .server_name("test")
            .build(|w: Writer, r: Arc<Request>| async move {
                if r.uri().path() == "/unbound" {
                    unbind(&Ctx::background());
                }
                let _ = w.write(b"fine");
            })
            .unwrap();

        let res = call(&mut service, RawRequest::builder().uri("/unbound").body(RawBody::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers()[SERVER], "test");

        let res = call(&mut service, RawRequest::builder().uri("/").body(RawBody::empty()).unwrap()).await;
        assert_eq!(body_string(res).await, "fine");
    }

    #[test]
    fn invalid_server_name() {
        let built = HandlerService::builder().server_name("bad\nname").build(|_w: Writer, _r: Arc<Request>| async {});
        assert!(matches!(built, Err(ContextualError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn peer_addr_reaches_the_request() {
        let addr: SocketAddr = ([10, 0, 0, 1], 4000).into();
        let mut service = HandlerService::new(|w: Writer, r: Arc<Request>| async move {
            let peer = r.peer_addr().map(ToString::to_string).unwrap_or_default();
            let _ = w.write(peer.as_bytes());
        })
        .with_peer_addr(addr);

        let res = call(&mut service, RawRequest::new(RawBody::empty())).await;
        assert_eq!(body_string(res).await, "10.0.0.1:4000");
    }
}
