use futures::stream::{self, BoxStream, StreamExt};
use http_body::{combinators::UnsyncBoxBody, LengthLimitError, Limited};
use hyper::body::{Buf, Bytes, HttpBody};
use tokio::sync::Mutex;

use crate::error::{BoxError, ContextualError};

/// Chunks of a body read incrementally
pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

enum BodyInner {
    Raw(UnsyncBoxBody<Bytes, BoxError>),
    Memory(Bytes),
    Taken,
}

/// Request body, read from the connection when first asked for
///
/// [`bytes`](#method.bytes) buffers the body up to the service's body limit
/// and keeps it, so it can be asked for again. [`stream`](#method.stream)
/// hands the unread body to consumers that process it incrementally, such as
/// the multipart parser; a streamed body cannot be read a second time.
pub struct Body {
    inner: Mutex<BodyInner>,
    limit: Option<usize>,
}

impl Body {
    pub fn empty() -> Self {
        Body::from(Bytes::new())
    }

    pub(crate) fn from_raw<B>(raw: B, limit: Option<usize>) -> Self
    where
        B: HttpBody + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError>,
    {
        let raw = raw
            .map_data(|mut data| data.copy_to_bytes(data.remaining()))
            .map_err(|e| -> BoxError { e.into() })
            .boxed_unsync();
        Body {
            inner: Mutex::new(BodyInner::Raw(raw)),
            limit,
        }
    }

    /// Most bytes [`bytes`](#method.bytes) will buffer, `None` when unlimited
    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// The whole body
    ///
    /// Fails with `BodyTooLarge` past the limit and with `BodyConsumed` once
    /// the body was streamed.
    pub async fn bytes(&self) -> Result<Bytes, ContextualError> {
        let mut inner = self.inner.lock().await;
        match std::mem::replace(&mut *inner, BodyInner::Taken) {
            BodyInner::Raw(raw) => {
                let bytes = load(raw, self.limit).await?;
                *inner = BodyInner::Memory(bytes.clone());
                Ok(bytes)
            }
            BodyInner::Memory(bytes) => {
                *inner = BodyInner::Memory(bytes.clone());
                Ok(bytes)
            }
            BodyInner::Taken => Err(ContextualError::BodyConsumed),
        }
    }

    /// The body as a stream of chunks, without the limit
    ///
    /// A body already buffered by [`bytes`](#method.bytes) is streamed from
    /// memory and stays available.
    pub async fn stream(&self) -> Result<BodyStream, ContextualError> {
        let mut inner = self.inner.lock().await;
        match std::mem::replace(&mut *inner, BodyInner::Taken) {
            BodyInner::Raw(raw) => Ok(stream::unfold(raw, |mut raw| async move { raw.data().await.map(|chunk| (chunk, raw)) }).boxed()),
            BodyInner::Memory(bytes) => {
                *inner = BodyInner::Memory(bytes.clone());
                Ok(stream::once(async move { Ok::<_, BoxError>(bytes) }).boxed())
            }
            BodyInner::Taken => Err(ContextualError::BodyConsumed),
        }
    }
}

async fn load(raw: UnsyncBoxBody<Bytes, BoxError>, limit: Option<usize>) -> Result<Bytes, ContextualError> {
    match limit {
        Some(limit) => hyper::body::to_bytes(Limited::new(raw, limit).boxed_unsync()).await.map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ContextualError::BodyTooLarge(limit)
            } else {
                ContextualError::Body(e)
            }
        }),
        None => hyper::body::to_bytes(raw).await.map_err(ContextualError::Body),
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body {
            inner: Mutex::new(BodyInner::Memory(bytes)),
            limit: None,
        }
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::from(Bytes::from_static(s.as_bytes()))
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body").field("limit", &self.limit).finish_non_exhaustive()
    }
}
