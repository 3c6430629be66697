use http::header::{InvalidHeaderValue, ToStrError};
use std::io::Error as IoError;
use thiserror::Error;

/// Boxed error produced by external collaborators such as template engines
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type throughout the contextual stack
///
/// Only recoverable conditions are represented here. Misusing the binder
/// (unbinding a context that was never bound, re-binding a writer with a
/// foreign request) panics instead, and the service bridge turns that panic
/// into a 500 for the offending request only.
#[derive(Error, Debug)]
pub enum ContextualError {
    #[error("Io: {0}")]
    Io(#[from] IoError),
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("Header is not visible ascii: {0}")]
    ToStr(#[from] ToStrError),
    /// The request body could not be read
    #[error("Body: {0}")]
    Body(BoxError),
    /// The request body exceeded the configured limit
    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    /// The request body was already streamed to another consumer
    #[error("request body already consumed")]
    BodyConsumed,
    /// Error from deserializing form data
    #[error("Form: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
    /// Error from (de)serializing json data
    #[error("Json: {0}")]
    Json(#[from] serde_json::Error),
    /// The named cookie was not sent with the request
    #[error("named cookie not present")]
    NoCookie,
    /// The request content type is not `multipart/form-data`
    #[error("request Content-Type isn't multipart/form-data")]
    NotMultipart,
    /// A non-file multipart value exceeded the in-memory budget
    #[error("multipart message too large")]
    MessageTooLarge,
    #[cfg(feature = "multipart")]
    #[cfg_attr(docsrs, doc(cfg(feature = "multipart")))]
    #[error("Multer: {0}")]
    Multipart(#[from] multer::Error),
    /// A template failed to evaluate
    #[error("Template: {0}")]
    Template(BoxError),
}

impl ContextualError {
    /// Whether this error was caused by the client rather than the server
    pub fn is_client_error(&self) -> bool {
        match self {
            ContextualError::BodyTooLarge(_)
            | ContextualError::Form(_)
            | ContextualError::NoCookie
            | ContextualError::NotMultipart
            | ContextualError::MessageTooLarge => true,
            #[cfg(feature = "multipart")]
            ContextualError::Multipart(_) => true,
            _ => false,
        }
    }
}
