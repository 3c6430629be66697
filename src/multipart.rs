//! `multipart/form-data` forms.
//!
//! Parsing streams the body once through [`multer`]. Plain values are kept as
//! strings. File parts stay in memory while they fit in the memory budget and
//! are spilled to temporary files otherwise.

use std::{collections::HashMap, io, path::Path};

use http::HeaderMap;
use hyper::body::Bytes;
use mime::Mime;
use multer::{Field, Multipart as RawMultipart};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::{body::BodyStream, error::ContextualError, request::FormValues};

/// Memory budget used when a form is parsed implicitly by a value lookup
pub const DEFAULT_MAX_MEMORY: u64 = 32 << 20;

/// Extra allowance for non-file values on top of the memory budget
const VALUE_ALLOWANCE: u64 = 10 << 20;

enum Content {
    Memory(Bytes),
    Disk(NamedTempFile),
}

/// An uploaded file part
pub struct FileHeader {
    filename: String,
    content_type: Option<Mime>,
    headers: HeaderMap,
    size: u64,
    content: Content,
}

impl FileHeader {
    /// The `filename` param of the part's `Content-Disposition`
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Location of the spilled content, `None` while held in memory
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            Content::Memory(_) => None,
            Content::Disk(f) => Some(f.path()),
        }
    }

    /// Load the whole part
    pub async fn bytes(&self) -> io::Result<Bytes> {
        match &self.content {
            Content::Memory(b) => Ok(b.clone()),
            Content::Disk(f) => tokio::fs::read(f.path()).await.map(Bytes::from),
        }
    }
}

impl std::fmt::Debug for FileHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHeader")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .field("path", &self.path())
            .finish()
    }
}

/// A parsed multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    values: FormValues,
    files: HashMap<String, Vec<FileHeader>>,
}

impl MultipartForm {
    /// Non-file values, in body order
    pub fn values(&self) -> &FormValues {
        &self.values
    }

    /// First non-file value named `name`
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name)
    }

    /// Every file uploaded under `name`
    pub fn files(&self, name: &str) -> &[FileHeader] {
        self.files.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// First file uploaded under `name`
    pub fn file(&self, name: &str) -> Option<&FileHeader> {
        self.files(name).first()
    }
}

/// Read a whole form out of a body stream
///
/// Values and in-memory files share one budget of `max_memory` plus
/// [`VALUE_ALLOWANCE`]; in-memory files are also capped at `max_memory`.
pub(crate) async fn read_form(body: BodyStream, boundary: &str, max_memory: u64) -> Result<MultipartForm, ContextualError> {
    let mut multipart = RawMultipart::new(body, boundary);

    let mut form = MultipartForm::default();
    let mut value_budget = max_memory.saturating_add(VALUE_ALLOWANCE);
    let mut file_budget = max_memory;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        let filename = match field.file_name() {
            Some(f) => f.to_string(),
            None => {
                let data = match read_limited(&mut field, value_budget).await? {
                    Read::Complete(data) => data,
                    Read::Overflow(_) => return Err(ContextualError::MessageTooLarge),
                };
                value_budget -= data.len() as u64;
                form.values.push(name, String::from_utf8_lossy(&data).into_owned());
                continue;
            }
        };

        let content_type = field.content_type().cloned();
        let headers = field.headers().clone();

        let (size, content) = match read_limited(&mut field, file_budget).await? {
            Read::Complete(data) => {
                file_budget -= data.len() as u64;
                value_budget = value_budget.saturating_sub(data.len() as u64);
                (data.len() as u64, Content::Memory(Bytes::from(data)))
            }
            Read::Overflow(prefix) => spill(&mut field, prefix).await?,
        };

        form.files.entry(name).or_default().push(FileHeader {
            filename,
            content_type,
            headers,
            size,
            content,
        });
    }

    Ok(form)
}

enum Read {
    Complete(Vec<u8>),
    /// The field is larger than the limit; holds what was read so far
    Overflow(Vec<u8>),
}

async fn read_limited(field: &mut Field<'_>, limit: u64) -> Result<Read, ContextualError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        data.extend_from_slice(&chunk);
        if data.len() as u64 > limit {
            return Ok(Read::Overflow(data));
        }
    }
    Ok(Read::Complete(data))
}

/// Write a field to a temporary file, starting with the already read `prefix`
async fn spill(field: &mut Field<'_>, prefix: Vec<u8>) -> Result<(u64, Content), ContextualError> {
    let tmp = NamedTempFile::new()?;
    let mut file = tokio::fs::File::from_std(tmp.reopen()?);

    file.write_all(&prefix).await?;
    let mut size = prefix.len() as u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;

    Ok((size, Content::Disk(tmp)))
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::error::BoxError;
    use futures::{stream, StreamExt};

    const BOUNDARY: &str = "X-BOUNDARY";

    /// The encoded form, delivered in small chunks like a network body
    fn body(parts: &[(&str, Option<&str>, &str)]) -> BodyStream {
        let mut out = String::new();
        for (name, filename, data) in parts {
            out.push_str(&format!("--{}\r\n", BOUNDARY));
            match filename {
                Some(f) => out.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n",
                    name, f
                )),
                None => out.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n", name)),
            }
            out.push_str("\r\n");
            out.push_str(data);
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{}--\r\n", BOUNDARY));

        let bytes = Bytes::from(out);
        let chunks: Vec<Result<Bytes, BoxError>> = (0..bytes.len())
            .step_by(4096)
            .map(|start| Ok(bytes.slice(start..(start + 4096).min(bytes.len()))))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn values_and_small_files_stay_in_memory() {
        let b = body(&[("name", None, "Bob Jones"), ("avatar", Some("bob.txt"), "tiny"), ("name", None, "Fred")]);
        let form = read_form(b, BOUNDARY, 1024).await.unwrap();

        assert_eq!(form.value("name"), Some("Bob Jones"));
        assert_eq!(form.values().get_all("name").count(), 2);

        let f = form.file("avatar").unwrap();
        assert_eq!(f.filename(), "bob.txt");
        assert_eq!(f.size(), 4);
        assert!(f.path().is_none());
        assert_eq!(f.bytes().await.unwrap(), Bytes::from_static(b"tiny"));
        assert!(form.files("missing").is_empty());
    }

    #[tokio::test]
    async fn large_files_spill_to_disk() {
        let big = "x".repeat(64);
        let b = body(&[("upload", Some("big.bin"), &big), ("second", Some("small.bin"), "ok")]);
        let form = read_form(b, BOUNDARY, 16).await.unwrap();

        let f = form.file("upload").unwrap();
        assert_eq!(f.size(), 64);
        assert!(f.path().unwrap().exists());
        assert_eq!(f.bytes().await.unwrap().len(), 64);

        // the spilled file did not consume the memory budget
        assert!(form.file("second").unwrap().path().is_none());
    }

    #[tokio::test]
    async fn oversized_value_is_rejected() {
        let big = "v".repeat(64);
        let b = body(&[("comment", None, &big)]);
        // the value allowance keeps this within bounds
        assert!(read_form(b, BOUNDARY, 0).await.is_ok());

        let huge = "v".repeat((VALUE_ALLOWANCE + 1) as usize);
        let b = body(&[("comment", None, &huge)]);
        assert!(matches!(read_form(b, BOUNDARY, 0).await, Err(ContextualError::MessageTooLarge)));
    }

    #[tokio::test]
    async fn in_memory_files_count_against_values() {
        let file = "f".repeat(16);
        let value = "v".repeat((VALUE_ALLOWANCE + 8) as usize);

        let b = body(&[("comment", None, &value)]);
        assert!(read_form(b, BOUNDARY, 16).await.is_ok());

        let b = body(&[("upload", Some("f.txt"), &file), ("comment", None, &value)]);
        assert!(matches!(read_form(b, BOUNDARY, 16).await, Err(ContextualError::MessageTooLarge)));
    }
}
