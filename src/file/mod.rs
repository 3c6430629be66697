//! Static content serving: conditional requests, byte ranges, files and
//! directory listings.

use std::{
    io::{self, SeekFrom},
    path::Path,
    time::SystemTime,
};

use http::{
    header::{ACCEPT_RANGES, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE},
    HeaderValue, Method, StatusCode,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::{
    redirect::local_redirect,
    request::Request,
    response::{error, escape_html, TEXT_HTML_UTF8},
    writer::{detect_content_type, ResponseWriter},
};

mod conditional;
mod etag;
mod range;

use conditional::{check_if_modified_since, check_preconditions, set_last_modified, write_not_modified, Condition, Precondition};

pub use conditional::{format_http_date, parse_http_date};
pub use etag::EntityTag;
pub use range::{parse_range, ByteRange, RangeError};

const SNIFF_LEN: usize = 512;
const COPY_BUFFER: usize = 32 * 1024;
const INDEX_PAGE: &str = "/index.html";

/// Characters escaped in the links of a directory listing
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Reply with the bytes of `content`
///
/// The content type comes from the response headers if already set, else
/// from the extension of `name`, else from sniffing the first bytes.
/// `Last-Modified` is set from `modtime` unless it is unknown. Preconditions
/// are evaluated against the `ETag` response header, so set it beforehand to
/// take part in them. A single byte range is answered with `206`; several
/// ranges are answered with the whole content.
pub async fn serve_content<C>(w: &dyn ResponseWriter, r: &Request, name: &str, modtime: Option<SystemTime>, mut content: C)
where
    C: AsyncRead + AsyncSeek + Unpin + Send,
{
    set_last_modified(w, modtime);
    let range = match check_preconditions(w, r, modtime) {
        Precondition::Done => return,
        Precondition::Serve { range } => range,
    };

    if w.header(&CONTENT_TYPE).is_none() {
        let content_type = match guess_content_type(name) {
            Some(c_t) => c_t,
            None => match sniff(&mut content).await {
                Ok(c_t) => c_t.to_string(),
                Err(e) => {
                    debug!("unable to sniff `{}`: {}", name, e);
                    error(w, "seeker can't seek", StatusCode::INTERNAL_SERVER_ERROR);
                    return;
                }
            },
        };
        if let Ok(v) = HeaderValue::from_str(&content_type) {
            w.set_header(CONTENT_TYPE, v);
        }
    }

    let size = match content_size(&mut content).await {
        Ok(size) => size,
        Err(e) => {
            debug!("unable to size `{}`: {}", name, e);
            error(w, "seeker can't seek", StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    let mut status = StatusCode::OK;
    let mut send_size = size;
    if let Some(header) = range {
        match parse_range(&header, size) {
            Ok(ranges) => {
                if let [ra] = ranges.as_slice() {
                    if ra.length > 0 {
                        if let Err(e) = content.seek(SeekFrom::Start(ra.start)).await {
                            error(w, &e.to_string(), StatusCode::RANGE_NOT_SATISFIABLE);
                            return;
                        }
                        send_size = ra.length;
                        status = StatusCode::PARTIAL_CONTENT;
                        if let Ok(v) = HeaderValue::from_str(&ra.content_range(size)) {
                            w.set_header(CONTENT_RANGE, v);
                        }
                    }
                }
            }
            Err(e) => {
                if e == RangeError::NoOverlap {
                    if let Ok(v) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                        w.set_header(CONTENT_RANGE, v);
                    }
                }
                error(w, &e.to_string(), StatusCode::RANGE_NOT_SATISFIABLE);
                return;
            }
        }
    }

    w.set_header(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if w.header(&CONTENT_ENCODING).is_none() {
        w.set_header(CONTENT_LENGTH, HeaderValue::from(send_size));
    }
    w.write_header(status);

    if r.method() != Method::HEAD {
        if let Err(e) = copy_to(w, content, send_size).await {
            warn!("unable to send `{}`: {}", name, e);
        }
    }
}

/// Reply with the file or directory at `path`
///
/// Request paths containing a `..` segment, once percent-decoded, are
/// rejected with `400`. Requests
/// for `.../index.html` are redirected to `./`, directories requested without
/// a trailing slash are redirected to it. A directory is served through its
/// `index.html` if it has one, as a listing otherwise.
pub async fn serve_file(w: &dyn ResponseWriter, r: &Request, path: impl AsRef<Path>) {
    if contains_dot_dot(&percent_decode_str(r.uri().path()).decode_utf8_lossy()) {
        error(w, "invalid URL path", StatusCode::BAD_REQUEST);
        return;
    }

    if r.uri().path().ends_with(INDEX_PAGE) {
        local_redirect(w, r, "./");
        return;
    }

    let mut path = path.as_ref().to_path_buf();
    let mut meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(e) => return io_error(w, &e),
    };

    if meta.is_dir() {
        let url = r.uri().path();
        if !url.ends_with('/') {
            let base = url.rsplit('/').next().unwrap_or_default();
            local_redirect(w, r, &format!("{}/", base));
            return;
        }

        let index = path.join(&INDEX_PAGE[1..]);
        if let Ok(index_meta) = tokio::fs::metadata(&index).await {
            path = index;
            meta = index_meta;
        }
    }

    let modtime = meta.modified().ok();
    if meta.is_dir() {
        if check_if_modified_since(r, modtime) == Condition::False {
            write_not_modified(w);
            return;
        }
        set_last_modified(w, modtime);
        dir_list(w, &path).await;
        return;
    }

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => return io_error(w, &e),
    };
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    serve_content(w, r, &name, modtime, file).await
}

fn io_error(w: &dyn ResponseWriter, e: &io::Error) {
    match e.kind() {
        io::ErrorKind::NotFound => error(w, "404 page not found", StatusCode::NOT_FOUND),
        io::ErrorKind::PermissionDenied => error(w, "403 Forbidden", StatusCode::FORBIDDEN),
        _ => {
            debug!("unable to open file: {}", e);
            error(w, "500 Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn contains_dot_dot(path: &str) -> bool {
    path.contains("..") && path.split(|c| c == '/' || c == '\\').any(|segment| segment == "..")
}

fn guess_content_type(name: &str) -> Option<String> {
    let guess = mime_guess::from_path(name).first_raw()?;
    if guess.starts_with("text/") {
        Some(format!("{}; charset=utf-8", guess))
    } else {
        Some(guess.to_string())
    }
}

async fn sniff<C: AsyncRead + AsyncSeek + Unpin>(content: &mut C) -> io::Result<&'static str> {
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    (&mut *content).take(SNIFF_LEN as u64).read_to_end(&mut buf).await?;
    content.seek(SeekFrom::Start(0)).await?;
    Ok(detect_content_type(&buf))
}

async fn content_size<C: AsyncSeek + Unpin>(content: &mut C) -> io::Result<u64> {
    let size = content.seek(SeekFrom::End(0)).await?;
    content.seek(SeekFrom::Start(0)).await?;
    Ok(size)
}

async fn copy_to<C: AsyncRead + Unpin>(w: &dyn ResponseWriter, content: C, len: u64) -> io::Result<u64> {
    let mut content = content.take(len);
    let mut buf = vec![0u8; COPY_BUFFER.min(len as usize).max(1)];
    let mut sent = 0;
    loop {
        let n = content.read(&mut buf).await?;
        if n == 0 {
            return Ok(sent);
        }
        w.write(&buf[..n])?;
        sent += n as u64;
    }
}

async fn dir_list(w: &dyn ResponseWriter, path: &Path) {
    let mut names = match read_dir_names(path).await {
        Ok(names) => names,
        Err(e) => {
            debug!("unable to list `{}`: {}", path.display(), e);
            error(w, "Error reading directory", StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };
    names.sort();

    let mut out = String::from("<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n");
    for name in names {
        out.push_str(&format!("<a href=\"{}\">{}</a>\n", listing_href(&name), escape_html(&name)));
    }
    out.push_str("</pre>\n");

    w.set_header(CONTENT_TYPE, HeaderValue::from_static(TEXT_HTML_UTF8));
    if let Err(e) = w.write(out.as_bytes()) {
        warn!("unable to send listing of `{}`: {}", path.display(), e);
    }
}

async fn read_dir_names(path: &Path) -> io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    Ok(names)
}

/// Relative link to a listed entry
///
/// A name with a colon in its first segment would read as a scheme, so it is
/// anchored to the current directory.
fn listing_href(name: &str) -> String {
    let escaped = utf8_percent_encode(name, PATH).to_string();
    match name.split('/').next() {
        Some(first) if first.contains(':') => format!("./{}", escaped),
        _ => escaped,
    }
}
