//! The streaming response object.
//!
//! Unlike a value-object response, this writes straight to the connection:
//! the status and headers are buffered until the first body byte (or
//! finalisation) forces them onto the wire. Middleware can splice writers
//! into the chain up to that point.

use crate::http::headers::{HeaderLike, HeaderName, Headers};
use crate::http::mime::MimeType;
use crate::http::request_head::HttpVersion;
use crate::http::response_writer::{BaseWriter, ResponseWriter};
use crate::http::status::StatusCode;
use crate::logging;
use crate::petrel_error::{PetrelError, PetrelResult};
use crate::stream::ConnectionStream;
use crate::util::unwrap_some;
use serde::Serialize;
use std::fmt::{Debug, Formatter};
use std::io;
use std::io::Write;
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A response under construction.
///
/// Invariants: once hijacked, header and body operations are no-ops with
/// respect to the native writer. Once the header block is written, status
/// changes and header mutations are ignored.
pub struct Response {
  status: Option<StatusCode>,
  headers: Headers,
  wrote_header: bool,
  empty: bool,
  hijacked: bool,
  version: HttpVersion,
  /// `Some(true)` emits `Connection: keep-alive`, `Some(false)` emits
  /// `Connection: close`. Decided by the server before dispatch.
  keep_alive: Option<bool>,
  stream: Box<dyn ConnectionStream>,
  writer: Option<Box<dyn ResponseWriter>>,
  discard_body: Arc<AtomicBool>,
  error: Option<PetrelError>,
  /// `app.debug`, threaded in by the server. Drives the production-only
  /// parts of error logging.
  debug: bool,
}

impl Debug for Response {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!(
      "Response(status={:?}, wrote_header={}, empty={}, hijacked={})",
      self.status, self.wrote_header, self.empty, self.hijacked
    ))
  }
}

impl Response {
  /// Creates a response writing to the given connection.
  pub fn new(stream: Box<dyn ConnectionStream>, version: HttpVersion) -> Response {
    let discard_body = Arc::new(AtomicBool::new(false));
    let base = BaseWriter::new(stream.new_ref_write(), version);
    let base = DiscardableBase { inner: base, discard: Arc::clone(&discard_body) };
    Response {
      status: None,
      headers: Headers::new(),
      wrote_header: false,
      empty: true,
      hijacked: false,
      version,
      keep_alive: None,
      stream,
      writer: Some(Box::new(base)),
      discard_body,
      error: None,
      debug: false,
    }
  }

  pub(crate) fn set_debug(&mut self, debug: bool) {
    self.debug = debug;
  }

  /// Sets the status if it is still unset. Later calls are ignored.
  pub fn status(&mut self, status: impl Into<StatusCode>) {
    if self.status.is_none() {
      self.status = Some(status.into());
    }
  }

  /// The recorded status. `None` until something set one.
  pub fn status_code(&self) -> Option<&StatusCode> {
    self.status.as_ref()
  }

  pub fn headers(&self) -> &Headers {
    &self.headers
  }

  /// Mutable headers. Changes after the first body write are lost.
  pub fn headers_mut(&mut self) -> &mut Headers {
    &mut self.headers
  }

  pub fn set_header(&mut self, name: impl HeaderLike, value: impl AsRef<str>) {
    self.headers.set(name, value);
  }

  /// True until the first body byte was written.
  pub fn is_empty(&self) -> bool {
    self.empty
  }

  pub fn wrote_header(&self) -> bool {
    self.wrote_header
  }

  pub fn is_hijacked(&self) -> bool {
    self.hijacked
  }

  pub fn version(&self) -> HttpVersion {
    self.version
  }

  pub(crate) fn set_keep_alive(&mut self, keep_alive: bool) {
    self.keep_alive = Some(keep_alive);
  }

  /// Emit headers but drop all body bytes. Used for HEAD requests.
  pub(crate) fn set_discard_body(&mut self) {
    self.discard_body.store(true, Ordering::SeqCst);
  }

  /// Replaces the chained writer. The closure receives the current chain and
  /// usually returns a wrapper around it.
  pub fn set_writer<F>(&mut self, wrap: F)
  where
    F: FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>,
  {
    if let Some(writer) = self.writer.take() {
      self.writer = Some(wrap(writer));
    }
  }

  /// Takes over the underlying connection. Finalisation will no longer emit
  /// headers or close the chain; the caller owns the stream from here on.
  pub fn hijack(&mut self) -> PetrelResult<Box<dyn ConnectionStream>> {
    if self.wrote_header {
      return Err(PetrelError::new_io(
        io::ErrorKind::InvalidInput,
        "cannot hijack a connection whose response headers were sent",
      ));
    }
    self.hijacked = true;
    Ok(self.stream.new_ref())
  }

  /// Records an error on the response. The status is forced to the error's
  /// status (500 for most kinds) if still unset; the matching status handler
  /// runs during finalisation.
  pub fn error(&mut self, err: impl Into<PetrelError>) {
    let err = err.into();
    logging::log_error(&err, self.debug);
    if self.status.is_none() {
      self.status = Some(err.status());
    }
    self.error = Some(err);
  }

  /// The recorded error, if any.
  pub fn error_ref(&self) -> Option<&PetrelError> {
    self.error.as_ref()
  }

  pub(crate) fn take_error(&mut self) -> Option<PetrelError> {
    self.error.take()
  }

  /// Writes a plain text body. Sets `Content-Type` if absent.
  pub fn string(&mut self, body: impl AsRef<str>) -> PetrelResult<()> {
    if !self.wrote_header && !self.headers.contains(HeaderName::ContentType) {
      self.headers.set(HeaderName::ContentType, "text/plain; charset=utf-8");
    }
    self.write_all(body.as_ref().as_bytes())?;
    Ok(())
  }

  /// Serialises the value as a JSON body. Sets `Content-Type` if absent.
  pub fn json<T: Serialize + ?Sized>(&mut self, body: &T) -> PetrelResult<()> {
    let bytes = serde_json::to_vec(body)?;
    if !self.wrote_header && !self.headers.contains(HeaderName::ContentType) {
      self.headers.set(HeaderName::ContentType, MimeType::ApplicationJson.as_str());
    }
    self.write_all(&bytes)?;
    Ok(())
  }

  /// Streams a file from disk. Content type comes from the file extension,
  /// the disposition is `inline`.
  pub fn file(&mut self, path: impl AsRef<FsPath>) -> PetrelResult<()> {
    self.send_file(path.as_ref(), "inline")
  }

  /// Streams a file from disk as a download (`attachment` disposition).
  pub fn download(&mut self, path: impl AsRef<FsPath>) -> PetrelResult<()> {
    self.send_file(path.as_ref(), "attachment")
  }

  fn send_file(&mut self, path: &FsPath, disposition: &str) -> PetrelResult<()> {
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let metadata = std::fs::metadata(path)?;
    let mut file = std::fs::File::open(path)?;

    if !self.wrote_header {
      if !self.headers.contains(HeaderName::ContentType) {
        self
          .headers
          .set(HeaderName::ContentType, MimeType::from_file_name(&file_name).as_str());
      }
      self.headers.set(
        HeaderName::ContentDisposition,
        format!("{}; filename=\"{}\"", disposition, file_name),
      );
      if !self.headers.contains(HeaderName::ContentLength) {
        self.headers.set(HeaderName::ContentLength, metadata.len().to_string());
      }
    }

    io::copy(&mut file, self)?;
    Ok(())
  }

  /// Serialises the status line and headers onto the wire. The first body
  /// chunk is handed to the chain's pre-write hook beforehand.
  fn write_head(&mut self, first_chunk: &[u8]) -> io::Result<()> {
    let mut writer = unwrap_some(self.writer.take());
    let pre = writer.pre_write(&mut self.headers, first_chunk);
    self.writer = Some(writer);
    pre?;

    if self.version == HttpVersion::Http11 && !self.headers.contains(HeaderName::Connection) {
      if let Some(keep_alive) = self.keep_alive {
        self
          .headers
          .set(HeaderName::Connection, if keep_alive { "keep-alive" } else { "close" });
      }
    }

    let status = self.status.clone().unwrap_or(StatusCode::OK);
    self.status = Some(status.clone());

    let out = self.stream.as_stream_write();
    out.write_all(
      format!("{} {} {}\r\n", self.version.as_str(), status.code(), status.reason()).as_bytes(),
    )?;
    for header in self.headers.iter() {
      out.write_all(header.name.as_str().as_bytes())?;
      out.write_all(b": ")?;
      out.write_all(header.value.as_bytes())?;
      out.write_all(b"\r\n")?;
    }
    out.write_all(b"\r\n")?;

    self.wrote_header = true;
    Ok(())
  }

  /// Finalises the response: unset status with an empty body becomes 204,
  /// buffered headers are flushed, and the writer chain is closed.
  ///
  /// Hijacked responses skip all of it except releasing the chain.
  pub(crate) fn finish(&mut self) -> io::Result<()> {
    if self.hijacked {
      self.writer = None;
      return Ok(());
    }

    if !self.wrote_header {
      if self.status.is_none() {
        self.status = Some(StatusCode::NoContent);
      }

      let code = unwrap_some(self.status.as_ref()).code();
      if code >= 200 && code != 204 && code != 304 {
        self.headers.set(HeaderName::ContentLength, "0");
      }

      self.write_head(b"")?;
    }

    match self.writer.take() {
      Some(mut writer) => writer.close(),
      None => Ok(()),
    }
  }
}

impl Write for Response {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    // A hijacked response swallows writes with respect to the native writer.
    if self.hijacked {
      return Ok(buf.len());
    }

    // An empty write must not force the headers out; finalisation decides
    // what an empty body becomes.
    if buf.is_empty() && !self.wrote_header {
      return Ok(0);
    }

    if !self.wrote_header {
      self.write_head(buf)?;
    }

    if !buf.is_empty() {
      self.empty = false;
    }

    match self.writer.as_mut() {
      Some(writer) => writer.write(buf),
      None => Ok(buf.len()),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    match self.writer.as_mut() {
      Some(writer) => writer.flush(),
      None => Ok(()),
    }
  }
}

impl Drop for Response {
  fn drop(&mut self) {
    // Backstop: finish() normally took the writer already.
    if let Some(mut writer) = self.writer.take() {
      writer.close().ok();
    }
  }
}

/// Base writer wrapper sharing the discard flag with the response so HEAD
/// handling works even after middleware wrapped the chain.
struct DiscardableBase {
  inner: BaseWriter,
  discard: Arc<AtomicBool>,
}

impl Write for DiscardableBase {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    if self.discard.load(Ordering::SeqCst) {
      return Ok(buf.len());
    }
    self.inner.write(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.inner.flush()
  }
}

impl ResponseWriter for DiscardableBase {
  fn pre_write(&mut self, headers: &mut Headers, data: &[u8]) -> io::Result<()> {
    if self.discard.load(Ordering::SeqCst) {
      self.inner.set_discard_body(true);
    }
    self.inner.pre_write(headers, data)
  }

  fn close(&mut self) -> io::Result<()> {
    self.inner.close()
  }
}
