//! The chained response writer.
//!
//! A [Response] owns a chain of [ResponseWriter]s ending in a [BaseWriter]
//! that frames body bytes onto the connection. Middleware (compression most
//! notably) wraps the chain via `Response::set_writer`. The pre-write hook
//! runs exactly once, right before the headers are emitted, and every wrapper
//! must forward it to its child.
//!
//! [Response]: super::response::Response

use crate::http::headers::{HeaderName, Headers};
use crate::http::request_head::HttpVersion;
use std::io;
use std::io::Write;

/// A writable link of the response writer chain.
///
/// `pre_write` and `close` have default no-op implementations so simple
/// wrappers only override what they need. Wrappers own their child and are
/// responsible for forwarding both calls to it.
pub trait ResponseWriter: Write + Send {
  /// Called once with the response headers and the first body chunk, before
  /// any header has hit the wire. This is the last chance to change headers.
  fn pre_write(&mut self, headers: &mut Headers, data: &[u8]) -> io::Result<()> {
    let _ = (headers, data);
    Ok(())
  }

  /// Close this writer, then its child. Called exactly once on finalisation.
  fn close(&mut self) -> io::Result<()> {
    self.flush()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
  /// Not yet decided, nothing written.
  Undecided,
  /// Raw bytes, length known upfront through Content-Length.
  Identity,
  /// Chunked transfer encoding.
  Chunked,
}

/// The terminal writer of every chain. Decides the body framing when the
/// first chunk arrives and writes to the connection.
pub struct BaseWriter {
  out: Box<dyn Write + Send + Sync>,
  version: HttpVersion,
  framing: Framing,
  /// Swallow body bytes (HEAD requests).
  discard: bool,
  closed: bool,
}

impl BaseWriter {
  pub fn new(out: Box<dyn Write + Send + Sync>, version: HttpVersion) -> BaseWriter {
    BaseWriter { out, version, framing: Framing::Undecided, discard: false, closed: false }
  }

  /// Headers are emitted but the body is dropped. Used for HEAD requests.
  pub fn set_discard_body(&mut self, discard: bool) {
    self.discard = discard;
  }
}

impl Write for BaseWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    if self.discard || buf.is_empty() {
      return Ok(buf.len());
    }

    match self.framing {
      // Without a pre_write the headers carried a Content-Length.
      Framing::Undecided | Framing::Identity => self.out.write_all(buf)?,
      Framing::Chunked => {
        write!(self.out, "{:x}\r\n", buf.len())?;
        self.out.write_all(buf)?;
        self.out.write_all(b"\r\n")?;
      }
    }

    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    self.out.flush()
  }
}

impl ResponseWriter for BaseWriter {
  fn pre_write(&mut self, headers: &mut Headers, data: &[u8]) -> io::Result<()> {
    if self.framing != Framing::Undecided {
      return Ok(());
    }

    if data.is_empty() || headers.contains(HeaderName::ContentLength) || self.version == HttpVersion::Http10 {
      // Empty bodies need no framing; HTTP/1.0 has no chunked transfer, the
      // connection close delimits the body there.
      self.framing = Framing::Identity;
    } else {
      self.framing = Framing::Chunked;
      headers.set(HeaderName::TransferEncoding, "chunked");
    }

    Ok(())
  }

  fn close(&mut self) -> io::Result<()> {
    if self.closed {
      return Ok(());
    }
    self.closed = true;

    if self.framing == Framing::Chunked && !self.discard {
      self.out.write_all(b"0\r\n\r\n")?;
    }
    self.out.flush()
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  struct SharedBuf(Arc<Mutex<Vec<u8>>>);

  impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn chunked_framing() {
    let buf = SharedBuf::default();
    let mut writer = BaseWriter::new(Box::new(buf.clone()), HttpVersion::Http11);
    let mut headers = Headers::new();
    writer.pre_write(&mut headers, b"hello").unwrap();
    assert_eq!(headers.get(HeaderName::TransferEncoding), Some("chunked"));

    writer.write_all(b"hello").unwrap();
    writer.close().unwrap();
    assert_eq!(buf.0.lock().unwrap().as_slice(), b"5\r\nhello\r\n0\r\n\r\n");
  }

  #[test]
  fn identity_framing_with_content_length() {
    let buf = SharedBuf::default();
    let mut writer = BaseWriter::new(Box::new(buf.clone()), HttpVersion::Http11);
    let mut headers = Headers::new();
    headers.set(HeaderName::ContentLength, "5");
    writer.pre_write(&mut headers, b"hello").unwrap();
    assert!(!headers.contains(HeaderName::TransferEncoding));

    writer.write_all(b"hello").unwrap();
    writer.close().unwrap();
    assert_eq!(buf.0.lock().unwrap().as_slice(), b"hello");
  }

  #[test]
  fn discarded_body_writes_nothing() {
    let buf = SharedBuf::default();
    let mut writer = BaseWriter::new(Box::new(buf.clone()), HttpVersion::Http11);
    writer.set_discard_body(true);
    let mut headers = Headers::new();
    writer.pre_write(&mut headers, b"hello").unwrap();
    writer.write_all(b"hello").unwrap();
    writer.close().unwrap();
    assert!(buf.0.lock().unwrap().is_empty());
  }
}
