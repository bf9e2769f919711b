//! Response compression.
//!
//! The middleware negotiates an encoder from `Accept-Encoding` and splices a
//! compression writer into the response chain. Compression starts lazily on
//! the first body write, so the pre-write hook still reaches the downstream
//! writer before the encoder takes ownership of it.

use crate::http::headers::{HeaderName, Headers};
use crate::http::mime::sniff_content_type;
use crate::http::qvalue::{parse_quality_values, QValue};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::response_writer::ResponseWriter;
use crate::middleware::{Middleware, Next};
use crate::petrel_error::PetrelResult;
use crate::util;
use std::collections::HashSet;
use std::io;
use std::io::{BufWriter, Write};
use std::sync::Arc;

/// A content encoding. `new_writer` returns the writable that compresses
/// into `child`; closing it must finish the encoder first and close the
/// child after.
pub trait Encoder: Send + Sync {
  /// The `Content-Encoding` token, e.g. `gzip`.
  fn encoding(&self) -> &'static str;

  fn new_writer(&self, child: Box<dyn ResponseWriter>) -> io::Result<Box<dyn ResponseWriter>>;
}

/// Gzip via libflate, with a pinned header so output is deterministic.
pub struct GzipEncoder;

impl Encoder for GzipEncoder {
  fn encoding(&self) -> &'static str {
    "gzip"
  }

  fn new_writer(&self, child: Box<dyn ResponseWriter>) -> io::Result<Box<dyn ResponseWriter>> {
    // The encoder emits very small writes; buffering keeps the downstream
    // chunk framing from degenerating into one frame per symbol.
    let encoder = util::new_gzip_encoder(BufWriter::new(child))?;
    Ok(Box::new(GzipWriter { inner: Some(encoder) }))
  }
}

struct GzipWriter {
  inner: Option<libflate::gzip::Encoder<BufWriter<Box<dyn ResponseWriter>>>>,
}

impl Write for GzipWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    match self.inner.as_mut() {
      Some(encoder) => encoder.write(buf),
      None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "write after close")),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    match self.inner.as_mut() {
      Some(encoder) => encoder.flush(),
      None => Ok(()),
    }
  }
}

impl ResponseWriter for GzipWriter {
  fn close(&mut self) -> io::Result<()> {
    let Some(encoder) = self.inner.take() else {
      return Ok(());
    };
    // Encoder first, then the child.
    let buffered = encoder.finish().into_result()?;
    let mut child = buffered.into_inner().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    child.close()
  }
}

/// Deflate (zlib framing) via libflate.
pub struct DeflateEncoder;

impl Encoder for DeflateEncoder {
  fn encoding(&self) -> &'static str {
    "deflate"
  }

  fn new_writer(&self, child: Box<dyn ResponseWriter>) -> io::Result<Box<dyn ResponseWriter>> {
    let encoder = libflate::zlib::Encoder::new(BufWriter::new(child))?;
    Ok(Box::new(DeflateWriter { inner: Some(encoder) }))
  }
}

struct DeflateWriter {
  inner: Option<libflate::zlib::Encoder<BufWriter<Box<dyn ResponseWriter>>>>,
}

impl Write for DeflateWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    match self.inner.as_mut() {
      Some(encoder) => encoder.write(buf),
      None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "write after close")),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    match self.inner.as_mut() {
      Some(encoder) => encoder.flush(),
      None => Ok(()),
    }
  }
}

impl ResponseWriter for DeflateWriter {
  fn close(&mut self) -> io::Result<()> {
    let Some(encoder) = self.inner.take() else {
      return Ok(());
    };
    let buffered = encoder.finish().into_result()?;
    let mut child = buffered.into_inner().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    child.close()
  }
}

/// Content-negotiated response compression.
pub struct CompressMiddleware {
  encoders: Vec<Arc<dyn Encoder>>,
}

impl CompressMiddleware {
  /// The encoder list is ordered: earlier entries win quality ties.
  ///
  /// # Panics
  /// Panics when the encoder list is empty.
  pub fn new(encoders: Vec<Arc<dyn Encoder>>) -> CompressMiddleware {
    assert!(!encoders.is_empty(), "CompressMiddleware requires at least one encoder");
    CompressMiddleware { encoders }
  }

  /// Gzip and deflate, gzip preferred.
  pub fn standard() -> CompressMiddleware {
    CompressMiddleware::new(vec![Arc::new(GzipEncoder), Arc::new(DeflateEncoder)])
  }

  /// Picks an encoder for the request's `Accept-Encoding`, or `None` to pass
  /// the response through unchanged.
  ///
  /// Accepted tokens are considered by priority; equal-priority tokens are
  /// tied broken by the lowest index in the configured encoder list. `*`
  /// stands for every configured encoder not named by a specific entry.
  fn select(&self, accept_encoding: &str) -> Option<Arc<dyn Encoder>> {
    let entries = parse_quality_values(accept_encoding);
    let named: HashSet<&str> = entries
      .iter()
      .filter(|e| e.value != "*")
      .map(|e| e.value.as_str())
      .collect();

    let mut i = 0;
    while i < entries.len() {
      let priority = entries[i].priority;
      if priority == QValue::MIN {
        // q=0 means explicitly not acceptable.
        break;
      }

      // Gather the whole equal-priority group.
      let mut group_end = i;
      while group_end < entries.len() && entries[group_end].priority == priority {
        group_end += 1;
      }

      let mut best: Option<usize> = None;
      for entry in &entries[i..group_end] {
        for (index, encoder) in self.encoders.iter().enumerate() {
          let matches = if entry.value == "*" {
            !named.contains(encoder.encoding())
          } else {
            encoder.encoding().eq_ignore_ascii_case(&entry.value)
          };

          if matches && best.map(|b| index < b).unwrap_or(true) {
            best = Some(index);
          }
        }
      }

      if let Some(index) = best {
        return self.encoders.get(index).cloned();
      }

      i = group_end;
    }

    None
  }
}

impl Middleware for CompressMiddleware {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    if response.is_hijacked() || request.header(HeaderName::Upgrade).is_some() {
      return next.run(request, response);
    }

    let Some(accept_encoding) = request.header(HeaderName::AcceptEncoding).map(str::to_string)
    else {
      return next.run(request, response);
    };

    let Some(encoder) = self.select(&accept_encoding) else {
      return next.run(request, response);
    };

    // Drop the header so a second compression layer downstream cannot
    // compress twice.
    request.head_mut().headers_mut().remove(HeaderName::AcceptEncoding);

    response.set_header(HeaderName::ContentEncoding, encoder.encoding());
    // A pre-computed length no longer matches the compressed body.
    response.headers_mut().remove(HeaderName::ContentLength);
    response.set_writer(move |child| Box::new(CompressWriter::new(encoder, child)));

    next.run(request, response)
  }
}

enum CompressState {
  /// Body writes have not started; the child is still directly reachable.
  Pending(Box<dyn ResponseWriter>),
  Active(Box<dyn ResponseWriter>),
  Closed,
}

/// The chained compression writer. Construction of the actual encoder is
/// deferred to the first body write so the pre-write hook still reaches the
/// child, and so the encoder's magic bytes cannot precede the headers.
struct CompressWriter {
  encoder: Arc<dyn Encoder>,
  state: CompressState,
}

impl CompressWriter {
  fn new(encoder: Arc<dyn Encoder>, child: Box<dyn ResponseWriter>) -> CompressWriter {
    CompressWriter { encoder, state: CompressState::Pending(child) }
  }

  fn activate(&mut self) -> io::Result<()> {
    if matches!(self.state, CompressState::Pending(_)) {
      let CompressState::Pending(child) =
        std::mem::replace(&mut self.state, CompressState::Closed)
      else {
        return Ok(());
      };
      self.state = CompressState::Active(self.encoder.new_writer(child)?);
    }
    Ok(())
  }
}

impl Write for CompressWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.activate()?;
    match &mut self.state {
      CompressState::Active(writer) => writer.write(buf),
      CompressState::Pending(_) => util::unreachable(),
      CompressState::Closed => Err(io::Error::new(io::ErrorKind::BrokenPipe, "write after close")),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    match &mut self.state {
      CompressState::Active(writer) => writer.flush(),
      _ => Ok(()),
    }
  }
}

impl ResponseWriter for CompressWriter {
  fn pre_write(&mut self, headers: &mut Headers, data: &[u8]) -> io::Result<()> {
    if !data.is_empty() && !headers.contains(HeaderName::ContentType) {
      headers.set(HeaderName::ContentType, sniff_content_type(data).as_str());
    }

    match &mut self.state {
      CompressState::Pending(child) => child.pre_write(headers, data),
      CompressState::Active(writer) => writer.pre_write(headers, data),
      CompressState::Closed => Ok(()),
    }
  }

  fn close(&mut self) -> io::Result<()> {
    match std::mem::replace(&mut self.state, CompressState::Closed) {
      CompressState::Pending(mut child) => child.close(),
      CompressState::Active(mut writer) => writer.close(),
      CompressState::Closed => Ok(()),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn middleware() -> CompressMiddleware {
    struct Named(&'static str);
    impl Encoder for Named {
      fn encoding(&self) -> &'static str {
        self.0
      }
      fn new_writer(&self, child: Box<dyn ResponseWriter>) -> io::Result<Box<dyn ResponseWriter>> {
        Ok(child)
      }
    }

    CompressMiddleware::new(vec![
      Arc::new(Named("br")),
      Arc::new(Named("zstd")),
      Arc::new(Named("gzip")),
    ])
  }

  fn selected(accept: &str) -> Option<&'static str> {
    middleware().select(accept).map(|e| e.encoding())
  }

  #[test]
  fn wildcard_beats_lower_priority_specific() {
    assert_eq!(selected("gzip;q=0.8, *;q=1.0"), Some("br"));
  }

  #[test]
  fn specific_token_selection() {
    assert_eq!(selected("gzip"), Some("gzip"));
    assert_eq!(selected("zstd;q=0.5, gzip;q=0.9"), Some("gzip"));
  }

  #[test]
  fn equal_priority_prefers_lowest_configured_index() {
    assert_eq!(selected("gzip, zstd"), Some("zstd"));
  }

  #[test]
  fn unknown_encodings_pass_through() {
    assert_eq!(selected("compress"), None);
    assert_eq!(selected("identity"), None);
  }

  #[test]
  fn q_zero_excludes() {
    assert_eq!(selected("gzip;q=0"), None);
    // The wildcard does not resurrect an explicitly excluded encoding.
    assert_eq!(selected("br;q=0, zstd;q=0, gzip;q=0, *"), None);
    assert_eq!(selected("br;q=0, *"), Some("zstd"));
  }
}
