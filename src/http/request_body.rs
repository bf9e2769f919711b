//! Request body readers.

use crate::util::{unwrap_poison, unwrap_some};
use std::fmt::{Debug, Formatter};
use std::io;
use std::io::{Cursor, Error, ErrorKind, Read, Take};
use std::ops::DerefMut;
use std::sync::{Arc, Mutex};

/// A shareable request body reader. Transfer encoding peculiarities are
/// handled internally; consumers just see a byte stream. All reads take
/// `&self`, the internal mutex serialises them.
#[derive(Debug, Clone)]
#[repr(transparent)]
pub struct RequestBody(Arc<Mutex<RequestBodyInner>>);

impl Eq for RequestBody {}
impl PartialEq for RequestBody {
  /// Bodies are equal only if they refer to the exact same underlying stream.
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl RequestBody {
  /// In-memory body for tests and mocks.
  pub fn from_slice<T: AsRef<[u8]>>(data: T) -> RequestBody {
    let data = data.as_ref().to_vec();
    let len = data.len() as u64;
    Self::with_content_length(Cursor::new(data), len)
  }

  /// Stream with a known length.
  pub fn with_content_length<T: Read + Send + 'static>(read: T, len: u64) -> RequestBody {
    RequestBody(Arc::new(Mutex::new(RequestBodyInner::Sized(SizedBody {
      err: false,
      data: (Box::new(read) as Box<dyn Read + Send>).take(len),
    }))))
  }

  /// Chunked transfer encoded stream, length unknown.
  pub fn chunked<T: Read + Send + 'static>(read: T) -> RequestBody {
    RequestBody(Arc::new(Mutex::new(RequestBodyInner::Chunked(ChunkedBody {
      read: Box::new(read) as Box<dyn Read + Send>,
      eof: false,
      err: false,
      remaining_chunk_length: 0,
    }))))
  }

  /// Same as `std::io::Read`.
  pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
    unwrap_poison(self.0.lock())?.deref_mut().read(buf)
  }

  /// Same as `std::io::Read`.
  pub fn read_to_end(&self, buf: &mut Vec<u8>) -> io::Result<usize> {
    unwrap_poison(self.0.lock())?.deref_mut().read_to_end(buf)
  }

  /// Same as `std::io::Read`.
  pub fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
    unwrap_poison(self.0.lock())?.deref_mut().read_exact(buf)
  }

  /// Bytes left until the body is fully consumed, where known.
  pub fn remaining(&self) -> io::Result<Option<u64>> {
    Ok(match unwrap_poison(self.0.lock())?.deref_mut() {
      RequestBodyInner::Sized(body) => Some(body.data.limit()),
      RequestBodyInner::Chunked(_) => None,
    })
  }

  /// Drains the body. Further reads yield EOF. Calling this twice is a noop.
  pub fn consume(&self) -> io::Result<()> {
    let mut discarding_buffer = [0; 0x4000];
    loop {
      let discarded = self.read(discarding_buffer.as_mut_slice()).or_else(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
          Ok(0)
        } else {
          Err(e)
        }
      })?;

      if discarded == 0 {
        return Ok(());
      }
    }
  }
}

impl Read for &RequestBody {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    RequestBody::read(self, buf)
  }
}

#[derive(Debug)]
enum RequestBodyInner {
  Sized(SizedBody),
  Chunked(ChunkedBody),
}

impl Read for RequestBodyInner {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    match self {
      RequestBodyInner::Sized(body) => body.read(buf),
      RequestBodyInner::Chunked(body) => body.read(buf),
    }
  }
}

struct SizedBody {
  err: bool,
  data: Take<Box<dyn Read + Send>>,
}

impl Read for SizedBody {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if self.err {
      return Err(Error::new(
        ErrorKind::BrokenPipe,
        "Transfer stream has failed due to previous error",
      ));
    }
    self.data.read(buf).inspect_err(|_| self.err = true)
  }
}

impl Debug for SizedBody {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("SizedBody(remaining={})", self.data.limit()))
  }
}

struct ChunkedBody {
  read: Box<dyn Read + Send>,
  eof: bool,
  err: bool,
  remaining_chunk_length: u64,
}

impl Debug for ChunkedBody {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!(
      "ChunkedBody(eof={} remaining_chunk_length={})",
      self.eof, self.remaining_chunk_length
    ))
  }
}

impl ChunkedBody {
  #[expect(clippy::indexing_slicing, reason = "we break if n >= 17")]
  fn read_internal(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() || self.eof {
      return Ok(0);
    }

    if self.remaining_chunk_length > 0 {
      let to_read = u64::min(buf.len() as u64, self.remaining_chunk_length) as usize;
      let read = self.read.read(&mut buf[..to_read])?;
      if read == 0 {
        return Err(Error::new(
          ErrorKind::UnexpectedEof,
          "chunked transfer encoding suggests more data",
        ));
      }

      self.remaining_chunk_length =
        unwrap_some(self.remaining_chunk_length.checked_sub(read as u64));
      if self.remaining_chunk_length == 0 {
        self.expect_crlf()?;
      }
      return Ok(read);
    }

    let mut small_buffer = [0u8; 32];
    let mut n = 0;
    loop {
      if n >= 17 {
        //If the client prefixes the chunk size with '0' characters then we just don't support that.
        return Err(Error::new(
          ErrorKind::InvalidData,
          "Chunk size is larger than 2^64 or malformed",
        ));
      }
      self.read.read_exact(&mut small_buffer[n..n + 1])?;
      if small_buffer[n] == b'\r' {
        self.read.read_exact(&mut small_buffer[n..n + 1])?;
        if small_buffer[n] != b'\n' {
          return Err(Error::new(ErrorKind::InvalidData, "Chunk size is malformed"));
        }
        break;
      }

      n += 1;
    }

    if n == 0 {
      return Err(Error::new(ErrorKind::InvalidData, "Chunk size is malformed"));
    }

    let str = std::str::from_utf8(&small_buffer[0..n])
      .map_err(|_| Error::new(ErrorKind::InvalidData, "Chunk size is malformed"))?;
    let chunk_len = u64::from_str_radix(str, 16)
      .map_err(|_| Error::new(ErrorKind::InvalidData, "Chunk size is malformed"))?;
    if chunk_len == 0 {
      self.expect_crlf()?;
      self.eof = true;
      return Ok(0);
    }

    self.remaining_chunk_length = chunk_len;
    self.read(buf)
  }

  fn expect_crlf(&mut self) -> io::Result<()> {
    let mut tiny_buffer = [0u8; 1];
    self.read.read_exact(&mut tiny_buffer)?;
    if tiny_buffer[0] != b'\r' {
      return Err(Error::new(ErrorKind::InvalidData, "Chunk trailer is malformed"));
    }
    self.read.read_exact(&mut tiny_buffer)?;
    if tiny_buffer[0] != b'\n' {
      return Err(Error::new(ErrorKind::InvalidData, "Chunk trailer is malformed"));
    }
    Ok(())
  }
}

impl Read for ChunkedBody {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if self.err {
      return Err(Error::new(
        ErrorKind::BrokenPipe,
        "Chunked transfer stream has failed due to previous error",
      ));
    }
    self.read_internal(buf).inspect_err(|_| self.err = true)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn sized_body_stops_at_length() {
    let body = RequestBody::with_content_length(Cursor::new(b"hello world".to_vec()), 5);
    let mut out = Vec::new();
    body.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"hello");
  }

  #[test]
  fn chunked_body_decodes() {
    let raw = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let body = RequestBody::chunked(Cursor::new(raw.to_vec()));
    let mut out = Vec::new();
    body.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"hello world");
  }

  #[test]
  fn chunked_body_rejects_garbage() {
    let raw = b"zz\r\nhello\r\n";
    let body = RequestBody::chunked(Cursor::new(raw.to_vec()));
    let mut out = Vec::new();
    assert!(body.read_to_end(&mut out).is_err());
  }

  #[test]
  fn consume_is_idempotent() {
    let body = RequestBody::from_slice(b"abc");
    body.consume().unwrap();
    body.consume().unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(body.read(&mut buf).unwrap(), 0);
  }
}
