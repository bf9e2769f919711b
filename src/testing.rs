//! In-process test support.
//!
//! [MockStream] stands in for a client connection: seed it with raw request
//! bytes, hand it to the server, then inspect the captured response with
//! [TestResponse]. No sockets involved.

use crate::http::headers::{HeaderLike, HeaderName, Headers};
use crate::http::request::Request;
use crate::http::request_body::RequestBody;
use crate::http::request_head::{HttpVersion, RequestHead};
use crate::http::response::Response;
use crate::http::method::Method;
use crate::middleware::{Handler, Middleware, Next};
use crate::petrel_error::{PetrelError, PetrelResult};
use crate::server::Server;
use crate::stream::{ConnectionStream, IntoConnectionStream};
use std::collections::VecDeque;
use std::io::{Cursor, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};

/// An in-memory bidirectional stream. Reads pop from the seeded data, writes
/// accumulate into a shared buffer.
#[derive(Debug, Clone)]
pub struct MockStream {
  read_data: Arc<Mutex<VecDeque<u8>>>,
  write_data: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
  pub fn with_str(data: &str) -> Self {
    Self::with_data(data.bytes().collect::<Vec<u8>>())
  }

  pub fn with_data(data: impl Into<VecDeque<u8>>) -> Self {
    Self { read_data: Arc::new(Mutex::new(data.into())), write_data: Arc::new(Mutex::new(Vec::new())) }
  }

  pub fn without_data() -> Self {
    Self::with_data(VecDeque::new())
  }

  pub fn copy_written_data(&self) -> Vec<u8> {
    self.write_data.lock().map(|d| d.clone()).unwrap_or_default()
  }

  pub fn copy_written_data_to_string(&self) -> String {
    String::from_utf8_lossy(&self.copy_written_data()).to_string()
  }

  pub fn to_stream(&self) -> Box<dyn ConnectionStream> {
    self.clone().into_connection_stream()
  }
}

impl IntoConnectionStream for MockStream {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream> {
    let cl = self.clone();
    (Box::new(cl) as Box<dyn Read + Send>, Box::new(self) as Box<dyn Write + Send>)
      .into_connection_stream()
  }
}

impl Write for MockStream {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.write_data.lock().map_err(|_| std::io::Error::new(ErrorKind::Other, "poisoned"))?.write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

impl Read for MockStream {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut data =
      self.read_data.lock().map_err(|_| std::io::Error::new(ErrorKind::Other, "poisoned"))?;

    let mut bytes_written: usize = 0;
    for byte in buf {
      if let Some(new_byte) = data.pop_front() {
        *byte = new_byte;
        bytes_written += 1;
      } else {
        break;
      }
    }

    Ok(bytes_written)
  }
}

/// A parsed response captured off a mock stream.
#[derive(Debug)]
pub struct TestResponse {
  pub status: u16,
  pub reason: String,
  pub headers: Headers,
  pub body: Vec<u8>,
}

impl TestResponse {
  /// Parses raw response bytes, decoding a chunked body where announced.
  pub fn parse(raw: &[u8]) -> PetrelResult<TestResponse> {
    let header_end = raw
      .windows(4)
      .position(|w| w == b"\r\n\r\n")
      .ok_or_else(|| PetrelError::msg("response has no header terminator"))?;

    let head = std::str::from_utf8(&raw[..header_end])
      .map_err(|_| PetrelError::msg("response head is not valid utf-8"))?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap_or("");
    let mut status_parts = status_line.splitn(3, ' ');
    let _version = status_parts.next().unwrap_or("");
    let status: u16 = status_parts
      .next()
      .and_then(|s| s.parse().ok())
      .ok_or_else(|| PetrelError::msg("response status line has no code"))?;
    let reason = status_parts.next().unwrap_or("").to_string();

    let mut headers = Headers::new();
    for line in lines {
      let Some((name, value)) = line.split_once(':') else {
        return Err(PetrelError::msg("response header line without a colon"));
      };
      headers.add(name.trim(), value.trim());
    }

    let raw_body = &raw[header_end + 4..];
    let body = if raw_body.is_empty() {
      Vec::new()
    } else if headers.get(HeaderName::TransferEncoding) == Some("chunked") {
      let decoder = RequestBody::chunked(Cursor::new(raw_body.to_vec()));
      let mut decoded = Vec::new();
      decoder.read_to_end(&mut decoded)?;
      decoded
    } else {
      let length = headers
        .get(HeaderName::ContentLength)
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(raw_body.len());
      raw_body.iter().take(length).copied().collect()
    };

    Ok(TestResponse { status, reason, headers, body })
  }

  pub fn header(&self, name: impl HeaderLike) -> Option<&str> {
    self.headers.get(name)
  }

  pub fn body_string(&self) -> String {
    String::from_utf8_lossy(&self.body).to_string()
  }

  pub fn body_json(&self) -> PetrelResult<serde_json::Value> {
    Ok(serde_json::from_slice(&self.body)?)
  }
}

/// Sends raw request bytes through the server on a fresh in-memory
/// connection and parses the response.
pub fn send_request(server: &Server, raw: &str) -> PetrelResult<TestResponse> {
  let stream = MockStream::with_str(raw);
  server.handle_connection(stream.to_stream())?;
  TestResponse::parse(&stream.copy_written_data())
}

/// Convenience for the common one-liner: request line + headers, no body.
pub fn get(server: &Server, path: &str) -> PetrelResult<TestResponse> {
  send_request(server, &format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path))
}

/// Builds a request object without a connection, for exercising middleware
/// and handlers directly.
pub fn synthetic_request(method: Method, path: &str) -> PetrelResult<Request> {
  let head = RequestHead::synthetic(method, path, Headers::new())?;
  Ok(Request::new("127.0.0.1:40000", head, None))
}

/// Like [synthetic_request] with headers and an in-memory body.
pub fn synthetic_request_with(
  method: Method,
  path: &str,
  headers: Headers,
  body: &[u8],
) -> PetrelResult<Request> {
  let head = RequestHead::synthetic(method, path, headers)?;
  let body = if body.is_empty() { None } else { Some(RequestBody::from_slice(body)) };
  Ok(Request::new("127.0.0.1:40000", head, body))
}

/// A response writing into a mock stream, plus access to the bytes it
/// produced. For middleware tests.
pub fn capture_response() -> (Response, MockStream) {
  let mock = MockStream::without_data();
  (Response::new(mock.to_stream(), HttpVersion::Http11), mock)
}

/// Runs a single middleware around a terminal handler, outside of any
/// router or server.
pub fn run_middleware<M: Middleware, H: Handler>(
  middleware: &M,
  request: &mut Request,
  response: &mut Response,
  handler: &H,
) -> PetrelResult<()> {
  middleware.handle(request, response, &Next::new(&[], handler))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn parse_identity_response() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello";
    let response = TestResponse::parse(raw).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.reason, "OK");
    assert_eq!(response.header(HeaderName::ContentType), Some("text/plain"));
    assert_eq!(response.body_string(), "hello");
  }

  #[test]
  fn parse_chunked_response() {
    let raw =
      b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let response = TestResponse::parse(raw).unwrap();
    assert_eq!(response.body_string(), "hello world");
  }

  #[test]
  fn mock_stream_round_trip() {
    let mock = MockStream::with_str("abc");
    let stream = mock.to_stream();

    let mut buf = [0u8; 3];
    stream.as_stream_read().read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"abc");

    stream.as_stream_write().write_all(b"out").unwrap();
    stream.as_stream_write().flush().unwrap();
    assert_eq!(mock.copy_written_data_to_string(), "out");
  }
}
