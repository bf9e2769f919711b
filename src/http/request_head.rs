//! Parsing of the HTTP request head.

use crate::http::headers::{HeaderLike, HeaderName, Headers};
use crate::http::method::Method;
use crate::http::mime::MimeType;
use crate::petrel_error::{PetrelError, PetrelResult, RequestHeadParsingError};
use crate::stream::ConnectionStream;
use crate::util::{unwrap_ok, unwrap_some};
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;

/// HTTP versions petrel speaks.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[non_exhaustive]
pub enum HttpVersion {
  /// One connection per request, no keep-alive, no chunked transfer.
  Http10,
  /// Keep-alive, chunked transfer encoding, WebSocket upgrades.
  Http11,
}

impl HttpVersion {
  pub fn as_str(&self) -> &'static str {
    match self {
      HttpVersion::Http10 => "HTTP/1.0",
      HttpVersion::Http11 => "HTTP/1.1",
    }
  }

  /// Parses the version token of the status line. Returns the input on error.
  pub fn try_from_net_str<T: AsRef<str>>(value: T) -> Result<Self, T> {
    match value.as_ref() {
      "HTTP/1.0" => Ok(HttpVersion::Http10),
      "HTTP/1.1" => Ok(HttpVersion::Http11),
      _ => Err(value),
    }
  }
}

impl Display for HttpVersion {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The parsed head of a request: status line and header block.
#[derive(Clone, Debug)]
pub struct RequestHead {
  method: Method,
  version: HttpVersion,
  /// The path to which the request was made, url decoding already applied.
  path: String,
  /// Query parameters, key=value in order of appearance, url decoded.
  query: Vec<(String, String)>,
  headers: Headers,
}

fn validate_raw_path(raw_path: &str) -> PetrelResult<()> {
  //https://datatracker.ietf.org/doc/html/rfc3986#section-3.3
  for n in raw_path.bytes() {
    match n {
      b'/' | b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'\'' | b'(' | b')' | b'*' | b'+'
      | b',' | b';' | b'=' | b':' | b'@' | b'%' | b'\\' => {}
      _ => {
        if !n.is_ascii_alphanumeric() {
          return Err(
            RequestHeadParsingError::InvalidPath(raw_path.to_string()).into(),
          );
        }
      }
    }
  }

  Ok(())
}

fn parse_raw_query(raw_query: &str) -> PetrelResult<Vec<(String, String)>> {
  if raw_query.is_empty() {
    return Ok(Vec::new());
  }

  let mut query = Vec::new();
  for pair in raw_query.split('&') {
    if pair.is_empty() {
      return Err(RequestHeadParsingError::InvalidQueryString(raw_query.to_string()).into());
    }

    let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));

    let key = urlencoding::decode(raw_key)
      .map_err(|_| RequestHeadParsingError::InvalidQueryString(raw_query.to_string()))?
      .to_string();
    let value = urlencoding::decode(raw_value)
      .map_err(|_| RequestHeadParsingError::InvalidQueryString(raw_query.to_string()))?
      .to_string();

    query.push((key, value));
  }

  Ok(query)
}

impl RequestHead {
  /// Reads and parses one request head from the stream. Does not touch the body.
  pub fn read(stream: &dyn ConnectionStream, max_head_buffer_size: usize) -> PetrelResult<Self> {
    let mut start_line_buf: Vec<u8> = Vec::with_capacity(256);
    let count = stream.read_until(0xA, max_head_buffer_size, &mut start_line_buf)?;

    if count == 0 {
      return Err(PetrelError::from_io_kind(ErrorKind::UnexpectedEof));
    }

    if count == max_head_buffer_size {
      return Err(RequestHeadParsingError::StatusLineTooLong(start_line_buf).into());
    }

    let start_line_string = std::str::from_utf8(&start_line_buf)
      .map_err(|_| RequestHeadParsingError::StatusLineContainsInvalidBytes)?;

    let status_line =
      start_line_string.strip_suffix("\r\n").ok_or(RequestHeadParsingError::StatusLineNoCRLF)?;

    let mut start_line = status_line.split(' ');

    let method = Method::from(unwrap_some(start_line.next()));

    let mut uri_iter =
      start_line.next().ok_or(RequestHeadParsingError::StatusLineNoWhitespace)?.splitn(2, '?');

    let version = start_line
      .next()
      .ok_or(RequestHeadParsingError::StatusLineNoWhitespace)
      .map(HttpVersion::try_from_net_str)?
      .map_err(|version| RequestHeadParsingError::HttpVersionNotSupported(version.to_string()))?;

    if start_line.next().is_some() {
      return Err(RequestHeadParsingError::StatusLineTooManyWhitespaces.into());
    }

    let raw_path = unwrap_some(uri_iter.next());
    validate_raw_path(raw_path)?;

    let path = urlencoding::decode(raw_path)
      .map_err(|_| RequestHeadParsingError::InvalidPathUrlEncoding(raw_path.to_string()))?
      .to_string();

    let raw_query = uri_iter.next().unwrap_or("");
    let query = parse_raw_query(raw_query)?;

    let mut headers = Headers::new();

    loop {
      let mut line_buf: Vec<u8> = Vec::with_capacity(256);
      let count = stream.read_until(0xA, max_head_buffer_size, &mut line_buf)?;

      if count == max_head_buffer_size {
        return Err(RequestHeadParsingError::HeaderLineTooLong(line_buf).into());
      }

      let line = std::str::from_utf8(&line_buf)
        .map_err(|_| RequestHeadParsingError::HeaderLineIsNotUsAscii)?;

      if line == "\r\n" {
        break;
      }

      let line = line.strip_suffix("\r\n").ok_or(RequestHeadParsingError::HeaderLineNoCRLF)?;

      let mut line_parts = line.splitn(2, ':');
      let name = unwrap_some(line_parts.next()).trim();

      if name.is_empty() {
        return Err(RequestHeadParsingError::HeaderNameEmpty.into());
      }

      let value = line_parts.next().ok_or(RequestHeadParsingError::HeaderValueMissing)?.trim();

      if value.is_empty() {
        return Err(RequestHeadParsingError::HeaderValueEmpty.into());
      }

      headers.add(HeaderName::from(name), value);
    }

    Ok(Self { method, version, path, query, headers })
  }

  /// Builds a head in memory. For tests and internal dispatches.
  pub fn synthetic(
    method: Method,
    path: impl AsRef<str>,
    headers: Headers,
  ) -> PetrelResult<Self> {
    let path = path.as_ref();
    let (raw_path, raw_query) = path.split_once('?').unwrap_or((path, ""));
    validate_raw_path(raw_path)?;
    Ok(Self {
      method,
      version: HttpVersion::Http11,
      path: unwrap_ok(urlencoding::decode(raw_path)).to_string(),
      query: parse_raw_query(raw_query)?,
      headers,
    })
  }

  pub fn version(&self) -> HttpVersion {
    self.version
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  /// The decoded path the request will be routed on.
  pub fn path(&self) -> &str {
    self.path.as_str()
  }

  /// Replace the path. Affects routing when called before dispatch.
  pub fn set_path(&mut self, path: impl ToString) {
    self.path = path.to_string();
  }

  /// Query parameters in order of appearance.
  pub fn query_pairs(&self) -> &[(String, String)] {
    self.query.as_slice()
  }

  pub fn headers(&self) -> &Headers {
    &self.headers
  }

  pub fn headers_mut(&mut self) -> &mut Headers {
    &mut self.headers
  }

  pub fn header(&self, name: impl HeaderLike) -> Option<&str> {
    self.headers.get(name)
  }

  /// The media type of the request body, parameters stripped.
  pub fn content_type(&self) -> Option<MimeType> {
    self.headers.get(HeaderName::ContentType).map(MimeType::parse)
  }

  /// True when this is an HTTP/1.1 upgrade request for the given protocol.
  pub fn is_upgrade_to(&self, protocol: &str) -> bool {
    self.version == HttpVersion::Http11
      && self
        .headers
        .get(HeaderName::Upgrade)
        .map(|v| v.eq_ignore_ascii_case(protocol))
        .unwrap_or(false)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn query_parsing() {
    let pairs = parse_raw_query("a=1&b=two&b=three&flag").unwrap();
    assert_eq!(
      pairs,
      vec![
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "two".to_string()),
        ("b".to_string(), "three".to_string()),
        ("flag".to_string(), "".to_string()),
      ]
    );
  }

  #[test]
  fn query_url_decoding() {
    let pairs = parse_raw_query("name=hello%20world").unwrap();
    assert_eq!(pairs, vec![("name".to_string(), "hello world".to_string())]);
  }

  #[test]
  fn invalid_query() {
    assert!(parse_raw_query("a=1&&b=2").is_err());
  }

  #[test]
  fn synthetic_head() {
    let head =
      RequestHead::synthetic(Method::Get, "/product/5?verbose=1", Headers::new()).unwrap();
    assert_eq!(head.path(), "/product/5");
    assert_eq!(head.query_pairs(), &[("verbose".to_string(), "1".to_string())]);
    assert_eq!(head.method(), &Method::Get);
  }
}
