//! Request body parsing.
//!
//! Populates `Request::data` from the body according to its `Content-Type`:
//! JSON, url-encoded forms or multipart forms. Oversize bodies yield 413,
//! malformed ones 400; both abort the chain before the handler runs.

use crate::data::{Data, File};
use crate::http::headers::HeaderName;
use crate::http::mime::{sniff_content_type, MimeType};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::middleware::{Middleware, Next};
use crate::multipart;
use crate::petrel_error::{BodyParseError, PetrelResult};
use std::collections::HashMap;
use std::io::Read;

const DEFAULT_MAX_UPLOAD_MIB: u64 = 10;

/// Core middleware turning the request body into [Data].
pub struct ParseMiddleware {
  /// Body size cap in bytes.
  max_upload_size: u64,
}

impl Default for ParseMiddleware {
  fn default() -> Self {
    ParseMiddleware::new(DEFAULT_MAX_UPLOAD_MIB)
  }
}

/// Inserts a scalar field, turning repeated keys into sequences.
fn insert_flat(map: &mut HashMap<String, Data>, key: &str, value: String) {
  let merged = match map.remove(key) {
    None => Data::String(value),
    Some(Data::String(first)) => Data::Sequence(vec![Data::String(first), Data::String(value)]),
    Some(Data::Sequence(mut seq)) => {
      seq.push(Data::String(value));
      Data::Sequence(seq)
    }
    Some(_) => Data::String(value),
  };
  map.insert(key.to_string(), merged);
}

fn parse_form_urlencoded(body: &[u8]) -> Result<Data, BodyParseError> {
  let text = std::str::from_utf8(body)
    .map_err(|_| BodyParseError::MalformedBody("form body is not valid utf-8".to_string()))?;

  let mut map = HashMap::new();
  for pair in text.split('&') {
    if pair.is_empty() {
      continue;
    }
    let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
    let key = urlencoding::decode(raw_key)
      .map_err(|_| BodyParseError::MalformedBody(format!("invalid url encoding in {:?}", raw_key)))?;
    let raw_value_spaced = raw_value.replace('+', " ");
    let value = urlencoding::decode(&raw_value_spaced).map_err(|_| {
      BodyParseError::MalformedBody(format!("invalid url encoding in {:?}", raw_value))
    })?;
    insert_flat(&mut map, &key, value.to_string());
  }

  Ok(Data::Mapping(map))
}

fn parse_multipart(body: &[u8], content_type: &str) -> Result<Data, BodyParseError> {
  let boundary = multipart::boundary(content_type)
    .ok_or_else(|| BodyParseError::MalformedMultipart("missing boundary parameter".to_string()))?;

  let mut map: HashMap<String, Data> = HashMap::new();
  for part in multipart::parse(body, &boundary)? {
    if part.is_file() {
      let content_type = part
        .content_type
        .as_deref()
        .map(MimeType::parse)
        .unwrap_or_else(|| sniff_content_type(&part.content));
      let file = File {
        filename: part.filename.unwrap_or_default(),
        content_type,
        content: part.content,
      };
      let merged = match map.remove(&part.name) {
        Some(Data::Files(mut files)) => {
          files.push(file);
          Data::Files(files)
        }
        _ => Data::Files(vec![file]),
      };
      map.insert(part.name, merged);
    } else {
      let value = String::from_utf8(part.content).map_err(|_| {
        BodyParseError::MalformedMultipart(format!("field {:?} is not valid utf-8", part.name))
      })?;
      insert_flat(&mut map, &part.name, value);
    }
  }

  Ok(Data::Mapping(map))
}

impl ParseMiddleware {
  /// Body size cap in mebibytes. The default is 10.
  pub fn new(max_upload_mib: u64) -> ParseMiddleware {
    ParseMiddleware { max_upload_size: max_upload_mib * 1024 * 1024 }
  }

  /// Reads the whole body, up to one byte over the cap so overruns are
  /// detectable without draining an unbounded stream.
  fn read_capped(&self, request: &Request) -> PetrelResult<Option<Vec<u8>>> {
    let Some(body) = request.body() else {
      return Ok(None);
    };

    let mut buffer = Vec::new();
    Read::take(body, self.max_upload_size + 1).read_to_end(&mut buffer)?;
    if buffer.len() as u64 > self.max_upload_size {
      return Err(BodyParseError::PayloadTooLarge(self.max_upload_size).into());
    }

    Ok(Some(buffer))
  }

  fn parse_body(&self, request: &Request, body: &[u8]) -> Result<Data, BodyParseError> {
    match request.head().content_type() {
      Some(MimeType::ApplicationJson) => {
        let value: serde_json::Value = serde_json::from_slice(body)
          .map_err(|e| BodyParseError::MalformedBody(e.to_string()))?;
        Ok(Data::from(value))
      }
      Some(MimeType::MultipartFormData) => {
        let raw_content_type = request.header(HeaderName::ContentType).unwrap_or_default();
        parse_multipart(body, raw_content_type)
      }
      // Anything else is treated as an url-encoded form.
      _ => parse_form_urlencoded(body),
    }
  }
}

impl Middleware for ParseMiddleware {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    // Already parsed by an earlier middleware.
    if request.data().is_some() {
      return next.run(request, response);
    }

    let body = match self.read_capped(request) {
      Ok(None) => return next.run(request, response),
      Ok(Some(body)) => body,
      Err(err) => {
        response.error(err);
        return Ok(());
      }
    };

    if body.is_empty() {
      return next.run(request, response);
    }

    match self.parse_body(request, &body) {
      Ok(data) => {
        request.set_data(data);
        next.run(request, response)
      }
      Err(err) => {
        response.error(err);
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn urlencoded_flat_and_multi() {
    let data = parse_form_urlencoded(b"name=petrel&tag=a&tag=b&greeting=hello+world").unwrap();
    assert_eq!(data.get("name").and_then(Data::as_str), Some("petrel"));
    assert_eq!(data.get("greeting").and_then(Data::as_str), Some("hello world"));
    let tags = data.get("tag").and_then(Data::as_sequence).unwrap();
    assert_eq!(tags.len(), 2);
  }

  #[test]
  fn multipart_files_carry_detected_mime() {
    let mut body = Vec::new();
    body.extend_from_slice(b"--b\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"scalar\"\r\n\r\nvalue\r\n");
    body.extend_from_slice(b"--b\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"up\"; filename=\"f.bin\"\r\n\r\n");
    body.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x00]);
    body.extend_from_slice(b"\r\n--b--\r\n");

    let data = parse_multipart(&body, "multipart/form-data; boundary=b").unwrap();
    assert_eq!(data.get("scalar").and_then(Data::as_str), Some("value"));

    let files = data.get("up").and_then(Data::as_files).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "f.bin");
    assert_eq!(files[0].content_type, MimeType::ApplicationGzip);
    assert_eq!(files[0].size(), 4);
  }
}
