//! Multipart/form-data framing.
//!
//! A byte-level tokeniser over a fully buffered body. Size limits are the
//! caller's concern; this module only deals with the framing.

use crate::petrel_error::BodyParseError;

/// One decoded part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
  /// The `name` parameter of the part's Content-Disposition.
  pub name: String,
  /// The `filename` parameter, present for file parts.
  pub filename: Option<String>,
  /// The part's own Content-Type header, if any.
  pub content_type: Option<String>,
  pub content: Vec<u8>,
}

impl Part {
  pub fn is_file(&self) -> bool {
    self.filename.is_some()
  }
}

/// Extracts the boundary parameter out of a `Content-Type` header value.
pub fn boundary(content_type: &str) -> Option<String> {
  for param in content_type.split(';').skip(1) {
    let param = param.trim();
    if let Some(value) = param.strip_prefix("boundary=") {
      let value = value.trim_matches('"');
      if !value.is_empty() {
        return Some(value.to_string());
      }
    }
  }
  None
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
  if needle.is_empty() || haystack.len() < from + needle.len() {
    return None;
  }
  haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

fn malformed(what: &str) -> BodyParseError {
  BodyParseError::MalformedMultipart(what.to_string())
}

/// Parses a complete multipart body against its boundary.
pub fn parse(body: &[u8], boundary: &str) -> Result<Vec<Part>, BodyParseError> {
  let delimiter = format!("--{}", boundary).into_bytes();

  // The body must open with the first delimiter.
  let Some(start) = find(body, &delimiter, 0) else {
    return Err(malformed("missing opening boundary"));
  };

  let mut parts = Vec::new();
  let mut cursor = start + delimiter.len();

  loop {
    // After a delimiter: "--" closes the body, CRLF opens a part.
    if body[cursor..].starts_with(b"--") {
      return Ok(parts);
    }
    let Some(after_crlf) = body[cursor..].strip_prefix(b"\r\n") else {
      return Err(malformed("boundary not followed by CRLF"));
    };
    let header_start = body.len() - after_crlf.len();

    // Headers run until the empty line.
    let Some(blank) = find(body, b"\r\n\r\n", header_start) else {
      return Err(malformed("part headers not terminated"));
    };
    let header_block = std::str::from_utf8(&body[header_start..blank])
      .map_err(|_| malformed("part headers are not valid utf-8"))?;

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in header_block.split("\r\n") {
      let Some((header_name, header_value)) = line.split_once(':') else {
        return Err(malformed("part header line without a colon"));
      };
      let header_value = header_value.trim();

      if header_name.eq_ignore_ascii_case("Content-Disposition") {
        for param in header_value.split(';').skip(1) {
          let param = param.trim();
          if let Some(value) = param.strip_prefix("name=") {
            name = Some(value.trim_matches('"').to_string());
          } else if let Some(value) = param.strip_prefix("filename=") {
            filename = Some(value.trim_matches('"').to_string());
          }
        }
      } else if header_name.eq_ignore_ascii_case("Content-Type") {
        content_type = Some(header_value.to_string());
      }
    }

    let Some(name) = name else {
      return Err(malformed("part without a field name"));
    };

    // Content runs until the next delimiter, minus its leading CRLF.
    let content_start = blank + 4;
    let Some(next_delimiter) = find(body, &delimiter, content_start) else {
      return Err(malformed("missing closing boundary"));
    };
    if next_delimiter < content_start + 2 {
      return Err(malformed("part content not terminated by CRLF"));
    }
    let content = body[content_start..next_delimiter - 2].to_vec();

    parts.push(Part { name, filename, content_type, content });
    cursor = next_delimiter + delimiter.len();
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn sample_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"--xyz\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"title\"\r\n");
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(b"hello\r\n");
    body.extend_from_slice(b"--xyz\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n");
    body.extend_from_slice(b"Content-Type: text/plain\r\n");
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(b"file content\r\n");
    body.extend_from_slice(b"--xyz--\r\n");
    body
  }

  #[test]
  fn boundary_extraction() {
    assert_eq!(boundary("multipart/form-data; boundary=xyz"), Some("xyz".to_string()));
    assert_eq!(boundary("multipart/form-data; boundary=\"quoted\""), Some("quoted".to_string()));
    assert_eq!(boundary("multipart/form-data"), None);
  }

  #[test]
  fn parses_fields_and_files() {
    let parts = parse(&sample_body(), "xyz").unwrap();
    assert_eq!(parts.len(), 2);

    assert_eq!(parts[0].name, "title");
    assert!(!parts[0].is_file());
    assert_eq!(parts[0].content, b"hello");

    assert_eq!(parts[1].name, "doc");
    assert_eq!(parts[1].filename.as_deref(), Some("a.txt"));
    assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
    assert_eq!(parts[1].content, b"file content");
  }

  #[test]
  fn binary_content_with_crlf_survives() {
    let mut body = Vec::new();
    body.extend_from_slice(b"--b\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"bin\"; filename=\"x\"\r\n");
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(b"a\r\nb\x00c\r\n");
    body.extend_from_slice(b"--b--\r\n");

    let parts = parse(&body, "b").unwrap();
    assert_eq!(parts[0].content, b"a\r\nb\x00c");
  }

  #[test]
  fn framing_errors() {
    assert!(parse(b"no boundary here", "xyz").is_err());
    assert!(parse(b"--xyz\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nunclosed", "xyz").is_err());
    assert!(parse(b"--xyz\r\nNoColonHeader\r\n\r\nx\r\n--xyz--", "xyz").is_err());
  }
}
