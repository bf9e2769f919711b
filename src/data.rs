//! Dynamically typed request data.
//!
//! Parsed request bodies, query strings and walker inputs are arbitrary nested
//! mapping/sequence/scalar values. [Data] models them as a tagged variant so
//! the walker can pattern match at each step without any runtime reflection.

use crate::http::mime::MimeType;
use std::collections::HashMap;

/// One uploaded file out of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
  /// The client supplied file name, may be empty.
  pub filename: String,
  /// Media type, taken from the part header or sniffed from the content.
  pub content_type: MimeType,
  /// The raw content.
  pub content: Vec<u8>,
}

impl File {
  pub fn size(&self) -> u64 {
    self.content.len() as u64
  }
}

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Data {
  #[default]
  Null,
  Bool(bool),
  Number(f64),
  String(String),
  Sequence(Vec<Data>),
  Mapping(HashMap<String, Data>),
  /// Leaf produced by multipart file fields.
  Files(Vec<File>),
}

impl Data {
  pub fn is_null(&self) -> bool {
    matches!(self, Data::Null)
  }

  pub fn is_mapping(&self) -> bool {
    matches!(self, Data::Mapping(_))
  }

  pub fn is_sequence(&self) -> bool {
    matches!(self, Data::Sequence(_))
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Data::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Data::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Data::String(s) => Some(s.as_str()),
      _ => None,
    }
  }

  pub fn as_sequence(&self) -> Option<&[Data]> {
    match self {
      Data::Sequence(seq) => Some(seq.as_slice()),
      _ => None,
    }
  }

  pub fn as_mapping(&self) -> Option<&HashMap<String, Data>> {
    match self {
      Data::Mapping(map) => Some(map),
      _ => None,
    }
  }

  pub fn as_files(&self) -> Option<&[File]> {
    match self {
      Data::Files(files) => Some(files.as_slice()),
      _ => None,
    }
  }

  /// Mapping lookup. None when self is not a mapping or the key is absent.
  pub fn get(&self, key: &str) -> Option<&Data> {
    self.as_mapping().and_then(|map| map.get(key))
  }

  /// Sequence lookup. None when self is not a sequence or out of bounds.
  pub fn idx(&self, index: usize) -> Option<&Data> {
    self.as_sequence().and_then(|seq| seq.get(index))
  }
}

impl From<serde_json::Value> for Data {
  fn from(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Null => Data::Null,
      serde_json::Value::Bool(b) => Data::Bool(b),
      serde_json::Value::Number(n) => Data::Number(n.as_f64().unwrap_or_default()),
      serde_json::Value::String(s) => Data::String(s),
      serde_json::Value::Array(arr) => Data::Sequence(arr.into_iter().map(Data::from).collect()),
      serde_json::Value::Object(map) => {
        Data::Mapping(map.into_iter().map(|(k, v)| (k, Data::from(v))).collect())
      }
    }
  }
}

impl From<bool> for Data {
  fn from(value: bool) -> Self {
    Data::Bool(value)
  }
}

impl From<f64> for Data {
  fn from(value: f64) -> Self {
    Data::Number(value)
  }
}

impl From<i64> for Data {
  fn from(value: i64) -> Self {
    Data::Number(value as f64)
  }
}

impl From<&str> for Data {
  fn from(value: &str) -> Self {
    Data::String(value.to_string())
  }
}

impl From<String> for Data {
  fn from(value: String) -> Self {
    Data::String(value)
  }
}

impl From<Vec<Data>> for Data {
  fn from(value: Vec<Data>) -> Self {
    Data::Sequence(value)
  }
}

impl From<HashMap<String, Data>> for Data {
  fn from(value: HashMap<String, Data>) -> Self {
    Data::Mapping(value)
  }
}

impl From<Vec<File>> for Data {
  fn from(value: Vec<File>) -> Self {
    Data::Files(value)
  }
}

impl FromIterator<(String, Data)> for Data {
  fn from_iter<T: IntoIterator<Item = (String, Data)>>(iter: T) -> Self {
    Data::Mapping(iter.into_iter().collect())
  }
}

/// Shorthand for building a [Data::Mapping] in tests and handlers.
#[macro_export]
macro_rules! data_map {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(map.insert($key.to_string(), $crate::data::Data::from($value));)*
        $crate::data::Data::Mapping(map)
    }};
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn json_conversion() {
    let json: serde_json::Value =
      serde_json::from_str(r#"{"a": [1, "two", null], "b": true}"#).unwrap();
    let data = Data::from(json);

    assert_eq!(data.get("a").and_then(|a| a.idx(0)).and_then(Data::as_f64), Some(1.0));
    assert_eq!(data.get("a").and_then(|a| a.idx(1)).and_then(Data::as_str), Some("two"));
    assert!(data.get("a").and_then(|a| a.idx(2)).unwrap().is_null());
    assert_eq!(data.get("b").and_then(Data::as_bool), Some(true));
    assert!(data.get("c").is_none());
  }

  #[test]
  fn data_map_macro() {
    let data = data_map! {"name" => "petrel", "stars" => 5i64};
    assert_eq!(data.get("name").and_then(Data::as_str), Some("petrel"));
    assert_eq!(data.get("stars").and_then(Data::as_f64), Some(5.0));
  }
}
