//! Quality values and multi-value quality headers.
//!
//! Used by content negotiation: compression encoder selection
//! (`Accept-Encoding`) and language negotiation (`Accept-Language`).

use std::fmt::{Display, Formatter};

/// QValue is defined as a fixed point number with up to 3 digits
/// after comma, with a valid range from 0 to 1.
/// We represent this as an u16 from 0 to 1000.
#[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Debug, Hash)]
#[repr(transparent)]
pub struct QValue(u16);

impl QValue {
  /// q=1.0
  pub const MAX: QValue = QValue(1000);

  /// q=0.0
  pub const MIN: QValue = QValue(0);

  /// Parses the QValue in http header representation.
  /// Note: this is without the "q=" prefix!
  /// Returns none if the value is either out of bounds or otherwise invalid.
  pub fn parse(qvalue: impl AsRef<str>) -> Option<QValue> {
    let qvalue = qvalue.as_ref();
    match qvalue.len() {
      1 => match qvalue {
        "1" => Some(QValue(1000)),
        "0" => Some(QValue(0)),
        _ => None,
      },
      3..=5 => {
        if !qvalue.starts_with("0.") {
          // Only 1.0, 1.00 and 1.000 remain legal.
          if matches!(qvalue, "1.0" | "1.00" | "1.000") {
            return Some(QValue(1000));
          }
          return None;
        }

        let digits = &qvalue[2..];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
          return None;
        }

        let scale = match digits.len() {
          1 => 100,
          2 => 10,
          _ => 1,
        };

        digits.parse::<u16>().ok().map(|value| QValue(value * scale))
      }
      _ => None,
    }
  }

  /// This QValue as an u16 from 0 to 1000. 1000 corresponds to q=1.0.
  pub const fn as_u16(&self) -> u16 {
    self.0
  }

  /// Builds a QValue from an u16, clamping anything above 1000.
  pub const fn from_clamped(qvalue: u16) -> QValue {
    if qvalue > 1000 {
      return QValue(1000);
    }

    QValue(qvalue)
  }
}

impl Default for QValue {
  fn default() -> Self {
    QValue::MAX
  }
}

impl Display for QValue {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.0 == 1000 {
      return f.write_str("1.0");
    }
    if self.0 == 0 {
      return f.write_str("0.0");
    }
    // Strip trailing zeroes down to one decimal digit.
    let mut digits = self.0;
    let mut width = 3usize;
    while width > 1 && digits % 10 == 0 {
      digits /= 10;
      width -= 1;
    }
    write!(f, "0.{:0width$}", digits, width = width)
  }
}

/// One entry of a multi-value quality header.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QualityValue {
  /// The token, whitespace stripped, `q` parameter removed.
  pub value: String,
  /// The priority of the token.
  pub priority: QValue,
}

/// Parses a comma separated header value with optional `;q=` weights, e.g.
/// `Accept-Encoding: gzip;q=0.8, br, *;q=0.1`.
///
/// A missing `q` parameter means priority 1.0; a present but malformed one
/// means priority 0. The result is sorted by priority descending, entries of
/// equal priority keep their order of appearance.
pub fn parse_quality_values(header: impl AsRef<str>) -> Vec<QualityValue> {
  let mut entries = Vec::new();
  for token in header.as_ref().split(',') {
    let token = token.trim();
    if token.is_empty() {
      continue;
    }

    let (value, priority) = match token.split_once(';') {
      None => (token, QValue::MAX),
      Some((value, params)) => {
        let params = params.trim();
        let priority = match params.strip_prefix("q=") {
          // q present but unparseable counts as q=0.
          Some(qvalue) => QValue::parse(qvalue.trim()).unwrap_or(QValue::MIN),
          None => QValue::MAX,
        };
        (value.trim(), priority)
      }
    };

    entries.push(QualityValue { value: value.to_string(), priority });
  }

  entries.sort_by(|a, b| b.priority.cmp(&a.priority));
  entries
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn parse_qvalue_bounds() {
    assert_eq!(QValue::parse("1"), Some(QValue::MAX));
    assert_eq!(QValue::parse("0"), Some(QValue::MIN));
    assert_eq!(QValue::parse("1.0"), Some(QValue::MAX));
    assert_eq!(QValue::parse("1.000"), Some(QValue::MAX));
    assert_eq!(QValue::parse("0.5"), Some(QValue::from_clamped(500)));
    assert_eq!(QValue::parse("0.05"), Some(QValue::from_clamped(50)));
    assert_eq!(QValue::parse("0.005"), Some(QValue::from_clamped(5)));
    assert_eq!(QValue::parse("1.5"), None);
    assert_eq!(QValue::parse("2"), None);
    assert_eq!(QValue::parse(""), None);
    assert_eq!(QValue::parse("0.0000"), None);
    assert_eq!(QValue::parse("0.x"), None);
  }

  #[test]
  fn qvalue_display_round_trip() {
    for raw in ["1.0", "0.0", "0.5", "0.25", "0.125", "0.001"] {
      let parsed = QValue::parse(raw).unwrap();
      assert_eq!(QValue::parse(parsed.to_string()), Some(parsed), "{}", raw);
    }
  }

  #[test]
  fn quality_list_sorted_descending_stable() {
    let parsed = parse_quality_values("gzip;q=0.8, *;q=1.0");
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].value, "*");
    assert_eq!(parsed[0].priority, QValue::MAX);
    assert_eq!(parsed[1].value, "gzip");
    assert_eq!(parsed[1].priority, QValue::from_clamped(800));
  }

  #[test]
  fn quality_list_ties_keep_insertion_order() {
    let parsed = parse_quality_values("br, gzip, deflate;q=0.5, zstd");
    let values: Vec<&str> = parsed.iter().map(|e| e.value.as_str()).collect();
    assert_eq!(values, vec!["br", "gzip", "zstd", "deflate"]);
  }

  #[test]
  fn quality_list_is_priority_sorted_permutation() {
    let input = "a;q=0.1, b, c;q=0.5, d;q=bogus, e;q=0.5, f";
    let parsed = parse_quality_values(input);
    assert_eq!(parsed.len(), 6);
    for pair in parsed.windows(2) {
      assert!(pair[0].priority >= pair[1].priority);
    }
    // Malformed q with the q= form present sinks to 0.
    assert_eq!(parsed.last().unwrap().value, "d");
    assert_eq!(parsed.last().unwrap().priority, QValue::MIN);
  }

  #[test]
  fn quality_list_strips_whitespace_and_empty_tokens() {
    let parsed = parse_quality_values("  gzip , , deflate;q=0.9  ");
    let values: Vec<&str> = parsed.iter().map(|e| e.value.as_str()).collect();
    assert_eq!(values, vec!["gzip", "deflate"]);
  }
}
