//! Server configuration.
//!
//! Configuration is injected as a structured mapping (usually parsed from
//! JSON by the surrounding application). The accessors below enumerate the
//! options the core recognises; lookup of dotted keys reuses the data
//! walker.

use crate::data::Data;
use crate::walk::{Found, Path};
use std::time::Duration;

/// A typed view over a configuration mapping.
#[derive(Debug, Clone, Default)]
pub struct Config {
  data: Data,
}

impl Config {
  pub fn new(data: Data) -> Config {
    Config { data }
  }

  /// Parses a JSON object into a configuration.
  pub fn from_json(raw: &str) -> Result<Config, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(Config::new(Data::from(value)))
  }

  /// Raw lookup of a dotted key such as `server.maxUploadSize`.
  pub fn get(&self, key: &str) -> Option<Data> {
    let path = Path::parse(key).ok()?;
    let located = path.first(&self.data);
    match located.found {
      Found::Found => located.value,
      _ => None,
    }
  }

  pub fn get_str(&self, key: &str) -> Option<String> {
    self.get(key).and_then(|v| v.as_str().map(str::to_string))
  }

  pub fn get_f64(&self, key: &str) -> Option<f64> {
    self.get(key).and_then(|v| v.as_f64())
  }

  pub fn get_bool(&self, key: &str) -> Option<bool> {
    self.get(key).and_then(|v| v.as_bool())
  }

  /// `app.debug`: expose error details in responses, close frames and the
  /// log output. Defaults to false.
  pub fn debug(&self) -> bool {
    self.get_bool("app.debug").unwrap_or(false)
  }

  /// `server.maxUploadSize`: request body cap in MiB for the parse
  /// middleware. Defaults to 10.
  pub fn max_upload_size_mib(&self) -> u64 {
    self.get_f64("server.maxUploadSize").map(|v| v.max(0.0) as u64).unwrap_or(10)
  }

  /// `server.timeout`: default WebSocket close-handshake timeout in
  /// seconds. Defaults to 10.
  pub fn timeout(&self) -> Duration {
    let secs = self.get_f64("server.timeout").map(|v| v.max(0.0)).unwrap_or(10.0);
    Duration::from_secs_f64(secs)
  }

  /// `server.protocol`: `"http"` or `"https"`. A request arriving over the
  /// wrong scheme is redirected. Defaults to `"http"`.
  pub fn protocol(&self) -> String {
    self.get_str("server.protocol").unwrap_or_else(|| "http".to_string())
  }

  /// `server.host`. Defaults to 127.0.0.1.
  pub fn host(&self) -> String {
    self.get_str("server.host").unwrap_or_else(|| "127.0.0.1".to_string())
  }

  /// `server.port`. Defaults to 8080.
  pub fn port(&self) -> u16 {
    self.get_f64("server.port").map(|v| v as u16).unwrap_or(8080)
  }

  /// `app.defaultLanguage`. Defaults to `"en"`.
  pub fn default_language(&self) -> String {
    self.get_str("app.defaultLanguage").unwrap_or_else(|| "en".to_string())
  }

  /// `app.supportedLanguages`. Defaults to the default language alone.
  pub fn supported_languages(&self) -> Vec<String> {
    match self.get("app.supportedLanguages") {
      Some(Data::Sequence(seq)) => {
        seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
      }
      _ => vec![self.default_language()],
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn config() -> Config {
    Config::from_json(
      r#"{
        "app": {"debug": true, "defaultLanguage": "fr", "supportedLanguages": ["fr", "en"]},
        "server": {"maxUploadSize": 25, "timeout": 3, "protocol": "https", "port": 9000}
      }"#,
    )
    .unwrap()
  }

  #[test]
  fn typed_accessors() {
    let config = config();
    assert!(config.debug());
    assert_eq!(config.max_upload_size_mib(), 25);
    assert_eq!(config.timeout(), Duration::from_secs(3));
    assert_eq!(config.protocol(), "https");
    assert_eq!(config.port(), 9000);
    assert_eq!(config.default_language(), "fr");
    assert_eq!(config.supported_languages(), vec!["fr".to_string(), "en".to_string()]);
  }

  #[test]
  fn defaults() {
    let config = Config::default();
    assert!(!config.debug());
    assert_eq!(config.max_upload_size_mib(), 10);
    assert_eq!(config.timeout(), Duration::from_secs(10));
    assert_eq!(config.protocol(), "http");
    assert_eq!(config.port(), 8080);
    assert_eq!(config.supported_languages(), vec!["en".to_string()]);
  }

  #[test]
  fn dotted_lookup_misses() {
    let config = config();
    assert!(config.get("server.nope").is_none());
    assert!(config.get("nope.deeply.nested").is_none());
  }
}
