//! MIME types for response bodies and uploaded files.

use std::fmt::{Display, Formatter};

/// A media type. The common web set is interned, everything else is kept
/// verbatim in [MimeType::Other].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MimeType {
  TextPlain,
  TextHtml,
  TextCss,
  TextCsv,
  TextJavaScript,
  ApplicationJson,
  ApplicationXml,
  ApplicationPdf,
  ApplicationZip,
  ApplicationGzip,
  ApplicationOctetStream,
  ApplicationFormUrlEncoded,
  MultipartFormData,
  ImagePng,
  ImageJpeg,
  ImageGif,
  ImageWebp,
  ImageSvg,
  ImageIcon,
  AudioMpeg,
  VideoMp4,
  FontWoff,
  FontWoff2,
  Other(String),
}

impl MimeType {
  pub fn as_str(&self) -> &str {
    match self {
      MimeType::TextPlain => "text/plain",
      MimeType::TextHtml => "text/html",
      MimeType::TextCss => "text/css",
      MimeType::TextCsv => "text/csv",
      MimeType::TextJavaScript => "text/javascript",
      MimeType::ApplicationJson => "application/json",
      MimeType::ApplicationXml => "application/xml",
      MimeType::ApplicationPdf => "application/pdf",
      MimeType::ApplicationZip => "application/zip",
      MimeType::ApplicationGzip => "application/gzip",
      MimeType::ApplicationOctetStream => "application/octet-stream",
      MimeType::ApplicationFormUrlEncoded => "application/x-www-form-urlencoded",
      MimeType::MultipartFormData => "multipart/form-data",
      MimeType::ImagePng => "image/png",
      MimeType::ImageJpeg => "image/jpeg",
      MimeType::ImageGif => "image/gif",
      MimeType::ImageWebp => "image/webp",
      MimeType::ImageSvg => "image/svg+xml",
      MimeType::ImageIcon => "image/vnd.microsoft.icon",
      MimeType::AudioMpeg => "audio/mpeg",
      MimeType::VideoMp4 => "video/mp4",
      MimeType::FontWoff => "font/woff",
      MimeType::FontWoff2 => "font/woff2",
      MimeType::Other(raw) => raw.as_str(),
    }
  }

  /// Parses a `Content-Type` header value, discarding parameters such as
  /// `charset` or `boundary`.
  pub fn parse(raw: &str) -> MimeType {
    let essence = raw.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
      "text/plain" => MimeType::TextPlain,
      "text/html" => MimeType::TextHtml,
      "text/css" => MimeType::TextCss,
      "text/csv" => MimeType::TextCsv,
      "text/javascript" | "application/javascript" => MimeType::TextJavaScript,
      "application/json" => MimeType::ApplicationJson,
      "application/xml" | "text/xml" => MimeType::ApplicationXml,
      "application/pdf" => MimeType::ApplicationPdf,
      "application/zip" => MimeType::ApplicationZip,
      "application/gzip" => MimeType::ApplicationGzip,
      "application/octet-stream" => MimeType::ApplicationOctetStream,
      "application/x-www-form-urlencoded" => MimeType::ApplicationFormUrlEncoded,
      "multipart/form-data" => MimeType::MultipartFormData,
      "image/png" => MimeType::ImagePng,
      "image/jpeg" => MimeType::ImageJpeg,
      "image/gif" => MimeType::ImageGif,
      "image/webp" => MimeType::ImageWebp,
      "image/svg+xml" => MimeType::ImageSvg,
      "image/vnd.microsoft.icon" | "image/x-icon" => MimeType::ImageIcon,
      "audio/mpeg" => MimeType::AudioMpeg,
      "video/mp4" => MimeType::VideoMp4,
      "font/woff" => MimeType::FontWoff,
      "font/woff2" => MimeType::FontWoff2,
      _ => MimeType::Other(essence.to_string()),
    }
  }

  /// The media type for a file name, determined by its extension.
  /// Unknown extensions map to `application/octet-stream`.
  pub fn from_file_name(name: &str) -> MimeType {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
      "txt" | "text" | "log" => MimeType::TextPlain,
      "html" | "htm" => MimeType::TextHtml,
      "css" => MimeType::TextCss,
      "csv" => MimeType::TextCsv,
      "js" | "mjs" => MimeType::TextJavaScript,
      "json" => MimeType::ApplicationJson,
      "xml" => MimeType::ApplicationXml,
      "pdf" => MimeType::ApplicationPdf,
      "zip" => MimeType::ApplicationZip,
      "gz" => MimeType::ApplicationGzip,
      "png" => MimeType::ImagePng,
      "jpg" | "jpeg" => MimeType::ImageJpeg,
      "gif" => MimeType::ImageGif,
      "webp" => MimeType::ImageWebp,
      "svg" => MimeType::ImageSvg,
      "ico" => MimeType::ImageIcon,
      "mp3" => MimeType::AudioMpeg,
      "mp4" => MimeType::VideoMp4,
      "woff" => MimeType::FontWoff,
      "woff2" => MimeType::FontWoff2,
      _ => MimeType::ApplicationOctetStream,
    }
  }

  /// True for `text/*` types plus the text-shaped application types that take
  /// a charset parameter.
  pub fn is_text(&self) -> bool {
    matches!(
      self,
      MimeType::TextPlain
        | MimeType::TextHtml
        | MimeType::TextCss
        | MimeType::TextCsv
        | MimeType::TextJavaScript
        | MimeType::ApplicationJson
        | MimeType::ApplicationXml
        | MimeType::ImageSvg
    )
  }
}

impl Display for MimeType {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<&str> for MimeType {
  fn from(raw: &str) -> Self {
    MimeType::parse(raw)
  }
}

/// Sniffs a media type from the first bytes of a body. Used when a response
/// is written without an explicit `Content-Type`.
pub fn sniff_content_type(data: &[u8]) -> MimeType {
  if data.starts_with(&[0x1f, 0x8b]) {
    return MimeType::ApplicationGzip;
  }
  if data.starts_with(b"\x89PNG\r\n\x1a\n") {
    return MimeType::ImagePng;
  }
  if data.starts_with(&[0xff, 0xd8, 0xff]) {
    return MimeType::ImageJpeg;
  }
  if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
    return MimeType::ImageGif;
  }
  if data.starts_with(b"%PDF-") {
    return MimeType::ApplicationPdf;
  }
  if data.starts_with(b"PK\x03\x04") {
    return MimeType::ApplicationZip;
  }

  let head = data.iter().take(512).copied().collect::<Vec<u8>>();
  if let Ok(text) = std::str::from_utf8(&head) {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<!DOCTYPE html") || trimmed.starts_with("<html") {
      return MimeType::TextHtml;
    }
    if trimmed.starts_with("<?xml") {
      return MimeType::ApplicationXml;
    }
    return MimeType::TextPlain;
  }

  MimeType::ApplicationOctetStream
}
