//! HTTP header handling.

use std::fmt::Display;

/// An ordered multimap of headers as part of a request or response.
///
/// Lookups compare interned [HeaderName]s, so `headers.get("content-type")`
/// and `headers.get(HeaderName::ContentType)` are equivalent.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Headers(Vec<Header>);

/// A single header name/value pair.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Header {
  pub name: HeaderName,
  pub value: String,
}

impl Header {
  pub fn new(name: impl HeaderLike, value: impl AsRef<str>) -> Self {
    Self { name: name.to_header(), value: value.as_ref().to_string() }
  }
}

impl Headers {
  /// Create an empty collection of headers.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Append a header without touching existing values of the same name.
  pub fn add(&mut self, name: impl HeaderLike, value: impl AsRef<str>) {
    self.0.push(Header::new(name, value));
  }

  /// Removes all previous values of the header and sets the single given value.
  pub fn set(&mut self, name: impl HeaderLike, value: impl AsRef<str>) {
    let header = name.to_header();
    self.0.retain(|h| h.name != header);
    self.0.push(Header { name: header, value: value.as_ref().to_string() });
  }

  /// The value of the first header with the given name.
  pub fn get(&self, name: impl HeaderLike) -> Option<&str> {
    let header = name.to_header();
    self.0.iter().find(|h| h.name == header).map(|h| h.value.as_str())
  }

  /// All values of headers with the given name, in insertion order.
  pub fn get_all(&self, name: impl HeaderLike) -> Vec<&str> {
    let header = name.to_header();
    self.0.iter().filter(|h| h.name == header).map(|h| h.value.as_str()).collect()
  }

  pub fn contains(&self, name: impl HeaderLike) -> bool {
    let header = name.to_header();
    self.0.iter().any(|h| h.name == header)
  }

  /// Remove all headers with the given name.
  pub fn remove(&mut self, name: impl HeaderLike) {
    let header = name.to_header();
    self.0.retain(|h| h.name != header);
  }

  pub fn iter(&self) -> impl Iterator<Item = &Header> {
    self.0.iter()
  }
}

/// A type that can be interpreted as a header name: [HeaderName] or any string.
pub trait HeaderLike {
  fn to_header(self) -> HeaderName;
}

impl HeaderLike for HeaderName {
  fn to_header(self) -> HeaderName {
    self
  }
}

impl HeaderLike for &HeaderName {
  fn to_header(self) -> HeaderName {
    self.clone()
  }
}

impl<T> HeaderLike for T
where
  T: AsRef<str>,
{
  fn to_header(self) -> HeaderName {
    HeaderName::from(self.as_ref())
  }
}

/// Interned header names. Comparison is case insensitive via the interning;
/// unknown names fall back to [HeaderName::Custom] with the original casing.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum HeaderName {
  Accept,
  AcceptEncoding,
  AcceptLanguage,
  AccessControlAllowCredentials,
  AccessControlAllowHeaders,
  AccessControlAllowMethods,
  AccessControlAllowOrigin,
  AccessControlExposeHeaders,
  AccessControlMaxAge,
  AccessControlRequestHeaders,
  AccessControlRequestMethod,
  Allow,
  Authorization,
  CacheControl,
  Connection,
  ContentDisposition,
  ContentEncoding,
  ContentLanguage,
  ContentLength,
  ContentType,
  Cookie,
  Date,
  ETag,
  Expires,
  Host,
  LastModified,
  Location,
  Origin,
  RateLimitLimit,
  RateLimitRemaining,
  RateLimitReset,
  Referer,
  SecWebSocketAccept,
  SecWebSocketKey,
  SecWebSocketVersion,
  Server,
  SetCookie,
  TransferEncoding,
  Upgrade,
  UserAgent,
  Vary,
  Via,
  /// Custom header, name kept verbatim.
  Custom(String),
}

impl HeaderName {
  /// The canonical wire representation of the header name.
  pub fn as_str(&self) -> &str {
    match self {
      HeaderName::Accept => "Accept",
      HeaderName::AcceptEncoding => "Accept-Encoding",
      HeaderName::AcceptLanguage => "Accept-Language",
      HeaderName::AccessControlAllowCredentials => "Access-Control-Allow-Credentials",
      HeaderName::AccessControlAllowHeaders => "Access-Control-Allow-Headers",
      HeaderName::AccessControlAllowMethods => "Access-Control-Allow-Methods",
      HeaderName::AccessControlAllowOrigin => "Access-Control-Allow-Origin",
      HeaderName::AccessControlExposeHeaders => "Access-Control-Expose-Headers",
      HeaderName::AccessControlMaxAge => "Access-Control-Max-Age",
      HeaderName::AccessControlRequestHeaders => "Access-Control-Request-Headers",
      HeaderName::AccessControlRequestMethod => "Access-Control-Request-Method",
      HeaderName::Allow => "Allow",
      HeaderName::Authorization => "Authorization",
      HeaderName::CacheControl => "Cache-Control",
      HeaderName::Connection => "Connection",
      HeaderName::ContentDisposition => "Content-Disposition",
      HeaderName::ContentEncoding => "Content-Encoding",
      HeaderName::ContentLanguage => "Content-Language",
      HeaderName::ContentLength => "Content-Length",
      HeaderName::ContentType => "Content-Type",
      HeaderName::Cookie => "Cookie",
      HeaderName::Date => "Date",
      HeaderName::ETag => "ETag",
      HeaderName::Expires => "Expires",
      HeaderName::Host => "Host",
      HeaderName::LastModified => "Last-Modified",
      HeaderName::Location => "Location",
      HeaderName::Origin => "Origin",
      HeaderName::RateLimitLimit => "RateLimit-Limit",
      HeaderName::RateLimitRemaining => "RateLimit-Remaining",
      HeaderName::RateLimitReset => "RateLimit-Reset",
      HeaderName::Referer => "Referer",
      HeaderName::SecWebSocketAccept => "Sec-WebSocket-Accept",
      HeaderName::SecWebSocketKey => "Sec-WebSocket-Key",
      HeaderName::SecWebSocketVersion => "Sec-WebSocket-Version",
      HeaderName::Server => "Server",
      HeaderName::SetCookie => "Set-Cookie",
      HeaderName::TransferEncoding => "Transfer-Encoding",
      HeaderName::Upgrade => "Upgrade",
      HeaderName::UserAgent => "User-Agent",
      HeaderName::Vary => "Vary",
      HeaderName::Via => "Via",
      HeaderName::Custom(name) => name.as_str(),
    }
  }
}

static WELL_KNOWN: &[HeaderName] = &[
  HeaderName::Accept,
  HeaderName::AcceptEncoding,
  HeaderName::AcceptLanguage,
  HeaderName::AccessControlAllowCredentials,
  HeaderName::AccessControlAllowHeaders,
  HeaderName::AccessControlAllowMethods,
  HeaderName::AccessControlAllowOrigin,
  HeaderName::AccessControlExposeHeaders,
  HeaderName::AccessControlMaxAge,
  HeaderName::AccessControlRequestHeaders,
  HeaderName::AccessControlRequestMethod,
  HeaderName::Allow,
  HeaderName::Authorization,
  HeaderName::CacheControl,
  HeaderName::Connection,
  HeaderName::ContentDisposition,
  HeaderName::ContentEncoding,
  HeaderName::ContentLanguage,
  HeaderName::ContentLength,
  HeaderName::ContentType,
  HeaderName::Cookie,
  HeaderName::Date,
  HeaderName::ETag,
  HeaderName::Expires,
  HeaderName::Host,
  HeaderName::LastModified,
  HeaderName::Location,
  HeaderName::Origin,
  HeaderName::RateLimitLimit,
  HeaderName::RateLimitRemaining,
  HeaderName::RateLimitReset,
  HeaderName::Referer,
  HeaderName::SecWebSocketAccept,
  HeaderName::SecWebSocketKey,
  HeaderName::SecWebSocketVersion,
  HeaderName::Server,
  HeaderName::SetCookie,
  HeaderName::TransferEncoding,
  HeaderName::Upgrade,
  HeaderName::UserAgent,
  HeaderName::Vary,
  HeaderName::Via,
];

impl From<&str> for HeaderName {
  fn from(name: &str) -> Self {
    for known in WELL_KNOWN {
      if known.as_str().eq_ignore_ascii_case(name) {
        return known.clone();
      }
    }

    Self::Custom(name.to_string())
  }
}

impl Display for HeaderName {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}
