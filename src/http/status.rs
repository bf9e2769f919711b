//! HTTP status codes.

/// Represents an HTTP status code.
///
/// Only the codes the framework itself can emit plus the common rest of the
/// RFC set are named; anything else can be expressed with [StatusCode::Custom].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
  /// `100 Continue`
  Continue,
  /// `101 Switching Protocols`: protocol upgrade, used by the WebSocket handshake.
  SwitchingProtocols,
  /// `200 OK`
  OK,
  /// `201 Created`
  Created,
  /// `202 Accepted`
  Accepted,
  /// `204 No Content`: successful completion without a body.
  NoContent,
  /// `206 Partial Content`
  PartialContent,
  /// `301 Moved Permanently`
  MovedPermanently,
  /// `302 Found`
  Found,
  /// `303 See Other`
  SeeOther,
  /// `304 Not Modified`
  NotModified,
  /// `307 Temporary Redirect`
  TemporaryRedirect,
  /// `308 Permanent Redirect`: used for wrong-scheme redirects.
  PermanentRedirect,
  /// `400 Bad Request`: malformed body or query.
  BadRequest,
  /// `401 Unauthorized`
  Unauthorized,
  /// `403 Forbidden`
  Forbidden,
  /// `404 Not Found`
  NotFound,
  /// `405 Method Not Allowed`
  MethodNotAllowed,
  /// `406 Not Acceptable`
  NotAcceptable,
  /// `408 Request Timeout`
  RequestTimeout,
  /// `409 Conflict`
  Conflict,
  /// `410 Gone`
  Gone,
  /// `411 Length Required`
  LengthRequired,
  /// `412 Precondition Failed`
  PreconditionFailed,
  /// `413 Content Too Large`: body exceeds the configured upload limit.
  ContentTooLarge,
  /// `414 URI Too Long`
  UriTooLong,
  /// `415 Unsupported Media Type`
  UnsupportedMediaType,
  /// `422 Unprocessable Entity`: request data failed validation.
  UnprocessableEntity,
  /// `429 Too Many Requests`: rejected by the rate limiter.
  TooManyRequests,
  /// `500 Internal Server Error`
  InternalServerError,
  /// `501 Not Implemented`
  NotImplemented,
  /// `502 Bad Gateway`
  BadGateway,
  /// `503 Service Unavailable`
  ServiceUnavailable,
  /// `505 HTTP Version Not Supported`
  VersionNotSupported,
  /// Anything else. The code must be three digits.
  Custom(u16, String),
}

impl StatusCode {
  /// The numeric code. Guaranteed to be in the 100..=999 range for named variants.
  pub fn code(&self) -> u16 {
    match self {
      StatusCode::Continue => 100,
      StatusCode::SwitchingProtocols => 101,
      StatusCode::OK => 200,
      StatusCode::Created => 201,
      StatusCode::Accepted => 202,
      StatusCode::NoContent => 204,
      StatusCode::PartialContent => 206,
      StatusCode::MovedPermanently => 301,
      StatusCode::Found => 302,
      StatusCode::SeeOther => 303,
      StatusCode::NotModified => 304,
      StatusCode::TemporaryRedirect => 307,
      StatusCode::PermanentRedirect => 308,
      StatusCode::BadRequest => 400,
      StatusCode::Unauthorized => 401,
      StatusCode::Forbidden => 403,
      StatusCode::NotFound => 404,
      StatusCode::MethodNotAllowed => 405,
      StatusCode::NotAcceptable => 406,
      StatusCode::RequestTimeout => 408,
      StatusCode::Conflict => 409,
      StatusCode::Gone => 410,
      StatusCode::LengthRequired => 411,
      StatusCode::PreconditionFailed => 412,
      StatusCode::ContentTooLarge => 413,
      StatusCode::UriTooLong => 414,
      StatusCode::UnsupportedMediaType => 415,
      StatusCode::UnprocessableEntity => 422,
      StatusCode::TooManyRequests => 429,
      StatusCode::InternalServerError => 500,
      StatusCode::NotImplemented => 501,
      StatusCode::BadGateway => 502,
      StatusCode::ServiceUnavailable => 503,
      StatusCode::VersionNotSupported => 505,
      StatusCode::Custom(code, _) => *code,
    }
  }

  /// The reason phrase for the status line.
  pub fn reason(&self) -> &str {
    match self {
      StatusCode::Continue => "Continue",
      StatusCode::SwitchingProtocols => "Switching Protocols",
      StatusCode::OK => "OK",
      StatusCode::Created => "Created",
      StatusCode::Accepted => "Accepted",
      StatusCode::NoContent => "No Content",
      StatusCode::PartialContent => "Partial Content",
      StatusCode::MovedPermanently => "Moved Permanently",
      StatusCode::Found => "Found",
      StatusCode::SeeOther => "See Other",
      StatusCode::NotModified => "Not Modified",
      StatusCode::TemporaryRedirect => "Temporary Redirect",
      StatusCode::PermanentRedirect => "Permanent Redirect",
      StatusCode::BadRequest => "Bad Request",
      StatusCode::Unauthorized => "Unauthorized",
      StatusCode::Forbidden => "Forbidden",
      StatusCode::NotFound => "Not Found",
      StatusCode::MethodNotAllowed => "Method Not Allowed",
      StatusCode::NotAcceptable => "Not Acceptable",
      StatusCode::RequestTimeout => "Request Timeout",
      StatusCode::Conflict => "Conflict",
      StatusCode::Gone => "Gone",
      StatusCode::LengthRequired => "Length Required",
      StatusCode::PreconditionFailed => "Precondition Failed",
      StatusCode::ContentTooLarge => "Content Too Large",
      StatusCode::UriTooLong => "URI Too Long",
      StatusCode::UnsupportedMediaType => "Unsupported Media Type",
      StatusCode::UnprocessableEntity => "Unprocessable Entity",
      StatusCode::TooManyRequests => "Too Many Requests",
      StatusCode::InternalServerError => "Internal Server Error",
      StatusCode::NotImplemented => "Not Implemented",
      StatusCode::BadGateway => "Bad Gateway",
      StatusCode::ServiceUnavailable => "Service Unavailable",
      StatusCode::VersionNotSupported => "HTTP Version Not Supported",
      StatusCode::Custom(_, reason) => reason.as_str(),
    }
  }

  /// Maps a numeric code back to its named variant where one exists.
  pub fn from_code(code: u16) -> Option<StatusCode> {
    Some(match code {
      100 => StatusCode::Continue,
      101 => StatusCode::SwitchingProtocols,
      200 => StatusCode::OK,
      201 => StatusCode::Created,
      202 => StatusCode::Accepted,
      204 => StatusCode::NoContent,
      206 => StatusCode::PartialContent,
      301 => StatusCode::MovedPermanently,
      302 => StatusCode::Found,
      303 => StatusCode::SeeOther,
      304 => StatusCode::NotModified,
      307 => StatusCode::TemporaryRedirect,
      308 => StatusCode::PermanentRedirect,
      400 => StatusCode::BadRequest,
      401 => StatusCode::Unauthorized,
      403 => StatusCode::Forbidden,
      404 => StatusCode::NotFound,
      405 => StatusCode::MethodNotAllowed,
      406 => StatusCode::NotAcceptable,
      408 => StatusCode::RequestTimeout,
      409 => StatusCode::Conflict,
      410 => StatusCode::Gone,
      411 => StatusCode::LengthRequired,
      412 => StatusCode::PreconditionFailed,
      413 => StatusCode::ContentTooLarge,
      414 => StatusCode::UriTooLong,
      415 => StatusCode::UnsupportedMediaType,
      422 => StatusCode::UnprocessableEntity,
      429 => StatusCode::TooManyRequests,
      500 => StatusCode::InternalServerError,
      501 => StatusCode::NotImplemented,
      502 => StatusCode::BadGateway,
      503 => StatusCode::ServiceUnavailable,
      505 => StatusCode::VersionNotSupported,
      _ => return None,
    })
  }

  /// True for 4xx codes.
  pub fn is_client_error(&self) -> bool {
    (400..500).contains(&self.code())
  }

  /// True for 5xx codes.
  pub fn is_server_error(&self) -> bool {
    (500..600).contains(&self.code())
  }
}

impl std::fmt::Display for StatusCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.code(), self.reason())
  }
}

impl From<u16> for StatusCode {
  fn from(code: u16) -> Self {
    StatusCode::from_code(code).unwrap_or(StatusCode::Custom(code, String::new()))
  }
}
