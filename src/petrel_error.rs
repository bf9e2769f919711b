//! Crate wide error types.
//! TODO docs for the individual variants before release
#![allow(missing_docs)]
//!
//! Every fallible petrel operation returns [PetrelResult]. The error enum keeps
//! domain specific sub-enums so callers can match on the failure class without
//! string comparison, while still allowing arbitrary user errors through the
//! `Other` escape hatch.

use crate::http::status::StatusCode;
use crate::logging::ErrorReport;
use crate::websocket::CloseCode;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io;
use std::io::ErrorKind;

pub type PetrelResult<T> = Result<T, PetrelError>;

/// Errors produced while reading and parsing the head of an HTTP request.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum RequestHeadParsingError {
  StatusLineContainsInvalidBytes,
  StatusLineNoCRLF,
  StatusLineNoWhitespace,
  StatusLineTooManyWhitespaces,
  StatusLineTooLong(Vec<u8>),
  InvalidPath(String),
  InvalidPathUrlEncoding(String),
  HeaderLineIsNotUsAscii,
  HeaderLineNoCRLF,
  HeaderNameEmpty,
  HeaderValueMissing,
  HeaderValueEmpty,
  HeaderLineTooLong(Vec<u8>),
  HttpVersionNotSupported(String),
  TransferEncodingNotSupported(String),
  InvalidContentLength(String),
  InvalidQueryString(String),
}

impl Display for RequestHeadParsingError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Debug::fmt(self, f)
  }
}
impl Error for RequestHeadParsingError {}

/// Syntax errors of the path expression grammar used by the data walker.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Hash, Clone)]
#[non_exhaustive]
pub enum PathSyntaxError {
  /// Expression starts with `.`
  LeadingDot(String),
  /// Two separators with nothing between them, e.g. `a..b`
  EmptyName(String),
  /// `[` without a matching `]` or the other way around.
  UnmatchedBracket(String),
  /// Something other than an integer between `[` and `]`.
  InvalidIndex(String, String),
  /// `][` or `]x` without a `.` in between.
  IllegalAfterBracket(String),
}

impl Display for PathSyntaxError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      PathSyntaxError::LeadingDot(s) => write!(f, "illegal syntax: {:?} starts with '.'", s),
      PathSyntaxError::EmptyName(s) => write!(f, "illegal syntax: {:?} contains an empty segment", s),
      PathSyntaxError::UnmatchedBracket(s) => write!(f, "illegal syntax: {:?} has an unmatched bracket", s),
      PathSyntaxError::InvalidIndex(s, idx) => {
        write!(f, "illegal syntax: {:?} has a non numeric index {:?}", s, idx)
      }
      PathSyntaxError::IllegalAfterBracket(s) => {
        write!(f, "illegal syntax: {:?} has content directly after ']'", s)
      }
    }
  }
}
impl Error for PathSyntaxError {}

/// Errors raised while registering routes on a router.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum RouterError {
  /// A `{name:pattern}` placeholder contains a regex that does not compile.
  PlaceholderRegexSyntax(String, String, String),
  /// A placeholder is missing its closing `}`.
  UnclosedPlaceholder(String),
  /// Two routes were registered under the same name. Names are globally unique.
  DuplicateRouteName(String),
  /// Reverse URI building was asked for a parameter the route does not declare.
  MissingUriParameter(String, String),
}

impl Display for RouterError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      RouterError::PlaceholderRegexSyntax(uri, pat, err) => {
        write!(f, "route {:?}: placeholder pattern {:?} does not compile: {}", uri, pat, err)
      }
      RouterError::UnclosedPlaceholder(uri) => {
        write!(f, "route {:?}: unclosed '{{' placeholder", uri)
      }
      RouterError::DuplicateRouteName(name) => {
        write!(f, "route name {:?} registered twice", name)
      }
      RouterError::MissingUriParameter(name, param) => {
        write!(f, "route {:?}: no value for URI parameter {:?}", name, param)
      }
    }
  }
}
impl Error for RouterError {}

/// Errors from the body parsing middleware. All of these map to a 4xx status.
#[derive(Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum BodyParseError {
  /// Body did not deserialize under the announced Content-Type.
  MalformedBody(String),
  /// Multipart payload violates its own framing.
  MalformedMultipart(String),
  /// Body exceeds the configured upload limit (limit in bytes).
  PayloadTooLarge(u64),
}

impl Display for BodyParseError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      BodyParseError::MalformedBody(msg) => write!(f, "malformed request body: {}", msg),
      BodyParseError::MalformedMultipart(msg) => write!(f, "malformed multipart body: {}", msg),
      BodyParseError::PayloadTooLarge(limit) => {
        write!(f, "request body larger than the {} byte limit", limit)
      }
    }
  }
}
impl Error for BodyParseError {}

/// Errors of the WebSocket subsystem.
#[derive(Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum WebsocketError {
  /// Handshake request lacks `Sec-WebSocket-Key`.
  MissingSecWebSocketKeyHeader,
  /// Handshake request `Origin` was rejected by the upgrader's predicate.
  OriginNotAllowed(String),
  /// Handshake request is not an HTTP/1.1 GET with `Upgrade: websocket`.
  NotAnUpgradeRequest,
  /// A frame opcode outside of RFC 6455 section 5.2.
  InvalidOpcode,
  /// A frame opcode that is valid but illegal at this point of the stream.
  UnexpectedOpcode,
  /// The peer sent a close frame in the middle of a fragmented message.
  ClosedDuringPendingMessage,
  /// A text message that is not valid utf-8.
  TextMessageIsNotUtf8(Vec<u8>),
}

impl Display for WebsocketError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Debug::fmt(self, f)
  }
}
impl Error for WebsocketError {}

#[derive(Debug)]
#[non_exhaustive]
pub enum PetrelError {
  RequestHeadParsing(RequestHeadParsingError),
  PathSyntax(PathSyntaxError),
  Router(RouterError),
  BodyParse(BodyParseError),
  Websocket(WebsocketError),
  /// A WebSocket handler asked for a specific close code.
  WebsocketClose(CloseCode, String),
  /// A panic caught at the recovery boundary. Carries the panic message.
  Panic(String),
  /// Structured multi-reason error carrying a trace, see the logging module.
  Report(ErrorReport),
  IO(io::Error),
  Other(Box<dyn Error + Send + Sync>),
}

impl PetrelError {
  pub fn new_io<E: Into<Box<dyn Error + Send + Sync>>>(kind: ErrorKind, message: E) -> PetrelError {
    io::Error::new(kind, message).into()
  }

  pub fn from_io_kind(kind: ErrorKind) -> PetrelError {
    io::Error::from(kind).into()
  }

  /// Arbitrary message error. For handler code that has nothing structured to say.
  pub fn msg(message: impl Into<String>) -> PetrelError {
    PetrelError::Other(message.into().into())
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      PetrelError::IO(io) => io.kind(),
      PetrelError::RequestHeadParsing(_) => ErrorKind::InvalidData,
      _ => ErrorKind::Other,
    }
  }

  /// The HTTP status that reporting this error through a response should force.
  pub fn status(&self) -> StatusCode {
    match self {
      PetrelError::BodyParse(BodyParseError::PayloadTooLarge(_)) => StatusCode::ContentTooLarge,
      PetrelError::BodyParse(_) => StatusCode::BadRequest,
      PetrelError::RequestHeadParsing(_) => StatusCode::BadRequest,
      _ => StatusCode::InternalServerError,
    }
  }

  pub fn downcast_ref<T: Error + Send + 'static>(&self) -> Option<&T> {
    match self {
      PetrelError::IO(err) => (err as &dyn Error).downcast_ref::<T>(),
      PetrelError::RequestHeadParsing(err) => (err as &dyn Error).downcast_ref::<T>(),
      PetrelError::PathSyntax(err) => (err as &dyn Error).downcast_ref::<T>(),
      PetrelError::Router(err) => (err as &dyn Error).downcast_ref::<T>(),
      PetrelError::BodyParse(err) => (err as &dyn Error).downcast_ref::<T>(),
      PetrelError::Websocket(err) => (err as &dyn Error).downcast_ref::<T>(),
      PetrelError::Other(other) => other.downcast_ref::<T>(),
      _ => None,
    }
  }

  pub fn into_inner(self) -> Box<dyn Error + Send + Sync + 'static> {
    match self {
      PetrelError::IO(err) => Box::new(err),
      PetrelError::RequestHeadParsing(err) => Box::new(err),
      PetrelError::PathSyntax(err) => Box::new(err),
      PetrelError::Router(err) => Box::new(err),
      PetrelError::BodyParse(err) => Box::new(err),
      PetrelError::Websocket(err) => Box::new(err),
      PetrelError::WebsocketClose(code, reason) => {
        Box::new(io::Error::new(ErrorKind::Other, format!("close {}: {}", code.code(), reason)))
      }
      PetrelError::Panic(msg) => Box::new(io::Error::new(ErrorKind::Other, msg)),
      PetrelError::Report(report) => Box::new(report),
      PetrelError::Other(other) => other,
    }
  }
}

impl Display for PetrelError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      PetrelError::IO(err) => Display::fmt(err, f),
      PetrelError::RequestHeadParsing(err) => Display::fmt(err, f),
      PetrelError::PathSyntax(err) => Display::fmt(err, f),
      PetrelError::Router(err) => Display::fmt(err, f),
      PetrelError::BodyParse(err) => Display::fmt(err, f),
      PetrelError::Websocket(err) => Display::fmt(err, f),
      PetrelError::WebsocketClose(code, reason) => {
        write!(f, "websocket close {}: {}", code.code(), reason)
      }
      PetrelError::Panic(msg) => write!(f, "panic: {}", msg),
      PetrelError::Report(report) => Display::fmt(report, f),
      PetrelError::Other(err) => Display::fmt(err, f),
    }
  }
}

impl<T> From<T> for PetrelError
where
  T: Error + Send + Sync + 'static,
{
  fn from(value: T) -> Self {
    let mut dyn_box = Box::new(value) as Box<dyn Error + Send + Sync>;
    dyn_box = match dyn_box.downcast::<io::Error>() {
      Ok(err) => return PetrelError::IO(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<RequestHeadParsingError>() {
      Ok(err) => return PetrelError::RequestHeadParsing(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<PathSyntaxError>() {
      Ok(err) => return PetrelError::PathSyntax(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<RouterError>() {
      Ok(err) => return PetrelError::Router(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<BodyParseError>() {
      Ok(err) => return PetrelError::BodyParse(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<WebsocketError>() {
      Ok(err) => return PetrelError::Websocket(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<ErrorReport>() {
      Ok(err) => return PetrelError::Report(*err),
      Err(err) => err,
    };

    PetrelError::Other(dyn_box)
  }
}

impl From<PetrelError> for io::Error {
  fn from(value: PetrelError) -> Self {
    match value {
      PetrelError::IO(io) => io,
      err => io::Error::new(err.kind(), err.into_inner()),
    }
  }
}
