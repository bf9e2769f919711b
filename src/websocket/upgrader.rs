//! HTTP to WebSocket protocol upgrade.

use crate::http::headers::{HeaderName, Headers};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::StatusCode;
use crate::middleware::Handler;
use crate::petrel_error::{PetrelError, PetrelResult, WebsocketError};
use crate::stream::ConnectionStream;
use crate::util;
use crate::websocket::conn::Conn;
use crate::websocket::{truncate_reason, CloseCode};
use base64::Engine;
use sha1::{Digest, Sha1};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

const HANDSHAKE_KEY_CONSTANT: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

type OriginPredicate = dyn Fn(&Request) -> bool + Send + Sync;
type UpgradeErrorHandler = dyn Fn(&mut Response, StatusCode, &str) + Send + Sync;
type ConnErrorHandler = dyn Fn(&PetrelError, &Request) + Send + Sync;
type HeadersHook = dyn Fn(&Request, &mut Headers) + Send + Sync;

struct UpgraderOptions {
  debug: bool,
  timeout: Duration,
  check_origin: Option<Box<OriginPredicate>>,
  upgrade_error_handler: Option<Box<UpgradeErrorHandler>>,
  error_handler: Option<Arc<ConnErrorHandler>>,
  headers_hook: Option<Box<HeadersHook>>,
}

/// Upgrades HTTP requests to WebSocket connections.
///
/// [Upgrader::handle] produces the HTTP handler to register on a route. On a
/// successful handshake the connection is taken over and the user handler
/// runs on its own task, independent of the HTTP response lifecycle, with a
/// recovery guard in effect throughout.
pub struct Upgrader {
  options: UpgraderOptions,
}

impl Default for Upgrader {
  fn default() -> Self {
    Upgrader::new()
  }
}

impl Upgrader {
  /// Upgrader wired to the server configuration: `server.timeout` becomes
  /// the close-handshake timeout, `app.debug` the debug flag.
  pub fn from_config(config: &crate::config::Config) -> Upgrader {
    Upgrader::new().debug(config.debug()).timeout(config.timeout())
  }

  pub fn new() -> Upgrader {
    Upgrader {
      options: UpgraderOptions {
        debug: false,
        timeout: DEFAULT_CLOSE_TIMEOUT,
        check_origin: None,
        upgrade_error_handler: None,
        error_handler: None,
        headers_hook: None,
      },
    }
  }

  /// Reveal upgrade failure reasons in response bodies and error close
  /// frames. Never enable in production.
  pub fn debug(mut self, debug: bool) -> Self {
    self.options.debug = debug;
    self
  }

  /// The close-handshake timeout: how long to wait for the peer's close
  /// frame before tearing the connection down.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.options.timeout = timeout;
    self
  }

  /// Origin predicate. Requests for which it returns false are rejected
  /// with 403. Without a predicate every origin is accepted.
  pub fn check_origin<F>(mut self, predicate: F) -> Self
  where
    F: Fn(&Request) -> bool + Send + Sync + 'static,
  {
    self.options.check_origin = Some(Box::new(predicate));
    self
  }

  /// Handler invoked with status and reason when the upgrade fails before
  /// the protocol switch.
  pub fn on_upgrade_error<F>(mut self, handler: F) -> Self
  where
    F: Fn(&mut Response, StatusCode, &str) + Send + Sync + 'static,
  {
    self.options.upgrade_error_handler = Some(Box::new(handler));
    self
  }

  /// Handler invoked with errors returned (or panics raised) by the
  /// connection handler, while the close handshake still runs.
  pub fn on_error<F>(mut self, handler: F) -> Self
  where
    F: Fn(&PetrelError, &Request) + Send + Sync + 'static,
  {
    self.options.error_handler = Some(Arc::new(handler));
    self
  }

  /// Hook adding extra headers to the 101 handshake response.
  pub fn with_headers<F>(mut self, hook: F) -> Self
  where
    F: Fn(&Request, &mut Headers) + Send + Sync + 'static,
  {
    self.options.headers_hook = Some(Box::new(hook));
    self
  }

  /// Produces the HTTP handler performing the upgrade and running `handler`
  /// for each established connection.
  pub fn handle<F>(self, handler: F) -> UpgradeHandler<F>
  where
    F: Fn(&Conn, &Request) -> PetrelResult<()> + Send + Sync + 'static,
  {
    UpgradeHandler { options: self.options, handler: Arc::new(handler) }
  }
}

/// Computes the `Sec-WebSocket-Accept` value for a handshake key.
pub fn handshake_accept(key: &str) -> String {
  let sha1 = Sha1::new().chain_update(key).chain_update(HANDSHAKE_KEY_CONSTANT).finalize();
  base64::prelude::BASE64_STANDARD.encode(sha1)
}

/// The HTTP handler produced by [Upgrader::handle].
pub struct UpgradeHandler<F> {
  options: UpgraderOptions,
  handler: Arc<F>,
}

impl<F> UpgradeHandler<F>
where
  F: Fn(&Conn, &Request) -> PetrelResult<()> + Send + Sync + 'static,
{
  fn upgrade_error(
    &self,
    response: &mut Response,
    status: StatusCode,
    reason: &str,
  ) -> PetrelResult<()> {
    log::debug!("websocket upgrade rejected with {}: {}", status, reason);
    match self.options.upgrade_error_handler.as_ref() {
      Some(handler) => {
        handler(response, status, reason);
        Ok(())
      }
      None => {
        response.status(status);
        if self.options.debug {
          response.string(reason)?;
        }
        Ok(())
      }
    }
  }

  fn spawn_session(
    &self,
    stream: Box<dyn ConnectionStream>,
    request: Request,
  ) -> PetrelResult<()> {
    let handler = Arc::clone(&self.handler);
    let error_handler = self.options.error_handler.clone();
    let debug = self.options.debug;
    let timeout = self.options.timeout;

    std::thread::Builder::new().spawn(move || {
      let conn = Conn::new(stream, timeout);
      let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&conn, &request)));

      let close_result = match outcome {
        Ok(Ok(())) => conn.close(CloseCode::Normal, "Server closed connection"),
        Ok(Err(PetrelError::WebsocketClose(code, _))) if code.is_normal_closure() => {
          conn.close(CloseCode::Normal, "")
        }
        Ok(Err(err)) => {
          if let Some(error_handler) = error_handler.as_ref() {
            error_handler(&err, &request);
          } else {
            log::error!("websocket handler for request {} failed: {}", request.id(), err);
          }

          let message = err.to_string();
          let reason = if debug { truncate_reason(&message) } else { "Internal server error" };
          conn.close(CloseCode::InternalError, reason)
        }
        Err(payload) => {
          let message = util::panic_msg(payload, |msg| msg.to_string());

          #[cfg(feature = "backtrace")]
          if debug {
            log::error!(
              "websocket handler for request {} panicked: {} bt={:?}",
              request.id(),
              message,
              backtrace::Backtrace::new()
            );
          }

          let err = PetrelError::Panic(message.clone());
          if let Some(error_handler) = error_handler.as_ref() {
            error_handler(&err, &request);
          } else {
            log::error!("websocket handler for request {} panicked: {}", request.id(), message);
          }

          let panic_reason = format!("panic: {}", message);
          let reason = if debug { truncate_reason(&panic_reason) } else { "Internal server error" };
          conn.close(CloseCode::InternalError, reason)
        }
      };

      if let Err(err) = close_result {
        log::error!("websocket close handshake for request {} failed: {}", request.id(), err);
      }
    })?;

    Ok(())
  }
}

impl<F> Handler for UpgradeHandler<F>
where
  F: Fn(&Conn, &Request) -> PetrelResult<()> + Send + Sync + 'static,
{
  fn handle(&self, request: &mut Request, response: &mut Response) -> PetrelResult<()> {
    if !request.head().is_upgrade_to("websocket") {
      return self.upgrade_error(
        response,
        StatusCode::BadRequest,
        &WebsocketError::NotAnUpgradeRequest.to_string(),
      );
    }

    if let Some(check_origin) = self.options.check_origin.as_ref() {
      if !check_origin(request) {
        let origin = request.header(HeaderName::Origin).unwrap_or("").to_string();
        return self.upgrade_error(
          response,
          StatusCode::Forbidden,
          &WebsocketError::OriginNotAllowed(origin).to_string(),
        );
      }
    }

    let Some(key) = request.header(HeaderName::SecWebSocketKey) else {
      return self.upgrade_error(
        response,
        StatusCode::BadRequest,
        &WebsocketError::MissingSecWebSocketKeyHeader.to_string(),
      );
    };
    let accept = handshake_accept(key);

    // Some early drafts conveyed the handshake key in the body; drain
    // whatever is left so the socket is clean for frames.
    request.consume_body()?;

    let stream = response.hijack()?;
    response.status(StatusCode::SwitchingProtocols);

    let mut headers = Headers::new();
    headers.set(HeaderName::Upgrade, "websocket");
    headers.set(HeaderName::Connection, "Upgrade");
    headers.set(HeaderName::SecWebSocketAccept, accept);
    if let Some(hook) = self.options.headers_hook.as_ref() {
      hook(request, &mut headers);
    }

    let out = stream.as_stream_write();
    out.write_all(b"HTTP/1.1 101 Switching Protocols\r\n")?;
    for header in headers.iter() {
      out.write_all(header.name.as_str().as_bytes())?;
      out.write_all(b": ")?;
      out.write_all(header.value.as_bytes())?;
      out.write_all(b"\r\n")?;
    }
    out.write_all(b"\r\n")?;
    out.flush()?;

    self.spawn_session(stream, request.detach())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn handshake_accept_rfc_example() {
    // The example value from RFC 6455 section 1.3.
    assert_eq!(
      handshake_accept("dGhlIHNhbXBsZSBub25jZQ=="),
      "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
  }
}
