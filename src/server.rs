//! The server: connection handling, keep-alive and the accept loop.
//!
//! Reads request heads off a connection, hands each request to the router
//! and keeps the connection alive for HTTP/1.1 clients. The server itself
//! owns no OS resources until [Server::run] binds the listener.

use crate::config::Config;
use crate::http::headers::HeaderName;
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::request_body::RequestBody;
use crate::http::request_head::{HttpVersion, RequestHead};
use crate::http::response::Response;
use crate::http::status::StatusCode;
use crate::middleware::parse::ParseMiddleware;
use crate::middleware::{LanguageMiddleware, Middleware, Recovery};
use crate::petrel_error::{PetrelError, PetrelResult, RequestHeadParsingError};
use crate::router::{Router, RouterBuilder};
use crate::stream::{ConnectionStream, IntoConnectionStream};
use crate::util;
use defer_heavy::defer;
use std::io::ErrorKind;
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_HEAD_BUFFER_SIZE: usize = 0x2000;

/// A built server: immutable router plus configuration.
pub struct Server {
  router: Router,
  config: Config,
  /// Core middleware, always part of every chain: recovery, language
  /// negotiation, body parse.
  core: Vec<Arc<dyn Middleware>>,
  max_head_buffer_size: usize,
  read_timeout: Option<Duration>,
  keep_alive_timeout: Option<Duration>,
  write_timeout: Option<Duration>,
  shutdown: AtomicBool,
}

impl Server {
  /// Assembles a server. The core middleware chain is derived from the
  /// configuration.
  pub fn new(config: Config, router: Router) -> Server {
    let core: Vec<Arc<dyn Middleware>> = vec![
      Arc::new(Recovery::new(config.debug())),
      Arc::new(LanguageMiddleware::new(config.supported_languages(), config.default_language())),
      Arc::new(ParseMiddleware::new(config.max_upload_size_mib())),
    ];

    Server {
      router,
      config,
      core,
      max_head_buffer_size: DEFAULT_MAX_HEAD_BUFFER_SIZE,
      read_timeout: None,
      keep_alive_timeout: Some(Duration::from_secs(5)),
      write_timeout: None,
      shutdown: AtomicBool::new(false),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn router(&self) -> &Router {
    &self.router
  }

  /// Marks the server as shut down: no new connections are accepted, the
  /// keep-alive loops of open connections end after their current request.
  pub fn shutdown(&self) {
    self.shutdown.store(true, SeqCst);
  }

  pub fn is_shutdown(&self) -> bool {
    self.shutdown.load(SeqCst)
  }

  /// Handles one client connection until it closes. Serves any number of
  /// keep-alive requests.
  pub fn handle_connection<S: IntoConnectionStream>(&self, stream: S) -> PetrelResult<()> {
    self.handle_connection_scheme(stream, self.config.protocol() == "https")
  }

  /// Like [Server::handle_connection] with an explicit statement about the
  /// transport: `secure` means the bytes arrived over TLS (terminated by an
  /// outer layer). Requests on the wrong scheme are redirected.
  pub fn handle_connection_scheme<S: IntoConnectionStream>(
    &self,
    stream: S,
    secure: bool,
  ) -> PetrelResult<()> {
    if self.is_shutdown() {
      return Err(PetrelError::from_io_kind(ErrorKind::ConnectionAborted));
    }

    let stream = stream.into_connection_stream();
    stream.set_read_timeout(self.read_timeout)?;
    stream.set_write_timeout(self.write_timeout)?;

    let mut count = 0u64;
    loop {
      if count > 0 && !self.handle_keep_alive(stream.as_ref())? {
        break;
      }

      stream.set_read_timeout(self.read_timeout)?;
      let head = RequestHead::read(stream.as_ref(), self.max_head_buffer_size)?;
      count += 1;

      if !self.serve_request(stream.as_ref(), head, secure)? {
        break;
      }
    }

    log::trace!("connection closed");
    Ok(())
  }

  /// Serves one parsed request. Returns whether the connection should be
  /// kept alive for another one.
  fn serve_request(
    &self,
    stream: &dyn ConnectionStream,
    head: RequestHead,
    secure: bool,
  ) -> PetrelResult<bool> {
    let version = head.version();
    let body = body_from_head(&head, stream)?;
    let peer = stream.peer_addr().unwrap_or_default();
    let mut request = Request::new(peer, head, body);
    let mut response = Response::new(stream.new_ref(), version);

    let mut keep_alive = version == HttpVersion::Http11
      && !self.is_shutdown()
      && self.keep_alive_timeout.map(|t| !t.is_zero()).unwrap_or(false)
      && !request
        .header(HeaderName::Connection)
        .map(|c| c.eq_ignore_ascii_case("close"))
        .unwrap_or(false);

    response.set_keep_alive(keep_alive);
    response.set_debug(self.config.debug());
    if request.method() == &Method::Head {
      response.set_discard_body();
    }

    let id = request.id();
    let started = util::epoch_millis();
    let method = request.method().clone();
    let path = request.path().to_string();

    if self.config.protocol() == "https" && !secure {
      // Wrong scheme: send the client to the TLS listener.
      self.redirect_to_https(&mut request, &mut response)?;
    } else {
      self.router.dispatch(&mut request, &mut response, &self.core, self.config.debug())?;
    }

    if response.is_hijacked() {
      // The connection now belongs to whoever hijacked it (WebSocket).
      log::info!("request {} {} {} upgraded", id, method, path);
      return Ok(false);
    }

    keep_alive &= !request.is_connection_close_forced();

    // Drain what the handler did not read so the next request starts at a
    // frame boundary.
    request.consume_body()?;

    let status = response.status_code().map(|s| s.code()).unwrap_or(0);
    log::info!(
      "request {} from {} {} {} ({}) served in {}ms",
      id,
      request.peer_address(),
      method,
      path,
      status,
      util::epoch_millis().saturating_sub(started)
    );

    Ok(keep_alive)
  }

  fn redirect_to_https(
    &self,
    request: &mut Request,
    response: &mut Response,
  ) -> PetrelResult<()> {
    let host = request
      .header(HeaderName::Host)
      .map(str::to_string)
      .unwrap_or_else(|| self.config.host());
    let host = host.split(':').next().unwrap_or("").to_string();
    let location = format!("https://{}{}", host, request.path());

    response.status(StatusCode::PermanentRedirect);
    response.set_header(HeaderName::Location, location);
    response.finish()?;
    Ok(())
  }

  fn handle_keep_alive(&self, stream: &dyn ConnectionStream) -> PetrelResult<bool> {
    if self.is_shutdown() {
      log::trace!("keep-alive: server shutting down");
      return Ok(false);
    }

    if stream.available() > 0 {
      return Ok(true);
    }

    stream.set_read_timeout(self.keep_alive_timeout)?;
    match stream.ensure_readable() {
      Ok(readable) => Ok(readable),
      Err(err) => match err.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => Ok(false),
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
          log::trace!("keep-alive: timed out, closing connection");
          Ok(false)
        }
        _ => Err(err.into()),
      },
    }
  }

  /// Binds the configured host and port and serves until [Server::shutdown].
  /// Every connection runs on its own thread.
  pub fn run(self) -> PetrelResult<()> {
    let addr = format!("{}:{}", self.config.host(), self.config.port());
    self.run_on(addr)
  }

  /// Like [Server::run] with an explicit address.
  pub fn run_on(self, addr: impl ToSocketAddrs) -> PetrelResult<()> {
    let listener = TcpListener::bind(addr)?;
    log::info!("listening on {}", listener.local_addr()?);

    let server = Arc::new(self);
    for connection_id in 1u64.. {
      let (stream, _) = match listener.accept() {
        Ok(accepted) => accepted,
        Err(err) => {
          log::error!("connection {} failed to accept: {}", connection_id, err);
          continue;
        }
      };

      if server.is_shutdown() {
        break;
      }

      let server = Arc::clone(&server);
      let spawned = std::thread::Builder::new().spawn(move || {
        defer! {
          log::trace!("connection {} worker done", connection_id);
        }
        if let Err(err) = server.handle_connection(stream) {
          match err.kind() {
            // Clients hanging up mid-request are routine.
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
              log::debug!("connection {} closed early: {}", connection_id, err)
            }
            _ => log::error!("connection {} failed: {}", connection_id, err),
          }
        }
      });

      if let Err(err) = spawned {
        // May recover on its own once load decreases; drop the connection.
        log::error!("connection {} failed to spawn worker: {}", connection_id, err);
      }
    }

    Ok(())
  }
}

fn body_from_head(
  head: &RequestHead,
  stream: &dyn ConnectionStream,
) -> PetrelResult<Option<RequestBody>> {
  if head.version() == HttpVersion::Http11 {
    match head.header(HeaderName::TransferEncoding) {
      Some("chunked") => return Ok(Some(RequestBody::chunked(stream.new_ref_read()))),
      Some(other) => {
        return Err(
          RequestHeadParsingError::TransferEncodingNotSupported(other.to_string()).into(),
        );
      }
      None => {}
    }
  }

  if let Some(content_length) = head.header(HeaderName::ContentLength) {
    let content_length: u64 = content_length.parse().map_err(|_| {
      RequestHeadParsingError::InvalidContentLength(content_length.to_string())
    })?;

    if content_length == 0 {
      return Ok(None);
    }

    return Ok(Some(RequestBody::with_content_length(stream.new_ref_read(), content_length)));
  }

  Ok(None)
}

/// Builder assembling configuration and router into a [Server].
pub struct ServerBuilder {
  config: Config,
  router: RouterBuilder,
  max_head_buffer_size: usize,
  read_timeout: Option<Duration>,
  keep_alive_timeout: Option<Duration>,
  write_timeout: Option<Duration>,
}

impl Default for ServerBuilder {
  fn default() -> Self {
    ServerBuilder {
      config: Config::default(),
      router: RouterBuilder::new(),
      max_head_buffer_size: DEFAULT_MAX_HEAD_BUFFER_SIZE,
      read_timeout: None,
      keep_alive_timeout: Some(Duration::from_secs(5)),
      write_timeout: None,
    }
  }
}

impl ServerBuilder {
  pub fn new() -> ServerBuilder {
    ServerBuilder::default()
  }

  pub fn config(mut self, config: Config) -> Self {
    self.config = config;
    self
  }

  /// Configures the root router.
  pub fn router<F>(mut self, build: F) -> PetrelResult<Self>
  where
    F: FnOnce(RouterBuilder) -> PetrelResult<RouterBuilder>,
  {
    self.router = build(std::mem::take(&mut self.router))?;
    Ok(self)
  }

  pub fn max_head_buffer_size(mut self, size: usize) -> Self {
    self.max_head_buffer_size = size;
    self
  }

  pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.read_timeout = timeout;
    self
  }

  pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.keep_alive_timeout = timeout;
    self
  }

  pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.write_timeout = timeout;
    self
  }

  pub fn build(self) -> PetrelResult<Server> {
    let router = self.router.build()?;
    let mut server = Server::new(self.config, router);
    server.max_head_buffer_size = self.max_head_buffer_size;
    server.read_timeout = self.read_timeout;
    server.keep_alive_timeout = self.keep_alive_timeout;
    server.write_timeout = self.write_timeout;
    Ok(server)
  }
}
