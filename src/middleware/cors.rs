//! Cross-origin resource sharing.

use crate::http::headers::HeaderName;
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::StatusCode;
use crate::middleware::{Middleware, Next};
use crate::petrel_error::PetrelResult;
use std::time::Duration;

/// CORS options of a router. Attach with `RouterBuilder::with_cors`; the
/// middleware is then installed first in that router's chain and `OPTIONS`
/// is implicitly allowed on all of its routes.
#[derive(Debug, Clone)]
pub struct Cors {
  /// Allowed origins. Empty or starting with `*` allows any origin. Entries
  /// may contain at most one `*` wildcard, e.g. `http://*.example.com`.
  pub allowed_origins: Vec<String>,
  pub allowed_methods: Vec<Method>,
  /// Allowed request headers for preflights. Empty echoes whatever the
  /// request asks for.
  pub allowed_headers: Vec<String>,
  /// Headers exposed to the browser.
  pub exposed_headers: Vec<String>,
  /// Preflight cache duration.
  pub max_age: Duration,
  pub allow_credentials: bool,
  /// Hand preflight requests on to the matched handler instead of answering
  /// them with 204.
  pub options_passthrough: bool,
}

impl Default for Cors {
  fn default() -> Self {
    Cors {
      allowed_origins: Vec::new(),
      allowed_methods: vec![Method::Get, Method::Post, Method::Head],
      allowed_headers: vec!["Origin".to_string(), "Accept".to_string(), "Content-Type".to_string()],
      exposed_headers: Vec::new(),
      max_age: Duration::from_secs(12 * 3600),
      allow_credentials: false,
      options_passthrough: false,
    }
  }
}

/// Matches an origin against a configured entry. Entries hold at most one
/// `*`, matching any run of characters.
fn origin_matches(pattern: &str, origin: &str) -> bool {
  match pattern.split_once('*') {
    None => pattern.eq_ignore_ascii_case(origin),
    Some((prefix, suffix)) => {
      let origin = origin.as_bytes();
      origin.len() >= prefix.len() + suffix.len()
        && origin[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        && origin[origin.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
    }
  }
}

impl Cors {
  fn allows_any_origin(&self) -> bool {
    self.allowed_origins.is_empty()
      || self.allowed_origins.first().map(|o| o.starts_with('*')).unwrap_or(false)
  }

  fn origin_allowed(&self, origin: &str) -> bool {
    self.allowed_origins.iter().any(|pattern| origin_matches(pattern, origin))
  }
}

/// Emits the CORS headers for actual requests and answers preflights.
pub struct CorsMiddleware {
  options: Cors,
}

impl CorsMiddleware {
  pub fn new(options: Cors) -> CorsMiddleware {
    CorsMiddleware { options }
  }

  fn write_common_headers(&self, request: &Request, response: &mut Response) {
    if self.options.allows_any_origin() {
      response.set_header(HeaderName::AccessControlAllowOrigin, "*");
    } else if let Some(origin) = request.header(HeaderName::Origin) {
      if self.options.origin_allowed(origin) {
        let origin = origin.to_string();
        response.set_header(HeaderName::AccessControlAllowOrigin, origin);
      }
      response.headers_mut().add(HeaderName::Vary, "Origin");
    }

    if self.options.allow_credentials {
      response.set_header(HeaderName::AccessControlAllowCredentials, "true");
    }

    if !self.options.exposed_headers.is_empty() {
      response
        .set_header(HeaderName::AccessControlExposeHeaders, self.options.exposed_headers.join(", "));
    }
  }

  fn write_preflight_headers(&self, request: &Request, response: &mut Response) {
    let methods =
      self.options.allowed_methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    response.set_header(HeaderName::AccessControlAllowMethods, methods);

    if self.options.allowed_headers.is_empty() {
      // Echo whatever the request asks for.
      if let Some(requested) = request.header(HeaderName::AccessControlRequestHeaders) {
        let requested = requested.to_string();
        response.set_header(HeaderName::AccessControlAllowHeaders, requested);
      }
      response.headers_mut().add(HeaderName::Vary, "Access-Control-Request-Headers");
    } else {
      response
        .set_header(HeaderName::AccessControlAllowHeaders, self.options.allowed_headers.join(", "));
    }

    let max_age = self.options.max_age.as_secs_f64().round() as u64;
    response.set_header(HeaderName::AccessControlMaxAge, max_age.to_string());
  }
}

impl Middleware for CorsMiddleware {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    self.write_common_headers(request, response);

    let is_preflight = request.method() == &Method::Options
      && request.header(HeaderName::AccessControlRequestMethod).is_some();

    if is_preflight {
      self.write_preflight_headers(request, response);

      if !self.options.options_passthrough {
        response.status(StatusCode::NoContent);
        return Ok(());
      }
    }

    next.run(request, response)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn origin_wildcard_matching() {
    assert!(origin_matches("http://example.com", "http://example.com"));
    assert!(origin_matches("http://example.com", "HTTP://EXAMPLE.COM"));
    assert!(!origin_matches("http://example.com", "http://example.org"));
    assert!(origin_matches("http://*.example.com", "http://api.example.com"));
    assert!(origin_matches("http://*.example.com", "http://a.b.example.com"));
    assert!(!origin_matches("http://*.example.com", "http://example.org"));
    assert!(origin_matches("*", "anything"));
  }

  #[test]
  fn any_origin_detection() {
    assert!(Cors::default().allows_any_origin());
    let restricted =
      Cors { allowed_origins: vec!["http://example.com".to_string()], ..Cors::default() };
    assert!(!restricted.allows_any_origin());
    let wildcard = Cors { allowed_origins: vec!["*".to_string()], ..Cors::default() };
    assert!(wildcard.allows_any_origin());
  }
}
