//! Handlers, middleware and their composition.
//!
//! A middleware wraps the next handler. Applying `[m1, m2, m3]` to a terminal
//! handler `H` yields `m1(m2(m3(H)))`, so `m1` runs outermost. The effective
//! chain for a dispatched route is: core middleware (recovery, language
//! negotiation, body parse), then the global middleware of every router from
//! the root down to the matched one, then the route's own middleware.
//! Composition happens at dispatch time by slice concatenation; routers never
//! copy middleware into their children.

pub mod compress;
pub mod cors;
pub mod parse;
pub mod ratelimit;

use crate::http::qvalue::parse_quality_values;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::petrel_error::{PetrelError, PetrelResult};
use crate::util;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Terminal callable for a matched route.
pub trait Handler: Send + Sync {
  fn handle(&self, request: &mut Request, response: &mut Response) -> PetrelResult<()>;
}

trait IntoHandlerResult {
  fn into_result(self) -> PetrelResult<()>;
}

impl IntoHandlerResult for PetrelResult<()> {
  fn into_result(self) -> PetrelResult<()> {
    self
  }
}

impl IntoHandlerResult for () {
  fn into_result(self) -> PetrelResult<()> {
    Ok(())
  }
}

impl<F, R> Handler for F
where
  R: IntoHandlerResult,
  F: Fn(&mut Request, &mut Response) -> R + Send + Sync,
{
  fn handle(&self, request: &mut Request, response: &mut Response) -> PetrelResult<()> {
    self(request, response).into_result()
  }
}

/// A function that, given the next handler, produces a wrapping handler.
/// Call `next.run(request, response)` to continue the chain; skipping the
/// call aborts the request with whatever the middleware wrote.
pub trait Middleware: Send + Sync {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()>;
}

impl<F, R> Middleware for F
where
  R: IntoHandlerResult,
  F: Fn(&mut Request, &mut Response, &Next<'_>) -> R + Send + Sync,
{
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    self(request, response, next).into_result()
  }
}

/// The rest of a middleware chain plus its terminal handler. Borrowed slices
/// make composition allocation free.
pub struct Next<'a> {
  chain: &'a [Arc<dyn Middleware>],
  handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
  pub fn new(chain: &'a [Arc<dyn Middleware>], handler: &'a dyn Handler) -> Next<'a> {
    Next { chain, handler }
  }

  /// Runs the remaining chain, ending in the terminal handler.
  pub fn run(&self, request: &mut Request, response: &mut Response) -> PetrelResult<()> {
    match self.chain.split_first() {
      Some((middleware, rest)) => {
        middleware.handle(request, response, &Next { chain: rest, handler: self.handler })
      }
      None => self.handler.handle(request, response),
    }
  }
}

/// Boundary converting panics in the chain into a fatal-response pathway:
/// the panic value becomes [PetrelError::Panic], the status is forced to 500
/// and the registered 500 handler runs during finalisation.
///
/// Always installed as the outermost core middleware.
pub struct Recovery {
  debug: bool,
}

impl Recovery {
  pub fn new(debug: bool) -> Recovery {
    Recovery { debug }
  }
}

impl Middleware for Recovery {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    let outcome =
      std::panic::catch_unwind(AssertUnwindSafe(|| next.run(request, response)));

    match outcome {
      Ok(result) => result,
      Err(payload) => {
        let message = util::panic_msg(payload, |msg| msg.to_string());

        #[cfg(feature = "backtrace")]
        if self.debug {
          log::error!(
            "request panicked: {} bt={:?}",
            message,
            backtrace::Backtrace::new()
          );
        }
        #[cfg(not(feature = "backtrace"))]
        if self.debug {
          log::error!("request panicked: {}", message);
        }

        request.force_connection_close();
        response.error(PetrelError::Panic(message));
        Ok(())
      }
    }
  }
}

/// Negotiates the request language from `Accept-Language` against the
/// configured supported set. Falls back to the default language.
pub struct LanguageMiddleware {
  supported: Vec<String>,
  default: String,
}

impl LanguageMiddleware {
  pub fn new(supported: Vec<String>, default: impl ToString) -> LanguageMiddleware {
    LanguageMiddleware { supported, default: default.to_string() }
  }

  fn negotiate(&self, header: &str) -> Option<String> {
    for entry in parse_quality_values(header) {
      for supported in &self.supported {
        if supported.eq_ignore_ascii_case(&entry.value) {
          return Some(supported.clone());
        }
        // `en-US` matches a supported `en` and the other way around.
        let base = entry.value.split('-').next().unwrap_or("");
        let supported_base = supported.split('-').next().unwrap_or("");
        if !base.is_empty() && base.eq_ignore_ascii_case(supported_base) {
          return Some(supported.clone());
        }
      }
    }
    None
  }
}

impl Middleware for LanguageMiddleware {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    let language = request
      .header("Accept-Language")
      .and_then(|header| self.negotiate(header))
      .unwrap_or_else(|| self.default.clone());
    request.set_language(language);
    next.run(request, response)
  }
}
