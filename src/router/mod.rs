//! Request routing.
//!
//! A [Router] is a tree of nodes, each carrying a URI prefix, ordered routes,
//! child routers, globally applied middleware, status handlers and optional
//! CORS options. Matching walks the tree with a residual path; subrouters
//! take priority over routes registered at the same level. The effective
//! middleware chain is computed at dispatch time by concatenating the
//! ancestor chains, never by copying.

mod builder;

pub use builder::{RouteBuilder, RouterBuilder};

use crate::data::Data;
use crate::http::headers::HeaderName;
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::StatusCode;
use crate::middleware::{Handler, Middleware, Next};
use crate::petrel_error::{PetrelResult, RouterError};
use regex::Regex;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io;
use std::sync::Arc;

/// Validation hook. The rule engine itself lives outside the core; routes
/// carry an opaque rule set which the dispatcher invokes against the parsed
/// request data. Failures produce a 422 with the collected messages.
pub trait RuleSet: Send + Sync {
  fn validate(&self, data: &Data) -> Result<(), Vec<String>>;
}

impl<F> RuleSet for F
where
  F: Fn(&Data) -> Result<(), Vec<String>> + Send + Sync,
{
  fn validate(&self, data: &Data) -> Result<(), Vec<String>> {
    self(data)
  }
}

/// Compiles a URI with `{name}` / `{name:pattern}` placeholders into a regex
/// pattern (unanchored). `{name}` defaults to `[^/]+`.
fn compile_pattern(uri: &str) -> Result<String, RouterError> {
  let mut pattern = String::new();
  let mut rest = uri;

  while let Some(open) = rest.find('{') {
    pattern.push_str(&regex::escape(&rest[..open]));
    let after = &rest[open + 1..];

    // Find the matching closing brace; the pattern itself may contain
    // braces, e.g. `{id:[0-9]{2}}`.
    let mut depth = 1usize;
    let mut close = None;
    for (i, c) in after.char_indices() {
      match c {
        '{' => depth += 1,
        '}' => {
          depth -= 1;
          if depth == 0 {
            close = Some(i);
            break;
          }
        }
        _ => {}
      }
    }

    let Some(close) = close else {
      return Err(RouterError::UnclosedPlaceholder(uri.to_string()));
    };

    let placeholder = &after[..close];
    let (name, sub_pattern) = placeholder.split_once(':').unwrap_or((placeholder, "[^/]+"));
    pattern.push_str(&format!("(?P<{}>{})", name, sub_pattern));
    rest = &after[close + 1..];
  }

  pattern.push_str(&regex::escape(rest));
  Ok(pattern)
}

fn compile_route_regex(uri: &str) -> Result<Regex, RouterError> {
  let pattern = compile_pattern(uri)?;
  Regex::new(&format!("^{}$", pattern)).map_err(|e| {
    RouterError::PlaceholderRegexSyntax(uri.to_string(), pattern, e.to_string())
  })
}

fn compile_prefix_regex(prefix: &str) -> Result<Option<Regex>, RouterError> {
  if prefix.is_empty() {
    return Ok(None);
  }
  let pattern = compile_pattern(prefix)?;
  let regex = Regex::new(&format!("^{}", pattern)).map_err(|e| {
    RouterError::PlaceholderRegexSyntax(prefix.to_string(), pattern, e.to_string())
  })?;
  Ok(Some(regex))
}

/// Extracts named captures of a full or prefix match into the params map.
fn capture_params(regex: &Regex, captures: &regex::Captures<'_>, params: &mut HashMap<String, String>) {
  for name in regex.capture_names().flatten() {
    if let Some(value) = captures.name(name) {
      params.insert(name.to_string(), value.as_str().to_string());
    }
  }
}

/// An immutable registered route.
pub struct Route {
  /// The URI segment as registered, placeholders included.
  uri: String,
  /// The full URI from the root, prefixes joined. Used for reverse lookup.
  full_uri: String,
  regex: Regex,
  methods: Vec<Method>,
  pub(crate) handler: Arc<dyn Handler>,
  pub(crate) middleware: Vec<Arc<dyn Middleware>>,
  name: Option<String>,
  pub(crate) rules: Option<Arc<dyn RuleSet>>,
}

impl Debug for Route {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("Route({:?} {})", self.methods, self.full_uri))
  }
}

impl Route {
  /// The URI segment this route was registered under.
  pub fn uri(&self) -> &str {
    self.uri.as_str()
  }

  /// The full URI including all subrouter prefixes.
  pub fn full_uri(&self) -> &str {
    self.full_uri.as_str()
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub fn methods(&self) -> &[Method] {
    &self.methods
  }

  /// True if the route accepts the method. `HEAD` is implicitly allowed on
  /// `GET` routes.
  fn allows_method(&self, method: &Method) -> bool {
    if self.methods.contains(method) {
      return true;
    }
    *method == Method::Head && self.methods.contains(&Method::Get)
  }

  /// Builds the URI of this route with the placeholders substituted.
  pub fn build_url(&self, params: &[(&str, &str)]) -> PetrelResult<String> {
    let mut url = String::new();
    let mut rest = self.full_uri.as_str();

    while let Some(open) = rest.find('{') {
      url.push_str(&rest[..open]);
      let after = &rest[open + 1..];
      let mut depth = 1usize;
      let mut close = 0usize;
      for (i, c) in after.char_indices() {
        match c {
          '{' => depth += 1,
          '}' => {
            depth -= 1;
            if depth == 0 {
              close = i;
              break;
            }
          }
          _ => {}
        }
      }

      let placeholder = &after[..close];
      let name = placeholder.split_once(':').map(|(n, _)| n).unwrap_or(placeholder);
      let value = params.iter().find(|(k, _)| *k == name).map(|(_, v)| *v).ok_or_else(|| {
        RouterError::MissingUriParameter(self.full_uri.clone(), name.to_string())
      })?;
      url.push_str(value);
      rest = &after[close + 1..];
    }

    url.push_str(rest);
    Ok(url)
  }
}

/// A node of the routing tree. The root owns all descendants.
pub struct Router {
  prefix: String,
  prefix_regex: Option<Regex>,
  routes: Vec<Arc<Route>>,
  children: Vec<Router>,
  pub(crate) middleware: Vec<Arc<dyn Middleware>>,
  status_handlers: HashMap<u16, Arc<dyn Handler>>,
  /// Reverse lookup, populated on the root only. Names are globally unique.
  names: HashMap<String, Arc<Route>>,
}

impl Debug for Router {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!(
      "Router(prefix={:?}, routes={:?}, children={})",
      self.prefix,
      self.routes,
      self.children.len()
    ))
  }
}

/// Working state of a completed match.
enum MatchOutcome<'a> {
  Found {
    route: &'a Arc<Route>,
    params: HashMap<String, String>,
    stack: Vec<&'a Router>,
  },
  /// At least one route matched the URI but not the method.
  MethodNotAllowed {
    allowed: Vec<Method>,
    stack: Vec<&'a Router>,
  },
  NotFound,
}

impl Router {
  pub(crate) fn assemble(
    prefix: String,
    routes: Vec<Arc<Route>>,
    children: Vec<Router>,
    middleware: Vec<Arc<dyn Middleware>>,
    status_handlers: HashMap<u16, Arc<dyn Handler>>,
    names: HashMap<String, Arc<Route>>,
  ) -> PetrelResult<Router> {
    let prefix_regex = compile_prefix_regex(&prefix)?;
    Ok(Router { prefix, prefix_regex, routes, children, middleware, status_handlers, names })
  }

  /// Looks up a route by its globally unique name. Root router only.
  pub fn route_by_name(&self, name: &str) -> Option<&Arc<Route>> {
    self.names.get(name)
  }

  /// Matches method + path against the tree. `stack` accumulates the router
  /// chain from the root to the matched node.
  fn match_residual<'a>(
    &'a self,
    residual: &str,
    method: &Method,
    params: HashMap<String, String>,
    stack: &mut Vec<&'a Router>,
  ) -> MatchOutcome<'a> {
    stack.push(self);
    let mut not_allowed: Vec<Method> = Vec::new();
    let mut not_allowed_stack: Option<Vec<&'a Router>> = None;

    // Subrouters take priority over the routes of this node, even when one
    // of those routes would match too.
    for child in &self.children {
      let (child_residual, child_params) = match child.prefix_regex.as_ref() {
        None => (residual.to_string(), params.clone()),
        Some(regex) => {
          let Some(captures) = regex.captures(residual) else {
            continue;
          };
          let end = captures.get(0).map(|m| m.end()).unwrap_or(0);
          // The prefix must end on a segment boundary.
          if !residual[end..].is_empty() && !residual[end..].starts_with('/') {
            continue;
          }
          let mut child_params = params.clone();
          capture_params(regex, &captures, &mut child_params);
          (residual[end..].to_string(), child_params)
        }
      };

      match child.match_residual(&child_residual, method, child_params, stack) {
        MatchOutcome::Found { route, params, stack: found_stack } => {
          return MatchOutcome::Found { route, params, stack: found_stack };
        }
        MatchOutcome::MethodNotAllowed { allowed, stack: candidate_stack } => {
          // Remember the candidate but keep searching for a full match.
          for m in allowed {
            if !not_allowed.contains(&m) {
              not_allowed.push(m);
            }
          }
          not_allowed_stack.get_or_insert(candidate_stack);
        }
        MatchOutcome::NotFound => {}
      }
    }

    for route in &self.routes {
      let Some(captures) = route.regex.captures(residual) else {
        continue;
      };

      if route.allows_method(method) {
        let mut params = params.clone();
        capture_params(&route.regex, &captures, &mut params);
        return MatchOutcome::Found { route, params, stack: stack.clone() };
      }

      for m in &route.methods {
        if !not_allowed.contains(m) {
          not_allowed.push(m.clone());
        }
      }
      not_allowed_stack.get_or_insert_with(|| stack.clone());
    }

    stack.pop();

    if !not_allowed.is_empty() {
      return MatchOutcome::MethodNotAllowed {
        allowed: not_allowed,
        stack: not_allowed_stack.unwrap_or_default(),
      };
    }

    MatchOutcome::NotFound
  }

  /// Dispatches a request through this (root) router: match, compose the
  /// middleware chain, run it, then finalise the response (status handler +
  /// writer close).
  pub fn dispatch(
    &self,
    request: &mut Request,
    response: &mut Response,
    core: &[Arc<dyn Middleware>],
    debug: bool,
  ) -> io::Result<()> {
    let mut stack = Vec::new();
    let outcome = self.match_residual(request.path(), request.method(), HashMap::new(), &mut stack);

    let (chain, terminal, handler_stack): (Vec<Arc<dyn Middleware>>, Box<dyn Handler>, Vec<&Router>) =
      match outcome {
        MatchOutcome::Found { route, params, stack } => {
          request.set_params(params);
          request.set_route(Arc::clone(route));

          let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();
          chain.extend_from_slice(core);
          for router in &stack {
            chain.extend(router.middleware.iter().cloned());
          }
          chain.extend(route.middleware.iter().cloned());

          (chain, Box::new(RouteTerminal { route: Arc::clone(route) }), stack)
        }
        MatchOutcome::MethodNotAllowed { allowed, stack } => {
          (core.to_vec(), Box::new(MethodNotAllowedTerminal { allowed }), stack)
        }
        MatchOutcome::NotFound => (core.to_vec(), Box::new(NotFoundTerminal), Vec::new()),
      };

    if let Err(err) = Next::new(&chain, terminal.as_ref()).run(request, response) {
      response.error(err);
    }

    self.finalize(&handler_stack, request, response, debug)
  }

  /// Response finalisation: runs the status handler registered closest to
  /// the matched route (falling back to the root), emits the default error
  /// body where none is registered, then closes the writer chain.
  fn finalize(
    &self,
    stack: &[&Router],
    request: &mut Request,
    response: &mut Response,
    debug: bool,
  ) -> io::Result<()> {
    if !response.is_hijacked() {
      if let Some(status) = response.status_code().cloned() {
        let handler = stack
          .iter()
          .rev()
          .find_map(|router| router.status_handlers.get(&status.code()))
          .or_else(|| self.status_handlers.get(&status.code()));

        match handler {
          Some(handler) => {
            let handler = Arc::clone(handler);
            if let Err(err) = handler.handle(request, response) {
              // A failing status handler must not recurse into itself.
              log::error!("request {}: status handler for {} failed: {}", request.id(), status, err);
              request.force_connection_close();
            }
          }
          None => {
            if status.code() >= 400 && response.is_empty() && !response.wrote_header() {
              let message = match response.error_ref() {
                Some(err) if debug => err.to_string(),
                _ => status.reason().to_string(),
              };
              response.json(&serde_json::json!({ "error": message })).ok();
            }
          }
        }
      }
    }

    response.finish()
  }
}

/// Terminal for a matched route: validation hook, then the route handler.
struct RouteTerminal {
  route: Arc<Route>,
}

impl Handler for RouteTerminal {
  fn handle(&self, request: &mut Request, response: &mut Response) -> PetrelResult<()> {
    if let Some(rules) = self.route.rules.as_ref() {
      let data = request.data().cloned().unwrap_or(Data::Null);
      if let Err(errors) = rules.validate(&data) {
        response.status(StatusCode::UnprocessableEntity);
        response.json(&serde_json::json!({ "validationError": errors }))?;
        return Ok(());
      }
    }

    self.route.handler.handle(request, response)
  }
}

struct MethodNotAllowedTerminal {
  allowed: Vec<Method>,
}

impl Handler for MethodNotAllowedTerminal {
  fn handle(&self, _request: &mut Request, response: &mut Response) -> PetrelResult<()> {
    let mut allowed = self.allowed.clone();
    allowed.sort();
    let list = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    response.set_header(HeaderName::Allow, list);
    response.status(StatusCode::MethodNotAllowed);
    Ok(())
  }
}

struct NotFoundTerminal;

impl Handler for NotFoundTerminal {
  fn handle(&self, _request: &mut Request, response: &mut Response) -> PetrelResult<()> {
    response.status(StatusCode::NotFound);
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn pattern_compilation() {
    assert_eq!(compile_pattern("/product/{id}").unwrap(), "/product/(?P<id>[^/]+)");
    assert_eq!(
      compile_pattern("/product/{id:[0-9]+}").unwrap(),
      "/product/(?P<id>[0-9]+)"
    );
    // Braces inside the sub-pattern are balanced.
    assert_eq!(
      compile_pattern("/code/{c:[a-z]{3}}").unwrap(),
      "/code/(?P<c>[a-z]{3})"
    );
    // Literal parts are escaped.
    assert_eq!(compile_pattern("/a.b").unwrap(), "/a\\.b");
    assert!(matches!(
      compile_pattern("/x/{unclosed"),
      Err(RouterError::UnclosedPlaceholder(_))
    ));
  }

  #[test]
  fn route_regex_is_anchored() {
    let regex = compile_route_regex("/product/{id:[0-9]+}").unwrap();
    assert!(regex.is_match("/product/5"));
    assert!(!regex.is_match("/product/5/extra"));
    assert!(!regex.is_match("/x/product/5"));
    assert!(!regex.is_match("/product/abc"));
  }

  #[test]
  fn build_url_substitution() {
    let route = Route {
      uri: "/product/{id}".to_string(),
      full_uri: "/api/product/{id}".to_string(),
      regex: compile_route_regex("/product/{id}").unwrap(),
      methods: vec![Method::Get],
      handler: Arc::new(|_: &mut Request, _: &mut Response| -> PetrelResult<()> { Ok(()) }),
      middleware: Vec::new(),
      name: None,
      rules: None,
    };

    assert_eq!(route.build_url(&[("id", "42")]).unwrap(), "/api/product/42");
    assert!(route.build_url(&[]).is_err());
  }
}
