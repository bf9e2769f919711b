//! Builders for the routing tree.

use crate::http::method::Method;
use crate::middleware::cors::{Cors, CorsMiddleware};
use crate::middleware::{Handler, Middleware};
use crate::petrel_error::{PetrelResult, RouterError};
use crate::router::{compile_route_regex, Route, Router, RuleSet};
use std::collections::HashMap;
use std::sync::Arc;

struct RouteProto {
  uri: String,
  methods: Vec<Method>,
  handler: Arc<dyn Handler>,
  middleware: Vec<Arc<dyn Middleware>>,
  name: Option<String>,
  rules: Option<Arc<dyn RuleSet>>,
}

/// Builds a router node: routes, subrouters, middleware, status handlers and
/// CORS options.
#[derive(Default)]
pub struct RouterBuilder {
  prefix: String,
  routes: Vec<RouteProto>,
  children: Vec<RouterBuilder>,
  middleware: Vec<Arc<dyn Middleware>>,
  status_handlers: HashMap<u16, Arc<dyn Handler>>,
  cors: Option<Cors>,
}

impl RouterBuilder {
  pub fn new() -> Self {
    RouterBuilder::default()
  }

  /// Adds a middleware applied to every route of this router and all of its
  /// subrouters. Subrouters inherit by chain concatenation at dispatch time,
  /// the middleware is never copied.
  pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
    self.middleware.push(Arc::new(middleware));
    self
  }

  /// Registers a specialised handler for responses finishing with the given
  /// status code. Consulted for the matched route's router first, then its
  /// ancestors up to the root.
  pub fn status_handler<H: Handler + 'static>(mut self, status: u16, handler: H) -> Self {
    self.status_handlers.insert(status, Arc::new(handler));
    self
  }

  /// Enables CORS on this router. The CORS middleware is installed first in
  /// this router's chain and `OPTIONS` is implicitly added to the allowed
  /// methods of all its routes (subrouters included).
  pub fn with_cors(mut self, cors: Cors) -> Self {
    self.cors = Some(cors);
    self
  }

  /// Adds a subrouter under the given URI prefix. The prefix may contain
  /// placeholders. An empty prefix creates a group sharing this router's URI.
  pub fn scope<F>(mut self, prefix: &str, build: F) -> PetrelResult<Self>
  where
    F: FnOnce(RouterBuilder) -> PetrelResult<RouterBuilder>,
  {
    let mut child = build(RouterBuilder::new())?;
    child.prefix = prefix.to_string();
    self.children.push(child);
    Ok(self)
  }

  /// Adds a route for the given methods. Placeholder syntax: `{name}`
  /// (matches one segment) or `{name:regex}`.
  pub fn route<H: Handler + 'static>(
    mut self,
    methods: &[Method],
    uri: &str,
    handler: H,
  ) -> PetrelResult<Self> {
    // Surface bad placeholder patterns at registration time.
    compile_route_regex(uri)?;
    self.routes.push(RouteProto {
      uri: uri.to_string(),
      methods: methods.to_vec(),
      handler: Arc::new(handler),
      middleware: Vec::new(),
      name: None,
      rules: None,
    });
    Ok(self)
  }

  pub fn route_get<H: Handler + 'static>(self, uri: &str, handler: H) -> PetrelResult<Self> {
    self.route(&[Method::Get], uri, handler)
  }

  pub fn route_post<H: Handler + 'static>(self, uri: &str, handler: H) -> PetrelResult<Self> {
    self.route(&[Method::Post], uri, handler)
  }

  pub fn route_put<H: Handler + 'static>(self, uri: &str, handler: H) -> PetrelResult<Self> {
    self.route(&[Method::Put], uri, handler)
  }

  pub fn route_patch<H: Handler + 'static>(self, uri: &str, handler: H) -> PetrelResult<Self> {
    self.route(&[Method::Patch], uri, handler)
  }

  pub fn route_delete<H: Handler + 'static>(self, uri: &str, handler: H) -> PetrelResult<Self> {
    self.route(&[Method::Delete], uri, handler)
  }

  pub fn route_options<H: Handler + 'static>(self, uri: &str, handler: H) -> PetrelResult<Self> {
    self.route(&[Method::Options], uri, handler)
  }

  /// Starts a route builder for fine grained registration (name, per-route
  /// middleware, validation rules, additional methods).
  pub fn get(self, uri: &str) -> RouteBuilder {
    RouteBuilder::new(self, Method::Get, uri)
  }

  pub fn post(self, uri: &str) -> RouteBuilder {
    RouteBuilder::new(self, Method::Post, uri)
  }

  pub fn put(self, uri: &str) -> RouteBuilder {
    RouteBuilder::new(self, Method::Put, uri)
  }

  pub fn patch(self, uri: &str) -> RouteBuilder {
    RouteBuilder::new(self, Method::Patch, uri)
  }

  pub fn delete(self, uri: &str) -> RouteBuilder {
    RouteBuilder::new(self, Method::Delete, uri)
  }

  pub fn method(self, method: Method, uri: &str) -> RouteBuilder {
    RouteBuilder::new(self, method, uri)
  }

  /// Builds the immutable routing tree. Must be called on the root.
  pub fn build(self) -> PetrelResult<Router> {
    let mut names = HashMap::new();
    let mut root = self.build_node("", false, &mut names)?;
    // Only the root holds the reverse lookup table.
    root.names = names;
    Ok(root)
  }

  fn build_node(
    self,
    base_uri: &str,
    inherited_cors: bool,
    names: &mut HashMap<String, Arc<Route>>,
  ) -> PetrelResult<Router> {
    let cors_active = inherited_cors || self.cors.is_some();

    let mut middleware = self.middleware;
    if let Some(cors) = self.cors {
      // The CORS middleware always runs first in this router's chain.
      middleware.insert(0, Arc::new(CorsMiddleware::new(cors)));
    }

    let node_uri = format!("{}{}", base_uri, self.prefix);

    let mut routes = Vec::with_capacity(self.routes.len());
    for proto in self.routes {
      let mut methods = proto.methods;
      if cors_active && !methods.contains(&Method::Options) {
        methods.push(Method::Options);
      }

      let route = Arc::new(Route {
        regex: compile_route_regex(&proto.uri)?,
        full_uri: format!("{}{}", node_uri, proto.uri),
        uri: proto.uri,
        methods,
        handler: proto.handler,
        middleware: proto.middleware,
        name: proto.name,
        rules: proto.rules,
      });

      if let Some(name) = route.name() {
        if names.insert(name.to_string(), Arc::clone(&route)).is_some() {
          return Err(RouterError::DuplicateRouteName(name.to_string()).into());
        }
      }

      routes.push(route);
    }

    let mut children = Vec::with_capacity(self.children.len());
    for child in self.children {
      children.push(child.build_node(&node_uri, cors_active, names)?);
    }

    Router::assemble(self.prefix, routes, children, middleware, self.status_handlers, HashMap::new())
  }
}

/// Builder for a single route.
pub struct RouteBuilder {
  inner: RouterBuilder,
  uri: String,
  methods: Vec<Method>,
  middleware: Vec<Arc<dyn Middleware>>,
  name: Option<String>,
  rules: Option<Arc<dyn RuleSet>>,
}

impl RouteBuilder {
  fn new(inner: RouterBuilder, method: Method, uri: &str) -> RouteBuilder {
    RouteBuilder {
      inner,
      uri: uri.to_string(),
      methods: vec![method],
      middleware: Vec::new(),
      name: None,
      rules: None,
    }
  }

  /// Allows an additional method on this route.
  pub fn also(mut self, method: Method) -> Self {
    if !self.methods.contains(&method) {
      self.methods.push(method);
    }
    self
  }

  /// Names the route for reverse URI lookup. Names are globally unique.
  pub fn name(mut self, name: impl ToString) -> Self {
    self.name = Some(name.to_string());
    self
  }

  /// Adds a middleware applied to this route only.
  pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
    self.middleware.push(Arc::new(middleware));
    self
  }

  /// Attaches validation rules, checked against the parsed body before the
  /// handler runs.
  pub fn rules<R: RuleSet + 'static>(mut self, rules: R) -> Self {
    self.rules = Some(Arc::new(rules));
    self
  }

  /// Finishes the route with its terminal handler.
  pub fn endpoint<H: Handler + 'static>(mut self, handler: H) -> PetrelResult<RouterBuilder> {
    compile_route_regex(&self.uri)?;
    self.inner.routes.push(RouteProto {
      uri: self.uri,
      methods: self.methods,
      handler: Arc::new(handler),
      middleware: self.middleware,
      name: self.name,
      rules: self.rules,
    });
    Ok(self.inner)
  }
}
