//! The request object handed to middleware and handlers.

use crate::data::Data;
use crate::http::headers::HeaderLike;
use crate::http::method::Method;
use crate::http::request_body::RequestBody;
use crate::http::request_head::{HttpVersion, RequestHead};
use crate::router::Route;
use crate::util;
use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// All per-request state: the parsed head, the (possibly still unread) body,
/// parsed inputs, extras, language, user principal and captured route
/// parameters.
///
/// Created once routing starts, dropped when the handler chain returns.
#[derive(Debug)]
pub struct Request {
  id: u128,
  created_at: u128,
  address: String,
  head: RequestHead,
  body: Option<RequestBody>,
  force_connection_close: bool,

  /// Parsed query string: `string -> string | [string]`.
  query: Data,
  /// Parsed body, populated by the parse middleware.
  data: Option<Data>,
  /// Opaque per-request key/value storage, lazily allocated.
  extras: Option<HashMap<String, Box<dyn Any + Send>>>,
  /// Language negotiated from `Accept-Language`.
  language: String,
  /// Authenticated principal, if an auth middleware set one.
  user: Option<Box<dyn Any + Send + Sync>>,

  params: HashMap<String, String>,
  route: Option<Arc<Route>>,
}

fn query_mapping(pairs: &[(String, String)]) -> Data {
  let mut map: HashMap<String, Data> = HashMap::new();
  for (key, value) in pairs {
    let merged = match map.remove(key) {
      None => Data::String(value.clone()),
      Some(Data::String(first)) => {
        Data::Sequence(vec![Data::String(first), Data::String(value.clone())])
      }
      Some(Data::Sequence(mut seq)) => {
        seq.push(Data::String(value.clone()));
        Data::Sequence(seq)
      }
      Some(_) => util::unreachable(),
    };
    map.insert(key.clone(), merged);
  }
  Data::Mapping(map)
}

impl Request {
  /// Builds a request around a parsed head and body.
  pub fn new(address: impl ToString, head: RequestHead, body: Option<RequestBody>) -> Request {
    let query = query_mapping(head.query_pairs());
    Request {
      id: util::next_id(),
      created_at: util::epoch_millis(),
      address: address.to_string(),
      head,
      body,
      force_connection_close: false,
      query,
      data: None,
      extras: None,
      language: String::new(),
      user: None,
      params: HashMap::new(),
      route: None,
    }
  }

  /// Unique id of this request.
  pub fn id(&self) -> u128 {
    self.id
  }

  /// Unix millis at which this request object was created.
  pub fn created_at(&self) -> u128 {
    self.created_at
  }

  /// Address of the peer, `ip:port` for tcp sockets.
  pub fn peer_address(&self) -> &str {
    self.address.as_str()
  }

  /// The peer address with the port stripped. Default rate limiter fingerprint.
  pub fn client_ip(&self) -> &str {
    self.address.rsplit_once(':').map(|(ip, _)| ip).unwrap_or(self.address.as_str())
  }

  pub fn head(&self) -> &RequestHead {
    &self.head
  }

  pub fn head_mut(&mut self) -> &mut RequestHead {
    &mut self.head
  }

  pub fn method(&self) -> &Method {
    self.head.method()
  }

  pub fn path(&self) -> &str {
    self.head.path()
  }

  pub fn version(&self) -> HttpVersion {
    self.head.version()
  }

  pub fn header(&self, name: impl HeaderLike) -> Option<&str> {
    self.head.header(name)
  }

  pub fn body(&self) -> Option<&RequestBody> {
    self.body.as_ref()
  }

  /// Replaces the body. The previous one, if any, is drained first so
  /// keep-alive connections stay framed correctly.
  pub fn set_body_consume_old(&mut self, body: Option<RequestBody>) -> io::Result<()> {
    if let Some(old_body) = self.body.as_ref() {
      old_body.consume()?;
    }
    self.body = body;
    Ok(())
  }

  /// Fully drains the body, if any. Noop when there is none or it was read.
  pub fn consume_body(&self) -> io::Result<()> {
    match self.body.as_ref() {
      Some(body) => body.consume(),
      None => Ok(()),
    }
  }

  /// The parsed query mapping: `string -> string | [string]`.
  pub fn query(&self) -> &Data {
    &self.query
  }

  /// First query value for the key.
  pub fn query_param(&self, key: &str) -> Option<&str> {
    match self.query.get(key) {
      Some(Data::String(s)) => Some(s.as_str()),
      Some(Data::Sequence(seq)) => seq.first().and_then(Data::as_str),
      _ => None,
    }
  }

  /// The parsed body data. None until the parse middleware ran.
  pub fn data(&self) -> Option<&Data> {
    self.data.as_ref()
  }

  pub fn set_data(&mut self, data: Data) {
    self.data = Some(data);
  }

  /// The negotiated language tag. Empty until language negotiation ran.
  pub fn language(&self) -> &str {
    self.language.as_str()
  }

  pub fn set_language(&mut self, language: impl ToString) {
    self.language = language.to_string();
  }

  /// The authenticated user principal, downcast to the expected type.
  pub fn user<T: Any + Send + Sync>(&self) -> Option<&T> {
    self.user.as_ref().and_then(|u| u.downcast_ref::<T>())
  }

  pub fn set_user<T: Any + Send + Sync>(&mut self, user: T) {
    self.user = Some(Box::new(user));
  }

  /// Gets an extra, downcast to the expected type.
  pub fn extra<T: Any + Send>(&self, key: impl AsRef<str>) -> Option<&T> {
    self.extras.as_ref()?.get(key.as_ref())?.downcast_ref::<T>()
  }

  pub fn has_extra(&self, key: impl AsRef<str>) -> bool {
    self.extras.as_ref().map(|e| e.contains_key(key.as_ref())).unwrap_or(false)
  }

  /// Sets an extra, returning the previous boxed value of the key.
  pub fn set_extra<T: Any + Send>(
    &mut self,
    key: impl ToString,
    value: T,
  ) -> Option<Box<dyn Any + Send>> {
    self.extras.get_or_insert_with(HashMap::new).insert(key.to_string(), Box::new(value))
  }

  pub fn remove_extra(&mut self, key: impl AsRef<str>) -> Option<Box<dyn Any + Send>> {
    self.extras.as_mut()?.remove(key.as_ref())
  }

  /// Captured route parameter.
  pub fn param(&self, name: impl AsRef<str>) -> Option<&str> {
    self.params.get(name.as_ref()).map(String::as_str)
  }

  pub fn params(&self) -> &HashMap<String, String> {
    &self.params
  }

  pub fn set_params(&mut self, params: HashMap<String, String>) {
    self.params = params;
  }

  /// The matched route, available to middleware running after routing.
  pub fn route(&self) -> Option<&Arc<Route>> {
    self.route.as_ref()
  }

  pub fn set_route(&mut self, route: Arc<Route>) {
    self.route = Some(route);
  }

  /// Moves the request out, leaving an empty husk behind. Used when a
  /// handler hands the request to a task outliving the HTTP lifecycle,
  /// such as a WebSocket session.
  pub fn detach(&mut self) -> Request {
    let head = util::unwrap_ok(RequestHead::synthetic(
      Method::Get,
      "/",
      crate::http::headers::Headers::new(),
    ));
    std::mem::replace(self, Request::new("", head, None))
  }

  /// Forces the connection to be closed after this request is handled.
  pub fn force_connection_close(&mut self) {
    self.force_connection_close = true;
  }

  pub fn is_connection_close_forced(&self) -> bool {
    self.force_connection_close
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::http::headers::Headers;

  fn request_for(path: &str) -> Request {
    let head = RequestHead::synthetic(Method::Get, path, Headers::new()).unwrap();
    Request::new("198.51.100.7:4122", head, None)
  }

  #[test]
  fn query_mapping_single_and_multi() {
    let request = request_for("/search?q=petrel&tag=a&tag=b&tag=c");
    assert_eq!(request.query_param("q"), Some("petrel"));

    let tags = request.query().get("tag").unwrap();
    let tags: Vec<&str> = tags.as_sequence().unwrap().iter().filter_map(Data::as_str).collect();
    assert_eq!(tags, vec!["a", "b", "c"]);
  }

  #[test]
  fn client_ip_strips_port() {
    let request = request_for("/");
    assert_eq!(request.client_ip(), "198.51.100.7");
  }

  #[test]
  fn extras_round_trip() {
    let mut request = request_for("/");
    assert!(!request.has_extra("count"));
    request.set_extra("count", 5usize);
    assert_eq!(request.extra::<usize>("count"), Some(&5));
    assert!(request.extra::<String>("count").is_none());
    request.remove_extra("count");
    assert!(!request.has_extra("count"));
  }

  #[test]
  fn user_principal() {
    #[derive(Debug, PartialEq)]
    struct AdminUser(&'static str);

    let mut request = request_for("/");
    assert!(request.user::<AdminUser>().is_none());
    request.set_user(AdminUser("alex"));
    assert_eq!(request.user::<AdminUser>(), Some(&AdminUser("alex")));
  }
}
