use petrel::config::Config;
use petrel::data::Data;
use petrel::http::{Request, Response};
use petrel::middleware::{Middleware, Next};
use petrel::petrel_error::PetrelResult;
use petrel::server::ServerBuilder;
use petrel::testing;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Middleware appending a tag to a shared trace so ordering is observable.
struct Tag {
  label: &'static str,
  trace: Arc<std::sync::Mutex<Vec<&'static str>>>,
}

impl Middleware for Tag {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    self.trace.lock().unwrap().push(self.label);
    next.run(request, response)
  }
}

#[test]
fn chain_order_is_global_root_to_leaf_then_route() {
  let trace = Arc::new(std::sync::Mutex::new(Vec::new()));

  let server = ServerBuilder::new()
    .router(|r| {
      r.with_middleware(Tag { label: "root", trace: Arc::clone(&trace) }).scope("/api", |api| {
        api
          .with_middleware(Tag { label: "api", trace: Arc::clone(&trace) })
          .get("/thing")
          .middleware(Tag { label: "route", trace: Arc::clone(&trace) })
          .endpoint(|_: &mut Request, resp: &mut Response| resp.string("ok"))
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/api/thing").unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(*trace.lock().unwrap(), vec!["root", "api", "route"]);
}

#[test]
fn global_middleware_does_not_run_for_not_found() {
  // Core middleware always runs, router middleware only on a match.
  let hits = Arc::new(AtomicUsize::new(0));
  let hits_clone = Arc::clone(&hits);

  let server = ServerBuilder::new()
    .router(move |r| {
      let hits = Arc::clone(&hits_clone);
      r.with_middleware(
        move |req: &mut Request, resp: &mut Response, next: &Next<'_>| -> PetrelResult<()> {
          hits.fetch_add(1, Ordering::SeqCst);
          next.run(req, resp)
        },
      )
      .route_get("/here", |_: &mut Request, resp: &mut Response| resp.string("ok"))
    })
    .unwrap()
    .build()
    .unwrap();

  testing::get(&server, "/here").unwrap();
  assert_eq!(hits.load(Ordering::SeqCst), 1);

  let missing = testing::get(&server, "/gone").unwrap();
  assert_eq!(missing.status, 404);
  assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn panics_become_500_with_json_error() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.route_get("/boom", |_: &mut Request, _: &mut Response| -> PetrelResult<()> {
        panic!("the handler exploded");
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/boom").unwrap();
  assert_eq!(response.status, 500);
  assert_eq!(response.body_json().unwrap()["error"], "Internal Server Error");
}

#[test]
fn debug_mode_reveals_the_panic_message() {
  let server = ServerBuilder::new()
    .config(Config::from_json(r#"{"app": {"debug": true}}"#).unwrap())
    .router(|r| {
      r.route_get("/boom", |_: &mut Request, _: &mut Response| -> PetrelResult<()> {
        panic!("the handler exploded");
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/boom").unwrap();
  assert_eq!(response.status, 500);
  assert_eq!(response.body_json().unwrap()["error"], "panic: the handler exploded");
}

#[test]
fn handler_errors_surface_through_the_response() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.route_get("/fail", |_: &mut Request, _: &mut Response| -> PetrelResult<()> {
        Err(petrel::PetrelError::msg("downstream dependency unavailable"))
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/fail").unwrap();
  assert_eq!(response.status, 500);
}

#[test]
fn language_negotiation_sets_the_request_language() {
  let server = ServerBuilder::new()
    .config(
      Config::from_json(
        r#"{"app": {"defaultLanguage": "en", "supportedLanguages": ["en", "fr"]}}"#,
      )
      .unwrap(),
    )
    .router(|r| {
      r.route_get("/lang", |req: &mut Request, resp: &mut Response| {
        let language = req.language().to_string();
        resp.string(language)
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let negotiated = testing::send_request(
    &server,
    "GET /lang HTTP/1.1\r\nHost: localhost\r\nAccept-Language: fr-FR;q=0.9, de;q=1.0\r\n\r\n",
  )
  .unwrap();
  assert_eq!(negotiated.body_string(), "fr");

  let fallback = testing::get(&server, "/lang").unwrap();
  assert_eq!(fallback.body_string(), "en");
}

#[test]
fn validation_rules_reject_with_422() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.post("/users")
        .rules(|data: &Data| -> Result<(), Vec<String>> {
          match data.get("email").and_then(Data::as_str) {
            Some(email) if email.contains('@') => Ok(()),
            _ => Err(vec!["email is required".to_string()]),
          }
        })
        .endpoint(|_: &mut Request, resp: &mut Response| resp.string("created"))
    })
    .unwrap()
    .build()
    .unwrap();

  let bad = testing::send_request(
    &server,
    "POST /users HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"name\": \"x\"}",
  )
  .unwrap();
  assert_eq!(bad.status, 422);
  assert_eq!(bad.body_json().unwrap()["validationError"][0], "email is required");

  let good = testing::send_request(
    &server,
    "POST /users HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 24\r\n\r\n{\"email\": \"a@example.c\"}",
  )
  .unwrap();
  assert_eq!(good.status, 200);
  assert_eq!(good.body_string(), "created");
}
