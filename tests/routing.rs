use petrel::config::Config;
use petrel::http::headers::HeaderName;
use petrel::http::{Request, Response};
use petrel::petrel_error::PetrelResult;
use petrel::server::{Server, ServerBuilder};
use petrel::testing;

fn product_by_id(request: &mut Request, response: &mut Response) -> PetrelResult<()> {
  let id = request.param("id").unwrap_or("?").to_string();
  response.string(format!("product:{}", id))
}

fn product_test(_: &mut Request, response: &mut Response) -> PetrelResult<()> {
  response.string("test-product")
}

fn server() -> Server {
  ServerBuilder::new()
    .config(Config::default())
    .router(|r| {
      r.route_get("/product/{id:[0-9]+}", product_by_id)?
        .route_get("/product/test", product_test)
    })
    .unwrap()
    .build()
    .unwrap()
}

#[test]
fn regex_route_captures_parameter() {
  let server = server();
  let response = testing::get(&server, "/product/5").unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(response.body_string(), "product:5");
}

#[test]
fn literal_route_wins_where_regex_does_not_match() {
  let server = server();
  let response = testing::get(&server, "/product/test").unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(response.body_string(), "test-product");
}

#[test]
fn unmatched_path_is_404_with_json_error() {
  let server = server();
  let response = testing::get(&server, "/nope").unwrap();
  assert_eq!(response.status, 404);
  assert_eq!(response.body_json().unwrap()["error"], "Not Found");
}

#[test]
fn wrong_method_is_405_with_allow_header() {
  let server = server();
  let response = testing::send_request(
    &server,
    "DELETE /product/5 HTTP/1.1\r\nHost: localhost\r\n\r\n",
  )
  .unwrap();
  assert_eq!(response.status, 405);
  assert_eq!(response.header(HeaderName::Allow), Some("GET"));
}

#[test]
fn head_is_implicitly_allowed_on_get_routes() {
  let server = server();
  let response = testing::send_request(
    &server,
    "HEAD /product/5 HTTP/1.1\r\nHost: localhost\r\n\r\n",
  )
  .unwrap();
  assert_eq!(response.status, 200);
  assert!(response.body.is_empty());
}

#[test]
fn subrouter_takes_priority_over_sibling_route() {
  // Both the subrouter route and the top-level route match /api/item. The
  // subrouter must win even though the top-level route also matches.
  let server = ServerBuilder::new()
    .router(|r| {
      r.route_get("/api/{rest}", |_: &mut Request, resp: &mut Response| resp.string("leaf"))?
        .scope("/api", |api| {
          api.route_get("/{rest}", |_: &mut Request, resp: &mut Response| {
            resp.string("subrouter")
          })
        })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/api/item").unwrap();
  assert_eq!(response.body_string(), "subrouter");
}

#[test]
fn empty_prefix_group_does_not_shadow_parent_routes() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.scope("", |group| {
        group.route_get("/grouped", |_: &mut Request, resp: &mut Response| resp.string("grouped"))
      })?
      .route_get("/parent", |_: &mut Request, resp: &mut Response| resp.string("parent"))
    })
    .unwrap()
    .build()
    .unwrap();

  assert_eq!(testing::get(&server, "/grouped").unwrap().body_string(), "grouped");
  // The group is considered first but the parent's own routes still match.
  assert_eq!(testing::get(&server, "/parent").unwrap().body_string(), "parent");
}

#[test]
fn subrouter_prefix_parameters_are_captured() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.scope("/tenant/{tenant}", |t| {
        t.route_get("/info", |req: &mut Request, resp: &mut Response| {
          let tenant = req.param("tenant").unwrap_or("?").to_string();
          resp.string(tenant)
        })
      })
    })
    .unwrap()
    .build()
    .unwrap();

  assert_eq!(testing::get(&server, "/tenant/acme/info").unwrap().body_string(), "acme");
}

#[test]
fn named_routes_build_urls() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.scope("/api", |api| {
        api
          .get("/product/{id}")
          .name("product.show")
          .endpoint(product_by_id)
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let route = server.router().route_by_name("product.show").unwrap();
  assert_eq!(route.build_url(&[("id", "42")]).unwrap(), "/api/product/42");
  assert!(server.router().route_by_name("missing").is_none());
}

#[test]
fn duplicate_route_names_are_rejected() {
  let result = ServerBuilder::new()
    .router(|r| {
      r.get("/a")
        .name("dup")
        .endpoint(product_test)?
        .get("/b")
        .name("dup")
        .endpoint(product_test)
    })
    .unwrap()
    .build();

  assert!(result.is_err());
}

#[test]
fn status_handler_on_owning_router_wins_over_root() {
  fn teapot_404(_: &mut Request, response: &mut Response) -> PetrelResult<()> {
    response.string("custom sub 404")
  }

  let server = ServerBuilder::new()
    .router(|r| {
      r.status_handler(404, |_: &mut Request, resp: &mut Response| resp.string("root 404"))
        .scope("/sub", |sub| {
          Ok(
            sub
              .status_handler(404, teapot_404)
              .route_get("/missing-status", |_: &mut Request, resp: &mut Response| {
                resp.status(404u16);
                Ok(())
              })?,
          )
        })?
        .route_get("/top-missing", |_: &mut Request, resp: &mut Response| {
          resp.status(404u16);
          Ok(())
        })
    })
    .unwrap()
    .build()
    .unwrap();

  // A route owned by the subrouter uses the subrouter's handler.
  let sub = testing::get(&server, "/sub/missing-status").unwrap();
  assert_eq!(sub.body_string(), "custom sub 404");

  // A top-level route falls back to the root handler.
  let top = testing::get(&server, "/top-missing").unwrap();
  assert_eq!(top.body_string(), "root 404");

  // A request that matches nothing at all also uses the root handler.
  let nothing = testing::get(&server, "/completely/unknown").unwrap();
  assert_eq!(nothing.body_string(), "root 404");
}
