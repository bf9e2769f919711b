use petrel::http::headers::HeaderName;
use petrel::http::{Request, Response};
use petrel::middleware::compress::CompressMiddleware;
use petrel::petrel_error::PetrelResult;
use petrel::server::{Server, ServerBuilder};
use petrel::testing;
use std::io::Read;

const BODY: &str = "petrel petrel petrel petrel petrel petrel petrel petrel petrel petrel";

fn body_handler(_: &mut Request, response: &mut Response) -> PetrelResult<()> {
  response.string(BODY)
}

fn compressed_server() -> Server {
  ServerBuilder::new()
    .router(|r| {
      r.with_middleware(CompressMiddleware::standard())
        .route_get("/body", body_handler)?
        .route_get("/empty", |_: &mut Request, _: &mut Response| Ok(()))
    })
    .unwrap()
    .build()
    .unwrap()
}

fn gunzip(data: &[u8]) -> Vec<u8> {
  let mut decoder = libflate::gzip::Decoder::new(data).unwrap();
  let mut out = Vec::new();
  decoder.read_to_end(&mut out).unwrap();
  out
}

#[test]
fn gzip_round_trip() {
  let server = compressed_server();
  let response = testing::send_request(
    &server,
    "GET /body HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip\r\n\r\n",
  )
  .unwrap();

  assert_eq!(response.status, 200);
  assert_eq!(response.header(HeaderName::ContentEncoding), Some("gzip"));
  // Compressing then decompressing yields the original bytes.
  assert_eq!(gunzip(&response.body), BODY.as_bytes());
}

#[test]
fn deflate_round_trip() {
  let server = compressed_server();
  let response = testing::send_request(
    &server,
    "GET /body HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: deflate\r\n\r\n",
  )
  .unwrap();

  assert_eq!(response.header(HeaderName::ContentEncoding), Some("deflate"));
  let mut decoder = libflate::zlib::Decoder::new(response.body.as_slice()).unwrap();
  let mut out = Vec::new();
  decoder.read_to_end(&mut out).unwrap();
  assert_eq!(out, BODY.as_bytes());
}

#[test]
fn no_accept_encoding_passes_through() {
  let server = compressed_server();
  let response = testing::get(&server, "/body").unwrap();
  assert!(response.header(HeaderName::ContentEncoding).is_none());
  assert_eq!(response.body_string(), BODY);
}

#[test]
fn unsupported_encoding_passes_through() {
  let server = compressed_server();
  let response = testing::send_request(
    &server,
    "GET /body HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: br\r\n\r\n",
  )
  .unwrap();
  assert!(response.header(HeaderName::ContentEncoding).is_none());
  assert_eq!(response.body_string(), BODY);
}

#[test]
fn quality_values_pick_the_preferred_encoder() {
  let server = compressed_server();
  let response = testing::send_request(
    &server,
    "GET /body HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip;q=0.5, deflate;q=0.9\r\n\r\n",
  )
  .unwrap();
  assert_eq!(response.header(HeaderName::ContentEncoding), Some("deflate"));
}

#[test]
fn wildcard_selects_first_configured_encoder() {
  let server = compressed_server();
  let response = testing::send_request(
    &server,
    "GET /body HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: *\r\n\r\n",
  )
  .unwrap();
  assert_eq!(response.header(HeaderName::ContentEncoding), Some("gzip"));
}

#[test]
fn upgrade_requests_are_not_compressed() {
  let server = compressed_server();
  let response = testing::send_request(
    &server,
    "GET /body HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip\r\nUpgrade: websocket\r\n\r\n",
  )
  .unwrap();
  assert!(response.header(HeaderName::ContentEncoding).is_none());
  assert_eq!(response.body_string(), BODY);
}

#[test]
fn content_type_is_sniffed_on_first_write() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.with_middleware(CompressMiddleware::standard()).route_get(
        "/raw",
        |_: &mut Request, resp: &mut Response| -> PetrelResult<()> {
          // Raw write without an explicit Content-Type.
          std::io::Write::write_all(resp, b"<!DOCTYPE html><html></html>")?;
          Ok(())
        },
      )
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::send_request(
    &server,
    "GET /raw HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip\r\n\r\n",
  )
  .unwrap();
  assert_eq!(response.header(HeaderName::ContentType), Some("text/html"));
  assert_eq!(gunzip(&response.body), b"<!DOCTYPE html><html></html>");
}

#[test]
fn empty_bodies_stay_204_and_uncompressed() {
  let server = compressed_server();
  let response = testing::send_request(
    &server,
    "GET /empty HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip\r\n\r\n",
  )
  .unwrap();
  assert_eq!(response.status, 204);
  assert!(response.body.is_empty());
}
