use petrel::http::headers::{HeaderName, Headers};
use petrel::http::response_writer::ResponseWriter;
use petrel::http::{Request, Response};
use petrel::petrel_error::PetrelResult;
use petrel::server::ServerBuilder;
use petrel::testing;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn empty_body_with_unset_status_finalises_as_204() {
  let server = ServerBuilder::new()
    .router(|r| r.route_get("/nothing", |_: &mut Request, _: &mut Response| Ok(())))
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/nothing").unwrap();
  assert_eq!(response.status, 204);
  assert!(response.body.is_empty());
  assert!(response.header(HeaderName::ContentLength).is_none());
}

#[test]
fn explicit_status_with_empty_body_keeps_the_status() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.route_get("/created", |_: &mut Request, resp: &mut Response| {
        resp.status(201u16);
        Ok(())
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/created").unwrap();
  assert_eq!(response.status, 201);
  assert_eq!(response.header(HeaderName::ContentLength), Some("0"));
}

#[test]
fn first_status_wins() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.route_get("/status", |_: &mut Request, resp: &mut Response| {
        resp.status(418u16);
        resp.status(200u16);
        Ok(())
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/status").unwrap();
  assert_eq!(response.status, 418);
}

#[test]
fn json_body_sets_content_type() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.route_get("/json", |_: &mut Request, resp: &mut Response| -> PetrelResult<()> {
        resp.json(&serde_json::json!({"framework": "petrel"}))
      })
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/json").unwrap();
  assert_eq!(response.header(HeaderName::ContentType), Some("application/json"));
  assert_eq!(response.body_json().unwrap()["framework"], "petrel");
}

/// Wrapper writer proving pre-write runs before header emission and is
/// propagated to the wrapped child, and that close cascades down the chain.
struct Probe {
  child: Box<dyn ResponseWriter>,
  pre_write_seen: Arc<AtomicBool>,
  closed: Arc<AtomicUsize>,
}

impl Write for Probe {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.child.write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    self.child.flush()
  }
}

impl ResponseWriter for Probe {
  fn pre_write(&mut self, headers: &mut Headers, data: &[u8]) -> std::io::Result<()> {
    self.pre_write_seen.store(true, Ordering::SeqCst);
    headers.set("X-Probe", format!("first-chunk-{}", data.len()));
    self.child.pre_write(headers, data)
  }

  fn close(&mut self) -> std::io::Result<()> {
    self.closed.fetch_add(1, Ordering::SeqCst);
    self.child.close()
  }
}

#[test]
fn chained_writer_pre_write_and_close() {
  let pre_write_seen = Arc::new(AtomicBool::new(false));
  let closed = Arc::new(AtomicUsize::new(0));
  let pre_clone = Arc::clone(&pre_write_seen);
  let closed_clone = Arc::clone(&closed);

  let server = ServerBuilder::new()
    .router(move |r| {
      let pre = Arc::clone(&pre_clone);
      let closed = Arc::clone(&closed_clone);
      r.route_get(
        "/probed",
        move |_: &mut Request, resp: &mut Response| -> PetrelResult<()> {
          let pre = Arc::clone(&pre);
          let closed = Arc::clone(&closed);
          resp.set_writer(move |child| {
            Box::new(Probe { child, pre_write_seen: pre, closed })
          });
          resp.string("probed body")
        },
      )
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/probed").unwrap();
  assert!(pre_write_seen.load(Ordering::SeqCst));
  // The header mutated during pre-write made it onto the wire.
  assert_eq!(response.header("X-Probe"), Some("first-chunk-11"));
  assert_eq!(response.body_string(), "probed body");
  assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn writer_chain_closes_even_when_the_handler_panics() {
  let closed = Arc::new(AtomicUsize::new(0));
  let closed_clone = Arc::clone(&closed);

  let server = ServerBuilder::new()
    .router(move |r| {
      let closed = Arc::clone(&closed_clone);
      r.route_get(
        "/panic",
        move |_: &mut Request, resp: &mut Response| -> PetrelResult<()> {
          let closed = Arc::clone(&closed);
          resp.set_writer(move |child| {
            Box::new(Probe {
              child,
              pre_write_seen: Arc::new(AtomicBool::new(false)),
              closed,
            })
          });
          panic!("after installing the writer");
        },
      )
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/panic").unwrap();
  assert_eq!(response.status, 500);
  assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn hijacked_responses_skip_header_emission() {
  let server = ServerBuilder::new()
    .router(|r| {
      r.route_get(
        "/hijack",
        |_: &mut Request, resp: &mut Response| -> PetrelResult<()> {
          let stream = resp.hijack()?;
          stream.as_stream_write().write_all(b"raw bytes, no http")?;
          // Writes through the response are no-ops once hijacked.
          resp.string("must not appear")?;
          Ok(())
        },
      )
    })
    .unwrap()
    .build()
    .unwrap();

  let mock = testing::MockStream::with_str("GET /hijack HTTP/1.1\r\nHost: localhost\r\n\r\n");
  server.handle_connection(mock.to_stream()).unwrap();
  assert_eq!(mock.copy_written_data_to_string(), "raw bytes, no http");
}

#[test]
fn file_responses_set_type_and_disposition() {
  let dir = std::env::temp_dir();
  let path = dir.join("petrel_test_report.csv");
  std::fs::write(&path, "a,b\n1,2\n").unwrap();

  let served = path.clone();
  let server = ServerBuilder::new()
    .router(move |r| {
      let served = served.clone();
      r.route_get(
        "/file",
        move |_: &mut Request, resp: &mut Response| -> PetrelResult<()> {
          resp.file(&served)
        },
      )
    })
    .unwrap()
    .build()
    .unwrap();

  let response = testing::get(&server, "/file").unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(response.header(HeaderName::ContentType), Some("text/csv"));
  assert_eq!(
    response.header(HeaderName::ContentDisposition),
    Some("inline; filename=\"petrel_test_report.csv\"")
  );
  assert_eq!(response.body_string(), "a,b\n1,2\n");

  std::fs::remove_file(&path).ok();
}
