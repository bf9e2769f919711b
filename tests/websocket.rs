use petrel::config::Config;
use petrel::http::headers::HeaderName;
use petrel::petrel_error::{PetrelError, PetrelResult};
use petrel::server::{Server, ServerBuilder};
use petrel::testing::MockStream;
use petrel::websocket::frame::{Frame, Opcode};
use petrel::websocket::upgrader::handshake_accept;
use petrel::websocket::{close_error, CloseCode, Conn, Upgrader};
use petrel::Request;
use std::time::{Duration, Instant};

const UPGRADE_REQUEST: &str = "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";

fn masked(frame: Frame) -> Vec<u8> {
  Vec::from(frame.with_zero_mask())
}

fn ws_server<F>(debug: bool, handler: F) -> Server
where
  F: Fn(&Conn, &Request) -> PetrelResult<()> + Send + Sync + 'static,
{
  let config = if debug {
    Config::from_json(r#"{"app": {"debug": true}}"#).unwrap()
  } else {
    Config::default()
  };
  let upgrader = Upgrader::new().debug(debug).timeout(Duration::from_millis(200));

  ServerBuilder::new()
    .config(config)
    .router(move |r| r.route_get("/ws", upgrader.handle(handler)))
    .unwrap()
    .build()
    .unwrap()
}

/// The session runs on its own thread; poll the captured bytes until the
/// server's close frame shows up.
fn wait_for_close_frame(mock: &MockStream, skip: usize) -> Frame {
  let deadline = Instant::now() + Duration::from_secs(5);
  loop {
    let written = mock.copy_written_data();
    if written.len() > skip {
      let stream = MockStream::with_data(written[skip..].to_vec());
      let conn = stream.to_stream();
      loop {
        match Frame::from_stream(conn.as_stream_read()) {
          Ok(frame) if frame.opcode() == Opcode::Close => return frame,
          Ok(_) => continue,
          Err(_) => break,
        }
      }
    }

    assert!(Instant::now() < deadline, "no close frame within the deadline");
    std::thread::sleep(Duration::from_millis(10));
  }
}

/// The response head ends at the first double CRLF; frames follow.
fn head_end(written: &[u8]) -> usize {
  written.windows(4).position(|w| w == b"\r\n\r\n").expect("handshake head") + 4
}

#[test]
fn handshake_returns_101_with_accept_key() {
  let server = ws_server(false, |_conn, _req| Ok(()));

  let mut raw = UPGRADE_REQUEST.as_bytes().to_vec();
  raw.extend(masked(Frame::close(1000, "")));
  let mock = MockStream::with_data(raw);
  server.handle_connection(mock.to_stream()).unwrap();

  let written = mock.copy_written_data_to_string();
  assert!(written.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
  assert!(written.contains("Upgrade: websocket"));
  assert!(written.contains(&format!(
    "Sec-WebSocket-Accept: {}",
    handshake_accept("dGhlIHNhbXBsZSBub25jZQ==")
  )));
}

#[test]
fn echo_session_and_normal_close() {
  let server = ws_server(false, |conn, _req| {
    while let Some(message) = conn.recv()? {
      if let Some(text) = message.text() {
        conn.text(format!("echo: {}", text))?;
      }
    }
    Ok(())
  });

  let mut raw = UPGRADE_REQUEST.as_bytes().to_vec();
  raw.extend(masked(Frame::new(Opcode::Text, b"hi".to_vec())));
  raw.extend(masked(Frame::close(1000, "")));
  let mock = MockStream::with_data(raw);
  server.handle_connection(mock.to_stream()).unwrap();

  let skip = head_end(&mock.copy_written_data());
  let close = wait_for_close_frame(&mock, skip);
  assert_eq!(close.close_code(), 1000);

  // The echo frame went out before the close.
  let written = mock.copy_written_data();
  let stream = MockStream::with_data(written[head_end(&written)..].to_vec());
  let conn = stream.to_stream();
  let first = Frame::from_stream(conn.as_stream_read()).unwrap();
  assert_eq!(first.opcode(), Opcode::Text);
  assert_eq!(first.payload(), b"echo: hi");
}

#[test]
fn handler_error_closes_1011_with_generic_reason_in_production() {
  let server = ws_server(false, |_conn, _req| Err(PetrelError::msg("boom")));

  let mut raw = UPGRADE_REQUEST.as_bytes().to_vec();
  raw.extend(masked(Frame::close(1000, "")));
  let mock = MockStream::with_data(raw);
  server.handle_connection(mock.to_stream()).unwrap();

  let skip = head_end(&mock.copy_written_data());
  let close = wait_for_close_frame(&mock, skip);
  assert_eq!(close.close_code(), 1011);
  assert_eq!(close.close_reason(), "Internal server error");
}

#[test]
fn handler_error_reason_is_revealed_and_truncated_in_debug() {
  let long_reason = "boom ".repeat(100);
  let expected = long_reason.clone();
  let server = ws_server(true, move |_conn, _req| Err(PetrelError::msg(long_reason.clone())));

  let mut raw = UPGRADE_REQUEST.as_bytes().to_vec();
  raw.extend(masked(Frame::close(1000, "")));
  let mock = MockStream::with_data(raw);
  server.handle_connection(mock.to_stream()).unwrap();

  let skip = head_end(&mock.copy_written_data());
  let close = wait_for_close_frame(&mock, skip);
  assert_eq!(close.close_code(), 1011);
  let reason = close.close_reason();
  assert!(reason.len() <= 123);
  assert!(expected.starts_with(&reason));
}

#[test]
fn handler_close_error_with_normal_code_closes_1000() {
  let server = ws_server(false, |_conn, _req| Err(close_error(CloseCode::GoingAway, "done")));

  let mut raw = UPGRADE_REQUEST.as_bytes().to_vec();
  raw.extend(masked(Frame::close(1000, "")));
  let mock = MockStream::with_data(raw);
  server.handle_connection(mock.to_stream()).unwrap();

  let skip = head_end(&mock.copy_written_data());
  let close = wait_for_close_frame(&mock, skip);
  assert_eq!(close.close_code(), 1000);
}

#[test]
fn handler_panic_closes_1011() {
  let server = ws_server(false, |_conn, _req| -> PetrelResult<()> {
    panic!("ws handler exploded");
  });

  let mut raw = UPGRADE_REQUEST.as_bytes().to_vec();
  raw.extend(masked(Frame::close(1000, "")));
  let mock = MockStream::with_data(raw);
  server.handle_connection(mock.to_stream()).unwrap();

  let skip = head_end(&mock.copy_written_data());
  let close = wait_for_close_frame(&mock, skip);
  assert_eq!(close.close_code(), 1011);
  assert_eq!(close.close_reason(), "Internal server error");
}

#[test]
fn missing_key_fails_the_upgrade_with_400() {
  let server = ws_server(false, |_conn, _req| Ok(()));

  let mock = MockStream::with_str(
    "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
  );
  server.handle_connection(mock.to_stream()).unwrap();

  let response = petrel::testing::TestResponse::parse(&mock.copy_written_data()).unwrap();
  assert_eq!(response.status, 400);
}

#[test]
fn rejected_origin_fails_the_upgrade_with_403() {
  let upgrader = Upgrader::new()
    .timeout(Duration::from_millis(100))
    .check_origin(|req: &Request| {
      req.header(HeaderName::Origin) == Some("http://trusted.example.com")
    });

  let server = ServerBuilder::new()
    .router(move |r| r.route_get("/ws", upgrader.handle(|_conn, _req| Ok(()))))
    .unwrap()
    .build()
    .unwrap();

  let mock = MockStream::with_str(
    "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nOrigin: http://evil.example.org\r\n\r\n",
  );
  server.handle_connection(mock.to_stream()).unwrap();

  let response = petrel::testing::TestResponse::parse(&mock.copy_written_data()).unwrap();
  assert_eq!(response.status, 403);
}
