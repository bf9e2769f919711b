//! The WebSocket connection and its close handshake.

use crate::petrel_error::{PetrelError, PetrelResult, WebsocketError};
use crate::stream::ConnectionStream;
use crate::util::{unwrap_poison, unwrap_some};
use crate::websocket::frame::{Frame, Opcode};
use crate::websocket::message::Message;
use crate::websocket::CloseCode;
use std::io::ErrorKind;
use std::mem;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reassembles messages out of frames. The close flag is shared with the
/// connection: receiving a close frame raises it, which is the one-shot
/// signal the close handshake waits on.
struct Receiver {
  peer_closed: Arc<AtomicBool>,
  state: Vec<Frame>,
  stream: Box<dyn ConnectionStream>,
}

impl Receiver {
  /// Reads the next complete message. `Ok(None)` once the peer sent its
  /// close frame.
  fn recv(&mut self) -> PetrelResult<Option<Message>> {
    if self.peer_closed.load(SeqCst) {
      return Ok(None);
    }

    let stream = self.stream.as_stream_read();
    // Keep reading frames until we get the finish frame
    while self.state.last().map(|f| !f.fin).unwrap_or(true) {
      let frame = Frame::from_stream(stream)?;

      if frame.opcode == Opcode::Ping {
        return Ok(Some(Message::Ping));
      }

      if frame.opcode == Opcode::Pong {
        return Ok(Some(Message::Pong));
      }

      if frame.opcode == Opcode::Close {
        self.peer_closed.store(true, SeqCst);
        if self.state.is_empty() {
          return Ok(None);
        }

        return Err(WebsocketError::ClosedDuringPendingMessage.into());
      }

      self.state.push(frame);
    }

    let frames = mem::take(&mut self.state);
    let frame_type = unwrap_some(frames.first()).opcode;

    let size = frames.iter().map(|f| f.payload.len()).sum();
    let mut payload = Vec::with_capacity(size);

    for (idx, frame) in frames.into_iter().enumerate() {
      if idx != 0 && frame.opcode != Opcode::Continuation {
        return Err(WebsocketError::UnexpectedOpcode.into());
      }
      payload.extend_from_slice(frame.payload.as_slice());
    }

    match frame_type {
      Opcode::Text => {
        let payload = String::from_utf8(payload)
          .map_err(|e| WebsocketError::TextMessageIsNotUtf8(e.into_bytes()))?;

        Ok(Some(Message::Text(payload)))
      }
      Opcode::Binary => Ok(Some(Message::Binary(payload))),
      _ => Err(WebsocketError::UnexpectedOpcode.into()),
    }
  }
}

/// The duplex WebSocket connection handed to handlers.
///
/// Sending and receiving lock independently, so one thread can stream
/// messages out while another reads. [Conn::close] performs the RFC 6455
/// close handshake: it is once-guarded, every concurrent caller observes the
/// result of the single close that actually ran.
pub struct Conn {
  stream: Box<dyn ConnectionStream>,
  receiver: Mutex<Receiver>,
  peer_closed: Arc<AtomicBool>,
  /// Once-guard and memoised outcome of the close handshake.
  close_state: Mutex<Option<Result<(), String>>>,
  timeout: Duration,
}

impl std::fmt::Debug for Conn {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("Conn(peer_closed={})", self.peer_closed.load(SeqCst)))
  }
}

impl Conn {
  /// Wraps an upgraded stream. `timeout` bounds the close-handshake wait for
  /// the peer's close frame.
  pub fn new(stream: Box<dyn ConnectionStream>, timeout: Duration) -> Conn {
    let peer_closed = Arc::new(AtomicBool::new(false));
    let receiver = Receiver {
      peer_closed: Arc::clone(&peer_closed),
      state: Vec::new(),
      stream: stream.new_ref(),
    };

    Conn { stream, receiver: Mutex::new(receiver), peer_closed, close_state: Mutex::new(None), timeout }
  }

  /// The configured close-handshake timeout.
  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  pub fn peer_addr(&self) -> PetrelResult<String> {
    Ok(self.stream.peer_addr()?)
  }

  /// Receives the next message. `Ok(None)` once the peer initiated the
  /// close handshake.
  pub fn recv(&self) -> PetrelResult<Option<Message>> {
    unwrap_poison(self.receiver.lock())?.recv()
  }

  pub fn send(&self, message: impl Into<Message>) -> PetrelResult<()> {
    match message.into() {
      Message::Text(text) => self.send_frame(Frame::new(Opcode::Text, text.into_bytes())),
      Message::Binary(bytes) => self.send_frame(Frame::new(Opcode::Binary, bytes)),
      Message::Ping => self.send_frame(Frame::new(Opcode::Ping, Vec::new())),
      Message::Pong => self.send_frame(Frame::new(Opcode::Pong, Vec::new())),
    }
  }

  pub fn text(&self, message: impl ToString) -> PetrelResult<()> {
    self.send(Message::Text(message.to_string()))
  }

  pub fn binary(&self, message: impl Into<Vec<u8>>) -> PetrelResult<()> {
    self.send(Message::Binary(message.into()))
  }

  pub fn ping(&self) -> PetrelResult<()> {
    self.send(Message::Ping)
  }

  pub fn pong(&self) -> PetrelResult<()> {
    self.send(Message::Pong)
  }

  fn send_frame(&self, frame: Frame) -> PetrelResult<()> {
    self.stream.as_stream_write().write_all(Vec::from(frame).as_slice())?;
    Ok(())
  }

  /// True once the peer's close frame has been received.
  pub fn is_peer_closed(&self) -> bool {
    self.peer_closed.load(SeqCst)
  }

  /// Performs the close handshake: writes the close frame, then waits for
  /// the peer's close frame until the configured timeout elapses.
  ///
  /// Only the first call performs the handshake; concurrent and subsequent
  /// calls block until it is done and observe the same result.
  pub fn close(&self, code: CloseCode, reason: &str) -> PetrelResult<()> {
    let mut state = unwrap_poison(self.close_state.lock())?;
    if let Some(previous) = state.as_ref() {
      return previous.clone().map_err(PetrelError::msg);
    }

    let result = self.perform_close(code, reason);
    *state = Some(match &result {
      Ok(()) => Ok(()),
      Err(err) => Err(err.to_string()),
    });
    result
  }

  fn perform_close(&self, code: CloseCode, reason: &str) -> PetrelResult<()> {
    self.send_frame(Frame::close(code.code(), reason))?;

    if self.peer_closed.load(SeqCst) {
      // The peer started the handshake, our frame completed it.
      return Ok(());
    }

    // Drain until the peer's close frame arrives or the deadline passes.
    // There is no other active reader at this point, so we pump the
    // receiver ourselves.
    let previous_timeout = self.stream.get_read_timeout().unwrap_or(None);
    self.stream.set_read_timeout(Some(self.timeout))?;

    let outcome = loop {
      match self.recv() {
        Ok(None) => break Ok(()),
        Ok(Some(_)) => continue,
        Err(err) => match err.kind() {
          // The peer never answered within the deadline or hung up; the
          // connection is torn down either way.
          ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::UnexpectedEof
          | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => break Ok(()),
          _ => break Err(err),
        },
      }
    };

    self.stream.set_read_timeout(previous_timeout).ok();
    outcome
  }
}
