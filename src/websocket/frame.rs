//! WebSocket frames as specified in [RFC 6455 Section 5](https://datatracker.ietf.org/doc/html/rfc6455#section-5).

use crate::petrel_error::{PetrelResult, WebsocketError};
use crate::stream::ConnectionStreamRead;
use std::convert::TryFrom;

/// A single frame of WebSocket data.
/// Follows [Section 5.2 of RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  pub(crate) fin: bool,
  pub(crate) rsv: [bool; 3],
  pub(crate) opcode: Opcode,
  pub(crate) mask: bool,
  pub(crate) length: u64,
  pub(crate) masking_key: [u8; 4],
  pub(crate) payload: Vec<u8>,
}

/// The frame type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  Continuation = 0x0,
  Text = 0x1,
  Binary = 0x2,
  Close = 0x8,
  Ping = 0x9,
  Pong = 0xA,
}

impl TryFrom<u8> for Opcode {
  type Error = WebsocketError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0x0 => Ok(Self::Continuation),
      0x1 => Ok(Self::Text),
      0x2 => Ok(Self::Binary),
      0x8 => Ok(Self::Close),
      0x9 => Ok(Self::Ping),
      0xA => Ok(Self::Pong),
      _ => Err(WebsocketError::InvalidOpcode),
    }
  }
}

impl Frame {
  /// A server frame (unmasked) with the given payload.
  pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
    Self {
      fin: true,
      rsv: [false; 3],
      opcode,
      mask: false,
      length: payload.len() as u64,
      masking_key: [0; 4],
      payload,
    }
  }

  /// A close frame carrying a status code and a reason. The reason is
  /// truncated so the control frame payload stays within 125 bytes.
  pub fn close(code: u16, reason: &str) -> Self {
    let reason = crate::websocket::truncate_reason(reason);
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    Self::new(Opcode::Close, payload)
  }

  /// Reads one frame from the stream, blocking until it is complete.
  pub fn from_stream<T: ConnectionStreamRead + ?Sized>(stream: &T) -> PetrelResult<Self> {
    let mut buf: [u8; 2] = [0; 2];
    stream.read_exact(&mut buf)?;

    Self::from_stream_inner(stream, buf)
  }

  fn from_stream_inner<T: ConnectionStreamRead + ?Sized>(
    stream: &T,
    mut header: [u8; 2],
  ) -> PetrelResult<Self> {
    let fin = header[0] & 0x80 != 0;
    let rsv = [header[0] & 0x40 != 0, header[0] & 0x20 != 0, header[0] & 0x10 != 0];
    let opcode = Opcode::try_from(header[0] & 0xF)?;
    let mask = header[1] & 0x80 != 0;

    let mut length: u64 = (header[1] & 0x7F) as u64;
    if length == 126 {
      stream.read_exact(&mut header)?;
      length = u16::from_be_bytes(header) as u64;
    } else if length == 127 {
      let mut buf: [u8; 8] = [0; 8];
      stream.read_exact(&mut buf)?;
      length = u64::from_be_bytes(buf);
    }

    let masking_key = {
      let mut buf: [u8; 4] = [0; 4];
      if mask {
        stream.read_exact(&mut buf)?;
      }
      buf
    };

    let mut payload: Vec<u8> = vec![0; length as usize];
    stream.read_exact(&mut payload)?;

    // Unmask the payload
    payload.iter_mut().enumerate().for_each(|(i, byte)| *byte ^= masking_key[i % 4]);

    Ok(Self { fin, rsv, opcode, mask, length, masking_key, payload })
  }

  pub fn opcode(&self) -> Opcode {
    self.opcode
  }

  pub fn fin(&self) -> bool {
    self.fin
  }

  pub fn payload(&self) -> &[u8] {
    self.payload.as_slice()
  }

  /// Turns this into a client style frame: the mask bit set with an all-zero
  /// masking key. A zero key leaves the payload bytes unchanged, which makes
  /// this handy for driving a server in tests.
  pub fn with_zero_mask(mut self) -> Frame {
    self.mask = true;
    self.masking_key = [0; 4];
    self
  }

  /// The close code of a close frame. 1005 (no status) when the payload is
  /// too short to carry one.
  pub fn close_code(&self) -> u16 {
    if self.payload.len() < 2 {
      return 1005;
    }
    u16::from_be_bytes([self.payload[0], self.payload[1]])
  }

  /// The utf-8 reason of a close frame, lossy.
  pub fn close_reason(&self) -> String {
    if self.payload.len() < 2 {
      return String::new();
    }
    String::from_utf8_lossy(&self.payload[2..]).to_string()
  }
}

impl From<Frame> for Vec<u8> {
  fn from(f: Frame) -> Self {
    let mut buf: Vec<u8> = vec![0; 2];

    buf[0] = (f.fin as u8) << 7
      | (f.rsv[0] as u8) << 6
      | (f.rsv[1] as u8) << 5
      | (f.rsv[2] as u8) << 4
      | f.opcode as u8;

    if f.length < 126 {
      buf[1] = (f.mask as u8) << 7 | f.length as u8;
    } else if f.length < 65536 {
      buf[1] = (f.mask as u8) << 7 | 126;
      buf.extend_from_slice(&(f.length as u16).to_be_bytes());
    } else {
      buf[1] = (f.mask as u8) << 7 | 127;
      buf.extend_from_slice(&(f.length).to_be_bytes());
    }

    if f.mask {
      buf.extend_from_slice(&f.masking_key);
    }

    buf.extend_from_slice(&f.payload);

    buf
  }
}
