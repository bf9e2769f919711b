//! WebSocket messages, one or more frames reassembled.

/// A complete message received from or sent to the peer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Message {
  Text(String),
  Binary(Vec<u8>),
  Ping,
  Pong,
}

impl Message {
  /// The payload bytes of data messages. None for ping/pong.
  pub fn bytes(&self) -> Option<&[u8]> {
    match self {
      Message::Text(text) => Some(text.as_bytes()),
      Message::Binary(bytes) => Some(bytes.as_slice()),
      Message::Ping | Message::Pong => None,
    }
  }

  /// The payload as text, if this is a text message.
  pub fn text(&self) -> Option<&str> {
    match self {
      Message::Text(text) => Some(text.as_str()),
      _ => None,
    }
  }
}

impl From<&str> for Message {
  fn from(text: &str) -> Self {
    Message::Text(text.to_string())
  }
}

impl From<String> for Message {
  fn from(text: String) -> Self {
    Message::Text(text)
  }
}

impl From<Vec<u8>> for Message {
  fn from(bytes: Vec<u8>) -> Self {
    Message::Binary(bytes)
  }
}
