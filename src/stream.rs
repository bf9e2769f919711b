//! Connection stream abstraction.
//!
//! A [ConnectionStream] is a reference counted duplex byte stream. Reads and
//! writes lock independent halves, so a request body can be drained while a
//! response is being written, and WebSocket sender/receiver pairs can live on
//! separate threads.

use std::fmt::Debug;
use std::io;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A raw client connection. Instances are cheap to re-reference via
/// [ConnectionStream::new_ref]; the underlying socket is shared.
pub trait ConnectionStream: ConnectionStreamRead + ConnectionStreamWrite {
  fn new_ref(&self) -> Box<dyn ConnectionStream>;

  fn peer_addr(&self) -> io::Result<String>;
  fn local_addr(&self) -> io::Result<String>;
}

/// Reading half. All operations take `&self`; an internal mutex serialises
/// concurrent readers.
pub trait ConnectionStreamRead: Sync + Send + Debug + Read {
  /// De-mut of Read.
  fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

  /// Blocks until at least one byte can be read and buffers it.
  /// Returns false on EOF.
  fn ensure_readable(&self) -> io::Result<bool>;

  /// Bytes that can be read without blocking.
  fn available(&self) -> usize;

  /// Reads until the delimiter or the limit, appending to `buf`.
  fn read_until(&self, end: u8, limit: usize, buf: &mut Vec<u8>) -> io::Result<usize>;

  /// De-mut of Read.
  fn read_exact(&self, buf: &mut [u8]) -> io::Result<()>;

  fn new_ref_read(&self) -> Box<dyn Read + Send + Sync>;

  fn as_stream_read(&self) -> &dyn ConnectionStreamRead;

  fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()>;

  fn get_read_timeout(&self) -> io::Result<Option<Duration>>;
}

/// Writing half.
pub trait ConnectionStreamWrite: Sync + Send + Debug + Write {
  /// De-mut of Write.
  fn write(&self, buf: &[u8]) -> io::Result<usize>;

  /// De-mut of Write.
  fn write_all(&self, buf: &[u8]) -> io::Result<()>;

  /// De-mut of Write.
  fn flush(&self) -> io::Result<()>;

  fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()>;

  fn new_ref_write(&self) -> Box<dyn Write + Send + Sync>;

  fn as_stream_write(&self) -> &dyn ConnectionStreamWrite;
}

/// Conversion of socket-ish types into a [ConnectionStream].
pub trait IntoConnectionStream {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream>;
}

impl IntoConnectionStream for TcpStream {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream> {
    tcp::new(self)
  }
}

impl IntoConnectionStream for Box<dyn ConnectionStream> {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream> {
    self
  }
}

impl IntoConnectionStream for (Box<dyn Read + Send>, Box<dyn Write + Send>) {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream> {
    boxed::new(self.0, self.1)
  }
}

mod tcp {
  use super::{ConnectionStream, ConnectionStreamRead, ConnectionStreamWrite};
  use crate::util::unwrap_poison;
  use std::io;
  use std::io::{Read, Write};
  use std::net::TcpStream;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;
  use unowned_buf::{UnownedReadBuffer, UnownedWriteBuffer};

  pub fn new(stream: TcpStream) -> Box<dyn ConnectionStream> {
    Box::new(TcpConnection(Arc::new(TcpConnectionInner {
      read_mutex: Mutex::new(UnownedReadBuffer::new()),
      write_mutex: Mutex::new(UnownedWriteBuffer::new()),
      stream,
    })))
  }

  #[derive(Debug, Clone)]
  struct TcpConnection(Arc<TcpConnectionInner>);

  #[derive(Debug)]
  struct TcpConnectionInner {
    read_mutex: Mutex<UnownedReadBuffer<0x4000>>,
    write_mutex: Mutex<UnownedWriteBuffer<0x4000>>,
    stream: TcpStream,
  }

  impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      ConnectionStreamRead::read(self, buf)
    }
  }

  impl ConnectionStreamRead for TcpConnection {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
      unwrap_poison(self.0.read_mutex.lock())?.read(&mut &self.0.stream, buf)
    }

    fn ensure_readable(&self) -> io::Result<bool> {
      unwrap_poison(self.0.read_mutex.lock())?.ensure_readable(&mut &self.0.stream)
    }

    fn available(&self) -> usize {
      unwrap_poison(self.0.read_mutex.lock()).map(|g| g.available()).unwrap_or_default()
    }

    fn read_until(&self, end: u8, limit: usize, buf: &mut Vec<u8>) -> io::Result<usize> {
      unwrap_poison(self.0.read_mutex.lock())?.read_until_limit(&mut &self.0.stream, end, limit, buf)
    }

    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
      unwrap_poison(self.0.read_mutex.lock())?.read_exact(&mut &self.0.stream, buf)
    }

    fn new_ref_read(&self) -> Box<dyn Read + Send + Sync> {
      Box::new(self.clone())
    }

    fn as_stream_read(&self) -> &dyn ConnectionStreamRead {
      self
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
      self.0.stream.set_read_timeout(dur)
    }

    fn get_read_timeout(&self) -> io::Result<Option<Duration>> {
      self.0.stream.read_timeout()
    }
  }

  impl ConnectionStreamWrite for TcpConnection {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
      unwrap_poison(self.0.write_mutex.lock())?.write(&mut &self.0.stream, buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.write_all(&mut &self.0.stream, buf)
    }

    fn flush(&self) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.flush(&mut &self.0.stream)
    }

    fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
      self.0.stream.set_write_timeout(dur)
    }

    fn new_ref_write(&self) -> Box<dyn Write + Send + Sync> {
      Box::new(self.clone())
    }

    fn as_stream_write(&self) -> &dyn ConnectionStreamWrite {
      self
    }
  }

  impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      ConnectionStreamWrite::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
      ConnectionStreamWrite::flush(self)
    }
  }

  impl ConnectionStream for TcpConnection {
    fn new_ref(&self) -> Box<dyn ConnectionStream> {
      Box::new(self.clone())
    }

    fn peer_addr(&self) -> io::Result<String> {
      Ok(format!("{}", self.0.stream.peer_addr()?))
    }

    fn local_addr(&self) -> io::Result<String> {
      Ok(format!("{}", self.0.stream.local_addr()?))
    }
  }
}

mod boxed {
  use super::{ConnectionStream, ConnectionStreamRead, ConnectionStreamWrite};
  use crate::util::unwrap_poison;
  use std::fmt::{Debug, Formatter};
  use std::io;
  use std::io::{BufWriter, Read, Write};
  use std::ops::DerefMut;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;
  use unowned_buf::UnownedReadBuffer;

  pub fn new(read: Box<dyn Read + Send>, write: Box<dyn Write + Send>) -> Box<dyn ConnectionStream> {
    Box::new(BoxedConnection(Arc::new(BoxedConnectionInner {
      read_mutex: Mutex::new((UnownedReadBuffer::default(), read)),
      write_mutex: Mutex::new(BufWriter::new(write)),
    })))
  }

  #[derive(Debug, Clone)]
  struct BoxedConnection(Arc<BoxedConnectionInner>);

  struct BoxedConnectionInner {
    read_mutex: Mutex<(UnownedReadBuffer<0x4000>, Box<dyn Read + Send>)>,
    write_mutex: Mutex<BufWriter<Box<dyn Write + Send>>>,
  }

  impl Debug for BoxedConnectionInner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
      f.write_str("BoxedConnectionInner")
    }
  }

  impl ConnectionStreamRead for BoxedConnection {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.read(stream, buf)
    }

    fn ensure_readable(&self) -> io::Result<bool> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.ensure_readable(stream)
    }

    fn available(&self) -> usize {
      unwrap_poison(self.0.read_mutex.lock()).map(|g| g.0.available()).unwrap_or_default()
    }

    fn read_until(&self, end: u8, limit: usize, buf: &mut Vec<u8>) -> io::Result<usize> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.read_until_limit(stream, end, limit, buf)
    }

    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.read_exact(stream, buf)
    }

    fn new_ref_read(&self) -> Box<dyn Read + Send + Sync> {
      Box::new(self.clone())
    }

    fn as_stream_read(&self) -> &dyn ConnectionStreamRead {
      self
    }

    fn set_read_timeout(&self, _dur: Option<Duration>) -> io::Result<()> {
      Ok(())
    }

    fn get_read_timeout(&self) -> io::Result<Option<Duration>> {
      Ok(None)
    }
  }

  impl Read for BoxedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      ConnectionStreamRead::read(self, buf)
    }
  }

  impl ConnectionStreamWrite for BoxedConnection {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
      unwrap_poison(self.0.write_mutex.lock())?.write(buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.flush()
    }

    fn set_write_timeout(&self, _dur: Option<Duration>) -> io::Result<()> {
      Ok(())
    }

    fn new_ref_write(&self) -> Box<dyn Write + Send + Sync> {
      Box::new(self.clone())
    }

    fn as_stream_write(&self) -> &dyn ConnectionStreamWrite {
      self
    }
  }

  impl Write for BoxedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      ConnectionStreamWrite::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
      ConnectionStreamWrite::flush(self)
    }
  }

  impl ConnectionStream for BoxedConnection {
    fn new_ref(&self) -> Box<dyn ConnectionStream> {
      Box::new(self.clone())
    }

    fn peer_addr(&self) -> io::Result<String> {
      Ok("127.0.0.1:0".to_string())
    }

    fn local_addr(&self) -> io::Result<String> {
      Ok("127.0.0.1:0".to_string())
    }
  }
}
