// src/transport/tcp.rs

#[cfg(feature = "tokio")]
use super::is_transient;
use super::{read_nonblocking, write_nonblocking, IoAdapter, ReadOutcome};
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Socket options applied when an adapter takes over a TCP stream.
#[derive(Debug, Clone)]
pub struct TcpConfig {
  pub nodelay: bool,
  pub keepalive_time: Option<Duration>,
  pub keepalive_interval: Option<Duration>,
  pub keepalive_count: Option<u32>,
}

impl Default for TcpConfig {
  fn default() -> Self {
    Self {
      nodelay: true,
      keepalive_time: None,
      keepalive_interval: None,
      keepalive_count: None,
    }
  }
}

fn apply_socket_options(socket: SockRef<'_>, config: &TcpConfig) -> io::Result<()> {
  socket.set_nodelay(config.nodelay)?;
  if config.keepalive_time.is_some() || config.keepalive_interval.is_some() || config.keepalive_count.is_some() {
    let mut keepalive = TcpKeepalive::new();
    if let Some(time) = config.keepalive_time {
      keepalive = keepalive.with_time(time);
    }
    #[cfg(any(unix, target_os = "windows"))]
    if let Some(interval) = config.keepalive_interval {
      keepalive = keepalive.with_interval(interval);
    }
    #[cfg(unix)]
    if let Some(count) = config.keepalive_count {
      keepalive = keepalive.with_retries(count);
    }
    socket.set_tcp_keepalive(&keepalive)?;
  }
  Ok(())
}

fn shutdown(socket: SockRef<'_>) -> io::Result<()> {
  match socket.shutdown(Shutdown::Both) {
    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
    other => other,
  }
}

/// Adapter over a non-blocking `std::net::TcpStream`, for poll/epoll style host loops.
#[derive(Debug)]
pub struct TcpAdapter {
  stream: TcpStream,
}

impl TcpAdapter {
  /// Takes over `stream`, switching it to non-blocking mode.
  pub fn new(stream: TcpStream, config: &TcpConfig) -> io::Result<Self> {
    apply_socket_options(SockRef::from(&stream), config)?;
    stream.set_nonblocking(true)?;
    tracing::debug!(peer = ?stream.peer_addr().ok(), nodelay = config.nodelay, "TCP adapter ready");
    Ok(Self { stream })
  }

  /// Connects (blocking) and then switches to non-blocking mode.
  pub fn connect(addr: impl ToSocketAddrs, config: &TcpConfig) -> io::Result<Self> {
    Self::new(TcpStream::connect(addr)?, config)
  }

  /// The underlying stream, e.g. for registering its descriptor with a poller.
  pub fn stream(&self) -> &TcpStream {
    &self.stream
  }
}

impl IoAdapter for TcpAdapter {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    read_nonblocking(&mut self.stream, buf)
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    write_nonblocking(&mut self.stream, buf)
  }

  fn close(&mut self) -> io::Result<()> {
    shutdown(SockRef::from(&self.stream))
  }
}

/// Adapter over a `tokio::net::TcpStream` using its `try_read`/`try_write`.
///
/// A task awaits [`readable`](tokio::net::TcpStream::readable) or
/// [`writable`](tokio::net::TcpStream::writable) on [`stream`](Self::stream) and then
/// calls [`Engine::process`](crate::Engine::process).
#[cfg(feature = "tokio")]
#[derive(Debug)]
pub struct TokioTcpAdapter {
  stream: tokio::net::TcpStream,
}

#[cfg(feature = "tokio")]
impl TokioTcpAdapter {
  pub fn new(stream: tokio::net::TcpStream, config: &TcpConfig) -> io::Result<Self> {
    apply_socket_options(SockRef::from(&stream), config)?;
    tracing::debug!(peer = ?stream.peer_addr().ok(), nodelay = config.nodelay, "Tokio TCP adapter ready");
    Ok(Self { stream })
  }

  pub fn stream(&self) -> &tokio::net::TcpStream {
    &self.stream
  }
}

#[cfg(feature = "tokio")]
impl IoAdapter for TokioTcpAdapter {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    if buf.is_empty() {
      return Ok(ReadOutcome::WouldBlock);
    }
    match self.stream.try_read(buf) {
      Ok(0) => Ok(ReadOutcome::Eof(0)),
      Ok(n) => Ok(ReadOutcome::Data(n)),
      Err(e) if is_transient(&e) => Ok(ReadOutcome::WouldBlock),
      Err(e) => Err(e),
    }
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    match self.stream.try_write(buf) {
      Ok(n) => Ok(n),
      Err(e) if is_transient(&e) => Ok(0),
      Err(e) => Err(e),
    }
  }

  fn close(&mut self) -> io::Result<()> {
    shutdown(SockRef::from(&self.stream))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use std::net::TcpListener;

  #[test]
  fn std_adapter_reads_without_blocking() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut adapter = TcpAdapter::connect(addr, &TcpConfig::default()).unwrap();
    let (mut server, _) = listener.accept().unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(adapter.read(&mut buf).unwrap(), ReadOutcome::WouldBlock);

    server.write_all(b"AMQP").unwrap();
    let mut got = 0;
    for _ in 0..200 {
      if let ReadOutcome::Data(n) = adapter.read(&mut buf).unwrap() {
        got = n;
        break;
      }
      std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(&buf[..got], b"AMQP");

    drop(server);
    let mut eof = false;
    for _ in 0..200 {
      if adapter.read(&mut buf).unwrap().is_eof() {
        eof = true;
        break;
      }
      std::thread::sleep(Duration::from_millis(5));
    }
    assert!(eof);
    adapter.close().unwrap();
  }

  #[test]
  fn keepalive_options_apply() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = TcpConfig {
      nodelay: true,
      keepalive_time: Some(Duration::from_secs(30)),
      keepalive_interval: Some(Duration::from_secs(5)),
      keepalive_count: Some(3),
    };
    let adapter = TcpAdapter::connect(listener.local_addr().unwrap(), &config).unwrap();
    assert!(adapter.stream().nodelay().unwrap());
  }
}
