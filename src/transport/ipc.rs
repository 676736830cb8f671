// src/transport/ipc.rs

use super::{read_nonblocking, write_nonblocking, IoAdapter, ReadOutcome};
use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Adapter over a non-blocking Unix domain stream socket.
#[derive(Debug)]
pub struct IpcAdapter {
  stream: UnixStream,
}

impl IpcAdapter {
  pub fn new(stream: UnixStream) -> io::Result<Self> {
    stream.set_nonblocking(true)?;
    Ok(Self { stream })
  }

  pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Connecting IPC adapter");
    Self::new(UnixStream::connect(path)?)
  }

  /// Two connected adapters, handy for running a client and a server engine in one process.
  pub fn pair() -> io::Result<(Self, Self)> {
    let (a, b) = UnixStream::pair()?;
    Ok((Self::new(a)?, Self::new(b)?))
  }

  pub fn stream(&self) -> &UnixStream {
    &self.stream
  }
}

impl IoAdapter for IpcAdapter {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    read_nonblocking(&mut self.stream, buf)
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    write_nonblocking(&mut self.stream, buf)
  }

  fn close(&mut self) -> io::Result<()> {
    match self.stream.shutdown(Shutdown::Both) {
      Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
      other => other,
    }
  }
}
