// src/transport/mod.rs

//! The I/O adapter contract and the adapters shipped with the crate.
//!
//! The engine never touches a socket itself. It calls [`IoAdapter::read`],
//! [`IoAdapter::write`] and [`IoAdapter::close`] from inside
//! [`Engine::process`](crate::Engine::process), and only from there.

#[cfg(feature = "inproc")]
pub mod inproc;
#[cfg(all(feature = "ipc", unix))]
pub mod ipc;
pub mod tcp;

use std::io::{self, Read, Write};

/// Result of one non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
  /// `n > 0` bytes were read and the stream is still open.
  Data(usize),
  /// Nothing available right now. Not an error.
  WouldBlock,
  /// End of stream, possibly with a final `n` bytes delivered in the same call.
  Eof(usize),
}

impl ReadOutcome {
  pub fn bytes(&self) -> usize {
    match self {
      ReadOutcome::Data(n) | ReadOutcome::Eof(n) => *n,
      ReadOutcome::WouldBlock => 0,
    }
  }

  pub fn is_eof(&self) -> bool {
    matches!(self, ReadOutcome::Eof(_))
  }
}

/// Non-blocking byte transport driven by an [`Engine`](crate::Engine).
///
/// None of the methods may block. `WouldBlock` and `Interrupted` errors are treated by
/// the engine as "no progress"; any other error is fatal to the engine.
pub trait IoAdapter {
  /// Reads up to `buf.len()` bytes.
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome>;

  /// Writes up to `buf.len()` bytes and returns how many were accepted. `0` means
  /// "cannot write right now".
  fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

  /// Called exactly once, after which neither `read` nor `write` is called again.
  fn close(&mut self) -> io::Result<()>;
}

impl<T: IoAdapter + ?Sized> IoAdapter for &mut T {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    (**self).read(buf)
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    (**self).write(buf)
  }

  fn close(&mut self) -> io::Result<()> {
    (**self).close()
  }
}

impl<T: IoAdapter + ?Sized> IoAdapter for Box<T> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    (**self).read(buf)
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    (**self).write(buf)
  }

  fn close(&mut self) -> io::Result<()> {
    (**self).close()
  }
}

pub(crate) fn is_transient(e: &io::Error) -> bool {
  matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

/// Maps a std non-blocking `read` onto [`ReadOutcome`].
pub(crate) fn read_nonblocking<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
  if buf.is_empty() {
    return Ok(ReadOutcome::WouldBlock);
  }
  match reader.read(buf) {
    Ok(0) => Ok(ReadOutcome::Eof(0)),
    Ok(n) => Ok(ReadOutcome::Data(n)),
    Err(e) if is_transient(&e) => Ok(ReadOutcome::WouldBlock),
    Err(e) => Err(e),
  }
}

pub(crate) fn write_nonblocking<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<usize> {
  match writer.write(buf) {
    Ok(n) => Ok(n),
    Err(e) if is_transient(&e) => Ok(0),
    Err(e) => Err(e),
  }
}
