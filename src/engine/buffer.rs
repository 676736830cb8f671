// src/engine/buffer.rs

use crate::transport::{is_transient, IoAdapter, ReadOutcome};
use bytes::{Buf, BytesMut};
use std::io;

/// A byte queue owned by the engine. Consumed bytes are dropped from the front.
#[derive(Debug, Default)]
pub(crate) struct ByteBuffer {
  data: BytesMut,
}

impl ByteBuffer {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      data: BytesMut::with_capacity(capacity),
    }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn bytes_mut(&mut self) -> &mut BytesMut {
    &mut self.data
  }

  /// Appends up to `max` bytes read from `io`. Transient errors count as `WouldBlock`.
  pub fn fill_from<IO: IoAdapter + ?Sized>(&mut self, io: &mut IO, max: usize) -> io::Result<ReadOutcome> {
    let start = self.data.len();
    self.data.resize(start + max, 0);
    let result = io.read(&mut self.data[start..]);
    let n = result.as_ref().map_or(0, |outcome| outcome.bytes().min(max));
    self.data.truncate(start + n);
    match result {
      Ok(ReadOutcome::Data(0)) => Ok(ReadOutcome::WouldBlock),
      Ok(outcome) => Ok(outcome),
      Err(e) if is_transient(&e) => Ok(ReadOutcome::WouldBlock),
      Err(e) => Err(e),
    }
  }

  /// Offers every queued byte to `io` once and drops exactly what it accepted.
  pub fn drain_to<IO: IoAdapter + ?Sized>(&mut self, io: &mut IO) -> io::Result<usize> {
    if self.data.is_empty() {
      return Ok(0);
    }
    let written = match io.write(&self.data) {
      Ok(n) => n.min(self.data.len()),
      Err(e) if is_transient(&e) => 0,
      Err(e) => return Err(e),
    };
    self.data.advance(written);
    Ok(written)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::VecDeque;

  #[derive(Default)]
  struct Script {
    reads: VecDeque<io::Result<Vec<u8>>>,
    accept: usize,
    written: Vec<u8>,
  }

  impl IoAdapter for Script {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
      match self.reads.pop_front() {
        Some(Ok(chunk)) if chunk.is_empty() => Ok(ReadOutcome::Eof(0)),
        Some(Ok(chunk)) => {
          buf[..chunk.len()].copy_from_slice(&chunk);
          Ok(ReadOutcome::Data(chunk.len()))
        }
        Some(Err(e)) => Err(e),
        None => Ok(ReadOutcome::WouldBlock),
      }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      let n = buf.len().min(self.accept);
      self.written.extend_from_slice(&buf[..n]);
      Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn fill_keeps_only_bytes_read() {
    let mut io = Script::default();
    io.reads.push_back(Ok(b"abc".to_vec()));
    io.reads.push_back(Err(io::ErrorKind::Interrupted.into()));
    io.reads.push_back(Ok(Vec::new()));

    let mut buf = ByteBuffer::default();
    assert_eq!(buf.fill_from(&mut io, 16).unwrap(), ReadOutcome::Data(3));
    assert_eq!(buf.fill_from(&mut io, 16).unwrap(), ReadOutcome::WouldBlock);
    assert_eq!(buf.fill_from(&mut io, 16).unwrap(), ReadOutcome::Eof(0));
    assert_eq!(&buf.bytes_mut()[..], b"abc");
  }

  #[test]
  fn partial_write_keeps_remainder_in_order() {
    let mut io = Script {
      accept: 2,
      ..Default::default()
    };
    let mut buf = ByteBuffer::default();
    buf.bytes_mut().extend_from_slice(b"hello");
    assert_eq!(buf.drain_to(&mut io).unwrap(), 2);
    assert_eq!(buf.len(), 3);
    assert_eq!(buf.drain_to(&mut io).unwrap(), 2);
    assert_eq!(buf.drain_to(&mut io).unwrap(), 1);
    assert!(buf.is_empty());
    assert_eq!(io.written, b"hello");
  }
}
