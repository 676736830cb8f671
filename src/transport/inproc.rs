// src/transport/inproc.rs

//! An in-memory duplex byte pipe for connecting two engines in one process.

use super::{IoAdapter, ReadOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Direction {
  data: VecDeque<u8>,
  /// Writer side closed: the reader sees end-of-stream once `data` drains.
  writer_closed: bool,
  /// Reader side closed: further writes fail.
  reader_closed: bool,
}

/// One end of an in-memory pipe created by [`pipe_pair`].
#[derive(Debug)]
pub struct InprocAdapter {
  rx: Arc<Mutex<Direction>>,
  tx: Arc<Mutex<Direction>>,
  /// Upper bound on bytes buffered towards the peer; `None` is unbounded.
  capacity: Option<usize>,
}

/// Creates two connected adapters with unbounded buffering.
pub fn pipe_pair() -> (InprocAdapter, InprocAdapter) {
  bounded_pipe_pair(None)
}

/// Creates two connected adapters that each buffer at most `capacity` unread bytes
/// towards the other. Writes beyond that are partial.
pub fn bounded_pipe_pair(capacity: Option<usize>) -> (InprocAdapter, InprocAdapter) {
  let a_to_b = Arc::new(Mutex::new(Direction::default()));
  let b_to_a = Arc::new(Mutex::new(Direction::default()));
  (
    InprocAdapter {
      rx: b_to_a.clone(),
      tx: a_to_b.clone(),
      capacity,
    },
    InprocAdapter {
      rx: a_to_b,
      tx: b_to_a,
      capacity,
    },
  )
}

impl InprocAdapter {
  /// Bytes the peer wrote that this end has not read yet.
  pub fn pending(&self) -> usize {
    self.rx.lock().data.len()
  }
}

impl IoAdapter for InprocAdapter {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    let mut rx = self.rx.lock();
    if rx.data.is_empty() {
      return Ok(if rx.writer_closed {
        ReadOutcome::Eof(0)
      } else {
        ReadOutcome::WouldBlock
      });
    }
    let n = buf.len().min(rx.data.len());
    for (dst, src) in buf.iter_mut().zip(rx.data.drain(..n)) {
      *dst = src;
    }
    Ok(ReadOutcome::Data(n))
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let mut tx = self.tx.lock();
    if tx.reader_closed {
      return Err(io::Error::new(io::ErrorKind::BrokenPipe, "inproc peer closed"));
    }
    let room = self.capacity.map_or(buf.len(), |cap| cap.saturating_sub(tx.data.len()));
    let n = buf.len().min(room);
    tx.data.extend(&buf[..n]);
    Ok(n)
  }

  fn close(&mut self) -> io::Result<()> {
    self.tx.lock().writer_closed = true;
    let mut rx = self.rx.lock();
    rx.reader_closed = true;
    rx.data.clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bytes_flow_both_ways() {
    let (mut a, mut b) = pipe_pair();
    let mut buf = [0u8; 4];
    assert_eq!(a.write(b"ping").unwrap(), 4);
    assert_eq!(b.pending(), 4);
    assert_eq!(b.read(&mut buf).unwrap(), ReadOutcome::Data(4));
    assert_eq!(&buf, b"ping");
    assert_eq!(b.write(b"po").unwrap(), 2);
    assert_eq!(a.read(&mut buf).unwrap(), ReadOutcome::Data(2));
    assert_eq!(a.read(&mut buf).unwrap(), ReadOutcome::WouldBlock);
  }

  #[test]
  fn bounded_pipe_accepts_partial_writes() {
    let (mut a, mut b) = bounded_pipe_pair(Some(3));
    assert_eq!(a.write(b"hello").unwrap(), 3);
    assert_eq!(a.write(b"lo").unwrap(), 0);
    let mut buf = [0u8; 8];
    assert_eq!(b.read(&mut buf).unwrap(), ReadOutcome::Data(3));
    assert_eq!(a.write(b"lo").unwrap(), 2);
  }

  #[test]
  fn close_gives_peer_eof_after_data() {
    let (mut a, mut b) = pipe_pair();
    a.write(b"x").unwrap();
    a.close().unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(b.read(&mut buf).unwrap(), ReadOutcome::Data(1));
    assert_eq!(b.read(&mut buf).unwrap(), ReadOutcome::Eof(0));
    assert!(b.write(b"y").is_err());
  }
}
