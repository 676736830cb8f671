// src/engine/core.rs

use super::{Engine, IoFlags};
use crate::connection::Event;
use crate::error::AmqpError;
use crate::handler::Handler;
use crate::transport::IoAdapter;
use std::io;

impl<IO: IoAdapter, H: Handler> Engine<IO, H> {
  /// Runs one read/dispatch/write pass.
  ///
  /// A no-op once [`closed`](Engine::closed). An I/O failure closes the engine before
  /// the error is returned; protocol failures are reported through
  /// [`error_condition`](Engine::error_condition) and close the engine without an `Err`.
  pub fn process(&mut self, flags: IoFlags) -> Result<(), AmqpError> {
    if self.closed {
      return Ok(());
    }
    if flags.contains(IoFlags::READ) {
      self.try_read()?;
    }
    self.dispatch();
    self.driver.encode_output(self.outbound.bytes_mut());
    if flags.contains(IoFlags::WRITE) {
      self.try_write()?;
    }
    self.check_closed()
  }

  fn try_read(&mut self) -> Result<(), AmqpError> {
    let max = self.can_read();
    if max == 0 {
      return Ok(());
    }
    let outcome = match self.inbound.fill_from(&mut self.io, max) {
      Ok(outcome) => outcome,
      Err(e) => return Err(self.fail_io(e, "read")),
    };
    let n = outcome.bytes();
    if n > 0 {
      tracing::trace!(engine_handle = self.handle, bytes = n, buffered = self.inbound.len(), "Read from transport");
      self.driver.commit(self.inbound.bytes_mut());
    }
    if outcome.is_eof() {
      tracing::debug!(engine_handle = self.handle, "Transport reached end of stream");
      self.driver.close_tail();
    }
    Ok(())
  }

  /// Hands every pending event to the handler, in order, until the queue is empty.
  fn dispatch(&mut self) {
    let adapter = self.adapter;
    while let Some(event) = self.driver.next_event() {
      adapter.dispatch(&mut self.handler, self.driver.connection_mut(), event);
    }
  }

  fn try_write(&mut self) -> Result<(), AmqpError> {
    if self.outbound.is_empty() {
      return Ok(());
    }
    match self.outbound.drain_to(&mut self.io) {
      Ok(written) => {
        tracing::trace!(engine_handle = self.handle, bytes = written, remaining = self.outbound.len(), "Wrote to transport");
        Ok(())
      }
      Err(e) => Err(self.fail_io(e, "write")),
    }
  }

  fn check_closed(&mut self) -> Result<(), AmqpError> {
    let done = self.driver.has_failed() || (self.driver.is_done() && self.outbound.is_empty());
    if !done {
      return Ok(());
    }
    self.closed = true;
    tracing::info!(
      engine_handle = self.handle,
      error = ?self.driver.error(),
      unsent = self.outbound.len(),
      "Engine closed"
    );
    self.driver.push_event(Event::TransportClosed);
    self.dispatch();
    if let Err(e) = self.io.close() {
      tracing::error!(engine_handle = self.handle, error = %e, "Failed to close transport");
      let error = AmqpError::Io(e);
      self.io_error = Some(error.to_condition());
      return Err(error);
    }
    Ok(())
  }

  /// Closes the engine after a read or write failure and returns the error to propagate.
  fn fail_io(&mut self, e: io::Error, op: &'static str) -> AmqpError {
    tracing::error!(engine_handle = self.handle, error = %e, op, "Transport failed");
    self.closed = true;
    let error = AmqpError::Io(e);
    self.io_error = Some(error.to_condition());
    if let Err(close_err) = self.io.close() {
      tracing::warn!(engine_handle = self.handle, error = %close_err, "Failed to close transport after error");
    }
    error
  }
}

#[cfg(test)]
mod tests {
  use crate::connection::ConnectionOptions;
  use crate::engine::{Engine, IoFlags};
  use crate::handler::NoopHandler;
  use crate::transport::{IoAdapter, ReadOutcome};
  use std::io;

  #[derive(Default)]
  struct Counting {
    reads: usize,
    closes: usize,
    eof: bool,
  }

  impl IoAdapter for Counting {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<ReadOutcome> {
      self.reads += 1;
      Ok(if self.eof { ReadOutcome::Eof(0) } else { ReadOutcome::WouldBlock })
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
      self.closes += 1;
      Ok(())
    }
  }

  #[test]
  fn idle_engine_stays_open() {
    let mut engine = Engine::with_defaults(Counting::default(), NoopHandler);
    for _ in 0..3 {
      engine.process(IoFlags::default()).unwrap();
    }
    assert!(!engine.closed());
    assert_eq!(engine.io().reads, 3);
    assert_eq!(engine.can_write(), 0);
    assert!(engine.error_str().is_none());
  }

  #[test]
  fn eof_closes_once_and_later_calls_are_noops() {
    let io = Counting {
      eof: true,
      ..Default::default()
    };
    let mut engine = Engine::new(io, NoopHandler, ConnectionOptions::new().container_id("c"));
    engine.process(IoFlags::default()).unwrap();
    assert!(engine.closed());
    assert_eq!(engine.can_read(), 0);
    engine.process(IoFlags::default()).unwrap();
    assert_eq!(engine.io().reads, 1);
    assert_eq!(engine.io().closes, 1);
    assert_eq!(engine.error_str(), Some("connection aborted"));
  }
}
