// src/engine/mod.rs

//! The connection engine: the object a host I/O loop drives.

mod buffer;
mod core;

use crate::connection::{Connection, ConnectionOptions};
use crate::handler::{Handler, MessagingAdapter};
use crate::protocol::amqp::ErrorCondition;
use crate::protocol::ProtocolDriver;
use crate::transport::IoAdapter;
use buffer::ByteBuffer;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

static NEXT_ENGINE_HANDLE: AtomicUsize = AtomicUsize::new(1);

bitflags::bitflags! {
  /// Which halves of the I/O cycle a [`Engine::process`] call may perform.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct IoFlags: u8 {
    const READ = 0b01;
    const WRITE = 0b10;
  }
}

impl Default for IoFlags {
  fn default() -> Self {
    IoFlags::READ | IoFlags::WRITE
  }
}

/// One AMQP connection driven over a host-supplied [`IoAdapter`].
///
/// The engine performs no I/O of its own accord. Each [`process`](Engine::process) call
/// does one read attempt, dispatches every resulting event to the handler, encodes the
/// handler's reactions and does one write attempt. The host uses
/// [`can_read`](Engine::can_read)/[`can_write`](Engine::can_write) to decide which
/// readiness to wait for, and [`closed`](Engine::closed) to know when to stop.
///
/// `H` may be an owned handler, a `Box<dyn Handler>` or a `&mut` borrow of a handler
/// that outlives the engine.
pub struct Engine<IO: IoAdapter, H: Handler> {
  handle: usize,
  io: IO,
  handler: H,
  driver: ProtocolDriver,
  adapter: MessagingAdapter,
  inbound: ByteBuffer,
  outbound: ByteBuffer,
  read_buffer_size: usize,
  closed: bool,
  /// Set when the I/O adapter failed. Protocol failures live in the driver.
  io_error: Option<ErrorCondition>,
}

impl<IO: IoAdapter, H: Handler> Engine<IO, H> {
  pub fn new(io: IO, handler: H, options: ConnectionOptions) -> Self {
    let handle = NEXT_ENGINE_HANDLE.fetch_add(1, Ordering::Relaxed);
    let read_buffer_size = options.get_read_buffer_size();
    tracing::debug!(
      engine_handle = handle,
      container_id = options.get_container_id(),
      read_buffer_size,
      "Engine created"
    );
    Self {
      handle,
      io,
      handler,
      driver: ProtocolDriver::new(options, handle),
      adapter: MessagingAdapter::new(handle),
      inbound: ByteBuffer::with_capacity(read_buffer_size),
      outbound: ByteBuffer::default(),
      read_buffer_size,
      closed: false,
      io_error: None,
    }
  }

  pub fn with_defaults(io: IO, handler: H) -> Self {
    Self::new(io, handler, ConnectionOptions::default())
  }

  /// Process-unique id used as the `engine_handle` field in logs.
  pub fn handle(&self) -> usize {
    self.handle
  }

  /// Bytes the engine is willing to accept from the next read. `0` once closed or once
  /// no further input will be processed.
  pub fn can_read(&self) -> usize {
    if self.closed || self.driver.tail_closed() {
      return 0;
    }
    let window = self
      .read_buffer_size
      .max(self.driver.pending_frame_size().unwrap_or(0));
    window.saturating_sub(self.inbound.len())
  }

  /// Encoded bytes the I/O adapter has not accepted yet.
  pub fn can_write(&self) -> usize {
    self.outbound.len()
  }

  /// Whether a `process` call would have something to write, including frames queued
  /// through [`connection_mut`](Engine::connection_mut) and not yet encoded.
  pub fn wants_write(&self) -> bool {
    !self.closed && (!self.outbound.is_empty() || self.driver.has_output())
  }

  pub fn closed(&self) -> bool {
    self.closed
  }

  pub fn connection(&self) -> &Connection {
    self.driver.connection()
  }

  pub fn connection_mut(&mut self) -> &mut Connection {
    self.driver.connection_mut()
  }

  /// Why the connection ended, if it ended abnormally.
  pub fn error_condition(&self) -> Option<&ErrorCondition> {
    self.io_error.as_ref().or(self.driver.error())
  }

  pub fn error_str(&self) -> Option<&str> {
    self
      .error_condition()
      .map(|e| e.description.as_deref().unwrap_or(e.condition.as_str()))
  }

  pub fn handler(&self) -> &H {
    &self.handler
  }

  pub fn handler_mut(&mut self) -> &mut H {
    &mut self.handler
  }

  pub fn io(&self) -> &IO {
    &self.io
  }

  pub fn io_mut(&mut self) -> &mut IO {
    &mut self.io
  }

  /// Applies idle timeouts as of `now`. Returns the instant by which `tick` should be
  /// called again, or `None` if no timer is needed. A connection failed by the local
  /// timeout is closed by the next `process` call.
  pub fn tick(&mut self, now: Instant) -> Option<Instant> {
    if self.closed {
      return None;
    }
    self.driver.tick(now)
  }
}

impl<IO: IoAdapter, H: Handler> fmt::Debug for Engine<IO, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Engine")
      .field("handle", &self.handle)
      .field("inbound", &self.inbound.len())
      .field("outbound", &self.outbound.len())
      .field("closed", &self.closed)
      .field("error", &self.error_condition())
      .finish_non_exhaustive()
  }
}
