// src/lib.rs

//! ramqp - an embeddable AMQP 1.0 connection engine.
//!
//! An [`Engine`] turns bytes read by a host-supplied [`IoAdapter`] into protocol events
//! delivered to a [`Handler`], and turns the handler's reactions back into bytes. It
//! owns no event loop and no sockets: the host calls [`Engine::process`] whenever its
//! own readiness mechanism (poll, epoll, tokio, a pipe, shared memory) says so.

/// The connection handle, its sessions, links and deliveries, and connection options.
pub mod connection;
/// Factory for per-engine connection options.
pub mod container;
/// The read/dispatch/write engine driven by the host.
pub mod engine;
/// Crate-wide error type and AMQP error condition symbols.
pub mod error;
/// Application callbacks and the default-reply adapter.
pub mod handler;
/// AMQP messages and their section codec.
pub mod message;
/// AMQP 1.0 framing, type system and the protocol driver.
pub mod protocol;
/// The I/O adapter contract and the bundled adapters (TCP, IPC, in-process).
pub mod transport;

pub use connection::{Connection, ConnectionOptions, DeliveryId, EndpointState, Event, LinkId, SessionId};
pub use container::Container;
pub use engine::{Engine, IoFlags};
pub use error::AmqpError;
pub use handler::{Handler, MessagingAdapter, NoopHandler};
pub use message::{Body, Message};
pub use protocol::amqp::{DeliveryState, ErrorCondition, Role, Value};
pub use transport::{IoAdapter, ReadOutcome};

// --- Top-Level Library Information Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
///
/// ```
/// let (major, minor, patch) = ramqp::version();
/// println!("ramqp version: {}.{}.{}", major, minor, patch);
/// ```
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

pub fn version_major() -> i32 {
  VERSION_MAJOR
}

pub fn version_minor() -> i32 {
  VERSION_MINOR
}

pub fn version_patch() -> i32 {
  VERSION_PATCH
}
