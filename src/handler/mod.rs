// src/handler/mod.rs

mod adapter;

pub use adapter::MessagingAdapter;

use crate::connection::{Connection, DeliveryId, Event, LinkId, SessionId};
use crate::message::Message;
use crate::protocol::amqp::{DeliveryState, ErrorCondition};

/// Application callbacks invoked by the engine while it dispatches protocol events.
///
/// Every method has a no-op default. Callbacks run synchronously inside
/// [`Engine::process`](crate::Engine::process) and must not block; any state change made
/// through `conn` is encoded and written before that same call returns.
///
/// The default replies (open, close, credit, accept, settle) configured on
/// [`ConnectionOptions`](crate::ConnectionOptions) have already been applied when the
/// `*_open` callbacks run, and are applied after `on_message`/`on_delivery_update` unless
/// the handler settled the delivery itself.
pub trait Handler {
  fn on_connection_open(&mut self, _conn: &mut Connection) {}
  fn on_connection_close(&mut self, _conn: &mut Connection) {}

  fn on_session_open(&mut self, _conn: &mut Connection, _session: SessionId) {}
  fn on_session_close(&mut self, _conn: &mut Connection, _session: SessionId) {}

  fn on_link_open(&mut self, _conn: &mut Connection, _link: LinkId) {}
  fn on_link_close(&mut self, _conn: &mut Connection, _link: LinkId) {}

  /// A sender link has credit.
  fn on_sendable(&mut self, _conn: &mut Connection, _link: LinkId) {}

  fn on_message(&mut self, _conn: &mut Connection, _link: LinkId, _delivery: DeliveryId, _message: &Message) {}

  /// The peer changed the state of, or settled, one of our deliveries.
  fn on_delivery_update(
    &mut self,
    _conn: &mut Connection,
    _link: LinkId,
    _delivery: DeliveryId,
    _state: Option<&DeliveryState>,
    _settled: bool,
  ) {
  }

  fn on_transport_error(&mut self, _conn: &mut Connection, _error: &ErrorCondition) {}

  /// Last event of a connection. No callback follows it.
  fn on_transport_close(&mut self, _conn: &mut Connection) {}

  /// Events without a dedicated callback.
  fn on_unhandled(&mut self, _conn: &mut Connection, _event: &Event) {}
}

macro_rules! forward_handler {
  ($($ty:ty),*) => {$(
    impl<H: Handler + ?Sized> Handler for $ty {
      fn on_connection_open(&mut self, conn: &mut Connection) {
        (**self).on_connection_open(conn)
      }
      fn on_connection_close(&mut self, conn: &mut Connection) {
        (**self).on_connection_close(conn)
      }
      fn on_session_open(&mut self, conn: &mut Connection, session: SessionId) {
        (**self).on_session_open(conn, session)
      }
      fn on_session_close(&mut self, conn: &mut Connection, session: SessionId) {
        (**self).on_session_close(conn, session)
      }
      fn on_link_open(&mut self, conn: &mut Connection, link: LinkId) {
        (**self).on_link_open(conn, link)
      }
      fn on_link_close(&mut self, conn: &mut Connection, link: LinkId) {
        (**self).on_link_close(conn, link)
      }
      fn on_sendable(&mut self, conn: &mut Connection, link: LinkId) {
        (**self).on_sendable(conn, link)
      }
      fn on_message(&mut self, conn: &mut Connection, link: LinkId, delivery: DeliveryId, message: &Message) {
        (**self).on_message(conn, link, delivery, message)
      }
      fn on_delivery_update(
        &mut self,
        conn: &mut Connection,
        link: LinkId,
        delivery: DeliveryId,
        state: Option<&DeliveryState>,
        settled: bool,
      ) {
        (**self).on_delivery_update(conn, link, delivery, state, settled)
      }
      fn on_transport_error(&mut self, conn: &mut Connection, error: &ErrorCondition) {
        (**self).on_transport_error(conn, error)
      }
      fn on_transport_close(&mut self, conn: &mut Connection) {
        (**self).on_transport_close(conn)
      }
      fn on_unhandled(&mut self, conn: &mut Connection, event: &Event) {
        (**self).on_unhandled(conn, event)
      }
    }
  )*};
}

forward_handler!(&mut H, Box<H>);

/// A handler that ignores every event, leaving the connection to the default replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl Handler for NoopHandler {}
