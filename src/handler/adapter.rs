// src/handler/adapter.rs

use super::Handler;
use crate::connection::{Connection, DeliveryId, Event, LinkId};
use crate::error::AmqpError;
use crate::protocol::amqp::Role;

/// Routes driver events to a [`Handler`], applying the default replies configured on
/// the connection's options around each callback.
#[derive(Debug, Clone, Copy)]
pub struct MessagingAdapter {
  engine_handle: usize,
}

impl MessagingAdapter {
  pub fn new(engine_handle: usize) -> Self {
    Self { engine_handle }
  }

  pub fn dispatch<H: Handler + ?Sized>(&self, handler: &mut H, conn: &mut Connection, event: Event) {
    tracing::trace!(engine_handle = self.engine_handle, event = event.name(), "Dispatching event");
    let auto_open = conn.options().get_auto_open();
    match event {
      Event::ConnectionRemoteOpen => {
        if auto_open && conn.state().local_uninit() {
          self.log(conn.open(), "open connection");
        }
        handler.on_connection_open(conn);
      }
      Event::ConnectionRemoteClose => {
        handler.on_connection_close(conn);
        if auto_open && !conn.state().local_closed() {
          self.log(conn.close(None), "close connection");
        }
      }
      Event::SessionRemoteOpen(session) => {
        if auto_open && conn.session_state(session).is_ok_and(|s| s.local_uninit()) {
          self.log(conn.accept_session(session), "begin session");
        }
        handler.on_session_open(conn, session);
      }
      Event::SessionRemoteClose(session) => {
        handler.on_session_close(conn, session);
        if auto_open && conn.session_state(session).is_ok_and(|s| s.local_active()) {
          self.log(conn.close_session(session, None), "end session");
        }
      }
      Event::LinkRemoteOpen(link) => {
        if auto_open && conn.link_state(link).is_ok_and(|s| s.local_uninit()) {
          self.log(conn.accept_link(link), "attach link");
        }
        self.grant_initial_credit(conn, link);
        handler.on_link_open(conn, link);
      }
      Event::LinkRemoteClose(link) => {
        handler.on_link_close(conn, link);
        if auto_open && conn.link_state(link).is_ok_and(|s| s.local_active()) {
          self.log(conn.close_link(link, None), "detach link");
        }
      }
      Event::LinkFlow(link) => {
        let sendable = conn.link_role(link).is_ok_and(|r| r == Role::Sender)
          && conn.link_state(link).is_ok_and(|s| s.local_active())
          && conn.link_credit(link).is_ok_and(|c| c > 0);
        if sendable {
          handler.on_sendable(conn, link);
        }
      }
      Event::Message { link, delivery, message } => {
        handler.on_message(conn, link, delivery, &message);
        if conn.options().get_auto_accept() && conn.delivery_pending(delivery) {
          self.log(conn.accept(delivery), "accept delivery");
        }
        self.replenish_credit(conn, link);
      }
      Event::DeliveryUpdated {
        link,
        delivery,
        state,
        settled,
      } => {
        handler.on_delivery_update(conn, link, delivery, state.as_ref(), settled);
        let terminal = settled || state.as_ref().is_some_and(|s| s.is_terminal());
        if conn.options().get_auto_settle() && terminal {
          self.settle(conn, delivery);
        }
      }
      Event::TransportError(error) => handler.on_transport_error(conn, &error),
      Event::TransportClosed => handler.on_transport_close(conn),
      other @ Event::TransportTailClosed => handler.on_unhandled(conn, &other),
    }
  }

  fn grant_initial_credit(&self, conn: &mut Connection, link: LinkId) {
    let prefetch = conn.options().get_prefetch();
    if prefetch == 0 || !self.is_active_receiver(conn, link) {
      return;
    }
    if conn.link_credit(link).is_ok_and(|c| c == 0) {
      self.log(conn.flow(link, prefetch), "grant credit");
    }
  }

  fn replenish_credit(&self, conn: &mut Connection, link: LinkId) {
    let prefetch = conn.options().get_prefetch();
    if prefetch == 0 || !self.is_active_receiver(conn, link) {
      return;
    }
    if conn.link_credit(link).is_ok_and(|c| c <= prefetch / 2) {
      self.log(conn.flow(link, prefetch), "replenish credit");
    }
  }

  fn settle(&self, conn: &mut Connection, delivery: DeliveryId) {
    if conn.delivery_pending(delivery) {
      self.log(conn.settle(delivery), "settle delivery");
    }
  }

  fn is_active_receiver(&self, conn: &Connection, link: LinkId) -> bool {
    conn.link_role(link).is_ok_and(|r| r == Role::Receiver) && conn.link_state(link).is_ok_and(|s| s.local_active())
  }

  fn log(&self, result: Result<(), AmqpError>, action: &'static str) {
    if let Err(e) = result {
      tracing::warn!(engine_handle = self.engine_handle, error = %e, action, "Default reply failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::ConnectionOptions;
  use crate::handler::NoopHandler;
  use crate::protocol::amqp::FrameBody;

  #[derive(Default)]
  struct Recorder {
    calls: Vec<&'static str>,
  }

  impl Handler for Recorder {
    fn on_connection_open(&mut self, conn: &mut Connection) {
      // The default open reply is already queued.
      assert!(conn.state().local_active());
      self.calls.push("open");
    }
    fn on_connection_close(&mut self, _conn: &mut Connection) {
      self.calls.push("close");
    }
    fn on_unhandled(&mut self, _conn: &mut Connection, event: &Event) {
      self.calls.push(event.name());
    }
  }

  fn queued(conn: &Connection) -> Vec<&'static str> {
    conn
      .output
      .iter()
      .map(|f| match &f.body {
        FrameBody::Amqp { performative, .. } => performative.name(),
        FrameBody::Heartbeat => "heartbeat",
      })
      .collect()
  }

  #[test]
  fn remote_open_is_answered_before_the_handler_runs() {
    let mut conn = Connection::new(ConnectionOptions::new(), 0);
    let mut handler = Recorder::default();
    let adapter = MessagingAdapter::new(0);
    adapter.dispatch(&mut handler, &mut conn, Event::ConnectionRemoteOpen);
    assert_eq!(handler.calls, vec!["open"]);
    assert_eq!(queued(&conn), vec!["open"]);

    adapter.dispatch(&mut handler, &mut conn, Event::ConnectionRemoteClose);
    adapter.dispatch(&mut handler, &mut conn, Event::TransportTailClosed);
    assert_eq!(handler.calls, vec!["open", "close", "transport-tail-closed"]);
    assert_eq!(queued(&conn), vec!["open", "close"]);
  }

  #[test]
  fn auto_open_off_leaves_replies_to_the_application() {
    let mut conn = Connection::new(ConnectionOptions::new().auto_open(false), 0);
    MessagingAdapter::new(0).dispatch(&mut NoopHandler, &mut conn, Event::ConnectionRemoteOpen);
    assert!(conn.state().local_uninit());
    assert!(conn.output.is_empty());
  }
}
