use super::{DeliveryId, LinkId, SessionId};
use crate::message::Message;
use crate::protocol::amqp::performative::{DeliveryState, ErrorCondition};
use std::collections::VecDeque;

/// Something the protocol core observed and the handler should hear about.
///
/// Events are produced in the order the peer's frames were decoded and are
/// delivered to the handler exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  ConnectionRemoteOpen,
  ConnectionRemoteClose,
  SessionRemoteOpen(SessionId),
  SessionRemoteClose(SessionId),
  LinkRemoteOpen(LinkId),
  LinkRemoteClose(LinkId),
  /// Credit or drain state of a link changed.
  LinkFlow(LinkId),
  /// A complete (possibly reassembled) message arrived on a receiver link.
  Message {
    link: LinkId,
    delivery: DeliveryId,
    message: Message,
  },
  /// The peer updated the state or settlement of a delivery.
  DeliveryUpdated {
    link: LinkId,
    delivery: DeliveryId,
    state: Option<DeliveryState>,
    settled: bool,
  },
  /// No further input will be read.
  TransportTailClosed,
  TransportError(ErrorCondition),
  /// Always the last event of an engine.
  TransportClosed,
}

impl Event {
  pub fn name(&self) -> &'static str {
    match self {
      Event::ConnectionRemoteOpen => "connection-remote-open",
      Event::ConnectionRemoteClose => "connection-remote-close",
      Event::SessionRemoteOpen(_) => "session-remote-open",
      Event::SessionRemoteClose(_) => "session-remote-close",
      Event::LinkRemoteOpen(_) => "link-remote-open",
      Event::LinkRemoteClose(_) => "link-remote-close",
      Event::LinkFlow(_) => "link-flow",
      Event::Message { .. } => "message",
      Event::DeliveryUpdated { .. } => "delivery-updated",
      Event::TransportTailClosed => "transport-tail-closed",
      Event::TransportError(_) => "transport-error",
      Event::TransportClosed => "transport-closed",
    }
  }
}

/// FIFO of undispatched events.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
  events: VecDeque<Event>,
}

impl EventQueue {
  pub fn push(&mut self, event: Event) {
    tracing::trace!(event = event.name(), queued = self.events.len() + 1, "Event queued");
    self.events.push_back(event);
  }

  pub fn pop(&mut self) -> Option<Event> {
    self.events.pop_front()
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn queue_is_fifo() {
    let mut q = EventQueue::default();
    q.push(Event::ConnectionRemoteOpen);
    q.push(Event::TransportTailClosed);
    assert_eq!(q.len(), 2);
    assert_eq!(q.pop(), Some(Event::ConnectionRemoteOpen));
    assert_eq!(q.pop(), Some(Event::TransportTailClosed));
    assert!(q.pop().is_none());
    assert!(q.is_empty());
  }
}
