// tests/inproc_exchange.rs

mod common;

use common::*;
use ramqp::transport::inproc::{bounded_pipe_pair, pipe_pair, InprocAdapter};
use ramqp::{Connection, Container, DeliveryId, DeliveryState, Engine, Handler, IoFlags, LinkId, Message};

use bytes::Bytes;

/// Sends `remaining` messages as credit allows, reacting inside `on_sendable`.
#[derive(Default)]
struct Producer {
  remaining: usize,
  sent: Vec<DeliveryId>,
  accepted: usize,
}

impl Handler for Producer {
  fn on_sendable(&mut self, conn: &mut Connection, link: LinkId) {
    while self.remaining > 0 && conn.link_credit(link).unwrap_or(0) > 0 {
      let mut msg = Message::from_bytes(Bytes::from(format!("msg-{}", self.sent.len())));
      msg.set_property("seq", self.sent.len() as u32);
      self.sent.push(conn.send(link, &msg).unwrap());
      self.remaining -= 1;
    }
  }

  fn on_delivery_update(
    &mut self,
    _conn: &mut Connection,
    _link: LinkId,
    _delivery: DeliveryId,
    state: Option<&DeliveryState>,
    _settled: bool,
  ) {
    if state == Some(&DeliveryState::Accepted) {
      self.accepted += 1;
    }
  }
}

fn pump<A: Handler, B: Handler>(
  client: &mut Engine<InprocAdapter, A>,
  server: &mut Engine<InprocAdapter, B>,
  mut until: impl FnMut(&Engine<InprocAdapter, A>, &Engine<InprocAdapter, B>) -> bool,
) {
  for _ in 0..10_000 {
    if until(client, server) {
      return;
    }
    client.process(IoFlags::default()).unwrap();
    server.process(IoFlags::default()).unwrap();
  }
  panic!("engines did not reach the expected state");
}

#[test]
fn producer_and_consumer_exchange_and_close() {
  setup_tracing();
  let container = Container::new("exchange-test");
  let (a, b) = pipe_pair();
  let mut client = Engine::new(
    a,
    Producer {
      remaining: 25,
      ..Default::default()
    },
    container.make_options(),
  );
  let mut server = Engine::new(b, RecordingHandler::default(), container.make_options());

  let session = client.connection_mut().open_session().unwrap();
  let link = client.connection_mut().open_sender(session, "orders").unwrap();
  assert_eq!(client.connection().link_name(link).unwrap(), "0/0");

  pump(&mut client, &mut server, |c, _| c.handler().accepted == 25);

  let received = &server.handler().messages;
  assert_eq!(received.len(), 25);
  for (i, msg) in received.iter().enumerate() {
    assert_eq!(msg.data(), Some(format!("msg-{}", i).as_bytes()));
    assert_eq!(msg.property("seq"), Some(&ramqp::Value::Uint(i as u32)));
  }
  // Every outgoing delivery was settled on both sides.
  for d in &client.handler().sent {
    assert!(!client.connection().delivery_pending(*d));
  }
  assert_eq!(server.connection().remote_container_id(), Some("exchange-test"));

  client.connection_mut().close(None).unwrap();
  pump(&mut client, &mut server, |c, s| c.closed() && s.closed());
  assert!(client.error_condition().is_none());
  assert!(server.error_condition().is_none());
  assert_eq!(server.handler().events.last().map(String::as_str), Some("transport-close"));
  assert!(server.handler().events.iter().any(|e| e == "connection-close"));
}

#[test]
fn large_message_over_a_narrow_pipe() {
  setup_tracing();
  let (a, b) = bounded_pipe_pair(Some(64));
  let options = ramqp::ConnectionOptions::new().max_frame_size(4096);
  let mut client = Engine::new(a, ramqp::NoopHandler, options.clone().container_id("client"));
  let mut server = Engine::new(b, RecordingHandler::default(), options.container_id("server"));

  let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
  let session = client.connection_mut().open_session().unwrap();
  let link = client.connection_mut().open_sender(session, "bulk").unwrap();
  let delivery = client
    .connection_mut()
    .send(link, &Message::from_bytes(Bytes::from(payload.clone())))
    .unwrap();

  pump(&mut client, &mut server, |_, s| !s.handler().messages.is_empty());
  assert_eq!(server.handler().messages[0].data(), Some(&payload[..]));

  pump(&mut client, &mut server, |c, _| !c.connection().delivery_pending(delivery));
  assert!(!client.closed());
  assert!(!server.closed());
}

#[test]
fn abrupt_transport_close_is_reported_to_the_peer() {
  setup_tracing();
  let (a, b) = pipe_pair();
  let mut client = Engine::new(a, RecordingHandler::default(), ramqp::ConnectionOptions::new().container_id("c"));
  let mut server = Engine::new(b, RecordingHandler::default(), ramqp::ConnectionOptions::new().container_id("s"));
  client.connection_mut().open().unwrap();
  pump(&mut client, &mut server, |c, _| c.connection().remote_container_id().is_some());

  use ramqp::IoAdapter;
  client.io_mut().close().unwrap();
  pump(&mut client, &mut server, |_, s| s.closed());
  assert_eq!(server.error_str(), Some("connection aborted"));
  assert!(server.handler().events.iter().any(|e| e == "transport-error"));
}
