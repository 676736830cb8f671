// src/protocol/driver.rs

//! Drives a [`Connection`] from raw bytes: decodes inbound frames into state changes
//! and events, and encodes queued frames into outbound bytes.

use crate::connection::{
  Connection, ConnectionOptions, Delivery, EndpointState, Event, EventQueue, Link, LinkId, Partial, Session, SessionId,
};
use crate::error::{condition, AmqpError};
use crate::message::Message;
use crate::protocol::amqp::codec::{Frame, FrameBody, FrameCodec};
use crate::protocol::amqp::header::ProtocolHeader;
use crate::protocol::amqp::performative::{
  Attach, Begin, Close, Detach, Disposition, End, ErrorCondition, Flow, Open, Performative, Role, Transfer,
};
use bytes::{Bytes, BytesMut};
use std::time::Instant;
use tokio_util::codec::{Decoder, Encoder};

/// The protocol core behind an engine.
#[derive(Debug)]
pub(crate) struct ProtocolDriver {
  handle: usize,
  connection: Connection,
  codec: FrameCodec,
  events: EventQueue,
  header_received: bool,
  header_sent: bool,
  /// No more input will be processed.
  tail_closed: bool,
  /// Our close frame has been encoded.
  close_sent: bool,
  failed: bool,
  error: Option<ErrorCondition>,
  last_input: Instant,
  last_output: Instant,
}

impl ProtocolDriver {
  pub fn new(options: ConnectionOptions, handle: usize) -> Self {
    let codec = FrameCodec::new(options.get_max_frame_size() as usize);
    let now = Instant::now();
    Self {
      handle,
      connection: Connection::new(options, handle),
      codec,
      events: EventQueue::default(),
      header_received: false,
      header_sent: false,
      tail_closed: false,
      close_sent: false,
      failed: false,
      error: None,
      last_input: now,
      last_output: now,
    }
  }

  pub fn connection(&self) -> &Connection {
    &self.connection
  }

  pub fn connection_mut(&mut self) -> &mut Connection {
    &mut self.connection
  }

  /// The condition that ended the connection abnormally, if any.
  pub fn error(&self) -> Option<&ErrorCondition> {
    self.error.as_ref()
  }

  pub fn has_failed(&self) -> bool {
    self.failed
  }

  pub fn tail_closed(&self) -> bool {
    self.tail_closed
  }

  /// Body bytes still missing for the frame currently being decoded.
  pub fn pending_frame_size(&self) -> Option<usize> {
    self.codec.pending_frame_size()
  }

  pub fn has_output(&self) -> bool {
    self.connection.has_output()
  }

  /// Tail and head both closed, nothing left to encode and nothing left to dispatch.
  pub fn is_done(&self) -> bool {
    self.tail_closed && (self.close_sent || self.failed) && !self.connection.has_output() && self.events.is_empty()
  }

  // --- Input ---

  /// Decodes every complete frame at the front of `inbound`, leaving a partial frame in place.
  pub fn commit(&mut self, inbound: &mut BytesMut) {
    if self.tail_closed {
      if !inbound.is_empty() {
        tracing::trace!(engine_handle = self.handle, bytes = inbound.len(), "Discarding input after tail closed");
        inbound.clear();
      }
      return;
    }
    if inbound.is_empty() {
      return;
    }
    self.last_input = Instant::now();

    if !self.header_received {
      match ProtocolHeader::decode(inbound) {
        Ok(None) => return,
        Ok(Some(_)) => {
          tracing::debug!(engine_handle = self.handle, "Received AMQP protocol header");
          self.header_received = true;
        }
        Err(e) => {
          self.fail(e);
          return;
        }
      }
    }

    while !self.tail_closed {
      match self.codec.decode(inbound) {
        Ok(Some(frame)) => {
          if let Err(e) = self.apply(frame) {
            self.fail(e);
          }
        }
        Ok(None) => break,
        Err(e) => self.fail(e),
      }
    }
  }

  /// The transport reported end-of-stream.
  pub fn close_tail(&mut self) {
    if self.tail_closed {
      return;
    }
    self.tail_closed = true;
    if !self.connection.state.remote_closed() {
      let error = ErrorCondition::new(condition::FRAMING_ERROR, "connection aborted");
      tracing::warn!(engine_handle = self.handle, "Transport closed before the peer sent close");
      self.error = Some(error.clone());
      self.failed = true;
      self.events.push(Event::TransportError(error));
    }
    self.events.push(Event::TransportTailClosed);
  }

  pub fn next_event(&mut self) -> Option<Event> {
    self.events.pop()
  }

  pub fn push_event(&mut self, event: Event) {
    self.events.push(event);
  }

  // --- Output ---

  /// Encodes every queued frame into `outbound`, preceded by the protocol header the
  /// first time anything is written.
  pub fn encode_output(&mut self, outbound: &mut BytesMut) {
    // Ids carried by undispatched events must stay resolvable.
    if self.events.is_empty() {
      self.connection.reap_closed();
    }
    let start = outbound.len();
    while let Some(frame) = self.connection.output.pop_front() {
      if self.close_sent {
        tracing::trace!(engine_handle = self.handle, frame = frame.name(), "Dropping frame queued after close");
        continue;
      }
      self.write_header(outbound);
      let is_close = matches!(
        frame.body,
        FrameBody::Amqp {
          performative: Performative::Close(_),
          ..
        }
      );
      let name = frame.name();
      let channel = frame.channel;
      if let Err(e) = self.codec.encode(frame, outbound) {
        self.fail(e);
        continue;
      }
      tracing::trace!(engine_handle = self.handle, channel, frame = name, "Frame encoded");
      if is_close {
        self.close_sent = true;
      }
    }
    if outbound.len() > start {
      self.last_output = Instant::now();
    }
  }

  fn write_header(&mut self, outbound: &mut BytesMut) {
    if !self.header_sent {
      ProtocolHeader::amqp().encode(outbound);
      self.header_sent = true;
    }
  }

  // --- Timers ---

  /// Applies idle timeouts as of `now` and returns when this should be called next.
  pub fn tick(&mut self, now: Instant) -> Option<Instant> {
    if self.failed || self.tail_closed {
      return None;
    }
    let mut deadline = None;

    if let Some(local) = self.connection.options.get_idle_timeout() {
      let expires = self.last_input + local;
      if now >= expires {
        tracing::warn!(engine_handle = self.handle, timeout = ?local, "Local idle timeout expired");
        self.fail_with(ErrorCondition::new(
          condition::RESOURCE_LIMIT_EXCEEDED,
          "local-idle-timeout expired",
        ));
        return None;
      }
      deadline = Some(expires);
    }

    if let Some(remote) = self.connection.remote_idle_timeout() {
      let interval = remote / 2;
      let mut due = self.last_output + interval;
      if now >= due && !self.connection.state.local_closed() {
        tracing::trace!(engine_handle = self.handle, "Queueing heartbeat");
        self.connection.push_frame(Frame::heartbeat());
        self.last_output = now;
        due = now + interval;
      }
      deadline = Some(deadline.map_or(due, |d: Instant| d.min(due)));
    }
    deadline
  }

  // --- Failure ---

  pub fn fail(&mut self, error: AmqpError) {
    tracing::error!(engine_handle = self.handle, error = %error, "Protocol failure, closing connection");
    self.fail_with(error.to_condition());
  }

  fn fail_with(&mut self, error: ErrorCondition) {
    if self.failed {
      return;
    }
    self.failed = true;
    self.tail_closed = true;
    self.error = Some(error.clone());
    if !self.connection.state.local_closed() {
      if let Err(e) = self.connection.close(Some(error.clone())) {
        tracing::warn!(engine_handle = self.handle, error = %e, "Could not queue close after failure");
      }
    }
    self.events.push(Event::TransportError(error));
  }

  // --- Frame handling ---

  fn apply(&mut self, frame: Frame) -> Result<(), AmqpError> {
    let channel = frame.channel;
    let (performative, payload) = match frame.body {
      FrameBody::Heartbeat => {
        tracing::trace!(engine_handle = self.handle, "Heartbeat received");
        return Ok(());
      }
      FrameBody::Amqp { performative, payload } => (performative, payload),
    };
    tracing::trace!(engine_handle = self.handle, channel, frame = performative.name(), "Frame received");

    if self.connection.remote_open.is_none() && !matches!(performative, Performative::Open(_)) {
      return Err(AmqpError::ProtocolViolation(format!(
        "expected open, got {}",
        performative.name()
      )));
    }

    match performative {
      Performative::Open(open) => self.on_open(open),
      Performative::Begin(begin) => self.on_begin(channel, begin),
      Performative::Attach(attach) => self.on_attach(channel, attach),
      Performative::Flow(flow) => self.on_flow(channel, flow),
      Performative::Transfer(transfer) => self.on_transfer(channel, transfer, payload),
      Performative::Disposition(disposition) => self.on_disposition(channel, disposition),
      Performative::Detach(detach) => self.on_detach(channel, detach),
      Performative::End(end) => self.on_end(channel, end),
      Performative::Close(close) => self.on_close(close),
    }
  }

  fn session_for(&self, channel: u16) -> Result<SessionId, AmqpError> {
    self
      .connection
      .remote_channels
      .get(&channel)
      .copied()
      .ok_or_else(|| AmqpError::ProtocolViolation(format!("no session begun on channel {}", channel)))
  }

  fn link_for(&self, session: SessionId, handle: u32) -> Result<LinkId, AmqpError> {
    self.connection.sessions[session.index()]
      .remote_handles
      .get(&handle)
      .copied()
      .ok_or_else(|| AmqpError::ProtocolViolation(format!("handle {} is not attached", handle)))
  }

  fn on_open(&mut self, open: Open) -> Result<(), AmqpError> {
    if self.connection.remote_open.is_some() {
      return Err(AmqpError::ProtocolViolation("duplicate open".into()));
    }
    tracing::info!(
      engine_handle = self.handle,
      remote_container_id = %open.container_id,
      max_frame_size = open.max_frame_size,
      channel_max = open.channel_max,
      "Peer opened connection"
    );
    self.connection.remote_open = Some(open);
    self.connection.state.set_remote(EndpointState::REMOTE_ACTIVE);
    self.events.push(Event::ConnectionRemoteOpen);
    Ok(())
  }

  fn on_begin(&mut self, channel: u16, begin: Begin) -> Result<(), AmqpError> {
    if self.connection.remote_channels.contains_key(&channel) {
      return Err(AmqpError::ProtocolViolation(format!("channel {} already in use", channel)));
    }
    let conn = &mut self.connection;
    let id = match begin.remote_channel {
      // Answer to a session we began.
      Some(local) => {
        let index = conn
          .sessions
          .iter()
          .find(|(_, s)| s.channel == local && s.state.local_active() && s.remote_channel.is_none())
          .map(|(i, _)| i)
          .ok_or_else(|| AmqpError::ProtocolViolation(format!("begin answers unknown channel {}", local)))?;
        SessionId(index)
      }
      None => SessionId(conn.sessions.insert(Session::new(0))),
    };
    conn.sessions[id.index()].remote_begin(channel, &begin);
    conn.remote_channels.insert(channel, id);
    tracing::debug!(engine_handle = self.handle, session = %id, remote_channel = channel, "Peer began session");
    self.events.push(Event::SessionRemoteOpen(id));
    self.connection.pump_session(id);
    Ok(())
  }

  fn on_attach(&mut self, channel: u16, attach: Attach) -> Result<(), AmqpError> {
    let session = self.session_for(channel)?;
    let conn = &mut self.connection;
    if conn.sessions[session.index()].remote_handles.contains_key(&attach.handle) {
      return Err(AmqpError::ProtocolViolation(format!("handle {} already attached", attach.handle)));
    }
    let our_role = match attach.role {
      Role::Sender => Role::Receiver,
      Role::Receiver => Role::Sender,
    };
    let existing = conn.sessions[session.index()].links.iter().copied().find(|l| {
      let link = &conn.links[l.index()];
      link.name == attach.name && link.role == our_role && link.state.contains(EndpointState::REMOTE_UNINIT)
    });
    let id = match existing {
      Some(id) => id,
      None => {
        let id = LinkId(conn.links.insert(Link::new(session, attach.name.clone(), our_role)));
        conn.sessions[session.index()].links.push(id);
        id
      }
    };
    conn.links[id.index()].remote_attach(&attach);
    conn.sessions[session.index()].remote_handles.insert(attach.handle, id);
    tracing::debug!(
      engine_handle = self.handle,
      link = %id,
      name = %attach.name,
      remote_handle = attach.handle,
      "Peer attached link"
    );
    self.events.push(Event::LinkRemoteOpen(id));
    Ok(())
  }

  fn on_flow(&mut self, channel: u16, flow: Flow) -> Result<(), AmqpError> {
    let session = self.session_for(channel)?;
    {
      let s = &mut self.connection.sessions[session.index()];
      // Window as seen from the peer: ids it will still accept from us.
      let next_incoming = flow.next_incoming_id.unwrap_or(0);
      s.remote_incoming_window = next_incoming
        .wrapping_add(flow.incoming_window)
        .wrapping_sub(s.next_outgoing_id);
      s.remote_outgoing_window = flow.outgoing_window;
    }

    if let Some(handle) = flow.handle {
      let id = self.link_for(session, handle)?;
      let link = &mut self.connection.links[id.index()];
      if link.is_sender() {
        let peer_count = flow.delivery_count.unwrap_or(link.delivery_count);
        link.credit = peer_count
          .wrapping_add(flow.link_credit.unwrap_or(0))
          .wrapping_sub(link.delivery_count);
        link.drain = flow.drain;
        tracing::trace!(engine_handle = self.handle, link = %id, credit = link.credit, drain = link.drain, "Sender credit updated");
        self.connection.pump_link(id);
        let link = &mut self.connection.links[id.index()];
        if link.drain && link.credit > 0 && link.queued.is_empty() {
          // Drain: consume the remaining credit and report back.
          link.delivery_count = link.delivery_count.wrapping_add(link.credit);
          link.credit = 0;
          self.connection.push_flow(id, false);
        }
      } else {
        if let Some(count) = flow.delivery_count {
          let limit = link.delivery_count.wrapping_add(link.credit);
          let remaining = limit.wrapping_sub(count);
          link.credit = if remaining <= link.credit { remaining } else { 0 };
          link.delivery_count = count;
        }
        link.available = flow.available.unwrap_or(0);
        link.drain = flow.drain;
      }
      self.events.push(Event::LinkFlow(id));
      if flow.echo {
        self.connection.push_flow(id, false);
      }
    }
    self.connection.pump_session(session);
    Ok(())
  }

  fn on_transfer(&mut self, channel: u16, transfer: Transfer, payload: Bytes) -> Result<(), AmqpError> {
    let session = self.session_for(channel)?;
    let id = self.link_for(session, transfer.handle)?;
    let conn = &mut self.connection;
    {
      let s = &mut conn.sessions[session.index()];
      s.next_incoming_id = s.next_incoming_id.wrapping_add(1);
    }
    if conn.links[id.index()].is_sender() {
      return Err(AmqpError::ProtocolViolation(format!(
        "transfer received on sender link {}",
        id
      )));
    }

    let mut partial = match conn.links[id.index()].partial.take() {
      Some(partial) => partial,
      None => {
        let wire_id = transfer
          .delivery_id
          .ok_or_else(|| AmqpError::ProtocolViolation("first transfer of a delivery has no delivery-id".into()))?;
        let settled = transfer.settled.unwrap_or(false);
        let delivery = conn.allocate_delivery();
        conn.deliveries.insert(
          delivery,
          Delivery::incoming(id, transfer.delivery_tag.clone().unwrap_or_default(), wire_id, settled),
        );
        if !settled {
          conn.sessions[session.index()].incoming.insert(wire_id, delivery);
        }
        let link = &mut conn.links[id.index()];
        link.delivery_count = link.delivery_count.wrapping_add(1);
        link.credit = link.credit.saturating_sub(1);
        Partial {
          delivery,
          payload: BytesMut::new(),
        }
      }
    };

    if transfer.aborted {
      tracing::debug!(engine_handle = self.handle, link = %id, delivery = %partial.delivery, "Delivery aborted by peer");
      if let Some(d) = conn.deliveries.remove(&partial.delivery) {
        if let Some(wire_id) = d.wire_id {
          conn.sessions[session.index()].incoming.remove(&wire_id);
        }
      }
      conn.mark_reapable();
      return Ok(());
    }

    partial.payload.extend_from_slice(&payload);
    if transfer.settled == Some(true) {
      if let Some(d) = conn.deliveries.get_mut(&partial.delivery) {
        d.remote_settled = true;
      }
    }
    if transfer.more {
      conn.links[id.index()].partial = Some(partial);
      return Ok(());
    }

    let bytes = partial.payload.len();
    let message = Message::decode(partial.payload.freeze())?;
    tracing::trace!(engine_handle = self.handle, link = %id, delivery = %partial.delivery, bytes, "Message received");
    self.events.push(Event::Message {
      link: id,
      delivery: partial.delivery,
      message,
    });
    Ok(())
  }

  fn on_disposition(&mut self, channel: u16, disposition: Disposition) -> Result<(), AmqpError> {
    let session = self.session_for(channel)?;
    let conn = &mut self.connection;
    let first = disposition.first;
    let last = disposition.last.unwrap_or(first);
    let s = &conn.sessions[session.index()];
    // The peer's role says which of our delivery maps it refers to.
    let map = match disposition.role {
      Role::Receiver => &s.outgoing,
      Role::Sender => &s.incoming,
    };
    let mut affected: Vec<_> = map
      .iter()
      .filter(|(wire, _)| **wire >= first && **wire <= last)
      .map(|(wire, d)| (*wire, *d))
      .collect();
    affected.sort_unstable_by_key(|(wire, _)| *wire);

    for (_, delivery) in affected {
      let Some(d) = conn.deliveries.get_mut(&delivery) else {
        continue;
      };
      if disposition.state.is_some() {
        d.remote_state = disposition.state.clone();
      }
      d.remote_settled |= disposition.settled;
      let link = d.link;
      self.events.push(Event::DeliveryUpdated {
        link,
        delivery,
        state: disposition.state.clone(),
        settled: disposition.settled,
      });
    }
    Ok(())
  }

  fn on_detach(&mut self, channel: u16, detach: Detach) -> Result<(), AmqpError> {
    let session = self.session_for(channel)?;
    let id = self.link_for(session, detach.handle)?;
    let conn = &mut self.connection;
    conn.sessions[session.index()].remote_handles.remove(&detach.handle);
    let link = &mut conn.links[id.index()];
    link.remote_condition = detach.error;
    link.partial = None;
    link.credit = if link.is_sender() { 0 } else { link.credit };
    link.state.set_remote(EndpointState::REMOTE_CLOSED);
    conn.mark_reapable();
    tracing::debug!(engine_handle = self.handle, link = %id, closed = detach.closed, "Peer detached link");
    self.events.push(Event::LinkRemoteClose(id));
    Ok(())
  }

  fn on_end(&mut self, channel: u16, end: End) -> Result<(), AmqpError> {
    let session = self.session_for(channel)?;
    let conn = &mut self.connection;
    conn.remote_channels.remove(&channel);
    let s = &mut conn.sessions[session.index()];
    s.remote_condition = end.error;
    s.state.set_remote(EndpointState::REMOTE_CLOSED);
    conn.mark_reapable();
    tracing::debug!(engine_handle = self.handle, session = %session, "Peer ended session");
    self.events.push(Event::SessionRemoteClose(session));
    Ok(())
  }

  fn on_close(&mut self, close: Close) -> Result<(), AmqpError> {
    tracing::info!(engine_handle = self.handle, error = ?close.error, "Peer closed connection");
    self.connection.remote_condition = close.error;
    self.connection.state.set_remote(EndpointState::REMOTE_CLOSED);
    self.tail_closed = true;
    self.events.push(Event::ConnectionRemoteClose);
    self.events.push(Event::TransportTailClosed);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::amqp::performative::{DeliveryState, Terminus};
  use bytes::BufMut;

  fn driver() -> ProtocolDriver {
    ProtocolDriver::new(ConnectionOptions::new().container_id("local"), 0)
  }

  fn open(container: &str) -> Performative {
    Performative::Open(Open {
      container_id: container.into(),
      hostname: None,
      max_frame_size: 512,
      channel_max: 10,
      idle_time_out: None,
      offered_capabilities: vec![],
      desired_capabilities: vec![],
      properties: vec![],
    })
  }

  fn wire(frames: Vec<Frame>) -> BytesMut {
    let mut codec = FrameCodec::new(1 << 20);
    let mut buf = BytesMut::new();
    ProtocolHeader::amqp().encode(&mut buf);
    for f in frames {
      codec.encode(f, &mut buf).unwrap();
    }
    buf
  }

  fn drain_events(d: &mut ProtocolDriver) -> Vec<Event> {
    std::iter::from_fn(|| d.next_event()).collect()
  }

  fn decode_all(bytes: &mut BytesMut) -> Vec<Frame> {
    let header = ProtocolHeader::decode(bytes).unwrap();
    assert!(header.is_some());
    let mut codec = FrameCodec::new(1 << 20);
    std::iter::from_fn(|| codec.decode(bytes).unwrap()).collect()
  }

  #[test]
  fn header_then_open_produces_event_and_no_output() {
    let mut d = driver();
    let mut input = wire(vec![Frame::new(0, open("peer"))]);
    d.commit(&mut input);
    assert!(input.is_empty());
    assert_eq!(drain_events(&mut d), vec![Event::ConnectionRemoteOpen]);
    assert_eq!(d.connection().remote_container_id(), Some("peer"));

    // Nothing is written until a frame is queued.
    let mut out = BytesMut::new();
    d.encode_output(&mut out);
    assert!(out.is_empty());

    d.connection_mut().open().unwrap();
    d.encode_output(&mut out);
    assert_eq!(&out[..8], b"AMQP\x00\x01\x00\x00");
  }

  #[test]
  fn frame_before_open_is_fatal() {
    let mut d = driver();
    let mut input = wire(vec![Frame::new(0, Performative::Close(Close::default()))]);
    d.commit(&mut input);
    assert!(d.has_failed());
    let events = drain_events(&mut d);
    assert!(matches!(&events[0], Event::TransportError(e) if e.condition == condition::FRAMING_ERROR));

    let mut out = BytesMut::new();
    d.encode_output(&mut out);
    let frames = decode_all(&mut out);
    let names: Vec<_> = frames.iter().map(Frame::name).collect();
    assert_eq!(names, vec!["open", "close"]);
  }

  #[test]
  fn bad_protocol_header_fails() {
    let mut d = driver();
    let mut input = BytesMut::from(&b"HTTP/1.1 200"[..]);
    d.commit(&mut input);
    assert!(d.has_failed());
    assert!(d.tail_closed());
  }

  #[test]
  fn eof_without_close_is_aborted() {
    let mut d = driver();
    d.close_tail();
    let events = drain_events(&mut d);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], Event::TransportError(e) if e.description.as_deref() == Some("connection aborted")));
    assert_eq!(events[1], Event::TransportTailClosed);
    assert!(d.has_failed());
  }

  #[test]
  fn close_exchange_completes() {
    let mut d = driver();
    let mut input = wire(vec![
      Frame::new(0, open("peer")),
      Frame::new(0, Performative::Close(Close::default())),
    ]);
    d.commit(&mut input);
    assert_eq!(
      drain_events(&mut d),
      vec![
        Event::ConnectionRemoteOpen,
        Event::ConnectionRemoteClose,
        Event::TransportTailClosed
      ]
    );
    assert!(!d.is_done());
    d.connection_mut().close(None).unwrap();
    let mut out = BytesMut::new();
    d.encode_output(&mut out);
    assert!(d.is_done());
    assert!(d.error().is_none());
  }

  #[test]
  fn multi_frame_transfer_is_reassembled() {
    let mut d = driver();
    let mut msg_bytes = BytesMut::new();
    Message::from_bytes(Bytes::from(vec![7u8; 100])).encode(&mut msg_bytes);
    let msg_bytes = msg_bytes.freeze();
    let (a, b) = (msg_bytes.slice(..40), msg_bytes.slice(40..));

    let attach = Performative::Attach(Attach {
      name: "in".into(),
      handle: 0,
      role: Role::Sender,
      snd_settle_mode: 2,
      rcv_settle_mode: 0,
      source: Some(Terminus::address("q")),
      target: None,
      initial_delivery_count: Some(0),
      max_message_size: None,
    });
    let begin = Performative::Begin(Begin {
      remote_channel: None,
      next_outgoing_id: 0,
      incoming_window: 100,
      outgoing_window: 100,
      handle_max: 10,
    });
    let input = wire(vec![
      Frame::new(0, open("peer")),
      Frame::new(3, begin),
      Frame::new(3, attach),
      Frame::with_payload(
        3,
        Performative::Transfer(Transfer {
          handle: 0,
          delivery_id: Some(0),
          delivery_tag: Some(Bytes::from_static(b"t")),
          more: true,
          ..Default::default()
        }),
        a,
      ),
      Frame::with_payload(
        3,
        Performative::Transfer(Transfer {
          handle: 0,
          ..Default::default()
        }),
        b,
      ),
    ]);
    // Feed in two uneven chunks through one buffer, the way the engine does.
    let mut inbound = BytesMut::new();
    inbound.extend_from_slice(&input[..37]);
    d.commit(&mut inbound);
    inbound.extend_from_slice(&input[37..]);
    d.commit(&mut inbound);
    assert!(inbound.is_empty());

    let events = drain_events(&mut d);
    let names: Vec<_> = events.iter().map(Event::name).collect();
    assert_eq!(
      names,
      vec!["connection-remote-open", "session-remote-open", "link-remote-open", "message"]
    );
    match &events[3] {
      Event::Message { message, delivery, .. } => {
        assert_eq!(message.data(), Some(&[7u8; 100][..]));
        assert!(d.connection().delivery_pending(*delivery));
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn outgoing_transfer_respects_peer_frame_size() {
    let mut d = driver();
    let begin_answer = |remote| {
      Performative::Begin(Begin {
        remote_channel: Some(remote),
        next_outgoing_id: 0,
        incoming_window: 100,
        outgoing_window: 100,
        handle_max: 10,
      })
    };
    let session = d.connection_mut().open_session().unwrap();
    let link = d.connection_mut().open_sender(session, "q").unwrap();
    let delivery = d.connection_mut().send(link, &Message::from_bytes(Bytes::from(vec![1u8; 2000]))).unwrap();
    let mut out = BytesMut::new();
    d.encode_output(&mut out);

    let mut input = wire(vec![
      Frame::new(0, open("peer")),
      Frame::new(0, begin_answer(0)),
      Frame::new(
        0,
        Performative::Attach(Attach {
          name: "0".into(),
          handle: 0,
          role: Role::Receiver,
          snd_settle_mode: 2,
          rcv_settle_mode: 0,
          source: None,
          target: Some(Terminus::address("q")),
          initial_delivery_count: None,
          max_message_size: None,
        }),
      ),
      Frame::new(
        0,
        Performative::Flow(Flow {
          next_incoming_id: Some(0),
          incoming_window: 100,
          next_outgoing_id: 0,
          outgoing_window: 100,
          handle: Some(0),
          delivery_count: Some(0),
          link_credit: Some(5),
          ..Default::default()
        }),
      ),
    ]);
    d.commit(&mut input);
    assert!(drain_events(&mut d).contains(&Event::LinkFlow(link)));

    let mut out = BytesMut::new();
    d.encode_output(&mut out);
    let mut codec = FrameCodec::new(1 << 20);
    let mut transfers = 0;
    let mut reassembled = BytesMut::new();
    while let Some(frame) = codec.decode(&mut out).unwrap() {
      let FrameBody::Amqp { performative, payload } = frame.body else { continue };
      if let Performative::Transfer(t) = performative {
        transfers += 1;
        reassembled.put_slice(&payload);
        if !t.more {
          break;
        }
      }
    }
    assert!(transfers >= 4, "2000 bytes over 512-byte frames, got {}", transfers);
    assert_eq!(Message::decode(reassembled.freeze()).unwrap().data(), Some(&[1u8; 2000][..]));
    assert_eq!(d.connection().link_credit(link).unwrap(), 4);

    // Peer accepts and settles.
    let mut input = {
      let mut codec = FrameCodec::new(1 << 20);
      let mut buf = BytesMut::new();
      codec
        .encode(
          Frame::new(
            0,
            Performative::Disposition(Disposition {
              role: Role::Receiver,
              first: 0,
              last: None,
              settled: true,
              state: Some(DeliveryState::Accepted),
              batchable: false,
            }),
          ),
          &mut buf,
        )
        .unwrap();
      buf
    };
    d.commit(&mut input);
    assert_eq!(
      drain_events(&mut d),
      vec![Event::DeliveryUpdated {
        link,
        delivery,
        state: Some(DeliveryState::Accepted),
        settled: true
      }]
    );
    assert!(d.connection().delivery_remotely_settled(delivery));
  }

  #[test]
  fn local_idle_timeout_fails_connection() {
    let mut d = ProtocolDriver::new(
      ConnectionOptions::new().idle_timeout(Some(std::time::Duration::from_millis(100))),
      0,
    );
    let start = Instant::now();
    let next = d.tick(start).unwrap();
    assert!(next > start);
    assert_eq!(d.tick(start + std::time::Duration::from_millis(200)), None);
    assert!(d.has_failed());
    assert_eq!(
      d.error().map(|e| e.condition.as_str()),
      Some(condition::RESOURCE_LIMIT_EXCEEDED)
    );
  }
}
