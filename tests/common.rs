// tests/common.rs
#![allow(dead_code)]

use ramqp::protocol::amqp::performative::{Attach, Begin, Detach, Flow, Open, Transfer};
use ramqp::protocol::amqp::{Frame, FrameBody, FrameCodec, Performative, ProtocolHeader, Role, Terminus};
use ramqp::{Connection, DeliveryId, DeliveryState, ErrorCondition, Event, Handler, IoAdapter, LinkId, Message, ReadOutcome, SessionId};

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::collections::VecDeque;
use std::io;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ramqp=debug,warn"));
    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

// --- Scripted I/O adapter ---

#[derive(Debug)]
pub enum ReadStep {
  Data(Vec<u8>),
  WouldBlock,
  Eof,
  Fail(io::ErrorKind),
}

/// An adapter that replays scripted reads and records every call made on it.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
  pub reads: VecDeque<ReadStep>,
  /// Maximum bytes accepted per write call; `None` accepts everything.
  pub write_limit: Option<usize>,
  pub fail_write: Option<io::ErrorKind>,
  pub written: Vec<u8>,
  pub calls: Vec<&'static str>,
}

impl ScriptedAdapter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delivers `bytes` as one read per chunk of `chunk` bytes.
  pub fn feed(&mut self, bytes: &[u8], chunk: usize) {
    for piece in bytes.chunks(chunk.max(1)) {
      self.reads.push_back(ReadStep::Data(piece.to_vec()));
    }
  }

  pub fn count(&self, call: &str) -> usize {
    self.calls.iter().filter(|c| **c == call).count()
  }
}

impl IoAdapter for ScriptedAdapter {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    self.calls.push("read");
    match self.reads.pop_front() {
      Some(ReadStep::Data(mut data)) => {
        if data.len() > buf.len() {
          let rest = data.split_off(buf.len());
          self.reads.push_front(ReadStep::Data(rest));
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(ReadOutcome::Data(data.len()))
      }
      Some(ReadStep::Eof) => Ok(ReadOutcome::Eof(0)),
      Some(ReadStep::Fail(kind)) => Err(io::Error::new(kind, "scripted read failure")),
      Some(ReadStep::WouldBlock) | None => Ok(ReadOutcome::WouldBlock),
    }
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.calls.push("write");
    if let Some(kind) = self.fail_write {
      return Err(io::Error::new(kind, "scripted write failure"));
    }
    let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
    self.written.extend_from_slice(&buf[..n]);
    Ok(n)
  }

  fn close(&mut self) -> io::Result<()> {
    self.calls.push("close");
    Ok(())
  }
}

// --- Recording handler ---

/// Records the name of every callback, plus received messages and delivery updates.
#[derive(Debug, Default)]
pub struct RecordingHandler {
  pub events: Vec<String>,
  pub messages: Vec<Message>,
  pub updates: Vec<(DeliveryId, Option<DeliveryState>, bool)>,
  pub sendable: Vec<LinkId>,
  pub errors: Vec<ErrorCondition>,
}

impl Handler for RecordingHandler {
  fn on_connection_open(&mut self, _conn: &mut Connection) {
    self.events.push("connection-open".into());
  }
  fn on_connection_close(&mut self, _conn: &mut Connection) {
    self.events.push("connection-close".into());
  }
  fn on_session_open(&mut self, _conn: &mut Connection, _session: SessionId) {
    self.events.push("session-open".into());
  }
  fn on_session_close(&mut self, _conn: &mut Connection, _session: SessionId) {
    self.events.push("session-close".into());
  }
  fn on_link_open(&mut self, _conn: &mut Connection, _link: LinkId) {
    self.events.push("link-open".into());
  }
  fn on_link_close(&mut self, _conn: &mut Connection, _link: LinkId) {
    self.events.push("link-close".into());
  }
  fn on_sendable(&mut self, _conn: &mut Connection, link: LinkId) {
    self.events.push("sendable".into());
    self.sendable.push(link);
  }
  fn on_message(&mut self, _conn: &mut Connection, _link: LinkId, _delivery: DeliveryId, message: &Message) {
    self.events.push("message".into());
    self.messages.push(message.clone());
  }
  fn on_delivery_update(
    &mut self,
    _conn: &mut Connection,
    _link: LinkId,
    delivery: DeliveryId,
    state: Option<&DeliveryState>,
    settled: bool,
  ) {
    self.events.push("delivery-update".into());
    self.updates.push((delivery, state.cloned(), settled));
  }
  fn on_transport_error(&mut self, _conn: &mut Connection, error: &ErrorCondition) {
    self.events.push("transport-error".into());
    self.errors.push(error.clone());
  }
  fn on_transport_close(&mut self, _conn: &mut Connection) {
    self.events.push("transport-close".into());
  }
  fn on_unhandled(&mut self, _conn: &mut Connection, event: &Event) {
    self.events.push(event.name().into());
  }
}

// --- Wire builders ---

pub fn open(container: &str) -> Performative {
  Performative::Open(Open {
    container_id: container.into(),
    hostname: None,
    max_frame_size: 65536,
    channel_max: 100,
    idle_time_out: None,
    offered_capabilities: vec![],
    desired_capabilities: vec![],
    properties: vec![],
  })
}

pub fn begin() -> Performative {
  Performative::Begin(Begin {
    remote_channel: None,
    next_outgoing_id: 0,
    incoming_window: 1000,
    outgoing_window: 1000,
    handle_max: 64,
  })
}

/// A peer attaching a sender link (we become the receiver).
pub fn attach_sender(name: &str, handle: u32, address: &str) -> Performative {
  Performative::Attach(Attach {
    name: name.into(),
    handle,
    role: Role::Sender,
    snd_settle_mode: 2,
    rcv_settle_mode: 0,
    source: Some(Terminus::address(address)),
    target: Some(Terminus::address(address)),
    initial_delivery_count: Some(0),
    max_message_size: None,
  })
}

pub fn transfer(handle: u32, delivery_id: u32, body: &'static [u8]) -> Frame {
  let mut payload = BytesMut::new();
  Message::from_static(body).encode(&mut payload);
  Frame::with_payload(
    0,
    Performative::Transfer(Transfer {
      handle,
      delivery_id: Some(delivery_id),
      delivery_tag: Some(Bytes::copy_from_slice(&delivery_id.to_be_bytes())),
      ..Default::default()
    }),
    payload.freeze(),
  )
}

/// A peer closing the link on `handle`.
pub fn detach(handle: u32) -> Performative {
  Performative::Detach(Detach {
    handle,
    closed: true,
    error: None,
  })
}

pub fn credit(handle: u32, link_credit: u32) -> Performative {
  Performative::Flow(Flow {
    next_incoming_id: Some(0),
    incoming_window: 1000,
    next_outgoing_id: 0,
    outgoing_window: 1000,
    handle: Some(handle),
    delivery_count: Some(0),
    link_credit: Some(link_credit),
    ..Default::default()
  })
}

/// Protocol header followed by `performatives`, all on channel 0.
pub fn wire(performatives: Vec<Performative>) -> Vec<u8> {
  wire_frames(performatives.into_iter().map(|p| Frame::new(0, p)).collect())
}

pub fn wire_frames(frames: Vec<Frame>) -> Vec<u8> {
  let mut buf = BytesMut::new();
  ProtocolHeader::amqp().encode(&mut buf);
  let mut codec = FrameCodec::new(1 << 20);
  for frame in frames {
    codec.encode(frame, &mut buf).expect("encode test frame");
  }
  buf.to_vec()
}

/// Protocol header followed by one AMQP frame on channel 0 carrying `body` verbatim.
pub fn raw_frame(body: &[u8]) -> Vec<u8> {
  let mut buf = BytesMut::new();
  ProtocolHeader::amqp().encode(&mut buf);
  buf.put_u32(8 + body.len() as u32);
  buf.put_u8(2);
  buf.put_u8(0);
  buf.put_u16(0);
  buf.extend_from_slice(body);
  buf.to_vec()
}

/// Decodes bytes written by an engine: protocol header, then frames.
pub fn decode_output(bytes: &[u8]) -> Vec<Frame> {
  let mut buf = BytesMut::from(bytes);
  if buf.is_empty() {
    return Vec::new();
  }
  ProtocolHeader::decode(&mut buf)
    .expect("valid header")
    .expect("complete header");
  let mut codec = FrameCodec::new(1 << 20);
  let mut frames = Vec::new();
  while let Some(frame) = codec.decode(&mut buf).expect("valid frame") {
    frames.push(frame);
  }
  frames
}

pub fn frame_names(bytes: &[u8]) -> Vec<&'static str> {
  decode_output(bytes).iter().map(Frame::name).collect()
}

pub fn performatives(bytes: &[u8]) -> Vec<Performative> {
  decode_output(bytes)
    .into_iter()
    .filter_map(|f| match f.body {
      FrameBody::Amqp { performative, .. } => Some(performative),
      FrameBody::Heartbeat => None,
    })
    .collect()
}
