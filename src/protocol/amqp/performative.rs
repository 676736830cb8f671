// src/protocol/amqp/performative.rs

//! AMQP 1.0 performatives and the composite types they carry.

use super::types::Value;
use crate::error::AmqpError;
use bytes::Bytes;
use std::fmt;

// --- Descriptor codes ---
pub const OPEN: u64 = 0x10;
pub const BEGIN: u64 = 0x11;
pub const ATTACH: u64 = 0x12;
pub const FLOW: u64 = 0x13;
pub const TRANSFER: u64 = 0x14;
pub const DISPOSITION: u64 = 0x15;
pub const DETACH: u64 = 0x16;
pub const END: u64 = 0x17;
pub const CLOSE: u64 = 0x18;
pub const ERROR: u64 = 0x1d;
pub const RECEIVED: u64 = 0x23;
pub const ACCEPTED: u64 = 0x24;
pub const REJECTED: u64 = 0x25;
pub const RELEASED: u64 = 0x26;
pub const MODIFIED: u64 = 0x27;
pub const SOURCE: u64 = 0x28;
pub const TARGET: u64 = 0x29;

/// Protocol defaults for optional numeric fields.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = u32::MAX;
pub const DEFAULT_CHANNEL_MAX: u16 = u16::MAX;
pub const DEFAULT_HANDLE_MAX: u32 = u32::MAX;

/// Sender settle modes.
pub const SND_SETTLE_UNSETTLED: u8 = 0;
pub const SND_SETTLE_SETTLED: u8 = 1;
pub const SND_SETTLE_MIXED: u8 = 2;
/// Receiver settle modes.
pub const RCV_SETTLE_FIRST: u8 = 0;
pub const RCV_SETTLE_SECOND: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Sender,
  Receiver,
}

impl Role {
  fn to_value(self) -> Value {
    Value::Bool(self == Role::Receiver)
  }

  fn from_value(v: &Value, field: &'static str) -> Result<Self, AmqpError> {
    match v.as_bool() {
      Some(true) => Ok(Role::Receiver),
      Some(false) => Ok(Role::Sender),
      None => Err(missing(field)),
    }
  }
}

/// An AMQP `error` composite: a condition symbol with optional description and info map.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorCondition {
  pub condition: String,
  pub description: Option<String>,
  pub info: Vec<(Value, Value)>,
}

impl ErrorCondition {
  pub fn new(condition: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      condition: condition.into(),
      description: Some(description.into()),
      info: Vec::new(),
    }
  }

  fn to_value(&self) -> Value {
    described_list(
      ERROR,
      vec![
        Value::symbol(self.condition.clone()),
        Value::from(self.description.clone()),
        if self.info.is_empty() {
          Value::Null
        } else {
          Value::Map(self.info.clone())
        },
      ],
    )
  }

  fn from_value(v: Value) -> Result<Self, AmqpError> {
    let mut f = Fields::of(v, ERROR, "error")?;
    Ok(Self {
      condition: f.required_str("error.condition")?,
      description: f.opt_string(),
      info: f.map(),
    })
  }
}

impl fmt::Display for ErrorCondition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.description {
      Some(desc) => write!(f, "{}: {}", self.condition, desc),
      None => write!(f, "{}", self.condition),
    }
  }
}

/// Outcome or state of a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryState {
  Received { section_number: u32, section_offset: u64 },
  Accepted,
  Rejected(Option<ErrorCondition>),
  Released,
  Modified { delivery_failed: bool, undeliverable_here: bool },
}

impl DeliveryState {
  /// Terminal outcomes settle the delivery from the receiver's point of view.
  pub fn is_terminal(&self) -> bool {
    !matches!(self, DeliveryState::Received { .. })
  }

  fn to_value(&self) -> Value {
    match self {
      DeliveryState::Received {
        section_number,
        section_offset,
      } => described_list(
        RECEIVED,
        vec![Value::Uint(*section_number), Value::Ulong(*section_offset)],
      ),
      DeliveryState::Accepted => described_list(ACCEPTED, vec![]),
      DeliveryState::Rejected(err) => {
        described_list(REJECTED, vec![err.as_ref().map_or(Value::Null, |e| e.to_value())])
      }
      DeliveryState::Released => described_list(RELEASED, vec![]),
      DeliveryState::Modified {
        delivery_failed,
        undeliverable_here,
      } => described_list(
        MODIFIED,
        vec![Value::Bool(*delivery_failed), Value::Bool(*undeliverable_here)],
      ),
    }
  }

  fn from_value(v: Value) -> Result<Self, AmqpError> {
    let code = v
      .descriptor_code()
      .ok_or_else(|| AmqpError::decode("delivery-state is not a described value"))?;
    let state = match code {
      RECEIVED => {
        let mut f = Fields::of(v, RECEIVED, "received")?;
        DeliveryState::Received {
          section_number: f.required_u32("received.section-number")?,
          section_offset: f.next().as_u64().unwrap_or(0),
        }
      }
      ACCEPTED => DeliveryState::Accepted,
      REJECTED => {
        let mut f = Fields::of(v, REJECTED, "rejected")?;
        DeliveryState::Rejected(f.error()?)
      }
      RELEASED => DeliveryState::Released,
      MODIFIED => {
        let mut f = Fields::of(v, MODIFIED, "modified")?;
        DeliveryState::Modified {
          delivery_failed: f.bool_or(false),
          undeliverable_here: f.bool_or(false),
        }
      }
      other => {
        return Err(AmqpError::decode(format!("unknown delivery-state descriptor {:#x}", other)));
      }
    };
    Ok(state)
  }
}

/// A link source or target. Only the address and dynamic flag are modeled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Terminus {
  pub address: Option<String>,
  pub dynamic: bool,
}

impl Terminus {
  pub fn address(address: impl Into<String>) -> Self {
    Self {
      address: Some(address.into()),
      dynamic: false,
    }
  }

  fn to_value(&self, code: u64) -> Value {
    let mut fields = vec![Value::from(self.address.clone())];
    if self.dynamic {
      // durable, expiry-policy, timeout precede the dynamic flag.
      fields.extend([Value::Null, Value::Null, Value::Null, Value::Bool(true)]);
    }
    described_list(code, fields)
  }

  fn from_value(v: Value, code: u64, name: &'static str) -> Result<Self, AmqpError> {
    let mut f = Fields::of(v, code, name)?;
    let address = f.opt_string();
    let _durable = f.next();
    let _expiry_policy = f.next();
    let _timeout = f.next();
    let dynamic = f.bool_or(false);
    Ok(Self { address, dynamic })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Open {
  pub container_id: String,
  pub hostname: Option<String>,
  pub max_frame_size: u32,
  pub channel_max: u16,
  /// Idle timeout in milliseconds.
  pub idle_time_out: Option<u32>,
  pub offered_capabilities: Vec<String>,
  pub desired_capabilities: Vec<String>,
  pub properties: Vec<(Value, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Begin {
  pub remote_channel: Option<u16>,
  pub next_outgoing_id: u32,
  pub incoming_window: u32,
  pub outgoing_window: u32,
  pub handle_max: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attach {
  pub name: String,
  pub handle: u32,
  pub role: Role,
  pub snd_settle_mode: u8,
  pub rcv_settle_mode: u8,
  pub source: Option<Terminus>,
  pub target: Option<Terminus>,
  pub initial_delivery_count: Option<u32>,
  pub max_message_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Flow {
  pub next_incoming_id: Option<u32>,
  pub incoming_window: u32,
  pub next_outgoing_id: u32,
  pub outgoing_window: u32,
  pub handle: Option<u32>,
  pub delivery_count: Option<u32>,
  pub link_credit: Option<u32>,
  pub available: Option<u32>,
  pub drain: bool,
  pub echo: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transfer {
  pub handle: u32,
  pub delivery_id: Option<u32>,
  pub delivery_tag: Option<Bytes>,
  pub message_format: Option<u32>,
  pub settled: Option<bool>,
  pub more: bool,
  pub rcv_settle_mode: Option<u8>,
  pub state: Option<DeliveryState>,
  pub resume: bool,
  pub aborted: bool,
  pub batchable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disposition {
  pub role: Role,
  pub first: u32,
  pub last: Option<u32>,
  pub settled: bool,
  pub state: Option<DeliveryState>,
  pub batchable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detach {
  pub handle: u32,
  pub closed: bool,
  pub error: Option<ErrorCondition>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct End {
  pub error: Option<ErrorCondition>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Close {
  pub error: Option<ErrorCondition>,
}

/// Every frame body the engine understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Performative {
  Open(Open),
  Begin(Begin),
  Attach(Attach),
  Flow(Flow),
  Transfer(Transfer),
  Disposition(Disposition),
  Detach(Detach),
  End(End),
  Close(Close),
}

impl Performative {
  pub fn name(&self) -> &'static str {
    match self {
      Performative::Open(_) => "open",
      Performative::Begin(_) => "begin",
      Performative::Attach(_) => "attach",
      Performative::Flow(_) => "flow",
      Performative::Transfer(_) => "transfer",
      Performative::Disposition(_) => "disposition",
      Performative::Detach(_) => "detach",
      Performative::End(_) => "end",
      Performative::Close(_) => "close",
    }
  }

  pub fn to_value(&self) -> Value {
    match self {
      Performative::Open(o) => described_list(
        OPEN,
        vec![
          Value::String(o.container_id.clone()),
          Value::from(o.hostname.clone()),
          if o.max_frame_size == DEFAULT_MAX_FRAME_SIZE {
            Value::Null
          } else {
            Value::Uint(o.max_frame_size)
          },
          if o.channel_max == DEFAULT_CHANNEL_MAX {
            Value::Null
          } else {
            Value::Ushort(o.channel_max)
          },
          Value::from(o.idle_time_out),
          Value::Null,
          Value::Null,
          symbols(&o.offered_capabilities),
          symbols(&o.desired_capabilities),
          if o.properties.is_empty() {
            Value::Null
          } else {
            Value::Map(o.properties.clone())
          },
        ],
      ),
      Performative::Begin(b) => described_list(
        BEGIN,
        vec![
          b.remote_channel.map_or(Value::Null, Value::Ushort),
          Value::Uint(b.next_outgoing_id),
          Value::Uint(b.incoming_window),
          Value::Uint(b.outgoing_window),
          if b.handle_max == DEFAULT_HANDLE_MAX {
            Value::Null
          } else {
            Value::Uint(b.handle_max)
          },
        ],
      ),
      Performative::Attach(a) => described_list(
        ATTACH,
        vec![
          Value::String(a.name.clone()),
          Value::Uint(a.handle),
          a.role.to_value(),
          if a.snd_settle_mode == SND_SETTLE_MIXED {
            Value::Null
          } else {
            Value::Ubyte(a.snd_settle_mode)
          },
          if a.rcv_settle_mode == RCV_SETTLE_FIRST {
            Value::Null
          } else {
            Value::Ubyte(a.rcv_settle_mode)
          },
          a.source.as_ref().map_or(Value::Null, |s| s.to_value(SOURCE)),
          a.target.as_ref().map_or(Value::Null, |t| t.to_value(TARGET)),
          Value::Null,
          Value::Null,
          Value::from(a.initial_delivery_count),
          Value::from(a.max_message_size),
        ],
      ),
      Performative::Flow(f) => described_list(
        FLOW,
        vec![
          Value::from(f.next_incoming_id),
          Value::Uint(f.incoming_window),
          Value::Uint(f.next_outgoing_id),
          Value::Uint(f.outgoing_window),
          Value::from(f.handle),
          Value::from(f.delivery_count),
          Value::from(f.link_credit),
          Value::from(f.available),
          if f.drain { Value::Bool(true) } else { Value::Null },
          if f.echo { Value::Bool(true) } else { Value::Null },
        ],
      ),
      Performative::Transfer(t) => described_list(
        TRANSFER,
        vec![
          Value::Uint(t.handle),
          Value::from(t.delivery_id),
          t.delivery_tag.clone().map_or(Value::Null, Value::Binary),
          Value::from(t.message_format),
          Value::from(t.settled),
          if t.more { Value::Bool(true) } else { Value::Null },
          t.rcv_settle_mode.map_or(Value::Null, Value::Ubyte),
          t.state.as_ref().map_or(Value::Null, DeliveryState::to_value),
          if t.resume { Value::Bool(true) } else { Value::Null },
          if t.aborted { Value::Bool(true) } else { Value::Null },
          if t.batchable { Value::Bool(true) } else { Value::Null },
        ],
      ),
      Performative::Disposition(d) => described_list(
        DISPOSITION,
        vec![
          d.role.to_value(),
          Value::Uint(d.first),
          Value::from(d.last),
          if d.settled { Value::Bool(true) } else { Value::Null },
          d.state.as_ref().map_or(Value::Null, DeliveryState::to_value),
          if d.batchable { Value::Bool(true) } else { Value::Null },
        ],
      ),
      Performative::Detach(d) => described_list(
        DETACH,
        vec![
          Value::Uint(d.handle),
          if d.closed { Value::Bool(true) } else { Value::Null },
          d.error.as_ref().map_or(Value::Null, ErrorCondition::to_value),
        ],
      ),
      Performative::End(e) => described_list(END, vec![e.error.as_ref().map_or(Value::Null, ErrorCondition::to_value)]),
      Performative::Close(c) => {
        described_list(CLOSE, vec![c.error.as_ref().map_or(Value::Null, ErrorCondition::to_value)])
      }
    }
  }

  pub fn from_value(v: Value) -> Result<Self, AmqpError> {
    let code = v
      .descriptor_code()
      .ok_or_else(|| AmqpError::ProtocolViolation("frame body is not a described performative".into()))?;
    let performative = match code {
      OPEN => {
        let mut f = Fields::of(v, OPEN, "open")?;
        Performative::Open(Open {
          container_id: f.required_str("open.container-id")?,
          hostname: f.opt_string(),
          max_frame_size: f.next().as_u32().unwrap_or(DEFAULT_MAX_FRAME_SIZE),
          channel_max: f
            .next()
            .as_u32()
            .map_or(DEFAULT_CHANNEL_MAX, |c| c.min(u16::MAX as u32) as u16),
          idle_time_out: f.next().as_u32(),
          offered_capabilities: {
            let _outgoing_locales = f.next();
            let _incoming_locales = f.next();
            f.symbols()
          },
          desired_capabilities: f.symbols(),
          properties: f.map(),
        })
      }
      BEGIN => {
        let mut f = Fields::of(v, BEGIN, "begin")?;
        Performative::Begin(Begin {
          remote_channel: f.opt_narrow("begin.remote-channel")?,
          next_outgoing_id: f.required_u32("begin.next-outgoing-id")?,
          incoming_window: f.required_u32("begin.incoming-window")?,
          outgoing_window: f.required_u32("begin.outgoing-window")?,
          handle_max: f.next().as_u32().unwrap_or(DEFAULT_HANDLE_MAX),
        })
      }
      ATTACH => {
        let mut f = Fields::of(v, ATTACH, "attach")?;
        let name = f.required_str("attach.name")?;
        let handle = f.required_u32("attach.handle")?;
        let role = Role::from_value(&f.next(), "attach.role")?;
        let snd_settle_mode = f.opt_narrow("attach.snd-settle-mode")?.unwrap_or(SND_SETTLE_MIXED);
        let rcv_settle_mode = f.opt_narrow("attach.rcv-settle-mode")?.unwrap_or(RCV_SETTLE_FIRST);
        let source = f.terminus(SOURCE, "source")?;
        let target = f.terminus(TARGET, "target")?;
        let _unsettled = f.next();
        let _incomplete_unsettled = f.next();
        Performative::Attach(Attach {
          name,
          handle,
          role,
          snd_settle_mode,
          rcv_settle_mode,
          source,
          target,
          initial_delivery_count: f.next().as_u32(),
          max_message_size: f.next().as_u64(),
        })
      }
      FLOW => {
        let mut f = Fields::of(v, FLOW, "flow")?;
        Performative::Flow(Flow {
          next_incoming_id: f.next().as_u32(),
          incoming_window: f.required_u32("flow.incoming-window")?,
          next_outgoing_id: f.required_u32("flow.next-outgoing-id")?,
          outgoing_window: f.required_u32("flow.outgoing-window")?,
          handle: f.next().as_u32(),
          delivery_count: f.next().as_u32(),
          link_credit: f.next().as_u32(),
          available: f.next().as_u32(),
          drain: f.bool_or(false),
          echo: f.bool_or(false),
        })
      }
      TRANSFER => {
        let mut f = Fields::of(v, TRANSFER, "transfer")?;
        Performative::Transfer(Transfer {
          handle: f.required_u32("transfer.handle")?,
          delivery_id: f.next().as_u32(),
          delivery_tag: f.next().as_binary().cloned(),
          message_format: f.next().as_u32(),
          settled: f.next().as_bool(),
          more: f.bool_or(false),
          rcv_settle_mode: f.opt_narrow("transfer.rcv-settle-mode")?,
          state: f.delivery_state()?,
          resume: f.bool_or(false),
          aborted: f.bool_or(false),
          batchable: f.bool_or(false),
        })
      }
      DISPOSITION => {
        let mut f = Fields::of(v, DISPOSITION, "disposition")?;
        Performative::Disposition(Disposition {
          role: Role::from_value(&f.next(), "disposition.role")?,
          first: f.required_u32("disposition.first")?,
          last: f.next().as_u32(),
          settled: f.bool_or(false),
          state: f.delivery_state()?,
          batchable: f.bool_or(false),
        })
      }
      DETACH => {
        let mut f = Fields::of(v, DETACH, "detach")?;
        Performative::Detach(Detach {
          handle: f.required_u32("detach.handle")?,
          closed: f.bool_or(false),
          error: f.error()?,
        })
      }
      END => {
        let mut f = Fields::of(v, END, "end")?;
        Performative::End(End { error: f.error()? })
      }
      CLOSE => {
        let mut f = Fields::of(v, CLOSE, "close")?;
        Performative::Close(Close { error: f.error()? })
      }
      other => {
        return Err(AmqpError::ProtocolViolation(format!(
          "unknown performative descriptor {:#x}",
          other
        )));
      }
    };
    Ok(performative)
  }
}

fn missing(field: &'static str) -> AmqpError {
  AmqpError::decode(format!("mandatory field {} is missing or has the wrong type", field))
}

fn symbols(list: &[String]) -> Value {
  match list.len() {
    0 => Value::Null,
    1 => Value::symbol(list[0].clone()),
    _ => Value::Array(list.iter().cloned().map(Value::Symbol).collect()),
  }
}

/// Builds `described(code, list(fields))`, dropping trailing nulls as permitted on the wire.
fn described_list(code: u64, mut fields: Vec<Value>) -> Value {
  while matches!(fields.last(), Some(Value::Null)) {
    fields.pop();
  }
  Value::described(code, Value::List(fields))
}

/// Sequential reader over the fields of a described list; absent trailing fields read as null.
struct Fields {
  items: std::vec::IntoIter<Value>,
}

impl Fields {
  fn of(v: Value, expected: u64, name: &'static str) -> Result<Self, AmqpError> {
    if v.descriptor_code() != Some(expected) {
      return Err(AmqpError::decode(format!("expected {} descriptor", name)));
    }
    match v {
      Value::Described(_, body) => match *body {
        Value::List(items) => Ok(Self {
          items: items.into_iter(),
        }),
        other => Err(AmqpError::decode(format!(
          "{} body must be a list, got {:?}",
          name, other
        ))),
      },
      _ => Err(AmqpError::decode(format!("{} is not described", name))),
    }
  }

  fn next(&mut self) -> Value {
    self.items.next().unwrap_or(Value::Null)
  }

  fn required_str(&mut self, field: &'static str) -> Result<String, AmqpError> {
    match self.next() {
      Value::String(s) | Value::Symbol(s) => Ok(s),
      _ => Err(missing(field)),
    }
  }

  fn required_u32(&mut self, field: &'static str) -> Result<u32, AmqpError> {
    self.next().as_u32().ok_or_else(|| missing(field))
  }

  /// An optional unsigned field narrowed to `T`. Out-of-range values are a protocol violation.
  fn opt_narrow<T: TryFrom<u32>>(&mut self, field: &'static str) -> Result<Option<T>, AmqpError> {
    self
      .next()
      .as_u32()
      .map(|raw| {
        T::try_from(raw).map_err(|_| AmqpError::ProtocolViolation(format!("{} value {} is out of range", field, raw)))
      })
      .transpose()
  }

  fn opt_string(&mut self) -> Option<String> {
    match self.next() {
      Value::String(s) | Value::Symbol(s) => Some(s),
      _ => None,
    }
  }

  fn bool_or(&mut self, default: bool) -> bool {
    self.next().as_bool().unwrap_or(default)
  }

  fn symbols(&mut self) -> Vec<String> {
    match self.next() {
      Value::Symbol(s) => vec![s],
      Value::Array(items) => items.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
      _ => Vec::new(),
    }
  }

  fn map(&mut self) -> Vec<(Value, Value)> {
    match self.next() {
      Value::Map(pairs) => pairs,
      _ => Vec::new(),
    }
  }

  fn error(&mut self) -> Result<Option<ErrorCondition>, AmqpError> {
    match self.next() {
      Value::Null => Ok(None),
      v => ErrorCondition::from_value(v).map(Some),
    }
  }

  fn terminus(&mut self, code: u64, name: &'static str) -> Result<Option<Terminus>, AmqpError> {
    match self.next() {
      Value::Null => Ok(None),
      v => Terminus::from_value(v, code, name).map(Some),
    }
  }

  fn delivery_state(&mut self) -> Result<Option<DeliveryState>, AmqpError> {
    match self.next() {
      Value::Null => Ok(None),
      v => DeliveryState::from_value(v).map(Some),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::BytesMut;

  fn reparse(p: &Performative) -> Performative {
    let mut buf = BytesMut::new();
    p.to_value().encode(&mut buf);
    let v = Value::decode(&mut buf.freeze()).unwrap();
    Performative::from_value(v).unwrap()
  }

  #[test]
  fn open_defaults_are_omitted_and_restored() {
    let open = Performative::Open(Open {
      container_id: "c1".into(),
      hostname: None,
      max_frame_size: DEFAULT_MAX_FRAME_SIZE,
      channel_max: DEFAULT_CHANNEL_MAX,
      idle_time_out: None,
      offered_capabilities: vec![],
      desired_capabilities: vec![],
      properties: vec![],
    });
    // described(smallulong 0x10, list8 with a single str8 field)
    let mut buf = BytesMut::new();
    open.to_value().encode(&mut buf);
    assert_eq!(&buf[..4], &[0x00, 0x53, 0x10, 0xc0]);
    assert_eq!(reparse(&open), open);
  }

  #[test]
  fn attach_with_terminus_and_capabilities() {
    let attach = Performative::Attach(Attach {
      name: "link-1".into(),
      handle: 3,
      role: Role::Receiver,
      snd_settle_mode: SND_SETTLE_MIXED,
      rcv_settle_mode: RCV_SETTLE_FIRST,
      source: Some(Terminus::address("queue-a")),
      target: Some(Terminus::default()),
      initial_delivery_count: None,
      max_message_size: Some(1 << 20),
    });
    assert_eq!(reparse(&attach), attach);
  }

  #[test]
  fn disposition_with_rejected_state() {
    let d = Performative::Disposition(Disposition {
      role: Role::Receiver,
      first: 5,
      last: Some(9),
      settled: true,
      state: Some(DeliveryState::Rejected(Some(ErrorCondition::new("amqp:not-allowed", "nope")))),
      batchable: false,
    });
    assert_eq!(reparse(&d), d);
  }

  #[test]
  fn missing_mandatory_field_is_reported() {
    let v = described_list(BEGIN, vec![Value::Null, Value::Uint(0)]);
    let err = Performative::from_value(v).unwrap_err();
    assert!(err.to_string().contains("begin.incoming-window"), "{}", err);
  }

  #[test]
  fn unknown_descriptor_is_a_protocol_violation() {
    let v = described_list(0x99, vec![]);
    assert!(matches!(
      Performative::from_value(v),
      Err(AmqpError::ProtocolViolation(_))
    ));
  }

  #[test]
  fn out_of_range_remote_channel_is_rejected() {
    let v = described_list(
      BEGIN,
      vec![Value::Uint(65_536), Value::Uint(0), Value::Uint(10), Value::Uint(10)],
    );
    let err = Performative::from_value(v).unwrap_err();
    assert!(matches!(err, AmqpError::ProtocolViolation(_)), "{:?}", err);
    assert!(err.to_string().contains("begin.remote-channel"));
  }
}
