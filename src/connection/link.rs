use super::{DeliveryId, EndpointState, SessionId};
use crate::protocol::amqp::performative::{Attach, ErrorCondition, Role, Terminus, RCV_SETTLE_FIRST, SND_SETTLE_MIXED};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

impl LinkId {
  pub fn index(&self) -> usize {
    self.0
  }
}

impl fmt::Display for LinkId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "link#{}", self.0)
  }
}

/// An encoded message waiting for credit.
#[derive(Debug)]
pub(crate) struct Queued {
  pub delivery: DeliveryId,
  pub payload: Bytes,
}

/// An inbound delivery whose transfer frames are still arriving.
#[derive(Debug)]
pub(crate) struct Partial {
  pub delivery: DeliveryId,
  pub payload: BytesMut,
}

#[derive(Debug)]
pub(crate) struct Link {
  pub session: SessionId,
  pub name: String,
  /// Our role on this link.
  pub role: Role,
  pub state: EndpointState,
  pub handle: Option<u32>,
  pub remote_handle: Option<u32>,
  pub source: Option<Terminus>,
  pub target: Option<Terminus>,
  pub snd_settle_mode: u8,
  pub rcv_settle_mode: u8,

  pub delivery_count: u32,
  pub credit: u32,
  pub available: u32,
  pub drain: bool,
  pub remote_max_message_size: Option<u64>,

  pub queued: VecDeque<Queued>,
  pub partial: Option<Partial>,

  pub local_condition: Option<ErrorCondition>,
  pub remote_condition: Option<ErrorCondition>,
}

impl Link {
  pub fn new(session: SessionId, name: String, role: Role) -> Self {
    Self {
      session,
      name,
      role,
      state: EndpointState::default(),
      handle: None,
      remote_handle: None,
      source: None,
      target: None,
      snd_settle_mode: SND_SETTLE_MIXED,
      rcv_settle_mode: RCV_SETTLE_FIRST,
      delivery_count: 0,
      credit: 0,
      available: 0,
      drain: false,
      remote_max_message_size: None,
      queued: VecDeque::new(),
      partial: None,
      local_condition: None,
      remote_condition: None,
    }
  }

  pub fn is_sender(&self) -> bool {
    self.role == Role::Sender
  }

  /// The address of the far end: the target for senders, the source for receivers.
  pub fn address(&self) -> Option<&str> {
    let terminus = if self.is_sender() { &self.target } else { &self.source };
    terminus.as_ref().and_then(|t| t.address.as_deref())
  }

  /// The local attach performative. Requires a local handle.
  pub fn attach(&self, handle: u32) -> Attach {
    Attach {
      name: self.name.clone(),
      handle,
      role: self.role,
      snd_settle_mode: self.snd_settle_mode,
      rcv_settle_mode: self.rcv_settle_mode,
      source: self.source.clone(),
      target: self.target.clone(),
      initial_delivery_count: if self.is_sender() { Some(self.delivery_count) } else { None },
      max_message_size: None,
    }
  }

  /// Applies the peer's attach to a link whose local half may or may not exist yet.
  pub fn remote_attach(&mut self, attach: &Attach) {
    self.remote_handle = Some(attach.handle);
    self.remote_max_message_size = attach.max_message_size;
    // Remote-initiated links adopt the peer's termini.
    if self.state.local_uninit() {
      self.source = attach.source.clone();
      self.target = attach.target.clone();
      self.snd_settle_mode = attach.snd_settle_mode;
      self.rcv_settle_mode = attach.rcv_settle_mode;
    }
    if !self.is_sender() {
      if let Some(count) = attach.initial_delivery_count {
        self.delivery_count = count;
      }
    }
    self.state.set_remote(EndpointState::REMOTE_ACTIVE);
  }

  /// Whether the local handle is still in use.
  pub fn holds_handle(&self) -> bool {
    self.handle.is_some() && !self.state.fully_closed()
  }
}
