use super::{DeliveryId, EndpointState, LinkId};
use crate::protocol::amqp::performative::{Begin, ErrorCondition, DEFAULT_HANDLE_MAX};
use std::collections::HashMap;
use std::fmt;

/// Session window advertised to the peer, in transfer frames.
pub(crate) const SESSION_WINDOW: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) usize);

impl SessionId {
  pub fn index(&self) -> usize {
    self.0
  }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "session#{}", self.0)
  }
}

#[derive(Debug)]
pub(crate) struct Session {
  pub state: EndpointState,
  pub channel: u16,
  pub remote_channel: Option<u16>,

  // Transfer-id bookkeeping.
  pub next_outgoing_id: u32,
  pub next_incoming_id: u32,
  pub incoming_window: u32,
  pub outgoing_window: u32,
  pub remote_incoming_window: u32,
  pub remote_outgoing_window: u32,
  pub remote_handle_max: u32,

  /// Next wire delivery-id for outgoing transfers.
  pub next_delivery_id: u32,

  pub links: Vec<LinkId>,
  pub remote_handles: HashMap<u32, LinkId>,
  /// Unsettled deliveries keyed by wire delivery-id.
  pub outgoing: HashMap<u32, DeliveryId>,
  pub incoming: HashMap<u32, DeliveryId>,

  pub local_condition: Option<ErrorCondition>,
  pub remote_condition: Option<ErrorCondition>,
}

impl Session {
  pub fn new(channel: u16) -> Self {
    Self {
      state: EndpointState::default(),
      channel,
      remote_channel: None,
      next_outgoing_id: 0,
      next_incoming_id: 0,
      incoming_window: SESSION_WINDOW,
      outgoing_window: SESSION_WINDOW,
      remote_incoming_window: 0,
      remote_outgoing_window: 0,
      remote_handle_max: DEFAULT_HANDLE_MAX,
      next_delivery_id: 0,
      links: Vec::new(),
      remote_handles: HashMap::new(),
      outgoing: HashMap::new(),
      incoming: HashMap::new(),
      local_condition: None,
      remote_condition: None,
    }
  }

  /// The local begin performative for this session.
  pub fn begin(&self) -> Begin {
    Begin {
      remote_channel: self.remote_channel,
      next_outgoing_id: self.next_outgoing_id,
      incoming_window: self.incoming_window,
      outgoing_window: self.outgoing_window,
      handle_max: DEFAULT_HANDLE_MAX,
    }
  }

  /// Applies the peer's begin.
  pub fn remote_begin(&mut self, channel: u16, begin: &Begin) {
    self.remote_channel = Some(channel);
    self.next_incoming_id = begin.next_outgoing_id;
    self.remote_incoming_window = begin.incoming_window;
    self.remote_outgoing_window = begin.outgoing_window;
    self.remote_handle_max = begin.handle_max;
    self.state.set_remote(EndpointState::REMOTE_ACTIVE);
  }

  /// Whether the local channel number is in use. Remote-initiated sessions get
  /// their channel when answered.
  pub fn holds_channel(&self) -> bool {
    !self.state.local_uninit() && !self.state.fully_closed()
  }
}
