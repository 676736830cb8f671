//! The connection handle and the session/link/delivery state it owns.
//!
//! A [`Connection`] never performs I/O. Local operations update endpoint state and
//! queue frames; the protocol driver encodes those frames and applies the peer's.

mod delivery;
pub mod event;
mod link;
mod options;
mod registry;
mod session;
mod state;

pub(crate) use delivery::{Delivery, Direction};
pub use delivery::DeliveryId;
pub use event::Event;
pub(crate) use event::EventQueue;
pub(crate) use link::{Link, Partial, Queued};
pub use link::LinkId;
pub use options::ConnectionOptions;
pub(crate) use registry::Registry;
pub(crate) use session::Session;
pub use session::SessionId;
pub use state::EndpointState;

use crate::error::AmqpError;
use crate::message::Message;
use crate::protocol::amqp::codec::{Frame, FrameCodec, MIN_MAX_FRAME_SIZE};
use crate::protocol::amqp::performative::{
  Close, DeliveryState, Detach, Disposition, End, ErrorCondition, Flow, Open, Performative, Role, Terminus, Transfer,
  SND_SETTLE_SETTLED,
};
use bytes::BytesMut;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

/// One AMQP connection as seen by the application.
///
/// Obtained from [`Engine::connection`](crate::Engine::connection) or passed to every
/// [`Handler`](crate::Handler) callback. Changes made here become outbound frames on
/// the engine's next encode step.
#[derive(Debug)]
pub struct Connection {
  pub(crate) handle: usize,
  pub(crate) options: ConnectionOptions,
  pub(crate) state: EndpointState,
  pub(crate) remote_open: Option<Open>,
  pub(crate) sessions: Registry<Session>,
  pub(crate) links: Registry<Link>,
  pub(crate) deliveries: HashMap<DeliveryId, Delivery>,
  pub(crate) remote_channels: HashMap<u16, SessionId>,
  pub(crate) output: VecDeque<Frame>,
  pub(crate) local_condition: Option<ErrorCondition>,
  pub(crate) remote_condition: Option<ErrorCondition>,
  next_delivery: u64,
  next_link_name: u64,
  /// Set when an endpoint may have become free to release.
  reap_pending: bool,
}

impl Connection {
  pub(crate) fn new(options: ConnectionOptions, handle: usize) -> Self {
    Self {
      handle,
      options,
      state: EndpointState::default(),
      remote_open: None,
      sessions: Registry::default(),
      links: Registry::default(),
      deliveries: HashMap::new(),
      remote_channels: HashMap::new(),
      output: VecDeque::new(),
      local_condition: None,
      remote_condition: None,
      next_delivery: 0,
      next_link_name: 0,
      reap_pending: false,
    }
  }

  // --- Connection endpoint ---

  /// Sends our open. Fails if the connection was already opened locally.
  pub fn open(&mut self) -> Result<(), AmqpError> {
    if !self.state.local_uninit() {
      return Err(AmqpError::InvalidState("connection already opened"));
    }
    let o = &self.options;
    let open = Open {
      container_id: o.get_container_id().to_string(),
      hostname: o.get_hostname().map(str::to_string),
      max_frame_size: o.get_max_frame_size(),
      channel_max: o.get_channel_max(),
      idle_time_out: o.get_idle_timeout().map(duration_to_millis),
      offered_capabilities: o.get_offered_capabilities().to_vec(),
      desired_capabilities: o.get_desired_capabilities().to_vec(),
      properties: o.get_properties().to_vec(),
    };
    tracing::info!(
      engine_handle = self.handle,
      container_id = %open.container_id,
      max_frame_size = open.max_frame_size,
      "Opening connection"
    );
    self.state.set_local(EndpointState::LOCAL_ACTIVE);
    self.push(0, Performative::Open(open));
    Ok(())
  }

  /// Sends our close, opening first if needed. Closing twice is a no-op.
  pub fn close(&mut self, error: Option<ErrorCondition>) -> Result<(), AmqpError> {
    if self.state.local_closed() {
      return Ok(());
    }
    if self.state.local_uninit() {
      self.open()?;
    }
    tracing::info!(engine_handle = self.handle, error = ?error, "Closing connection");
    self.local_condition = error.clone();
    self.state.set_local(EndpointState::LOCAL_CLOSED);
    self.push(0, Performative::Close(Close { error }));
    Ok(())
  }

  pub fn state(&self) -> EndpointState {
    self.state
  }

  pub fn options(&self) -> &ConnectionOptions {
    &self.options
  }

  pub fn container_id(&self) -> &str {
    self.options.get_container_id()
  }

  pub fn remote_container_id(&self) -> Option<&str> {
    self.remote_open.as_ref().map(|o| o.container_id.as_str())
  }

  pub fn remote_hostname(&self) -> Option<&str> {
    self.remote_open.as_ref().and_then(|o| o.hostname.as_deref())
  }

  pub fn remote_max_frame_size(&self) -> Option<u32> {
    self.remote_open.as_ref().map(|o| o.max_frame_size)
  }

  pub fn remote_idle_timeout(&self) -> Option<Duration> {
    self
      .remote_open
      .as_ref()
      .and_then(|o| o.idle_time_out)
      .filter(|ms| *ms > 0)
      .map(|ms| Duration::from_millis(ms as u64))
  }

  pub fn remote_offered_capabilities(&self) -> &[String] {
    self.remote_open.as_ref().map_or(&[][..], |o| o.offered_capabilities.as_slice())
  }

  /// Error the peer sent with its close, if any.
  pub fn remote_condition(&self) -> Option<&ErrorCondition> {
    self.remote_condition.as_ref()
  }

  pub fn local_condition(&self) -> Option<&ErrorCondition> {
    self.local_condition.as_ref()
  }

  // --- Sessions ---

  /// Begins a new session, opening the connection first if needed.
  pub fn open_session(&mut self) -> Result<SessionId, AmqpError> {
    self.ensure_active()?;
    let channel = self.allocate_channel()?;
    let mut session = Session::new(channel);
    session.state.set_local(EndpointState::LOCAL_ACTIVE);
    let begin = session.begin();
    let id = SessionId(self.sessions.insert(session));
    tracing::debug!(engine_handle = self.handle, session = %id, channel, "Beginning session");
    self.push(channel, Performative::Begin(begin));
    Ok(id)
  }

  /// Answers a session the peer began.
  pub fn accept_session(&mut self, id: SessionId) -> Result<(), AmqpError> {
    self.ensure_active()?;
    if !self.session(id)?.state.local_uninit() {
      return Err(AmqpError::InvalidState("session already opened locally"));
    }
    let channel = self.allocate_channel()?;
    let session = &mut self.sessions[id.0];
    session.channel = channel;
    session.state.set_local(EndpointState::LOCAL_ACTIVE);
    let begin = session.begin();
    tracing::debug!(engine_handle = self.handle, session = %id, channel, "Answering remote session");
    self.push(channel, Performative::Begin(begin));
    Ok(())
  }

  pub fn close_session(&mut self, id: SessionId, error: Option<ErrorCondition>) -> Result<(), AmqpError> {
    self.ensure_writable()?;
    let session = self.session_mut(id)?;
    if session.state.local_closed() {
      return Ok(());
    }
    if session.state.local_uninit() {
      return Err(AmqpError::InvalidState("session was never opened locally"));
    }
    session.state.set_local(EndpointState::LOCAL_CLOSED);
    session.local_condition = error.clone();
    let channel = session.channel;
    self.reap_pending = true;
    tracing::debug!(engine_handle = self.handle, session = %id, channel, "Ending session");
    self.push(channel, Performative::End(End { error }));
    Ok(())
  }

  pub fn session_state(&self, id: SessionId) -> Result<EndpointState, AmqpError> {
    Ok(self.session(id)?.state)
  }

  pub fn session_remote_condition(&self, id: SessionId) -> Result<Option<&ErrorCondition>, AmqpError> {
    Ok(self.session(id)?.remote_condition.as_ref())
  }

  /// Sessions still held by the connection. Sessions ended by both sides are released
  /// once no delivery refers to their links.
  pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
    self.sessions.keys().map(SessionId)
  }

  // --- Links ---

  /// Attaches a sender link to `address` with a generated name.
  pub fn open_sender(&mut self, session: SessionId, address: &str) -> Result<LinkId, AmqpError> {
    let name = self.next_link_name();
    self.open_sender_named(session, name, address)
  }

  pub fn open_sender_named(
    &mut self,
    session: SessionId,
    name: impl Into<String>,
    address: &str,
  ) -> Result<LinkId, AmqpError> {
    self.open_link(
      session,
      name.into(),
      Role::Sender,
      Some(Terminus::default()),
      Some(Terminus::address(address)),
    )
  }

  /// Attaches a receiver link from `address` and grants it `credit`.
  pub fn open_receiver(&mut self, session: SessionId, address: &str, credit: u32) -> Result<LinkId, AmqpError> {
    let name = self.next_link_name();
    self.open_receiver_named(session, name, address, credit)
  }

  pub fn open_receiver_named(
    &mut self,
    session: SessionId,
    name: impl Into<String>,
    address: &str,
    credit: u32,
  ) -> Result<LinkId, AmqpError> {
    let id = self.open_link(
      session,
      name.into(),
      Role::Receiver,
      Some(Terminus::address(address)),
      Some(Terminus::default()),
    )?;
    if credit > 0 {
      self.flow(id, credit)?;
    }
    Ok(id)
  }

  /// Answers a link the peer attached.
  pub fn accept_link(&mut self, id: LinkId) -> Result<(), AmqpError> {
    self.ensure_writable()?;
    let link = self.link(id)?;
    if !link.state.local_uninit() {
      return Err(AmqpError::InvalidState("link already attached locally"));
    }
    if !self.sessions[link.session.0].state.local_active() {
      return Err(AmqpError::InvalidState("session is not open"));
    }
    self.attach_link(id)
  }

  /// Detaches a link with `closed = true`. Messages still queued on it are dropped.
  pub fn close_link(&mut self, id: LinkId, error: Option<ErrorCondition>) -> Result<(), AmqpError> {
    self.ensure_writable()?;
    let session = self.link(id)?.session;
    let channel = self.sessions[session.0].channel;
    let link = &mut self.links[id.0];
    if link.state.local_closed() {
      return Ok(());
    }
    let Some(handle) = link.handle else {
      return Err(AmqpError::InvalidState("link was never attached locally"));
    };
    link.state.set_local(EndpointState::LOCAL_CLOSED);
    link.local_condition = error.clone();
    let dropped: Vec<DeliveryId> = link.queued.drain(..).map(|q| q.delivery).collect();
    for d in dropped {
      self.deliveries.remove(&d);
    }
    self.reap_pending = true;
    tracing::debug!(engine_handle = self.handle, link = %id, handle, "Detaching link");
    self.push(
      channel,
      Performative::Detach(Detach {
        handle,
        closed: true,
        error,
      }),
    );
    Ok(())
  }

  pub fn link_state(&self, id: LinkId) -> Result<EndpointState, AmqpError> {
    Ok(self.link(id)?.state)
  }

  pub fn link_name(&self, id: LinkId) -> Result<&str, AmqpError> {
    Ok(&self.link(id)?.name)
  }

  pub fn link_role(&self, id: LinkId) -> Result<Role, AmqpError> {
    Ok(self.link(id)?.role)
  }

  pub fn link_session(&self, id: LinkId) -> Result<SessionId, AmqpError> {
    Ok(self.link(id)?.session)
  }

  /// Target address for senders, source address for receivers.
  pub fn link_address(&self, id: LinkId) -> Result<Option<&str>, AmqpError> {
    Ok(self.link(id)?.address())
  }

  /// Current link credit: what we may send on a sender, what we granted on a receiver.
  pub fn link_credit(&self, id: LinkId) -> Result<u32, AmqpError> {
    Ok(self.link(id)?.credit)
  }

  /// Messages accepted by [`send`](Self::send) but still waiting for credit.
  pub fn queued(&self, id: LinkId) -> Result<usize, AmqpError> {
    Ok(self.link(id)?.queued.len())
  }

  /// Whether the peer asked this sender to use up its credit.
  pub fn link_draining(&self, id: LinkId) -> Result<bool, AmqpError> {
    Ok(self.link(id)?.drain)
  }

  pub fn link_remote_condition(&self, id: LinkId) -> Result<Option<&ErrorCondition>, AmqpError> {
    Ok(self.link(id)?.remote_condition.as_ref())
  }

  pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
    self.links.keys().map(LinkId)
  }

  // --- Transfers and flow control ---

  /// Queues `message` on a sender link. It is transferred as soon as the link has
  /// credit, possibly within this call.
  pub fn send(&mut self, id: LinkId, message: &Message) -> Result<DeliveryId, AmqpError> {
    self.ensure_writable()?;
    let link = self.link(id)?;
    if !link.is_sender() {
      return Err(AmqpError::InvalidArgument(format!("{} is a receiver link", id)));
    }
    if link.state.local_closed() || link.state.local_uninit() {
      return Err(AmqpError::InvalidState("link is not attached locally"));
    }
    let mut payload = BytesMut::new();
    message.encode(&mut payload);
    if let Some(max) = link.remote_max_message_size.filter(|m| *m > 0) {
      if payload.len() as u64 > max {
        return Err(AmqpError::InvalidArgument(format!(
          "message of {} bytes exceeds the peer's max-message-size {}",
          payload.len(),
          max
        )));
      }
    }

    let delivery = DeliveryId(self.next_delivery);
    self.next_delivery += 1;
    self.deliveries.insert(delivery, Delivery::outgoing(id, delivery.tag()));
    self.links[id.0].queued.push_back(Queued {
      delivery,
      payload: payload.freeze(),
    });
    tracing::trace!(engine_handle = self.handle, link = %id, %delivery, "Message queued");
    self.pump_link(id);
    Ok(delivery)
  }

  /// Sets the credit granted on a receiver link and tells the peer.
  pub fn flow(&mut self, id: LinkId, credit: u32) -> Result<(), AmqpError> {
    self.ensure_writable()?;
    let link = self.link_mut(id)?;
    if link.is_sender() {
      return Err(AmqpError::InvalidArgument(format!("{} is a sender link", id)));
    }
    if !link.state.local_active() {
      return Err(AmqpError::InvalidState("link is not attached locally"));
    }
    link.credit = credit;
    self.push_flow(id, false);
    Ok(())
  }

  // --- Deliveries ---

  pub fn accept(&mut self, id: DeliveryId) -> Result<(), AmqpError> {
    self.settle_with(id, Some(DeliveryState::Accepted))
  }

  pub fn reject(&mut self, id: DeliveryId, error: Option<ErrorCondition>) -> Result<(), AmqpError> {
    self.settle_with(id, Some(DeliveryState::Rejected(error)))
  }

  pub fn release(&mut self, id: DeliveryId) -> Result<(), AmqpError> {
    self.settle_with(id, Some(DeliveryState::Released))
  }

  /// Settles a delivery without changing its state. A queued outgoing message that
  /// was never transferred is discarded.
  pub fn settle(&mut self, id: DeliveryId) -> Result<(), AmqpError> {
    self.settle_with(id, None)
  }

  /// Whether the delivery is still tracked, i.e. not yet settled locally.
  pub fn delivery_pending(&self, id: DeliveryId) -> bool {
    self.deliveries.contains_key(&id)
  }

  pub fn delivery_link(&self, id: DeliveryId) -> Option<LinkId> {
    self.deliveries.get(&id).map(|d| d.link)
  }

  pub fn delivery_remote_state(&self, id: DeliveryId) -> Option<&DeliveryState> {
    self.deliveries.get(&id).and_then(|d| d.remote_state.as_ref())
  }

  pub fn delivery_remotely_settled(&self, id: DeliveryId) -> bool {
    self.deliveries.get(&id).is_some_and(|d| d.remote_settled)
  }

  // --- Internals shared with the protocol driver ---

  pub(crate) fn push(&mut self, channel: u16, performative: Performative) {
    tracing::trace!(engine_handle = self.handle, channel, frame = performative.name(), "Frame queued");
    self.output.push_back(Frame::new(channel, performative));
  }

  pub(crate) fn push_frame(&mut self, frame: Frame) {
    tracing::trace!(engine_handle = self.handle, channel = frame.channel, frame = frame.name(), "Frame queued");
    self.output.push_back(frame);
  }

  pub(crate) fn has_output(&self) -> bool {
    !self.output.is_empty()
  }

  /// Queues a flow for `id` carrying its session's window state.
  pub(crate) fn push_flow(&mut self, id: LinkId, echo: bool) {
    let link = &self.links[id.0];
    let session = &self.sessions[link.session.0];
    let flow = Flow {
      next_incoming_id: session.remote_channel.map(|_| session.next_incoming_id),
      incoming_window: session.incoming_window,
      next_outgoing_id: session.next_outgoing_id,
      outgoing_window: session.outgoing_window,
      handle: link.handle,
      delivery_count: Some(link.delivery_count),
      link_credit: Some(link.credit),
      available: link.is_sender().then_some(link.queued.len() as u32),
      drain: link.drain,
      echo,
    };
    let channel = session.channel;
    self.push(channel, Performative::Flow(flow));
  }

  /// Transfers queued messages while the link and session windows allow.
  pub(crate) fn pump_link(&mut self, id: LinkId) {
    let max_frame = self
      .remote_open
      .as_ref()
      .map_or(MIN_MAX_FRAME_SIZE, |o| o.max_frame_size as usize)
      .max(MIN_MAX_FRAME_SIZE);

    while self.state.local_active() {
      let link = &mut self.links[id.0];
      let session = &mut self.sessions[link.session.0];
      if !link.state.local_active()
        || !link.state.remote_active()
        || !session.state.local_active()
        || link.credit == 0
        || session.remote_incoming_window == 0
      {
        break;
      }
      let Some(Queued { delivery, mut payload }) = link.queued.pop_front() else {
        break;
      };
      let Some(handle) = link.handle else {
        break;
      };

      let wire_id = session.next_delivery_id;
      session.next_delivery_id = session.next_delivery_id.wrapping_add(1);
      let presettled = link.snd_settle_mode == SND_SETTLE_SETTLED;
      let first = Transfer {
        handle,
        delivery_id: Some(wire_id),
        delivery_tag: Some(delivery.tag()),
        message_format: Some(0),
        settled: Some(presettled),
        more: true,
        ..Default::default()
      };
      let channel = session.channel;
      let mut frames = 0u32;

      loop {
        let mut transfer = if frames == 0 {
          first.clone()
        } else {
          Transfer {
            handle,
            more: true,
            ..Default::default()
          }
        };
        let room = max_frame.saturating_sub(FrameCodec::frame_overhead(&Performative::Transfer(transfer.clone())));
        let chunk = payload.split_to(room.max(1).min(payload.len()));
        transfer.more = !payload.is_empty();
        self.output.push_back(Frame::with_payload(channel, Performative::Transfer(transfer), chunk));
        frames += 1;
        if payload.is_empty() {
          break;
        }
      }

      let session = &mut self.sessions[self.links[id.0].session.0];
      session.next_outgoing_id = session.next_outgoing_id.wrapping_add(frames);
      session.remote_incoming_window = session.remote_incoming_window.saturating_sub(frames);
      if presettled {
        self.deliveries.remove(&delivery);
      } else {
        session.outgoing.insert(wire_id, delivery);
        if let Some(d) = self.deliveries.get_mut(&delivery) {
          d.wire_id = Some(wire_id);
        }
      }
      let link = &mut self.links[id.0];
      link.delivery_count = link.delivery_count.wrapping_add(1);
      link.credit -= 1;
      tracing::trace!(
        engine_handle = self.handle,
        link = %id,
        %delivery,
        delivery_id = wire_id,
        frames,
        "Delivery transferred"
      );
    }
  }

  /// Transfers whatever every sender link can currently send.
  pub(crate) fn pump_session(&mut self, id: SessionId) {
    let links = self.sessions[id.0].links.clone();
    for link in links {
      if self.links[link.0].is_sender() {
        self.pump_link(link);
      }
    }
  }

  pub(crate) fn session(&self, id: SessionId) -> Result<&Session, AmqpError> {
    self
      .sessions
      .get(id.0)
      .ok_or_else(|| AmqpError::InvalidArgument(format!("unknown {}", id)))
  }

  pub(crate) fn session_mut(&mut self, id: SessionId) -> Result<&mut Session, AmqpError> {
    self
      .sessions
      .get_mut(id.0)
      .ok_or_else(|| AmqpError::InvalidArgument(format!("unknown {}", id)))
  }

  pub(crate) fn link(&self, id: LinkId) -> Result<&Link, AmqpError> {
    self
      .links
      .get(id.0)
      .ok_or_else(|| AmqpError::InvalidArgument(format!("unknown {}", id)))
  }

  pub(crate) fn link_mut(&mut self, id: LinkId) -> Result<&mut Link, AmqpError> {
    self
      .links
      .get_mut(id.0)
      .ok_or_else(|| AmqpError::InvalidArgument(format!("unknown {}", id)))
  }

  pub(crate) fn allocate_delivery(&mut self) -> DeliveryId {
    let id = DeliveryId(self.next_delivery);
    self.next_delivery += 1;
    id
  }

  pub(crate) fn mark_reapable(&mut self) {
    self.reap_pending = true;
  }

  /// Releases links closed by both sides (or whose session has ended) that no
  /// tracked delivery refers to, then sessions ended by both sides with no links left.
  pub(crate) fn reap_closed(&mut self) {
    if !std::mem::take(&mut self.reap_pending) {
      return;
    }
    let busy: HashSet<LinkId> = self.deliveries.values().map(|d| d.link).collect();
    let links: Vec<LinkId> = self
      .links
      .iter()
      .filter(|(_, l)| l.state.fully_closed() || self.sessions[l.session.0].state.fully_closed())
      .map(|(i, _)| LinkId(i))
      .filter(|id| !busy.contains(id))
      .collect();
    for id in &links {
      if let Some(link) = self.links.remove(id.0) {
        if let Some(session) = self.sessions.get_mut(link.session.0) {
          session.links.retain(|l| l != id);
        }
      }
    }
    let sessions: Vec<SessionId> = self
      .sessions
      .iter()
      .filter(|(_, s)| s.state.fully_closed() && s.links.is_empty())
      .map(|(i, _)| SessionId(i))
      .collect();
    for id in &sessions {
      self.sessions.remove(id.0);
    }
    if !links.is_empty() || !sessions.is_empty() {
      tracing::trace!(
        engine_handle = self.handle,
        links = links.len(),
        sessions = sessions.len(),
        retained_sessions = self.sessions.len(),
        retained_links = self.links.len(),
        "Released closed endpoints"
      );
    }
  }

  fn next_link_name(&mut self) -> String {
    let name = format!("{}{}", self.options.get_link_prefix(), self.next_link_name);
    self.next_link_name += 1;
    name
  }

  fn ensure_writable(&self) -> Result<(), AmqpError> {
    if self.state.local_closed() {
      return Err(AmqpError::ConnectionClosed);
    }
    Ok(())
  }

  fn ensure_active(&mut self) -> Result<(), AmqpError> {
    self.ensure_writable()?;
    if self.state.local_uninit() {
      self.open()?;
    }
    Ok(())
  }

  fn channel_max(&self) -> u16 {
    let local = self.options.get_channel_max();
    self.remote_open.as_ref().map_or(local, |o| local.min(o.channel_max))
  }

  fn allocate_channel(&self) -> Result<u16, AmqpError> {
    let used: HashSet<u16> = self
      .sessions
      .values()
      .filter(|s| s.holds_channel())
      .map(|s| s.channel)
      .collect();
    (0..=self.channel_max())
      .find(|c| !used.contains(c))
      .ok_or(AmqpError::InvalidState("no free channel below channel-max"))
  }

  fn allocate_handle(&self, session: SessionId) -> Result<u32, AmqpError> {
    let s = &self.sessions[session.0];
    let used: HashSet<u32> = s
      .links
      .iter()
      .map(|l| &self.links[l.0])
      .filter(|l| l.holds_handle())
      .filter_map(|l| l.handle)
      .collect();
    (0..=s.remote_handle_max)
      .find(|h| !used.contains(h))
      .ok_or(AmqpError::InvalidState("no free link handle below handle-max"))
  }

  fn open_link(
    &mut self,
    session: SessionId,
    name: String,
    role: Role,
    source: Option<Terminus>,
    target: Option<Terminus>,
  ) -> Result<LinkId, AmqpError> {
    self.ensure_writable()?;
    if !self.session(session)?.state.local_active() {
      return Err(AmqpError::InvalidState("session is not open"));
    }
    let mut link = Link::new(session, name, role);
    link.source = source;
    link.target = target;
    let id = LinkId(self.links.insert(link));
    self.sessions[session.0].links.push(id);
    self.attach_link(id)?;
    Ok(id)
  }

  fn attach_link(&mut self, id: LinkId) -> Result<(), AmqpError> {
    let session = self.links[id.0].session;
    let handle = self.allocate_handle(session)?;
    let link = &mut self.links[id.0];
    link.handle = Some(handle);
    link.state.set_local(EndpointState::LOCAL_ACTIVE);
    let attach = link.attach(handle);
    let channel = self.sessions[session.0].channel;
    tracing::debug!(
      engine_handle = self.handle,
      link = %id,
      name = %attach.name,
      role = ?attach.role,
      handle,
      "Attaching link"
    );
    self.push(channel, Performative::Attach(attach));
    Ok(())
  }

  fn settle_with(&mut self, id: DeliveryId, state: Option<DeliveryState>) -> Result<(), AmqpError> {
    self.ensure_writable()?;
    let delivery = self
      .deliveries
      .remove(&id)
      .ok_or_else(|| AmqpError::InvalidArgument(format!("unknown or already settled {}", id)))?;
    self.reap_pending = true;
    let link = &mut self.links[delivery.link.0];

    let Some(wire_id) = delivery.wire_id else {
      // Never transferred.
      link.queued.retain(|q| q.delivery != id);
      return Ok(());
    };

    let session = &mut self.sessions[link.session.0];
    match delivery.direction {
      Direction::Outgoing => session.outgoing.remove(&wire_id),
      Direction::Incoming => session.incoming.remove(&wire_id),
    };
    if delivery.remote_settled || !session.state.local_active() || session.state.remote_closed() {
      return Ok(());
    }
    let channel = session.channel;
    let role = link.role;
    tracing::trace!(engine_handle = self.handle, delivery = %id, delivery_id = wire_id, state = ?state, "Settling delivery");
    self.push(
      channel,
      Performative::Disposition(Disposition {
        role,
        first: wire_id,
        last: None,
        settled: true,
        state,
        batchable: false,
      }),
    );
    Ok(())
  }
}

fn duration_to_millis(d: Duration) -> u32 {
  d.as_millis().min(u32::MAX as u128) as u32
}
