use super::LinkId;
use crate::protocol::amqp::performative::DeliveryState;
use bytes::Bytes;
use std::fmt;

/// Identifies one delivery for the lifetime of its connection.
///
/// This is a connection-local counter, distinct from the delivery-id carried on the
/// wire, which is only assigned once the first transfer frame is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryId(pub(crate) u64);

impl DeliveryId {
  pub fn value(&self) -> u64 {
    self.0
  }

  /// The delivery tag sent with an outgoing delivery.
  pub(crate) fn tag(&self) -> Bytes {
    Bytes::copy_from_slice(&self.0.to_be_bytes())
  }
}

impl fmt::Display for DeliveryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "delivery#{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
  Outgoing,
  Incoming,
}

/// Bookkeeping for an unsettled delivery. Dropped once settled locally.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
  pub link: LinkId,
  pub direction: Direction,
  pub tag: Bytes,
  /// Wire delivery-id, assigned when the first transfer is sent or received.
  pub wire_id: Option<u32>,
  pub local_state: Option<DeliveryState>,
  pub remote_state: Option<DeliveryState>,
  pub remote_settled: bool,
}

impl Delivery {
  pub fn outgoing(link: LinkId, tag: Bytes) -> Self {
    Self {
      link,
      direction: Direction::Outgoing,
      tag,
      wire_id: None,
      local_state: None,
      remote_state: None,
      remote_settled: false,
    }
  }

  pub fn incoming(link: LinkId, tag: Bytes, wire_id: u32, remote_settled: bool) -> Self {
    Self {
      link,
      direction: Direction::Incoming,
      tag,
      wire_id: Some(wire_id),
      local_state: None,
      remote_state: None,
      remote_settled,
    }
  }
}
