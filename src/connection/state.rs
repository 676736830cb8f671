use bitflags::bitflags;

bitflags! {
  /// Local and remote halves of an endpoint's lifecycle, combined in one value.
  ///
  /// Exactly one `LOCAL_*` and one `REMOTE_*` bit is set at any time.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct EndpointState: u8 {
    const LOCAL_UNINIT = 1 << 0;
    const LOCAL_ACTIVE = 1 << 1;
    const LOCAL_CLOSED = 1 << 2;
    const REMOTE_UNINIT = 1 << 3;
    const REMOTE_ACTIVE = 1 << 4;
    const REMOTE_CLOSED = 1 << 5;

    const LOCAL_MASK = Self::LOCAL_UNINIT.bits() | Self::LOCAL_ACTIVE.bits() | Self::LOCAL_CLOSED.bits();
    const REMOTE_MASK = Self::REMOTE_UNINIT.bits() | Self::REMOTE_ACTIVE.bits() | Self::REMOTE_CLOSED.bits();
  }
}

impl Default for EndpointState {
  fn default() -> Self {
    EndpointState::LOCAL_UNINIT | EndpointState::REMOTE_UNINIT
  }
}

impl EndpointState {
  pub(crate) fn set_local(&mut self, local: EndpointState) {
    *self = (*self - EndpointState::LOCAL_MASK) | local;
  }

  pub(crate) fn set_remote(&mut self, remote: EndpointState) {
    *self = (*self - EndpointState::REMOTE_MASK) | remote;
  }

  pub fn local_uninit(&self) -> bool {
    self.contains(EndpointState::LOCAL_UNINIT)
  }

  pub fn local_active(&self) -> bool {
    self.contains(EndpointState::LOCAL_ACTIVE)
  }

  pub fn local_closed(&self) -> bool {
    self.contains(EndpointState::LOCAL_CLOSED)
  }

  pub fn remote_active(&self) -> bool {
    self.contains(EndpointState::REMOTE_ACTIVE)
  }

  pub fn remote_closed(&self) -> bool {
    self.contains(EndpointState::REMOTE_CLOSED)
  }

  /// Both sides have closed; the endpoint's identifiers may be reused.
  pub fn fully_closed(&self) -> bool {
    self.local_closed() && self.remote_closed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn halves_change_independently() {
    let mut s = EndpointState::default();
    s.set_local(EndpointState::LOCAL_ACTIVE);
    assert_eq!(s, EndpointState::LOCAL_ACTIVE | EndpointState::REMOTE_UNINIT);
    s.set_remote(EndpointState::REMOTE_CLOSED);
    s.set_local(EndpointState::LOCAL_CLOSED);
    assert!(s.fully_closed());
    assert!(!s.local_active());
  }
}
