use crate::protocol::amqp::codec::MIN_MAX_FRAME_SIZE;
use crate::protocol::amqp::types::Value;
use std::time::Duration;

pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024;
pub const DEFAULT_CHANNEL_MAX: u16 = 32_767;
pub const DEFAULT_PREFETCH: u32 = 10;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Configuration for one connection.
///
/// Every field is optional; unset fields read as their defaults. [`update`](Self::update)
/// layers the explicitly set fields of another bundle over this one, which is how a
/// [`Container`](crate::Container) applies its baseline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOptions {
  container_id: Option<String>,
  link_prefix: Option<String>,
  hostname: Option<String>,
  max_frame_size: Option<u32>,
  channel_max: Option<u16>,
  // None = not set, Some(None) = explicitly disabled
  idle_timeout: Option<Option<Duration>>,
  offered_capabilities: Option<Vec<String>>,
  desired_capabilities: Option<Vec<String>>,
  properties: Option<Vec<(Value, Value)>>,
  prefetch: Option<u32>,
  auto_accept: Option<bool>,
  auto_settle: Option<bool>,
  auto_open: Option<bool>,
  read_buffer_size: Option<usize>,
}

macro_rules! merge {
  ($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
    $(
      if $other.$field.is_some() {
        $self.$field = $other.$field.clone();
      }
    )+
  };
}

impl ConnectionOptions {
  pub fn new() -> Self {
    Self::default()
  }

  // --- Builder ---

  pub fn container_id(mut self, id: impl Into<String>) -> Self {
    self.container_id = Some(id.into());
    self
  }

  /// Prefix for generated link names. Must be unique per connection within a container.
  pub fn link_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.link_prefix = Some(prefix.into());
    self
  }

  pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
    self.hostname = Some(hostname.into());
    self
  }

  /// Largest frame this side accepts. Values below 512 are raised to 512.
  pub fn max_frame_size(mut self, size: u32) -> Self {
    self.max_frame_size = Some(size.max(MIN_MAX_FRAME_SIZE as u32));
    self
  }

  pub fn channel_max(mut self, max: u16) -> Self {
    self.channel_max = Some(max);
    self
  }

  /// Local idle timeout. The peer is asked to send something at least this often.
  pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.idle_timeout = Some(timeout);
    self
  }

  pub fn offered_capabilities(mut self, caps: Vec<String>) -> Self {
    self.offered_capabilities = Some(caps);
    self
  }

  pub fn desired_capabilities(mut self, caps: Vec<String>) -> Self {
    self.desired_capabilities = Some(caps);
    self
  }

  pub fn properties(mut self, props: Vec<(Value, Value)>) -> Self {
    self.properties = Some(props);
    self
  }

  /// Credit window kept open on receiver links. 0 disables automatic credit.
  pub fn prefetch(mut self, credit: u32) -> Self {
    self.prefetch = Some(credit);
    self
  }

  pub fn auto_accept(mut self, enabled: bool) -> Self {
    self.auto_accept = Some(enabled);
    self
  }

  pub fn auto_settle(mut self, enabled: bool) -> Self {
    self.auto_settle = Some(enabled);
    self
  }

  /// Answer the peer's open/begin/attach/close with our own automatically.
  pub fn auto_open(mut self, enabled: bool) -> Self {
    self.auto_open = Some(enabled);
    self
  }

  pub fn read_buffer_size(mut self, size: usize) -> Self {
    self.read_buffer_size = Some(size.max(1));
    self
  }

  /// Overwrites fields of `self` with every field explicitly set in `other`.
  pub fn update(&mut self, other: &ConnectionOptions) {
    merge!(
      self,
      other,
      container_id,
      link_prefix,
      hostname,
      max_frame_size,
      channel_max,
      idle_timeout,
      offered_capabilities,
      desired_capabilities,
      properties,
      prefetch,
      auto_accept,
      auto_settle,
      auto_open,
      read_buffer_size,
    );
  }

  // --- Effective values ---

  pub fn get_container_id(&self) -> &str {
    self.container_id.as_deref().unwrap_or("")
  }

  pub fn get_link_prefix(&self) -> &str {
    self.link_prefix.as_deref().unwrap_or("")
  }

  pub fn get_hostname(&self) -> Option<&str> {
    self.hostname.as_deref()
  }

  pub fn get_max_frame_size(&self) -> u32 {
    self.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE)
  }

  pub fn get_channel_max(&self) -> u16 {
    self.channel_max.unwrap_or(DEFAULT_CHANNEL_MAX)
  }

  pub fn get_idle_timeout(&self) -> Option<Duration> {
    self.idle_timeout.flatten()
  }

  pub fn get_offered_capabilities(&self) -> &[String] {
    self.offered_capabilities.as_deref().unwrap_or_default()
  }

  pub fn get_desired_capabilities(&self) -> &[String] {
    self.desired_capabilities.as_deref().unwrap_or_default()
  }

  pub fn get_properties(&self) -> &[(Value, Value)] {
    self.properties.as_deref().unwrap_or_default()
  }

  pub fn get_prefetch(&self) -> u32 {
    self.prefetch.unwrap_or(DEFAULT_PREFETCH)
  }

  pub fn get_auto_accept(&self) -> bool {
    self.auto_accept.unwrap_or(true)
  }

  pub fn get_auto_settle(&self) -> bool {
    self.auto_settle.unwrap_or(true)
  }

  pub fn get_auto_open(&self) -> bool {
    self.auto_open.unwrap_or(true)
  }

  pub fn get_read_buffer_size(&self) -> usize {
    self.read_buffer_size.unwrap_or(DEFAULT_READ_BUFFER_SIZE)
  }
}
