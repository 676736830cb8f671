// src/container.rs

use crate::connection::ConnectionOptions;

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Builds per-engine [`ConnectionOptions`] sharing one container id.
///
/// Every [`make_options`](Container::make_options) call stamps a fresh link-name prefix,
/// so links created by different engines of the same container never collide. A
/// container may be shared between threads; engines built from it keep working after
/// it is dropped.
pub struct Container {
  id: String,
  baseline: RwLock<ConnectionOptions>,
  next_prefix: AtomicU64,
}

impl Container {
  /// Creates a container. An empty `id` is replaced by a random UUID.
  pub fn new(id: impl Into<String>) -> Self {
    let mut id = id.into();
    if id.is_empty() {
      id = random_uuid();
    }
    tracing::debug!(container_id = %id, "Container created");
    Self {
      id,
      baseline: RwLock::new(ConnectionOptions::default()),
      next_prefix: AtomicU64::new(0),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Returns the baseline options stamped with this container's id and a new link prefix.
  /// Call once per engine.
  pub fn make_options(&self) -> ConnectionOptions {
    let prefix = self.next_prefix.fetch_add(1, Ordering::Relaxed);
    let stamp = ConnectionOptions::new()
      .container_id(self.id.clone())
      .link_prefix(format!("{:x}/", prefix));
    let mut options = self.baseline.read().clone();
    options.update(&stamp);
    options
  }

  /// Replaces the baseline merged into future [`make_options`](Container::make_options)
  /// results. Options already handed out are unaffected.
  pub fn set_options(&self, options: ConnectionOptions) {
    *self.baseline.write() = options;
  }

  /// Layers the fields set in `overrides` onto the current baseline.
  pub fn update_options(&self, overrides: &ConnectionOptions) {
    self.baseline.write().update(overrides);
  }

  /// A copy of the current baseline.
  pub fn options(&self) -> ConnectionOptions {
    self.baseline.read().clone()
  }
}

impl Default for Container {
  fn default() -> Self {
    Self::new(String::new())
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("id", &self.id)
      .field("next_prefix", &self.next_prefix.load(Ordering::Relaxed))
      .finish()
  }
}

/// Random (version 4) UUID in its hyphenated text form.
fn random_uuid() -> String {
  let mut b: [u8; 16] = rand::random();
  b[6] = (b[6] & 0x0f) | 0x40;
  b[8] = (b[8] & 0x3f) | 0x80;
  let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
  format!(
    "{}-{}-{}-{}-{}",
    &hex[0..8],
    &hex[8..12],
    &hex[12..16],
    &hex[16..20],
    &hex[20..32]
  )
}
