use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

/// Sessions or links keyed by an index that is never handed out twice.
///
/// Removing an entry leaves its id dangling, so a stale [`SessionId`](super::SessionId)
/// or [`LinkId`](super::LinkId) resolves to nothing rather than to a newer endpoint.
#[derive(Debug)]
pub(crate) struct Registry<T> {
  entries: BTreeMap<usize, T>,
  next: usize,
}

impl<T> Default for Registry<T> {
  fn default() -> Self {
    Self {
      entries: BTreeMap::new(),
      next: 0,
    }
  }
}

impl<T> Registry<T> {
  pub fn insert(&mut self, value: T) -> usize {
    let index = self.next;
    self.next += 1;
    self.entries.insert(index, value);
    index
  }

  pub fn get(&self, index: usize) -> Option<&T> {
    self.entries.get(&index)
  }

  pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
    self.entries.get_mut(&index)
  }

  pub fn remove(&mut self, index: usize) -> Option<T> {
    self.entries.remove(&index)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Live entries in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
    self.entries.iter().map(|(i, v)| (*i, v))
  }

  pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
    self.entries.keys().copied()
  }

  pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
    self.entries.values()
  }
}

impl<T> Index<usize> for Registry<T> {
  type Output = T;

  fn index(&self, index: usize) -> &T {
    &self.entries[&index]
  }
}

impl<T> IndexMut<usize> for Registry<T> {
  fn index_mut(&mut self, index: usize) -> &mut T {
    self
      .entries
      .get_mut(&index)
      .unwrap_or_else(|| panic!("no live entry at index {}", index))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn removed_indices_are_not_reused() {
    let mut r = Registry::default();
    let a = r.insert("a");
    let b = r.insert("b");
    assert_eq!(r.remove(a), Some("a"));
    let c = r.insert("c");
    assert_ne!(c, a);
    assert_eq!(r.len(), 2);
    assert!(r.get(a).is_none());
    assert_eq!(r.keys().collect::<Vec<_>>(), vec![b, c]);
    assert_eq!(r[c], "c");
  }
}
