//! Bounded, insertion-ordered set of recently seen event ids.

// std
use std::collections::HashSet;
// self
use crate::_prelude::*;

/// Recent-id window used by the user event stream.
///
/// Inserting into a full cache evicts the oldest id. Both operations are O(1) amortized.
#[derive(Clone, Debug)]
pub struct DedupCache {
	capacity: usize,
	seen: HashSet<String>,
	order: VecDeque<String>,
}
impl DedupCache {
	/// Default window size.
	pub const DEFAULT_CAPACITY: usize = 5000;

	/// Creates a cache holding at most `capacity` ids (at least one).
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);

		Self {
			capacity,
			seen: HashSet::with_capacity(capacity),
			order: VecDeque::with_capacity(capacity),
		}
	}

	/// Records `id`, returning `false` when it is already in the window.
	pub fn insert(&mut self, id: &str) -> bool {
		if self.seen.contains(id) {
			return false;
		}

		let evicted = (self.order.len() == self.capacity).then(|| self.order.pop_front()).flatten();

		if let Some(oldest) = evicted {
			self.seen.remove(&oldest);
		}

		self.seen.insert(id.to_owned());
		self.order.push_back(id.to_owned());

		true
	}

	/// Returns `true` when `id` is in the window.
	pub fn contains(&self, id: &str) -> bool {
		self.seen.contains(id)
	}

	/// Number of ids currently held.
	pub fn len(&self) -> usize {
		self.order.len()
	}

	/// Returns `true` when no id has been recorded.
	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	/// Maximum number of ids held.
	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
impl Default for DedupCache {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn repeated_ids_are_rejected_within_the_window() {
		let mut cache = DedupCache::default();

		for idx in 0..DedupCache::DEFAULT_CAPACITY {
			assert!(cache.insert(&format!("e-{idx}")));
		}

		assert_eq!(cache.len(), DedupCache::DEFAULT_CAPACITY);
		assert!(!cache.insert("e-0"));
		assert!(!cache.insert("e-4999"));
	}

	#[test]
	fn oldest_ids_are_evicted_at_capacity() {
		let mut cache = DedupCache::new(2);

		assert!(cache.insert("a"));
		assert!(cache.insert("b"));
		assert!(cache.insert("c"));
		assert!(!cache.contains("a"));
		assert!(cache.contains("b"));
		assert_eq!(cache.len(), 2);
		assert!(cache.insert("a"));
		assert!(!cache.contains("b"));
	}

	#[test]
	fn zero_capacity_still_remembers_the_latest_id() {
		let mut cache = DedupCache::new(0);

		assert_eq!(cache.capacity(), 1);
		assert!(cache.insert("a"));
		assert!(!cache.insert("a"));
		assert!(!cache.is_empty());
	}
}
