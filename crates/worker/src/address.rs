use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime-unique identifier of one spawned actor.
///
/// Addresses are never reused within a runtime, so comparing them is enough
/// to tell a replaced actor apart from its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u64);

impl Address {
	/// Raw numeric value.
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Monotonic address source shared by every spawn of one runtime.
#[derive(Debug, Default, Clone)]
pub(crate) struct AddressClock {
	next: Arc<AtomicU64>,
}

impl AddressClock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next address, starting at 1.
	pub fn next(&self) -> Address {
		Address(self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
	}
}
