use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::source::{ByteSource, write_all};

/// A session's byte source paired with its private write lock.
///
/// Writes and the final close both go through the lock, so a close never
/// interleaves with a half-written payload.
pub(crate) struct SessionStream {
	source: Arc<dyn ByteSource>,
	write_lock: Mutex<()>,
}

impl SessionStream {
	pub(crate) fn new(source: Arc<dyn ByteSource>) -> Self {
		Self {
			source,
			write_lock: Mutex::new(()),
		}
	}

	pub(crate) fn identity(&self) -> &str {
		self.source.identity()
	}

	pub(crate) fn source(&self) -> Arc<dyn ByteSource> {
		Arc::clone(&self.source)
	}

	pub(crate) fn write(&self, payload: &[u8]) -> io::Result<()> {
		let _guard = self.write_lock.lock();
		write_all(&*self.source, payload)
	}

	pub(crate) fn close(&self) -> io::Result<()> {
		let _guard = self.write_lock.lock();
		self.source.close()
	}
}
