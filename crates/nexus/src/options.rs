use std::sync::Arc;

use crate::error::{NexusError, Result};
use crate::reader::{BufferedReaderFactory, DEFAULT_READ_BUFFER_SIZE, FrameReaderFactory};

/// Mailbox capacity of each session unit.
pub const DEFAULT_SESSION_MAILBOX: usize = 16;

/// Mailbox capacity of the session supervisor.
pub const DEFAULT_SUPERVISOR_MAILBOX: usize = 256;

/// Tunables for a [`crate::Nexus`].
#[derive(Clone)]
pub struct NexusOptions {
	pub(crate) reader_factory: Option<Arc<dyn FrameReaderFactory>>,
	pub(crate) read_buffer_size: usize,
	pub(crate) session_mailbox: usize,
	pub(crate) supervisor_mailbox: usize,
}

impl Default for NexusOptions {
	fn default() -> Self {
		Self {
			reader_factory: None,
			read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
			session_mailbox: DEFAULT_SESSION_MAILBOX,
			supervisor_mailbox: DEFAULT_SUPERVISOR_MAILBOX,
		}
	}
}

impl NexusOptions {
	pub(crate) fn validate(&self) -> Result<()> {
		if self.read_buffer_size == 0 {
			return Err(NexusError::InvalidOption {
				name: "read_buffer_size",
				reason: "must be greater than zero",
			});
		}
		if self.session_mailbox == 0 {
			return Err(NexusError::InvalidOption {
				name: "session_mailbox",
				reason: "must be greater than zero",
			});
		}
		if self.supervisor_mailbox == 0 {
			return Err(NexusError::InvalidOption {
				name: "supervisor_mailbox",
				reason: "must be greater than zero",
			});
		}
		Ok(())
	}

	/// The configured reader factory, or the buffered default.
	pub(crate) fn reader_factory(&self) -> Arc<dyn FrameReaderFactory> {
		match &self.reader_factory {
			Some(factory) => Arc::clone(factory),
			None => Arc::new(BufferedReaderFactory::new(self.read_buffer_size)),
		}
	}
}

impl std::fmt::Debug for NexusOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NexusOptions")
			.field("custom_reader", &self.reader_factory.is_some())
			.field("read_buffer_size", &self.read_buffer_size)
			.field("session_mailbox", &self.session_mailbox)
			.field("supervisor_mailbox", &self.supervisor_mailbox)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let options = NexusOptions::default();
		assert!(options.validate().is_ok());
		assert_eq!(options.read_buffer_size, 4096);
	}

	#[test]
	fn zero_sizes_are_rejected() {
		let options = NexusOptions {
			read_buffer_size: 0,
			..NexusOptions::default()
		};
		assert!(matches!(
			options.validate(),
			Err(NexusError::InvalidOption {
				name: "read_buffer_size",
				..
			})
		));

		let options = NexusOptions {
			session_mailbox: 0,
			..NexusOptions::default()
		};
		assert!(matches!(options.validate(), Err(NexusError::InvalidOption { name: "session_mailbox", .. })));
	}
}
