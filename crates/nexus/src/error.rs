//! Error types for session I/O and runtime setup.

use std::io;

use thiserror::Error;

/// Boxed error returned by pluggable factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal outcome of a frame read.
#[derive(Debug, Error)]
pub enum ReadError {
	/// The peer closed the stream. Reported after the last data read.
	#[error("end of stream")]
	Eof,

	/// Any other transport failure. Not retryable.
	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Failure writing to a registered session.
#[derive(Debug, Error)]
pub enum SendError {
	/// The session's byte source rejected the write.
	#[error("write to session `{identity}` failed: {source}")]
	Write {
		/// Identity of the session the write targeted.
		identity: String,
		/// The underlying I/O error.
		source: io::Error,
	},
}

impl SendError {
	/// Identity of the session the failed write targeted.
	pub fn identity(&self) -> &str {
		match self {
			Self::Write { identity, .. } => identity,
		}
	}
}

/// Errors starting or driving a [`crate::Nexus`].
#[derive(Debug, Error)]
pub enum NexusError {
	/// The session supervisor could not be spawned.
	#[error("failed to start session supervisor: {0}")]
	Spawn(#[from] nexus_worker::SpawnError),

	/// A builder option was out of range.
	#[error("invalid option `{name}`: {reason}")]
	InvalidOption {
		/// Option name.
		name: &'static str,
		/// Why the value was rejected.
		reason: &'static str,
	},

	/// The supervisor has shut down and no longer accepts connections.
	#[error("session supervisor is not running")]
	SupervisorStopped,
}

/// Result type for nexus setup operations.
pub type Result<T> = std::result::Result<T, NexusError>;
