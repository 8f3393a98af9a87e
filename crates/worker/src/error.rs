/// Failure to bring an actor to life.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
	/// The actor's prelaunch hook returned an error or panicked.
	#[error("actor `{name}` prelaunch failed: {reason}")]
	Prelaunch { name: String, reason: String },
	/// The runtime has been shut down.
	#[error("actor runtime is stopped")]
	RuntimeStopped,
	/// The actor task ended before reporting its prelaunch outcome.
	#[error("actor `{name}` aborted before launch")]
	Aborted { name: String },
}

/// Error returned when enqueueing into an actor mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
	/// The mailbox is closed; the actor is stopping or gone.
	#[error("actor mailbox closed")]
	Closed,
	/// The mailbox is at capacity and a non-blocking send was used.
	#[error("actor mailbox full")]
	Full,
}
