use std::sync::Arc;

use nexus_worker::{ActorRef, Address, KillMode};

use crate::error::SendError;
use crate::registry::{SessionOperator, SessionRegistry};
use crate::stream::SessionStream;
use crate::unit::SessionMsg;

/// Handle given to [`crate::SessionHandler`] callbacks.
///
/// Bound to one physical connection: [`SessionContext::close`] and
/// [`SessionContext::send`] never reach a newer connection that took over
/// the same identity.
#[derive(Clone)]
pub struct SessionContext {
	stream: Arc<SessionStream>,
	unit: ActorRef<SessionMsg>,
	registry: Arc<SessionRegistry>,
}

impl SessionContext {
	pub(crate) fn new(stream: Arc<SessionStream>, unit: ActorRef<SessionMsg>, registry: Arc<SessionRegistry>) -> Self {
		Self { stream, unit, registry }
	}

	pub fn identity(&self) -> &str {
		self.stream.identity()
	}

	/// Runtime address of this session's unit.
	pub fn address(&self) -> Address {
		self.unit.address()
	}

	/// Writes `payload` back to this connection. Empty payloads are a no-op.
	pub fn send(&self, payload: &[u8]) -> Result<(), SendError> {
		if payload.is_empty() {
			return Ok(());
		}
		self.stream.write(payload).map_err(|source| SendError::Write {
			identity: self.identity().to_string(),
			source,
		})
	}

	/// Requests teardown of this session once the current callback returns.
	pub fn close(&self) {
		self.unit.kill(KillMode::Immediate, "close session");
	}

	/// Operations over every registered session.
	pub fn sessions(&self) -> &dyn SessionOperator {
		&*self.registry
	}
}

impl std::fmt::Debug for SessionContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionContext")
			.field("identity", &self.identity())
			.field("address", &self.address())
			.finish()
	}
}
