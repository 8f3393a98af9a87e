//! Identity-keyed registry of live sessions.
//!
//! The map lock guards structure only. Writes clone the target handle under
//! the read lock, release it, and then serialise on that session's own write
//! lock, so slow peers never block registry mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nexus_worker::{ActorRef, Address, KillMode};
use parking_lot::RwLock;

use crate::error::SendError;
use crate::stream::SessionStream;
use crate::unit::SessionMsg;

/// Directive returned by a send error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFlow {
	/// Skip the failed target and keep sending.
	Continue,
	/// Stop the remaining sends.
	Abort,
}

/// Per-target failure callback for multi-target sends.
pub type SendErrorHandler<'a> = &'a mut dyn FnMut(&str, &SendError) -> SendFlow;

/// Operations over the set of live sessions.
pub trait SessionOperator: Send + Sync {
	/// Removes the session and kills its unit. Unknown identities are a no-op.
	fn close(&self, identity: &str);

	/// Writes to one session. Unknown identities and empty payloads succeed
	/// without writing.
	fn send(&self, identity: &str, payload: &[u8]) -> Result<(), SendError>;

	/// Writes to each distinct identity in order, first occurrence wins.
	/// Without a handler failures are skipped.
	fn send_many(&self, identities: &[&str], payload: &[u8], on_error: Option<SendErrorHandler<'_>>);

	/// Writes to every session registered at the time of the call.
	fn broadcast(&self, payload: &[u8], on_error: Option<SendErrorHandler<'_>>);
}

/// Registry entry for one live session.
pub struct SessionHandle {
	stream: Arc<SessionStream>,
	unit: ActorRef<SessionMsg>,
}

impl SessionHandle {
	pub(crate) fn new(stream: Arc<SessionStream>, unit: ActorRef<SessionMsg>) -> Self {
		Self { stream, unit }
	}

	pub fn identity(&self) -> &str {
		self.stream.identity()
	}

	/// Runtime address of the session's unit.
	pub fn address(&self) -> Address {
		self.unit.address()
	}

	pub(crate) fn kill(&self, reason: &str) {
		self.unit.kill(KillMode::Immediate, reason);
	}

	pub(crate) fn unit(&self) -> &ActorRef<SessionMsg> {
		&self.unit
	}

	fn write(&self, payload: &[u8]) -> Result<(), SendError> {
		self.stream.write(payload).map_err(|source| SendError::Write {
			identity: self.identity().to_string(),
			source,
		})
	}
}

impl std::fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionHandle")
			.field("identity", &self.identity())
			.field("address", &self.address())
			.finish()
	}
}

/// Concurrent identity to session map. At most one handle per identity.
#[derive(Default)]
pub struct SessionRegistry {
	sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts `handle`, returning the entry it replaced. The caller is
	/// responsible for tearing the replaced session down.
	pub(crate) fn put(&self, handle: Arc<SessionHandle>) -> Option<Arc<SessionHandle>> {
		let key = handle.identity().to_string();
		self.sessions.write().insert(key, handle)
	}

	/// Removes the entry for `identity` only if it is still `expected`.
	pub(crate) fn remove_if(&self, identity: &str, expected: &Arc<SessionHandle>) -> bool {
		let mut sessions = self.sessions.write();
		match sessions.get(identity) {
			Some(current) if Arc::ptr_eq(current, expected) => {
				sessions.remove(identity);
				true
			}
			_ => false,
		}
	}

	/// Removes the entry whose unit lives at `address`, if any.
	pub(crate) fn remove_by_address(&self, address: Address) -> Option<Arc<SessionHandle>> {
		let found = self.sessions.read().values().find(|handle| handle.address() == address).cloned()?;
		self.remove_if(found.identity(), &found).then_some(found)
	}

	/// Takes every entry, leaving the registry empty.
	pub(crate) fn drain(&self) -> Vec<Arc<SessionHandle>> {
		self.sessions.write().drain().map(|(_, handle)| handle).collect()
	}

	pub fn get(&self, identity: &str) -> Option<Arc<SessionHandle>> {
		self.sessions.read().get(identity).cloned()
	}

	pub fn contains(&self, identity: &str) -> bool {
		self.sessions.read().contains_key(identity)
	}

	/// Snapshot of registered identities.
	pub fn identities(&self) -> Vec<String> {
		self.sessions.read().keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.sessions.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.read().is_empty()
	}
}

impl SessionOperator for SessionRegistry {
	fn close(&self, identity: &str) {
		let removed = self.sessions.write().remove(identity);
		if let Some(handle) = removed {
			tracing::debug!(session_id = identity, address = %handle.address(), "session.close");
			handle.kill("close session");
		}
	}

	fn send(&self, identity: &str, payload: &[u8]) -> Result<(), SendError> {
		if payload.is_empty() {
			return Ok(());
		}
		let Some(handle) = self.get(identity) else {
			return Ok(());
		};
		handle.write(payload)
	}

	fn send_many(&self, identities: &[&str], payload: &[u8], mut on_error: Option<SendErrorHandler<'_>>) {
		if payload.is_empty() {
			return;
		}
		let mut seen = HashSet::with_capacity(identities.len());
		for &identity in identities {
			if !seen.insert(identity) {
				continue;
			}
			let Err(err) = self.send(identity, payload) else {
				continue;
			};
			tracing::warn!(session_id = identity, error = %err, "session.send_failed");
			if let Some(handler) = on_error.as_deref_mut()
				&& handler(identity, &err) == SendFlow::Abort
			{
				return;
			}
		}
	}

	fn broadcast(&self, payload: &[u8], on_error: Option<SendErrorHandler<'_>>) {
		if payload.is_empty() {
			return;
		}
		let identities = self.identities();
		let targets: Vec<&str> = identities.iter().map(String::as_str).collect();
		self.send_many(&targets, payload, on_error);
	}
}
