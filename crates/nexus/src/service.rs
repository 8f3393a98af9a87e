use std::sync::Arc;

use nexus_worker::{ActorRef, ActorRuntime, ActorSpec, Address, KillMode, TaskClass};

use crate::error::{NexusError, Result, SendError};
use crate::handler::SessionHandlerFactory;
use crate::options::NexusOptions;
use crate::reader::FrameReaderFactory;
use crate::registry::{SendErrorHandler, SessionOperator, SessionRegistry};
use crate::source::ByteSource;
use crate::supervisor::{SessionSupervisor, SupervisorMsg};

/// Builder for [`Nexus`].
pub struct NexusBuilder {
	handler_factory: Arc<dyn SessionHandlerFactory>,
	options: NexusOptions,
}

impl NexusBuilder {
	/// Replaces the default buffered frame reader.
	pub fn reader_factory(mut self, factory: impl FrameReaderFactory) -> Self {
		self.options.reader_factory = Some(Arc::new(factory));
		self
	}

	/// Buffer size of the default frame reader.
	pub fn read_buffer_size(mut self, size: usize) -> Self {
		self.options.read_buffer_size = size;
		self
	}

	pub fn session_mailbox(mut self, capacity: usize) -> Self {
		self.options.session_mailbox = capacity;
		self
	}

	pub fn supervisor_mailbox(mut self, capacity: usize) -> Self {
		self.options.supervisor_mailbox = capacity;
		self
	}

	pub fn options(&self) -> &NexusOptions {
		&self.options
	}

	/// Spawns the session supervisor on `runtime`.
	pub async fn start(self, runtime: &ActorRuntime) -> Result<Nexus> {
		self.options.validate()?;
		let registry = Arc::new(SessionRegistry::new());
		let supervisor = SessionSupervisor::new(
			Arc::clone(&registry),
			self.handler_factory,
			self.options.reader_factory(),
			self.options.session_mailbox,
		);
		let spec = ActorSpec::new("session-supervisor", TaskClass::Control, supervisor).mailbox(self.options.supervisor_mailbox);
		let supervisor = runtime.spawn(spec).await?;
		tracing::debug!(address = %supervisor.address(), options = ?self.options, "nexus.started");
		Ok(Nexus { supervisor, registry })
	}
}

/// Running session runtime: the supervisor address plus the shared registry.
#[derive(Clone)]
pub struct Nexus {
	supervisor: ActorRef<SupervisorMsg>,
	registry: Arc<SessionRegistry>,
}

impl Nexus {
	pub fn builder(handler_factory: impl SessionHandlerFactory) -> NexusBuilder {
		NexusBuilder {
			handler_factory: Arc::new(handler_factory),
			options: NexusOptions::default(),
		}
	}

	/// Hands a new connection to the supervisor.
	///
	/// Returns once the connection is queued. If the supervisor is gone the
	/// source is closed and [`NexusError::SupervisorStopped`] returned.
	pub async fn takeover(&self, source: Arc<dyn ByteSource>) -> Result<()> {
		let fallback = Arc::clone(&source);
		if self.supervisor.send(SupervisorMsg::Takeover(source)).await.is_err() {
			if let Err(err) = fallback.close() {
				tracing::debug!(session_id = fallback.identity(), error = %err, "session.close_failed");
			}
			return Err(NexusError::SupervisorStopped);
		}
		Ok(())
	}

	pub fn registry(&self) -> &Arc<SessionRegistry> {
		&self.registry
	}

	pub fn session_count(&self) -> usize {
		self.registry.len()
	}

	pub fn supervisor_address(&self) -> Address {
		self.supervisor.address()
	}

	/// Stops accepting connections, finishes queued takeovers, and tears
	/// down every live session before returning.
	pub async fn shutdown(&self) {
		let _ = self.supervisor.kill_and_join(KillMode::Graceful, "shutdown").await;
	}
}

impl SessionOperator for Nexus {
	fn close(&self, identity: &str) {
		self.registry.close(identity);
	}

	fn send(&self, identity: &str, payload: &[u8]) -> std::result::Result<(), SendError> {
		self.registry.send(identity, payload)
	}

	fn send_many(&self, identities: &[&str], payload: &[u8], on_error: Option<SendErrorHandler<'_>>) {
		self.registry.send_many(identities, payload, on_error);
	}

	fn broadcast(&self, payload: &[u8], on_error: Option<SendErrorHandler<'_>>) {
		self.registry.broadcast(payload, on_error);
	}
}
