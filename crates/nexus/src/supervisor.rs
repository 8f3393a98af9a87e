//! Entry actor that turns new byte sources into registered session units.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nexus_worker::{Actor, ActorContext, ActorExit, ActorFlow, ActorSpec, TaskClass, Terminated};

use crate::handler::SessionHandlerFactory;
use crate::reader::FrameReaderFactory;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::source::ByteSource;
use crate::stream::SessionStream;
use crate::unit::SessionUnit;

/// Mail delivered to the session supervisor.
pub(crate) enum SupervisorMsg {
	/// A new connection to adopt.
	Takeover(Arc<dyn ByteSource>),
	/// A watched session unit exited.
	Terminated(Terminated),
}

impl From<Terminated> for SupervisorMsg {
	fn from(notice: Terminated) -> Self {
		Self::Terminated(notice)
	}
}

/// How long shutdown waits for each session to finish its teardown.
const SESSION_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct SessionSupervisor {
	registry: Arc<SessionRegistry>,
	handler_factory: Arc<dyn SessionHandlerFactory>,
	reader_factory: Arc<dyn FrameReaderFactory>,
	session_mailbox: usize,
}

impl SessionSupervisor {
	pub(crate) fn new(
		registry: Arc<SessionRegistry>,
		handler_factory: Arc<dyn SessionHandlerFactory>,
		reader_factory: Arc<dyn FrameReaderFactory>,
		session_mailbox: usize,
	) -> Self {
		Self {
			registry,
			handler_factory,
			reader_factory,
			session_mailbox,
		}
	}

	async fn takeover(&self, source: Arc<dyn ByteSource>, ctx: &ActorContext<SupervisorMsg>) {
		let stream = Arc::new(SessionStream::new(source));
		let identity = stream.identity().to_string();
		let unit = SessionUnit::new(
			Arc::clone(&stream),
			Arc::clone(&self.handler_factory),
			Arc::clone(&self.reader_factory),
			Arc::clone(&self.registry),
		);
		let spec = ActorSpec::new(format!("session:{identity}"), TaskClass::Session, unit)
			.mailbox(self.session_mailbox)
			.watched_by(ctx.self_ref().clone());

		let unit = match ctx.runtime().spawn(spec).await {
			Ok(unit) => unit,
			Err(err) => {
				if let Err(close_err) = stream.close() {
					tracing::debug!(session_id = %identity, error = %close_err, "session.close_failed");
				}
				tracing::error!(session_id = %identity, error = %err, "session.spawn_failed");
				return;
			}
		};

		let address = unit.address();
		// Insert first so concurrent senders always find a live handle.
		let replaced = self.registry.put(Arc::new(SessionHandle::new(stream, unit)));
		if let Some(old) = replaced {
			tracing::debug!(session_id = %identity, old = %old.address(), new = %address, "session.replaced");
			old.kill("close existing session");
		}
		tracing::debug!(session_id = %identity, %address, online_count = self.registry.len(), "session.opened");
	}

	fn reap(&self, notice: &Terminated, ctx: &ActorContext<SupervisorMsg>) {
		if notice.address == ctx.address() {
			return;
		}
		match self.registry.remove_by_address(notice.address) {
			Some(handle) => tracing::debug!(
				session_id = handle.identity(),
				address = %notice.address,
				kind = ?notice.exit.kind(),
				online_count = self.registry.len(),
				"session.closed"
			),
			None => tracing::trace!(address = %notice.address, actor = %notice.name, "session.reap_stale"),
		}
	}
}

#[async_trait]
impl Actor for SessionSupervisor {
	type Msg = SupervisorMsg;

	async fn on_launch(&mut self, _ctx: &mut ActorContext<Self::Msg>) -> Result<(), String> {
		for stale in self.registry.drain() {
			stale.kill("cleanup session");
		}
		Ok(())
	}

	async fn handle(&mut self, msg: Self::Msg, ctx: &mut ActorContext<Self::Msg>) -> Result<ActorFlow, String> {
		match msg {
			SupervisorMsg::Takeover(source) => self.takeover(source, ctx).await,
			SupervisorMsg::Terminated(notice) => self.reap(&notice, ctx),
		}
		Ok(ActorFlow::Continue)
	}

	async fn on_kill(&mut self, exit: &ActorExit, _ctx: &mut ActorContext<Self::Msg>) {
		let handles = self.registry.drain();
		tracing::debug!(sessions = handles.len(), kind = ?exit.kind(), "session.supervisor.stopped");
		for handle in &handles {
			handle.kill("cleanup session");
		}
		for handle in &handles {
			if !handle.unit().join_timeout(SESSION_JOIN_TIMEOUT).await {
				tracing::warn!(session_id = handle.identity(), "session.teardown_timeout");
			}
		}
	}
}
