use tokio_util::sync::CancellationToken;

use crate::SpawnError;
use crate::address::AddressClock;
use crate::supervisor::{Actor, ActorRef, ActorSpec, spawn_actor};

/// Entry point for spawning actors.
///
/// Clones share one address space and one root cancellation token, so
/// [`ActorRuntime::shutdown`] reaches every actor spawned through any clone.
#[derive(Debug, Clone, Default)]
pub struct ActorRuntime {
	root: CancellationToken,
	clock: AddressClock,
}

impl ActorRuntime {
	pub fn new() -> Self {
		Self::default()
	}

	/// Spawns one actor and resolves once its prelaunch hook has run.
	pub async fn spawn<A: Actor>(&self, spec: ActorSpec<A>) -> Result<ActorRef<A::Msg>, SpawnError> {
		if self.root.is_cancelled() {
			return Err(SpawnError::RuntimeStopped);
		}
		let address = self.clock.next();
		spawn_actor(self.clone(), address, self.root.child_token(), spec).await
	}

	/// Immediately kills every actor and refuses further spawns.
	pub fn shutdown(&self) {
		tracing::debug!("worker.runtime.shutdown");
		self.root.cancel();
	}

	pub fn is_stopped(&self) -> bool {
		self.root.is_cancelled()
	}
}
