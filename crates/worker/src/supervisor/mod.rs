use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::mailbox::{Mailbox, MailboxReceiver, MailboxSender};
use crate::{ActorRuntime, Address, SendError, SpawnError, TaskClass};

mod join_ctrl;

use join_ctrl::ActorJoinCtrl;

/// Mailbox capacity used when a spec does not set one.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Continuation directive from one message handling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorFlow {
	/// Continue processing messages.
	Continue,
	/// Stop this actor.
	Stop,
}

/// How a kill request treats mail that is already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillMode {
	/// Close the mailbox and let the actor drain what is queued.
	Graceful,
	/// Stop before the next message. A handler already running is not preempted.
	Immediate,
}

/// Opaque exit classification for public consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActorExitKind {
	Stopped,
	Drained,
	Killed,
	LaunchFailed,
	HandlerFailed,
	Panicked,
}

/// Exit summary recorded once per actor and delivered to its watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorExit {
	kind: ActorExitKind,
	message: Option<String>,
}

impl ActorExit {
	pub fn kind(&self) -> ActorExitKind {
		self.kind
	}

	/// Kill reason, hook error, or panic message.
	pub fn message(&self) -> Option<&str> {
		self.message.as_deref()
	}

	pub fn is_failure(&self) -> bool {
		matches!(self.kind, ActorExitKind::LaunchFailed | ActorExitKind::HandlerFailed | ActorExitKind::Panicked)
	}
}

enum ExitReason {
	Stopped,
	Drained(String),
	Killed(String),
	LaunchFailed(String),
	HandlerFailed(String),
	Panicked(String),
}

impl From<ExitReason> for ActorExit {
	fn from(reason: ExitReason) -> Self {
		let (kind, message) = match reason {
			ExitReason::Stopped => (ActorExitKind::Stopped, None),
			ExitReason::Drained(msg) => (ActorExitKind::Drained, Some(msg)),
			ExitReason::Killed(msg) => (ActorExitKind::Killed, Some(msg)),
			ExitReason::LaunchFailed(msg) => (ActorExitKind::LaunchFailed, Some(msg)),
			ExitReason::HandlerFailed(msg) => (ActorExitKind::HandlerFailed, Some(msg)),
			ExitReason::Panicked(msg) => (ActorExitKind::Panicked, Some(msg)),
		};
		Self { kind, message }
	}
}

/// Notice sent to a watcher after an actor has run its kill hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminated {
	pub address: Address,
	pub name: String,
	pub exit: ActorExit,
}

/// Serially scheduled actor.
///
/// Hooks run on the actor's own task, never concurrently with each other.
/// Panics inside any hook are captured and treated as a failure of this
/// actor only.
#[async_trait]
pub trait Actor: Send + 'static {
	type Msg: Send + 'static;

	/// Runs before the actor is considered live. An error aborts the spawn
	/// and no address is handed out.
	async fn prelaunch(&mut self, _ctx: &mut ActorContext<Self::Msg>) -> Result<(), String> {
		Ok(())
	}

	/// Runs once the spawn has succeeded, before the first message.
	async fn on_launch(&mut self, _ctx: &mut ActorContext<Self::Msg>) -> Result<(), String> {
		Ok(())
	}

	async fn handle(&mut self, msg: Self::Msg, ctx: &mut ActorContext<Self::Msg>) -> Result<ActorFlow, String>;

	/// Runs exactly once after launch, whatever ended the actor.
	async fn on_kill(&mut self, _exit: &ActorExit, _ctx: &mut ActorContext<Self::Msg>) {}
}

/// Per-actor context handed to every hook.
pub struct ActorContext<M> {
	self_ref: ActorRef<M>,
	runtime: ActorRuntime,
}

impl<M: Send + 'static> ActorContext<M> {
	pub fn address(&self) -> Address {
		self.self_ref.address()
	}

	pub fn name(&self) -> &str {
		self.self_ref.name()
	}

	/// Reference to this actor, for handing to other contexts.
	pub fn self_ref(&self) -> &ActorRef<M> {
		&self.self_ref
	}

	/// Runtime this actor was spawned on, for spawning children.
	pub fn runtime(&self) -> &ActorRuntime {
		&self.runtime
	}

	/// Requests an immediate kill of this actor once the current hook returns.
	pub fn stop(&self, reason: impl Into<String>) {
		self.self_ref.kill(KillMode::Immediate, reason);
	}
}

type TerminationNotifier = Box<dyn FnOnce(Terminated) -> BoxFuture<'static, ()> + Send>;

/// Spawn description for one actor.
pub struct ActorSpec<A: Actor> {
	name: String,
	class: TaskClass,
	actor: A,
	capacity: usize,
	watcher: Option<TerminationNotifier>,
}

impl<A: Actor> ActorSpec<A> {
	pub fn new(name: impl Into<String>, class: TaskClass, actor: A) -> Self {
		Self {
			name: name.into(),
			class,
			actor,
			capacity: DEFAULT_MAILBOX_CAPACITY,
			watcher: None,
		}
	}

	/// Sets the mailbox capacity.
	pub fn mailbox(mut self, capacity: usize) -> Self {
		self.capacity = capacity;
		self
	}

	/// Delivers a [`Terminated`] notice to `watcher` when this actor exits.
	pub fn watched_by<W>(mut self, watcher: ActorRef<W>) -> Self
	where
		W: From<Terminated> + Send + 'static,
	{
		self.watcher = Some(Box::new(move |notice: Terminated| {
			async move {
				let address = notice.address;
				if watcher.send(W::from(notice)).await.is_err() {
					tracing::trace!(watcher = %watcher.name(), %address, "worker.actor.watcher_gone");
				}
			}
			.boxed()
		}));
		self
	}
}

struct ActorCell {
	address: Address,
	name: String,
	class: TaskClass,
	cancel: CancellationToken,
	kill_reason: Mutex<Option<String>>,
	exit: Mutex<Option<ActorExit>>,
}

impl ActorCell {
	fn kill_reason(&self) -> String {
		self.kill_reason.lock().clone().unwrap_or_else(|| "runtime shutdown".to_string())
	}
}

/// Cloneable reference to a spawned actor.
pub struct ActorRef<M> {
	cell: Arc<ActorCell>,
	tx: MailboxSender<M>,
	join_ctrl: Arc<ActorJoinCtrl>,
}

impl<M> Clone for ActorRef<M> {
	fn clone(&self) -> Self {
		Self {
			cell: Arc::clone(&self.cell),
			tx: self.tx.clone(),
			join_ctrl: Arc::clone(&self.join_ctrl),
		}
	}
}

impl<M> PartialEq for ActorRef<M> {
	fn eq(&self, other: &Self) -> bool {
		self.cell.address == other.cell.address
	}
}

impl<M> Eq for ActorRef<M> {}

impl<M> fmt::Debug for ActorRef<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorRef")
			.field("name", &self.cell.name)
			.field("address", &self.cell.address)
			.finish()
	}
}

impl<M: Send + 'static> ActorRef<M> {
	pub fn address(&self) -> Address {
		self.cell.address
	}

	pub fn name(&self) -> &str {
		&self.cell.name
	}

	pub fn class(&self) -> TaskClass {
		self.cell.class
	}

	/// Enqueues one message, waiting while the mailbox is full.
	pub async fn send(&self, msg: M) -> Result<(), SendError> {
		self.tx.send(msg).await
	}

	/// Enqueues without waiting.
	pub fn try_send(&self, msg: M) -> Result<(), SendError> {
		self.tx.try_send(msg)
	}

	/// Requests termination. Fire-and-forget and idempotent; the first
	/// reason is the one reported.
	pub fn kill(&self, mode: KillMode, reason: impl Into<String>) {
		{
			let mut slot = self.cell.kill_reason.lock();
			if slot.is_none() {
				*slot = Some(reason.into());
			}
		}
		if mode == KillMode::Immediate {
			self.cell.cancel.cancel();
		}
		self.tx.close();
	}

	/// Returns `true` once the actor has run its kill hook.
	pub fn is_terminated(&self) -> bool {
		self.cell.exit.lock().is_some()
	}

	/// Exit summary, once terminated.
	pub fn exit(&self) -> Option<ActorExit> {
		self.cell.exit.lock().clone()
	}

	/// Waits for the actor task to finish. Must not be called from the actor itself.
	pub async fn join(&self) {
		self.join_ctrl.join_forever().await;
	}

	/// Waits up to `timeout`. Returns `true` if the actor finished.
	pub async fn join_timeout(&self, timeout: Duration) -> bool {
		self.join_ctrl.join_with_timeout(timeout).await
	}

	/// Kills and waits for the exit summary.
	pub async fn kill_and_join(&self, mode: KillMode, reason: impl Into<String>) -> Option<ActorExit> {
		self.kill(mode, reason);
		self.join().await;
		self.exit()
	}
}

/// Spawns one actor and waits for its prelaunch outcome.
pub(crate) async fn spawn_actor<A: Actor>(
	runtime: ActorRuntime,
	address: Address,
	cancel: CancellationToken,
	spec: ActorSpec<A>,
) -> Result<ActorRef<A::Msg>, SpawnError> {
	let ActorSpec {
		name,
		class,
		actor,
		capacity,
		watcher,
	} = spec;

	let mailbox = Mailbox::new(capacity);
	let rx = mailbox.receiver();
	let cell = Arc::new(ActorCell {
		address,
		name: name.clone(),
		class,
		cancel,
		kill_reason: Mutex::new(None),
		exit: Mutex::new(None),
	});

	let (ref_tx, ref_rx) = oneshot::channel::<ActorRef<A::Msg>>();
	let (prelaunch_tx, prelaunch_rx) = oneshot::channel::<Result<(), String>>();

	let task = crate::spawn(class, async move {
		let Ok(self_ref) = ref_rx.await else {
			return;
		};
		let ctx = ActorContext { self_ref, runtime };
		run_actor(actor, rx, ctx, prelaunch_tx, watcher).await;
	});

	let actor_ref = ActorRef {
		cell,
		tx: mailbox.sender(),
		join_ctrl: Arc::new(ActorJoinCtrl::new(name.clone(), task)),
	};
	let _ = ref_tx.send(actor_ref.clone());

	match prelaunch_rx.await {
		Ok(Ok(())) => Ok(actor_ref),
		Ok(Err(reason)) => Err(SpawnError::Prelaunch { name, reason }),
		Err(_) => Err(SpawnError::Aborted { name }),
	}
}

/// Polls `fut`, converting a panic into its message.
async fn guarded<F: Future>(fut: F) -> Result<F::Output, String> {
	AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| crate::panic_message(&*payload))
}

async fn run_actor<A: Actor>(
	mut actor: A,
	rx: MailboxReceiver<A::Msg>,
	mut ctx: ActorContext<A::Msg>,
	prelaunch_tx: oneshot::Sender<Result<(), String>>,
	watcher: Option<TerminationNotifier>,
) {
	let cell = Arc::clone(&ctx.self_ref.cell);

	let prelaunch = match guarded(actor.prelaunch(&mut ctx)).await {
		Ok(res) => res,
		Err(panic) => Err(format!("panicked: {panic}")),
	};
	if let Err(reason) = prelaunch {
		rx.close();
		tracing::debug!(actor = %cell.name, address = %cell.address, %reason, "worker.actor.prelaunch_failed");
		let _ = prelaunch_tx.send(Err(reason));
		return;
	}
	let _ = prelaunch_tx.send(Ok(()));

	let reason = match guarded(actor.on_launch(&mut ctx)).await {
		Ok(Ok(())) => message_loop(&mut actor, &rx, &mut ctx, &cell).await,
		Ok(Err(err)) => ExitReason::LaunchFailed(err),
		Err(panic) => ExitReason::Panicked(panic),
	};
	rx.close();

	let exit = ActorExit::from(reason);
	if exit.kind() == ActorExitKind::Panicked {
		tracing::error!(actor = %cell.name, address = %cell.address, panic = ?exit.message(), "worker.actor.panicked");
	}
	if let Err(panic) = guarded(actor.on_kill(&exit, &mut ctx)).await {
		tracing::error!(actor = %cell.name, address = %cell.address, %panic, "worker.actor.on_kill_panicked");
	}

	*cell.exit.lock() = Some(exit.clone());
	tracing::debug!(
		actor = %cell.name,
		class = cell.class.as_str(),
		address = %cell.address,
		kind = ?exit.kind(),
		message = ?exit.message(),
		"worker.actor.exit"
	);

	if let Some(notify) = watcher {
		notify(Terminated {
			address: cell.address,
			name: cell.name.clone(),
			exit,
		})
		.await;
	}
}

async fn message_loop<A: Actor>(actor: &mut A, rx: &MailboxReceiver<A::Msg>, ctx: &mut ActorContext<A::Msg>, cell: &ActorCell) -> ExitReason {
	loop {
		// Immediate kills win over queued mail. Handlers are never preempted.
		let msg = tokio::select! {
			biased;
			_ = cell.cancel.cancelled() => return ExitReason::Killed(cell.kill_reason()),
			msg = rx.recv() => match msg {
				Some(msg) => msg,
				None => return ExitReason::Drained(cell.kill_reason()),
			},
		};

		match guarded(actor.handle(msg, ctx)).await {
			Ok(Ok(ActorFlow::Continue)) => {}
			Ok(Ok(ActorFlow::Stop)) => return ExitReason::Stopped,
			Ok(Err(err)) => return ExitReason::HandlerFailed(err),
			Err(panic) => return ExitReason::Panicked(panic),
		}
	}
}
