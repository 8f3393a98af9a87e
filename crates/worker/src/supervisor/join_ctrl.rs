use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Join coordination for one actor task.
///
/// Any number of `ActorRef` clones may join concurrently: the first caller
/// becomes the leader that awaits the handle, the rest park on `done`.
enum JoinState {
	/// Task handle not yet claimed.
	Handle(JoinHandle<()>),
	/// A leader is awaiting the handle.
	Joining,
	/// Task has completed.
	Done,
}

pub(super) struct ActorJoinCtrl {
	actor: String,
	state: Mutex<JoinState>,
	done: Notify,
}

impl ActorJoinCtrl {
	pub(super) fn new(actor: String, handle: JoinHandle<()>) -> Self {
		Self {
			actor,
			state: Mutex::new(JoinState::Handle(handle)),
			done: Notify::new(),
		}
	}

	fn finish(&self, res: Result<(), tokio::task::JoinError>) {
		if let Err(err) = res
			&& let Some(msg) = crate::join_error_panic_message(err)
		{
			tracing::error!(actor = %self.actor, panic = %msg, "worker.actor.task_panicked");
		}
	}

	/// Waits until the actor task has finished.
	pub(super) async fn join_forever(&self) {
		loop {
			let maybe_handle = {
				let mut st = self.state.lock().await;
				match &*st {
					JoinState::Done => return,
					JoinState::Joining => {
						// Registered under the lock so the leader's notify cannot slip past.
						let notified = self.done.notified();
						drop(st);
						notified.await;
						continue;
					}
					JoinState::Handle(_) => {
						let JoinState::Handle(h) = std::mem::replace(&mut *st, JoinState::Joining) else {
							unreachable!()
						};
						Some(h)
					}
				}
			};
			if let Some(h) = maybe_handle {
				self.finish(h.await);
				*self.state.lock().await = JoinState::Done;
				self.done.notify_waiters();
				return;
			}
		}
	}

	/// Joins with a deadline. Returns `true` if the task completed in time.
	pub(super) async fn join_with_timeout(&self, timeout: Duration) -> bool {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let maybe_handle = {
				let mut st = self.state.lock().await;
				match &*st {
					JoinState::Done => return true,
					JoinState::Joining => {
						let notified = self.done.notified();
						drop(st);
						tokio::select! {
							_ = notified => continue,
							_ = tokio::time::sleep_until(deadline) => return false,
						}
					}
					JoinState::Handle(_) => {
						let JoinState::Handle(h) = std::mem::replace(&mut *st, JoinState::Joining) else {
							unreachable!()
						};
						Some(h)
					}
				}
			};
			if let Some(mut h) = maybe_handle {
				tokio::select! {
					res = &mut h => {
						self.finish(res);
						*self.state.lock().await = JoinState::Done;
						self.done.notify_waiters();
						return true;
					}
					_ = tokio::time::sleep_until(deadline) => {
						// Hand the task back for the next joiner.
						*self.state.lock().await = JoinState::Handle(h);
						self.done.notify_waiters();
						return false;
					}
				}
			}
		}
	}
}
