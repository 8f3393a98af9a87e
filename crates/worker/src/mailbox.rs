use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::SendError;

struct MailboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct MailboxInner<T> {
	capacity: usize,
	state: Mutex<MailboxState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
}

/// Multi-producer actor mailbox sender.
pub struct MailboxSender<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Actor mailbox receiver.
pub struct MailboxReceiver<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Bounded FIFO mailbox with backpressure.
///
/// Senders wait for capacity instead of dropping. Closing is synchronous and
/// wakes every parked sender and receiver; receivers keep draining queued
/// items and only then observe `None`.
pub struct Mailbox<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Clone for MailboxReceiver<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Mailbox<T> {
	/// Creates a bounded mailbox. Zero capacity is raised to one.
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			inner: Arc::new(MailboxInner {
				capacity,
				state: Mutex::new(MailboxState {
					queue: VecDeque::with_capacity(capacity),
					closed: false,
				}),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
		}
	}

	/// Returns a sender handle.
	pub fn sender(&self) -> MailboxSender<T> {
		MailboxSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Returns a receiver handle.
	pub fn receiver(&self) -> MailboxReceiver<T> {
		MailboxReceiver {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> MailboxInner<T> {
	fn close(&self) -> bool {
		let newly_closed = {
			let mut state = self.state.lock();
			!std::mem::replace(&mut state.closed, true)
		};
		if newly_closed {
			self.notify_recv.notify_waiters();
			self.notify_send.notify_waiters();
		}
		newly_closed
	}

	fn len(&self) -> usize {
		self.state.lock().queue.len()
	}

	fn is_closed(&self) -> bool {
		self.state.lock().closed
	}
}

impl<T> MailboxSender<T> {
	/// Closes the mailbox. Returns `true` for the call that performed the close.
	pub fn close(&self) -> bool {
		self.inner.close()
	}

	/// Non-blocking enqueue.
	pub fn try_send(&self, msg: T) -> Result<(), SendError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(SendError::Closed);
		}
		if state.queue.len() >= self.inner.capacity {
			return Err(SendError::Full);
		}
		state.queue.push_back(msg);
		drop(state);
		self.inner.notify_recv.notify_one();
		Ok(())
	}

	/// Enqueues, waiting for capacity while the mailbox is full.
	pub async fn send(&self, msg: T) -> Result<(), SendError> {
		loop {
			// Enabled before the capacity check so a pop or close between
			// unlock and await still wakes us.
			let notified = self.inner.notify_send.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			{
				let mut state = self.inner.state.lock();
				if state.closed {
					return Err(SendError::Closed);
				}
				if state.queue.len() < self.inner.capacity {
					state.queue.push_back(msg);
					drop(state);
					self.inner.notify_recv.notify_one();
					return Ok(());
				}
			}
			notified.await;
		}
	}

	/// Returns current queue length.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns `true` when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns `true` once the mailbox has been closed.
	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	/// Returns queue capacity.
	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}
}

impl<T> MailboxReceiver<T> {
	/// Receives one message. Returns `None` once the mailbox is closed and drained.
	pub async fn recv(&self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			{
				let mut state = self.inner.state.lock();
				if let Some(msg) = state.queue.pop_front() {
					drop(state);
					self.inner.notify_send.notify_one();
					return Some(msg);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Closes the mailbox from the receiving side.
	pub fn close(&self) -> bool {
		self.inner.close()
	}

	/// Returns current queue length.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns `true` when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
