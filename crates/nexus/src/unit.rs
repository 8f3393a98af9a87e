//! Per-connection session unit.
//!
//! One unit owns one byte source end to end. Callbacks run on the unit's
//! actor task; blocking reads run on a dedicated thread that hands each
//! frame to the actor and then parks on a single-slot gate until the
//! actor has finished with it. At most one unprocessed frame is in flight.

use std::fmt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use nexus_worker::{Actor, ActorContext, ActorExit, ActorFlow, ActorRef, KillMode, TaskClass};
use tokio::sync::mpsc;

use crate::context::SessionContext;
use crate::error::ReadError;
use crate::handler::{SessionHandler, SessionHandlerFactory};
use crate::reader::{FrameReader, FrameReaderFactory};
use crate::registry::SessionRegistry;
use crate::stream::SessionStream;

/// Mail delivered to a session unit.
pub(crate) enum SessionMsg {
	/// One frame copied off the reader thread.
	Frame(Bytes),
}

const RUNNING: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Monotonic running, closing, closed flag shared with the reader thread.
#[derive(Debug, Default)]
pub(crate) struct LifecycleFlag(AtomicU8);

impl LifecycleFlag {
	pub(crate) fn is_running(&self) -> bool {
		self.0.load(Ordering::Acquire) == RUNNING
	}

	#[cfg(test)]
	pub(crate) fn is_closed(&self) -> bool {
		self.0.load(Ordering::Acquire) == CLOSED
	}

	/// Wins the right to tear down. Only the first caller gets `true`.
	pub(crate) fn begin_close(&self) -> bool {
		self.0.compare_exchange(RUNNING, CLOSING, Ordering::AcqRel, Ordering::Acquire).is_ok()
	}

	pub(crate) fn finish_close(&self) {
		self.0.store(CLOSED, Ordering::Release);
	}
}

pub(crate) struct SessionUnit {
	stream: Arc<SessionStream>,
	handler_factory: Arc<dyn SessionHandlerFactory>,
	reader_factory: Arc<dyn FrameReaderFactory>,
	registry: Arc<SessionRegistry>,
	flag: Arc<LifecycleFlag>,
	handler: Option<Box<dyn SessionHandler>>,
	reader: Option<Box<dyn FrameReader>>,
	session: Option<SessionContext>,
	gate: Option<mpsc::Sender<()>>,
}

impl SessionUnit {
	pub(crate) fn new(
		stream: Arc<SessionStream>,
		handler_factory: Arc<dyn SessionHandlerFactory>,
		reader_factory: Arc<dyn FrameReaderFactory>,
		registry: Arc<SessionRegistry>,
	) -> Self {
		Self {
			stream,
			handler_factory,
			reader_factory,
			registry,
			flag: Arc::new(LifecycleFlag::default()),
			handler: None,
			reader: None,
			session: None,
			gate: None,
		}
	}

	fn abandon_source(&self) {
		if let Err(err) = self.stream.close() {
			tracing::debug!(session_id = self.stream.identity(), error = %err, "session.close_failed");
		}
	}

	fn start_reader(&mut self, unit: ActorRef<SessionMsg>) -> Result<(), String> {
		let reader = self.reader.take().ok_or_else(|| "frame reader missing".to_string())?;
		let (gate_tx, gate_rx) = mpsc::channel(1);
		self.gate = Some(gate_tx);

		let flag = Arc::clone(&self.flag);
		let identity = self.stream.identity().to_string();
		let runtime = nexus_worker::runtime_handle();
		let thread_name = format!("nexus-read-{}", unit.address().get());
		nexus_worker::spawn_named_thread(TaskClass::IoBlocking, thread_name, move || {
			read_loop(reader, unit, gate_rx, flag, identity, runtime);
		})
		.map_err(|err| format!("spawn reader thread: {err}"))?;
		Ok(())
	}

	async fn teardown(&mut self, exit: &ActorExit) {
		if !self.flag.begin_close() {
			return;
		}
		if let (Some(handler), Some(session)) = (self.handler.as_mut(), self.session.as_ref())
			&& let Err(payload) = AssertUnwindSafe(handler.on_disconnect(session)).catch_unwind().await
		{
			tracing::error!(
				session_id = self.stream.identity(),
				panic = %nexus_worker::panic_message(&*payload),
				"session.on_disconnect_panicked"
			);
		}
		// Releases a reader parked on the gate.
		self.gate = None;
		self.abandon_source();
		self.flag.finish_close();
		tracing::debug!(session_id = self.stream.identity(), kind = ?exit.kind(), reason = ?exit.message(), "session.teardown");
	}
}

#[async_trait]
impl Actor for SessionUnit {
	type Msg = SessionMsg;

	/// Acquisition failures abort the spawn; the supervisor closes the source.
	async fn prelaunch(&mut self, ctx: &mut ActorContext<Self::Msg>) -> Result<(), String> {
		let handler = self
			.handler_factory
			.provide(self.stream.identity())
			.map_err(|err| format!("acquire session handler: {err}"))?;
		let reader = self
			.reader_factory
			.provide(self.stream.source())
			.map_err(|err| format!("acquire frame reader: {err}"))?;
		self.handler = Some(handler);
		self.reader = Some(reader);
		self.session = Some(SessionContext::new(Arc::clone(&self.stream), ctx.self_ref().clone(), Arc::clone(&self.registry)));
		Ok(())
	}

	async fn on_launch(&mut self, ctx: &mut ActorContext<Self::Msg>) -> Result<(), String> {
		if let (Some(handler), Some(session)) = (self.handler.as_mut(), self.session.as_ref()) {
			handler.on_connect(session).await;
		}
		self.start_reader(ctx.self_ref().clone())
	}

	async fn handle(&mut self, msg: Self::Msg, _ctx: &mut ActorContext<Self::Msg>) -> Result<ActorFlow, String> {
		match msg {
			SessionMsg::Frame(frame) => {
				if let (Some(handler), Some(session)) = (self.handler.as_mut(), self.session.as_ref()) {
					handler.on_message(session, &frame).await;
				}
				if self.flag.is_running()
					&& let Some(gate) = &self.gate
				{
					let _ = gate.try_send(());
				}
			}
		}
		Ok(ActorFlow::Continue)
	}

	async fn on_kill(&mut self, exit: &ActorExit, _ctx: &mut ActorContext<Self::Msg>) {
		self.teardown(exit).await;
	}
}

/// Why the reader thread stopped.
enum ReadEnd {
	Eof,
	Failed(io::Error),
	Panicked(String),
	Detached,
}

impl fmt::Display for ReadEnd {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Eof => write!(f, "end of stream"),
			Self::Failed(err) => write!(f, "read failed: {err}"),
			Self::Panicked(msg) => write!(f, "reader panicked: {msg}"),
			Self::Detached => write!(f, "session detached"),
		}
	}
}

fn read_loop(
	mut reader: Box<dyn FrameReader>,
	unit: ActorRef<SessionMsg>,
	mut gate: mpsc::Receiver<()>,
	flag: Arc<LifecycleFlag>,
	identity: String,
	runtime: tokio::runtime::Handle,
) {
	let end = std::panic::catch_unwind(AssertUnwindSafe(|| pump(&mut *reader, &unit, &mut gate, &flag, &runtime)))
		.unwrap_or_else(|payload| ReadEnd::Panicked(nexus_worker::panic_message(&*payload)));

	match &end {
		ReadEnd::Eof => tracing::debug!(session_id = %identity, "session.read.eof"),
		ReadEnd::Failed(err) => tracing::warn!(session_id = %identity, error = %err, "session.read.failed"),
		ReadEnd::Panicked(msg) => tracing::error!(session_id = %identity, panic = %msg, "session.read.panicked"),
		ReadEnd::Detached => tracing::trace!(session_id = %identity, "session.read.detached"),
	}
	unit.kill(KillMode::Immediate, end.to_string());
}

/// Consecutive empty frames tolerated before the reader counts as stalled.
const MAX_EMPTY_READS: usize = 64;

fn pump(
	reader: &mut dyn FrameReader,
	unit: &ActorRef<SessionMsg>,
	gate: &mut mpsc::Receiver<()>,
	flag: &LifecycleFlag,
	runtime: &tokio::runtime::Handle,
) -> ReadEnd {
	let mut empty_reads = 0;
	while flag.is_running() {
		let frame = match reader.read() {
			Ok([]) => {
				empty_reads += 1;
				if empty_reads >= MAX_EMPTY_READS {
					return ReadEnd::Failed(io::Error::other(format!("frame reader returned {empty_reads} empty frames in a row")));
				}
				tracing::trace!(empty_reads, "session.read.empty");
				std::thread::yield_now();
				continue;
			}
			Ok(data) => {
				empty_reads = 0;
				Bytes::copy_from_slice(data)
			}
			Err(ReadError::Eof) => return ReadEnd::Eof,
			Err(ReadError::Io(err)) => return ReadEnd::Failed(err),
		};
		if runtime.block_on(unit.send(SessionMsg::Frame(frame))).is_err() {
			return ReadEnd::Detached;
		}
		if gate.blocking_recv().is_none() {
			return ReadEnd::Detached;
		}
	}
	ReadEnd::Detached
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lifecycle_flag_is_monotonic() {
		let flag = LifecycleFlag::default();
		assert!(flag.is_running());
		assert!(flag.begin_close());
		assert!(!flag.begin_close(), "only the first caller may tear down");
		assert!(!flag.is_running());
		assert!(!flag.is_closed());
		flag.finish_close();
		assert!(flag.is_closed());
		assert!(!flag.begin_close());
	}

	#[test]
	fn concurrent_close_has_one_winner() {
		let flag = Arc::new(LifecycleFlag::default());
		let winners: usize = (0..8)
			.map(|_| {
				let flag = Arc::clone(&flag);
				std::thread::spawn(move || flag.begin_close())
			})
			.collect::<Vec<_>>()
			.into_iter()
			.map(|t| usize::from(t.join().unwrap_or(false)))
			.sum();
		assert_eq!(winners, 1);
	}
}
