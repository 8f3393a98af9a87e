#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nexus::{BoxError, ByteSource, Nexus, SessionContext, SessionHandler, SessionHandlerFactory};
use nexus_worker::ActorRuntime;
use parking_lot::{Condvar, Mutex};

enum Chunk {
	Data(Vec<u8>),
	Eof,
	Fail(io::ErrorKind),
}

struct Script {
	queue: VecDeque<Chunk>,
	closed: bool,
}

/// In-memory byte source whose reads block until the test feeds them.
pub struct ScriptedSource {
	identity: String,
	script: Mutex<Script>,
	ready: Condvar,
	reads: AtomicUsize,
	closes: AtomicUsize,
	close_fails: bool,
	writes: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedSource {
	pub fn new(identity: &str) -> Arc<Self> {
		Self::build(identity, false)
	}

	/// Source whose `close` reports an error after recording the call.
	pub fn failing_close(identity: &str) -> Arc<Self> {
		Self::build(identity, true)
	}

	fn build(identity: &str, close_fails: bool) -> Arc<Self> {
		Arc::new(Self {
			identity: identity.to_string(),
			script: Mutex::new(Script {
				queue: VecDeque::new(),
				closed: false,
			}),
			ready: Condvar::new(),
			reads: AtomicUsize::new(0),
			closes: AtomicUsize::new(0),
			close_fails,
			writes: Mutex::new(Vec::new()),
		})
	}

	fn push(&self, chunk: Chunk) {
		self.script.lock().queue.push_back(chunk);
		self.ready.notify_all();
	}

	pub fn feed(&self, data: &[u8]) {
		self.push(Chunk::Data(data.to_vec()));
	}

	/// Queues an orderly end of stream.
	pub fn finish(&self) {
		self.push(Chunk::Eof);
	}

	pub fn fail(&self, kind: io::ErrorKind) {
		self.push(Chunk::Fail(kind));
	}

	pub fn read_calls(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}

	pub fn close_calls(&self) -> usize {
		self.closes.load(Ordering::SeqCst)
	}

	pub fn writes(&self) -> Vec<Vec<u8>> {
		self.writes.lock().clone()
	}

	pub fn as_source(self: &Arc<Self>) -> Arc<dyn ByteSource> {
		Arc::clone(self) as Arc<dyn ByteSource>
	}
}

impl ByteSource for ScriptedSource {
	fn identity(&self) -> &str {
		&self.identity
	}

	fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		let mut script = self.script.lock();
		loop {
			if let Some(chunk) = script.queue.pop_front() {
				return match chunk {
					Chunk::Data(data) => {
						let n = data.len().min(buf.len());
						buf[..n].copy_from_slice(&data[..n]);
						if n < data.len() {
							script.queue.push_front(Chunk::Data(data[n..].to_vec()));
						}
						Ok(n)
					}
					Chunk::Eof => Ok(0),
					Chunk::Fail(kind) => Err(io::Error::new(kind, "scripted failure")),
				};
			}
			if script.closed {
				return Ok(0);
			}
			self.ready.wait(&mut script);
		}
	}

	fn write(&self, buf: &[u8]) -> io::Result<usize> {
		if self.script.lock().closed {
			return Err(io::Error::new(io::ErrorKind::BrokenPipe, "source closed"));
		}
		self.writes.lock().push(buf.to_vec());
		Ok(buf.len())
	}

	fn close(&self) -> io::Result<()> {
		self.closes.fetch_add(1, Ordering::SeqCst);
		self.script.lock().closed = true;
		self.ready.notify_all();
		if self.close_fails {
			return Err(io::Error::new(io::ErrorKind::NotConnected, "scripted close failure"));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	Connected { identity: String, address: u64 },
	Message { identity: String, payload: Vec<u8> },
	Disconnected { identity: String, address: u64 },
}

/// Shared log of handler callbacks.
#[derive(Default)]
pub struct Journal {
	events: Mutex<Vec<Event>>,
}

impl Journal {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn push(&self, event: Event) {
		self.events.lock().push(event);
	}

	pub fn events(&self) -> Vec<Event> {
		self.events.lock().clone()
	}

	pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
		self.events.lock().iter().filter(|e| pred(e)).count()
	}

	pub fn messages(&self, identity: &str) -> Vec<Vec<u8>> {
		self.events
			.lock()
			.iter()
			.filter_map(|e| match e {
				Event::Message { identity: id, payload } if id == identity => Some(payload.clone()),
				_ => None,
			})
			.collect()
	}

	pub fn connected(&self, identity: &str) -> Vec<u64> {
		self.events
			.lock()
			.iter()
			.filter_map(|e| match e {
				Event::Connected { identity: id, address } if id == identity => Some(*address),
				_ => None,
			})
			.collect()
	}

	pub fn disconnected(&self, identity: &str) -> Vec<u64> {
		self.events
			.lock()
			.iter()
			.filter_map(|e| match e {
				Event::Disconnected { identity: id, address } if id == identity => Some(*address),
				_ => None,
			})
			.collect()
	}
}

/// Handler that journals every callback.
///
/// Payload `boom` panics, `close` closes the session, and `echo:<text>`
/// writes `<text>` back. Identities starting with `bad-connect` panic in
/// `on_connect` after journaling it.
pub struct JournalHandler {
	journal: Arc<Journal>,
}

#[async_trait]
impl SessionHandler for JournalHandler {
	async fn on_connect(&mut self, ctx: &SessionContext) {
		self.journal.push(Event::Connected {
			identity: ctx.identity().to_string(),
			address: ctx.address().get(),
		});
		if ctx.identity().starts_with("bad-connect") {
			panic!("connect exploded");
		}
	}

	async fn on_message(&mut self, ctx: &SessionContext, payload: &[u8]) {
		self.journal.push(Event::Message {
			identity: ctx.identity().to_string(),
			payload: payload.to_vec(),
		});
		match payload {
			b"boom" => panic!("handler exploded"),
			b"close" => ctx.close(),
			p if p.starts_with(b"echo:") => {
				let _ = ctx.send(&p[5..]);
			}
			_ => {}
		}
	}

	async fn on_disconnect(&mut self, ctx: &SessionContext) {
		self.journal.push(Event::Disconnected {
			identity: ctx.identity().to_string(),
			address: ctx.address().get(),
		});
	}
}

pub fn journal_factory(journal: &Arc<Journal>) -> impl SessionHandlerFactory {
	let journal = Arc::clone(journal);
	move |_identity: &str| -> Result<Box<dyn SessionHandler>, BoxError> {
		Ok(Box::new(JournalHandler {
			journal: Arc::clone(&journal),
		}))
	}
}

pub async fn start(journal: &Arc<Journal>) -> (ActorRuntime, Nexus) {
	let runtime = ActorRuntime::new();
	let nexus = Nexus::builder(journal_factory(journal)).start(&runtime).await.expect("nexus starts");
	(runtime, nexus)
}

/// Polls `cond` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(2);
	while !cond() {
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}
