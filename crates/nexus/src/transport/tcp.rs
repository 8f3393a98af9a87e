use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::source::ByteSource;

/// [`ByteSource`] over a blocking TCP stream.
///
/// The identity defaults to the peer address. Closing shuts both halves
/// down, which also wakes a reader blocked in `read`.
#[derive(Debug)]
pub struct TcpByteSource {
	stream: TcpStream,
	identity: String,
	closed: AtomicBool,
}

impl TcpByteSource {
	/// Wraps `stream`, naming the session after the peer address.
	pub fn new(stream: TcpStream) -> io::Result<Self> {
		let peer = stream.peer_addr()?;
		Ok(Self::with_identity(stream, peer.to_string()))
	}

	/// Wraps `stream` under an explicit identity.
	pub fn with_identity(stream: TcpStream, identity: impl Into<String>) -> Self {
		Self {
			stream,
			identity: identity.into(),
			closed: AtomicBool::new(false),
		}
	}

	pub fn peer_addr(&self) -> io::Result<SocketAddr> {
		self.stream.peer_addr()
	}
}

impl ByteSource for TcpByteSource {
	fn identity(&self) -> &str {
		&self.identity
	}

	fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
		(&self.stream).read(buf)
	}

	fn write(&self, buf: &[u8]) -> io::Result<usize> {
		(&self.stream).write(buf)
	}

	fn close(&self) -> io::Result<()> {
		if self.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		match self.stream.shutdown(Shutdown::Both) {
			Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
			_ => Ok(()),
		}
	}
}
