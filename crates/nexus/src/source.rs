use std::io;

/// Bidirectional byte stream supplied by a transport.
///
/// Methods take `&self` so the reader thread, writers and teardown can use
/// one source concurrently. Implementations serialise internally where the
/// transport requires it.
pub trait ByteSource: Send + Sync + 'static {
	/// Stable identity of the logical session carried by this stream.
	fn identity(&self) -> &str;

	/// Blocking read. `Ok(0)` signals orderly end of stream.
	fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

	/// Writes some prefix of `buf`, returning how much was accepted.
	fn write(&self, buf: &[u8]) -> io::Result<usize>;

	/// Closes the stream and unblocks pending reads. Must be idempotent.
	fn close(&self) -> io::Result<()>;
}

/// Writes all of `buf`, retrying short and interrupted writes.
pub(crate) fn write_all(source: &dyn ByteSource, mut buf: &[u8]) -> io::Result<()> {
	while !buf.is_empty() {
		match source.write(buf) {
			Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "byte source accepted no data")),
			Ok(n) => buf = &buf[n..],
			Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
			Err(err) => return Err(err),
		}
	}
	Ok(())
}
