//! Frame extraction from a [`ByteSource`].
//!
//! A [`FrameReader`] hands out a view into its own buffer. The view lives
//! only until the next call, which the `&mut self` receiver enforces.

use std::io;
use std::sync::Arc;

use crate::error::{BoxError, ReadError};
use crate::source::ByteSource;

/// Read buffer size used when none is configured.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Pulls discrete chunks off one byte source.
///
/// Trailing data before end of stream is returned as an ordinary read; the
/// following call reports [`ReadError::Eof`]. Every other error is terminal.
pub trait FrameReader: Send {
	fn read(&mut self) -> Result<&[u8], ReadError>;
}

/// Reader over one reusable fixed-size buffer.
pub struct BufferedFrameReader {
	source: Arc<dyn ByteSource>,
	buf: Box<[u8]>,
	eof: bool,
}

impl BufferedFrameReader {
	pub fn new(source: Arc<dyn ByteSource>, buffer_size: usize) -> Self {
		Self {
			source,
			buf: vec![0; buffer_size.max(1)].into_boxed_slice(),
			eof: false,
		}
	}

	pub fn buffer_size(&self) -> usize {
		self.buf.len()
	}
}

impl FrameReader for BufferedFrameReader {
	fn read(&mut self) -> Result<&[u8], ReadError> {
		if self.eof {
			return Err(ReadError::Eof);
		}
		loop {
			match self.source.read(&mut self.buf) {
				Ok(0) => {
					self.eof = true;
					return Err(ReadError::Eof);
				}
				Ok(n) => return Ok(&self.buf[..n]),
				Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
				Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
					self.eof = true;
					return Err(ReadError::Eof);
				}
				Err(err) => return Err(ReadError::Io(err)),
			}
		}
	}
}

/// Produces one [`FrameReader`] per accepted byte source.
///
/// Implemented for closures, so a plain function can be passed where a
/// factory is expected.
pub trait FrameReaderFactory: Send + Sync + 'static {
	fn provide(&self, source: Arc<dyn ByteSource>) -> Result<Box<dyn FrameReader>, BoxError>;
}

impl<F> FrameReaderFactory for F
where
	F: Fn(Arc<dyn ByteSource>) -> Result<Box<dyn FrameReader>, BoxError> + Send + Sync + 'static,
{
	fn provide(&self, source: Arc<dyn ByteSource>) -> Result<Box<dyn FrameReader>, BoxError> {
		self(source)
	}
}

/// Factory for [`BufferedFrameReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedReaderFactory {
	buffer_size: usize,
}

impl BufferedReaderFactory {
	pub fn new(buffer_size: usize) -> Self {
		Self { buffer_size }
	}
}

impl Default for BufferedReaderFactory {
	fn default() -> Self {
		Self::new(DEFAULT_READ_BUFFER_SIZE)
	}
}

impl FrameReaderFactory for BufferedReaderFactory {
	fn provide(&self, source: Arc<dyn ByteSource>) -> Result<Box<dyn FrameReader>, BoxError> {
		Ok(Box::new(BufferedFrameReader::new(source, self.buffer_size)))
	}
}
