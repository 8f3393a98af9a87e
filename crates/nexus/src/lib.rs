//! Supervised per-connection session runtime.
//!
//! A [`Nexus`] adopts raw [`ByteSource`] connections, runs each one as an
//! isolated session unit with strictly ordered, backpressured delivery to a
//! [`SessionHandler`], and keeps every live session in a shared
//! [`SessionRegistry`] keyed by identity. A connection presenting an
//! identity already in use replaces the older session.

mod context;
mod error;
mod handler;
mod options;
mod reader;
mod registry;
mod service;
mod source;
mod stream;
mod supervisor;
pub mod transport;
mod unit;

pub use context::SessionContext;
pub use error::{BoxError, NexusError, ReadError, Result, SendError};
pub use handler::{SessionHandler, SessionHandlerFactory};
pub use options::{DEFAULT_SESSION_MAILBOX, DEFAULT_SUPERVISOR_MAILBOX, NexusOptions};
pub use reader::{BufferedFrameReader, BufferedReaderFactory, DEFAULT_READ_BUFFER_SIZE, FrameReader, FrameReaderFactory};
pub use registry::{SendErrorHandler, SendFlow, SessionHandle, SessionOperator, SessionRegistry};
pub use service::{Nexus, NexusBuilder};
pub use source::ByteSource;
