//! Byte sources for concrete transports.

mod tcp;

pub use tcp::TcpByteSource;
