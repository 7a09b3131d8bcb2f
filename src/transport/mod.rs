//! Transport module - byte-stream plumbing under the session client.
//!
//! Provides:
//! - [`Transport`]: the contract the client drives (connect, send, receive, close)
//! - [`TcpTransport`]: Open Protocol over TCP
//! - [`ChannelTransport`]: in-memory pair for tests and controller simulation
//!
//! `receive` yields exactly one complete frame, length prefix included.
//! Implementations must make `receive` cancel safe: the dispatch loop races
//! it against shutdown.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

mod channel;
mod tcp;

pub use channel::ChannelTransport;
pub use tcp::TcpTransport;

/// Byte-stream transport carrying whole frames.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the connection, giving up after `timeout`.
    async fn connect(&self, timeout: Duration) -> Result<()>;

    /// Write one encoded frame.
    async fn send(&self, frame: &[u8]) -> Result<()>;

    /// Read the next complete frame.
    async fn receive(&self) -> Result<Bytes>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}
