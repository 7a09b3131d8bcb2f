//! In-memory transport pair.
//!
//! Each send on one end arrives as one frame on the other. Used to drive the
//! client against a scripted controller without sockets.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::Transport;
use crate::error::{OpenProtocolError, Result};

/// One end of an in-memory frame pipe.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl ChannelTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(tx: mpsc::UnboundedSender<Bytes>, rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Take a frame if one is already waiting.
    pub fn try_receive(&self) -> Option<Bytes> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Check whether this end has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self, _timeout: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(OpenProtocolError::Connection(
                "channel transport cannot be reopened".to_string(),
            ));
        }
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or(OpenProtocolError::ConnectionClosed)?;
        tx.send(Bytes::copy_from_slice(frame))
            .map_err(|_| OpenProtocolError::ConnectionClosed)
    }

    async fn receive(&self) -> Result<Bytes> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(OpenProtocolError::ConnectionClosed)
    }

    async fn close(&self) -> Result<()> {
        // Dropping the sender ends the peer's receive.
        self.tx.lock().take();
        Ok(())
    }
}
