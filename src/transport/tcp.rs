//! Open Protocol over TCP.
//!
//! The stream is split so the dispatch loop can wait on the read half while
//! requests are written on the other. Incoming bytes are reassembled into
//! frames with [`FrameBuffer`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use openprotocol_client::transport::{TcpTransport, Transport};
//!
//! # async fn run() -> openprotocol_client::Result<()> {
//! let transport = TcpTransport::new("192.168.1.20:4545");
//! transport.connect(Duration::from_secs(5)).await?;
//! let frame = transport.receive().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::Transport;
use crate::error::{OpenProtocolError, Result};
use crate::protocol::FrameBuffer;

/// Socket read size.
const READ_BUFFER_SIZE: usize = 8 * 1024;

struct ReadState {
    half: OwnedReadHalf,
    frames: FrameBuffer,
    ready: VecDeque<Bytes>,
    buf: Vec<u8>,
}

/// TCP transport to a single controller.
pub struct TcpTransport {
    addr: String,
    reader: Mutex<Option<ReadState>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpTransport {
    /// Create a transport for `addr` (`host:port`). Nothing is opened yet.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Target address.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, timeout: Duration) -> Result<()> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(OpenProtocolError::Connection(format!(
                    "Failed to connect to {}: {}",
                    self.addr, e
                )))
            }
            Err(_) => {
                return Err(OpenProtocolError::Connection(format!(
                    "Timed out connecting to {} after {:?}",
                    self.addr, timeout
                )))
            }
        };
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(ReadState {
            half: read_half,
            frames: FrameBuffer::new(),
            ready: VecDeque::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
        });
        *self.writer.lock().await = Some(write_half);

        tracing::debug!("Connected to {}", self.addr);
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(OpenProtocolError::NotConnected)?;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Bytes> {
        let mut guard = self.reader.lock().await;
        let state = guard.as_mut().ok_or(OpenProtocolError::NotConnected)?;

        loop {
            if let Some(frame) = state.ready.pop_front() {
                return Ok(frame);
            }

            let n = state.half.read(&mut state.buf).await?;
            if n == 0 {
                return Err(OpenProtocolError::ConnectionClosed);
            }
            let frames = state.frames.push(&state.buf[..n])?;
            state.ready.extend(frames);
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Shutdown of {} failed: {}", self.addr, e);
            }
        }
        self.reader.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, Frame, Header};
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_receive_reassembles_split_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut bytes = build_frame(&Header::new(5, 1), "0018").unwrap();
            bytes.push(0);
            bytes.extend(build_frame(&Header::new(9999, 1), "").unwrap());
            bytes.push(0);

            socket.write_all(&bytes[..7]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(&bytes[7..]).await.unwrap();

            let mut received = vec![0u8; 20];
            socket.read_exact(&mut received).await.unwrap();
            received
        });

        let transport = TcpTransport::new(addr.to_string());
        transport.connect(TIMEOUT).await.unwrap();

        let first = Frame::decode(&transport.receive().await.unwrap()).unwrap();
        assert_eq!(first.mid(), 5);
        assert_eq!(first.payload(), "0018");
        let second = Frame::decode(&transport.receive().await.unwrap()).unwrap();
        assert_eq!(second.mid(), 9999);

        let start = build_frame(&Header::new(1, 3), "").unwrap();
        transport.send(&start).await.unwrap();
        assert_eq!(server.await.unwrap(), start);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let transport = TcpTransport::new(addr.to_string());
        transport.connect(TIMEOUT).await.unwrap();
        server.await.unwrap();

        let err = transport.receive().await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_not_connected() {
        let transport = TcpTransport::new("127.0.0.1:1");
        assert!(matches!(
            transport.send(b"0020").await,
            Err(OpenProtocolError::NotConnected)
        ));
        assert!(matches!(
            transport.receive().await,
            Err(OpenProtocolError::NotConnected)
        ));
        // Closing an unopened transport is fine.
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new(addr.to_string());
        let err = transport.connect(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, OpenProtocolError::Connection(_)));
    }
}
