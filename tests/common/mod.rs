//! Simulated controller for end-to-end tests.
//!
//! Listens on loopback TCP, answers the session MIDs the way a controller
//! does and lets a test push arbitrary bytes. Every frame it writes is
//! followed by a NUL terminator.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use openprotocol_client::message::{
    CommunicationStartAck, KeepAlive, Message, NegativeAck, PositiveAck,
};
use openprotocol_client::protocol::{Frame, FrameBuffer, Header};
use openprotocol_client::{Client, ClientConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(2);

/// Revision 1 tightening payload: status OK, pset 1, torque 1.20.
pub fn rev1_payload() -> String {
    let mut payload = vec![b' '; 175];
    let mut put = |at: usize, text: &str| {
        payload[at..at + text.len()].copy_from_slice(text.as_bytes());
    };
    put(0, "010001");
    put(6, "0201");
    put(10, "03");
    put(12, "Test controller");
    put(70, "001");
    put(85, "091");
    put(88, "101");
    put(93, "1");
    put(120, "000120");
    put(156, "2024-01-02:03:04:05");
    String::from_utf8(payload).unwrap()
}

pub fn rev1_frame() -> Vec<u8> {
    Frame::new(Header::new(61, 1), &rev1_payload())
        .unwrap()
        .into_bytes()
}

/// Revision 5 tightening result as captured from a controller (no-ack flag set).
pub const REV5_FRAME: &[u8] = concat!(
    "050600610051        010000020003STa 6000                 04                         ",
    "0500000600507180800000090000100000110122130141151161171181191200000000000210007502200750023000000240000002500000260999927000002800000290000030000003100000320003300034000350000003600000037000000380000003900000040000000410000000532420000043000004442250888      ",
    "452023-05-15:21:35:0546                   47QuickPset 5              481490150                         51                         52                         530000\0",
)
.as_bytes();

enum Command {
    Push(Vec<u8>),
    Close,
}

pub struct SimulatedController {
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
    received: Mutex<mpsc::UnboundedReceiver<u16>>,
    handle: JoinHandle<()>,
}

impl SimulatedController {
    /// Start with the default replies.
    pub async fn start() -> Self {
        Self::start_with(HashMap::new()).await
    }

    /// Start with replies overridden per MID; `None` means stay silent.
    pub async fn start_with(overrides: HashMap<u16, Option<Message>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();

        let handle = tokio::spawn(serve(listener, overrides, commands_rx, received_tx));

        Self {
            addr,
            commands,
            received: Mutex::new(received),
            handle,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            handshake_timeout: WAIT,
            request_timeout: WAIT,
            error_backoff: Duration::from_millis(10),
            ..ClientConfig::default()
        }
    }

    pub fn client(&self) -> Client {
        Client::builder().config(self.config()).build()
    }

    /// Write raw bytes to the client.
    pub fn push(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.commands.send(Command::Push(bytes.into()));
    }

    /// Write one frame followed by the NUL terminator.
    pub fn push_frame(&self, frame: &[u8]) {
        let mut bytes = frame.to_vec();
        bytes.push(0);
        self.push(bytes);
    }

    /// Drop the connection.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Wait until the client has sent `mid`, skipping anything before it.
    pub async fn expect_received(&self, mid: u16) {
        let mut received = self.received.lock().await;
        let found = tokio::time::timeout(WAIT, async {
            while let Some(got) = received.recv().await {
                if got == mid {
                    return true;
                }
            }
            false
        })
        .await;
        assert!(matches!(found, Ok(true)), "client never sent MID {mid}");
    }

    /// MIDs received so far that nobody has waited for.
    pub async fn drain_received(&self) -> Vec<u16> {
        let mut received = self.received.lock().await;
        let mut mids = Vec::new();
        while let Ok(mid) = received.try_recv() {
            mids.push(mid);
        }
        mids
    }
}

impl Drop for SimulatedController {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn default_reply(mid: u16) -> Option<Message> {
    match mid {
        1 => Some(
            CommunicationStartAck {
                revision: 1,
                cell_id: 1,
                channel_id: 1,
                controller_name: "Simulated".to_string(),
                supplier_code: "SIM".to_string(),
                ..CommunicationStartAck::default()
            }
            .into(),
        ),
        3 | 18 | 60 | 63 => Some(PositiveAck::new(mid).into()),
        9999 => Some(KeepAlive::default().into()),
        62 => None,
        other => Some(NegativeAck::new(other, 99).into()),
    }
}

async fn serve(
    listener: TcpListener,
    overrides: HashMap<u16, Option<Message>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    received: mpsc::UnboundedSender<u16>,
) {
    let Ok((mut socket, _)) = listener.accept().await else {
        return;
    };
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Push(bytes)) => {
                    if socket.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                Some(Command::Close) | None => return,
            },
            read = socket.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for raw in frames.push(&buf[..n]).unwrap() {
                    let frame = Frame::decode(&raw).unwrap();
                    let mid = frame.mid();
                    let _ = received.send(mid);

                    let reply = match overrides.get(&mid) {
                        Some(reply) => reply.clone(),
                        None => default_reply(mid),
                    };
                    if let Some(reply) = reply {
                        let mut bytes = reply.to_frame().unwrap().into_bytes();
                        bytes.push(0);
                        if socket.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
