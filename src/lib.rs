//! # openprotocol-client
//!
//! Async client for the Open Protocol spoken by tightening controllers.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): ASCII frames with a 4-digit length prefix and
//!   a fixed 20-byte header
//! - **Parser** ([`parser`]): declarative fixed-width field tables per revision
//! - **Messages** ([`message`]): typed MIDs and a registry keyed by MID and revision
//! - **Transport** ([`transport`]): TCP or in-memory byte streams
//! - **Client** ([`Client`]): handshake, one request at a time, subscribed
//!   events with automatic acknowledge
//!
//! ## Example
//!
//! ```no_run
//! use openprotocol_client::message::TighteningResultSubscribe;
//! use openprotocol_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> openprotocol_client::Result<()> {
//!     let client = Client::builder().host("192.168.1.20").port(4545).build();
//!     client.connect().await?;
//!     client.subscribe::<TighteningResultSubscribe>().await?;
//!
//!     loop {
//!         let event = client.get_subscription().await?;
//!         println!("{:?}", event);
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod parser;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{Client, ClientBuilder, SessionState};
pub use config::ClientConfig;
pub use error::{OpenProtocolError, Result};
pub use message::{Message, MessageRegistry};
pub use transport::Transport;
