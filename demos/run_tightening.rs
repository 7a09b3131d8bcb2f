//! Tightening Monitor - example of a full controller session.
//!
//! This example demonstrates:
//! - Building a client with `Client::builder()`
//! - Selecting a parameter set
//! - Subscribing to tightening results and reading them from the event queue
//!
//! # Running
//!
//! ```text
//! cargo run --example run_tightening -- 192.168.1.20 5
//! ```
//!
//! Arguments are the controller host and the parameter set to select.
//! `RUST_LOG` overrides the log level.

use std::time::Duration;

use openprotocol_client::logging::{init_logging, LogFormat};
use openprotocol_client::message::{Message, TighteningResultSubscribe, TighteningResultUnsubscribe};
use openprotocol_client::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(2, LogFormat::Text)?;

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let pset: u16 = args.next().map(|a| a.parse()).transpose()?.unwrap_or(1);

    let client = Client::builder()
        .host(host)
        .keepalive_interval(Duration::from_secs(10))
        .build();

    client.connect().await?;
    client.select_parameter_set(pset).await?;
    client.subscribe::<TighteningResultSubscribe>().await?;
    println!("Waiting for tightenings, Ctrl-C to stop");

    loop {
        tokio::select! {
            event = client.get_subscription() => match event? {
                Message::TighteningResult(result) => println!(
                    "{} pset {} torque {:.2} {} angle {} -> {}",
                    result.timestamp,
                    result.pset_number,
                    result.torque,
                    result.torque_value_unit,
                    result.angle,
                    if result.is_ok() { "OK" } else { "NOK" },
                ),
                other => println!("event MID {}", other.mid()),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.unsubscribe::<TighteningResultUnsubscribe>(true).await?;
    client.disconnect().await?;
    Ok(())
}
