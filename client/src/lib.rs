//! # Echo Server Test Client
//!
//! Sends single-datagram text commands to the echo game server and reports
//! whatever it answers. Commands such as `READY` or `RESERVE 30` produce no
//! reply, so the client waits a bounded time and then reports silence.
//!
//! ```rust,no_run
//! use client::network::CommandClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CommandClient::new("127.0.0.1:7654", Duration::from_millis(500)).await?;
//!     if let Some(reply) = client.send("GAMESERVER").await? {
//!         println!("{}", reply);
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;
