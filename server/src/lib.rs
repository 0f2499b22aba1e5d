//! # Echo Game Server Library
//!
//! A game server that cooperates with the orchestrator's local sidecar over
//! HTTP, and exposes its own lifecycle to test clients over a plain-text UDP
//! protocol.
//!
//! ## Core Responsibilities
//!
//! ### Sidecar Cooperation
//! The sidecar decides when this process is healthy, ready, allocated or
//! reserved. The server reports health on a fixed interval and asks for
//! lifecycle transitions on demand. Every call goes through the same retry
//! and circuit-breaker policy, and failures are reported as `false` rather
//! than raised.
//!
//! ### Command Handling
//! Test clients drive the server with one command per datagram:
//! `EXIT`, `UNHEALTHY`, `GAMESERVER`, `READY`, `ALLOCATE`, `RESERVE <secs>`,
//! `WATCH`, `LABEL [key value]`, `ANNOTATION [key value]` and `CRASH`.
//! Anything else is echoed back as `ACK: <text>`.
//!
//! ## Architecture Design
//!
//! Two long-lived tasks share one sidecar client:
//! - **Health Reporter** (`health`): pings the sidecar until UNHEALTHY turns
//!   it off or the process is cancelled
//! - **UDP Server** (`network`): receives a datagram, dispatches it, replies,
//!   then receives the next one
//!
//! The only state they share is [`health::ReporterState`], a pair of atomics.
//! Both loops observe a single `CancellationToken` and return
//! [`error::ServerError::Cancelled`] when it fires.
//!
//! ## Module Organization
//!
//! - `config`: plain configuration structs with defaults
//! - `error`: sidecar and server error types
//! - `resilience`: retry back-off and the circuit breaker
//! - `sdk`: the [`sdk::SidecarApi`] trait and its HTTP client
//! - `health`: the health reporter
//! - `commands`: command dispatch
//! - `network`: the UDP server loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::commands::Dispatcher;
//! use server::config::SidecarConfig;
//! use server::health::ReporterState;
//! use server::network::Server;
//! use server::sdk::{SidecarApi, SidecarClient};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sidecar: Arc<dyn SidecarApi> = Arc::new(SidecarClient::new(SidecarConfig::default())?);
//!     let state = Arc::new(ReporterState::new());
//!     let dispatcher = Dispatcher::new(Arc::clone(&sidecar), state);
//!
//!     let server = Server::bind("0.0.0.0:7654", sidecar, dispatcher).await?;
//!     let exit = server.run(CancellationToken::new()).await?;
//!     std::process::exit(exit.code());
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod health;
pub mod network;
pub mod resilience;
pub mod sdk;

#[cfg(test)]
mod testing;
