//! # Shared State Client Library
//!
//! This library provides the peer side of the shared bath: a local copy of
//! the fill level and temperature that either mirrors the server or runs on
//! its own.
//!
//! ## Architecture Overview
//!
//! ### Replica Mode
//! While connected, the client never changes its copy by itself. Actions are
//! sent to the server, and the copy is overwritten by every `Update` the
//! server broadcasts, including the ones caused by this client. A new
//! connection always starts from the server's `Init` handshake.
//!
//! ### Local-Simulation Mode
//! While disconnected, actions are applied directly with the same clamp rule
//! the server uses (`shared::SharedState::apply`). The copy may diverge from
//! the server; it is simply replaced by the next handshake when the client
//! goes back online.
//!
//! ## Module Organization
//!
//! ### Replica Module (`replica`)
//! The dual-mode state holder. Pure and synchronous, so every mode
//! transition can be tested without a network.
//!
//! ### Network Module (`network`)
//! Owns the TCP connection, tags every received packet with a connection
//! epoch and drops packets from connections that were already torn down.
//!
//! ### Console Module (`console`)
//! Command parsing for the terminal front end and the one-line status view.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::Action;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::new("127.0.0.1:3000");
//! client.go_online().await?;
//!
//! // wait for the handshake
//! while client.replica().state().is_none() {
//!     client.poll_event().await;
//! }
//!
//! client.dispatch(Action::Fill).await;
//! client.poll_event().await;
//! println!("{:?}", client.replica().state());
//! # Ok(())
//! # }
//! ```

pub mod console;
pub mod network;
pub mod replica;
