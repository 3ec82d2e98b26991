//! # Shared State Server Library
//!
//! This library provides the authoritative server for the shared bath: one
//! fill level and one temperature that every connected peer can observe and
//! change. The server holds the only correct copy of that state and pushes
//! every change to all peers.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! [`store::StateStore`] applies each action with the clamp rule from the
//! `shared` crate and reports whether anything moved. Only real changes are
//! broadcast.
//!
//! ### Presence
//! [`presence::PresenceRegistry`] tracks the distinct anonymised identities
//! currently connected. Identities come from [`identity::mask_ip`], so two
//! connections from the same host count as one user.
//!
//! ### Connection Lifecycle
//! [`client_manager::ClientManager`] drives each connection through
//! `Connecting → Active → Closed`. A connection receives its `Init` handshake
//! before it becomes eligible for any broadcast.
//!
//! ### Broadcasting
//! [`broadcast`] fans `Update` and `UpdateUserList` packets out to every
//! active connection, best-effort.
//!
//! ## Architecture Design
//!
//! ### Single Serializer
//! All network tasks forward events over one channel to the loop in
//! [`network::Server::run`], which is the only code that mutates state,
//! presence or the connection table. Actions therefore never interleave and
//! need no locking.
//!
//! ### TCP Transport
//! Each peer holds one TCP connection carrying length-prefixed bincode
//! frames (see `shared::codec`). A reader task and a writer task per
//! connection handle I/O concurrently with the main loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:3000").await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod identity;
pub mod network;
pub mod presence;
pub mod store;
