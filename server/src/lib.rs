//! # Game State Authority
//!
//! This library provides the single authoritative copy of the Dots and Boxes
//! match. Every worker process talks to it over a private length-prefixed
//! protocol, and every mutation of the match goes through it.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The authority owns exactly one [`game::MatchState`]. Workers never hold a
//! copy of their own; they ask for snapshots and submit commands.
//!
//! ### Serialized Access
//! All five verbs (`get_state`, `assign_player`, `player_disconnected`,
//! `process_command`, `update`) run under one exclusive lock, so concurrent
//! requests from different workers are linearized. A snapshot never observes
//! a half-applied move. No I/O happens while the lock is held.
//!
//! ### Timed Transitions
//! A dedicated ticker task calls `update` at a fixed interval (100ms by
//! default) so countdowns expire and finished matches return to the lobby
//! even when no worker is sending requests.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Pure match logic with no I/O:
//! - Board geometry and move legality
//! - Box claiming and the extra-turn rule
//! - Lobby, countdown, pause and finish lifecycle
//!
//! ### Network Module (`network`)
//! TCP plumbing around the match:
//! - One task per worker connection
//! - Frame decoding, dispatch and error replies
//! - The periodic update ticker
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("127.0.0.1:9000", Duration::from_millis(100)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Isolation
//!
//! A malformed request is answered with an error response and the connection
//! stays open. A broken stream only ends the task serving that worker.

pub mod game;
pub mod network;
