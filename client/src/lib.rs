//! # Authority Client Library
//!
//! This library is the worker-side half of the private authority protocol. A
//! worker process holds one [`network::AuthorityClient`] and calls the five
//! authority verbs through it as if they were local functions.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - One persistent connection per worker, serialized behind a lock
//! - Reconnect and resend on refused, reset or half-closed connections
//! - A fixed retry budget (3 attempts, 100ms apart by default), after which
//!   the caller receives an error response instead of an `Err`
//!
//! ### Session Module (`session`)
//! - Opaque session tokens mapped to assigned player slots
//! - Idle expiry and a sweeper task that frees abandoned slots on the authority
//!
//! ### Worker Module (`worker`)
//! - The join / state / act / leave entry points a request adapter calls
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{AuthorityClient, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let authority = AuthorityClient::connect("127.0.0.1:9000", RetryPolicy::default()).await?;
//!     let response = authority.assign_player().await;
//!     println!("{:?}", response.player_id);
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod session;
pub mod worker;
