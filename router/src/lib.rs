//! # Sticky Router
//!
//! Public entry point in front of the worker pool. Each client IP is pinned to
//! one worker on first contact so that its session token keeps landing on the
//! process that issued it.
//!
//! ## Behavior
//!
//! - New clients are assigned round-robin over the configured workers.
//! - A pinned client always goes back to the same worker while it answers.
//! - When the pinned worker refuses the connection, the pin is dropped and the
//!   client connection is closed; the next connection picks a fresh worker.
//! - A connect timeout closes the client connection but keeps the pin.
//! - Once connected, bytes are relayed unchanged in both directions until either
//!   side closes, after which both sockets are shut down.
//!
//! ## Module Organization
//!
//! ### Affinity Module (`affinity`)
//! Backend addresses and the IP-to-backend table.
//!
//! ### Proxy Module (`proxy`)
//! Accept loop, worker dialing with timeout, and the two-way relay.

pub mod affinity;
pub mod proxy;
