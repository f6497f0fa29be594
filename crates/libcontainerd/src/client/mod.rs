//! Runtime client facade
//!
//! Each operation lives in its own file. All of them share the same shape:
//! lock the container id, look the container up in the registry, call the
//! daemon, release the lock. Stats and pid queries skip the lock, pause and
//! resume release it before waiting for the daemon's confirmation.
#[allow(clippy::module_inception)]
mod client;
mod client_create;
mod client_events;
mod client_exec;
mod client_pause;
mod client_resize;
mod client_restore;
mod client_signal;
mod client_stats;

pub use client::Client;
