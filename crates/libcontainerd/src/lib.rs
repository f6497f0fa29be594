//! Client side of a container supervisor daemon: drives containers through
//! the daemon's RPC surface and reconciles the events it emits with the
//! in-process view of live containers.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

#[cfg(test)]
#[macro_use]
extern crate mockall;

pub mod backend;
pub mod client;
pub mod config;
pub mod container;
pub mod error;
pub mod lock;
pub mod observability;
pub mod pause_monitor;
pub mod registry;
pub mod remote;
pub mod signal;
pub mod stats;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
