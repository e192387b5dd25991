//! Shared library surface for the PulseWay server binary and tests.

pub mod alerts;
pub mod api;
pub mod backoff;
pub mod config;
pub mod directory;
pub mod keyed_lock;
pub mod loops;
pub mod publisher;
pub mod registry;
pub mod routing;
pub mod state;
pub mod store;
