//! Application state shared by handlers and loops.

pub mod store;

pub use store::AppState;
