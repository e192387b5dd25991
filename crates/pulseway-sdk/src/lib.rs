//! PulseWay SDK - vehicle and hospital integration library
//!
//! Provides the HTTP/WebSocket client for the dispatch server and the
//! on-vehicle location reporter that feeds it.

pub mod client;
pub mod reporter;

pub use client::{dispatch_error, PositionStream, PulseClient, ServerError};
pub use pulseway_core::{Coordinate, DispatchLink, VehiclePosition};
pub use reporter::{
    LocationProvider, LocationReporter, LocationSubscription, PermissionStatus, PositionSink,
    ReporterHandle, ReporterState, SimulatedProvider, WatchOptions,
};
