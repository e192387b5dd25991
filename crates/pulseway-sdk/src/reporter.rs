//! On-vehicle location reporter.
//!
//! One reporter runs per vehicle session and moves through
//! `Idle -> AwaitingPermission -> Reporting -> Stopped`. Once reporting, a
//! sample is taken immediately and then whenever the cadence ticks or the
//! vehicle has moved far enough, whichever comes first. Every accepted
//! sample replaces the cached position and is published on its own task.
//! Publishes are never retried and stopping the reporter does not cancel
//! one already in flight.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pulseway_core::{distance_m, Coordinate, DispatchError, VehiclePosition};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const WATCH_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Idle,
    AwaitingPermission,
    Reporting,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Cadence and movement filter for a position watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub time_interval: Duration,
    pub distance_interval_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            time_interval: Duration::from_secs(5),
            distance_interval_m: 1.0,
        }
    }
}

/// Cancellable stream of coordinates. Dropping it ends the watch.
pub struct LocationSubscription {
    rx: mpsc::Receiver<Coordinate>,
}

impl LocationSubscription {
    pub fn new(rx: mpsc::Receiver<Coordinate>) -> Self {
        Self { rx }
    }

    /// `None` once the provider stops delivering.
    pub async fn next(&mut self) -> Option<Coordinate> {
        self.rx.recv().await
    }
}

/// Platform location source.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    async fn current_position(&self) -> Result<Coordinate, DispatchError>;

    async fn watch_position(&self, options: WatchOptions)
        -> Result<LocationSubscription, DispatchError>;
}

/// Destination for accepted samples.
#[async_trait]
pub trait PositionSink: Send + Sync {
    async fn publish(&self, position: &VehiclePosition) -> Result<(), DispatchError>;
}

type SharedPosition = Arc<Mutex<Option<VehiclePosition>>>;

fn read_position(shared: &SharedPosition) -> Option<VehiclePosition> {
    shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub struct LocationReporter {
    vehicle_id: String,
    provider: Arc<dyn LocationProvider>,
    sink: Arc<dyn PositionSink>,
    options: WatchOptions,
    /// Survives stops and denied restarts.
    last_position: SharedPosition,
}

impl LocationReporter {
    pub fn new(
        vehicle_id: impl Into<String>,
        provider: Arc<dyn LocationProvider>,
        sink: Arc<dyn PositionSink>,
        options: WatchOptions,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            provider,
            sink,
            options,
            last_position: Arc::new(Mutex::new(None)),
        }
    }

    pub fn last_position(&self) -> Option<VehiclePosition> {
        read_position(&self.last_position)
    }

    /// Ask for permission and begin reporting.
    ///
    /// A denial returns `PermissionDenied` with the cached position left
    /// as it was, so the caller can fall back to manual entry.
    pub async fn start(&self) -> Result<ReporterHandle, DispatchError> {
        let (state_tx, state_rx) = watch::channel(ReporterState::Idle);
        state_tx.send_replace(ReporterState::AwaitingPermission);

        if self.provider.request_permission().await == PermissionStatus::Denied {
            state_tx.send_replace(ReporterState::Stopped);
            tracing::warn!("Location permission denied for {}", self.vehicle_id);
            return Err(DispatchError::PermissionDenied);
        }
        state_tx.send_replace(ReporterState::Reporting);

        let session = ReportingSession {
            vehicle_id: self.vehicle_id.clone(),
            provider: self.provider.clone(),
            sink: self.sink.clone(),
            options: self.options,
            last_position: self.last_position.clone(),
        };

        let mut last_accepted = None;
        match self.provider.current_position().await {
            Ok(coordinate) => {
                if session.accept(coordinate) {
                    last_accepted = Some(coordinate);
                }
            }
            Err(err) => tracing::warn!("Initial position for {} failed: {}", self.vehicle_id, err),
        }

        let subscription = match self.provider.watch_position(self.options).await {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                tracing::warn!(
                    "Position watch for {} unavailable, using cadence only: {}",
                    self.vehicle_id,
                    err
                );
                None
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(session.run(subscription, last_accepted, stop_rx, state_tx));
        tracing::info!("Location reporting started for {}", self.vehicle_id);

        Ok(ReporterHandle {
            state: state_rx,
            last_position: self.last_position.clone(),
            stop_tx: Some(stop_tx),
            task,
        })
    }
}

/// Handle to a running reporter. Dropping it stops reporting.
pub struct ReporterHandle {
    state: watch::Receiver<ReporterState>,
    last_position: SharedPosition,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReporterHandle {
    pub fn state(&self) -> ReporterState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ReporterState> {
        self.state.clone()
    }

    pub fn last_position(&self) -> Option<VehiclePosition> {
        read_position(&self.last_position)
    }

    /// Cancel future ticks. In-flight publishes still complete.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    /// Stop and wait for the reporting loop to exit.
    pub async fn join(mut self) {
        self.stop();
        if let Err(err) = (&mut self.task).await {
            tracing::warn!("Reporter task ended abnormally: {}", err);
        }
    }
}

struct ReportingSession {
    vehicle_id: String,
    provider: Arc<dyn LocationProvider>,
    sink: Arc<dyn PositionSink>,
    options: WatchOptions,
    last_position: SharedPosition,
}

impl ReportingSession {
    /// Cache the sample and publish it on a detached task.
    fn accept(&self, coordinate: Coordinate) -> bool {
        if let Err(err) = coordinate.validate() {
            tracing::warn!("Discarding sample for {}: {}", self.vehicle_id, err);
            return false;
        }
        let position = VehiclePosition::new(&self.vehicle_id, coordinate);
        *self
            .last_position
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(position.clone());

        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.publish(&position).await {
                tracing::warn!("Position publish for {} failed: {}", position.vehicle_id, err);
            }
        });
        true
    }

    async fn run(
        self,
        mut subscription: Option<LocationSubscription>,
        mut last_accepted: Option<Coordinate>,
        mut stop_rx: oneshot::Receiver<()>,
        state_tx: watch::Sender<ReporterState>,
    ) {
        let period = self.options.time_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Fires on an explicit stop and when the handle is dropped.
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    match self.provider.current_position().await {
                        Ok(coordinate) => {
                            if self.accept(coordinate) {
                                last_accepted = Some(coordinate);
                            }
                        }
                        Err(err) => {
                            tracing::warn!("Cadence sample for {} failed: {}", self.vehicle_id, err);
                        }
                    }
                }
                event = next_event(&mut subscription) => {
                    let Some(coordinate) = event else {
                        tracing::debug!("Position watch for {} closed", self.vehicle_id);
                        subscription = None;
                        continue;
                    };
                    let moved_enough = last_accepted
                        .map(|last| distance_m(last, coordinate) >= self.options.distance_interval_m)
                        .unwrap_or(true);
                    if moved_enough && self.accept(coordinate) {
                        last_accepted = Some(coordinate);
                        ticker.reset();
                    }
                }
            }
        }

        state_tx.send_replace(ReporterState::Stopped);
        tracing::info!("Location reporting stopped for {}", self.vehicle_id);
    }
}

async fn next_event(subscription: &mut Option<LocationSubscription>) -> Option<Coordinate> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

/// Deterministic provider driven by the caller. Used by tests and the
/// simulator binaries.
pub struct SimulatedProvider {
    permission: PermissionStatus,
    current: Mutex<Coordinate>,
    watchers: Mutex<Vec<mpsc::Sender<Coordinate>>>,
}

impl SimulatedProvider {
    pub fn new(start: Coordinate) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            current: Mutex::new(start),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }

    pub fn current(&self) -> Coordinate {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the simulated device and notify every open watch.
    pub fn move_to(&self, coordinate: Coordinate) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = coordinate;
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|tx| match tx.try_send(coordinate) {
            Ok(()) => true,
            // Slow consumer: it will see a later sample.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[async_trait]
impl LocationProvider for SimulatedProvider {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn current_position(&self) -> Result<Coordinate, DispatchError> {
        Ok(self.current())
    }

    async fn watch_position(
        &self,
        _options: WatchOptions,
    ) -> Result<LocationSubscription, DispatchError> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Ok(LocationSubscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<VehiclePosition>>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PositionSink for RecordingSink {
        async fn publish(&self, position: &VehiclePosition) -> Result<(), DispatchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(DispatchError::transient("store offline"));
            }
            self.published.lock().unwrap().push(position.clone());
            Ok(())
        }
    }

    fn reporter(
        provider: Arc<SimulatedProvider>,
        sink: Arc<RecordingSink>,
    ) -> LocationReporter {
        LocationReporter::new("AMB100123", provider, sink, WatchOptions::default())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_stops_without_publishing() {
        let provider = Arc::new(
            SimulatedProvider::new(Coordinate::new(12.95, 77.65))
                .with_permission(PermissionStatus::Denied),
        );
        let sink = Arc::new(RecordingSink::default());
        let reporter = reporter(provider, sink.clone());

        let err = reporter.start().await.err().unwrap();
        assert_eq!(err, DispatchError::PermissionDenied);
        settle().await;
        assert_eq!(sink.count(), 0);
        assert!(reporter.last_position().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn initial_sample_then_cadence() {
        let provider = Arc::new(SimulatedProvider::new(Coordinate::new(12.95, 77.65)));
        let sink = Arc::new(RecordingSink::default());
        let reporter = reporter(provider, sink.clone());

        let handle = reporter.start().await.unwrap();
        assert_eq!(handle.state(), ReporterState::Reporting);
        settle().await;
        assert_eq!(sink.count(), 1);

        // Stationary vehicle still reports on the cadence.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.count(), 2);

        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn movement_triggers_sample_before_cadence() {
        let provider = Arc::new(SimulatedProvider::new(Coordinate::new(0.0, 0.0)));
        let sink = Arc::new(RecordingSink::default());
        let reporter = reporter(provider.clone(), sink.clone());

        let handle = reporter.start().await.unwrap();
        settle().await;
        assert_eq!(sink.count(), 1);

        // About 11 m.
        provider.move_to(Coordinate::new(0.0, 0.0001));
        settle().await;
        assert_eq!(sink.count(), 2);

        // About 11 cm, below the movement threshold.
        provider.move_to(Coordinate::new(0.0, 0.000101));
        settle().await;
        assert_eq!(sink.count(), 2);

        let last = handle.last_position().unwrap();
        assert_eq!(last.coordinate, Coordinate::new(0.0, 0.0001));
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_does_not_block_sampling() {
        let provider = Arc::new(SimulatedProvider::new(Coordinate::new(0.0, 0.0)));
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let reporter = reporter(provider.clone(), sink);

        let handle = reporter.start().await.unwrap();
        provider.move_to(Coordinate::new(0.0, 0.001));
        settle().await;
        assert_eq!(
            handle.last_position().unwrap().coordinate,
            Coordinate::new(0.0, 0.001)
        );
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_in_flight_publish_and_cached_position() {
        let provider = Arc::new(SimulatedProvider::new(Coordinate::new(1.0, 1.0)));
        let sink = Arc::new(RecordingSink {
            delay: Some(Duration::from_secs(1)),
            ..Default::default()
        });
        let reporter = reporter(provider.clone(), sink.clone());

        let handle = reporter.start().await.unwrap();
        let mut states = handle.state_changes();
        handle.join().await;
        assert_eq!(*states.borrow_and_update(), ReporterState::Stopped);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.count(), 1);

        // No further ticks after stopping.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.count(), 1);
        assert_eq!(
            reporter.last_position().unwrap().coordinate,
            Coordinate::new(1.0, 1.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cached_position_survives_denied_restart() {
        let provider = Arc::new(SimulatedProvider::new(Coordinate::new(2.0, 2.0)));
        let sink = Arc::new(RecordingSink::default());
        let reporter = reporter(provider, sink.clone());
        reporter.start().await.unwrap().join().await;

        let denied = LocationReporter {
            provider: Arc::new(
                SimulatedProvider::new(Coordinate::new(3.0, 3.0))
                    .with_permission(PermissionStatus::Denied),
            ),
            ..reporter
        };
        assert!(denied.start().await.is_err());
        assert_eq!(
            denied.last_position().unwrap().coordinate,
            Coordinate::new(2.0, 2.0)
        );
    }
}
