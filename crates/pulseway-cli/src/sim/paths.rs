//! Drive path implementations.

use pulseway_core::{distance_m, interpolate, Coordinate};

/// Trait for simulated vehicle routes.
pub trait DrivePath: Send + Sync {
    /// Position at `t` seconds from the start.
    fn position_at(&self, t: f64) -> Coordinate;

    /// Seconds until the destination is reached.
    fn duration_s(&self) -> f64;

    fn is_finished(&self, t: f64) -> bool {
        t >= self.duration_s()
    }
}

/// Constant-speed straight line between two points.
pub struct StraightPath {
    pub start: Coordinate,
    pub end: Coordinate,
    pub speed_mps: f64,
    pub distance_m: f64,
    duration: f64,
}

impl StraightPath {
    pub fn new(start: Coordinate, end: Coordinate, speed_mps: f64) -> Self {
        let distance_m = distance_m(start, end);
        let duration = if speed_mps > 0.0 {
            distance_m / speed_mps
        } else {
            0.0
        };
        Self {
            start,
            end,
            speed_mps,
            distance_m,
            duration,
        }
    }
}

impl DrivePath for StraightPath {
    fn position_at(&self, t: f64) -> Coordinate {
        if t >= self.duration {
            return self.end;
        }
        interpolate(self.start, self.end, t / self.duration)
    }

    fn duration_s(&self) -> f64 {
        self.duration
    }
}
