use std::time::Duration;

use tokio::time::Instant;

use crate::nmea_parser::Sentence;
use crate::position::Position;

/// Meters per second in one knot.
pub const KNOTS_TO_MPS: f64 = 0.514444;

/// Latest receiver state, assembled from position and track sentences.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawFix {
    /// Signed decimal degrees, zero while the fix is invalid.
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in meters per second.
    pub speed: f64,
    /// Course over ground in degrees, 0-360.
    pub course: f64,
    pub valid: bool,
    /// Monotonic time of the last valid position.
    pub fix_time: Option<Instant>,
}

pub struct GpsTracker {
    fix: RawFix,
    track_updated: bool,
}

impl GpsTracker {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            fix: RawFix::default(),
            track_updated: false,
        }
    }

    pub fn fix(&self) -> RawFix {
        self.fix
    }

    pub fn current_position(&self) -> Option<Position> {
        self.fix
            .valid
            .then(|| Position::new(self.fix.latitude, self.fix.longitude))
    }

    /// Folds one parsed sentence into the fix.
    pub fn apply(&mut self, sentence: &Sentence, now: Instant) {
        match sentence {
            Sentence::Position(report) => match report.fix {
                Some(pos) => {
                    self.fix.latitude = pos.latitude;
                    self.fix.longitude = pos.longitude;
                    self.fix.valid = true;
                    self.fix.fix_time = Some(now);
                }
                None => {
                    self.fix.latitude = 0.0;
                    self.fix.longitude = 0.0;
                    self.fix.valid = false;
                }
            },
            Sentence::Track(track) => {
                self.fix.speed = track.speed_knots * KNOTS_TO_MPS;
                self.fix.course = track.course_deg;
                self.track_updated = true;
            }
        }
    }

    /// Course over ground, if it is trustworthy: the fix must be valid and
    /// the vessel moving at least `min_speed` m/s.
    pub fn usable_course(&self, min_speed: f64) -> Option<f64> {
        (self.fix.valid && self.fix.speed >= min_speed).then_some(self.fix.course)
    }

    /// Returns true once per track report received since the last call.
    pub fn take_track_update(&mut self) -> bool {
        std::mem::take(&mut self.track_updated)
    }

    pub fn fix_age(&self, now: Instant) -> Option<Duration> {
        self.fix.fix_time.map(|t| now.saturating_duration_since(t))
    }

    pub fn distance_to(&self, target: &Position) -> Option<f64> {
        self.current_position().map(|pos| pos.distance_to(target))
    }

    pub fn bearing_to(&self, target: &Position) -> Option<f64> {
        self.current_position().map(|pos| pos.bearing_to(target))
    }
}
