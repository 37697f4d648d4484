//! Heading estimator.
//!
//! One scalar heading in `[-180, 180)` degrees, advanced by gyro
//! integration and pulled toward the compass and GPS course by
//! complementary filters. Every update builds a candidate first and only
//! commits it when it is finite.

use crate::compass::normalize_heading;
use crate::config::EstimatorConfig;
use crate::error::{ConfigError, HeadingError};

pub struct HeadingEstimator {
    heading: f64,
    compass_weight: f64,
    gps_weight: f64,
}

impl HeadingEstimator {
    pub fn new(config: &EstimatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            heading: 0.0,
            compass_weight: config.compass_weight,
            gps_weight: config.gps_weight,
        })
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// Integrates a yaw rate (deg/s) over `dt` seconds.
    pub fn fuse_gyro(&mut self, rate_deg_per_s: f64, dt: f64) -> Result<f64, HeadingError> {
        self.commit("gyro", self.heading + rate_deg_per_s * dt)
    }

    /// Slowly corrects gyro drift toward the magnetic heading.
    pub fn fuse_compass(&mut self, measured: f64) -> Result<f64, HeadingError> {
        let candidate = blend(self.heading, measured, self.compass_weight);
        self.commit("compass", candidate)
    }

    /// Pulls the heading toward GPS course over ground. Callers only pass a
    /// course taken from a valid fix at speed.
    pub fn fuse_gps(&mut self, course: f64) -> Result<f64, HeadingError> {
        let candidate = blend(self.heading, course, self.gps_weight);
        self.commit("gps", candidate)
    }

    fn commit(&mut self, source_name: &'static str, candidate: f64) -> Result<f64, HeadingError> {
        if !candidate.is_finite() {
            return Err(HeadingError::NonFinite {
                source_name,
                value: candidate,
            });
        }
        self.heading = normalize_heading(candidate);
        Ok(self.heading)
    }
}

/// Linear blend, no wraparound handling.
fn blend(prior: f64, measured: f64, weight: f64) -> f64 {
    (1.0 - weight) * prior + weight * normalize_heading(measured)
}
