use crate::config::SteeringConfig;
use crate::error::SteeringError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl From<&SteeringConfig> for PidGains {
    fn from(config: &SteeringConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PidState {
    pub error: f64,
    pub integral: f64,
    pub last_error: f64,
}

/// Heading-hold PID producing a steering command in degrees.
pub struct SteeringPid {
    gains: PidGains,
    state: PidState,
}

impl SteeringPid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            state: PidState::default(),
        }
    }

    pub fn state(&self) -> PidState {
        self.state
    }

    /// Re-bases the derivative term on the current error without producing
    /// an output, so the next update after a pause sees no step.
    pub fn hold(&mut self, desired: f64, current: f64) {
        let error = desired - current;
        self.state.error = error;
        self.state.last_error = error;
    }

    /// Calculate steering correction
    ///
    /// # Arguments
    /// * `desired` - Desired heading (degrees)
    /// * `current` - Estimated heading (degrees)
    /// * `dt` - Time since the previous update (seconds), finite and positive
    ///
    /// The error is the plain difference `desired - current`. It is not
    /// wrapped to the shortest turn, so a pair straddling ±180° yields an
    /// error near 360°.
    pub fn update(&mut self, desired: f64, current: f64, dt: f64) -> Result<f64, SteeringError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SteeringError::InvalidDt(dt));
        }

        let error = desired - current;
        let integral = self.state.integral + error * dt;
        let derivative = (error - self.state.last_error) / dt;

        self.state = PidState {
            error,
            integral,
            last_error: error,
        };

        Ok(self.gains.kp * error + self.gains.ki * integral + self.gains.kd * derivative)
    }
}
