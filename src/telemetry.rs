use serde::Serialize;

/// One steering-loop frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Telemetry {
    /// Desired course (degrees)
    pub desired: f64,
    /// Estimated heading (degrees)
    pub estimated: f64,
    /// Steering command sent to the thruster (degrees)
    pub steering: f64,
    pub left_duty: u16,
    pub right_duty: u16,
}

/// Thruster settings as reported on the `t` topic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ThrusterState {
    pub active: bool,
    pub surge: f64,
    pub steer: f64,
    pub vmin: f64,
    pub vmax: f64,
    pub gain: f64,
    #[serde(rename = "minpwm")]
    pub min_duty: u16,
    #[serde(rename = "maxpwm")]
    pub max_duty: u16,
}

/// Anything the run loop publishes to the outside world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "topic", rename_all = "lowercase")]
pub enum Report {
    /// Per-tick steering frame.
    Steering(Telemetry),
    /// Answer to a `t` state request.
    #[serde(rename = "t")]
    Thruster(ThrusterState),
}
