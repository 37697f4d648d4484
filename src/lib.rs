pub mod command;
pub mod compass;
pub mod config;
pub mod error;
pub mod gps_serial;
pub mod gps_tracker;
pub mod heading;
pub mod imu;
pub mod nmea_parser;
pub mod position;
pub mod scheduler;
pub mod steering;
pub mod telemetry;
pub mod thruster;
pub mod vessel;

// Re-export commonly used types
pub use command::Command;
pub use config::VesselConfig;
pub use gps_tracker::GpsTracker;
pub use heading::HeadingEstimator;
pub use position::Position;
pub use scheduler::Scheduler;
pub use vessel::Vessel;

// This module is only compiled during tests
#[cfg(test)]
pub(crate) mod mocks;
