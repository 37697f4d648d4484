// This module is only compiled during tests

pub mod mock_gps;
pub mod mock_imu;
pub mod mock_motor;
