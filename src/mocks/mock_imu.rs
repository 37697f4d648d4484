// This file is only compiled during tests

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::SensorError;
use crate::imu::{GyroReading, InertialSensor};

/// Steering period, in seconds, reported once the gyro queue runs dry.
const DEFAULT_DT: f64 = 0.05;

thread_local! {
    static MOCK_GYRO: RefCell<VecDeque<GyroReading>> = const { RefCell::new(VecDeque::new()) };
    static MOCK_HEADING: RefCell<Option<f64>> = const { RefCell::new(None) };
}

/// Replays queued gyro readings; once the queue is empty it reports a
/// motionless gyro with the default dt.
pub struct MockImu;

impl InertialSensor for MockImu {
    fn read_calibrated_gyro(&mut self) -> Result<GyroReading, SensorError> {
        let queued = MOCK_GYRO.with(|gyro| gyro.borrow_mut().pop_front());
        Ok(queued.unwrap_or_else(|| GyroReading {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            dt: DEFAULT_DT,
        }))
    }

    fn read_magnetic_heading(&mut self) -> Result<f64, SensorError> {
        MOCK_HEADING
            .with(|heading| *heading.borrow())
            .ok_or(SensorError::NotReady)
    }
}

pub fn push_mock_gyro(rate_z: f64, dt: f64) {
    MOCK_GYRO.with(|gyro| {
        gyro.borrow_mut().push_back(GyroReading {
            x: 0.0,
            y: 0.0,
            z: rate_z,
            dt,
        })
    });
}

/// `None` makes the magnetometer report `NotReady`.
pub fn set_mock_heading(heading: Option<f64>) {
    MOCK_HEADING.with(|value| *value.borrow_mut() = heading);
}

pub fn reset_mock_imu() {
    MOCK_GYRO.with(|gyro| gyro.borrow_mut().clear());
    MOCK_HEADING.with(|value| *value.borrow_mut() = None);
}
