// This file is only compiled during tests

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::SensorError;
use crate::gps_serial::PositionSource;

thread_local! {
    static MOCK_SERIAL: RefCell<VecDeque<u8>> = const { RefCell::new(VecDeque::new()) };
}

/// Serial port stand-in: returns whatever bytes were queued, `Ok(0)` when idle.
pub struct MockGps;

impl PositionSource for MockGps {
    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, SensorError> {
        MOCK_SERIAL.with(|serial| {
            let mut serial = serial.borrow_mut();
            let count = buffer.len().min(serial.len());
            for (slot, byte) in buffer.iter_mut().zip(serial.drain(..count)) {
                *slot = byte;
            }
            Ok(count)
        })
    }
}

pub fn queue_mock_serial(bytes: &[u8]) {
    MOCK_SERIAL.with(|serial| serial.borrow_mut().extend(bytes.iter().copied()));
}

/// Wraps a sentence body in `$...*HH\r\n` with a correct checksum.
pub fn nmea_sentence(body: &str) -> String {
    let crc = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${}*{:02X}\r\n", body, crc)
}

pub fn reset_mock_gps() {
    MOCK_SERIAL.with(|serial| serial.borrow_mut().clear());
}
