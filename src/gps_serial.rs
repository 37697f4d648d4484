use std::time::Duration;

use log::info;
use rppal::uart::{Parity, Uart};

use crate::config::GpsConfig;
use crate::error::SensorError;

/// Raw NMEA byte stream from the GPS receiver.
pub trait PositionSource {
    /// Copies whatever bytes are waiting into `buffer` without blocking.
    /// `Ok(0)` means nothing arrived this interval.
    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, SensorError>;
}

pub struct SerialGps {
    uart: Uart,
}

impl SerialGps {
    pub fn open(config: &GpsConfig) -> Result<Self, SensorError> {
        let mut uart = Uart::with_path(&config.serial_path, config.baud_rate, Parity::None, 8, 1)?;
        // Non-blocking: return immediately with what is buffered
        uart.set_read_mode(0, Duration::ZERO)?;

        info!(
            "GPS serial port {} opened at {} baud",
            config.serial_path, config.baud_rate
        );
        Ok(Self { uart })
    }
}

impl PositionSource for SerialGps {
    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize, SensorError> {
        Ok(self.uart.read(buffer)?)
    }
}
