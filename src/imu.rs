use std::thread;
use std::time::Duration;

use log::{debug, info};
use rppal::i2c::I2c;
use tokio::time::Instant;

use crate::config::{IMU_I2C_ADDR, ImuConfig, MAG_I2C_ADDR};
use crate::error::SensorError;

// MPU-9250 registers
const CONFIG: u8 = 0x1A;
const GYRO_CONFIG: u8 = 0x1B;
const INT_PIN_CFG: u8 = 0x37;
const GYRO_XOUT_H: u8 = 0x43;
const USER_CTRL: u8 = 0x6A;
const PWR_MGMT_1: u8 = 0x6B;
const WHO_AM_I: u8 = 0x75;

// AK8963 registers
const AK_ST1: u8 = 0x02;
const AK_HXL: u8 = 0x03;
const AK_ST2: u8 = 0x09;
const AK_CNTL1: u8 = 0x0A;
const AK_ASAX: u8 = 0x10;

const MPU9250_ID: u8 = 0x71;
const DEVICE_RESET: u8 = 0x80;
/// Internal oscillator until the gyro PLL is ready.
const CLOCK_AUTO: u8 = 0x01;
/// Registers only take writes again after the reset completes.
const RESET_SETTLE: Duration = Duration::from_millis(100);

/// LSB per deg/s at ±250 deg/s full scale.
const GYRO_SENSITIVITY: f64 = 131.0;
/// Gyro low pass filter setting 6 is 5 Hz.
const GYRO_DLPF_5HZ: u8 = 6;
const AK_FUSE_ROM_MODE: u8 = 0x1F;
/// 16-bit output, continuous measurement 100 Hz.
const AK_CONTINUOUS_16BIT: u8 = 0x16;
const AK_DATA_READY: u8 = 0x01;
const AK_OVERFLOW: u8 = 0x08;

/// Register writes that bring the MPU-9250 up. The reset restores every
/// register default, so it comes before any configuration.
const INIT_SEQUENCE: [(u8, u8); 6] = [
    (PWR_MGMT_1, DEVICE_RESET),
    (PWR_MGMT_1, CLOCK_AUTO),
    // gyro full scale ±250 deg/s
    (GYRO_CONFIG, 0x00),
    (CONFIG, GYRO_DLPF_5HZ),
    // I2C master off, AK8963 exposed on the bus
    (USER_CTRL, 0x00),
    (INT_PIN_CFG, 0x02),
];

/// Angular rates in deg/s, NED frame, plus seconds since the previous read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GyroReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub dt: f64,
}

pub trait InertialSensor {
    fn read_calibrated_gyro(&mut self) -> Result<GyroReading, SensorError>;

    /// Magnetic heading in degrees, any range.
    fn read_magnetic_heading(&mut self) -> Result<f64, SensorError>;
}

/// Elapsed time between successive calls.
pub struct DeltaTimer {
    last: Option<Instant>,
}

impl DeltaTimer {
    /// Returned on the first call, when there is no previous reading.
    pub const FIRST_DT: f64 = 0.0001;

    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let dt = match self.last {
            Some(last) => now.duration_since(last).as_secs_f64(),
            None => Self::FIRST_DT,
        };
        self.last = Some(now);
        dt
    }
}

impl Default for DeltaTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// MPU-9250 gyro with the AK8963 magnetometer reached through I2C bypass.
pub struct Mpu9250 {
    i2c: I2c,
    /// Factory sensitivity adjustment per magnetometer axis.
    asa: [f64; 3],
    gyro_bias: [f64; 3],
    mag_bias: [f64; 9],
    timer: DeltaTimer,
}

impl Mpu9250 {
    pub fn new(config: &ImuConfig) -> Result<Self, SensorError> {
        let mut i2c = I2c::new()?;

        i2c.set_slave_address(IMU_I2C_ADDR)?;
        check_device_id(i2c.smbus_read_byte(WHO_AM_I)?)?;

        for (register, value) in INIT_SEQUENCE {
            i2c.smbus_write_byte(register, value)?;
            if (register, value) == (PWR_MGMT_1, DEVICE_RESET) {
                thread::sleep(RESET_SETTLE);
            }
        }

        i2c.set_slave_address(MAG_I2C_ADDR)?;
        i2c.smbus_write_byte(AK_CNTL1, AK_FUSE_ROM_MODE)?;
        thread::sleep(Duration::from_millis(100));

        let mut raw_asa = [0u8; 3];
        i2c.write_read(&[AK_ASAX], &mut raw_asa)?;
        let asa = raw_asa.map(sensitivity_adjustment);
        debug!("magnetometer sensitivity adjustment {:?}", asa);

        i2c.smbus_write_byte(AK_CNTL1, AK_CONTINUOUS_16BIT)?;

        info!("MPU-9250 initialized");
        Ok(Self {
            i2c,
            asa,
            gyro_bias: [0.0; 3],
            mag_bias: config.mag_bias,
            timer: DeltaTimer::new(),
        })
    }

    pub fn gyro_bias(&self) -> [f64; 3] {
        self.gyro_bias
    }

    /// Rates in deg/s before bias correction.
    pub fn read_gyro(&mut self) -> Result<[f64; 3], SensorError> {
        self.i2c.set_slave_address(IMU_I2C_ADDR)?;
        let mut data = [0u8; 6];
        self.i2c.write_read(&[GYRO_XOUT_H], &mut data)?;
        Ok(decode_gyro(data))
    }

    /// Averages `samples` readings as the gyro bias. Keep the hull still.
    pub fn calibrate_gyro(
        &mut self,
        samples: u32,
        delay: Duration,
    ) -> Result<[f64; 3], SensorError> {
        let mut sum = [0.0; 3];
        for _ in 0..samples {
            thread::sleep(delay);
            let rates = self.read_gyro()?;
            for (total, rate) in sum.iter_mut().zip(rates) {
                *total += rate;
            }
        }

        let n = f64::from(samples.max(1));
        self.gyro_bias = sum.map(|total| total / n);
        info!("gyro bias {:?}", self.gyro_bias);
        Ok(self.gyro_bias)
    }

    /// Magnetometer field after the factory sensitivity adjustment only.
    pub fn read_raw_magnetometer(&mut self) -> Result<[f64; 3], SensorError> {
        self.i2c.set_slave_address(MAG_I2C_ADDR)?;
        if self.i2c.smbus_read_byte(AK_ST1)? & AK_DATA_READY == 0 {
            return Err(SensorError::NotReady);
        }

        let mut data = [0u8; 6];
        self.i2c.write_read(&[AK_HXL], &mut data)?;
        // ST2 must be read to release the data registers
        let status = self.i2c.smbus_read_byte(AK_ST2)?;
        if status & AK_OVERFLOW != 0 {
            return Err(SensorError::Overflow);
        }

        let field = [
            i16::from_le_bytes([data[0], data[1]]),
            i16::from_le_bytes([data[2], data[3]]),
            i16::from_le_bytes([data[4], data[5]]),
        ];
        Ok([
            f64::from(field[0]) * self.asa[0],
            f64::from(field[1]) * self.asa[1],
            f64::from(field[2]) * self.asa[2],
        ])
    }
}

impl InertialSensor for Mpu9250 {
    fn read_calibrated_gyro(&mut self) -> Result<GyroReading, SensorError> {
        let [x, y, z] = self.read_gyro()?;
        let [bx, by, bz] = self.gyro_bias;
        Ok(GyroReading {
            x: x - bx,
            y: y - by,
            z: z - bz,
            dt: self.timer.tick(),
        })
    }

    fn read_magnetic_heading(&mut self) -> Result<f64, SensorError> {
        let raw = self.read_raw_magnetometer()?;
        let [x, y, _] = apply_mag_bias(raw, &self.mag_bias);
        Ok(magnetic_heading(x, y))
    }
}

/// Running min/max of the magnetometer field while the hull is rotated,
/// turned into the 9-term bias used by [`apply_mag_bias`].
#[derive(Clone, Copy, Debug)]
pub struct MagCalibration {
    min: [f64; 3],
    max: [f64; 3],
    samples: u32,
}

impl MagCalibration {
    pub fn new() -> Self {
        Self {
            min: [f64::MAX; 3],
            max: [f64::MIN; 3],
            samples: 0,
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn update(&mut self, field: [f64; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(field[axis]);
            self.max[axis] = self.max[axis].max(field[axis]);
        }
        self.samples += 1;
    }

    /// Offset (centre), normalisation (half span) and soft iron scale per
    /// axis. `None` until every axis has seen a non-zero span.
    pub fn bias(&self) -> Option<[f64; 9]> {
        let mut bias = [0.0; 9];
        let mut half_spans = [0.0; 3];
        for axis in 0..3 {
            let half_span = (self.max[axis] - self.min[axis]) / 2.0;
            if self.samples == 0 || half_span <= 0.0 {
                return None;
            }
            bias[axis] = (self.max[axis] + self.min[axis]) / 2.0;
            bias[axis + 3] = half_span;
            half_spans[axis] = half_span;
        }

        let average = half_spans.iter().sum::<f64>() / 3.0;
        for axis in 0..3 {
            bias[axis + 6] = average / half_spans[axis];
        }
        Some(bias)
    }
}

impl Default for MagCalibration {
    fn default() -> Self {
        Self::new()
    }
}

fn check_device_id(found: u8) -> Result<(), SensorError> {
    if found == MPU9250_ID {
        Ok(())
    } else {
        Err(SensorError::WrongDevice {
            found,
            expected: MPU9250_ID,
        })
    }
}

/// Big-endian register block, stored y, x, z. Z is negated for the NED frame.
fn decode_gyro(data: [u8; 6]) -> [f64; 3] {
    let y = f64::from(i16::from_be_bytes([data[0], data[1]])) / GYRO_SENSITIVITY;
    let x = f64::from(i16::from_be_bytes([data[2], data[3]])) / GYRO_SENSITIVITY;
    let z = f64::from(i16::from_be_bytes([data[4], data[5]])) / GYRO_SENSITIVITY;
    [x, y, -z]
}

/// ASA register value is read as a signed byte.
fn sensitivity_adjustment(raw: u8) -> f64 {
    let asa = f64::from(raw as i8);
    ((asa - 128.0) * 0.5) / 128.0 + 1.0
}

/// Offset, normalisation, then soft iron scale.
pub fn apply_mag_bias(field: [f64; 3], bias: &[f64; 9]) -> [f64; 3] {
    let mut corrected = field;
    for (axis, value) in corrected.iter_mut().enumerate() {
        *value = (*value - bias[axis]) / bias[axis + 3] * bias[axis + 6];
    }
    corrected
}

/// Whole degrees, truncated toward zero.
pub fn magnetic_heading(x: f64, y: f64) -> f64 {
    x.atan2(y).to_degrees().trunc()
}
