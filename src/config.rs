use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::position::Position;

// ** GPS CONFIGURATION ** //
pub const GPS_SERIAL_PATH: &str = "/dev/serial0";
pub const GPS_BAUD_RATE: u32 = 9600;
/// Course over ground is noise below this ground speed (m/s).
pub const MIN_COURSE_SPEED_MPS: f64 = 1.5;

// ** IMU CONFIGURATION ** //
pub const IMU_I2C_ADDR: u16 = 0x69;
pub const MAG_I2C_ADDR: u16 = 0x0C;
pub const GYRO_CALIBRATION_SAMPLES: u32 = 10;
pub const GYRO_CALIBRATION_DELAY_MS: u64 = 10;
/// Magnetometer bias: offset x/y/z, normalisation x/y/z, soft iron scale x/y/z.
/// Obtained with the `calibrate` binary.
pub const MAG_BIAS: [f64; 9] = [
    20.03906, -23.30859, 17.7207, 48.9375, 54.10547, 36.19727, 0.9484222, 0.8578321, 1.282235,
];

// ** HEADING ESTIMATOR CONFIGURATION ** //
/// Weight of a compass reading against the gyro-integrated heading.
pub const COMPASS_WEIGHT: f64 = 0.03;
/// Weight of a GPS course reading against the fused heading.
pub const GPS_WEIGHT: f64 = 0.03;

// ** STEERING CONFIGURATION ** //
/// PID controller gains
pub const KP: f64 = 1.0;
pub const KI: f64 = 0.0;
pub const KD: f64 = 0.5;
pub const DESIRED_COURSE: f64 = 0.0;

// ** THRUSTER CONFIGURATION ** //
/// Hardware PWM pins, GPIO 18 is PWM0 and GPIO 19 is PWM1.
pub const LEFT_THRUSTER_PIN: u8 = 18;
pub const RIGHT_THRUSTER_PIN: u8 = 19;
pub const THRUSTER_FREQUENCY_HZ: f64 = 50.0;
/// Duty values are on a 10-bit scale, 0..=DUTY_RESOLUTION.
pub const DUTY_RESOLUTION: u16 = 1023;
/// Velocity bounds (cm/s)
pub const VELOCITY_MIN: f64 = 0.0;
pub const VELOCITY_MAX: f64 = 100.0;
pub const STEER_GAIN: f64 = 1.0;
pub const MIN_DUTY: u16 = 40;
pub const MAX_DUTY: u16 = 100;
/// ESC arming ramp: low duty, high duty, then off, holding each step.
pub const ARM_LOW_DUTY: u16 = 40;
pub const ARM_HIGH_DUTY: u16 = 115;
pub const ARM_STEP_SECS: u64 = 6;

// ** SCHEDULE CONFIGURATION ** //
pub const GPS_PERIOD_MS: u64 = 1000;
pub const COMPASS_PERIOD_MS: u64 = 500;
pub const STEER_PERIOD_MS: u64 = 50;
pub const STATUS_PERIOD_MS: u64 = 5000;
/// Telemetry frames buffered before new ones are dropped.
pub const TELEMETRY_QUEUE: usize = 64;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpsConfig {
    pub serial_path: String,
    pub baud_rate: u32,
    pub local_offset_hours: i32,
    pub min_course_speed: f64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            serial_path: GPS_SERIAL_PATH.to_string(),
            baud_rate: GPS_BAUD_RATE,
            local_offset_hours: 0,
            min_course_speed: MIN_COURSE_SPEED_MPS,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImuConfig {
    pub gyro_calibration_samples: u32,
    pub gyro_calibration_delay_ms: u64,
    pub mag_bias: [f64; 9],
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            gyro_calibration_samples: GYRO_CALIBRATION_SAMPLES,
            gyro_calibration_delay_ms: GYRO_CALIBRATION_DELAY_MS,
            mag_bias: MAG_BIAS,
        }
    }
}

impl ImuConfig {
    /// The normalisation and scale terms divide and multiply the field, so
    /// they must be positive for the heading to mean anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, &term) in self.mag_bias.iter().enumerate() {
            check_finite(MAG_BIAS_TERMS[index], term)?;
            if index >= 3 && term <= 0.0 {
                return Err(ConfigError::NotPositive {
                    name: MAG_BIAS_TERMS[index],
                    value: term,
                });
            }
        }
        Ok(())
    }
}

const MAG_BIAS_TERMS: [&str; 9] = [
    "mag_bias offset x",
    "mag_bias offset y",
    "mag_bias offset z",
    "mag_bias normalisation x",
    "mag_bias normalisation y",
    "mag_bias normalisation z",
    "mag_bias scale x",
    "mag_bias scale y",
    "mag_bias scale z",
];

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    pub compass_weight: f64,
    pub gps_weight: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            compass_weight: COMPASS_WEIGHT,
            gps_weight: GPS_WEIGHT,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_within("compass_weight", self.compass_weight, 0.0, 1.0)?;
        check_within("gps_weight", self.gps_weight, 0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SteeringConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub desired_course: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            kp: KP,
            ki: KI,
            kd: KD,
            desired_course: DESIRED_COURSE,
        }
    }
}

impl SteeringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("kp", self.kp)?;
        check_finite("ki", self.ki)?;
        check_finite("kd", self.kd)?;
        check_finite("desired_course", self.desired_course)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThrusterConfig {
    pub left_pin: u8,
    pub right_pin: u8,
    /// Velocity bounds (cm/s)
    pub vmin: f64,
    pub vmax: f64,
    pub gain: f64,
    pub min_duty: u16,
    pub max_duty: u16,
}

impl Default for ThrusterConfig {
    fn default() -> Self {
        Self {
            left_pin: LEFT_THRUSTER_PIN,
            right_pin: RIGHT_THRUSTER_PIN,
            vmin: VELOCITY_MIN,
            vmax: VELOCITY_MAX,
            gain: STEER_GAIN,
            min_duty: MIN_DUTY,
            max_duty: MAX_DUTY,
        }
    }
}

impl ThrusterConfig {
    /// Rejects ranges the duty remap would divide by zero on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("vmin", self.vmin)?;
        check_finite("vmax", self.vmax)?;
        check_finite("gain", self.gain)?;
        if self.vmin >= self.vmax {
            return Err(ConfigError::InvalidRange {
                name: "velocity",
                lower: self.vmin,
                upper: self.vmax,
            });
        }
        if self.max_duty > DUTY_RESOLUTION {
            return Err(ConfigError::OutOfRange {
                name: "max_duty",
                value: self.max_duty.into(),
                min: 0.0,
                max: DUTY_RESOLUTION.into(),
            });
        }
        if self.min_duty > self.max_duty {
            return Err(ConfigError::InvalidRange {
                name: "duty",
                lower: self.min_duty.into(),
                upper: self.max_duty.into(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub gps_period_ms: u64,
    pub compass_period_ms: u64,
    pub steer_period_ms: u64,
    pub status_period_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            gps_period_ms: GPS_PERIOD_MS,
            compass_period_ms: COMPASS_PERIOD_MS,
            steer_period_ms: STEER_PERIOD_MS,
            status_period_ms: STATUS_PERIOD_MS,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, period) in [
            ("gps_period_ms", self.gps_period_ms),
            ("compass_period_ms", self.compass_period_ms),
            ("steer_period_ms", self.steer_period_ms),
            ("status_period_ms", self.status_period_ms),
        ] {
            if period == 0 {
                return Err(ConfigError::NotPositive {
                    name,
                    value: period as f64,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VesselConfig {
    pub gps: GpsConfig,
    pub imu: ImuConfig,
    pub estimator: EstimatorConfig,
    pub steering: SteeringConfig,
    pub thruster: ThrusterConfig,
    pub schedule: ScheduleConfig,
    /// Station keeping point reported in status lines.
    pub home: Option<Position>,
}

impl VesselConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: VesselConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("min_course_speed", self.gps.min_course_speed)?;
        self.imu.validate()?;
        self.estimator.validate()?;
        self.steering.validate()?;
        self.thruster.validate()?;
        self.schedule.validate()
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { name, value })
    }
}

fn check_within(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(VesselConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = VesselConfig::from_toml("").unwrap();
        assert_eq!(config, VesselConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_fields() {
        let config = VesselConfig::from_toml(
            r#"
            [steering]
            kd = 0.25
            desired_course = 90.0

            [thruster]
            vmax = 150.0

            [home]
            latitude = 49.69395
            longitude = 10.82761
            "#,
        )
        .unwrap();

        assert_eq!(config.steering.kd, 0.25);
        assert_eq!(config.steering.kp, KP);
        assert_eq!(config.steering.desired_course, 90.0);
        assert_eq!(config.thruster.vmax, 150.0);
        assert_eq!(config.thruster.min_duty, MIN_DUTY);
        assert_eq!(config.home, Some(Position::new(49.69395, 10.82761)));
    }

    #[test]
    fn test_equal_velocity_bounds_rejected() {
        let result = VesselConfig::from_toml("[thruster]\nvmin = 50.0\nvmax = 50.0\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRange {
                name: "velocity",
                ..
            })
        ));
    }

    #[test]
    fn test_duty_range_checked() {
        let mut thruster = ThrusterConfig::default();
        thruster.min_duty = 200;
        assert!(thruster.validate().is_err());

        thruster.min_duty = 0;
        thruster.max_duty = DUTY_RESOLUTION + 1;
        assert!(thruster.validate().is_err());
    }

    #[test]
    fn test_weights_must_be_fractions() {
        let estimator = EstimatorConfig {
            compass_weight: 1.5,
            gps_weight: 0.03,
        };
        assert!(estimator.validate().is_err());
    }

    #[test]
    fn test_degenerate_mag_bias_rejected() {
        let result = VesselConfig::from_toml("[imu]\nmag_bias = [0, 0, 0, 0, 0, 1, 1, 1, 1]\n");
        assert!(matches!(
            result,
            Err(ConfigError::NotPositive {
                name: "mag_bias normalisation x",
                ..
            })
        ));

        let result = VesselConfig::from_toml("[imu]\nmag_bias = [0, 0, 0, 1, 1, 1, 1, -1, 1]\n");
        assert!(matches!(result, Err(ConfigError::NotPositive { .. })));

        let mut imu = ImuConfig::default();
        imu.mag_bias[0] = f64::NAN;
        assert!(matches!(imu.validate(), Err(ConfigError::NotFinite { .. })));
    }

    #[test]
    fn test_negative_offset_accepted() {
        let config =
            VesselConfig::from_toml("[imu]\nmag_bias = [-20, 5, -1, 40, 50, 30, 1, 1, 1]\n")
                .unwrap();
        assert_eq!(config.imu.mag_bias[0], -20.0);
    }

    #[test]
    fn test_zero_period_rejected() {
        let result = VesselConfig::from_toml("[schedule]\nsteer_period_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::NotPositive { .. })));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            VesselConfig::from_toml("[thruster\nvmax = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
