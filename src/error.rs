/// Setup defects: degenerate ranges, bad gains, unreadable config files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid range for {name}: lower {lower} must be below upper {upper}")]
    InvalidRange {
        name: &'static str,
        lower: f64,
        upper: f64,
    },

    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A sensor read that did not produce a value this cycle.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// The device had no fresh sample. The caller skips the cycle.
    #[error("sensor data not ready")]
    NotReady,

    #[error("unexpected device id 0x{found:02X}, expected 0x{expected:02X}")]
    WrongDevice { found: u8, expected: u8 },

    #[error("magnetometer overflow")]
    Overflow,

    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("UART error: {0}")]
    Uart(#[from] rppal::uart::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("PWM error: {0}")]
    Pwm(#[from] rppal::pwm::Error),

    #[error("no PWM channel on GPIO {0}, use 12, 13, 18 or 19")]
    InvalidPin(u8),

    #[error("non-finite drive command (steer {steer}, surge {surge})")]
    NonFinite { steer: f64, surge: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum HeadingError {
    #[error("{source_name} fusion produced a non-finite heading ({value})")]
    NonFinite {
        source_name: &'static str,
        value: f64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SteeringError {
    #[error("steering dt must be finite and positive, got {0}")]
    InvalidDt(f64),
}

/// Rejected updates from the command surface. Existing state is untouched.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command topic '{0}'")]
    UnknownTopic(String),

    #[error("invalid value '{value}' for topic '{topic}'")]
    InvalidValue { topic: String, value: String },

    #[error("empty command line")]
    Empty,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}
