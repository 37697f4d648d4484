use std::str::FromStr;

use crate::error::CommandError;

/// Remote updates accepted by the vessel, one variant per topic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// `t`: report the thruster state.
    State,
    /// `t/active`: arm (true) or disarm the motors.
    Active(bool),
    /// `t/surge`: forward speed (cm/s).
    Surge(f64),
    /// `t/steer`: manual steering override (degrees), bypasses the PID.
    Steer(f64),
    /// `t/course`: desired course (degrees), hands steering back to the PID.
    Course(f64),
    /// `t/stop`: stop both motors.
    Stop,
    /// `t/vmin`: lower velocity bound (cm/s).
    VelocityMin(f64),
    /// `t/vmax`: upper velocity bound (cm/s).
    VelocityMax(f64),
    /// `t/gain`: steering gain.
    Gain(f64),
    /// `t/minpwm`: duty floor.
    MinDuty(u16),
}

impl Command {
    pub fn topic(&self) -> &'static str {
        match self {
            Command::State => "t",
            Command::Active(_) => "t/active",
            Command::Surge(_) => "t/surge",
            Command::Steer(_) => "t/steer",
            Command::Course(_) => "t/course",
            Command::Stop => "t/stop",
            Command::VelocityMin(_) => "t/vmin",
            Command::VelocityMax(_) => "t/vmax",
            Command::Gain(_) => "t/gain",
            Command::MinDuty(_) => "t/minpwm",
        }
    }

    /// Builds a command from a topic name and its (possibly empty) value.
    pub fn parse(topic: &str, value: &str) -> Result<Self, CommandError> {
        let value = value.trim();
        let command = match topic {
            "t" => Command::State,
            "t/stop" => Command::Stop,
            "t/active" => Command::Active(parse_flag(topic, value)?),
            "t/surge" => Command::Surge(parse_number(topic, value)?),
            "t/steer" => Command::Steer(parse_number(topic, value)?),
            "t/course" => Command::Course(parse_number(topic, value)?),
            "t/vmin" => Command::VelocityMin(parse_number(topic, value)?),
            "t/vmax" => Command::VelocityMax(parse_number(topic, value)?),
            "t/gain" => Command::Gain(parse_number(topic, value)?),
            "t/minpwm" => Command::MinDuty(
                value
                    .parse()
                    .map_err(|_| invalid_value(topic, value))?,
            ),
            _ => return Err(CommandError::UnknownTopic(topic.to_string())),
        };
        Ok(command)
    }
}

/// Parses a `"<topic> <value>"` line, e.g. `t/surge 50`.
impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        let (topic, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        Command::parse(topic, value)
    }
}

fn parse_number(topic: &str, value: &str) -> Result<f64, CommandError> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(invalid_value(topic, value)),
    }
}

fn parse_flag(topic: &str, value: &str) -> Result<bool, CommandError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(invalid_value(topic, value)),
    }
}

fn invalid_value(topic: &str, value: &str) -> CommandError {
    CommandError::InvalidValue {
        topic: topic.to_string(),
        value: value.to_string(),
    }
}
