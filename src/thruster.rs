use std::time::Duration;

use log::{debug, info};
use rppal::pwm::{Channel, Polarity, Pwm};

use crate::config::{
    ARM_HIGH_DUTY, ARM_LOW_DUTY, ARM_STEP_SECS, DUTY_RESOLUTION, THRUSTER_FREQUENCY_HZ,
    ThrusterConfig,
};
use crate::error::{ActuatorError, ConfigError};
use crate::telemetry::ThrusterState;

/// One motor's PWM output, in duty units (0..=DUTY_RESOLUTION).
pub trait MotorOutput {
    fn set_duty(&mut self, duty: u16) -> Result<(), ActuatorError>;
    fn disable(&mut self) -> Result<(), ActuatorError>;
}

/// ESC driven from a Raspberry Pi hardware PWM channel.
pub struct PwmMotor {
    pwm: Pwm,
}

impl PwmMotor {
    /// Hardware PWM is available on:
    /// - GPIO 12 / 18 (PWM0)
    /// - GPIO 13 / 19 (PWM1)
    pub fn with_pin(pin: u8) -> Result<Self, ActuatorError> {
        let channel = match pin {
            12 | 18 => Channel::Pwm0,
            13 | 19 => Channel::Pwm1,
            _ => return Err(ActuatorError::InvalidPin(pin)),
        };

        let pwm = Pwm::with_frequency(
            channel,
            THRUSTER_FREQUENCY_HZ,
            0.0, // motors off until armed
            Polarity::Normal,
            true,
        )?;

        Ok(Self { pwm })
    }
}

impl MotorOutput for PwmMotor {
    fn set_duty(&mut self, duty: u16) -> Result<(), ActuatorError> {
        let duty_cycle = f64::from(duty.min(DUTY_RESOLUTION)) / f64::from(DUTY_RESOLUTION);
        self.pwm.set_duty_cycle(duty_cycle)?;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ActuatorError> {
        self.pwm.disable()?;
        Ok(())
    }
}

/// Duty values last written to the motors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActuatorCommand {
    pub left: u16,
    pub right: u16,
    pub active: bool,
}

/// Differential thrust allocator for a twin-motor hull.
pub struct Thruster {
    config: ThrusterConfig,
    active: bool,
    /// Last drive request, re-applied whenever the configuration changes.
    steer: f64,
    surge: f64,
    left: Box<dyn MotorOutput>,
    right: Box<dyn MotorOutput>,
    output: ActuatorCommand,
}

impl Thruster {
    /// Starts disarmed with both motors off.
    pub fn new(
        config: ThrusterConfig,
        left: Box<dyn MotorOutput>,
        right: Box<dyn MotorOutput>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            active: false,
            steer: 0.0,
            surge: 0.0,
            left,
            right,
            output: ActuatorCommand::default(),
        })
    }

    pub fn config(&self) -> ThrusterConfig {
        self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn surge(&self) -> f64 {
        self.surge
    }

    pub fn steer(&self) -> f64 {
        self.steer
    }

    pub fn output(&self) -> ActuatorCommand {
        self.output
    }

    /// Maps a steering command (degrees) and surge (cm/s) onto the two motors.
    ///
    /// Wheel velocities are `surge ± rad(steer) * gain / 2`, clamped to
    /// `[vmin, vmax]` and remapped onto `[min_duty, max_duty]`. While
    /// inactive both motors are held at zero.
    pub fn drive(&mut self, steer: f64, surge: f64) -> Result<ActuatorCommand, ActuatorError> {
        if !steer.is_finite() || !surge.is_finite() {
            return Err(ActuatorError::NonFinite { steer, surge });
        }
        self.steer = steer;
        self.surge = surge;

        let differential = steer.to_radians() * self.config.gain / 2.0;
        let v_left = (surge + differential).clamp(self.config.vmin, self.config.vmax);
        let v_right = (surge - differential).clamp(self.config.vmin, self.config.vmax);
        debug!("speed (cm/s) {:.2} {:.2}", v_left, v_right);

        if !self.active {
            self.stop()?;
            return Ok(self.output);
        }

        let left = self.velocity_to_duty(v_left);
        let right = self.velocity_to_duty(v_right);
        self.left.set_duty(left)?;
        self.right.set_duty(right)?;

        self.output = ActuatorCommand {
            left,
            right,
            active: true,
        };
        Ok(self.output)
    }

    /// Drives again with the last requested steer and surge.
    pub fn reapply(&mut self) -> Result<ActuatorCommand, ActuatorError> {
        self.drive(self.steer, self.surge)
    }

    pub fn stop(&mut self) -> Result<(), ActuatorError> {
        self.left.set_duty(0)?;
        self.right.set_duty(0)?;
        self.output = ActuatorCommand {
            left: 0,
            right: 0,
            active: self.active,
        };
        Ok(())
    }

    /// Gates whether drive commands reach the motors.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Swaps in a new configuration if it is valid. The caller re-applies
    /// the drive command.
    pub fn set_config(&mut self, candidate: ThrusterConfig) -> Result<(), ConfigError> {
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// ESC startup sequence, run once before steady-state control.
    pub async fn arm(&mut self) -> Result<(), ActuatorError> {
        info!("arming thrusters");
        for duty in [ARM_LOW_DUTY, ARM_HIGH_DUTY] {
            self.left.set_duty(duty)?;
            self.right.set_duty(duty)?;
            tokio::time::sleep(Duration::from_secs(ARM_STEP_SECS)).await;
        }
        self.stop()?;
        info!("arming complete");
        Ok(())
    }

    pub fn state(&self) -> ThrusterState {
        ThrusterState {
            active: self.active,
            surge: self.surge,
            steer: self.steer,
            vmin: self.config.vmin,
            vmax: self.config.vmax,
            gain: self.config.gain,
            min_duty: self.config.min_duty,
            max_duty: self.config.max_duty,
        }
    }

    fn velocity_to_duty(&self, velocity: f64) -> u16 {
        let ThrusterConfig {
            vmin,
            vmax,
            min_duty,
            max_duty,
            ..
        } = self.config;
        let duty = (velocity - vmin) * f64::from(max_duty - min_duty) / (vmax - vmin)
            + f64::from(min_duty);
        // truncates like the ESC firmware expects
        duty as u16
    }
}

impl Drop for Thruster {
    fn drop(&mut self) {
        // Ensure motors are off and PWM released when dropped
        let _ = self.stop();
        let _ = self.left.disable();
        let _ = self.right.disable();
    }
}
