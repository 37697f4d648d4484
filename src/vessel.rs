//! The vessel: every control component plus the sensors and motors they
//! talk to, owned in one place.
//!
//! Each `*_tick` method is the body of one periodic activity. A tick always
//! finishes its state transition before returning, so the scheduler can
//! interleave them on a single thread without locks. Sensor dropouts and
//! protocol noise skip the cycle; they are logged, never propagated.

use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::command::Command;
use crate::compass::{heading_to_direction, normalize_heading};
use crate::config::{ThrusterConfig, VesselConfig};
use crate::error::{CommandError, ConfigError, SensorError};
use crate::gps_serial::PositionSource;
use crate::gps_tracker::GpsTracker;
use crate::heading::HeadingEstimator;
use crate::imu::InertialSensor;
use crate::nmea_parser::{NmeaParser, ParserStats};
use crate::position::Position;
use crate::steering::{PidGains, SteeringPid};
use crate::telemetry::{Telemetry, ThrusterState};
use crate::thruster::Thruster;

/// Bytes pulled from the GPS per read.
const GPS_READ_CHUNK: usize = 256;
/// Reads per GPS tick; bounds the tick when the receiver floods the port.
const GPS_MAX_READS: usize = 16;

pub struct Vessel {
    estimator: HeadingEstimator,
    parser: NmeaParser,
    tracker: GpsTracker,
    pid: SteeringPid,
    thruster: Thruster,
    imu: Box<dyn InertialSensor>,
    gps: Box<dyn PositionSource>,
    desired_course: f64,
    /// Manual steering command that replaces the PID output while set.
    steer_override: Option<f64>,
    min_course_speed: f64,
    home: Option<Position>,
}

impl Vessel {
    pub fn new(
        config: &VesselConfig,
        thruster: Thruster,
        imu: Box<dyn InertialSensor>,
        gps: Box<dyn PositionSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            estimator: HeadingEstimator::new(&config.estimator)?,
            parser: NmeaParser::new(config.gps.local_offset_hours),
            tracker: GpsTracker::new(),
            pid: SteeringPid::new(PidGains::from(&config.steering)),
            thruster,
            imu,
            gps,
            desired_course: normalize_heading(config.steering.desired_course),
            steer_override: None,
            min_course_speed: config.gps.min_course_speed,
            home: config.home,
        })
    }

    pub fn heading(&self) -> f64 {
        self.estimator.heading()
    }

    pub fn desired_course(&self) -> f64 {
        self.desired_course
    }

    pub fn steer_override(&self) -> Option<f64> {
        self.steer_override
    }

    pub fn tracker(&self) -> &GpsTracker {
        &self.tracker
    }

    pub fn thruster(&self) -> &Thruster {
        &self.thruster
    }

    pub fn parser_stats(&self) -> ParserStats {
        self.parser.stats()
    }

    /// GPS activity: drain the serial port, fold every parsed sentence into
    /// the fix, then fuse the course if a fresh track report is usable.
    pub fn fuse_gps_tick(&mut self, now: Instant) {
        let mut buffer = [0u8; GPS_READ_CHUNK];

        for _ in 0..GPS_MAX_READS {
            let count = match self.gps.read_available(&mut buffer) {
                Ok(count) => count,
                Err(e) => {
                    log_skipped("gps", &e);
                    break;
                }
            };

            let mut next = self.parser.ingest(&buffer[..count]);
            while let Some(sentence) = next {
                debug!("GPS {} {:?}", sentence.kind(), sentence);
                self.tracker.apply(&sentence, now);
                next = self.parser.ingest(&[]);
            }

            if count < buffer.len() {
                break;
            }
        }

        if !self.tracker.take_track_update() {
            return;
        }

        match self.tracker.usable_course(self.min_course_speed) {
            Some(course) => match self.estimator.fuse_gps(course) {
                Ok(heading) => debug!("GPS course {:.1}, heading {:.1}", course, heading),
                Err(e) => warn!("GPS fusion rejected: {}", e),
            },
            None => {
                let fix = self.tracker.fix();
                debug!(
                    "GPS course unusable (valid {}, speed {:.2} m/s)",
                    fix.valid, fix.speed
                );
            }
        }
    }

    /// Compass activity: pull the heading toward the magnetometer.
    pub fn fuse_compass_tick(&mut self) {
        match self.imu.read_magnetic_heading() {
            Ok(measured) => match self.estimator.fuse_compass(measured) {
                Ok(heading) => debug!("compass {:.1}, heading {:.1}", measured, heading),
                Err(e) => warn!("compass fusion rejected: {}", e),
            },
            Err(e) => log_skipped("compass", &e),
        }
    }

    /// Steering activity: integrate the gyro, run the PID and drive the
    /// thrusters. Returns the frame to publish, or `None` if the tick was
    /// skipped.
    pub fn steer_tick(&mut self) -> Option<Telemetry> {
        let reading = match self.imu.read_calibrated_gyro() {
            Ok(reading) => reading,
            Err(e) => {
                log_skipped("gyro", &e);
                return None;
            }
        };

        if let Err(e) = self.estimator.fuse_gyro(reading.z, reading.dt) {
            warn!("gyro fusion rejected: {}", e);
        }
        let estimated = self.estimator.heading();

        let steering = match self.steer_override {
            Some(steer) => steer,
            None => match self.pid.update(self.desired_course, estimated, reading.dt) {
                Ok(output) => output,
                Err(e) => {
                    warn!("steering tick skipped: {}", e);
                    return None;
                }
            },
        };

        let surge = self.thruster.surge();
        let output = match self.thruster.drive(steering, surge) {
            Ok(output) => output,
            Err(e) => {
                error!("thruster drive failed: {}", e);
                return None;
            }
        };

        Some(Telemetry {
            desired: self.desired_course,
            estimated,
            steering,
            left_duty: output.left,
            right_duty: output.right,
        })
    }

    /// Status activity: one human readable summary line.
    pub fn status_tick(&self, now: Instant) {
        let heading = self.estimator.heading();
        let fix = self.tracker.fix();
        let stats = self.parser.stats();

        info!(
            "heading {:.1} ({}) desired {:.1} | fix {} speed {:.2} m/s course {:.1}",
            heading,
            heading_to_direction(heading),
            self.desired_course,
            if fix.valid { "valid" } else { "none" },
            fix.speed,
            fix.course,
        );
        debug!(
            "nmea parsed {} clean {} crc fails {} abandoned {}",
            stats.parsed_sentences, stats.clean_sentences, stats.crc_fails, stats.abandoned
        );

        if let Some(age) = self.tracker.fix_age(now) {
            debug!("last fix {:.1} s ago", age.as_secs_f64());
        }

        if let Some(home) = self.home
            && let (Some(distance), Some(bearing)) =
                (self.tracker.distance_to(&home), self.tracker.bearing_to(&home))
        {
            info!(
                "home {} is {:.0} m away, bearing {:.0} ({})",
                home,
                distance,
                bearing,
                heading_to_direction(bearing)
            );
        }
    }

    /// Steering cleanup: both motors off.
    pub fn shutdown_steering(&mut self) {
        match self.thruster.stop() {
            Ok(()) => info!("thrusters stopped"),
            Err(e) => error!("failed to stop thrusters: {}", e),
        }
    }

    /// Applies one remote command. Thruster changes are validated first and
    /// rejected without touching the current state; accepted changes are
    /// re-applied to the motors immediately. `Command::State` answers with
    /// the thruster state.
    pub fn apply_command(
        &mut self,
        command: Command,
    ) -> Result<Option<ThrusterState>, CommandError> {
        info!("command {} {:?}", command.topic(), command);

        match command {
            Command::State => return Ok(Some(self.thruster.state())),
            Command::Active(active) => {
                self.thruster.set_active(active);
                self.thruster.reapply()?;
            }
            Command::Surge(surge) => {
                self.thruster.drive(self.thruster.steer(), surge)?;
            }
            Command::Steer(steer) => {
                self.thruster.drive(steer, self.thruster.surge())?;
                self.steer_override = Some(steer);
            }
            Command::Course(course) => {
                self.desired_course = normalize_heading(course);
                // the PID sat idle under the override
                if self.steer_override.take().is_some() {
                    self.pid.hold(self.desired_course, self.estimator.heading());
                }
            }
            Command::Stop => {
                self.thruster.set_active(false);
                self.thruster.drive(self.thruster.steer(), 0.0)?;
            }
            Command::VelocityMin(vmin) => self.reconfigure(|c| c.vmin = vmin)?,
            Command::VelocityMax(vmax) => self.reconfigure(|c| c.vmax = vmax)?,
            Command::Gain(gain) => self.reconfigure(|c| c.gain = gain)?,
            Command::MinDuty(min_duty) => self.reconfigure(|c| c.min_duty = min_duty)?,
        }
        Ok(None)
    }

    fn reconfigure(
        &mut self,
        update: impl FnOnce(&mut ThrusterConfig),
    ) -> Result<(), CommandError> {
        let mut candidate = self.thruster.config();
        update(&mut candidate);
        self.thruster.set_config(candidate)?;
        self.thruster.reapply()?;
        Ok(())
    }
}

fn log_skipped(source: &str, e: &SensorError) {
    match e {
        SensorError::NotReady => debug!("{} not ready, cycle skipped", source),
        _ => warn!("{} read failed, cycle skipped: {}", source, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::mock_gps::{self, MockGps};
    use crate::mocks::mock_imu::{self, MockImu};
    use crate::mocks::mock_motor::{self, MockMotor};

    const LEFT: u8 = 0;
    const RIGHT: u8 = 1;

    const VALID_GLL: &str = "GPGLL,4916.45,N,12311.12,W,225444,A";
    const FAST_VTG: &str = "GPVTG,045.0,T,,,012.0,N,,,A";

    fn vessel_with(config: VesselConfig) -> Vessel {
        mock_motor::reset_mock_motors();
        mock_imu::reset_mock_imu();
        mock_gps::reset_mock_gps();

        let thruster =
            Thruster::new(config.thruster, MockMotor::new(LEFT), MockMotor::new(RIGHT)).unwrap();
        Vessel::new(&config, thruster, Box::new(MockImu), Box::new(MockGps)).unwrap()
    }

    fn vessel() -> Vessel {
        vessel_with(VesselConfig::default())
    }

    #[test]
    fn test_fast_track_pulls_heading_toward_course() {
        let mut vessel = vessel();
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(VALID_GLL).as_bytes());
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(FAST_VTG).as_bytes());

        vessel.fuse_gps_tick(Instant::now());

        // 0.97 * 0 + 0.03 * 45
        assert!((vessel.heading() - 1.35).abs() < 1e-9);
        assert_eq!(vessel.parser_stats().parsed_sentences, 2);
        assert!(vessel.tracker().fix().valid);
    }

    #[test]
    fn test_track_fused_once_per_report() {
        let mut vessel = vessel();
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(VALID_GLL).as_bytes());
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(FAST_VTG).as_bytes());

        vessel.fuse_gps_tick(Instant::now());
        let after_first = vessel.heading();
        vessel.fuse_gps_tick(Instant::now());

        assert_eq!(vessel.heading(), after_first);
    }

    #[test]
    fn test_slow_track_is_skipped() {
        let mut vessel = vessel();
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(VALID_GLL).as_bytes());
        // 2 knots is about 1.03 m/s
        mock_gps::queue_mock_serial(
            mock_gps::nmea_sentence("GPVTG,045.0,T,,,002.0,N,,,A").as_bytes(),
        );

        vessel.fuse_gps_tick(Instant::now());
        assert_eq!(vessel.heading(), 0.0);
    }

    #[test]
    fn test_track_without_fix_is_skipped() {
        let mut vessel = vessel();
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence("GPGLL,,,,,,V").as_bytes());
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(FAST_VTG).as_bytes());

        vessel.fuse_gps_tick(Instant::now());
        assert_eq!(vessel.heading(), 0.0);
        assert!(!vessel.tracker().fix().valid);
    }

    #[test]
    fn test_sentence_split_across_ticks() {
        let mut vessel = vessel();
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(VALID_GLL).as_bytes());
        let track = mock_gps::nmea_sentence(FAST_VTG);
        let (head, tail) = track.split_at(11);

        mock_gps::queue_mock_serial(head.as_bytes());
        vessel.fuse_gps_tick(Instant::now());
        assert_eq!(vessel.heading(), 0.0);

        mock_gps::queue_mock_serial(tail.as_bytes());
        vessel.fuse_gps_tick(Instant::now());
        assert!(vessel.heading() > 0.0);
    }

    #[test]
    fn test_corrupted_sentence_leaves_heading() {
        let mut vessel = vessel();
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(VALID_GLL).as_bytes());
        let corrupted = mock_gps::nmea_sentence(FAST_VTG).replace("045.0", "046.0");
        mock_gps::queue_mock_serial(corrupted.as_bytes());

        vessel.fuse_gps_tick(Instant::now());
        assert_eq!(vessel.heading(), 0.0);
        assert_eq!(vessel.parser_stats().crc_fails, 1);
    }

    #[test]
    fn test_compass_tick() {
        let mut vessel = vessel();

        // magnetometer not ready: skipped
        vessel.fuse_compass_tick();
        assert_eq!(vessel.heading(), 0.0);

        mock_imu::set_mock_heading(Some(100.0));
        vessel.fuse_compass_tick();
        assert!((vessel.heading() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_disarmed_steering_outputs_zero() {
        let mut config = VesselConfig::default();
        config.thruster.gain = 50.0;
        config.steering.desired_course = 90.0;
        let mut vessel = vessel_with(config);

        let frame = vessel.steer_tick().unwrap();
        assert_eq!((frame.left_duty, frame.right_duty), (0, 0));
        assert_eq!(frame.desired, 90.0);
        assert_eq!(mock_motor::get_mock_duty(LEFT), Some(0));
    }

    #[test]
    fn test_armed_steering_drives_surge() {
        let mut vessel = vessel();
        vessel.apply_command(Command::Active(true)).unwrap();
        vessel.apply_command(Command::Surge(50.0)).unwrap();

        let frame = vessel.steer_tick().unwrap();
        assert_eq!(frame.steering, 0.0);
        assert_eq!((frame.left_duty, frame.right_duty), (70, 70));
    }

    #[test]
    fn test_gyro_advances_heading() {
        let mut vessel = vessel();
        mock_imu::push_mock_gyro(20.0, 0.5);

        let frame = vessel.steer_tick().unwrap();
        assert_eq!(frame.estimated, 10.0);
        assert_eq!(vessel.heading(), 10.0);
    }

    #[test]
    fn test_invalid_dt_skips_tick() {
        let mut vessel = vessel();
        mock_imu::push_mock_gyro(0.0, 0.0);
        assert!(vessel.steer_tick().is_none());
        assert!(vessel.steer_tick().is_some());
    }

    #[test]
    fn test_steer_override_and_course() {
        let mut vessel = vessel();
        vessel.apply_command(Command::Steer(30.0)).unwrap();
        assert_eq!(vessel.steer_tick().unwrap().steering, 30.0);

        vessel.apply_command(Command::Course(270.0)).unwrap();
        assert_eq!(vessel.steer_override(), None);
        assert_eq!(vessel.desired_course(), -90.0);

        let frame = vessel.steer_tick().unwrap();
        assert_eq!(frame.desired, -90.0);
        assert!(frame.steering < 0.0);
    }

    #[test]
    fn test_leaving_override_has_no_derivative_kick() {
        let mut vessel = vessel();
        vessel.apply_command(Command::Steer(30.0)).unwrap();
        // turn 40 degrees while steering by hand
        mock_imu::push_mock_gyro(80.0, 0.5);
        assert_eq!(vessel.steer_tick().unwrap().steering, 30.0);
        assert_eq!(vessel.heading(), 40.0);

        vessel.apply_command(Command::Course(90.0)).unwrap();

        // kp * 50, the derivative starts from the current error
        let frame = vessel.steer_tick().unwrap();
        assert_eq!(frame.estimated, 40.0);
        assert_eq!(frame.steering, 50.0);
    }

    #[test]
    fn test_rejected_config_keeps_state() {
        let mut vessel = vessel();
        let before = vessel.thruster().config();

        assert!(vessel.apply_command(Command::VelocityMin(100.0)).is_err());
        assert!(vessel.apply_command(Command::MinDuty(2000)).is_err());
        assert_eq!(vessel.thruster().config(), before);
    }

    #[test]
    fn test_config_change_reapplies_drive() {
        let mut vessel = vessel();
        vessel.apply_command(Command::Active(true)).unwrap();
        vessel.apply_command(Command::Surge(50.0)).unwrap();
        assert_eq!(mock_motor::get_mock_duty(LEFT), Some(70));

        vessel.apply_command(Command::VelocityMax(50.0)).unwrap();
        assert_eq!(mock_motor::get_mock_duty(LEFT), Some(100));
        assert_eq!(mock_motor::get_mock_duty(RIGHT), Some(100));
    }

    #[test]
    fn test_stop_disarms() {
        let mut vessel = vessel();
        vessel.apply_command(Command::Active(true)).unwrap();
        vessel.apply_command(Command::Surge(80.0)).unwrap();

        vessel.apply_command(Command::Stop).unwrap();
        assert!(!vessel.thruster().is_active());
        assert_eq!(vessel.thruster().surge(), 0.0);

        let frame = vessel.steer_tick().unwrap();
        assert_eq!((frame.left_duty, frame.right_duty), (0, 0));
    }

    #[test]
    fn test_state_command_reports_thruster() {
        let mut vessel = vessel();
        vessel.apply_command(Command::Gain(2.0)).unwrap();

        let state = vessel.apply_command(Command::State).unwrap().unwrap();
        assert_eq!(state.gain, 2.0);
        assert!(!state.active);
        assert_eq!(state.min_duty, 40);
    }

    #[test]
    fn test_shutdown_stops_motors() {
        let mut vessel = vessel();
        vessel.apply_command(Command::Active(true)).unwrap();
        vessel.apply_command(Command::Surge(80.0)).unwrap();

        vessel.shutdown_steering();
        assert_eq!(mock_motor::get_mock_duty(LEFT), Some(0));
        assert_eq!(mock_motor::get_mock_duty(RIGHT), Some(0));
    }

    #[test]
    fn test_status_with_home() {
        let mut config = VesselConfig::default();
        config.home = Some(Position::new(49.3, -123.2));
        let mut vessel = vessel_with(config);
        mock_gps::queue_mock_serial(mock_gps::nmea_sentence(VALID_GLL).as_bytes());

        let now = Instant::now();
        vessel.fuse_gps_tick(now);
        vessel.status_tick(now);

        assert!(vessel.tracker().distance_to(&Position::new(49.3, -123.2)).is_some());
    }
}
