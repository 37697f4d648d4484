use std::time::Duration;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use robobuoy::config::{ImuConfig, TELEMETRY_QUEUE};
use robobuoy::error::SensorError;
use robobuoy::gps_serial::SerialGps;
use robobuoy::imu::Mpu9250;
use robobuoy::telemetry::Report;
use robobuoy::thruster::{PwmMotor, Thruster};
use robobuoy::{Command, Scheduler, Vessel, VesselConfig};

// Usage:
//  robobuoy [config.toml]
//
// Commands are read from stdin, one per line:
//  t/active 1      arm the motors
//  t/surge 50      forward speed (cm/s)
//  t/course 90     hold a course (degrees)
//  t/steer 10      manual steering override
//  t               print the thruster state
//  t/stop          stop and disarm
// Telemetry is written to stdout as JSON lines.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Starting robobuoy heading control...");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            println!("Loading configuration from {}", path);
            VesselConfig::load(&path)?
        }
        None => {
            println!("No configuration file given, using defaults");
            VesselConfig::default()
        }
    };

    println!("Calibrating gyro, keep the buoy still...");
    let imu = start_imu(config.imu.clone()).await?;

    let gps = SerialGps::open(&config.gps)?;

    let left = PwmMotor::with_pin(config.thruster.left_pin)?;
    let right = PwmMotor::with_pin(config.thruster.right_pin)?;
    let mut thruster = Thruster::new(config.thruster, Box::new(left), Box::new(right))?;

    println!("Arming thrusters (12 s)...");
    thruster.arm().await?;

    let vessel = Vessel::new(&config, thruster, Box::new(imu), Box::new(gps))?;
    let mut scheduler = Scheduler::new(vessel, &config.schedule)?;

    let (command_tx, command_rx) = mpsc::channel(16);
    let (report_tx, mut report_rx) = mpsc::channel::<Report>(TELEMETRY_QUEUE);

    // Command reader
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => {
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("ignoring '{}': {}", line.trim(), e),
                },
                Ok(None) => {
                    info!("stdin closed, no further commands");
                    break;
                }
                Err(e) => {
                    error!("failed to read command: {}", e);
                    break;
                }
            }
        }
    });

    // Telemetry printer
    tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            match serde_json::to_string(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("failed to encode telemetry: {}", e),
            }
        }
    });

    println!("Control loop started. Press Ctrl+C to stop.\n");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
        }
    };

    for (activity, stats) in scheduler.run(command_rx, report_tx, shutdown).await {
        println!(
            "  {:<10} runs {:>8}  overruns {:>4}  max {:>6} us",
            activity.to_string(),
            stats.executions,
            stats.overruns,
            stats.max_execution_us
        );
    }

    println!("Thrusters stopped. Bye.");
    Ok(())
}

/// IMU bring-up and gyro calibration sleep between register accesses, so
/// they run on the blocking pool.
async fn start_imu(config: ImuConfig) -> Result<Mpu9250, Box<dyn std::error::Error>> {
    let imu = tokio::task::spawn_blocking(move || -> Result<Mpu9250, SensorError> {
        let mut imu = Mpu9250::new(&config)?;
        imu.calibrate_gyro(
            config.gyro_calibration_samples,
            Duration::from_millis(config.gyro_calibration_delay_ms),
        )?;
        Ok(imu)
    })
    .await??;
    Ok(imu)
}
