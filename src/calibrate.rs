use robobuoy::config::ImuConfig;
use robobuoy::error::SensorError;
use robobuoy::imu::{MagCalibration, Mpu9250};
use std::thread;
use std::time::Duration;

const SAMPLES: u32 = 800;
const SAMPLE_DELAY: Duration = Duration::from_millis(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Magnetometer Calibration Tool");
    println!("=============================\n");

    println!("Instructions:");
    println!("1. Hold the buoy clear of metal and motors");
    println!("2. Wave it around in a figure of 8, covering every orientation");
    println!("3. Keep going until sampling finishes (about 10 seconds)\n");

    println!("Starting in 5 seconds...\n");
    thread::sleep(Duration::from_secs(5));

    let mut imu = Mpu9250::new(&ImuConfig::default())?;
    let mut calibration = MagCalibration::new();

    println!("Collecting samples... (ROTATE NOW!)");
    println!("\n{:^8} | {:^10} | {:^10} | {:^10}", "Sample", "X", "Y", "Z");
    println!("{:-<8}-+-{:-<10}-+-{:-<10}-+-{:-<10}", "", "", "", "");

    for sample in 1..=SAMPLES {
        match imu.read_raw_magnetometer() {
            Ok(field) => {
                calibration.update(field);
                if sample % 20 == 0 {
                    println!(
                        "{:^8} | {:>10.2} | {:>10.2} | {:>10.2}",
                        sample, field[0], field[1], field[2]
                    );
                }
            }
            Err(SensorError::NotReady) | Err(SensorError::Overflow) => {}
            Err(e) => return Err(e.into()),
        }
        thread::sleep(SAMPLE_DELAY);
    }

    let Some(bias) = calibration.bias() else {
        return Err(format!(
            "not enough rotation captured from {} samples, try again",
            calibration.samples()
        )
        .into());
    };

    println!("\noffset        {:.4} {:.4} {:.4}", bias[0], bias[1], bias[2]);
    println!("normalisation {:.4} {:.4} {:.4}", bias[3], bias[4], bias[5]);
    println!("scale         {:.4} {:.4} {:.4}", bias[6], bias[7], bias[8]);

    let terms: Vec<String> = bias.iter().map(|term| format!("{:.5}", term)).collect();
    println!("\nAdd this to the configuration file:\n");
    println!("[imu]");
    println!("mag_bias = [{}]", terms.join(", "));

    Ok(())
}
