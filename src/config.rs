// Timings, drive power, limits and the command-line configuration
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

// Settling interval between the full stop and energizing a new direction
pub const SETTLE_TIME: Duration = Duration::from_millis(10);

// Maneuver duration limits (milliseconds)
pub const DEFAULT_DURATION_MS: u32 = 500;
pub const MIN_DURATION_MS: u32 = 50;
pub const MAX_DURATION_MS: u32 = 5000;

// Output duty is 8-bit: 0 = off, MAX_POWER = full
pub const MAX_POWER: u8 = 255;
pub const DRIVE_POWER: u8 = 200;

// Boot wiggle: diagonal pairs alternate, stop and pause between each
pub const WIGGLE_CYCLES: usize = 3;
pub const WIGGLE_ON_TIME: Duration = Duration::from_millis(150);
pub const WIGGLE_PAUSE: Duration = Duration::from_millis(100);

// Photo responses are streamed in chunks of at most this many bytes
pub const STREAM_CHUNK_BYTES: usize = 4096;

// Largest frame copy the capture pipeline will allocate
pub const FRAME_HEAP_LIMIT: usize = 4 * 1024 * 1024;

// Hardware job queue depth (requests waiting for the execution slot)
pub const HARDWARE_QUEUE_DEPTH: usize = 16;

// HTTP listener
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = 80;

// PCA9685 PWM expander defaults
pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_PCA9685_ADDRESS: u16 = 0x40;
pub const PCA9685_PWM_HZ: u16 = 1000;

/// Which backend drives the four motor output lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActuationBackend {
    /// In-memory lines, nothing moves (bench testing)
    Sim,
    /// Four PWM channels on a PCA9685 over I2C
    Pca9685,
}

/// Which image sensor the capture pipeline initializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CameraBackend {
    /// Generated test frame
    Sim,
    /// JPEG file re-read from disk on each capture
    Fixture,
    /// No sensor; the camera stays uninitialized
    Off,
}

/// Rover controller: HTTP motor, camera and status endpoints.
#[derive(Debug, Clone, Parser)]
#[command(name = "rover-control", version, about)]
pub struct RoverConfig {
    /// Address to listen on
    #[arg(long, env = "ROVER_BIND", default_value_t = DEFAULT_BIND)]
    pub bind: IpAddr,

    /// HTTP port
    #[arg(long, env = "ROVER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Motor output backend
    #[arg(long, env = "ROVER_ACTUATION", value_enum, default_value_t = ActuationBackend::Sim)]
    pub actuation: ActuationBackend,

    /// I2C bus device for the PCA9685 backend
    #[arg(long, env = "ROVER_I2C_BUS", default_value = DEFAULT_I2C_BUS)]
    pub i2c_bus: PathBuf,

    /// I2C address of the PCA9685
    #[arg(long, env = "ROVER_PCA_ADDRESS", default_value_t = DEFAULT_PCA9685_ADDRESS)]
    pub pca_address: u16,

    /// Image sensor backend
    #[arg(long, env = "ROVER_CAMERA", value_enum, default_value_t = CameraBackend::Sim)]
    pub camera: CameraBackend,

    /// JPEG served by the fixture camera
    #[arg(long, env = "ROVER_CAMERA_FIXTURE", required_if_eq("camera", "fixture"))]
    pub camera_fixture: Option<PathBuf>,

    /// Sensor frame buffers may live in external PSRAM
    #[arg(long, env = "ROVER_PSRAM")]
    pub psram: bool,

    /// Address reported by /api/status instead of the detected one
    #[arg(long, env = "ROVER_ADVERTISE_IP")]
    pub advertise_ip: Option<IpAddr>,

    /// Skip the boot-time readiness wiggle
    #[arg(long, env = "ROVER_SKIP_WIGGLE")]
    pub skip_wiggle: bool,
}
