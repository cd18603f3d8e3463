// Motor control for the two-channel differential drive
//
// Provides:
// - Output line abstraction with an in-memory and a PCA9685 backend
// - Named maneuvers and duration clamping
// - The motion sequencer (stop, settle, drive, stop)

pub mod driver;
pub mod maneuver;
#[cfg(target_os = "linux")]
pub mod pca9685;
pub mod sequencer;

pub use driver::{ActuationError, Line, LineDriver, MotorChannel, SimulatedLines};
pub use maneuver::{DriveDuration, Maneuver};
#[cfg(target_os = "linux")]
pub use pca9685::Pca9685Lines;
pub use sequencer::{MotionSequencer, Pause, ThreadSleep};
