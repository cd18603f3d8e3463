// Camera capture for the rover
//
// Provides:
// - Sensor driver seam with simulated and file-backed sensors
// - Memory-class dependent sensor configuration
// - Single-shot capture into an owned, chunk-streamable frame

pub mod pipeline;
pub mod sensor;

pub use pipeline::{CameraState, CapturePipeline, Frame, FrameChunks};
pub use sensor::{
    CameraError, FixtureSensor, FrameSource, SensorBuffer, SensorConfig, SensorStats,
    SimulatedSensor,
};
