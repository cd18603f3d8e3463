// Image sensor driver seam
//
// A sensor hands out driver-owned frame buffers with `grab` and takes them
// back with `give_back`. Buffers are moved in and out, so each one can only
// be returned once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

/// Error types for the capture pipeline
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("camera is not initialized")]
    Unavailable,

    #[error("out of memory copying a {requested} byte frame")]
    OutOfMemory { requested: usize },

    #[error("sensor driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sensor output resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    Qvga,
    Vga,
    Svga,
    Xga,
    Uxga,
}

impl FrameSize {
    /// (width, height) in pixels
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qvga => (320, 240),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Uxga => (1600, 1200),
        }
    }
}

/// Memory region holding the sensor's frame buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbLocation {
    Psram,
    Dram,
}

/// Sensor parameters applied once at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorConfig {
    pub frame_size: FrameSize,
    /// JPEG quality, 0-63, lower is better
    pub jpeg_quality: u8,
    pub fb_count: u8,
    pub fb_location: FbLocation,
}

impl SensorConfig {
    /// Pick resolution, quality and buffering by available memory class
    pub fn for_memory(psram: bool) -> Self {
        if psram {
            Self {
                frame_size: FrameSize::Uxga,
                jpeg_quality: 10,
                fb_count: 2,
                fb_location: FbLocation::Psram,
            }
        } else {
            Self {
                frame_size: FrameSize::Svga,
                jpeg_quality: 12,
                fb_count: 1,
                fb_location: FbLocation::Dram,
            }
        }
    }
}

/// A frame buffer owned by the sensor driver
#[derive(Debug)]
pub struct SensorBuffer {
    slot: usize,
    data: Vec<u8>,
}

impl SensorBuffer {
    pub fn new(slot: usize, data: Vec<u8>) -> Self {
        Self { slot, data }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An image sensor producing JPEG frames
pub trait FrameSource: Send {
    /// One-time driver initialization
    fn init(&mut self, config: &SensorConfig) -> Result<(), CameraError>;

    /// Acquire one fresh frame from the driver
    fn grab(&mut self) -> Result<SensorBuffer, CameraError>;

    /// Return a frame buffer to the driver
    fn give_back(&mut self, buffer: SensorBuffer);

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Grab/release counters shared with whoever created the sensor
#[derive(Debug, Clone, Default)]
pub struct SensorStats {
    grabs: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl SensorStats {
    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Buffers currently held outside the driver
    pub fn outstanding(&self) -> usize {
        self.grabs() - self.releases()
    }

    fn grabbed(&self) {
        self.grabs.fetch_add(1, Ordering::SeqCst);
    }

    fn released(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tracks which of the driver's frame buffers are handed out
#[derive(Debug, Default)]
struct BufferPool {
    in_use: Vec<bool>,
}

impl BufferPool {
    fn configure(&mut self, count: u8) {
        self.in_use = vec![false; count.max(1) as usize];
    }

    fn take(&mut self) -> Result<usize, CameraError> {
        if self.in_use.is_empty() {
            return Err(CameraError::Unavailable);
        }
        let slot = self
            .in_use
            .iter()
            .position(|used| !used)
            .ok_or_else(|| CameraError::Driver("no free frame buffer".to_string()))?;
        self.in_use[slot] = true;
        Ok(slot)
    }

    fn put(&mut self, slot: usize) {
        if let Some(used) = self.in_use.get_mut(slot) {
            *used = false;
        }
    }
}

/// 8x8 mid-grey baseline JPEG; the frame number goes in a COM segment
fn test_pattern(frame_no: usize) -> Vec<u8> {
    let comment = format!("rover test frame {}", frame_no);
    let mut jpeg = Vec::with_capacity(160 + comment.len());

    jpeg.extend_from_slice(&[0xFF, 0xD8]); // SOI
    jpeg.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
        0x00, 0x01, 0x00, 0x00,
    ]);

    let com_len = (comment.len() + 2) as u16;
    jpeg.extend_from_slice(&[0xFF, 0xFE]);
    jpeg.extend_from_slice(&com_len.to_be_bytes());
    jpeg.extend_from_slice(comment.as_bytes());

    // Flat quantization table
    jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    jpeg.extend_from_slice(&[0x01; 64]);

    // SOF0: 8-bit, 8x8, one component
    jpeg.extend_from_slice(&[
        0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
    ]);

    // DC and AC tables with a single 1-bit code for symbol 0
    for class in [0x00u8, 0x10] {
        jpeg.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, class, 0x01]);
        jpeg.extend_from_slice(&[0x00; 15]);
        jpeg.push(0x00);
    }

    // SOS, then DC diff 0 + EOB padded with ones
    jpeg.extend_from_slice(&[
        0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00,
    ]);
    jpeg.push(0x3F);

    jpeg.extend_from_slice(&[0xFF, 0xD9]); // EOI
    jpeg
}

/// Sensor generating a small test JPEG per grab
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    pool: BufferPool,
    stats: SensorStats,
    fail_init: bool,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sensor whose initialization always fails
    pub fn failing() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> SensorStats {
        self.stats.clone()
    }
}

impl FrameSource for SimulatedSensor {
    fn init(&mut self, config: &SensorConfig) -> Result<(), CameraError> {
        if self.fail_init {
            return Err(CameraError::Driver("sensor probe failed".to_string()));
        }
        self.pool.configure(config.fb_count);
        Ok(())
    }

    fn grab(&mut self) -> Result<SensorBuffer, CameraError> {
        let slot = self.pool.take()?;
        self.stats.grabbed();
        Ok(SensorBuffer::new(slot, test_pattern(self.stats.grabs())))
    }

    fn give_back(&mut self, buffer: SensorBuffer) {
        self.pool.put(buffer.slot());
        self.stats.released();
    }

    fn name(&self) -> &'static str {
        "sim"
    }
}

/// Sensor serving a JPEG file from disk, re-read on every grab
#[derive(Debug)]
pub struct FixtureSensor {
    path: PathBuf,
    pool: BufferPool,
    stats: SensorStats,
}

impl FixtureSensor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pool: BufferPool::default(),
            stats: SensorStats::default(),
        }
    }

    pub fn stats(&self) -> SensorStats {
        self.stats.clone()
    }

    fn read_jpeg(&self) -> Result<Vec<u8>, CameraError> {
        let data = fs::read(&self.path)?;
        if !data.starts_with(&[0xFF, 0xD8]) {
            return Err(CameraError::Driver(format!(
                "{} is not a JPEG",
                self.path.display()
            )));
        }
        Ok(data)
    }
}

impl FrameSource for FixtureSensor {
    fn init(&mut self, config: &SensorConfig) -> Result<(), CameraError> {
        let probe = self.read_jpeg()?;
        info!(
            "Fixture camera {} ({} bytes)",
            self.path.display(),
            probe.len()
        );
        self.pool.configure(config.fb_count);
        Ok(())
    }

    fn grab(&mut self) -> Result<SensorBuffer, CameraError> {
        let slot = self.pool.take()?;
        match self.read_jpeg() {
            Ok(data) => {
                self.stats.grabbed();
                debug!("Fixture frame {} bytes in slot {}", data.len(), slot);
                Ok(SensorBuffer::new(slot, data))
            }
            Err(e) => {
                self.pool.put(slot);
                Err(e)
            }
        }
    }

    fn give_back(&mut self, buffer: SensorBuffer) {
        self.pool.put(buffer.slot());
        self.stats.released();
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_class_selects_config() {
        let psram = SensorConfig::for_memory(true);
        assert_eq!(psram.frame_size.dimensions(), (1600, 1200));
        assert_eq!(psram.fb_count, 2);
        assert_eq!(psram.fb_location, FbLocation::Psram);

        let dram = SensorConfig::for_memory(false);
        assert_eq!(dram.frame_size, FrameSize::Svga);
        assert_eq!(dram.jpeg_quality, 12);
        assert_eq!(dram.fb_count, 1);
        assert_eq!(dram.fb_location, FbLocation::Dram);
    }

    #[test]
    fn test_pattern_is_jpeg_framed() {
        let jpeg = test_pattern(3);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
        let text = String::from_utf8_lossy(&jpeg);
        assert!(text.contains("rover test frame 3"));
    }

    #[test]
    fn sim_pool_limits_outstanding_buffers() {
        let mut sensor = SimulatedSensor::new();
        sensor.init(&SensorConfig::for_memory(false)).unwrap();

        let first = sensor.grab().unwrap();
        // Single DRAM buffer: nothing left until it comes back
        assert!(matches!(sensor.grab(), Err(CameraError::Driver(_))));

        sensor.give_back(first);
        let second = sensor.grab().unwrap();
        assert_eq!(second.slot(), 0);
        sensor.give_back(second);

        let stats = sensor.stats();
        assert_eq!(stats.grabs(), 2);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn uninitialized_sim_refuses_grab() {
        let mut sensor = SimulatedSensor::new();
        assert!(matches!(sensor.grab(), Err(CameraError::Unavailable)));
    }

    #[test]
    fn failing_sim_init() {
        let mut sensor = SimulatedSensor::failing();
        assert!(sensor.init(&SensorConfig::for_memory(true)).is_err());
    }

    #[test]
    fn fixture_rejects_non_jpeg() {
        let path = std::env::temp_dir().join(format!("rover-fixture-{}.txt", std::process::id()));
        fs::write(&path, b"not a jpeg").unwrap();
        let mut sensor = FixtureSensor::new(&path);
        assert!(sensor.init(&SensorConfig::for_memory(false)).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn fixture_serves_file_bytes() {
        let path = std::env::temp_dir().join(format!("rover-fixture-{}.jpg", std::process::id()));
        let jpeg = test_pattern(1);
        fs::write(&path, &jpeg).unwrap();

        let mut sensor = FixtureSensor::new(&path);
        sensor.init(&SensorConfig::for_memory(false)).unwrap();
        let buffer = sensor.grab().unwrap();
        assert_eq!(buffer.bytes(), jpeg.as_slice());
        sensor.give_back(buffer);
        assert_eq!(sensor.stats().outstanding(), 0);
        let _ = fs::remove_file(&path);
    }
}
