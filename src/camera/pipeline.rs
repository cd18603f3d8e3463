// Single-shot capture: grab, copy out, give back, hand the copy to the caller

use bytes::Bytes;
use tracing::{info, warn};

use super::sensor::{CameraError, FrameSource, SensorConfig};
use crate::config::{FRAME_HEAP_LIMIT, STREAM_CHUNK_BYTES};

/// Camera state, decided once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraState {
    #[default]
    Uninitialized,
    Ready,
    Failed,
}

impl CameraState {
    pub fn is_ready(self) -> bool {
        self == CameraState::Ready
    }
}

/// One JPEG image, owned independently of the sensor driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame into a chunk producer of `STREAM_CHUNK_BYTES`
    pub fn into_chunks(self) -> FrameChunks {
        self.into_chunks_of(STREAM_CHUNK_BYTES)
    }

    pub fn into_chunks_of(self, chunk_size: usize) -> FrameChunks {
        FrameChunks {
            rest: self.bytes,
            chunk_size: chunk_size.max(1),
        }
    }
}

/// Produces a frame's bytes front to back, at most `chunk_size` per call.
/// Chunks share the frame's allocation; it is freed once this and every
/// chunk handed out are dropped. Finite and not restartable.
#[derive(Debug)]
pub struct FrameChunks {
    rest: Bytes,
    chunk_size: usize,
}

impl FrameChunks {
    /// Bytes not yet produced
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

impl Iterator for FrameChunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let n = self.chunk_size.min(self.rest.len());
        Some(self.rest.split_to(n))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining().div_ceil(self.chunk_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for FrameChunks {}

/// Owns the sensor and its once-only state
pub struct CapturePipeline {
    sensor: Option<Box<dyn FrameSource>>,
    state: CameraState,
    heap_limit: usize,
}

impl CapturePipeline {
    /// A pipeline without a sensor; stays uninitialized
    pub fn disabled() -> Self {
        Self {
            sensor: None,
            state: CameraState::Uninitialized,
            heap_limit: FRAME_HEAP_LIMIT,
        }
    }

    /// Configure and initialize `sensor` once. Failure is recorded, never retried.
    pub fn initialize(mut sensor: Box<dyn FrameSource>, config: SensorConfig) -> Self {
        let state = match sensor.init(&config) {
            Ok(()) => {
                let (w, h) = config.frame_size.dimensions();
                info!(
                    "Camera ready: {} {}x{} q={} fb={}x{:?}",
                    sensor.name(),
                    w,
                    h,
                    config.jpeg_quality,
                    config.fb_count,
                    config.fb_location
                );
                CameraState::Ready
            }
            Err(e) => {
                warn!("Camera init failed: {}", e);
                CameraState::Failed
            }
        };

        Self {
            sensor: Some(sensor),
            state,
            heap_limit: FRAME_HEAP_LIMIT,
        }
    }

    /// Largest frame copy `capture` will allocate
    pub fn with_heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit = bytes;
        self
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Acquire one fresh frame and return an owned copy of it.
    ///
    /// The driver's buffer is given back before this returns, on success
    /// and on `OutOfMemory` alike.
    pub fn capture(&mut self) -> Result<Frame, CameraError> {
        if !self.state.is_ready() {
            return Err(CameraError::Unavailable);
        }
        let sensor = self.sensor.as_mut().ok_or(CameraError::Unavailable)?;

        let buffer = sensor.grab()?;
        let copied = copy_frame(buffer.bytes(), self.heap_limit);
        sensor.give_back(buffer);

        let frame = copied?;
        info!("Captured frame: {} bytes", frame.len());
        Ok(frame)
    }
}

fn copy_frame(src: &[u8], heap_limit: usize) -> Result<Frame, CameraError> {
    let requested = src.len();
    if requested > heap_limit {
        return Err(CameraError::OutOfMemory { requested });
    }
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(requested)
        .map_err(|_| CameraError::OutOfMemory { requested })?;
    bytes.extend_from_slice(src);
    Ok(Frame {
        bytes: Bytes::from(bytes),
    })
}
