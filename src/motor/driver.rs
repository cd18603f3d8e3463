// GPIO actuation layer for the two-channel differential drive
//
// Four PWM-capable outputs: each drive side (channel) has a forward and a
// reverse line. This layer only writes duty values; keeping forward and
// reverse of the same channel from being energized together is the
// sequencer's job.

use std::sync::{Arc, Mutex};

use tracing::debug;

/// One of the two physical drive sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorChannel {
    Left,
    Right,
}

/// One of the two output lines of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Forward,
    Reverse,
}

/// All channels, in output order
pub const CHANNELS: [MotorChannel; 2] = [MotorChannel::Left, MotorChannel::Right];

/// All lines of a channel, in output order
pub const LINES: [Line; 2] = [Line::Forward, Line::Reverse];

/// Output index of a (channel, line) pair: left-fwd, left-rev, right-fwd, right-rev
pub fn output_index(channel: MotorChannel, line: Line) -> usize {
    let base = match channel {
        MotorChannel::Left => 0,
        MotorChannel::Right => 2,
    };
    match line {
        Line::Forward => base,
        Line::Reverse => base + 1,
    }
}

/// Error types for the actuation layer. Any of these is fatal: the rover
/// can no longer be trusted to stop.
#[derive(Debug, thiserror::Error)]
pub enum ActuationError {
    #[error("Output bus error on {channel:?}/{line:?}: {reason}")]
    Bus {
        channel: MotorChannel,
        line: Line,
        reason: String,
    },

    #[error("Output backend failed to initialize: {0}")]
    Init(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ActuationError>;

/// A backend able to set the drive intensity of one output line
pub trait LineDriver: Send {
    /// Set one output's drive intensity (0 = off, `MAX_POWER` = full)
    fn set_line(&mut self, channel: MotorChannel, line: Line, power: u8) -> Result<()>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// A single line write, as recorded by [`SimulatedLines`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineWrite {
    pub channel: MotorChannel,
    pub line: Line,
    pub power: u8,
}


/// In-memory output lines
///
/// Keeps the current duty of all four outputs. A `recording()` instance
/// also logs every write. Clones share the same state, so a test can keep
/// a handle while the sequencer owns the driver.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLines {
    inner: Arc<Mutex<SimState>>,
}

#[derive(Debug, Default)]
struct SimState {
    outputs: [u8; 4],
    attempts: usize,
    log: Option<Vec<LineWrite>>,
    failure: Option<InjectedFailure>,
}

/// Which write attempts fail, counted from zero
#[derive(Debug, Clone, Copy)]
enum InjectedFailure {
    From(usize),
    Only(usize),
}

impl InjectedFailure {
    fn hits(self, attempt: usize) -> bool {
        match self {
            InjectedFailure::From(n) => attempt >= n,
            InjectedFailure::Only(n) => attempt == n,
        }
    }
}

impl SimulatedLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that also keep a log of every successful write
    pub fn recording() -> Self {
        let lines = Self::default();
        lines.lock().log = Some(Vec::new());
        lines
    }

    /// Fail every write attempt after the first `writes` ones
    pub fn fail_after(self, writes: usize) -> Self {
        self.lock().failure = Some(InjectedFailure::From(writes));
        self
    }

    /// Fail only write attempt number `attempt` (zero-based)
    pub fn fail_once_at(self, attempt: usize) -> Self {
        self.lock().failure = Some(InjectedFailure::Only(attempt));
        self
    }

    /// Current duty of one output
    pub fn power(&self, channel: MotorChannel, line: Line) -> u8 {
        self.lock().outputs[output_index(channel, line)]
    }

    /// Current duty of all outputs: [left-fwd, left-rev, right-fwd, right-rev]
    pub fn outputs(&self) -> [u8; 4] {
        self.lock().outputs
    }

    /// Every logged write, oldest first. Empty unless `recording()`.
    pub fn writes(&self) -> Vec<LineWrite> {
        self.lock().log.clone().unwrap_or_default()
    }

    pub fn clear_writes(&self) {
        if let Some(log) = self.lock().log.as_mut() {
            log.clear();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        // A poisoned sim only means a test panicked mid-write; the data is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LineDriver for SimulatedLines {
    fn set_line(&mut self, channel: MotorChannel, line: Line, power: u8) -> Result<()> {
        let mut state = self.lock();
        let attempt = state.attempts;
        state.attempts += 1;
        if state.failure.is_some_and(|f| f.hits(attempt)) {
            return Err(ActuationError::Bus {
                channel,
                line,
                reason: "simulated write failure".to_string(),
            });
        }
        debug!("sim {:?}/{:?} <- {}", channel, line, power);
        state.outputs[output_index(channel, line)] = power;
        if let Some(log) = state.log.as_mut() {
            log.push(LineWrite {
                channel,
                line,
                power,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sim"
    }
}
