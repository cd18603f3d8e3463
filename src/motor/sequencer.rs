// Motion sequencer: turns a maneuver + duration into timed output writes
//
// Every maneuver is bracketed by a full stop, so nothing from the previous
// command bleeds into the next one and the rover is always stopped on return.

use std::thread;
use std::time::Duration;

use tracing::{error, info};

use super::driver::{LineDriver, Result, CHANNELS, LINES};
use super::maneuver::{DriveDuration, Maneuver};
use crate::config::{DRIVE_POWER, SETTLE_TIME, WIGGLE_CYCLES, WIGGLE_ON_TIME, WIGGLE_PAUSE};

/// Blocking wait used between output writes
pub trait Pause: Send {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Owns the actuation layer and runs maneuvers on it
pub struct MotionSequencer {
    lines: Box<dyn LineDriver>,
    pause: Box<dyn Pause>,
    power: u8,
}

impl MotionSequencer {
    pub fn new(lines: Box<dyn LineDriver>) -> Self {
        Self::with_pause(lines, Box::new(ThreadSleep))
    }

    pub fn with_pause(lines: Box<dyn LineDriver>, pause: Box<dyn Pause>) -> Self {
        Self {
            lines,
            pause,
            power: DRIVE_POWER,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.lines.name()
    }

    /// Execute `maneuver` for `duration`, blocking for settle + duration.
    ///
    /// `Stop` only forces the full stop and returns immediately.
    /// An output write failure is returned after a best-effort full stop;
    /// callers must treat it as fatal.
    pub fn execute(&mut self, maneuver: Maneuver, duration: DriveDuration) -> Result<()> {
        self.all_stop()?;
        if maneuver == Maneuver::Stop {
            info!("Motors stopped");
            return Ok(());
        }

        info!("Executing {} for {}", maneuver, duration);
        self.pause.pause(SETTLE_TIME);
        let driven = self.drive(maneuver, duration.as_duration());
        let stopped = self.all_stop();
        driven.and(stopped)
    }

    /// Three left/right wiggles signalling the rover is ready
    pub fn boot_wiggle(&mut self) -> Result<()> {
        info!("Boot wiggle ({} cycles)", WIGGLE_CYCLES);
        self.all_stop()?;
        for _ in 0..WIGGLE_CYCLES {
            for diagonal in [Maneuver::TurnLeft, Maneuver::TurnRight] {
                let driven = self.drive(diagonal, WIGGLE_ON_TIME);
                self.all_stop()?;
                driven?;
                self.pause.pause(WIGGLE_PAUSE);
            }
        }
        Ok(())
    }

    /// Energize the maneuver's lines, hold, and leave them energized
    fn drive(&mut self, maneuver: Maneuver, hold: Duration) -> Result<()> {
        for &(channel, line) in maneuver.activations() {
            self.lines.set_line(channel, line, self.power)?;
        }
        self.pause.pause(hold);
        Ok(())
    }

    /// Zero all four outputs. Every output is attempted even if one fails;
    /// the first failure is returned.
    pub fn all_stop(&mut self) -> Result<()> {
        let mut first_err = None;
        for channel in CHANNELS {
            for line in LINES {
                if let Err(e) = self.lines.set_line(channel, line, 0) {
                    error!("Failed to zero {:?}/{:?}: {}", channel, line, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for MotionSequencer {
    fn drop(&mut self) {
        // Leave the rover stopped when the sequencer goes away
        let _ = self.all_stop();
    }
}
