// Named maneuvers and their output activations

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::driver::{Line, MotorChannel};
use crate::config::{DEFAULT_DURATION_MS, MAX_DURATION_MS, MIN_DURATION_MS};

/// A motion command the sequencer can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maneuver {
    Forward,
    Backward,
    #[serde(rename = "left")]
    TurnLeft,
    #[serde(rename = "right")]
    TurnRight,
    Stop,
}

impl Maneuver {
    pub const ALL: [Maneuver; 5] = [
        Maneuver::Forward,
        Maneuver::Backward,
        Maneuver::TurnLeft,
        Maneuver::TurnRight,
        Maneuver::Stop,
    ];

    /// The two (channel, line) pairs energized by this maneuver.
    /// Each channel appears exactly once; `Stop` energizes nothing.
    pub fn activations(self) -> &'static [(MotorChannel, Line)] {
        use Line::{Forward, Reverse};
        use MotorChannel::{Left, Right};

        match self {
            Maneuver::Forward => &[(Left, Forward), (Right, Forward)],
            Maneuver::Backward => &[(Left, Reverse), (Right, Reverse)],
            // Spin in place: sides run in opposite directions
            Maneuver::TurnLeft => &[(Left, Reverse), (Right, Forward)],
            Maneuver::TurnRight => &[(Left, Forward), (Right, Reverse)],
            Maneuver::Stop => &[],
        }
    }

    /// Action name used in routes and replies
    pub fn action(self) -> &'static str {
        match self {
            Maneuver::Forward => "forward",
            Maneuver::Backward => "backward",
            Maneuver::TurnLeft => "left",
            Maneuver::TurnRight => "right",
            Maneuver::Stop => "stop",
        }
    }
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown maneuver: {0}")]
pub struct UnknownManeuver(pub String);

impl FromStr for Maneuver {
    type Err = UnknownManeuver;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Maneuver::ALL
            .into_iter()
            .find(|m| m.action() == s)
            .ok_or_else(|| UnknownManeuver(s.to_string()))
    }
}

/// How long a maneuver drives, always within [MIN_DURATION_MS, MAX_DURATION_MS]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DriveDuration(u32);

impl DriveDuration {
    /// Clamp a requested millisecond count into range
    pub fn clamped(ms: i64) -> Self {
        Self(ms.clamp(MIN_DURATION_MS as i64, MAX_DURATION_MS as i64) as u32)
    }

    /// Read the `duration` query value. Absent or non-integer values fall
    /// back to the default; out-of-range values are clamped.
    pub fn from_param(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .map(Self::clamped)
            .unwrap_or_default()
    }

    pub fn as_millis(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0 as u64)
    }
}

impl Default for DriveDuration {
    fn default() -> Self {
        Self(DEFAULT_DURATION_MS)
    }
}

impl fmt::Display for DriveDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
