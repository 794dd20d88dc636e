//! Scheduler Core Types
//!
//! Common types for the serving/buffer/warming scheduler: operating mode,
//! fan speed, entry lifecycle state, the in-memory control block, and the
//! snapshot structures exposed to operators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClimatizarError;

/// Number of rooms the plant can actively serve at once
pub const SERVING_SLOTS: usize = 3;

/// Operating mode of an air conditioner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Drive the room temperature down toward the target
    Cooling,
    /// Drive the room temperature up toward the target
    Heating,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cooling => write!(f, "cooling"),
            Self::Heating => write!(f, "heating"),
        }
    }
}

impl FromStr for Mode {
    type Err = ClimatizarError;

    /// Accepts the canonical spellings plus the short forms seen from
    /// clients ("cool", "heat"); everything else is rejected at the edge.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cooling" | "cool" => Ok(Self::Cooling),
            "heating" | "heat" => Ok(Self::Heating),
            other => Err(ClimatizarError::InvalidParameter {
                reason: format!("unknown mode '{other}' (expected cooling or heating)"),
            }),
        }
    }
}

/// Fan speed of an air conditioner; priority derives from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    /// High fan speed, priority 1
    High,
    /// Medium fan speed, priority 2
    Medium,
    /// Low fan speed, priority 3
    Low,
}

impl Speed {
    /// Scheduling priority derived from this speed (lower is served first)
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Speed {
    type Err = ClimatizarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ClimatizarError::InvalidParameter {
                reason: format!("unknown speed '{other}' (expected high, medium or low)"),
            }),
        }
    }
}

/// Lifecycle state of a tracked schedule entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcState {
    /// Occupying one of the serving slots and consuming plant capacity
    Running,
    /// In the buffer behind the serving prefix
    Waiting,
    /// User powered the unit off; drifting toward ambient
    OffWarming,
    /// Reached its target temperature; drifting until re-engagement
    TargetWarming,
}

impl AcState {
    /// Whether the entry is in one of the two warming causes
    #[must_use]
    pub fn is_warming(self) -> bool {
        matches!(self, Self::OffWarming | Self::TargetWarming)
    }
}

impl fmt::Display for AcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::OffWarming => write!(f, "off-warming"),
            Self::TargetWarming => write!(f, "target-warming"),
        }
    }
}

/// In-memory control block for an air conditioner tracked by the scheduler
///
/// Temperatures are integer tenths of a degree; money accumulates in integer
/// tenths of a currency unit (one unit of temperature change costs one unit).
/// Times are seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Unit identity
    pub ac_id: i64,
    /// Bill the session accrues against
    pub bill_id: i64,
    /// Room the unit serves
    pub room_id: i64,
    /// Lifecycle state
    pub ac_state: AcState,
    /// Operating mode
    pub mode: Mode,
    /// Fan speed; scheduling priority derives from it
    pub current_speed: Speed,
    /// Room temperature right now
    pub current_temp: i32,
    /// Temperature the guest asked for
    pub target_temp: i32,
    /// Ambient temperature the room drifts toward when unserved
    pub environment_temp: i32,
    /// Money accrued since the last power-on
    pub current_cost: i64,
    /// Money accrued over the whole stay
    pub total_cost: i64,
    /// Seconds served over the whole stay
    pub running_time: u64,
    /// Seconds served since last entering a serving slot
    pub current_running_time: u64,
    /// Rotation counter for the equal-priority round-robin regime
    pub round_robin_count: u32,
    /// Temperature movement applied on the most recent tick
    #[serde(skip)]
    pub last_temp_change: i32,
    /// Whether the closing power-off operation row has been written
    #[serde(skip)]
    pub off_recorded: bool,
}

impl ScheduleEntry {
    /// Create a fresh control block in the waiting state
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ac_id: i64,
        bill_id: i64,
        room_id: i64,
        mode: Mode,
        speed: Speed,
        target_temp: i32,
        environment_temp: i32,
        current_temp: i32,
    ) -> Self {
        Self {
            ac_id,
            bill_id,
            room_id,
            ac_state: AcState::Waiting,
            mode,
            current_speed: speed,
            current_temp,
            target_temp,
            environment_temp,
            current_cost: 0,
            total_cost: 0,
            running_time: 0,
            current_running_time: 0,
            round_robin_count: 0,
            last_temp_change: 0,
            off_recorded: false,
        }
    }

    /// Scheduling priority (1 = high speed, 3 = low speed)
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.current_speed.priority()
    }
}

/// Counters the scheduler accumulates over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Power-on requests admitted (including re-admissions from warming)
    pub total_requests: u64,
    /// Entries that reached their target temperature
    pub completed_targets: u64,
    /// Serving entries demoted to waiting at a rebuild
    pub preemptions: u64,
    /// Equal-priority round-robin slot rotations performed
    pub rotations: u64,
    /// Entries retired after off-warming completed at ambient
    pub retired: u64,
}

/// Operator-facing snapshot of the scheduler state
#[derive(Debug, Clone, Serialize)]
pub struct AdminSnapshot {
    /// Whether the tick loop is alive
    pub is_running: bool,
    /// Ticks handled since the clock started
    pub tick_count: u64,
    /// Priority class of the active round-robin regime, if any
    pub current_priority: Option<u8>,
    /// Entries occupying the serving slots (buffer prefix)
    pub serving: Vec<ScheduleEntry>,
    /// Buffer entries behind the serving prefix
    pub buffer_tail: Vec<ScheduleEntry>,
    /// Entries drifting toward ambient
    pub warming: Vec<ScheduleEntry>,
    /// Lifetime counters
    pub stats: SchedulerStats,
}
