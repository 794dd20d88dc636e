//! Read-only status projection with long-poll delivery
//!
//! Status is projected from the newest detail row for a (room, bill); when
//! no detail exists yet the newest operation row stands in. The long-poll
//! variant samples once a second and returns as soon as any watched field
//! changes, or after a bounded wait with whatever is current. Dropping the
//! future (client disconnect) cancels the wait immediately.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::Config;
use crate::scheduler::types::{AcState, Mode, Speed};
use crate::store::{Detail, FleetStore, Operation, OperationKind};

/// Point-in-time view of one unit for a guest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcStatus {
    /// Room the unit serves
    pub room_id: i64,
    /// Bill the session accrues against
    pub bill_id: i64,
    /// Unit identity
    pub ac_id: i64,
    /// Lifecycle state
    pub ac_status: AcState,
    /// Operating mode
    pub mode: Mode,
    /// Fan speed
    pub speed: Speed,
    /// Requested temperature (tenths of a degree)
    pub target_temp: i32,
    /// Ambient temperature
    pub environment_temp: i32,
    /// Room temperature
    pub current_temp: i32,
    /// Money accrued this session (tenths of a unit)
    pub current_cost: i64,
    /// Money accrued this stay
    pub total_cost: i64,
    /// Seconds served over the stay
    pub running_time: u64,
    /// Seconds served this session
    pub current_running_time: u64,
    /// Charge rate per tick; zero while not serving
    pub rate: f64,
    /// Unix seconds of the underlying row
    pub recorded_at: u64,
}

impl AcStatus {
    fn from_detail(d: &Detail) -> Self {
        Self {
            room_id: d.room_id,
            bill_id: d.bill_id,
            ac_id: d.ac_id,
            ac_status: d.ac_status,
            mode: d.mode,
            speed: d.speed,
            target_temp: d.target_temp,
            environment_temp: d.environment_temp,
            current_temp: d.current_temp,
            current_cost: d.current_cost,
            total_cost: d.total_cost,
            running_time: d.running_time,
            current_running_time: d.current_running_time,
            rate: d.rate,
            recorded_at: d.recorded_at,
        }
    }

    fn from_operation(op: &Operation) -> Self {
        let ac_status = match op.op_state {
            OperationKind::PowerOff => AcState::OffWarming,
            OperationKind::PowerOn | OperationKind::Adjust => AcState::Waiting,
        };
        Self {
            room_id: op.room_id,
            bill_id: op.bill_id,
            ac_id: op.ac_id,
            ac_status,
            mode: op.mode,
            speed: op.speed,
            target_temp: op.target_temp,
            environment_temp: op.environment_temp,
            current_temp: op.current_temp,
            current_cost: op.current_cost,
            total_cost: op.total_cost,
            running_time: op.running_time,
            current_running_time: op.current_running_time,
            rate: 0.0,
            recorded_at: op.recorded_at,
        }
    }

    /// Whether a watched field changed relative to `earlier`
    #[must_use]
    pub fn differs_from(&self, earlier: &AcStatus) -> bool {
        self.ac_status != earlier.ac_status
            || self.current_temp != earlier.current_temp
            || self.current_cost != earlier.current_cost
            || self.total_cost != earlier.total_cost
            || self.speed != earlier.speed
            || self.mode != earlier.mode
            || self.target_temp != earlier.target_temp
            || self.current_running_time != earlier.current_running_time
            || self.running_time != earlier.running_time
    }
}

/// Read-only status access over the fleet store
pub struct StatusQuery {
    store: Arc<FleetStore>,
    sample: Duration,
    max_wait: Duration,
}

impl StatusQuery {
    /// Create a status query with the configured long-poll pacing
    #[must_use]
    pub fn new(store: Arc<FleetStore>, cfg: &Config) -> Self {
        Self {
            store,
            sample: Duration::from_secs(cfg.long_poll_sample_secs),
            max_wait: Duration::from_secs(cfg.long_poll_wait_secs),
        }
    }

    /// Create a status query with explicit pacing (tests)
    #[must_use]
    pub fn with_pacing(store: Arc<FleetStore>, sample: Duration, max_wait: Duration) -> Self {
        Self {
            store,
            sample,
            max_wait,
        }
    }

    /// Latest status for (room, bill), if the unit was ever commanded
    #[must_use]
    pub fn current(&self, room_id: i64, bill_id: i64) -> Option<AcStatus> {
        if let Some(detail) = self.store.latest_detail(room_id, bill_id) {
            return Some(AcStatus::from_detail(&detail));
        }
        self.store
            .latest_operation(room_id, bill_id)
            .map(|op| AcStatus::from_operation(&op))
    }

    /// Wait until the status changes, bounded by the configured maximum
    ///
    /// Returns the changed status as soon as any watched field differs from
    /// the initial sample, or the current status once the bound elapses.
    pub async fn long_poll(&self, room_id: i64, bill_id: i64) -> Option<AcStatus> {
        let initial = self.current(room_id, bill_id);
        let deadline = Instant::now() + self.max_wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.current(room_id, bill_id);
            }
            tokio::time::sleep(self.sample.min(remaining)).await;
            let latest = self.current(room_id, bill_id);
            match (&initial, &latest) {
                (None, Some(_)) => return latest,
                (Some(first), Some(now)) if now.differs_from(first) => return latest,
                _ => {}
            }
        }
    }
}
