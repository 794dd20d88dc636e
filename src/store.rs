//! Fleet state store
//!
//! The only component touching durable storage. Persistence is an
//! append-only JSON Lines log: one tagged record per line for provisioned
//! units, room check-ins/check-outs, command operations, power-off
//! amendments, and per-tick detail snapshots. On open the log is replayed
//! to rebuild the in-memory indexes; the log order is advisory and replay
//! is idempotent, so a torn trailing line is skipped rather than fatal.
//!
//! Writers are the scheduler's detail writer and the intake's operation
//! recorder. Readers take a shared lock and never require transactions.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ClimatizarError, Result};
use crate::scheduler::types::{AcState, Mode, Speed};

/// Current time as unix seconds
#[must_use]
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// A provisioned air conditioner (1:1 with its room)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirConditioner {
    /// Unit identity
    pub ac_id: i64,
    /// Room the unit serves
    pub room_id: i64,
    /// Ambient temperature the room drifts toward (tenths of a degree)
    pub environment_temp: i32,
}

/// Kind of a user command in the operation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Unit switched on
    PowerOn,
    /// Unit switched off
    PowerOff,
    /// Target, speed or mode adjusted
    Adjust,
}

/// One row of the append-only command log
///
/// Rows are immutable except that the most recent power-off row for a
/// (bill, room) is amended with the closing cost, temperature and running
/// times once the unit actually settles into its warming residence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Bill the command accrues against
    pub bill_id: i64,
    /// Room the command targets
    pub room_id: i64,
    /// Unit the command targets
    pub ac_id: i64,
    /// What the guest asked for
    pub op_state: OperationKind,
    /// Operating mode in effect after the command
    pub mode: Mode,
    /// Fan speed in effect after the command
    pub speed: Speed,
    /// Target temperature in effect after the command
    pub target_temp: i32,
    /// Ambient temperature of the room
    pub environment_temp: i32,
    /// Room temperature when the command was taken
    pub current_temp: i32,
    /// Session cost at command time (amended on power-off settlement)
    pub current_cost: i64,
    /// Stay cost at command time
    pub total_cost: i64,
    /// Seconds served over the stay at command time
    pub running_time: u64,
    /// Seconds served in the session at command time
    pub current_running_time: u64,
    /// Power-ons recorded for this unit so far
    pub switch_count: u32,
    /// Unix seconds when the row was written
    pub recorded_at: u64,
}

/// One per-tick snapshot of a tracked unit, the billing audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    /// Bill the snapshot accrues against
    pub bill_id: i64,
    /// Room of the unit
    pub room_id: i64,
    /// Unit identity
    pub ac_id: i64,
    /// Lifecycle state at snapshot time
    pub ac_status: AcState,
    /// Fan speed at snapshot time
    pub speed: Speed,
    /// Operating mode at snapshot time
    pub mode: Mode,
    /// Target temperature
    pub target_temp: i32,
    /// Ambient temperature
    pub environment_temp: i32,
    /// Room temperature after this tick
    pub current_temp: i32,
    /// Seconds served over the stay
    pub running_time: u64,
    /// Seconds served in the session
    pub current_running_time: u64,
    /// Money accrued this session (tenths of a unit)
    pub current_cost: i64,
    /// Money accrued this stay
    pub total_cost: i64,
    /// Charge rate per tick derived from speed; zero while not serving
    pub rate: f64,
    /// Temperature movement applied this tick (tenths of a degree)
    pub temp_change: i32,
    /// Unix seconds when the row was written
    pub recorded_at: u64,
}

/// Kind of a booking event the intake consults for bill resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomOperationKind {
    /// Guest checked in; opens a bill
    CheckIn,
    /// Guest checked out; closes the bill
    CheckOut,
}

/// One row of the booking trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOperation {
    /// Room the event concerns
    pub room_id: i64,
    /// Bill opened or closed by the event
    pub bill_id: i64,
    /// Check-in or check-out
    pub kind: RoomOperationKind,
    /// Unix seconds when the row was written
    pub recorded_at: u64,
}

/// Amendment patching the most recent power-off row of a (bill, room)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PowerOffSettlement {
    bill_id: i64,
    room_id: i64,
    current_cost: i64,
    current_temp: i32,
    running_time: u64,
    current_running_time: u64,
    recorded_at: u64,
}

/// One line of the append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "kebab-case")]
enum LogRecord {
    /// A provisioned unit
    Ac(AirConditioner),
    /// A booking event
    RoomOp(RoomOperation),
    /// A command row
    Operation(Operation),
    /// A power-off closing amendment
    PowerOffSettlement(PowerOffSettlement),
    /// A per-tick snapshot
    Detail(Detail),
}

#[derive(Default)]
struct StoreInner {
    acs: HashMap<i64, AirConditioner>,
    next_ac_id: i64,
    room_ops: Vec<RoomOperation>,
    next_bill_id: i64,
    operations: Vec<Operation>,
    details: Vec<Detail>,
}

impl StoreInner {
    fn apply(&mut self, record: LogRecord) {
        match record {
            LogRecord::Ac(ac) => {
                self.next_ac_id = self.next_ac_id.max(ac.ac_id + 1);
                self.acs.insert(ac.room_id, ac);
            }
            LogRecord::RoomOp(op) => {
                self.next_bill_id = self.next_bill_id.max(op.bill_id + 1);
                self.room_ops.push(op);
            }
            LogRecord::Operation(op) => self.operations.push(op),
            LogRecord::PowerOffSettlement(s) => self.settle(&s),
            LogRecord::Detail(d) => self.details.push(d),
        }
    }

    fn settle(&mut self, s: &PowerOffSettlement) {
        let row = self.operations.iter_mut().rev().find(|op| {
            op.bill_id == s.bill_id
                && op.room_id == s.room_id
                && op.op_state == OperationKind::PowerOff
        });
        if let Some(op) = row {
            op.current_cost = s.current_cost;
            op.current_temp = s.current_temp;
            op.running_time = s.running_time;
            op.current_running_time = s.current_running_time;
        }
    }
}

/// Durable fleet state: units, bookings, operations, details
///
/// Thread-safe: readers take a shared lock, writers serialize through an
/// exclusive lock plus an append mutex for the log file.
pub struct FleetStore {
    inner: RwLock<StoreInner>,
    log: Option<Mutex<File>>,
}

impl FleetStore {
    /// Create a store with no durable log (tests, demo mode)
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            log: None,
        }
    }

    /// Open (or create) a store at `path`, replaying any existing log
    ///
    /// # Errors
    ///
    /// Returns `StorePersist` when the log cannot be created or read.
    /// Unparseable lines (a torn trailing write) are skipped.
    pub fn open(path: &Path) -> Result<Self> {
        let mut inner = StoreInner::default();
        if path.exists() {
            let file = File::open(path).map_err(persist_err)?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(persist_err)?;
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(record) = serde_json::from_str::<LogRecord>(&line) {
                    inner.apply(record);
                }
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(persist_err)?;
        Ok(Self {
            inner: RwLock::new(inner),
            log: Some(Mutex::new(file)),
        })
    }

    fn append(&self, record: &LogRecord) -> Result<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        let line = serde_json::to_string(record).map_err(persist_err)?;
        let mut file = log.lock().map_err(|_| ClimatizarError::StorePersist {
            reason: "log lock poisoned".to_string(),
        })?;
        writeln!(file, "{line}").map_err(persist_err)?;
        file.flush().map_err(persist_err)
    }

    /// Provision a unit for `room_id`, or return the existing one
    ///
    /// # Errors
    ///
    /// Returns `StorePersist` when the provisioning record cannot be written.
    pub fn provision_ac(&self, room_id: i64, environment_temp: i32) -> Result<i64> {
        let mut inner = self.write_inner()?;
        if let Some(ac) = inner.acs.get(&room_id) {
            return Ok(ac.ac_id);
        }
        let ac = AirConditioner {
            ac_id: inner.next_ac_id,
            room_id,
            environment_temp,
        };
        self.append(&LogRecord::Ac(ac.clone()))?;
        inner.next_ac_id += 1;
        inner.acs.insert(room_id, ac.clone());
        Ok(ac.ac_id)
    }

    /// Unit provisioned for `room_id`, if any
    #[must_use]
    pub fn ac_for_room(&self, room_id: i64) -> Option<AirConditioner> {
        self.inner.read().ok()?.acs.get(&room_id).cloned()
    }

    /// All provisioned units
    #[must_use]
    pub fn all_acs(&self) -> Vec<AirConditioner> {
        self.inner
            .read()
            .map(|inner| inner.acs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Open a bill for `room_id`
    ///
    /// # Errors
    ///
    /// Returns `UnknownRoom` for an unprovisioned room, `InvalidParameter`
    /// when a bill is already open, `StorePersist` on log failure.
    pub fn check_in(&self, room_id: i64) -> Result<i64> {
        let mut inner = self.write_inner()?;
        if !inner.acs.contains_key(&room_id) {
            return Err(ClimatizarError::UnknownRoom { room_id });
        }
        if active_bill_of(&inner, room_id).is_some() {
            return Err(ClimatizarError::InvalidParameter {
                reason: format!("room {room_id} already has an active booking"),
            });
        }
        let op = RoomOperation {
            room_id,
            bill_id: inner.next_bill_id,
            kind: RoomOperationKind::CheckIn,
            recorded_at: now_unix(),
        };
        self.append(&LogRecord::RoomOp(op.clone()))?;
        inner.next_bill_id += 1;
        let bill_id = op.bill_id;
        inner.room_ops.push(op);
        Ok(bill_id)
    }

    /// Close the active bill for `room_id`
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBooking` when no bill is open, `StorePersist` on
    /// log failure.
    pub fn check_out(&self, room_id: i64) -> Result<()> {
        let mut inner = self.write_inner()?;
        let Some(bill_id) = active_bill_of(&inner, room_id) else {
            return Err(ClimatizarError::NoActiveBooking { room_id });
        };
        let op = RoomOperation {
            room_id,
            bill_id,
            kind: RoomOperationKind::CheckOut,
            recorded_at: now_unix(),
        };
        self.append(&LogRecord::RoomOp(op.clone()))?;
        inner.room_ops.push(op);
        Ok(())
    }

    /// Bill opened by the most recent check-in with no later check-out
    #[must_use]
    pub fn active_bill(&self, room_id: i64) -> Option<i64> {
        let guard = self.inner.read().ok()?;
        active_bill_of(&guard, room_id)
    }

    /// Append a command row
    ///
    /// # Errors
    ///
    /// Returns `StorePersist` when the row cannot be written; the caller
    /// treats this as fatal for power-on commands.
    pub fn record_operation(&self, op: Operation) -> Result<()> {
        let mut inner = self.write_inner()?;
        self.append(&LogRecord::Operation(op.clone()))?;
        inner.operations.push(op);
        Ok(())
    }

    /// Amend the most recent power-off row of (bill, room) with the
    /// closing cost, temperature and running times
    ///
    /// # Errors
    ///
    /// Returns `StorePersist` when the amendment cannot be written.
    pub fn finalize_power_off(
        &self,
        bill_id: i64,
        room_id: i64,
        current_cost: i64,
        current_temp: i32,
        running_time: u64,
        current_running_time: u64,
    ) -> Result<()> {
        let mut inner = self.write_inner()?;
        let settlement = PowerOffSettlement {
            bill_id,
            room_id,
            current_cost,
            current_temp,
            running_time,
            current_running_time,
            recorded_at: now_unix(),
        };
        self.append(&LogRecord::PowerOffSettlement(settlement.clone()))?;
        inner.settle(&settlement);
        Ok(())
    }

    /// Append a per-tick snapshot
    ///
    /// # Errors
    ///
    /// Returns `StorePersist` when the log write fails. The snapshot is
    /// still indexed in memory so status queries keep working; the caller
    /// logs and counts the failure without rolling anything back.
    pub fn append_detail(&self, detail: Detail) -> Result<()> {
        let mut inner = self.write_inner()?;
        let persisted = self.append(&LogRecord::Detail(detail.clone()));
        inner.details.push(detail);
        persisted
    }

    /// Most recent snapshot for (room, bill)
    #[must_use]
    pub fn latest_detail(&self, room_id: i64, bill_id: i64) -> Option<Detail> {
        self.inner
            .read()
            .ok()?
            .details
            .iter()
            .rev()
            .find(|d| d.room_id == room_id && d.bill_id == bill_id)
            .cloned()
    }

    /// Most recent command row for (room, bill)
    #[must_use]
    pub fn latest_operation(&self, room_id: i64, bill_id: i64) -> Option<Operation> {
        self.inner
            .read()
            .ok()?
            .operations
            .iter()
            .rev()
            .find(|op| op.room_id == room_id && op.bill_id == bill_id)
            .cloned()
    }

    /// Every snapshot accrued against `bill_id`, oldest first (invoice input)
    #[must_use]
    pub fn details_for_bill(&self, bill_id: i64) -> Vec<Detail> {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .details
                    .iter()
                    .filter(|d| d.bill_id == bill_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Power-ons recorded for `room_id` so far
    #[must_use]
    pub fn power_on_count(&self, room_id: i64) -> u32 {
        self.inner
            .read()
            .map(|inner| {
                let count = inner
                    .operations
                    .iter()
                    .filter(|op| op.room_id == room_id && op.op_state == OperationKind::PowerOn)
                    .count();
                u32::try_from(count).unwrap_or(u32::MAX)
            })
            .unwrap_or(0)
    }

    fn write_inner(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreInner>> {
        self.inner.write().map_err(|_| ClimatizarError::StorePersist {
            reason: "store lock poisoned".to_string(),
        })
    }
}

fn active_bill_of(inner: &StoreInner, room_id: i64) -> Option<i64> {
    match inner.room_ops.iter().rev().find(|op| op.room_id == room_id) {
        Some(op) if op.kind == RoomOperationKind::CheckIn => Some(op.bill_id),
        _ => None,
    }
}

fn persist_err(err: impl std::fmt::Display) -> ClimatizarError {
    ClimatizarError::StorePersist {
        reason: err.to_string(),
    }
}
