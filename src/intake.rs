//! Request intake
//!
//! Validates power-on / power-off / adjust commands for a room, resolves
//! the bill from the most recent check-in, writes the operation row, and
//! only then invokes the scheduler. A command that fails validation or
//! whose operation row cannot be persisted is rejected without touching
//! scheduler state.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{ClimatizarError, Result};
use crate::scheduler::types::{Mode, ScheduleEntry, Speed};
use crate::scheduler::Scheduler;
use crate::store::{self, AirConditioner, FleetStore, Operation, OperationKind};

/// Command gateway between the session layer and the scheduler
pub struct Intake {
    store: Arc<FleetStore>,
    scheduler: Arc<Scheduler>,
    config: Config,
}

impl Intake {
    /// Create an intake over the shared store and scheduler
    #[must_use]
    pub fn new(store: Arc<FleetStore>, scheduler: Arc<Scheduler>, config: Config) -> Self {
        Self {
            store,
            scheduler,
            config,
        }
    }

    /// Power a room's unit on
    ///
    /// Omitted fields fall back to the configured defaults. The unit keeps
    /// its stay accumulators when re-admitted under the same bill.
    ///
    /// # Errors
    ///
    /// `UnknownRoom`, `NoActiveBooking`, `InvalidParameter` on validation;
    /// `StorePersist` when the operation row cannot be written (the command
    /// is rejected and the scheduler is untouched).
    pub fn power_on(
        &self,
        room_id: i64,
        mode: Option<Mode>,
        speed: Option<Speed>,
        target_temp: Option<i32>,
    ) -> Result<Operation> {
        let (ac, bill_id) = self.resolve(room_id)?;
        let mode = mode.unwrap_or(self.config.default_mode);
        let speed = speed.unwrap_or(self.config.default_speed);
        let target_temp = target_temp.unwrap_or(self.config.default_target_temp);
        self.validate_target(target_temp)?;

        let (current_temp, total_cost, running_time) = self.continuity(&ac, bill_id);
        let op = Operation {
            bill_id,
            room_id,
            ac_id: ac.ac_id,
            op_state: OperationKind::PowerOn,
            mode,
            speed,
            target_temp,
            environment_temp: ac.environment_temp,
            current_temp,
            current_cost: 0,
            total_cost,
            running_time,
            current_running_time: 0,
            switch_count: self.store.power_on_count(room_id) + 1,
            recorded_at: store::now_unix(),
        };
        self.store.record_operation(op.clone())?;

        let mut entry = ScheduleEntry::new(
            ac.ac_id,
            bill_id,
            room_id,
            mode,
            speed,
            target_temp,
            ac.environment_temp,
            current_temp,
        );
        entry.total_cost = total_cost;
        entry.running_time = running_time;
        self.scheduler.add_request(entry);
        Ok(op)
    }

    /// Power a room's unit off
    ///
    /// Writes the power-off row from the live entry; the scheduler settles
    /// the closing cost into that row at its next sort phase.
    ///
    /// # Errors
    ///
    /// `UnknownRoom`, `NoActiveBooking`, `NotTracked` when the unit is not
    /// under scheduling, `StorePersist` on row failure.
    pub fn power_off(&self, room_id: i64) -> Result<Operation> {
        let (ac, bill_id) = self.resolve(room_id)?;
        let Some(entry) = self.scheduler.entry(ac.ac_id) else {
            return Err(ClimatizarError::NotTracked { ac_id: ac.ac_id });
        };

        let op = Operation {
            bill_id,
            room_id,
            ac_id: ac.ac_id,
            op_state: OperationKind::PowerOff,
            mode: entry.mode,
            speed: entry.current_speed,
            target_temp: entry.target_temp,
            environment_temp: entry.environment_temp,
            current_temp: entry.current_temp,
            current_cost: entry.current_cost,
            total_cost: entry.total_cost,
            running_time: entry.running_time,
            current_running_time: entry.current_running_time,
            switch_count: self.store.power_on_count(room_id),
            recorded_at: store::now_unix(),
        };
        self.store.record_operation(op.clone())?;
        self.scheduler.remove_request(ac.ac_id)?;
        Ok(op)
    }

    /// Adjust target, speed or mode of a room's unit
    ///
    /// A unit that just left scheduling is tolerated: the row is still
    /// recorded and the scheduler call is a silent no-op.
    ///
    /// # Errors
    ///
    /// `UnknownRoom`, `NoActiveBooking`, `InvalidParameter` when no field
    /// is given or the target is out of range, `StorePersist` on row
    /// failure.
    pub fn adjust(
        &self,
        room_id: i64,
        mode: Option<Mode>,
        speed: Option<Speed>,
        target_temp: Option<i32>,
    ) -> Result<Operation> {
        let (ac, bill_id) = self.resolve(room_id)?;
        if mode.is_none() && speed.is_none() && target_temp.is_none() {
            return Err(ClimatizarError::InvalidParameter {
                reason: "adjust requires at least one of mode, speed, target_temp".to_string(),
            });
        }
        if let Some(target) = target_temp {
            self.validate_target(target)?;
        }

        let entry = self.scheduler.entry(ac.ac_id);
        let effective_mode = mode.or_else(|| entry.as_ref().map(|e| e.mode));
        let effective_speed = speed.or_else(|| entry.as_ref().map(|e| e.current_speed));
        let effective_target = target_temp.or_else(|| entry.as_ref().map(|e| e.target_temp));
        let (current_temp, total_cost, running_time) = match &entry {
            Some(e) => (e.current_temp, e.total_cost, e.running_time),
            None => self.continuity(&ac, bill_id),
        };

        let op = Operation {
            bill_id,
            room_id,
            ac_id: ac.ac_id,
            op_state: OperationKind::Adjust,
            mode: effective_mode.unwrap_or(self.config.default_mode),
            speed: effective_speed.unwrap_or(self.config.default_speed),
            target_temp: effective_target.unwrap_or(self.config.default_target_temp),
            environment_temp: ac.environment_temp,
            current_temp,
            current_cost: entry.as_ref().map_or(0, |e| e.current_cost),
            total_cost,
            running_time,
            current_running_time: entry.as_ref().map_or(0, |e| e.current_running_time),
            switch_count: self.store.power_on_count(room_id),
            recorded_at: store::now_unix(),
        };
        self.store.record_operation(op.clone())?;

        match self
            .scheduler
            .update_in_place(ac.ac_id, mode, speed, target_temp)
        {
            Ok(()) | Err(ClimatizarError::NotTracked { .. }) => Ok(op),
            Err(err) => Err(err),
        }
    }

    fn resolve(&self, room_id: i64) -> Result<(AirConditioner, i64)> {
        let Some(ac) = self.store.ac_for_room(room_id) else {
            return Err(ClimatizarError::UnknownRoom { room_id });
        };
        let Some(bill_id) = self.store.active_bill(room_id) else {
            return Err(ClimatizarError::NoActiveBooking { room_id });
        };
        Ok((ac, bill_id))
    }

    fn validate_target(&self, target: i32) -> Result<()> {
        if target < self.config.min_target_temp || target > self.config.max_target_temp {
            return Err(ClimatizarError::InvalidParameter {
                reason: format!(
                    "target temperature {target} outside admissible range {}..={}",
                    self.config.min_target_temp, self.config.max_target_temp
                ),
            });
        }
        Ok(())
    }

    /// Where the room's temperature and stay accumulators stand right now:
    /// the live entry if tracked, else the newest detail, else ambient.
    fn continuity(&self, ac: &AirConditioner, bill_id: i64) -> (i32, i64, u64) {
        if let Some(e) = self.scheduler.entry(ac.ac_id) {
            let (total, running) = if e.bill_id == bill_id {
                (e.total_cost, e.running_time)
            } else {
                (0, 0)
            };
            return (e.current_temp, total, running);
        }
        if let Some(d) = self.store.latest_detail(ac.room_id, bill_id) {
            return (d.current_temp, d.total_cost, d.running_time);
        }
        (ac.environment_temp, 0, 0)
    }
}
