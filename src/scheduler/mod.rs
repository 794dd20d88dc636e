//! Multi-queue air-conditioning scheduler
//!
//! The plant can actively serve at most three rooms. Tracked units live in
//! a single owned arena; two index lists impose the queue discipline:
//!
//! - the **buffer** holds every non-warming unit in priority order, and its
//!   prefix of up to three entries is the serving set;
//! - the **warming** list holds units drifting toward ambient, either
//!   because the guest powered them off or because they reached target.
//!
//! A fixed-period clock drives the simulation. Every tick advances serving
//! temperatures, charges, and running times, and drifts warming units; every
//! tenth tick is a sort phase that migrates finished units into warming,
//! re-engages drifted ones, re-sorts the buffer by priority, applies the
//! equal-priority round-robin rotation, and rebuilds the serving prefix.
//! After scheduling, one detail row per tracked unit is appended to the
//! store in (serving, buffer tail, warming) order.
//!
//! Commands (`add_request`, `update_in_place`, `remove_request`) take the
//! exclusive lock briefly and never block on the clock; reads take the
//! shared lock. The two suspension points (the tick wait and the status
//! long-poll sampling) hold no lock.

pub mod types;


use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::billing;
use crate::config::Config;
use crate::error::{ClimatizarError, Result};
use crate::metrics::MetricsCollector;
use crate::store::{self, FleetStore};

use self::types::{
    AcState, AdminSnapshot, Mode, ScheduleEntry, SchedulerStats, Speed, SERVING_SLOTS,
};

/// Tunables the scheduler needs from the service configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Simulation step in seconds (the tick period T)
    pub tick_secs: u64,
    /// Ticks between sort phases
    pub ticks_per_sort: u64,
    /// Slices an entry may hold a contested slot before rotating out
    pub round_robin_threshold: u32,
    /// Drift (tenths of a degree) that re-engages a target-warming entry
    pub warm_promote_delta: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 6,
            ticks_per_sort: 10,
            round_robin_threshold: 2,
            warm_promote_delta: 10,
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            tick_secs: cfg.tick_secs,
            ticks_per_sort: cfg.ticks_per_sort,
            round_robin_threshold: cfg.round_robin_threshold,
            warm_promote_delta: cfg.warm_promote_delta,
        }
    }
}

struct SchedState {
    entries: HashMap<i64, ScheduleEntry>,
    buffer: Vec<i64>,
    warming: Vec<i64>,
    tick_count: u64,
    started: bool,
    rr_class: Option<u8>,
    stats: SchedulerStats,
}

impl SchedState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            buffer: Vec::new(),
            warming: Vec::new(),
            tick_count: 0,
            started: false,
            rr_class: None,
            stats: SchedulerStats::default(),
        }
    }
}

/// The process-wide scheduling authority over the fleet
pub struct Scheduler {
    cfg: SchedulerConfig,
    store: Arc<FleetStore>,
    metrics: Arc<MetricsCollector>,
    state: RwLock<SchedState>,
    running: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler over `store`, reporting into `metrics`
    #[must_use]
    pub fn new(cfg: SchedulerConfig, store: Arc<FleetStore>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            cfg,
            store,
            metrics,
            state: RwLock::new(SchedState::new()),
            running: AtomicBool::new(false),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SchedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SchedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a power-on request
    ///
    /// The very first unit ever admitted takes a serving slot and starts
    /// the clock. A unit resident in warming is pulled back to the buffer
    /// as waiting with the freshly requested target, speed and mode; if it
    /// comes back under a new bill its stay accumulators restart. A unit
    /// already in the buffer only has its parameters refreshed. Nothing is
    /// preempted here; the next sort phase promotes the newcomer.
    pub fn add_request(&self, entry: ScheduleEntry) {
        let mut st = self.write_state();
        st.stats.total_requests += 1;
        let ac_id = entry.ac_id;

        if st.entries.contains_key(&ac_id) {
            let from_warming = st.warming.iter().position(|&id| id == ac_id);
            if let Some(pos) = from_warming {
                st.warming.remove(pos);
                st.buffer.push(ac_id);
            }
            if let Some(e) = st.entries.get_mut(&ac_id) {
                let powered_off = e.ac_state == AcState::OffWarming;
                e.target_temp = entry.target_temp;
                e.current_speed = entry.current_speed;
                e.mode = entry.mode;
                if from_warming.is_some() || powered_off {
                    if e.bill_id != entry.bill_id {
                        e.bill_id = entry.bill_id;
                        e.running_time = 0;
                        e.total_cost = 0;
                    }
                    e.ac_state = AcState::Waiting;
                    e.current_cost = 0;
                    e.current_running_time = 0;
                    e.round_robin_count = 0;
                    e.off_recorded = false;
                }
            }
            return;
        }

        let mut entry = entry;
        if !st.started {
            entry.ac_state = AcState::Running;
            st.started = true;
        }
        st.buffer.push(ac_id);
        st.entries.insert(ac_id, entry);
    }

    /// Replace target, speed and mode of a tracked unit in place
    ///
    /// The entry keeps its queue position; the next sort phase re-orders.
    ///
    /// # Errors
    ///
    /// Returns `NotTracked` when the unit is in neither buffer nor warming.
    pub fn update_in_place(
        &self,
        ac_id: i64,
        mode: Option<Mode>,
        speed: Option<Speed>,
        target_temp: Option<i32>,
    ) -> Result<()> {
        let mut st = self.write_state();
        let Some(e) = st.entries.get_mut(&ac_id) else {
            return Err(ClimatizarError::NotTracked { ac_id });
        };
        if let Some(mode) = mode {
            e.mode = mode;
        }
        if let Some(speed) = speed {
            e.current_speed = speed;
        }
        if let Some(target) = target_temp {
            e.target_temp = target;
        }
        Ok(())
    }

    /// Mark a unit powered off
    ///
    /// The entry is not detached here: the next sort phase migrates it into
    /// warming and settles the closing power-off operation row.
    ///
    /// # Errors
    ///
    /// Returns `NotTracked` when the unit is in neither buffer nor warming.
    pub fn remove_request(&self, ac_id: i64) -> Result<()> {
        let mut st = self.write_state();
        let Some(e) = st.entries.get_mut(&ac_id) else {
            return Err(ClimatizarError::NotTracked { ac_id });
        };
        e.ac_state = AcState::OffWarming;
        e.off_recorded = false;
        Ok(())
    }

    /// Snapshot of a tracked entry, if any
    #[must_use]
    pub fn entry(&self, ac_id: i64) -> Option<ScheduleEntry> {
        self.read_state().entries.get(&ac_id).cloned()
    }

    /// Number of units currently tracked (buffer plus warming)
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.read_state().entries.len()
    }

    /// Ticks handled since the clock started
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.read_state().tick_count
    }

    /// Lifetime counters
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.read_state().stats.clone()
    }

    /// Operator-facing snapshot: serving prefix, buffer tail, warming
    #[must_use]
    pub fn admin_snapshot(&self) -> AdminSnapshot {
        let st = self.read_state();
        let snapshot_of = |id: &i64| st.entries.get(id).cloned();
        AdminSnapshot {
            is_running: self.running.load(Ordering::Relaxed),
            tick_count: st.tick_count,
            current_priority: st.rr_class,
            serving: st
                .buffer
                .iter()
                .take(SERVING_SLOTS)
                .filter_map(snapshot_of)
                .collect(),
            buffer_tail: st
                .buffer
                .iter()
                .skip(SERVING_SLOTS)
                .filter_map(snapshot_of)
                .collect(),
            warming: st.warming.iter().filter_map(snapshot_of).collect(),
            stats: st.stats.clone(),
        }
    }

    /// Handle one clock tick
    ///
    /// Does nothing until the first unit has ever been admitted. Public so
    /// tests and benches can drive the simulation deterministically.
    pub fn tick(&self) {
        let mut st = self.write_state();
        if !st.started {
            return;
        }
        let idx = st.tick_count;
        for e in st.entries.values_mut() {
            e.last_temp_change = 0;
        }
        self.refresh_serving(&mut st);
        self.refresh_warming(&mut st, idx);
        if (idx + 1) % self.cfg.ticks_per_sort == 0 {
            self.sort_phase(&mut st);
        }
        self.persist_details(&st);
        Self::retire_completed(&mut st);
        st.tick_count = idx + 1;
        drop(st);
        self.metrics.record_tick();
    }

    /// Run the clock until `shutdown` flips or its sender drops
    ///
    /// The current tick always completes before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::Relaxed);
        let mut interval = tokio::time::interval(Duration::from_secs(self.cfg.tick_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first interval tick completes immediately; skip it
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                _ = shutdown.changed() => break,
            }
        }
        self.running.store(false, Ordering::Relaxed);
    }

    fn refresh_serving(&self, st: &mut SchedState) {
        let serving: Vec<i64> = st.buffer.iter().take(SERVING_SLOTS).copied().collect();
        let t = self.cfg.tick_secs;
        for id in serving {
            let Some(e) = st.entries.get_mut(&id) else {
                continue;
            };
            if e.ac_state != AcState::Running {
                continue;
            }
            e.current_running_time += t;
            e.running_time += t;
            let served_ticks = e.current_running_time / t;
            if !billing::delta_due(e.current_speed, served_ticks) {
                continue;
            }
            if e.current_temp == e.target_temp {
                e.ac_state = AcState::TargetWarming;
                st.stats.completed_targets += 1;
                continue;
            }
            let step = if e.target_temp > e.current_temp { 1 } else { -1 };
            e.current_temp += step;
            e.last_temp_change = 1;
            e.current_cost += 1;
            e.total_cost += 1;
            if e.current_temp == e.target_temp {
                e.ac_state = AcState::TargetWarming;
                st.stats.completed_targets += 1;
            }
        }
    }

    fn refresh_warming(&self, st: &mut SchedState, idx: u64) {
        if idx % 2 == 0 {
            return;
        }
        let warming: Vec<i64> = st.warming.clone();
        for id in warming {
            let Some(e) = st.entries.get_mut(&id) else {
                continue;
            };
            if e.current_temp == e.environment_temp {
                continue;
            }
            let step = if e.environment_temp > e.current_temp { 1 } else { -1 };
            e.current_temp += step;
            e.last_temp_change = 1;
        }
    }

    fn sort_phase(&self, st: &mut SchedState) {
        self.migrate_to_warming(st);
        self.settle_power_offs(st);
        self.promote_drifted(st);

        let entries = &st.entries;
        st.buffer
            .sort_by_key(|id| entries.get(id).map_or(u8::MAX, ScheduleEntry::priority));

        self.apply_round_robin(st);
        Self::rebuild_serving(st);
    }

    fn migrate_to_warming(&self, st: &mut SchedState) {
        let mut i = 0;
        while i < st.buffer.len() {
            let id = st.buffer[i];
            let warming = st
                .entries
                .get(&id)
                .is_some_and(|e| e.ac_state.is_warming());
            if warming {
                st.buffer.remove(i);
                st.warming.push(id);
            } else {
                i += 1;
            }
        }
    }

    /// Write the closing power-off amendment for every off-warming entry
    /// that does not have one yet; failures are retried next sort phase.
    fn settle_power_offs(&self, st: &mut SchedState) {
        let pending: Vec<i64> = st
            .warming
            .iter()
            .copied()
            .filter(|id| {
                st.entries
                    .get(id)
                    .is_some_and(|e| e.ac_state == AcState::OffWarming && !e.off_recorded)
            })
            .collect();
        for id in pending {
            let Some(e) = st.entries.get(&id) else {
                continue;
            };
            let outcome = self.store.finalize_power_off(
                e.bill_id,
                e.room_id,
                e.current_cost,
                e.current_temp,
                e.running_time,
                e.current_running_time,
            );
            match outcome {
                Ok(()) => {
                    if let Some(e) = st.entries.get_mut(&id) {
                        e.off_recorded = true;
                    }
                }
                Err(err) => {
                    eprintln!("climatizar: power-off settlement failed for ac {id}: {err}");
                    self.metrics.record_store_error();
                }
            }
        }
    }

    fn promote_drifted(&self, st: &mut SchedState) {
        let mut i = 0;
        while i < st.warming.len() {
            let id = st.warming[i];
            let promote = st.entries.get(&id).is_some_and(|e| {
                e.ac_state == AcState::TargetWarming
                    && (e.current_temp - e.target_temp).abs() >= self.cfg.warm_promote_delta
            });
            if promote {
                st.warming.remove(i);
                st.buffer.push(id);
                if let Some(e) = st.entries.get_mut(&id) {
                    e.ac_state = AcState::Waiting;
                }
            } else {
                i += 1;
            }
        }
    }

    /// Equal-priority round-robin over the serving boundary
    ///
    /// Active while the third and fourth buffer positions share a priority
    /// class. On entry the class re-orders by time already served; while it
    /// persists the serving members of the class are charged one count per
    /// slice, and a count reaching the threshold rotates the boundary slot
    /// against the last class member in the buffer.
    fn apply_round_robin(&self, st: &mut SchedState) {
        let threshold = self.cfg.round_robin_threshold;
        let boundary_class = if st.buffer.len() > SERVING_SLOTS {
            let p3 = st
                .entries
                .get(&st.buffer[SERVING_SLOTS - 1])
                .map(ScheduleEntry::priority);
            let p4 = st
                .entries
                .get(&st.buffer[SERVING_SLOTS])
                .map(ScheduleEntry::priority);
            if p3.is_some() && p3 == p4 {
                p3
            } else {
                None
            }
        } else {
            None
        };

        let Some(class) = boundary_class else {
            if st.rr_class.take().is_some() {
                for e in st.entries.values_mut() {
                    e.round_robin_count = 0;
                }
            }
            return;
        };

        let mut positions = Vec::new();
        for (pos, id) in st.buffer.iter().enumerate() {
            if st
                .entries
                .get(id)
                .is_some_and(|e| e.priority() == class)
            {
                positions.push(pos);
            }
        }

        if st.rr_class != Some(class) {
            // fresh regime: least-served class members take the slots
            let entries = &st.entries;
            let mut ids: Vec<i64> = positions.iter().map(|&pos| st.buffer[pos]).collect();
            ids.sort_by_key(|id| (entries.get(id).map_or(0, |e| e.running_time), *id));
            for (&pos, id) in positions.iter().zip(ids) {
                st.buffer[pos] = id;
            }
            for &pos in &positions {
                let id = st.buffer[pos];
                if let Some(e) = st.entries.get_mut(&id) {
                    e.round_robin_count = if pos < SERVING_SLOTS { 0 } else { threshold };
                }
            }
            st.rr_class = Some(class);
            return;
        }

        let front: Vec<usize> = positions
            .iter()
            .copied()
            .filter(|&pos| pos < SERVING_SLOTS)
            .collect();
        let mut expired = false;
        for &pos in &front {
            let id = st.buffer[pos];
            if let Some(e) = st.entries.get_mut(&id) {
                e.round_robin_count += 1;
                expired |= e.round_robin_count >= threshold;
            }
        }
        if !expired {
            return;
        }
        let (Some(&slot), Some(&last)) = (front.last(), positions.last()) else {
            return;
        };
        if slot == last {
            return;
        }
        st.buffer.swap(slot, last);
        let incoming = st.buffer[slot];
        let outgoing = st.buffer[last];
        if let Some(e) = st.entries.get_mut(&incoming) {
            e.round_robin_count = 0;
        }
        if let Some(e) = st.entries.get_mut(&outgoing) {
            e.round_robin_count = threshold;
        }
        for &pos in &front {
            if pos == slot {
                continue;
            }
            let id = st.buffer[pos];
            if let Some(e) = st.entries.get_mut(&id) {
                e.round_robin_count = 0;
            }
        }
        st.stats.rotations += 1;
    }

    fn rebuild_serving(st: &mut SchedState) {
        let order: Vec<i64> = st.buffer.clone();
        for (pos, id) in order.into_iter().enumerate() {
            let Some(e) = st.entries.get_mut(&id) else {
                continue;
            };
            if pos < SERVING_SLOTS {
                if e.ac_state == AcState::Waiting {
                    e.ac_state = AcState::Running;
                    e.current_running_time = 0;
                }
            } else if e.ac_state == AcState::Running {
                e.ac_state = AcState::Waiting;
                st.stats.preemptions += 1;
            }
        }
    }

    fn persist_details(&self, st: &SchedState) {
        let now = store::now_unix();
        let mut written = 0u64;
        for id in st.buffer.iter().chain(st.warming.iter()) {
            let Some(e) = st.entries.get(id) else {
                continue;
            };
            let detail = billing::detail_for(e, now);
            match self.store.append_detail(detail) {
                Ok(()) => written += 1,
                Err(err) => {
                    eprintln!("climatizar: detail persist failed for room {}: {err}", e.room_id);
                    self.metrics.record_store_error();
                }
            }
        }
        self.metrics.record_details(written);
    }

    /// Drop off-warming entries that settled their bill and reached ambient
    fn retire_completed(st: &mut SchedState) {
        let mut i = 0;
        while i < st.warming.len() {
            let id = st.warming[i];
            let done = st.entries.get(&id).is_none_or(|e| {
                e.ac_state == AcState::OffWarming
                    && e.off_recorded
                    && e.current_temp == e.environment_temp
            });
            if done {
                st.warming.remove(i);
                if st.entries.remove(&id).is_some() {
                    st.stats.retired += 1;
                }
            } else {
                i += 1;
            }
        }
    }
}
