//! End-to-end scheduler scenarios driven deterministically, tick by tick,
//! through the intake and the store: capacity limits, preemption,
//! round-robin rotation, warming re-engagement, and session settlement.

use std::sync::Arc;

use climatizar::config::Config;
use climatizar::intake::Intake;
use climatizar::metrics::MetricsCollector;
use climatizar::scheduler::types::{AcState, Mode, Speed};
use climatizar::scheduler::{Scheduler, SchedulerConfig};
use climatizar::store::{FleetStore, OperationKind};

struct Plant {
    store: Arc<FleetStore>,
    scheduler: Arc<Scheduler>,
    intake: Intake,
}

impl Plant {
    fn new(rooms: &[i64]) -> Self {
        let store = Arc::new(FleetStore::in_memory());
        for &room in rooms {
            store.provision_ac(room, 250).expect("provision");
            store.check_in(room).expect("check in");
        }
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig::default(),
            Arc::clone(&store),
            Arc::new(MetricsCollector::new()),
        ));
        let intake = Intake::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            Config::default(),
        );
        Self {
            store,
            scheduler,
            intake,
        }
    }

    fn ac_id(&self, room: i64) -> i64 {
        self.store.ac_for_room(room).expect("provisioned").ac_id
    }

    fn ticks(&self, n: u64) {
        for _ in 0..n {
            self.scheduler.tick();
        }
    }

    fn state_of(&self, room: i64) -> AcState {
        self.scheduler
            .entry(self.ac_id(room))
            .expect("tracked")
            .ac_state
    }
}

// ============================================================================
// Scenario: single cool-down
// ============================================================================

#[test]
fn test_single_cooldown_reaches_target_in_thirty_ticks() {
    let plant = Plant::new(&[101]);
    plant
        .intake
        .power_on(101, Some(Mode::Cooling), Some(Speed::High), Some(220))
        .expect("power on");

    plant.ticks(30);
    let entry = plant.scheduler.entry(plant.ac_id(101)).expect("tracked");
    assert_eq!(entry.current_temp, 220);
    assert_eq!(entry.total_cost, 30);
    assert_eq!(entry.ac_state, AcState::TargetWarming);

    let detail = plant.store.latest_detail(101, 0).expect("detail");
    assert_eq!(detail.current_temp, 220);
    assert_eq!(detail.total_cost, 30);
    assert_eq!(detail.ac_status, AcState::TargetWarming);
}

#[test]
fn test_single_request_serves_immediately_without_round_robin() {
    let plant = Plant::new(&[101]);
    plant
        .intake
        .power_on(101, Some(Mode::Cooling), Some(Speed::High), Some(220))
        .expect("power on");
    assert_eq!(plant.state_of(101), AcState::Running);
    plant.ticks(15);
    assert_eq!(plant.scheduler.admin_snapshot().current_priority, None);
    assert_eq!(plant.scheduler.stats().rotations, 0);
}

// ============================================================================
// Scenario: capacity overflow and round-robin
// ============================================================================

#[test]
fn test_capacity_overflow_four_rooms_one_waits() {
    let plant = Plant::new(&[101, 102, 103, 104]);
    for room in [101, 102, 103, 104] {
        plant
            .intake
            .power_on(room, Some(Mode::Cooling), Some(Speed::Medium), Some(160))
            .expect("power on");
    }

    plant.ticks(10);
    let snapshot = plant.scheduler.admin_snapshot();
    assert_eq!(snapshot.serving.len(), 3);
    assert_eq!(snapshot.buffer_tail.len(), 1);

    // the already-served room has the most running time and waits first
    let waiter = plant.scheduler.entry(plant.ac_id(101)).expect("tracked");
    assert_eq!(waiter.ac_state, AcState::Waiting);
    assert_eq!(waiter.round_robin_count, 2);
    for room in [102, 103, 104] {
        assert_eq!(plant.state_of(room), AcState::Running);
    }
}

#[test]
fn test_waiter_takes_boundary_slot_once_after_two_more_slices() {
    let plant = Plant::new(&[101, 102, 103, 104]);
    for room in [101, 102, 103, 104] {
        plant
            .intake
            .power_on(room, Some(Mode::Cooling), Some(Speed::Medium), Some(160))
            .expect("power on");
    }

    plant.ticks(30);
    assert_eq!(plant.scheduler.stats().rotations, 1);
    assert_eq!(plant.state_of(101), AcState::Running);
    let rotated_out = plant.scheduler.entry(plant.ac_id(104)).expect("tracked");
    assert_eq!(rotated_out.ac_state, AcState::Waiting);
    assert_eq!(rotated_out.round_robin_count, 2);
}

#[test]
fn test_boundary_slot_oscillates_every_two_slices() {
    let plant = Plant::new(&[101, 102, 103, 104]);
    for room in [101, 102, 103, 104] {
        plant
            .intake
            .power_on(room, Some(Mode::Cooling), Some(Speed::Medium), Some(160))
            .expect("power on");
    }

    plant.ticks(30);
    assert_eq!(plant.state_of(101), AcState::Running);
    plant.ticks(20);
    assert_eq!(plant.state_of(101), AcState::Waiting);
    assert_eq!(plant.state_of(104), AcState::Running);
    assert_eq!(plant.scheduler.stats().rotations, 2);
}

// ============================================================================
// Scenario: priority preemption
// ============================================================================

#[test]
fn test_high_arrival_preempts_one_low_runner() {
    let plant = Plant::new(&[101, 102, 103, 104]);
    for room in [101, 102, 103] {
        plant
            .intake
            .power_on(room, Some(Mode::Cooling), Some(Speed::Low), Some(160))
            .expect("power on");
    }
    plant.ticks(10);
    for room in [101, 102, 103] {
        assert_eq!(plant.state_of(room), AcState::Running);
    }

    plant
        .intake
        .power_on(104, Some(Mode::Cooling), Some(Speed::High), Some(160))
        .expect("power on");
    assert_eq!(plant.state_of(104), AcState::Waiting);

    plant.ticks(10);
    assert_eq!(plant.state_of(104), AcState::Running);
    let snapshot = plant.scheduler.admin_snapshot();
    let waiting_lows = snapshot
        .buffer_tail
        .iter()
        .filter(|e| e.current_speed == Speed::Low)
        .count();
    assert_eq!(waiting_lows, 1);
    assert!(plant.scheduler.stats().preemptions >= 1);
}

// ============================================================================
// Scenario: power off / power on re-entry
// ============================================================================

#[test]
fn test_off_on_reentry_settles_and_restarts_session() {
    let plant = Plant::new(&[101]);
    plant
        .intake
        .power_on(101, Some(Mode::Cooling), Some(Speed::High), Some(220))
        .expect("power on");
    plant.ticks(5);

    plant.intake.power_off(101).expect("power off");
    plant.ticks(5);

    let snapshot = plant.scheduler.admin_snapshot();
    assert_eq!(snapshot.warming.len(), 1);
    let row = plant.store.latest_operation(101, 0).expect("row");
    assert_eq!(row.op_state, OperationKind::PowerOff);
    assert_eq!(row.current_cost, 5);

    plant
        .intake
        .power_on(101, Some(Mode::Cooling), Some(Speed::High), Some(220))
        .expect("power on");
    let entry = plant.scheduler.entry(plant.ac_id(101)).expect("tracked");
    assert_eq!(entry.ac_state, AcState::Waiting);
    assert_eq!(entry.current_cost, 0);
    assert_eq!(entry.current_running_time, 0);
    assert_eq!(entry.running_time, 30);
    assert_eq!(entry.total_cost, 5);
}

// ============================================================================
// Scenario: warming re-engagement
// ============================================================================

#[test]
fn test_target_warming_drifts_one_degree_then_resumes() {
    let plant = Plant::new(&[101]);
    plant
        .intake
        .power_on(101, Some(Mode::Cooling), Some(Speed::High), Some(220))
        .expect("power on");

    plant.ticks(30);
    assert_eq!(plant.state_of(101), AcState::TargetWarming);

    // drifts one unit on every other tick; a full degree re-engages it
    plant.ticks(20);
    let entry = plant.scheduler.entry(plant.ac_id(101)).expect("tracked");
    assert_eq!(entry.ac_state, AcState::Running);
    assert_eq!(entry.current_temp, 230);
    assert_eq!(entry.total_cost, 30);
}

// ============================================================================
// Scenario: adjust during wait
// ============================================================================

#[test]
fn test_adjust_to_high_promotes_waiting_room() {
    let plant = Plant::new(&[101, 102, 103, 104]);
    for room in [101, 102, 103] {
        plant
            .intake
            .power_on(room, Some(Mode::Cooling), Some(Speed::Medium), Some(160))
            .expect("power on");
    }
    plant
        .intake
        .power_on(104, Some(Mode::Cooling), Some(Speed::Low), Some(160))
        .expect("power on");
    plant.ticks(10);
    assert_eq!(plant.state_of(104), AcState::Waiting);

    plant
        .intake
        .adjust(104, None, Some(Speed::High), None)
        .expect("adjust");
    plant.ticks(10);
    assert_eq!(plant.state_of(104), AcState::Running);
}

// ============================================================================
// Invariants over a mixed workload
// ============================================================================

#[test]
fn test_queue_membership_is_exclusive_and_capacity_bounded() {
    let rooms = [101, 102, 103, 104, 105, 106];
    let plant = Plant::new(&rooms);
    for (i, &room) in rooms.iter().enumerate() {
        let speed = match i % 3 {
            0 => Speed::High,
            1 => Speed::Medium,
            _ => Speed::Low,
        };
        plant
            .intake
            .power_on(room, Some(Mode::Cooling), Some(speed), Some(200))
            .expect("power on");
    }
    plant.intake.power_off(103).expect("power off");

    for _ in 0..60 {
        plant.scheduler.tick();
        let snapshot = plant.scheduler.admin_snapshot();
        assert!(snapshot.serving.len() <= 3);

        let mut ids: Vec<i64> = snapshot
            .serving
            .iter()
            .chain(snapshot.buffer_tail.iter())
            .chain(snapshot.warming.iter())
            .map(|e| e.ac_id)
            .collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(total, plant.scheduler.tracked_count());
    }
}

#[test]
fn test_costs_only_accrue_while_serving() {
    let plant = Plant::new(&[101, 102, 103, 104]);
    for room in [101, 102, 103, 104] {
        plant
            .intake
            .power_on(room, Some(Mode::Cooling), Some(Speed::Medium), Some(160))
            .expect("power on");
    }

    let mut last_costs: std::collections::HashMap<i64, i64> = std::collections::HashMap::new();
    for _ in 0..50 {
        let before: Vec<(i64, AcState)> = [101, 102, 103, 104]
            .iter()
            .map(|&room| {
                let e = plant.scheduler.entry(plant.ac_id(room)).expect("tracked");
                (e.ac_id, e.ac_state)
            })
            .collect();
        plant.scheduler.tick();
        for (ac_id, state_before) in before {
            let e = plant.scheduler.entry(ac_id).expect("tracked");
            let last = last_costs.get(&ac_id).copied().unwrap_or(0);
            assert!(e.total_cost >= last, "total cost regressed");
            if state_before != AcState::Running {
                assert_eq!(e.total_cost, last, "cost accrued while not serving");
            }
            last_costs.insert(ac_id, e.total_cost);
        }
    }
}

#[test]
fn test_detail_trail_sums_to_session_cost() {
    let plant = Plant::new(&[101]);
    plant
        .intake
        .power_on(101, Some(Mode::Cooling), Some(Speed::High), Some(220))
        .expect("power on");
    plant.ticks(12);

    let entry = plant.scheduler.entry(plant.ac_id(101)).expect("tracked");
    let charged: i64 = plant
        .store
        .details_for_bill(0)
        .iter()
        .filter(|d| d.ac_status == AcState::Running)
        .map(|d| i64::from(d.temp_change))
        .sum();
    assert_eq!(charged, entry.current_cost);
}

#[test]
fn test_power_off_settles_within_one_sort_phase() {
    let plant = Plant::new(&[101]);
    plant
        .intake
        .power_on(101, Some(Mode::Cooling), Some(Speed::High), Some(220))
        .expect("power on");
    plant.ticks(3);
    plant.intake.power_off(101).expect("power off");

    // one full sort phase later the closing row must be settled
    plant.ticks(10);
    let row = plant.store.latest_operation(101, 0).expect("row");
    assert_eq!(row.op_state, OperationKind::PowerOff);
    assert_eq!(row.current_cost, 3);
    assert_eq!(row.running_time, 18);
}
