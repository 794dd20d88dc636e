//! Billing and detail-row construction
//!
//! Pricing is deterministic: one unit of temperature change (0.1 degree)
//! costs one unit of money (0.1 of the currency). Fan speed sets the pace:
//! high moves one unit every tick, medium every second served tick, low
//! every third. The per-tick rate column in the audit trail is the fraction
//! of the base unit the speed earns per tick.

use crate::scheduler::types::{AcState, ScheduleEntry, Speed};
use crate::store::Detail;

/// Served ticks between one-unit temperature moves at `speed`
#[must_use]
pub fn ticks_per_unit(speed: Speed) -> u64 {
    match speed {
        Speed::High => 1,
        Speed::Medium => 2,
        Speed::Low => 3,
    }
}

/// Fraction of the base unit charged per serving tick at `speed`
#[must_use]
pub fn rate_for(speed: Speed) -> f64 {
    match speed {
        Speed::High => 1.0,
        Speed::Medium => 0.5,
        Speed::Low => 1.0 / 3.0,
    }
}

/// Whether a one-unit move is due on the `served_ticks`-th serving tick
#[must_use]
pub fn delta_due(speed: Speed, served_ticks: u64) -> bool {
    served_ticks % ticks_per_unit(speed) == 0
}

/// Snapshot a control block into an audit-trail row
#[must_use]
pub fn detail_for(entry: &ScheduleEntry, recorded_at: u64) -> Detail {
    let rate = if entry.ac_state == AcState::Running {
        rate_for(entry.current_speed)
    } else {
        0.0
    };
    Detail {
        bill_id: entry.bill_id,
        room_id: entry.room_id,
        ac_id: entry.ac_id,
        ac_status: entry.ac_state,
        speed: entry.current_speed,
        mode: entry.mode,
        target_temp: entry.target_temp,
        environment_temp: entry.environment_temp,
        current_temp: entry.current_temp,
        running_time: entry.running_time,
        current_running_time: entry.current_running_time,
        current_cost: entry.current_cost,
        total_cost: entry.total_cost,
        rate,
        temp_change: entry.last_temp_change,
        recorded_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::Mode;

    #[test]
    fn test_rates_by_speed() {
        assert!((rate_for(Speed::High) - 1.0).abs() < f64::EPSILON);
        assert!((rate_for(Speed::Medium) - 0.5).abs() < f64::EPSILON);
        assert!((rate_for(Speed::Low) - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_high_moves_every_tick() {
        for tick in 1..=6 {
            assert!(delta_due(Speed::High, tick));
        }
    }

    #[test]
    fn test_medium_moves_every_second_tick() {
        let due: Vec<u64> = (1..=6).filter(|&t| delta_due(Speed::Medium, t)).collect();
        assert_eq!(due, vec![2, 4, 6]);
    }

    #[test]
    fn test_low_moves_every_third_tick() {
        let due: Vec<u64> = (1..=9).filter(|&t| delta_due(Speed::Low, t)).collect();
        assert_eq!(due, vec![3, 6, 9]);
    }

    #[test]
    fn test_detail_carries_entry_fields() {
        let mut entry = ScheduleEntry::new(7, 3, 101, Mode::Cooling, Speed::High, 220, 250, 240);
        entry.ac_state = AcState::Running;
        entry.current_cost = 10;
        entry.total_cost = 25;
        entry.last_temp_change = 1;

        let detail = detail_for(&entry, 1_700_000_000);
        assert_eq!(detail.ac_id, 7);
        assert_eq!(detail.bill_id, 3);
        assert_eq!(detail.room_id, 101);
        assert_eq!(detail.current_cost, 10);
        assert_eq!(detail.total_cost, 25);
        assert_eq!(detail.temp_change, 1);
        assert!((detail.rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_detail_rate_zero_when_not_serving() {
        let entry = ScheduleEntry::new(7, 3, 101, Mode::Cooling, Speed::High, 220, 250, 240);
        let detail = detail_for(&entry, 0);
        assert!((detail.rate).abs() < f64::EPSILON);
    }
}
