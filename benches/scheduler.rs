//! Scheduler tick throughput over a loaded fleet

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use climatizar::metrics::MetricsCollector;
use climatizar::scheduler::types::{Mode, ScheduleEntry, Speed};
use climatizar::scheduler::{Scheduler, SchedulerConfig};
use climatizar::store::FleetStore;

fn loaded_scheduler(rooms: i64) -> Scheduler {
    let store = Arc::new(FleetStore::in_memory());
    let scheduler = Scheduler::new(
        SchedulerConfig::default(),
        store,
        Arc::new(MetricsCollector::new()),
    );
    for i in 0..rooms {
        let speed = match i % 3 {
            0 => Speed::High,
            1 => Speed::Medium,
            _ => Speed::Low,
        };
        scheduler.add_request(ScheduleEntry::new(
            i,
            1,
            101 + i,
            Mode::Cooling,
            speed,
            160,
            250,
            250,
        ));
    }
    scheduler
}

fn bench_full_slice(c: &mut Criterion) {
    c.bench_function("slice_of_10_ticks_60_rooms", |b| {
        b.iter_batched(
            || loaded_scheduler(60),
            |scheduler| {
                for _ in 0..10 {
                    scheduler.tick();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_sort_phase_heavy(c: &mut Criterion) {
    c.bench_function("slice_of_10_ticks_300_rooms", |b| {
        b.iter_batched(
            || loaded_scheduler(300),
            |scheduler| {
                for _ in 0..10 {
                    scheduler.tick();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_full_slice, bench_sort_phase_heavy);
criterion_main!(benches);
