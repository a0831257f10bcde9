use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use delayq_core::{Job, JobId};
use delayq_infra::store::InMemoryOrderedStore;
use delayq_infra::tasks::{TaskController, TaskControllerConfig};

const INTERVAL: Duration = Duration::from_secs(1);

fn controller(
    store: std::sync::Arc<InMemoryOrderedStore>,
) -> TaskController<std::sync::Arc<InMemoryOrderedStore>> {
    TaskController::builder(store, TaskControllerConfig::new(INTERVAL))
        .job_handler_fn(|job: &Job| {
            black_box(job.payload.len());
            Ok(())
        })
        .build()
        .unwrap()
}

fn far_future(offset: i64) -> DateTime<Utc> {
    // Year 2100, so adds always clear the lead-time check.
    Utc.timestamp_opt(4_102_444_800 + offset, 0).unwrap()
}

/// Queue of `size` jobs spread over one second each.
fn seeded(size: usize) -> (std::sync::Arc<InMemoryOrderedStore>, Vec<JobId>) {
    let store = InMemoryOrderedStore::arc();
    let tc = controller(store.clone());
    let ids = (0..size)
        .map(|i| {
            tc.add_job(far_future(i as i64), format!("payload-{i}"))
                .unwrap()
        })
        .collect();
    (store, ids)
}

fn bench_add_job(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_job");

    // Each add scans the queue for an existing ID, so cost grows with depth.
    for depth in [0usize, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let (store, _) = seeded(depth);
            let tc = controller(store);
            let mut n = 0i64;

            b.iter(|| {
                n += 1;
                tc.add_job(far_future(-n), black_box(b"benchmark payload"))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_poll_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_cycle");

    for due in [1usize, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*due as u64));
        group.bench_with_input(BenchmarkId::from_parameter(due), due, |b, &due| {
            b.iter_batched(
                || {
                    let (store, _) = seeded(due);
                    controller(store)
                },
                |tc| {
                    let report = tc.poll_at(far_future(due as i64)).unwrap();
                    assert_eq!(report.len(), due);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_remove_jobs(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_jobs");
    group.sample_size(50);

    for size in [100usize, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || {
                    let (store, ids) = seeded(size);
                    (controller(store), ids)
                },
                |(tc, ids)| {
                    let removed = tc.remove_jobs(&ids[..size / 2]).unwrap();
                    assert_eq!(removed as usize, size / 2);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add_job, bench_poll_cycle, bench_remove_jobs);
criterion_main!(benches);
