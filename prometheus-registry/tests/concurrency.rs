use std::{sync::Arc, thread};

use proptest::{collection::vec, prelude::*};

use prometheus_registry::Registry;

const THREADS: usize = 4;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn gauge_deltas_are_never_lost(deltas in vec(-1000i32..1000, 1..256)) {
        let registry = Arc::new(Registry::new());
        let gauge = registry.make_gauge("level", &[], "");

        // Integral deltas keep the float sum exact whatever the interleaving.
        let expected = deltas.iter().map(|delta| f64::from(*delta)).sum::<f64>();

        let chunk = (deltas.len() + THREADS - 1) / THREADS;
        let workers = deltas
            .chunks(chunk)
            .map(|chunk| {
                let gauge = Arc::clone(&gauge);
                let chunk = chunk.to_vec();
                thread::spawn(move || {
                    for (i, delta) in chunk.into_iter().enumerate() {
                        if i % 2 == 0 {
                            gauge.increment(f64::from(delta));
                        } else {
                            gauge.decrement(-f64::from(delta));
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for worker in workers {
            worker.join().expect("worker should not panic");
        }

        prop_assert_eq!(gauge.value(), expected);
    }

    #[test]
    fn counter_never_decreases(increments in vec((0u64..1000, 0.0f64..100.0), 1..128)) {
        let registry = Registry::new();
        let counter = registry.make_counter("events_total", &[], "");

        let mut previous = counter.value();
        for (integer, float) in increments {
            counter.increment(integer);
            counter.increment_by(float);

            let current = counter.value();
            prop_assert!(current >= previous);
            previous = current;
        }
    }
}

#[test]
fn concurrent_make_returns_one_instance() {
    let registry = Arc::new(Registry::new());

    let workers = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let counter = registry.make_counter("shared_total", &[("shard", "0")], "");
                for _ in 0..1000 {
                    counter.increment(1);
                }
                counter.id()
            })
        })
        .collect::<Vec<_>>();

    let ids = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker should not panic"))
        .collect::<Vec<_>>();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));

    assert_eq!(
        registry.emit_to_string(),
        "# TYPE shared_total counter\nshared_total{shard=\"0\"} 8000\n"
    );
}

#[test]
fn emit_races_with_writers() {
    let registry = Arc::new(Registry::new());
    let histogram = registry.make_value_histogram("work_size", &[], "", &[10.0]);

    // The writer cycles through 0..20, so bucket, sum, and count are all functions of how many
    // observations a scrape saw.
    let writer = {
        let histogram = Arc::clone(&histogram);
        thread::spawn(move || {
            for i in 0..10_000u32 {
                histogram.record(f64::from(i % 20));
            }
        })
    };

    for _ in 0..100 {
        let output = registry.emit_to_string();
        let value_of = |prefix: &str| {
            output
                .lines()
                .find_map(|line| line.strip_prefix(prefix))
                .and_then(|value| value.parse::<f64>().ok())
                .expect("histogram series should be present")
        };

        let bucket = value_of("work_size_bucket{le=\"10\"} ");
        let sum = value_of("work_size_sum ");
        let count = value_of("work_size_count ");

        let cycles = (count / 20.0).floor();
        let rest = count - cycles * 20.0;
        assert!(bucket <= count);
        assert_eq!(bucket, cycles * 11.0 + rest.min(11.0));
        assert_eq!(sum, cycles * 190.0 + rest * (rest - 1.0) / 2.0);
    }

    writer.join().expect("writer should not panic");
    assert_eq!(histogram.snapshot().count, 10_000);
}
