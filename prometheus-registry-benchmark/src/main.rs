use getopts::Options;
use hdrhistogram::{CreationError, Histogram as HdrHistogram};
use log::{error, info};
use metrics::{counter, gauge, histogram};
use portable_atomic::AtomicU64;
use prometheus_registry::{Counter, Gauge, RecorderBuilder, Registry, ValueHistogram};
use quanta::{Clock, Instant as QuantaInstant};
use std::{
    env,
    ops::Sub,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

const LOOP_SAMPLE: u64 = 1000;

const BUCKETS: [f64; 8] = [1e-7, 2.5e-7, 5e-7, 1e-6, 2.5e-6, 5e-6, 1e-5, 1e-4];

/// Handles for one label value, created up front.
struct Shard {
    counter: Arc<Counter>,
    gauge: Arc<Gauge>,
    histogram: Arc<ValueHistogram>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Updates registry handles directly.
    Direct,
    /// Goes through the `metrics` macros on every update.
    Facade,
}

struct Generator {
    t0: Option<QuantaInstant>,
    gauge: i64,
    shards: Vec<String>,
    hist: HdrHistogram<u64>,
    done: Arc<AtomicBool>,
    rate_counter: Arc<AtomicU64>,
}

impl Generator {
    fn new(
        cardinality: usize,
        done: Arc<AtomicBool>,
        rate_counter: Arc<AtomicU64>,
    ) -> Result<Generator, CreationError> {
        Ok(Generator {
            t0: None,
            gauge: 0,
            shards: (0..cardinality).map(|i| i.to_string()).collect(),
            hist: HdrHistogram::<u64>::new_with_bounds(1, u64::MAX, 3)?,
            done,
            rate_counter,
        })
    }

    fn run_direct(&mut self, registry: &Registry) {
        let handles = self
            .shards
            .iter()
            .map(|shard| {
                let labels = [("shard", shard.as_str())];
                Shard {
                    counter: registry.make_counter("bench_ops_total", &labels, "Loop iterations."),
                    gauge: registry.make_gauge("bench_loop_gauge", &labels, "Last loop index."),
                    histogram: registry.make_value_histogram(
                        "bench_loop_seconds",
                        &labels,
                        "Time between loop iterations.",
                        &BUCKETS,
                    ),
                }
            })
            .collect::<Vec<_>>();

        let clock = Clock::new();
        let mut loop_counter = 0;

        loop {
            loop_counter += 1;

            self.gauge += 1;

            let t1 = clock.recent();

            if let Some(t0) = self.t0 {
                let start = if loop_counter % LOOP_SAMPLE == 0 { Some(clock.now()) } else { None };

                let shard = &handles[loop_counter as usize % handles.len()];
                shard.counter.increment(1);
                shard.gauge.set(self.gauge as f64);
                shard.histogram.record_duration(t1.sub(t0));

                if let Some(val) = start {
                    if self.sample(clock.now() - val) {
                        break;
                    }
                }
            }

            self.t0 = Some(t1);
        }
    }

    fn run_facade(&mut self) {
        let clock = Clock::new();
        let mut loop_counter = 0;

        loop {
            loop_counter += 1;

            self.gauge += 1;

            let t1 = clock.recent();

            if let Some(t0) = self.t0 {
                let start = if loop_counter % LOOP_SAMPLE == 0 { Some(clock.now()) } else { None };

                let shard = self.shards[loop_counter as usize % self.shards.len()].clone();
                counter!("bench_ops_total", "shard" => shard.clone()).increment(1);
                gauge!("bench_loop_gauge", "shard" => shard.clone()).set(self.gauge as f64);
                histogram!("bench_loop_seconds", "shard" => shard).record(t1.sub(t0));

                if let Some(val) = start {
                    if self.sample(clock.now() - val) {
                        break;
                    }
                }
            }

            self.t0 = Some(t1);
        }
    }

    /// Records the latency of one sampled iteration, returning `true` once the run is over.
    fn sample(&mut self, delta: Duration) -> bool {
        self.hist.saturating_record(delta.as_nanos() as u64);

        // We also increment our global counter for the sample rate here.
        self.rate_counter.fetch_add(LOOP_SAMPLE * 3, Ordering::AcqRel);

        self.done.load(Ordering::Relaxed)
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        info!(
            "    sender latency: min: {:8} p50: {:8} p95: {:8} p99: {:8} p999: {:8} max: {:8}",
            nanos_to_readable(self.hist.min()),
            nanos_to_readable(self.hist.value_at_percentile(50.0)),
            nanos_to_readable(self.hist.value_at_percentile(95.0)),
            nanos_to_readable(self.hist.value_at_percentile(99.0)),
            nanos_to_readable(self.hist.value_at_percentile(99.9)),
            nanos_to_readable(self.hist.max())
        );
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("d", "duration", "number of seconds to run the benchmark", "INTEGER");
    opts.optopt(
        "m",
        "mode",
        "whether to update registry handles directly or through the metrics facade",
        "direct|facade",
    );
    opts.optopt("p", "producers", "number of producers", "INTEGER");
    opts.optopt("c", "cardinality", "number of label values per metric", "INTEGER");
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn main() {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("prometheus-registry-benchmark");
    let opts = opts();

    let matches = match opts.parse(args.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => {
            error!("Failed to parse command line args: {}", f);
            return;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return;
    }

    info!("prometheus registry benchmark");

    let settings = matches.opt_get_default("duration", 60u64).and_then(|seconds| {
        let producers = matches.opt_get_default("producers", 1usize)?;
        let cardinality = matches.opt_get_default("cardinality", 1usize)?;
        Ok((seconds, producers, cardinality.max(1)))
    });
    let (seconds, producers, cardinality) = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid numeric argument: {}", e);
            return;
        }
    };
    let mode = match matches.opt_str("mode").map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("facade") => Mode::Facade,
        _ => Mode::Direct,
    };

    info!("duration: {}s", seconds);
    info!("producers: {}", producers);
    info!("cardinality: {}", cardinality);

    let registry = Arc::new(Registry::new());
    if mode == Mode::Facade {
        let installed = RecorderBuilder::new()
            .set_buckets(&BUCKETS)
            .and_then(|builder| builder.with_registry(Arc::clone(&registry)).install());
        if let Err(e) = installed {
            error!("Failed to install recorder: {}", e);
            return;
        }
        info!("recorder installed");
    }

    // Spin up our sample producers.
    let done = Arc::new(AtomicBool::new(false));
    let rate_counter = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    for _ in 0..producers {
        let mut gen = match Generator::new(cardinality, done.clone(), rate_counter.clone()) {
            Ok(gen) => gen,
            Err(e) => {
                error!("Failed to create latency histogram: {}", e);
                return;
            }
        };
        let registry = Arc::clone(&registry);
        let handle = thread::spawn(move || match mode {
            Mode::Direct => gen.run_direct(&registry),
            Mode::Facade => gen.run_facade(),
        });

        handles.push(handle);
    }

    thread::spawn(|| loop {
        thread::sleep(Duration::from_millis(10));
        quanta::set_recent(quanta::Instant::now());
    });

    // Scrape the registry once per second, measuring how long emission takes.
    let mut total = 0;
    let mut t0 = Instant::now();

    let mut emit_hist = match HdrHistogram::<u64>::new_with_bounds(1, u64::MAX, 3) {
        Ok(hist) => hist,
        Err(e) => {
            error!("Failed to create latency histogram: {}", e);
            return;
        }
    };
    let mut buffer = Vec::new();
    for _ in 0..seconds {
        let t1 = Instant::now();

        buffer.clear();
        let start = Instant::now();
        registry.emit(&mut buffer);
        let end = Instant::now();
        emit_hist.saturating_record(duration_as_nanos(end - start) as u64);

        let turn_total = rate_counter.load(Ordering::Acquire);
        let turn_delta = turn_total - total;
        total = turn_total;
        let rate = turn_delta as f64 / (duration_as_nanos(t1 - t0) / 1_000_000_000.0);

        info!("sample ingest rate: {:.0} samples/sec, scrape size: {} bytes", rate, buffer.len());
        t0 = t1;
        thread::sleep(Duration::new(1, 0));
    }

    info!("--------------------------------------------------------------------------------");
    info!(" ingested samples total: {}", total);
    info!(
        "     registry emit: min: {:8} p50: {:8} p95: {:8} p99: {:8} p999: {:8} max: {:8}",
        nanos_to_readable(emit_hist.min()),
        nanos_to_readable(emit_hist.value_at_percentile(50.0)),
        nanos_to_readable(emit_hist.value_at_percentile(95.0)),
        nanos_to_readable(emit_hist.value_at_percentile(99.0)),
        nanos_to_readable(emit_hist.value_at_percentile(99.9)),
        nanos_to_readable(emit_hist.max())
    );

    // Wait for the producers to finish so we can get their stats too.
    done.store(true, Ordering::SeqCst);
    for handle in handles {
        let _ = handle.join();
    }
}

fn duration_as_nanos(d: Duration) -> f64 {
    (d.as_secs() as f64 * 1e9) + d.subsec_nanos() as f64
}

fn nanos_to_readable(t: u64) -> String {
    let f = t as f64;
    if f < 1_000.0 {
        format!("{}ns", f)
    } else if f < 1_000_000.0 {
        format!("{:.0}μs", f / 1_000.0)
    } else if f < 2_000_000_000.0 {
        format!("{:.2}ms", f / 1_000_000.0)
    } else {
        format!("{:.3}s", f / 1_000_000_000.0)
    }
}
