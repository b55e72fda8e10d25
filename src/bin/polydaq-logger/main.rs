//! Host simulation of the PolyDAQ 2 card logger.
//!
//! ```text
//! polydaq-logger [--card DIR] [--duration SECONDS] [--waveform constant|ramp|sine]
//! ```
//!
//! The directory given by `--card` plays the SD card: put a `polydaq2.cfg` into it
//! and the logger starts writing `data_NNN.csv` files next to it. Removing the
//! directory pulls the card.
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    thread,
    time::{Duration as StdDuration, Instant as StdInstant},
};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use polydaq_logger::{
    config::{LoggerConfiguration, Publish},
    indicator::{Indication, Indicator, StatusLed},
    logger::CardLogger,
    producer::SampleProducer,
    queue::{ByteQueue, ByteSource, Overflow, RowSink},
    telemetry::{ProducerTelemetry, Telemetry},
    Instant,
};

use crate::{
    card_dir::CardDir,
    signal::{Synthetic, Waveform},
};

mod card_dir;
mod signal;

const TELEMETRY_PERIOD: StdDuration = StdDuration::from_secs(5);

type Snapshot = Arc<RwLock<Option<Arc<LoggerConfiguration>>>>;

/// Publishes by swapping the shared pointer.
struct SnapshotPublisher(Snapshot);

impl Publish for SnapshotPublisher {
    fn publish(&mut self, config: Option<LoggerConfiguration>) {
        let config = config.map(Arc::new);
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = config;
    }
}

/// Queue shared between the producer thread and the logger thread. The lock is held
/// for one row or one chunk at a time.
#[derive(Clone, Default)]
struct SharedQueue(Arc<Mutex<ByteQueue>>);

impl RowSink for SharedQueue {
    fn push_row(&mut self, row: &[u8]) -> Result<(), Overflow> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_row(row)
    }
}

impl ByteSource for SharedQueue {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_available(buf)
    }

    fn discard(&mut self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).discard()
    }
}

/// Activity LED shared by the producer and the card logger.
#[derive(Clone, Default)]
struct SharedLed(Arc<Mutex<StatusLed>>);

impl SharedLed {
    /// Advance the LED pattern by one step and return the brightness.
    fn update(&self) -> u16 {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).update()
    }
}

impl Indicator for SharedLed {
    fn indicate(&mut self, indication: Indication) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .indicate(indication)
    }
}

fn timestamp(start: StdInstant) -> Instant {
    // Wraps after 49 days like the firmware tick counter.
    Instant::from_ticks(start.elapsed().as_millis() as u32)
}

fn main() -> Result<()> {
    env_logger::init();
    let mut pargs = pico_args::Arguments::from_env();

    let card: PathBuf = pargs
        .opt_value_from_str("--card")?
        .unwrap_or_else(|| PathBuf::from("card"));
    let duration: Option<u64> = pargs.opt_value_from_str("--duration")?;
    let waveform: Waveform = pargs
        .opt_value_from_str("--waveform")?
        .unwrap_or(Waveform::Sine);
    let rest = pargs.finish();
    if !rest.is_empty() {
        return Err(anyhow!("Unexpected arguments: {rest:?}"));
    }
    info!("Card directory {}, {waveform:?} signal", card.display());

    let start = StdInstant::now();
    let snapshot = Snapshot::default();
    let queue = SharedQueue::default();
    let producer_stats = Arc::new(Mutex::new(ProducerTelemetry::default()));
    let running = Arc::new(AtomicBool::new(true));
    let led = SharedLed::default();

    let producer = {
        let snapshot = snapshot.clone();
        let mut queue = queue.clone();
        let stats = producer_stats.clone();
        let running = running.clone();
        let mut led = led.clone();
        thread::Builder::new()
            .name("producer".into())
            .spawn(move || {
                let mut producer = SampleProducer::default();
                let mut source = Synthetic::new(waveform);
                while running.load(Ordering::Relaxed) {
                    let config = snapshot.read().unwrap_or_else(|e| e.into_inner()).clone();
                    producer.sample(
                        config.as_deref(),
                        timestamp(start),
                        &mut source,
                        &mut queue,
                        &mut led,
                    );
                    *stats.lock().unwrap_or_else(|e| e.into_inner()) = producer.telemetry();
                    let period = SampleProducer::period(config.as_deref());
                    thread::sleep(StdDuration::from_millis(period.ticks().into()));
                }
            })
            .context("Spawning producer thread")?
    };

    let storage = CardDir::new(card);
    let mut logger = CardLogger::new(storage, SnapshotPublisher(snapshot), led.clone());
    let mut queue = queue;
    let mut next_telemetry = start + TELEMETRY_PERIOD;
    let deadline = duration.map(|s| start + StdDuration::from_secs(s));

    while deadline.map_or(true, |deadline| StdInstant::now() < deadline) {
        let delay = logger.poll(timestamp(start), &mut queue);
        let brightness = led.update();

        if StdInstant::now() >= next_telemetry {
            next_telemetry += TELEMETRY_PERIOD;
            let telemetry = Telemetry {
                card: logger.telemetry(),
                producer: *producer_stats.lock().unwrap_or_else(|e| e.into_inner()),
            };
            match telemetry.to_json() {
                Ok(json) => info!("{json} led={brightness}"),
                Err(e) => warn!("Telemetry serialization failed: {e:?}"),
            }
        }

        thread::sleep(StdDuration::from_millis(delay.ticks().into()));
    }

    running.store(false, Ordering::Relaxed);
    producer
        .join()
        .map_err(|_| anyhow!("Producer thread panicked"))?;
    info!("Done: {:?}", logger.telemetry());
    Ok(())
}
