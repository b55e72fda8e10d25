//! SD card logging state machine.
//!
//! # Design
//! The card logger owns the storage adapter and walks a card through detection,
//! mounting, configuration and streaming. The transition table is declared once
//! with `smlang`; [CardLogger::step] applies a single event and its side effects
//! while [CardLogger::poll] performs the I/O of the current state and turns the
//! outcome into the next event.
//!
//! Pulling the card is legal in every state and always leads back to `NoCard`.
//! Data reaches the medium only on a forced flush, so a pulled card loses at most
//! the bytes written since the last [SYNC_PERIOD] boundary.
use embedded_io::Write;
use log::{error, info, warn};

use crate::{
    config::{self, LoggerConfiguration, Publish, CONFIG_FILE_NAME},
    csv::{self, Header},
    indicator::{Indication, Indicator},
    queue::ByteSource,
    storage::{BlockStorage, FileName, OpenError, DATA_FILE_BASE, DATA_FILE_EXT},
    telemetry::CardTelemetry,
    Duration, Instant,
};

/// Interval between forced flushes of the data file.
pub const SYNC_PERIOD: Duration = Duration::millis(1000);

/// Poll interval while there is nothing to do (no card, bad configuration).
pub const IDLE_POLL: Duration = Duration::millis(1000);

/// Back-off after a failed mount, open or write.
pub const RETRY_DELAY: Duration = Duration::millis(5000);

/// Poll interval while streaming.
pub const STREAM_POLL: Duration = Duration::millis(1);

const CONTINUE: Duration = Duration::millis(0);

/// Bytes moved from the queue to the file per write call.
const DRAIN_CHUNK: usize = 128;

mod sm {
    use smlang::statemachine;

    statemachine! {
        derive_states: [Copy, Clone, Debug],
        derive_events: [Copy, Clone, Debug],
        transitions: {
            *NoCard + CardDetected = Mounting,
            NoCard + Idle = NoCard,
            NoCard + CardAbsent = NoCard,

            Mounting + CardAbsent = NoCard,
            Mounting + MountFailed = NoCard,
            Mounting + Mounted = ReadingConfig,

            ReadingConfig + CardAbsent = NoCard,
            ReadingConfig + ReadFailed = NoCard,
            ReadingConfig + ConfigInvalid = BadConfig,
            ReadingConfig + ConfigValid = OpeningFile,

            OpeningFile + CardAbsent = NoCard,
            OpeningFile + OpenFailed = NoCard,
            OpeningFile + Opened = Streaming,

            Streaming + CardAbsent = NoCard,
            Streaming + Idle = Streaming,
            Streaming + WriteFailed = NoCard,

            BadConfig + CardAbsent = NoCard,
            BadConfig + Idle = BadConfig,
        }
    }

    pub struct Context;

    impl StateMachineContext for Context {}
}

pub use sm::{Events as Event, States as State};

pub fn state_name(state: State) -> &'static str {
    match state {
        State::NoCard => "NoCard",
        State::Mounting => "Mounting",
        State::ReadingConfig => "ReadingConfig",
        State::OpeningFile => "OpeningFile",
        State::Streaming => "Streaming",
        State::BadConfig => "BadConfig",
    }
}

struct DataFile<F> {
    name: FileName,
    file: F,
    next_sync: Instant,
}

pub struct CardLogger<S: BlockStorage, P, I> {
    storage: S,
    publisher: P,
    indicator: I,
    sm: sm::StateMachine<sm::Context>,
    mounted: bool,
    config: Option<LoggerConfiguration>,
    file: Option<DataFile<S::File>>,
    counters: CardTelemetry,
}

impl<S, P, I> CardLogger<S, P, I>
where
    S: BlockStorage,
    P: Publish,
    I: Indicator,
{
    pub fn new(storage: S, publisher: P, indicator: I) -> Self {
        Self {
            storage,
            publisher,
            indicator,
            sm: sm::StateMachine::new(sm::Context),
            mounted: false,
            config: None,
            file: None,
            counters: CardTelemetry::default(),
        }
    }

    pub fn state(&self) -> State {
        *self.sm.state()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn telemetry(&self) -> CardTelemetry {
        CardTelemetry {
            state: state_name(self.state()),
            file: self.file.as_ref().map(|data| data.name.clone()),
            ..self.counters.clone()
        }
    }

    /// Run one cycle of the current state.
    ///
    /// Returns the time the caller should wait before the next call.
    pub fn poll(&mut self, now: Instant, queue: &mut impl ByteSource) -> Duration {
        let present = self.storage.detect();
        let (event, delay) = match (self.state(), present) {
            (State::NoCard, false) => (Event::Idle, IDLE_POLL),
            (State::NoCard, true) => (Event::CardDetected, CONTINUE),
            (_, false) => (Event::CardAbsent, CONTINUE),
            (State::Mounting, true) => self.mount(),
            (State::ReadingConfig, true) => self.read_config(queue),
            (State::OpeningFile, true) => self.open_data_file(now),
            (State::Streaming, true) => self.drain(now, queue),
            (State::BadConfig, true) => (Event::Idle, IDLE_POLL),
        };
        self.step(event);
        delay
    }

    /// Apply a single event. Events without a transition from the current state are
    /// ignored.
    pub fn step(&mut self, event: Event) -> State {
        let from = self.state();
        let to = match self.sm.process_event(event) {
            Ok(to) => *to,
            Err(_) => {
                warn!("Ignoring {event:?} in {}", state_name(from));
                return from;
            }
        };

        if core::mem::discriminant(&from) != core::mem::discriminant(&to) {
            info!("{} -> {} ({event:?})", state_name(from), state_name(to));
        }

        match (from, to) {
            (State::ReadingConfig, State::OpeningFile) => {
                self.publisher.publish(self.config.clone());
            }
            (State::ReadingConfig, State::BadConfig) => self.release(),
            (State::NoCard, State::NoCard) => {
                self.indicator.indicate(Indication::Heartbeat)
            }
            (_, State::NoCard) => {
                self.release();
                self.indicator.indicate(Indication::Heartbeat);
            }
            _ => {}
        }
        to
    }

    fn mount(&mut self) -> (Event, Duration) {
        match self.storage.mount() {
            Ok(()) => {
                self.mounted = true;
                self.counters.mounts = self.counters.mounts.wrapping_add(1);
                (Event::Mounted, CONTINUE)
            }
            Err(e) => {
                warn!("Card mount failed: {e:?}");
                self.fail();
                (Event::MountFailed, RETRY_DELAY)
            }
        }
    }

    fn read_config(&mut self, queue: &mut impl ByteSource) -> (Event, Duration) {
        match LoggerConfiguration::read(&mut self.storage, CONFIG_FILE_NAME) {
            Ok(config) => {
                info!(
                    "{} columns every {} ms",
                    config.columns().len(),
                    config.sample_period().ticks()
                );
                queue.discard();
                self.config = Some(config);
                (Event::ConfigValid, CONTINUE)
            }
            Err(config::Error::Read) => {
                warn!("Card failed while reading {CONFIG_FILE_NAME}");
                self.fail();
                (Event::ReadFailed, RETRY_DELAY)
            }
            Err(e) => {
                warn!("No usable {CONFIG_FILE_NAME}: {e:?}");
                (Event::ConfigInvalid, CONTINUE)
            }
        }
    }

    fn open_data_file(&mut self, now: Instant) -> (Event, Duration) {
        let Some(config) = self.config.as_ref() else {
            return (Event::OpenFailed, RETRY_DELAY);
        };
        let mut header = Header::new();
        if csv::write_header(&mut header, config).is_err() {
            warn!("CSV header too long");
            self.fail();
            return (Event::OpenFailed, RETRY_DELAY);
        }

        let (name, mut file) = match self
            .storage
            .open_new_sequenced(DATA_FILE_BASE, DATA_FILE_EXT)
        {
            Ok(opened) => opened,
            Err(OpenError::Exhausted) => {
                error!("All data file names are taken");
                self.fail();
                return (Event::OpenFailed, RETRY_DELAY);
            }
            Err(e) => {
                warn!("Cannot create data file: {e:?}");
                self.fail();
                return (Event::OpenFailed, RETRY_DELAY);
            }
        };

        if let Err(e) = file
            .write_all(header.as_bytes())
            .and_then(|()| file.flush())
        {
            warn!("Writing header to {name} failed: {e:?}");
            self.storage.close(file).ok();
            self.fail();
            return (Event::OpenFailed, RETRY_DELAY);
        }

        info!("Logging to {name}");
        self.counters.bytes_written =
            self.counters.bytes_written.wrapping_add(header.len() as u32);
        self.counters.syncs = self.counters.syncs.wrapping_add(1);
        self.file = Some(DataFile {
            name,
            file,
            next_sync: now + SYNC_PERIOD,
        });
        (Event::Opened, CONTINUE)
    }

    /// Write everything queued and flush if the sync period has elapsed.
    fn drain(&mut self, now: Instant, queue: &mut impl ByteSource) -> (Event, Duration) {
        let Some(data) = self.file.as_mut() else {
            return (Event::WriteFailed, RETRY_DELAY);
        };

        let mut buf = [0u8; DRAIN_CHUNK];
        loop {
            let n = queue.read_available(&mut buf);
            if n == 0 {
                break;
            }
            if let Err(e) = data.file.write_all(&buf[..n]) {
                warn!("Write to {} failed: {e:?}", data.name);
                self.counters.failures = self.counters.failures.wrapping_add(1);
                return (Event::WriteFailed, RETRY_DELAY);
            }
            self.counters.bytes_written =
                self.counters.bytes_written.wrapping_add(n as u32);
        }

        if now >= data.next_sync {
            if let Err(e) = data.file.flush() {
                warn!("Sync of {} failed: {e:?}", data.name);
                self.counters.failures = self.counters.failures.wrapping_add(1);
                return (Event::WriteFailed, RETRY_DELAY);
            }
            self.counters.syncs = self.counters.syncs.wrapping_add(1);
            data.next_sync = now + SYNC_PERIOD;
        }
        (Event::Idle, STREAM_POLL)
    }

    /// Close the data file, unmount and withdraw the configuration.
    fn release(&mut self) {
        if let Some(data) = self.file.take() {
            if let Err(e) = self.storage.close(data.file) {
                warn!("Closing {} failed: {e:?}", data.name);
            }
        }
        if self.mounted {
            self.storage.unmount();
            self.mounted = false;
        }
        self.config = None;
        self.publisher.publish(None);
    }

    fn fail(&mut self) {
        self.counters.failures = self.counters.failures.wrapping_add(1);
    }
}
