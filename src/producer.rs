//! Periodic sample producer.
//!
//! Once per tick every configured column is read from the acquisition hardware,
//! calibrated and appended to the queue as a single CSV row. The producer never
//! blocks: a row that does not fit is dropped and counted.
use log::warn;

use crate::{
    acquisition::RawSource,
    config::LoggerConfiguration,
    csv::{self, Row},
    indicator::{Indication, Indicator},
    queue::RowSink,
    telemetry::ProducerTelemetry,
    Duration, Instant,
};

/// Back-off between ticks while no configuration is published.
pub const IDLE_PERIOD: Duration = Duration::millis(100);

/// Outcome of one tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sample {
    /// No configuration, nothing acquired.
    Idle,
    /// A complete row was queued.
    Logged,
    /// The row was lost (queue full or row too long).
    Dropped,
}

#[derive(Default, Debug)]
pub struct SampleProducer {
    rows: u32,
    dropped: u32,
}

impl SampleProducer {
    /// Delay until the next tick.
    pub fn period(config: Option<&LoggerConfiguration>) -> Duration {
        config.map_or(IDLE_PERIOD, LoggerConfiguration::sample_period)
    }

    pub fn sample(
        &mut self,
        config: Option<&LoggerConfiguration>,
        now: Instant,
        source: &mut impl RawSource,
        sink: &mut impl RowSink,
        indicator: &mut impl Indicator,
    ) -> Sample {
        let Some(config) = config else {
            return Sample::Idle;
        };

        indicator.indicate(Indication::Busy(true));
        let mut row = Row::new();
        let values = config
            .columns()
            .iter()
            .map(|column| column.calibrate(source.get_raw(column.command)));
        let result = csv::write_row(&mut row, now.ticks(), values)
            .map_err(|_| "row too long")
            .and_then(|()| {
                sink.push_row(row.as_bytes()).map_err(|_| "queue overflow")
            });
        indicator.indicate(Indication::Busy(false));

        match result {
            Ok(()) => {
                self.rows = self.rows.wrapping_add(1);
                Sample::Logged
            }
            Err(reason) => {
                self.dropped = self.dropped.wrapping_add(1);
                warn!("Row at {} ms dropped: {reason}", now.ticks());
                Sample::Dropped
            }
        }
    }

    pub fn telemetry(&self) -> ProducerTelemetry {
        ProducerTelemetry {
            rows: self.rows,
            dropped: self.dropped,
        }
    }
}
