//! Logger telemetry
//!
//! # Design
//! Counters are kept by the card logger and the sample producer themselves. A
//! snapshot is taken on request and rendered as compact JSON, which the firmware
//! prints on its debug port and the host simulator writes to its log.
use heapless::String;
use serde::Serialize;

use crate::storage::FileName;

/// Rendered telemetry line.
pub type TelemetryJson = String<256>;

#[derive(Serialize, Clone, Default, Debug, PartialEq)]
pub struct CardTelemetry {
    /// Current logger state.
    pub state: &'static str,
    /// Data file being written, if streaming.
    pub file: Option<FileName>,
    /// Bytes handed to the data file since power-up.
    pub bytes_written: u32,
    /// Forced flushes since power-up.
    pub syncs: u32,
    pub mounts: u32,
    /// Mount, open and write failures.
    pub failures: u32,
}

#[derive(Serialize, Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct ProducerTelemetry {
    /// Rows queued.
    pub rows: u32,
    /// Rows lost to a full queue.
    pub dropped: u32,
}

#[derive(Serialize, Clone, Default, Debug, PartialEq)]
pub struct Telemetry {
    pub card: CardTelemetry,
    pub producer: ProducerTelemetry,
}

impl Telemetry {
    pub fn to_json(&self) -> Result<TelemetryJson, serde_json_core::ser::Error> {
        serde_json_core::to_string(self)
    }
}
