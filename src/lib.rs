//! # PolyDAQ 2 SD card logger
//!
//! Data logging pipeline of the PolyDAQ 2 acquisition board: a column configuration
//! read from the card, a periodic sample producer writing CSV rows into a bounded
//! byte queue, and a card state machine draining that queue into a data file.
#![cfg_attr(not(test), no_std)]

pub mod acquisition;
pub mod config;
pub mod csv;
pub mod indicator;
pub mod logger;
pub mod producer;
pub mod queue;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod mock;

/// Millisecond system time.
pub type Instant = fugit::TimerInstantU32<1_000>;

/// Millisecond duration.
pub type Duration = fugit::MillisDurationU32;
