use std::{f32::consts::TAU, time::Instant};

use polydaq_logger::acquisition::{Command, RawSource, Source};
use strum::EnumString;

/// Full scale of the synthetic signals in raw counts.
const AMPLITUDE: f32 = 16_000.0;

/// Signal frequency in Hz.
const FREQUENCY: f32 = 0.2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Waveform {
    Constant,
    Ramp,
    Sine,
}

/// Synthetic acquisition hardware. Every source gets its own phase offset.
pub struct Synthetic {
    waveform: Waveform,
    start: Instant,
}

impl Synthetic {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            start: Instant::now(),
        }
    }
}

impl RawSource for Synthetic {
    fn get_raw(&mut self, command: Command) -> i16 {
        let phase = match command.source() {
            Source::Adc(channel) => channel as f32 / 16.0,
            Source::Accelerometer(axis) => axis as u8 as f32 / 3.0,
            Source::ExternalAccelerometer(axis) => 0.5 + axis as u8 as f32 / 6.0,
            Source::Unknown => return 0,
        };
        let cycles = self.start.elapsed().as_secs_f32() * FREQUENCY + phase;
        let x = match self.waveform {
            Waveform::Constant => 1.0 - 2.0 * phase,
            Waveform::Ramp => 2.0 * cycles.fract() - 1.0,
            Waveform::Sine => (TAU * cycles).sin(),
        };
        (x * AMPLITUDE) as i16
    }
}
