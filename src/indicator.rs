//! SD card activity LED.
//!
//! While no card is logging the LED breathes slowly (heartbeat). Once logging
//! starts it is switched to manual mode and shows producer activity.

/// Full scale PWM compare value.
pub const LED_MAX_BRIGHTNESS: u16 = 1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Indication {
    /// Idle breathing pattern.
    Heartbeat,
    /// Manual mode: on while a row is being produced.
    Busy(bool),
}

/// Sink for activity indications.
pub trait Indicator {
    fn indicate(&mut self, indication: Indication);
}

/// No indicator fitted.
impl Indicator for () {
    fn indicate(&mut self, _indication: Indication) {}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Rising,
    Falling,
    Manual,
}

/// LED brightness generator.
///
/// `update()` is called at a fixed rate by the LED task and returns the PWM value.
#[derive(Clone, Debug)]
pub struct StatusLed {
    mode: Mode,
    brightness: u16,
    busy: bool,
}

impl Default for StatusLed {
    fn default() -> Self {
        Self {
            mode: Mode::Rising,
            brightness: 0,
            busy: false,
        }
    }
}

impl StatusLed {
    pub fn update(&mut self) -> u16 {
        match self.mode {
            Mode::Rising => {
                if self.brightness >= LED_MAX_BRIGHTNESS {
                    self.mode = Mode::Falling;
                } else {
                    self.brightness += 1;
                }
            }
            Mode::Falling => {
                self.brightness = self.brightness.saturating_sub(1);
                if self.brightness == 0 {
                    self.mode = Mode::Rising;
                }
            }
            Mode::Manual => {
                self.brightness = if self.busy { LED_MAX_BRIGHTNESS } else { 0 };
            }
        }
        self.brightness
    }
}

impl Indicator for StatusLed {
    fn indicate(&mut self, indication: Indication) {
        match indication {
            Indication::Heartbeat => {
                if self.mode == Mode::Manual {
                    self.mode = Mode::Rising;
                    self.brightness = 0;
                }
            }
            Indication::Busy(busy) => {
                self.mode = Mode::Manual;
                self.busy = busy;
            }
        }
    }
}
