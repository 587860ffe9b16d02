// Pin I/O capability consumed by the motor drivers
//
// The drivers never read pins back (open-loop). A backend is a cheap, cloneable
// handle onto shared pin state so both channels of one chip can use the same bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Largest magnitude accepted by `write_pwm`
pub const PWM_MAX: u16 = 1023;

/// Pin number as wired on the board header
pub type Pin = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
    /// Output driven by a PWM generator (0..=PWM_MAX)
    Pwm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("Pin {pin} is not configured as {expected:?}")]
    NotConfigured { pin: Pin, expected: PinMode },

    #[error("PWM value {value} out of range for pin {pin} (max 1023)")]
    PwmOutOfRange { pin: Pin, value: u16 },

    #[error("Pin backend unavailable: {0}")]
    Unavailable(String),
}

/// Digital/PWM output capability
pub trait PinIo: Clone {
    fn configure(&mut self, pin: Pin, mode: PinMode) -> Result<(), PinError>;
    fn write_digital(&mut self, pin: Pin, level: Level) -> Result<(), PinError>;
    fn write_pwm(&mut self, pin: Pin, magnitude: u16) -> Result<(), PinError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinValue {
    Digital(Level),
    Duty(u16),
}

#[derive(Debug, Default)]
struct SimBoard {
    modes: HashMap<Pin, PinMode>,
    values: HashMap<Pin, PinValue>,
}

/// Simulated board: tracks the last value written to each pin and logs writes.
///
/// Used when no hardware backend is attached (dry runs, bench testing).
#[derive(Debug, Clone, Default)]
pub struct SimPins {
    board: Arc<Mutex<SimBoard>>,
}

impl SimPins {
    pub fn new() -> Self {
        Self::default()
    }

    fn board(&self) -> Result<MutexGuard<'_, SimBoard>, PinError> {
        self.board
            .lock()
            .map_err(|_| PinError::Unavailable("simulated board lock poisoned".to_string()))
    }

    pub fn level(&self, pin: Pin) -> Option<Level> {
        match self.board().ok()?.values.get(&pin) {
            Some(PinValue::Digital(level)) => Some(*level),
            _ => None,
        }
    }

    pub fn duty(&self, pin: Pin) -> Option<u16> {
        match self.board().ok()?.values.get(&pin) {
            Some(PinValue::Duty(duty)) => Some(*duty),
            _ => None,
        }
    }

    pub fn mode(&self, pin: Pin) -> Option<PinMode> {
        self.board().ok()?.modes.get(&pin).copied()
    }
}

impl PinIo for SimPins {
    fn configure(&mut self, pin: Pin, mode: PinMode) -> Result<(), PinError> {
        trace!("pin {} mode {:?}", pin, mode);
        self.board()?.modes.insert(pin, mode);
        Ok(())
    }

    fn write_digital(&mut self, pin: Pin, level: Level) -> Result<(), PinError> {
        let mut board = self.board()?;
        if board.modes.get(&pin) != Some(&PinMode::Output) {
            return Err(PinError::NotConfigured {
                pin,
                expected: PinMode::Output,
            });
        }
        trace!("pin {} <- {:?}", pin, level);
        board.values.insert(pin, PinValue::Digital(level));
        Ok(())
    }

    fn write_pwm(&mut self, pin: Pin, magnitude: u16) -> Result<(), PinError> {
        if magnitude > PWM_MAX {
            return Err(PinError::PwmOutOfRange {
                pin,
                value: magnitude,
            });
        }
        let mut board = self.board()?;
        if board.modes.get(&pin) != Some(&PinMode::Pwm) {
            return Err(PinError::NotConfigured {
                pin,
                expected: PinMode::Pwm,
            });
        }
        trace!("pin {} <- duty {}", pin, magnitude);
        board.values.insert(pin, PinValue::Duty(magnitude));
        Ok(())
    }
}

/// One call made against a `RecordingPins` backend
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCall {
    Configure(Pin, PinMode),
    Digital(Pin, Level),
    Pwm(Pin, u16),
}

/// Backend that records every call in order, for asserting driver behaviour
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingPins {
    calls: Arc<Mutex<Vec<PinCall>>>,
}

#[cfg(test)]
impl RecordingPins {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: PinCall) -> Result<(), PinError> {
        self.calls
            .lock()
            .map_err(|_| PinError::Unavailable("recorder lock poisoned".to_string()))?
            .push(call);
        Ok(())
    }

    pub fn calls(&self) -> Vec<PinCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Last PWM magnitude written to `pin`, if any
    pub fn last_pwm(&self, pin: Pin) -> Option<u16> {
        self.calls().iter().rev().find_map(|call| match *call {
            PinCall::Pwm(p, value) if p == pin => Some(value),
            _ => None,
        })
    }

    /// Last digital level written to `pin`, if any
    pub fn last_level(&self, pin: Pin) -> Option<Level> {
        self.calls().iter().rev().find_map(|call| match *call {
            PinCall::Digital(p, level) if p == pin => Some(level),
            _ => None,
        })
    }
}

#[cfg(test)]
impl PinIo for RecordingPins {
    fn configure(&mut self, pin: Pin, mode: PinMode) -> Result<(), PinError> {
        self.push(PinCall::Configure(pin, mode))
    }

    fn write_digital(&mut self, pin: Pin, level: Level) -> Result<(), PinError> {
        self.push(PinCall::Digital(pin, level))
    }

    fn write_pwm(&mut self, pin: Pin, magnitude: u16) -> Result<(), PinError> {
        self.push(PinCall::Pwm(pin, magnitude))
    }
}
