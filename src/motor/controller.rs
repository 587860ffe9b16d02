// Motor controller state machine shared by every driver chip
//
// States: Disabled (initial) <-> Enabled, plus a brake action valid in either.
// Duty is signed: sign = direction, magnitude = 0..=1023.

use serde::{Deserialize, Serialize};

use super::pins::PinError;

/// Largest duty magnitude a controller will hold
pub const DUTY_MAX: i16 = 1023;

/// Low 10 bits of the magnitude
const DUTY_MASK: u16 = 0b0000_0011_1111_1111;

#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Pin write failed: {0}")]
    Pin(#[from] PinError),
}

/// How `set_pwm` treats magnitudes above `DUTY_MAX`
///
/// Both modes reproduce any value in [-1023, 1023] exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DutyMode {
    /// Keep the low 10 bits of the magnitude and re-apply the sign (wraps).
    /// Compatible with existing remote clients.
    #[default]
    Mask,
    /// Clamp to [-1023, 1023]
    Saturate,
}

impl DutyMode {
    pub fn apply(self, value: i16) -> i16 {
        match self {
            DutyMode::Mask => {
                let magnitude = (value.unsigned_abs() & DUTY_MASK) as i16;
                if value < 0 { -magnitude } else { magnitude }
            }
            DutyMode::Saturate => value.clamp(-DUTY_MAX, DUTY_MAX),
        }
    }
}

/// Enabled flag and signed duty, without any pins attached.
///
/// Every driver embeds one of these and performs its transition first,
/// then mirrors the result onto its pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DutyState {
    enabled: bool,
    duty: i16,
    mode: DutyMode,
}

impl DutyState {
    pub fn new(mode: DutyMode) -> Self {
        Self {
            enabled: false,
            duty: 0,
            mode,
        }
    }

    /// Enable with no residual command
    pub fn enable(&mut self) {
        self.enabled = true;
        self.duty = 0;
    }

    pub fn disable(&mut self) {
        self.duty = 0;
        self.enabled = false;
    }

    /// Returns false (and changes nothing) when disabled
    pub fn set_pwm(&mut self, value: i16) -> bool {
        if !self.enabled {
            return false;
        }
        self.duty = self.mode.apply(value);
        true
    }

    pub fn brake(&mut self) {
        self.duty = 0;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn duty(&self) -> i16 {
        self.duty
    }

    /// Unsigned magnitude as written to a PWM line
    pub fn duty_magnitude(&self) -> u16 {
        self.duty.unsigned_abs()
    }

    pub fn mode(&self) -> DutyMode {
        self.mode
    }
}

/// Operations every motor driver supports
pub trait MotorController {
    fn enable(&mut self) -> Result<(), MotorError>;
    fn disable(&mut self) -> Result<(), MotorError>;
    fn brake(&mut self) -> Result<(), MotorError>;
    fn set_pwm(&mut self, value: i16) -> Result<(), MotorError>;

    fn is_enabled(&self) -> bool;
    fn duty(&self) -> i16;
}

/// Addressable channel of a dual-channel driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

/// A driver with two independently addressable channels.
///
/// The composite `MotorController` operations apply to both channels;
/// `channel_mut` gives per-channel control.
pub trait DualChannelDriver: MotorController {
    fn channel_mut(&mut self, channel: Channel) -> &mut dyn MotorController;
    fn channel(&self, channel: Channel) -> &dyn MotorController;
}
