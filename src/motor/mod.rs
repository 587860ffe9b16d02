// Motor control module for the rover drive
//
// Provides:
// - Pin I/O capability the drivers are written against
// - Duty/enable state machine shared by all driver chips
// - L298N (dual H-bridge) and BTS7960 (half-bridge pair) drivers

mod bts7960;
mod controller;
mod l298n;
pub mod pins;

pub use bts7960::{BTS7960, Bts7960Pair, Bts7960PairPins, Bts7960Pins};
pub use controller::{
    Channel, DUTY_MAX, DualChannelDriver, DutyMode, DutyState, MotorController, MotorError,
};
pub use l298n::{L298N, L298NChannel, L298NChannelPins, L298NPins};
pub use pins::{Level, Pin, PinError, PinIo, PinMode, SimPins};
