// BTS7960 high-current half-bridge pair driver
//
// RPWM carries forward duty, LPWM reverse duty. R_EN/L_EN gate each half.
// R_IS/L_IS current alarm outputs are configured as inputs but not read.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::controller::{
    Channel, DualChannelDriver, DutyMode, DutyState, MotorController, MotorError,
};
use super::pins::{Level, Pin, PinIo, PinMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bts7960Pins {
    pub r_en: Pin,
    pub l_en: Pin,
    pub r_is: Pin,
    pub l_is: Pin,
    pub rpwm: Pin,
    pub lpwm: Pin,
}

pub struct BTS7960<P: PinIo> {
    io: P,
    pins: Bts7960Pins,
    state: DutyState,
}

impl<P: PinIo> BTS7960<P> {
    /// Configure the bridge's pins and bring it to the idle state
    pub fn new(mut io: P, pins: Bts7960Pins, mode: DutyMode) -> Result<Self, MotorError> {
        io.configure(pins.r_en, PinMode::Output)?;
        io.configure(pins.l_en, PinMode::Output)?;
        io.configure(pins.r_is, PinMode::Input)?;
        io.configure(pins.l_is, PinMode::Input)?;
        io.configure(pins.rpwm, PinMode::Pwm)?;
        io.configure(pins.lpwm, PinMode::Pwm)?;

        io.write_digital(pins.r_en, Level::Low)?;
        io.write_digital(pins.l_en, Level::Low)?;
        io.write_pwm(pins.rpwm, 0)?;
        io.write_pwm(pins.lpwm, 0)?;

        Ok(Self {
            io,
            pins,
            state: DutyState::new(mode),
        })
    }

    fn set_enables(&mut self, level: Level) -> Result<(), MotorError> {
        self.io.write_digital(self.pins.r_en, level)?;
        self.io.write_digital(self.pins.l_en, level)?;
        Ok(())
    }

    fn zero_both_lines(&mut self) -> Result<(), MotorError> {
        self.io.write_pwm(self.pins.rpwm, 0)?;
        self.io.write_pwm(self.pins.lpwm, 0)?;
        Ok(())
    }
}

impl<P: PinIo> MotorController for BTS7960<P> {
    fn enable(&mut self) -> Result<(), MotorError> {
        self.state.enable();
        self.zero_both_lines()?;
        self.set_enables(Level::High)
    }

    fn disable(&mut self) -> Result<(), MotorError> {
        self.state.disable();
        self.zero_both_lines()?;
        self.set_enables(Level::Low)
    }

    /// Both halves enabled with zero duty: the low sides short the motor
    fn brake(&mut self) -> Result<(), MotorError> {
        self.state.brake();
        self.zero_both_lines()?;
        self.set_enables(Level::High)
    }

    fn set_pwm(&mut self, value: i16) -> Result<(), MotorError> {
        if !self.state.set_pwm(value) {
            debug!(
                "BTS7960 on pins {}/{} disabled, ignoring duty {}",
                self.pins.rpwm, self.pins.lpwm, value
            );
            return Ok(());
        }

        let magnitude = self.state.duty_magnitude();
        // Idle line goes to zero first so both lines never carry duty together
        if self.state.duty() < 0 {
            self.io.write_pwm(self.pins.rpwm, 0)?;
            self.io.write_pwm(self.pins.lpwm, magnitude)?;
        } else {
            self.io.write_pwm(self.pins.lpwm, 0)?;
            self.io.write_pwm(self.pins.rpwm, magnitude)?;
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    fn duty(&self) -> i16 {
        self.state.duty()
    }
}

impl<P: PinIo> Drop for BTS7960<P> {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            warn!("Failed to disable BTS7960 on drop: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bts7960PairPins {
    pub left: Bts7960Pins,
    pub right: Bts7960Pins,
}

/// Two BTS7960 bridges driven as channel A (left) and channel B (right)
pub struct Bts7960Pair<P: PinIo> {
    pub left: BTS7960<P>,
    pub right: BTS7960<P>,
}

impl<P: PinIo> Bts7960Pair<P> {
    pub fn new(io: P, pins: Bts7960PairPins, mode: DutyMode) -> Result<Self, MotorError> {
        let left = BTS7960::new(io.clone(), pins.left, mode)?;
        let right = BTS7960::new(io, pins.right, mode)?;
        Ok(Self { left, right })
    }
}

impl<P: PinIo> MotorController for Bts7960Pair<P> {
    fn enable(&mut self) -> Result<(), MotorError> {
        self.left.enable()?;
        self.right.enable()
    }

    fn disable(&mut self) -> Result<(), MotorError> {
        self.left.disable()?;
        self.right.disable()
    }

    fn brake(&mut self) -> Result<(), MotorError> {
        self.left.brake()?;
        self.right.brake()
    }

    fn set_pwm(&mut self, value: i16) -> Result<(), MotorError> {
        self.left.set_pwm(value)?;
        self.right.set_pwm(value)
    }

    fn is_enabled(&self) -> bool {
        self.left.is_enabled() || self.right.is_enabled()
    }

    fn duty(&self) -> i16 {
        self.left.duty()
    }
}

impl<P: PinIo> DualChannelDriver for Bts7960Pair<P> {
    fn channel_mut(&mut self, channel: Channel) -> &mut dyn MotorController {
        match channel {
            Channel::A => &mut self.left,
            Channel::B => &mut self.right,
        }
    }

    fn channel(&self, channel: Channel) -> &dyn MotorController {
        match channel {
            Channel::A => &self.left,
            Channel::B => &self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::pins::{PinCall, RecordingPins, SimPins};

    const PINS: Bts7960Pins = Bts7960Pins {
        r_en: 10,
        l_en: 11,
        r_is: 12,
        l_is: 13,
        rpwm: 14,
        lpwm: 15,
    };

    fn enabled_bridge() -> (RecordingPins, BTS7960<RecordingPins>) {
        let io = RecordingPins::new();
        let mut bridge = BTS7960::new(io.clone(), PINS, DutyMode::Mask).unwrap();
        bridge.enable().unwrap();
        io.clear();
        (io, bridge)
    }

    #[test]
    fn test_sense_pins_are_inputs() {
        let io = RecordingPins::new();
        let _bridge = BTS7960::new(io.clone(), PINS, DutyMode::Mask).unwrap();
        let calls = io.calls();
        assert!(calls.contains(&PinCall::Configure(12, PinMode::Input)));
        assert!(calls.contains(&PinCall::Configure(13, PinMode::Input)));
        assert!(calls.contains(&PinCall::Configure(14, PinMode::Pwm)));
        // Sense pins are never written
        assert!(!calls.iter().any(|c| matches!(
            c,
            PinCall::Digital(12 | 13, _) | PinCall::Pwm(12 | 13, _)
        )));
    }

    #[test]
    fn test_enable_and_disable_gate_both_halves() {
        let (io, mut bridge) = enabled_bridge();
        bridge.disable().unwrap();
        assert!(!bridge.is_enabled());
        assert_eq!(io.last_level(10), Some(Level::Low));
        assert_eq!(io.last_level(11), Some(Level::Low));

        bridge.enable().unwrap();
        assert!(bridge.is_enabled());
        assert_eq!(bridge.duty(), 0);
        assert_eq!(io.last_level(10), Some(Level::High));
        assert_eq!(io.last_level(11), Some(Level::High));
    }

    #[test]
    fn test_negative_duty_goes_to_reverse_line() {
        let (io, mut bridge) = enabled_bridge();
        bridge.set_pwm(-300).unwrap();
        assert_eq!(bridge.duty(), -300);
        assert_eq!(io.calls(), vec![PinCall::Pwm(14, 0), PinCall::Pwm(15, 300)]);
    }

    #[test]
    fn test_positive_duty_goes_to_forward_line() {
        let (io, mut bridge) = enabled_bridge();
        bridge.set_pwm(-300).unwrap();
        bridge.set_pwm(1023).unwrap();
        assert_eq!(io.last_pwm(14), Some(1023));
        assert_eq!(io.last_pwm(15), Some(0));

        bridge.set_pwm(0).unwrap();
        assert_eq!(io.last_pwm(14), Some(0));
        assert_eq!(io.last_pwm(15), Some(0));
    }

    #[test]
    fn test_brake_engages_enables_with_zero_duty() {
        let (io, mut bridge) = enabled_bridge();
        bridge.set_pwm(800).unwrap();
        bridge.brake().unwrap();
        assert!(bridge.is_enabled());
        assert_eq!(bridge.duty(), 0);
        assert_eq!(io.last_pwm(14), Some(0));
        assert_eq!(io.last_pwm(15), Some(0));
        assert_eq!(io.last_level(10), Some(Level::High));
        assert_eq!(io.last_level(11), Some(Level::High));
    }

    #[test]
    fn test_disabled_bridge_ignores_duty() {
        let io = RecordingPins::new();
        let mut bridge = BTS7960::new(io.clone(), PINS, DutyMode::Mask).unwrap();
        io.clear();
        bridge.set_pwm(-50).unwrap();
        assert_eq!(bridge.duty(), 0);
        assert!(io.calls().is_empty());
    }

    #[test]
    fn test_pair_addresses_each_bridge() {
        let right = Bts7960Pins {
            r_en: 20,
            l_en: 21,
            r_is: 22,
            l_is: 23,
            rpwm: 24,
            lpwm: 25,
        };
        let io = SimPins::new();
        let pins = Bts7960PairPins { left: PINS, right };
        let mut pair = Bts7960Pair::new(io.clone(), pins, DutyMode::Mask).unwrap();

        pair.enable().unwrap();
        pair.channel_mut(Channel::A).set_pwm(-200).unwrap();
        pair.channel_mut(Channel::B).set_pwm(600).unwrap();
        assert_eq!(pair.left.duty(), -200);
        assert_eq!(pair.right.duty(), 600);
        assert_eq!(io.duty(15), Some(200));
        assert_eq!(io.duty(24), Some(600));
        assert_eq!(io.duty(25), Some(0));

        pair.brake().unwrap();
        assert_eq!(pair.channel(Channel::A).duty(), 0);
        assert_eq!(pair.channel(Channel::B).duty(), 0);
        assert!(pair.is_enabled());
    }
}
