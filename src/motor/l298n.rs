// L298N dual H-bridge driver
//
// Per channel:
//   forward | backward | function
//   H       | L        | forward
//   L       | H        | reverse
//   H       | H        | short brake
//   L       | L        | coast
// Enable low lets the motor run free; speed comes from the PWM pin.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::controller::{
    Channel, DualChannelDriver, DutyMode, DutyState, MotorController, MotorError,
};
use super::pins::{Level, Pin, PinIo, PinMode};

/// Pins of one L298N channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct L298NChannelPins {
    pub forward: Pin,
    pub backward: Pin,
    pub enable: Pin,
    pub pwm: Pin,
}

/// Pin map of a whole L298N module (IN1..IN4, ENA/ENB, PWMA/PWMB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct L298NPins {
    pub in1: Pin,
    pub in2: Pin,
    pub in3: Pin,
    pub in4: Pin,
    pub ena: Pin,
    pub enb: Pin,
    pub pwma: Pin,
    pub pwmb: Pin,
}

impl L298NPins {
    pub fn channel_a(&self) -> L298NChannelPins {
        L298NChannelPins {
            forward: self.in1,
            backward: self.in2,
            enable: self.ena,
            pwm: self.pwma,
        }
    }

    pub fn channel_b(&self) -> L298NChannelPins {
        L298NChannelPins {
            forward: self.in3,
            backward: self.in4,
            enable: self.enb,
            pwm: self.pwmb,
        }
    }
}

/// One motor channel of an L298N
pub struct L298NChannel<P: PinIo> {
    io: P,
    pins: L298NChannelPins,
    state: DutyState,
}

impl<P: PinIo> L298NChannel<P> {
    /// Configure the channel's pins and bring it to the idle state
    pub fn new(mut io: P, pins: L298NChannelPins, mode: DutyMode) -> Result<Self, MotorError> {
        io.configure(pins.pwm, PinMode::Pwm)?;
        io.configure(pins.enable, PinMode::Output)?;
        io.configure(pins.forward, PinMode::Output)?;
        io.configure(pins.backward, PinMode::Output)?;

        io.write_pwm(pins.pwm, 0)?;
        io.write_digital(pins.enable, Level::Low)?;
        io.write_digital(pins.forward, Level::Low)?;
        io.write_digital(pins.backward, Level::Low)?;

        Ok(Self {
            io,
            pins,
            state: DutyState::new(mode),
        })
    }

    fn set_direction(&mut self, forward: Level, backward: Level) -> Result<(), MotorError> {
        self.io.write_digital(self.pins.forward, forward)?;
        self.io.write_digital(self.pins.backward, backward)?;
        Ok(())
    }
}

impl<P: PinIo> MotorController for L298NChannel<P> {
    fn enable(&mut self) -> Result<(), MotorError> {
        self.state.enable();
        self.set_direction(Level::Low, Level::Low)?;
        self.io.write_pwm(self.pins.pwm, 0)?;
        self.io.write_digital(self.pins.enable, Level::High)?;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), MotorError> {
        self.state.disable();
        self.io.write_pwm(self.pins.pwm, 0)?;
        self.set_direction(Level::Low, Level::Low)?;
        self.io.write_digital(self.pins.enable, Level::Low)?;
        Ok(())
    }

    fn brake(&mut self) -> Result<(), MotorError> {
        self.state.brake();
        self.set_direction(Level::High, Level::High)?;
        self.io.write_pwm(self.pins.pwm, 0)?;
        Ok(())
    }

    fn set_pwm(&mut self, value: i16) -> Result<(), MotorError> {
        if !self.state.set_pwm(value) {
            debug!("L298N channel on pin {} disabled, ignoring duty {}", self.pins.pwm, value);
            return Ok(());
        }

        // Direction follows the commanded sign, even if masking zeroed the magnitude
        if value < 0 {
            self.set_direction(Level::Low, Level::High)?;
        } else {
            self.set_direction(Level::High, Level::Low)?;
        }
        self.io.write_pwm(self.pins.pwm, self.state.duty_magnitude())?;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    fn duty(&self) -> i16 {
        self.state.duty()
    }
}

impl<P: PinIo> Drop for L298NChannel<P> {
    fn drop(&mut self) {
        // Leave the bridge with enable low so the motor cannot be driven
        if let Err(e) = self.disable() {
            warn!("Failed to disable L298N channel on drop: {}", e);
        }
    }
}

/// Both channels of an L298N module.
///
/// Composite operations hit channel A then channel B; there is no other
/// coupling between them.
pub struct L298N<P: PinIo> {
    pub motor_a: L298NChannel<P>,
    pub motor_b: L298NChannel<P>,
}

impl<P: PinIo> L298N<P> {
    pub fn new(io: P, pins: L298NPins, mode: DutyMode) -> Result<Self, MotorError> {
        let motor_a = L298NChannel::new(io.clone(), pins.channel_a(), mode)?;
        let motor_b = L298NChannel::new(io, pins.channel_b(), mode)?;
        Ok(Self { motor_a, motor_b })
    }
}

impl<P: PinIo> MotorController for L298N<P> {
    fn enable(&mut self) -> Result<(), MotorError> {
        self.motor_a.enable()?;
        self.motor_b.enable()
    }

    fn disable(&mut self) -> Result<(), MotorError> {
        self.motor_a.disable()?;
        self.motor_b.disable()
    }

    fn brake(&mut self) -> Result<(), MotorError> {
        self.motor_a.brake()?;
        self.motor_b.brake()
    }

    fn set_pwm(&mut self, value: i16) -> Result<(), MotorError> {
        self.motor_a.set_pwm(value)?;
        self.motor_b.set_pwm(value)
    }

    /// True while any channel is live
    fn is_enabled(&self) -> bool {
        self.motor_a.is_enabled() || self.motor_b.is_enabled()
    }

    /// Duty of channel A; address the channels for per-channel values
    fn duty(&self) -> i16 {
        self.motor_a.duty()
    }
}

impl<P: PinIo> DualChannelDriver for L298N<P> {
    fn channel_mut(&mut self, channel: Channel) -> &mut dyn MotorController {
        match channel {
            Channel::A => &mut self.motor_a,
            Channel::B => &mut self.motor_b,
        }
    }

    fn channel(&self, channel: Channel) -> &dyn MotorController {
        match channel {
            Channel::A => &self.motor_a,
            Channel::B => &self.motor_b,
        }
    }
}
