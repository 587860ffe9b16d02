// Transport defaults, pin maps, runtime configuration
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::messages::TrailingPolicy;
use crate::motor::{Bts7960PairPins, Bts7960Pins, DutyMode, L298NPins};

// UDP command port
pub const PORT: u16 = 8080;

// Receive buffer size (a datagram carries at most 85 frames)
pub const BUF_SIZE: usize = 256;

// Command watchdog, 0 = off
pub const WATCHDOG_MS: u64 = 0;

// Change these to the pins actually wired on the board
pub const L298N_PINS: L298NPins = L298NPins {
    in1: 1,
    in2: 2,
    in3: 3,
    in4: 4,
    ena: 5,
    enb: 6,
    pwma: 7,
    pwmb: 8,
};

pub const BTS7960_PINS: Bts7960PairPins = Bts7960PairPins {
    left: Bts7960Pins {
        r_en: 9,
        l_en: 10,
        r_is: 11,
        l_is: 12,
        rpwm: 13,
        lpwm: 14,
    },
    right: Bts7960Pins {
        r_en: 15,
        l_en: 16,
        r_is: 17,
        l_is: 18,
        rpwm: 19,
        lpwm: 20,
    },
};

/// Which driver chip is wired to the drive motors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    #[default]
    #[value(name = "l298n")]
    L298n,
    #[value(name = "bts7960")]
    Bts7960,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub driver: DriverKind,
    pub duty_mode: DutyMode,
    pub trailing: TrailingPolicy,
    pub watchdog_ms: u64,
    pub l298n: L298NPins,
    pub bts7960: Bts7960PairPins,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: PORT,
            driver: DriverKind::default(),
            duty_mode: DutyMode::default(),
            trailing: TrailingPolicy::default(),
            watchdog_ms: WATCHDOG_MS,
            l298n: L298N_PINS,
            bts7960: BTS7960_PINS,
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn watchdog(&self) -> Option<Duration> {
        (self.watchdog_ms > 0).then(|| Duration::from_millis(self.watchdog_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.driver, DriverKind::L298n);
        assert_eq!(config.duty_mode, DutyMode::Mask);
        assert_eq!(config.trailing, TrailingPolicy::Truncate);
        assert_eq!(config.watchdog(), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(
            r#"{ "port": 9000, "driver": "bts7960", "duty_mode": "saturate", "watchdog_ms": 250 }"#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.driver, DriverKind::Bts7960);
        assert_eq!(config.duty_mode, DutyMode::Saturate);
        assert_eq!(config.watchdog(), Some(Duration::from_millis(250)));
        assert_eq!(config.l298n, L298N_PINS);
        assert_eq!(config.trailing, TrailingPolicy::Truncate);
    }

    #[test]
    fn test_pin_map_from_json() {
        let config = RuntimeConfig::from_json(
            r#"{ "l298n": {
                "in1": 21, "in2": 22, "in3": 23, "in4": 24,
                "ena": 25, "enb": 26, "pwma": 1, "pwmb": 27
            } }"#,
        )
        .unwrap();
        assert_eq!(config.l298n.in1, 21);
        assert_eq!(config.l298n.channel_b().pwm, 27);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            RuntimeConfig::from_json(r#"{ "prot": 1 }"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
