use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use rover_motor_runtime::config::{DriverKind, RuntimeConfig};
use rover_motor_runtime::messages::TrailingPolicy;
use rover_motor_runtime::motor::DutyMode;

/// Drive DC motors from 3-byte UDP command frames
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// JSON config file (pin maps, transport, policies)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind the command socket to
    #[arg(long)]
    bind: Option<IpAddr>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long, value_enum)]
    driver: Option<DriverKind>,

    /// Handling of duty magnitudes above 1023
    #[arg(long, value_enum)]
    duty_mode: Option<DutyMode>,

    /// Handling of datagrams whose length is not a multiple of 3
    #[arg(long, value_enum)]
    trailing: Option<TrailingPolicy>,

    /// Brake when no command arrives for this long (0 = off)
    #[arg(long)]
    watchdog_ms: Option<u64>,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides on top
    fn into_config(self) -> Result<RuntimeConfig, Box<dyn std::error::Error + Send + Sync>> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading config from {}", path.display());
                RuntimeConfig::load(path)?
            }
            None => RuntimeConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(driver) = self.driver {
            config.driver = driver;
        }
        if let Some(duty_mode) = self.duty_mode {
            config.duty_mode = duty_mode;
        }
        if let Some(trailing) = self.trailing {
            config.trailing = trailing;
        }
        if let Some(watchdog_ms) = self.watchdog_ms {
            config.watchdog_ms = watchdog_ms;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug for per-frame output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rover_motor_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "rover-motor-runtime",
            "--port",
            "9001",
            "--driver",
            "bts7960",
            "--trailing",
            "reject",
            "--watchdog-ms",
            "300",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.port, 9001);
        assert_eq!(config.driver, DriverKind::Bts7960);
        assert_eq!(config.trailing, TrailingPolicy::Reject);
        assert_eq!(config.watchdog_ms, 300);
        assert_eq!(config.duty_mode, DutyMode::Mask);
    }

    #[test]
    fn test_rejects_unknown_driver() {
        assert!(Cli::try_parse_from(["rover-motor-runtime", "--driver", "drv8833"]).is_err());
    }
}
