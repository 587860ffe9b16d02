// UDP receive-and-dispatch loop with optional watchdog
// Note: everything runs in one task. A datagram is fully decoded and applied
// before the next receive, so the driver needs no locking.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

// local imports
use crate::config::{BUF_SIZE, DriverKind, RuntimeConfig};
use crate::messages::{Command, RuntimeHealth, TrailingPolicy, decode_frames};
use crate::motor::{Bts7960Pair, Channel, DualChannelDriver, L298N, MotorError, PinIo, SimPins};

pub type BoxedDriver = Box<dyn DualChannelDriver + Send>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Binding failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Unable to read from socket: {0}")]
    Receive(#[source] std::io::Error),

    #[error(transparent)]
    Motor(#[from] MotorError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub datagrams: u64,
    pub frames_applied: u64,
    pub frames_ignored: u64,
    pub datagrams_rejected: u64,
    pub datagrams_truncated: u64,
}

/// Apply one command to the driver. Returns false for unknown headers.
pub fn dispatch(driver: &mut dyn DualChannelDriver, command: Command) -> Result<bool, MotorError> {
    match command {
        Command::SetA(duty) => driver.channel_mut(Channel::A).set_pwm(duty)?,
        Command::SetB(duty) => driver.channel_mut(Channel::B).set_pwm(duty)?,
        Command::PowerOn => driver.enable()?,
        Command::PowerOff => driver.disable()?,
        Command::EStop => driver.brake()?,
        Command::Unknown(header) => {
            debug!("Ignoring frame with unknown header {}", header);
            return Ok(false);
        }
    }
    Ok(true)
}

/// Build the configured driver on top of a pin backend
pub fn build_driver<P>(config: &RuntimeConfig, io: P) -> Result<BoxedDriver, MotorError>
where
    P: PinIo + Send + 'static,
{
    let driver: BoxedDriver = match config.driver {
        DriverKind::L298n => {
            info!("Driver: L298N {:?}", config.l298n);
            Box::new(L298N::new(io, config.l298n, config.duty_mode)?)
        }
        DriverKind::Bts7960 => {
            info!("Driver: BTS7960 pair {:?}", config.bts7960);
            Box::new(Bts7960Pair::new(io, config.bts7960, config.duty_mode)?)
        }
    };
    Ok(driver)
}

pub struct Runtime {
    driver: BoxedDriver,
    trailing: TrailingPolicy,
    watchdog: Option<Duration>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    stats: RuntimeStats,
}

impl Runtime {
    pub fn new(driver: BoxedDriver, trailing: TrailingPolicy, watchdog: Option<Duration>) -> Self {
        Self {
            driver,
            trailing,
            watchdog,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            stats: RuntimeStats::default(),
        }
    }

    pub fn driver(&self) -> &dyn DualChannelDriver {
        self.driver.as_ref()
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Decode and apply one datagram. Returns the number of frames applied.
    ///
    /// Malformed datagrams are logged and dropped; only pin failures are errors.
    pub fn on_datagram(&mut self, buf: &[u8]) -> Result<usize, MotorError> {
        self.stats.datagrams += 1;
        let commands = match decode_frames(buf, self.trailing) {
            Ok(commands) => commands,
            Err(e) => {
                warn!("Dropping datagram: {}", e);
                self.stats.datagrams_rejected += 1;
                return Ok(0);
            }
        };

        let applied = self.apply(&commands)?;
        // Only datagrams that actually drove the motors feed the watchdog
        if applied > 0 {
            self.cmd_received_at = Instant::now();
            if self.health != RuntimeHealth::Ok {
                info!("Commands flowing");
            }
            self.health = RuntimeHealth::Ok;
        }
        Ok(applied)
    }

    /// Record a datagram that filled the whole receive buffer
    pub fn note_truncated(&mut self, len: usize) {
        warn!("Datagram filled the {}-byte receive buffer, excess bytes were lost", len);
        self.stats.datagrams_truncated += 1;
    }

    /// Apply commands strictly in order
    pub fn apply(&mut self, commands: &[Command]) -> Result<usize, MotorError> {
        let mut applied = 0;
        for &command in commands {
            debug!("Frame {:?}", command);
            if dispatch(self.driver.as_mut(), command)? {
                applied += 1;
            } else {
                self.stats.frames_ignored += 1;
            }
        }
        self.stats.frames_applied += applied as u64;
        Ok(applied)
    }

    /// Time left before the watchdog fires, if it is armed
    pub fn watchdog_remaining(&self) -> Option<Duration> {
        let timeout = self.watchdog?;
        if self.health != RuntimeHealth::Ok {
            return None;
        }
        Some(timeout.saturating_sub(self.cmd_received_at.elapsed()))
    }

    /// Brake once if commands went stale. Returns true when it fired.
    pub fn check_watchdog(&mut self) -> Result<bool, MotorError> {
        let Some(timeout) = self.watchdog else {
            return Ok(false);
        };
        let cmd_age = self.cmd_received_at.elapsed();
        if self.health != RuntimeHealth::Ok || cmd_age <= timeout {
            return Ok(false);
        }

        warn!("Command stale ({:?} old), braking", cmd_age);
        self.health = RuntimeHealth::CmdStale;
        self.driver.brake()?;
        Ok(true)
    }

    /// Disable the driver and report counters
    pub fn shutdown(&mut self) -> Result<(), MotorError> {
        info!("Shutting down: {:?}", self.stats);
        self.driver.disable()
    }
}

/// Receive and dispatch until `shutdown` resolves or the socket fails
pub async fn serve<F>(
    socket: &UdpSocket,
    runtime: &mut Runtime,
    shutdown: F,
) -> Result<(), RuntimeError>
where
    F: Future<Output = ()>,
{
    let mut buf = [0u8; BUF_SIZE];
    tokio::pin!(shutdown);

    loop {
        let remaining = runtime.watchdog_remaining();
        tokio::select! {
            biased;

            _ = &mut shutdown => return Ok(()),

            received = socket.recv_from(&mut buf) => {
                let (len, peer) = received.map_err(RuntimeError::Receive)?;
                debug!("{} byte(s) from {}", len, peer);
                if len == buf.len() {
                    runtime.note_truncated(len);
                }
                runtime.on_datagram(&buf[..len])?;
            }

            _ = tokio::time::sleep(remaining.unwrap_or_default()), if remaining.is_some() => {
                runtime.check_watchdog()?;
            }
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

pub async fn run(config: RuntimeConfig) -> Result<(), RuntimeError> {
    let driver = build_driver(&config, SimPins::new())?;
    let mut runtime = Runtime::new(driver, config.trailing, config.watchdog());

    let socket = UdpSocket::bind((config.bind_addr, config.port))
        .await
        .map_err(RuntimeError::Bind)?;

    info!(
        "Runtime listening on {}:{} (duty {:?}, trailing bytes {:?})",
        config.bind_addr, config.port, config.duty_mode, config.trailing
    );
    match config.watchdog() {
        Some(timeout) => info!("Watchdog: {}ms", timeout.as_millis()),
        None => info!("Watchdog: off"),
    }

    let result = serve(&socket, &mut runtime, ctrl_c()).await;
    runtime.shutdown()?;
    result
}
