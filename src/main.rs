//! # Ground Link
//!
//! Ground-station endpoint for a point-to-point radio telemetry link.
//!
//! Opens the radio module's serial port, pushes the configured link settings
//! and reports the telemetry received from the remote device. Arming commands
//! are read from stdin, one per line.

use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use ground_link::clock::{Clock, MonotonicClock};
use ground_link::config::{Config, LoggingConfig};
use ground_link::link::{ArmingSession, ArmingState, LinkConfig, LinkSession, LinkTiming};
use ground_link::serial::port_trait::BufferedTransport;
use ground_link::serial::LinkSerial;
use ground_link::telemetry::{ReadCursor, Record, TelemetryStore};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of the rotated log files
const LOG_FILE_NAME: &str = "ground-link.log";

/// Interval between link status log messages
const STATUS_INTERVAL_MS: u64 = 5000;

/// Pending operator commands
const COMMAND_QUEUE_SIZE: usize = 16;

/// Event fired by `trigger` without an argument
const DEFAULT_TRIGGER_EVENT: u8 = 1;

/// Operator command read from stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Arm,
    Trigger(u8),
    Exit,
    Status,
}

/// One radio module: its session, serial port and frame buffers
struct LinkPort {
    session: LinkSession,
    serial: LinkSerial,
    transport: BufferedTransport,
}

impl LinkPort {
    fn open(port: &str, baud_rate: u32, config: LinkConfig, timing: LinkTiming) -> Result<Self> {
        let serial = LinkSerial::open_with_paths(&[port], baud_rate)
            .with_context(|| format!("failed to open radio module on {}", port))?;
        let mut session = LinkSession::new(serial.device_path().to_string(), config, timing);
        session.request_configuration();

        Ok(Self {
            session,
            serial,
            transport: BufferedTransport::new(),
        })
    }

    /// Tick the session and write whatever it queued
    async fn service(&mut self, now_ms: u64) {
        // The buffered transport never rejects a frame
        if let Err(e) = self.session.tick(now_ms, &mut self.transport) {
            warn!("[{}] Link tick failed: {}", self.session.name(), e);
        }

        if let Err(e) = self.serial.flush_outbound(&mut self.transport).await {
            warn!("[{}] Failed to send frame: {}", self.session.name(), e);
        }
    }

    async fn receive(&mut self) -> Result<()> {
        let n = self
            .serial
            .read_into(&mut self.transport)
            .await
            .with_context(|| format!("serial read failed on {}", self.serial.device_path()))?;
        if n == 0 {
            anyhow::bail!("serial port {} closed", self.serial.device_path());
        }
        Ok(())
    }
}

/// Receive on the secondary port; never completes without one
async fn receive_optional(port: Option<&mut LinkPort>) -> Result<()> {
    match port {
        Some(port) => port.receive().await,
        None => std::future::pending().await,
    }
}

/// Main entry point for Ground Link
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (path from the first argument)
///    - Set up logging to the console and optionally to rotated files
///    - Open the radio module's serial port
///    - Mark the link configuration for pushing
///
/// 2. **Main Loop**
///    - Tick the arming session and both links at `tick_rate_hz`
///    - Move received bytes into each session's input buffer
///    - Run operator commands from stdin
///    - Publish telemetry snapshots to the reporter task
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - The configuration file is invalid
/// - Serial port cannot be opened or fails while reading
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let from_file = Path::new(&config_path).exists();
    let config = if from_file {
        Config::load(&config_path)
            .with_context(|| format!("failed to load configuration from {}", config_path))?
    } else {
        Config::default()
    };

    let _log_guard = init_logging(&config.logging);

    info!("Ground Link v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        info!("Loaded configuration from {}", config_path);
    } else {
        warn!("{} not found, using default configuration", config_path);
    }

    let mut primary = LinkPort::open(
        &config.serial.port,
        config.serial.baud_rate,
        config.link_config()?,
        config.link_timing(),
    )?;

    let mut secondary = match config.secondary_link_config()? {
        Some(link) => {
            let port = LinkPort::open(&config.secondary.port, config.secondary.baud_rate, link, config.link_timing())?;
            info!("Secondary link on {}", port.serial.device_path());
            Some(port)
        }
        None => None,
    };

    let mut arming = ArmingSession::new(config.arming_timing());

    let (telemetry_tx, telemetry_rx) = watch::channel(TelemetryStore::new());
    let reporter = tokio::spawn(report_telemetry(telemetry_rx, config.logging.report_interval_ms));

    let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
    // Blocking stdin reads run on their own thread
    std::thread::spawn(move || read_commands(command_tx));

    let clock = MonotonicClock::new();
    let mut published = 0;
    let mut last_status = 0;

    let mut ticker = interval(Duration::from_millis(config.tick_period_ms()));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Starting link loop at {}Hz", config.timing.tick_rate_hz);
    info!("Commands: arm, trigger [event], exit, status");
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = clock.now_ms();

                let previous = arming.state();
                let state = arming.update(now, &mut primary.session);
                if state != previous {
                    info!("Arming {:?} -> {:?}", previous, state);
                    if state == ArmingState::Failed {
                        warn!("Arming failed: {:?}, send 'exit' to reset", arming.failure());
                    }
                }

                primary.service(now).await;
                if let Some(secondary) = secondary.as_mut() {
                    secondary.service(now).await;
                }

                let session = &primary.session;
                let generation = session.telemetry().generation();
                if generation != published {
                    published = generation;
                    telemetry_tx.send_replace(session.telemetry().clone());
                }

                if now - last_status >= STATUS_INTERVAL_MS {
                    last_status = now;
                    debug!(
                        "Link {:?}, {} frames sent, decoder {:?}",
                        session.state(),
                        session.frames_sent(),
                        session.decoder_stats()
                    );
                }
            }

            result = primary.receive() => result?,

            result = receive_optional(secondary.as_mut()) => result?,

            Some(command) = command_rx.recv() => {
                let now = clock.now_ms();
                let secondary_session = secondary.as_mut().map(|port| &mut port.session);
                if let Err(e) = handle_command(command, now, &mut arming, &mut primary.session, secondary_session) {
                    warn!("{:?} rejected: {}", command, e);
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    // Leave the remote disarmed and the secondary link enabled
    let now = clock.now_ms();
    arming.exit(now, &mut primary.session, secondary.as_mut().map(|port| &mut port.session));
    primary.service(now).await;
    if let Some(secondary) = secondary.as_mut() {
        secondary.service(now).await;
    }

    let session = &primary.session;
    let stats = session.decoder_stats();
    info!(
        "Frames sent: {}, decoded: {}, dropped: {} checksum / {} length",
        session.frames_sent(),
        stats.frames_decoded,
        stats.checksum_errors,
        stats.length_errors
    );

    drop(telemetry_tx);
    let _ = reporter.await;

    Ok(())
}

/// Forward operator commands from stdin until it closes
fn read_commands(tx: mpsc::Sender<Command>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read command: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(command) => {
                if tx.blocking_send(command).is_err() {
                    break;
                }
            }
            None => warn!("Unknown command: {}", line.trim()),
        }
    }

    debug!("Command reader stopped");
}

/// Parse one command line, e.g. `arm` or `trigger 2`
fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()?.to_lowercase().as_str() {
        "arm" => Command::Arm,
        "trigger" => match words.next() {
            Some(event) => Command::Trigger(event.parse().ok()?),
            None => Command::Trigger(DEFAULT_TRIGGER_EVENT),
        },
        "exit" => Command::Exit,
        "status" => Command::Status,
        _ => return None,
    };

    if words.next().is_some() {
        return None;
    }
    Some(command)
}

/// Apply an operator command to the arming session
///
/// `arm` checks the link and, if the remote is reachable, requests testing
/// mode and suppresses the secondary link.
fn handle_command(
    command: Command,
    now_ms: u64,
    arming: &mut ArmingSession,
    primary: &mut LinkSession,
    secondary: Option<&mut LinkSession>,
) -> ground_link::error::Result<()> {
    match command {
        Command::Arm => match arming.begin(now_ms, primary)? {
            ArmingState::ReadyToArm => arming.start(now_ms, primary, secondary)?,
            state => warn!("[{}] Cannot arm: {:?}", primary.name(), state),
        },
        Command::Trigger(event) => {
            arming.trigger(event, now_ms, primary)?;
            info!("[{}] Trigger {} sent", primary.name(), event);
        }
        Command::Exit => arming.exit(now_ms, primary, secondary),
        Command::Status => info!(
            "Arming {:?} ({} confirmations), link {:?}",
            arming.state(),
            arming.consecutive_confirmations(),
            primary.state()
        ),
    }
    Ok(())
}

/// Set up console logging, plus daily rotated files if a directory is configured
///
/// `RUST_LOG` overrides the configured level. The returned guard must be kept
/// alive for file output to be flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));
    let console = fmt::layer();

    if config.directory.is_empty() {
        tracing_subscriber::registry().with(filter).with(console).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Some(guard)
}

/// One telemetry record as logged by the reporter
#[derive(Debug, Serialize)]
struct ReportLine<'a, T: Serialize> {
    record: &'static str,
    sequence: u64,
    last_update_ms: Option<u64>,
    received_at: &'a str,
    value: &'a T,
}

/// Reporter position in each record
#[derive(Debug, Default)]
struct ReportCursors {
    data: ReadCursor,
    info: ReadCursor,
    location: ReadCursor,
    time: ReadCursor,
}

/// Log every record that changed since the previous report
async fn report_telemetry(mut rx: watch::Receiver<TelemetryStore>, interval_ms: u64) {
    let mut cursors = ReportCursors::default();
    let mut ticker = interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match rx.has_changed() {
            Ok(true) => {}
            Ok(false) => continue,
            // Sender dropped: the link loop has stopped
            Err(_) => break,
        }

        let store = rx.borrow_and_update().clone();
        let received_at = chrono::Utc::now().to_rfc3339();
        for line in report_lines(&mut cursors, &store, &received_at) {
            info!(target: "telemetry", "{}", line);
        }
    }

    debug!("Telemetry reporter stopped");
}

/// JSON lines for the records that are new to `cursors`
fn report_lines(cursors: &mut ReportCursors, store: &TelemetryStore, received_at: &str) -> Vec<String> {
    let mut lines = Vec::new();
    push_line(&mut lines, &mut cursors.data, "data", &store.data, received_at);
    push_line(&mut lines, &mut cursors.info, "info", &store.info, received_at);
    push_line(&mut lines, &mut cursors.location, "location", &store.location, received_at);
    push_line(&mut lines, &mut cursors.time, "time", &store.time, received_at);
    lines
}

fn push_line<T: Serialize>(
    lines: &mut Vec<String>,
    cursor: &mut ReadCursor,
    name: &'static str,
    record: &Record<T>,
    received_at: &str,
) {
    let Some(value) = cursor.poll(record) else {
        return;
    };

    let line = ReportLine {
        record: name,
        sequence: record.sequence(),
        last_update_ms: record.last_update_time(),
        received_at,
        value,
    };

    match serde_json::to_string(&line) {
        Ok(json) => lines.push(json),
        Err(e) => warn!("Failed to serialize {} record: {}", name, e),
    }
}
