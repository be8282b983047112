use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::{Args, Subcommand};
use framelink_conn::{uds, ConnConfig, UdsListener, DEFAULT_MAX_MESSAGE};
use framelink_transport::Transport;

use crate::exit::{conn_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every message back to its sender.
    Echo(EchoArgs),
    /// Send a single message.
    Send(SendArgs),
    /// Accept connections and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Connection tuning shared by every command that opens a socket.
#[derive(Args, Debug, Clone)]
pub struct ConnArgs {
    /// Largest message accepted or sent, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_MESSAGE)]
    pub max_message_size: usize,
}

impl ConnArgs {
    pub fn config(&self) -> ConnConfig {
        ConnConfig {
            max_message_size: self.max_message_size,
            ..ConnConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after the first connection ends.
    #[arg(long)]
    pub once: bool,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    #[arg(env = "FRAMELINK_SOCKET")]
    pub path: PathBuf,
    /// Message type tag.
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub msg_type: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub wait_timeout: Duration,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Only print messages with these type tags (comma-separated).
    #[arg(long = "type", short = 't', value_name = "TYPE", value_delimiter = ',')]
    pub types: Option<Vec<String>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build provenance and wire constants.
    #[arg(long)]
    pub extended: bool,
}

/// Parses `500ms`, `5s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {input:?}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Coordinates Ctrl-C with a server loop blocked in `accept` or `receive`.
///
/// The handler closes the active transport, which releases a blocked
/// `receive`, or dials the listening socket to release a blocked `accept`.
pub struct Shutdown {
    requested: AtomicBool,
    active: Mutex<Option<Arc<Transport>>>,
    wake_path: PathBuf,
}

impl Shutdown {
    fn new(wake_path: &Path) -> Arc<Self> {
        Arc::new(Self {
            requested: AtomicBool::new(false),
            active: Mutex::new(None),
            wake_path: wake_path.to_path_buf(),
        })
    }

    pub fn install(wake_path: &Path) -> CliResult<Arc<Self>> {
        let shutdown = Self::new(wake_path);
        let handler = Arc::clone(&shutdown);
        ctrlc::set_handler(move || handler.trigger()).map_err(|err| {
            CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
        })?;
        Ok(shutdown)
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("shutdown requested");

        let active = self.slot().clone();
        match active {
            Some(transport) => {
                if let Err(err) = transport.close() {
                    tracing::debug!(error = %err, "close during shutdown failed");
                }
            }
            None => {
                // Only to release accept(); the connection is dropped at once.
                let _ = uds::connect(&self.wake_path);
            }
        }
    }

    /// Register the connection being served so `trigger` can close it.
    ///
    /// Returns false, with the transport already closed, if shutdown was
    /// requested before the connection could be registered.
    #[must_use]
    pub fn track(&self, transport: Arc<Transport>) -> bool {
        *self.slot() = Some(Arc::clone(&transport));
        if !self.requested() {
            return true;
        }

        self.untrack();
        if let Err(err) = transport.close() {
            tracing::debug!(error = %err, "close during shutdown failed");
        }
        false
    }

    pub fn untrack(&self) {
        *self.slot() = None;
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Transport>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bind the server socket, mapping failures to exit codes.
pub fn bind(path: &Path, conn: &ConnArgs) -> CliResult<UdsListener> {
    let listener = UdsListener::bind(path)
        .map_err(|err| conn_error("bind failed", err))?
        .with_config(conn.config());
    tracing::info!(path = %path.display(), "listening");
    Ok(listener)
}
