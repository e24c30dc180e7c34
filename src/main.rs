use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use flarm_lib::{FlarmConfig, FlarmDevice, MessageType, OperationEnvironment, RecordedFlightInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Read the flight list and download IGC logs from a FLARM in binary mode.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port the FLARM is connected to, e.g. /dev/ttyUSB0.
    #[arg(short, long)]
    port: String,
    /// Baud rate of the link.
    #[arg(short, long, default_value_t = 57600)]
    baud: u32,
    /// Timeout for control requests in milliseconds.
    #[arg(long, default_value_t = 1000)]
    control_timeout_ms: u64,
    /// Timeout for each IGC data chunk in milliseconds.
    #[arg(long, default_value_t = 3000)]
    data_timeout_ms: u64,
    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the device answers.
    Ping,
    /// List the flights stored on the device.
    List {
        /// Print the list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show date and times of one record.
    Info { index: u8 },
    /// Download one record as an IGC file.
    Download {
        index: u8,
        /// Output file. Defaults to <date>-<index>.igc in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Leave binary mode.
    Exit,
}

/// Logs progress and turns Ctrl+C into a cancellation request.
struct ConsoleOperation {
    cancelled: Arc<AtomicBool>,
    range: u32,
    position: Option<u32>,
}

impl ConsoleOperation {
    fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            range: 0,
            position: None,
        }
    }
}

impl OperationEnvironment for ConsoleOperation {
    fn set_progress_range(&mut self, range: u32) {
        self.range = range;
        self.position = None;
    }

    fn set_progress_position(&mut self, position: u32) {
        if self.position == Some(position) {
            return;
        }
        self.position = Some(position);
        if self.range == 100 {
            info!("Downloaded {}%", position);
        } else {
            debug!(position, range = self.range, "Progress");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

fn init_tracing(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy();

    let (file_layer, guard) = match &cli.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli)?;
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = FlarmConfig::default()
        .with_control_timeout(Duration::from_millis(cli.control_timeout_ms))
        .with_data_timeout(Duration::from_millis(cli.data_timeout_ms));

    info!(port = %cli.port, baud = cli.baud, "Opening serial port");
    let port = tokio_serial::new(&cli.port, cli.baud)
        .open_native_async()
        .with_context(|| format!("Failed to open serial port {}", cli.port))?;
    let mut device = FlarmDevice::with_config(port, config);

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, cancelling after the current request.");
            flag.store(true, Ordering::Relaxed);
        }
    });
    let mut env = ConsoleOperation::new(cancelled);

    match cli.command {
        Command::Ping => {
            device.ping().await.context("Device did not answer the ping")?;
            println!("FLARM is answering");
        }
        Command::List { json } => {
            let mut list = device.new_flight_list();
            device
                .read_flight_list(&mut list, &mut env)
                .await
                .context("Failed to read the flight list")?;
            if json {
                println!("{}", serde_json::to_string_pretty(list.as_slice())?);
            } else if list.is_empty() {
                println!("No flights stored on the device");
            } else {
                for flight in &list {
                    println!("{}", flight);
                }
            }
        }
        Command::Info { index } => {
            let flight = read_record(&mut device, index).await?;
            println!("{}", flight);
        }
        Command::Download { index, output } => {
            let flight = read_record(&mut device, index).await?;
            let path = output.unwrap_or_else(|| default_file_name(&flight));
            device
                .download_flight(&flight, &path, &mut env)
                .await
                .with_context(|| format!("Failed to download record #{index}"))?;
            println!("Saved {}", path.display());
        }
        Command::Exit => {
            device.exit_binary_mode().await?;
        }
    }

    Ok(())
}

async fn read_record<P>(device: &mut FlarmDevice<P>, index: u8) -> Result<RecordedFlightInfo>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    match device.select_flight(index).await? {
        MessageType::Ack => {}
        MessageType::Nack => bail!("No record #{index} on the device"),
        other => bail!("Unexpected answer to record selection: {other}"),
    }
    device
        .read_flight_info(index)
        .await
        .with_context(|| format!("Failed to read info of record #{index}"))
}

fn default_file_name(flight: &RecordedFlightInfo) -> PathBuf {
    let date = match flight.date.to_naive_date() {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => format!("record-{}", flight.date),
    };
    PathBuf::from(format!("{date}-{}.igc", flight.index))
}
