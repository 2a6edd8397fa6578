//! probelog — a command line tool for logging 802.11 probe-request frames.
//!
//! A thin shell over the library: parses the CLI, merges it with the
//! optional config file, wires the interrupt flag, and hands control to the
//! capture loop. The analysis side (reports, merges, plots) is a separate
//! consumer of the finished database.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use probelog::buffer::WriteBuffer;
use probelog::capture::{self, LoopOptions, PcapSource};
use probelog::config::Config;
use probelog::ingest::IngestContext;
use probelog::store::Store;
use probelog::vendor::OuiTable;

#[derive(Parser)]
#[command(name = "probelog")]
#[command(version, about = "Log 802.11 probe requests to a normalized SQLite store")]
struct Cli {
    /// Capture interface to use (must be in monitor mode).
    #[arg(short, long)]
    interface: Option<String>,

    /// Channel to listen on.
    #[arg(short, long)]
    channel: Option<u8>,

    /// Database file name to use.
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// MAC address to ignore; may be given multiple times.
    #[arg(short = 'I', long = "ignore")]
    ignore: Vec<String>,

    /// Also log each probe request to stdout.
    #[arg(short, long)]
    stdout: bool,

    /// JSON config file with ignore/highlight lists and buffer thresholds.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vendor prefix table in Wireshark manuf format.
    #[arg(long)]
    oui_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // CLI flags override file values.
    if let Some(interface) = cli.interface {
        config.interface = interface;
    }
    if let Some(channel) = cli.channel {
        config.channel = channel;
    }
    if let Some(db) = cli.db {
        config.db = db;
    }
    if let Some(oui_file) = cli.oui_file {
        config.oui_file = Some(oui_file);
    }
    config.ignored.extend(cli.ignore);
    config.echo |= cli.stdout;

    if config.interface.is_empty() {
        bail!("no capture interface given (use --interface or the config file)");
    }

    let store = Store::open(&config.db)
        .with_context(|| format!("opening store {}", config.db.display()))?;
    let oui = match &config.oui_file {
        Some(path) => OuiTable::load(path),
        None => OuiTable::new(),
    };
    let mut ctx = IngestContext::new(store, oui, WriteBuffer::new(config.buffer_config()));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            log::info!("interrupt received, flushing and shutting down");
            running.store(false, Ordering::Relaxed);
        })
        .expect("failed to install interrupt handler");
    }

    log::info!(
        "probelog v{} listening on channel {} of {}, store {}",
        env!("CARGO_PKG_VERSION"),
        config.channel,
        config.interface,
        config.db.display(),
    );

    let options = LoopOptions::from_config(&config);
    let mut source = PcapSource::new(&config.interface, config.channel);
    capture::run(&mut source, &mut ctx, &options, &running)
        .map_err(|fault| anyhow::anyhow!("capture stopped: {fault}"))
}
