//! tdwr-ingest: TDWR base-data ingest binary.
//!
//! Supports:
//! - Live ingest from the radar's fragmented UDP stream
//! - Playback of tape archives or recorded tape images
//!
//! Beams and volume/tilt boundary messages are written as JSON lines.

use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{debug, error, info, warn};

use tdwr_core::config::{self, Config};
use tdwr_core::{FrameReassembler, RadialProcessor, ReassemblyStats, TdwrError};

mod sink;
mod tape;
mod udp;

use sink::JsonLinesSink;
use tape::{TapeRecord, TapeSource};
use udp::UdpSource;

/// Beams between periodic summaries in live mode.
const SUMMARY_INTERVAL: u64 = 1000;

/// How often the UDP wait loop reports it is still alive.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(
    name = "tdwr-ingest",
    version,
    about = "TDWR base-data ingest from UDP or tape"
)]
struct Cli {
    /// Config file (default: ~/.tdwr-ingest/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output file for JSON lines, `-` for stdout
    #[arg(short, long, global = true, default_value = "-")]
    output: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the live UDP feed (runs until killed)
    Udp {
        /// UDP port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Play back a tape device or tape image until end of data
    Tape {
        /// Tape device or image file (overrides config)
        #[arg(short, long)]
        device: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the config file instead
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let writing_config = matches!(cli.command, Commands::Config { write: true });
    let config = match cli.config.as_deref() {
        Some(path) if writing_config && !path.exists() => Ok(Config::default()),
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Udp { port } => cmd_udp(&config, port, &cli.output),
        Commands::Tape { device } => cmd_tape(&config, device, &cli.output),
        Commands::Config { write } => cmd_config(&config, write, cli.config.as_deref()),
    };
    process::exit(code);
}

fn open_sink(output: &Path) -> JsonLinesSink<Box<dyn std::io::Write>> {
    match JsonLinesSink::open(output) {
        Ok(s) => s,
        Err(e) => {
            error!("Cannot open output {}: {e}", output.display());
            process::exit(1);
        }
    }
}

/// Run one raw radial through the processor. Only sink failures are
/// returned; decode errors are logged and the radial is skipped.
fn process_radial(
    processor: &mut RadialProcessor,
    raw: &[u8],
    sink: &mut JsonLinesSink<Box<dyn std::io::Write>>,
) -> Result<(), TdwrError> {
    match processor.process(raw, sink) {
        Ok(_) => Ok(()),
        Err(e @ TdwrError::Sink(_)) => Err(e),
        Err(e) => {
            warn!("Skipping radial: {e}");
            Ok(())
        }
    }
}

fn cmd_udp(config: &Config, port: Option<u16>, output: &Path) -> i32 {
    let port = port.unwrap_or(config.transport.udp_port);
    let mut source = match UdpSource::bind(port) {
        Ok(s) => s,
        Err(e) => {
            error!("Cannot open UDP port {port}: {e}");
            return 1;
        }
    };
    let mut sink = open_sink(output);
    let mut reassembler = FrameReassembler::new();
    let mut processor = RadialProcessor::new(config);

    match source.local_port() {
        Ok(bound) => info!("Listening for TDWR data on UDP port {bound}"),
        Err(e) => warn!("Listening on UDP port {port}, local address unavailable: {e}"),
    }

    let mut last_beat = Instant::now();
    let mut liveness = || {
        if last_beat.elapsed() >= HEARTBEAT_INTERVAL {
            debug!("Waiting for UDP data on port {port}");
            last_beat = Instant::now();
        }
    };
    let mut next_summary = SUMMARY_INTERVAL;

    loop {
        let datagram = source.read_datagram(&mut liveness);
        let raw = match reassembler.push(datagram) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(e) => {
                warn!("Dropping transport frame: {e}");
                continue;
            }
        };

        if let Err(e) = process_radial(&mut processor, raw, &mut sink) {
            error!("Output failed, stopping: {e}");
            log_udp_summary(&source, &reassembler.stats, &processor);
            return 1;
        }

        if processor.stats.beams >= next_summary {
            log_udp_summary(&source, &reassembler.stats, &processor);
            next_summary = processor.stats.beams + SUMMARY_INTERVAL;
        }
    }
}

fn cmd_tape(config: &Config, device: Option<PathBuf>, output: &Path) -> i32 {
    let device = device.unwrap_or_else(|| PathBuf::from(&config.transport.tape_device));
    let mut tape = match TapeSource::open(&device) {
        Ok(t) => t,
        Err(e) => {
            error!("Cannot open tape {}: {e}", device.display());
            return 1;
        }
    };
    let mut sink = open_sink(output);
    let mut processor = RadialProcessor::new(config);

    info!("Reading TDWR tape {}", device.display());

    let code = loop {
        match tape.next_record() {
            Ok(None) => {
                info!("End of tape data");
                break 0;
            }
            Ok(Some(TapeRecord::Filler)) => {}
            Ok(Some(TapeRecord::Radial(raw))) => {
                if let Err(e) = process_radial(&mut processor, raw, &mut sink) {
                    error!("Output failed, stopping: {e}");
                    break 1;
                }
            }
            Err(TdwrError::Io(e)) => {
                error!("Tape read error: {e}");
                break 1;
            }
            Err(e) => warn!("Skipping rest of tape block: {e}"),
        }
    };

    let code = match sink.flush() {
        Ok(()) => code,
        Err(e) => {
            error!("{e}");
            1
        }
    };

    let t = &tape.stats;
    info!(
        "Tape: {} blocks, {} records, {} fillers, {} bad records; {} messages written",
        t.blocks, t.records, t.fillers, t.bad_records, sink.messages
    );
    log_summary(&processor);
    code
}

fn cmd_config(config: &Config, write: bool, path: Option<&Path>) -> i32 {
    if !write {
        print!("{}", config::serialize_config(config));
        return 0;
    }

    let saved = match path {
        Some(p) => std::fs::write(p, config::serialize_config(config))
            .map(|_| p.to_path_buf())
            .map_err(TdwrError::from),
        None => config::save_config(config),
    };
    match saved {
        Ok(p) => {
            info!("Config written to {}", p.display());
            0
        }
        Err(e) => {
            error!("Cannot write config: {e}");
            1
        }
    }
}

fn log_summary(processor: &RadialProcessor) {
    let s = &processor.stats;
    let tracker = processor.tracker();
    info!(
        "{} radials, {} beams, {} volumes, {} tilts, {} LLWAS skipped, {} low-PRF dropped, {} decode errors",
        s.radials,
        s.beams,
        tracker.volumes_started,
        tracker.tilts_started,
        s.llwas_skipped,
        s.low_prf_dropped,
        s.decode_errors
    );
}

fn log_udp_summary(source: &UdpSource, r: &ReassemblyStats, processor: &RadialProcessor) {
    info!(
        "Transport: {} datagrams ({} receive errors), {} malformed, {} lost, {} discarded, {} messages, {} aborted",
        source.datagrams,
        source.receive_errors,
        r.malformed_frames,
        r.lost_frames,
        r.discarded_frames,
        r.messages,
        r.aborted_messages
    );
    log_summary(processor);
}
