//! Fault-tolerant capture loop.
//!
//! A single synchronous worker pulls frames from a [`CaptureSource`], runs
//! each probe request through the decoder → extractor → ingest stages, and
//! reacts to faults by state:
//!
//! STARTING → LISTENING on successful activation (channel switch + open);
//! LISTENING → RECOVERING on an interface-level fault, which cycles the
//! interface administratively and returns to STARTING; any unrecoverable
//! fault stops the loop. The pending buffer is flushed unconditionally on
//! every exit path — normal stop, interrupt, or fatal fault. Per-frame
//! errors never escape the loop.

use std::collections::HashSet;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pcap::{Active, Capture, Linktype};
use thiserror::Error;

use crate::config::Config;
use crate::console;
use crate::frame::{self, format_mac};
use crate::ingest::IngestContext;
use crate::radiotap;

/// BPF program pre-selecting probe requests.
const PROBE_REQUEST_FILTER: &str = "type mgt subtype probe-req";

/// pcap read timeout; bounds how long a quiet channel blocks the worker
/// before the shutdown flag is re-checked.
const READ_TIMEOUT_MS: i32 = 500;

/// Settle time between administratively downing and upping the interface.
const CYCLE_SETTLE: Duration = Duration::from_secs(1);

/// Capture-side fault, classified by how the loop must react.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureFault {
    /// No frame within the read timeout; the loop re-checks its flags.
    #[error("no frame within the read timeout")]
    Idle,
    /// The interface dropped out from under the capture; recoverable by an
    /// administrative down/up cycle.
    #[error("interface went down")]
    InterfaceDown,
    /// Unrecoverable fault: interface missing, driver error, bad datalink.
    #[error("{0}")]
    Fatal(String),
}

/// One captured frame: radiotap envelope plus 802.11 payload, stamped with
/// the capture facility's timestamp in float seconds.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: f64,
    pub data: Vec<u8>,
}

/// Synchronous frame stream, independent of the underlying capture facility.
pub trait CaptureSource {
    /// Switch to the target channel and start delivering frames.
    fn activate(&mut self) -> Result<(), CaptureFault>;
    /// Pull the next frame, or [`CaptureFault::Idle`] on timeout.
    fn next_frame(&mut self) -> Result<RawFrame, CaptureFault>;
    /// Administratively cycle the interface after it went down.
    fn reset(&mut self) -> Result<(), CaptureFault>;
}

/// Capture loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Listening,
    Recovering,
    Stopped,
}

/// Per-run options derived from config.
pub struct LoopOptions {
    /// Senders whose probes are dropped before ingest.
    pub ignored: HashSet<[u8; 6]>,
    /// Senders marked in the echo line.
    pub highlights: HashSet<[u8; 6]>,
    /// Echo one console line per observation.
    pub echo: bool,
}

impl LoopOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ignored: config.ignored_set(),
            highlights: config.highlight_set(),
            echo: config.echo,
        }
    }
}

/// Drive the capture loop until the shutdown flag clears or a fatal fault
/// stops it. The pending buffer is flushed before returning, on every path.
pub fn run(
    source: &mut dyn CaptureSource,
    ctx: &mut IngestContext,
    options: &LoopOptions,
    running: &AtomicBool,
) -> Result<(), CaptureFault> {
    let mut state = LoopState::Starting;
    let mut fatal = None;

    while running.load(Ordering::Relaxed) {
        match state {
            LoopState::Starting => match source.activate() {
                Ok(()) => {
                    log::info!("listening for probe requests");
                    state = LoopState::Listening;
                }
                Err(fault) => {
                    log::error!("capture activation failed: {fault}");
                    fatal = Some(fault);
                    state = LoopState::Stopped;
                }
            },
            LoopState::Listening => match source.next_frame() {
                Ok(raw) => process_frame(&raw, ctx, options),
                Err(CaptureFault::Idle) => {}
                Err(CaptureFault::InterfaceDown) => {
                    log::warn!("interface went down, attempting recovery");
                    state = LoopState::Recovering;
                }
                Err(fault) => {
                    log::error!("fatal capture fault: {fault}");
                    fatal = Some(fault);
                    state = LoopState::Stopped;
                }
            },
            LoopState::Recovering => match source.reset() {
                Ok(()) => {
                    log::info!("interface cycled, restarting capture");
                    state = LoopState::Starting;
                }
                Err(fault) => {
                    log::error!("interface recovery failed: {fault}");
                    fatal = Some(fault);
                    state = LoopState::Stopped;
                }
            },
            LoopState::Stopped => break,
        }
    }

    ctx.flush();
    match fatal {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}

/// Run one captured frame through the pipeline. Every failure mode either
/// degrades (unknown signal) or drops just this frame.
fn process_frame(raw: &RawFrame, ctx: &mut IngestContext, options: &LoopOptions) {
    let (header_len, signal_dbm) = match radiotap::parse(&raw.data) {
        Ok(envelope) => (envelope.header_len, envelope.signal_dbm()),
        // A broken field layout still leaves the frame locatable as long as
        // the declared length is sane; the signal degrades to unknown.
        Err(decode_err) => match radiotap::header_length(&raw.data) {
            Ok(header_len) => {
                log::debug!("radiotap decode failed ({decode_err}), signal unknown");
                (header_len, 0)
            }
            Err(_) => {
                log::debug!("unusable capture envelope: {decode_err}");
                return;
            }
        },
    };

    let Some(probe) = frame::parse_probe_request(&raw.data[header_len..]) else {
        return;
    };
    if options.ignored.contains(&probe.sender) {
        return;
    }

    match ctx.record(raw.timestamp, &probe, signal_dbm) {
        Ok(vendor) => {
            if options.echo {
                let highlighted = options.highlights.contains(&probe.sender);
                println!(
                    "{}",
                    console::observation_line(
                        raw.timestamp,
                        &format_mac(&probe.sender),
                        &vendor,
                        &probe.name,
                        signal_dbm,
                        highlighted,
                    )
                );
            }
        }
        Err(store_err) => log::warn!("failed to record observation: {store_err}"),
    }
}

// ── pcap-backed source ─────────────────────────────────────────────────

/// Live capture on a monitor-mode interface via libpcap.
pub struct PcapSource {
    interface: String,
    channel: u8,
    capture: Option<Capture<Active>>,
}

impl PcapSource {
    pub fn new(interface: &str, channel: u8) -> Self {
        Self {
            interface: interface.to_owned(),
            channel,
            capture: None,
        }
    }
}

impl CaptureSource for PcapSource {
    fn activate(&mut self) -> Result<(), CaptureFault> {
        set_channel(&self.interface, self.channel)?;

        let capture = Capture::from_device(self.interface.as_str())
            .and_then(|inactive| inactive.immediate_mode(true).timeout(READ_TIMEOUT_MS).open())
            .map_err(|e| CaptureFault::Fatal(format!("opening {}: {e}", self.interface)))?;

        // Radiotap link type is what the decoder understands; anything else
        // means the interface is not in monitor mode.
        if capture.get_datalink() != Linktype(127) {
            return Err(CaptureFault::Fatal(format!(
                "{} does not deliver radiotap frames (is it in monitor mode?)",
                self.interface
            )));
        }

        let mut capture = capture;
        capture
            .filter(PROBE_REQUEST_FILTER, true)
            .map_err(|e| CaptureFault::Fatal(format!("installing capture filter: {e}")))?;

        self.capture = Some(capture);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame, CaptureFault> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| CaptureFault::Fatal("capture source not activated".into()))?;
        match capture.next_packet() {
            Ok(packet) => Ok(RawFrame {
                timestamp: packet.header.ts.tv_sec as f64
                    + packet.header.ts.tv_usec as f64 * 1e-6,
                data: packet.data.to_vec(),
            }),
            Err(e) => Err(classify_pcap_error(e)),
        }
    }

    fn reset(&mut self) -> Result<(), CaptureFault> {
        // The old handle is useless once the interface bounced.
        self.capture = None;
        run_admin("ip", &["link", "set", "dev", &self.interface, "down"])?;
        std::thread::sleep(CYCLE_SETTLE);
        run_admin("ip", &["link", "set", "dev", &self.interface, "up"])?;
        Ok(())
    }
}

fn classify_pcap_error(error: pcap::Error) -> CaptureFault {
    match error {
        pcap::Error::TimeoutExpired => CaptureFault::Idle,
        pcap::Error::PcapError(message) => {
            let lower = message.to_ascii_lowercase();
            if lower.contains("network is down") || lower.contains("went down") {
                CaptureFault::InterfaceDown
            } else {
                CaptureFault::Fatal(message)
            }
        }
        other => CaptureFault::Fatal(other.to_string()),
    }
}

/// Set the listening channel with `iw`; failure means there is nothing to
/// listen on, so it is fatal.
fn set_channel(interface: &str, channel: u8) -> Result<(), CaptureFault> {
    run_admin(
        "iw",
        &["dev", interface, "set", "channel", &channel.to_string()],
    )
}

fn run_admin(program: &str, args: &[&str]) -> Result<(), CaptureFault> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| CaptureFault::Fatal(format!("failed to run {program}: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(CaptureFault::Fatal(format!(
            "{program} {} exited with {status}",
            args.join(" ")
        )))
    }
}
