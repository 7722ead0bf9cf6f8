// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, Context, Result};
use atomsim_config::{BackendConfig, SystemManifest, UartConfig, DEFAULT_BAUD_RATE};
use atomsim_core::memory::ProgramImage;
use atomsim_core::metrics::PerformanceMetrics;
use atomsim_core::model::{ReplayModel, ReplayScript};
use atomsim_core::snapshot::BackendSnapshot;
use atomsim_core::transcript::ChannelSink;
use atomsim_core::{Backend, TickStatus};
use clap::Parser;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Exit status when the tick budget runs out before the model halts.
const EXIT_TICK_LIMIT: i32 = 124;
const TRANSCRIPT_CHANNEL_CAPACITY: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the system manifest (YAML)
    #[arg(short, long)]
    system: Option<PathBuf>,

    /// Port stimulus script (YAML) driving the replay model
    #[arg(long)]
    script: Option<PathBuf>,

    /// ELF image to preload
    #[arg(short, long, group = "image")]
    firmware: Option<PathBuf>,

    /// Raw binary image to preload at --load-addr
    #[arg(long, group = "image")]
    binary: Option<PathBuf>,

    /// Verilog hex image to preload
    #[arg(long, group = "image")]
    vhex: Option<PathBuf>,

    /// Load address for --binary and unanchored --vhex data (default: imem base)
    #[arg(long, value_parser = parse_u32)]
    load_addr: Option<u32>,

    /// Maximum number of ticks to simulate
    #[arg(long, default_value = "1000000")]
    max_ticks: u64,

    /// Bytes fed into the UART receiver before the first tick
    #[arg(long)]
    uart_input: Option<String>,

    /// Write the UART transcript to this file (captures even when the
    /// manifest leaves `transcript` off)
    #[arg(long)]
    uart_dump: Option<PathBuf>,

    /// Do not echo UART output to stdout
    #[arg(long)]
    no_uart_stdout: bool,

    /// Enable per-request tracing
    #[arg(short, long)]
    trace: bool,

    /// Write a JSON run summary to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    Halted,
    MaxTicks,
}

#[derive(Serialize, Debug)]
struct RunSummary {
    stop_reason: StopReason,
    exit_code: Option<u32>,
    ticks: u64,
    ticks_per_sec: f64,
    image: Option<String>,
    image_hash: Option<String>,
    /// Present when the transcript is captured.
    uart_output: Option<String>,
    reads: Vec<atomsim_core::model::ReadRecord>,
    state: BackendSnapshot,
}

fn backend_config(args: &Args) -> Result<BackendConfig> {
    match &args.system {
        Some(path) => {
            info!("Loading system manifest: {:?}", path);
            let manifest = SystemManifest::from_file(path)?;
            manifest.to_backend_config()
        }
        None => {
            info!("Using default hardware configuration");
            Ok(BackendConfig {
                uart: Some(UartConfig {
                    transcript: true,
                    ..UartConfig::new("uart0", DEFAULT_BAUD_RATE)
                }),
                ..Default::default()
            })
        }
    }
}

fn load_script(path: Option<&Path>) -> Result<ReplayScript> {
    let Some(path) = path else {
        return Ok(ReplayScript::default());
    };
    let f = std::fs::File::open(path)
        .with_context(|| format!("Failed to open script at {:?}", path))?;
    serde_yaml::from_reader(f).with_context(|| format!("Failed to parse script {:?}", path))
}

fn load_image(args: &Args, default_base: u32) -> Result<Option<(PathBuf, ProgramImage)>> {
    let base = args.load_addr.unwrap_or(default_base);
    let image = if let Some(path) = &args.firmware {
        (path.clone(), atomsim_loader::load_elf(path)?)
    } else if let Some(path) = &args.binary {
        (path.clone(), atomsim_loader::load_binary(path, base)?)
    } else if let Some(path) = &args.vhex {
        (path.clone(), atomsim_loader::load_vhex(path, base)?)
    } else {
        return Ok(None);
    };
    Ok(Some(image))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the UART stream.
    tracing_subscriber::fmt()
        .with_max_level(if args.trace {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    info!("Starting AtomSim");

    let config = backend_config(&args)?;
    let script = load_script(args.script.as_deref())?;
    let image = load_image(&args, config.imem_offset)?;

    let capture =
        config.uart.as_ref().is_some_and(|u| u.transcript) || args.uart_dump.is_some();
    let echo = !args.no_uart_stdout;

    let mut backend = Backend::new(ReplayModel::new(script), config)
        .context("Failed to build the simulated system")?;

    let metrics = Arc::new(PerformanceMetrics::new());
    backend.add_observer(metrics.clone());

    let image_hash = match &image {
        Some((path, program)) => {
            info!("Loading image: {:?}", path);
            backend
                .load_image(program)
                .with_context(|| format!("Image {:?} does not fit the address map", path))?;
            let bytes = std::fs::read(path)?;
            Some(format!("{:x}", Sha256::digest(&bytes)))
        }
        None => None,
    };

    let (sink, rx) = ChannelSink::bounded(TRANSCRIPT_CHANNEL_CAPACITY);
    if capture || echo {
        if !backend.attach_transcript(Box::new(sink)) {
            warn!("No UART configured; transcript will be empty");
        }
    } else {
        // Nothing listens; closing the channel lets the printer finish.
        drop(sink);
    }
    let printer = thread::spawn(move || {
        let mut transcript = Vec::new();
        let stdout = std::io::stdout();
        for byte in rx.iter() {
            if capture {
                transcript.push(byte);
            }
            if echo {
                let mut out = stdout.lock();
                let _ = out.write_all(&[byte]);
                if byte == b'\n' {
                    let _ = out.flush();
                }
            }
        }
        let _ = stdout.lock().flush();
        transcript
    });

    if let Some(input) = &args.uart_input {
        if !backend.uart_host_send(input.as_bytes()) {
            warn!("No UART configured; ignoring --uart-input");
        }
    }

    info!("Running for at most {} ticks...", args.max_ticks);
    let mut exit_code = None;
    while backend.cycles() < args.max_ticks {
        match backend.tick() {
            TickStatus::Halted(code) => {
                exit_code = Some(code);
                break;
            }
            TickStatus::Faulted(_) | TickStatus::Clean => {}
        }
    }

    let state = backend.state().clone();
    let reads = backend.model().reads().to_vec();
    info!(
        "Stopped after {} ticks ({} faults, {:.0} ticks/s)",
        state.cycles,
        state.total_faults,
        metrics.get_ticks_per_sec()
    );
    // Dropping the backend closes the transcript channel.
    drop(backend);
    let transcript = printer
        .join()
        .map_err(|_| anyhow!("UART printer thread panicked"))?;

    if let Some(path) = &args.uart_dump {
        std::fs::write(path, &transcript)
            .with_context(|| format!("Failed to write UART dump to {:?}", path))?;
    }

    if let Some(path) = &args.output {
        let summary = RunSummary {
            stop_reason: if exit_code.is_some() {
                StopReason::Halted
            } else {
                StopReason::MaxTicks
            },
            exit_code,
            ticks: state.cycles,
            ticks_per_sec: metrics.get_ticks_per_sec(),
            image: image.as_ref().map(|(p, _)| p.display().to_string()),
            image_hash,
            uart_output: capture.then(|| String::from_utf8_lossy(&transcript).into_owned()),
            reads,
            state,
        };
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {:?}", path))?;
    }

    match exit_code {
        Some(code) => {
            info!("Model halted with exit code {}", code);
            std::process::exit(code as i32);
        }
        None => {
            warn!("Tick limit reached before the model halted");
            std::process::exit(EXIT_TICK_LIMIT);
        }
    }
}
