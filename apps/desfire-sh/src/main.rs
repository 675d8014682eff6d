// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for replaying APDU scripts against an emulated card.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the DESFire card shell.
//!
//! Scripts hold one hex-encoded frame per line. Blank lines and lines starting
//! with `#` are skipped. A line may end with `=> SSSS` to require a status word.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use desfire_codec::ResponseApdu;
use desfire_emu::{AppletRegistry, Card, CardConfig, Processor, Snapshot};
use env_logger::Env;
use log::{debug, info, LevelFilter};

/// DESFire card shell command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Emulated DESFire card shell", long_about = None)]
struct Cli {
    /// Card configuration TOML (falls back to DESFIRE_CONFIG, then defaults).
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short = 'v', long, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send every frame of a script to the card and print the responses.
    Replay(ReplayArgs),
    /// Write a snapshot of a freshly configured card.
    Export(ExportArgs),
    /// Summarise the applications and files held in a snapshot.
    Inspect(InspectArgs),
}

#[derive(Debug, Parser)]
struct ReplayArgs {
    /// Script of hex frames.
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,
    /// Start from a previously exported snapshot instead of the configuration.
    #[arg(long, value_name = "FILE")]
    restore: Option<PathBuf>,
    /// Export the card state after the script completes.
    #[arg(long, value_name = "FILE", conflicts_with = "registry")]
    save: Option<PathBuf>,
    /// Route frames through the applet registry so scripts must SELECT first.
    #[arg(long, default_value_t = false)]
    registry: bool,
    /// Seed for card challenges, for reproducible transcripts.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    /// Destination JSON file.
    #[arg(value_name = "FILE")]
    output: PathBuf,
}

#[derive(Debug, Parser)]
struct InspectArgs {
    /// Snapshot JSON file.
    #[arg(value_name = "FILE")]
    snapshot: PathBuf,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn load_config(path: Option<&Path>) -> Result<CardConfig> {
    match path {
        Some(path) => CardConfig::load(path)
            .with_context(|| format!("load card config {}", path.display())),
        None => CardConfig::from_env().context("load card config from environment"),
    }
}

fn load_snapshot(path: &Path) -> Result<Card> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    Snapshot::from_json(&text)
        .and_then(Snapshot::restore)
        .with_context(|| format!("restore snapshot {}", path.display()))
}

fn write_snapshot(card: &Card, path: &Path) -> Result<()> {
    let json = Snapshot::capture(card).to_json().context("encode snapshot")?;
    fs::write(path, json).with_context(|| format!("write snapshot {}", path.display()))?;
    info!("snapshot written to {}", path.display());
    Ok(())
}

/// One parsed script line.
#[derive(Debug, PartialEq, Eq)]
struct ScriptStep {
    line: usize,
    frame: Vec<u8>,
    expect: Option<u16>,
}

fn parse_script(text: &str) -> Result<Vec<ScriptStep>> {
    let mut steps = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (frame_text, expect_text) = match trimmed.split_once("=>") {
            Some((frame, expect)) => (frame, Some(expect)),
            None => (trimmed, None),
        };
        let frame = decode_hex(frame_text).with_context(|| format!("line {line}: frame"))?;
        if frame.is_empty() {
            bail!("line {line}: empty frame");
        }
        let expect = match expect_text {
            Some(text) => {
                let bytes = decode_hex(text).with_context(|| format!("line {line}: status"))?;
                match bytes.as_slice() {
                    [sw1, sw2] => Some(u16::from_be_bytes([*sw1, *sw2])),
                    _ => bail!("line {line}: status must be two bytes"),
                }
            }
            None => None,
        };
        steps.push(ScriptStep {
            line,
            frame,
            expect,
        });
    }
    Ok(steps)
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|err| anyhow!("invalid hex: {err}"))
}

/// Where replayed frames go.
enum Target {
    Direct(Processor),
    Registry(AppletRegistry),
}

impl Target {
    fn transmit(&mut self, frame: &[u8]) -> Vec<u8> {
        match self {
            Target::Direct(processor) => processor.process(frame),
            Target::Registry(registry) => registry.transmit(frame),
        }
    }
}

fn replay(cli_config: Option<&Path>, args: ReplayArgs) -> Result<()> {
    let card = match args.restore.as_deref() {
        Some(path) => load_snapshot(path)?,
        None => load_config(cli_config)?
            .build_card()
            .context("build card from config")?,
    };
    let processor = match args.seed {
        Some(seed) => Processor::with_seed(card, seed),
        None => Processor::new(card),
    };
    let mut target = if args.registry {
        let mut registry = AppletRegistry::new();
        registry
            .register(Box::new(processor))
            .context("register card applet")?;
        Target::Registry(registry)
    } else {
        Target::Direct(processor)
    };

    let script = fs::read_to_string(&args.script)
        .with_context(|| format!("read script {}", args.script.display()))?;
    let steps = parse_script(&script)?;
    debug!("replaying {} frames", steps.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for step in &steps {
        let response = target.transmit(&step.frame);
        writeln!(out, "> {}", hex::encode_upper(&step.frame))?;
        writeln!(out, "< {}", hex::encode_upper(&response))?;
        if let Some(expected) = step.expect {
            let parsed = ResponseApdu::parse(&response)
                .with_context(|| format!("line {}: response", step.line))?;
            let actual = parsed.status.into_raw();
            if actual != expected {
                bail!(
                    "line {}: expected status {expected:04X}, card answered {actual:04X}",
                    step.line
                );
            }
        }
    }

    if let (Some(path), Target::Direct(processor)) = (args.save.as_deref(), &target) {
        write_snapshot(processor.card(), path)?;
    }
    Ok(())
}

fn export(cli_config: Option<&Path>, args: ExportArgs) -> Result<()> {
    let card = load_config(cli_config)?
        .build_card()
        .context("build card from config")?;
    write_snapshot(&card, &args.output)
}

fn inspect(args: InspectArgs) -> Result<()> {
    let card = load_snapshot(&args.snapshot)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "uid {}", hex::encode_upper(card.uid()))?;
    writeln!(
        out,
        "master key {:?} v{}, settings {:02X}",
        card.master_key().key_type(),
        card.master_key().version(),
        card.key_settings().to_byte()
    )?;
    writeln!(out, "free memory {} bytes", card.free_memory())?;
    for app in card.applications() {
        writeln!(
            out,
            "app {} keys {}x{:?} settings {:02X}",
            hex::encode_upper(app.aid()),
            app.max_keys(),
            app.key_type(),
            app.key_settings().to_byte()
        )?;
        for file in app.files() {
            writeln!(
                out,
                "  file {:02X} {:?} {} bytes",
                file.id(),
                file.kind(),
                file.capacity()
            )?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.config.as_deref();
    match cli.command {
        Command::Replay(args) => replay(config, args),
        Command::Export(args) => export(config, args),
        Command::Inspect(args) => inspect(args),
    }
}
