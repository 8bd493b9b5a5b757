mod console;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use emu::config::Config;
use emu::copro::registry::{DispatchExit, Dispatcher, Registry};
use emu::probe::{Breakpoints, Introspect};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::console::ConsoleTube;

#[derive(Parser, Debug)]
#[command(
    name = "tubecopro",
    version,
    about = "BBC Micro Tube second processor running a PDP-11 client ROM."
)]
struct Args {
    /// JSON configuration file; flags below override it.
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Co-processor slot selected at boot.
    #[arg(long, value_name = "SLOT")]
    copro: Option<usize>,

    /// Slot the PDP-11 is registered in.
    #[arg(long, value_name = "SLOT")]
    pdp11_slot: Option<usize>,

    /// PDP-11 client ROM image (at most 2 KiB, copied to 174000).
    #[arg(long, value_name = "PATH")]
    rom: Option<PathBuf>,

    /// Mask the low bit of odd word addresses instead of trapping.
    #[arg(long, default_value_t = false)]
    allow_unaligned: bool,

    /// Stop after this many instructions.
    #[arg(long, value_name = "N")]
    max_instructions: Option<u64>,

    /// Attach the debug probe.
    #[arg(long, default_value_t = false)]
    probe: bool,

    /// Octal breakpoint addresses; implies --probe.
    #[arg(long, value_name = "ADDR", num_args = 1.., value_delimiter = ',', value_parser = parse_octal)]
    breakpoint: Vec<u32>,

    /// Text queued on R1 for the client to read.
    #[arg(long, value_name = "TEXT")]
    input: Option<String>,

    /// `tracing` filter used when RUST_LOG is unset.
    #[arg(long, value_name = "FILTER")]
    log_filter: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(slot) = self.copro {
            config.copro = slot;
        }
        if let Some(slot) = self.pdp11_slot {
            config.pdp11.slot = slot;
        }
        if self.rom.is_some() {
            config.pdp11.rom.clone_from(&self.rom);
        }
        config.pdp11.allow_unaligned |= self.allow_unaligned;
        if self.max_instructions.is_some() {
            config.max_instructions = self.max_instructions;
        }
        if self.probe || !self.breakpoint.is_empty() {
            config.probe.enabled = true;
        }
        config.probe.breakpoints.extend(&self.breakpoint);
        if let Some(filter) = &self.log_filter {
            config.log_filter.clone_from(filter);
        }
        if self.log_file.is_some() {
            config.log_file.clone_from(&self.log_file);
        }
    }
}

fn parse_octal(text: &str) -> Result<u32, String> {
    let digits = text.strip_prefix("0o").unwrap_or(text);
    u32::from_str_radix(digits, 8).map_err(|e| format!("{text:?} is not an octal address: {e}"))
}

fn init_logging(config: &Config) -> Result<Option<WorkerGuard>, Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?;

    let Some(path) = &config.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().ok_or("log file path has no file name")?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// Register dump and the instruction about to run, on stderr so it does not
/// mix with the guest's output.
fn report(target: &mut dyn Introspect, slot: usize, address: u32) {
    let registers = target
        .registers()
        .iter()
        .enumerate()
        .filter_map(|(index, info)| {
            let value = target.register(index)?;
            Some(format!("{}={}", info.name, target.format_register(index, value)?))
        })
        .collect::<Vec<_>>()
        .join(" ");
    let (text, _) = target.disassemble(address);
    eprintln!("\n[slot {slot}] break at {address:06o}  {text}");
    eprintln!("  {registers}");
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let mut config = match args.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    let _guard = init_logging(&config)?;
    info!(copro = config.copro, pdp11_slot = config.pdp11.slot, "tubecopro starting");

    let mut dispatcher = Dispatcher::new(Registry::from_config(&config)?);
    if config.probe.enabled {
        let mut probe = Breakpoints::new(config.probe.history);
        for &address in &config.probe.breakpoints {
            probe.add_breakpoint(address);
        }
        dispatcher = dispatcher.with_probe(Box::new(probe));
    }

    let mut tube = ConsoleTube::new(config.copro);
    tube.set_instruction_limit(config.max_instructions);
    if let Some(text) = &args.input {
        tube.type_text(text);
    }

    while let DispatchExit::Suspended { slot, address } = dispatcher.run(&mut tube)? {
        if let Some(harness) = dispatcher.harness_mut() {
            report(harness.coprocessor_mut().introspect(), slot, address);
        }
    }

    if let Some(harness) = dispatcher.harness() {
        let perf = harness.perf();
        info!(
            instructions = perf.instructions(),
            elapsed = ?perf.elapsed(),
            "{} stopped",
            harness.coprocessor().name()
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tubecopro: {e}");
            ExitCode::FAILURE
        }
    }
}
