//! litmusgen command-line front end.
//!
//! usage: litmusgen [-h] [-b] [-s seed] [-n insts] [-t tasks] [-l logfile]

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use litmusgen::core::config::{DEFAULT_INSN_COUNT, DEFAULT_TASK_COUNT};
use litmusgen::core::{GeneratorConfig, RunConfig, Variant};
use litmusgen::litmus::Harness;

const USAGE: &str = "usage: litmusgen [-h] [-b] [-s seed] [-n insts] [-t tasks] [-l logfile]";

#[derive(Parser, Debug)]
#[command(name = "litmusgen", disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Random seed
    #[arg(
        short = 's',
        long = "seed",
        default_value = "0",
        allow_hyphen_values = true,
        value_parser = parse_seed
    )]
    seed: u64,

    /// Instructions to generate per task
    #[arg(
        short = 'n',
        long = "insts",
        default_value_t = DEFAULT_INSN_COUNT,
        value_parser = parse_number::<usize>
    )]
    insts: usize,

    /// Concurrent tasks
    #[arg(
        short = 't',
        long = "tasks",
        default_value_t = DEFAULT_TASK_COUNT,
        value_parser = parse_number::<usize>
    )]
    tasks: usize,

    /// Write log output to this file instead of standard error
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<PathBuf>,

    /// Only generate moves, loads and stores
    #[arg(short = 'b', long = "baseline")]
    baseline: bool,

    /// Print usage
    #[arg(short = 'h', long = "help")]
    help: bool,
}

/// Parse decimal, `0x` hex or leading-zero octal.
///
/// The whole argument must be valid in its radix: `08` or `12abc` are rejected instead
/// of being cut short at the first bad digit.
fn parse_number<T>(text: &str) -> Result<T, String>
where
    T: TryFrom<u64>,
{
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8)
    } else {
        text.parse::<u64>()
    };
    let value = parsed.map_err(|e| format!("invalid number '{text}': {e}"))?;
    T::try_from(value).map_err(|_| format!("number '{text}' is out of range"))
}

/// Like [`parse_number`], but a leading `-` is accepted and the value wraps to its
/// two's-complement bit pattern, so `-1` seeds the same as `0xffffffffffffffff`.
fn parse_seed(text: &str) -> Result<u64, String> {
    match text.trim().strip_prefix('-') {
        Some(magnitude) => parse_number::<u64>(magnitude).map(u64::wrapping_neg),
        None => parse_number::<u64>(text),
    }
}

fn usage_exit() -> ExitCode {
    eprintln!("{USAGE}");
    ExitCode::from(1)
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<(), String> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = File::create(path)
            .map_err(|e| format!("cannot open log file {}: {e}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) if !args.help => args,
        Ok(_) => return usage_exit(),
        Err(err) => {
            eprintln!("{}", err.kind());
            return usage_exit();
        }
    };

    if let Err(err) = init_logging(args.log_file.as_ref()) {
        eprintln!("{err}");
        return ExitCode::from(1);
    }

    let variant = if args.baseline { Variant::Baseline } else { Variant::Extended };
    let config = RunConfig {
        seed: args.seed,
        insn_count: args.insts,
        task_count: args.tasks,
        generator: GeneratorConfig { variant, ..GeneratorConfig::default() },
    };
    log::info!(
        "seed = {}, num insts = {}, tasks = {}, variant = {:?}",
        config.seed,
        config.insn_count,
        config.task_count,
        variant
    );

    let report = match Harness::new(config).and_then(|harness| harness.run()) {
        Ok(report) => report,
        Err(err) => {
            log::error!("{err}");
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    for task in &report.tasks {
        log::info!("task {} (pid {}): {}", task.index, task.pid, task.outcome);
    }
    log::info!("litmus run complete, {} tasks joined", report.tasks.len());

    if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
