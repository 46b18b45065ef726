//! Command-line argument parsing for the coordinator binary.

use std::env;
use std::path::PathBuf;

#[cfg(feature = "api")]
use std::net::SocketAddr;

#[derive(Debug, Default)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub status_out: Option<PathBuf>,
    pub duration_secs: Option<u64>,
    pub seed: Option<u64>,
    pub log_level: Option<String>,
    #[cfg(feature = "api")]
    pub api_bind: Option<SocketAddr>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut opts = CliOptions::default();

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                if opts.config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if opts.preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--status-out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --status-out (expected a file path)")?;
                if opts.status_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--status-out provided more than once".to_string());
                }
            }
            "--duration-secs" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --duration-secs (expected seconds)")?;
                let secs = raw
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| format!("--duration-secs value \"{raw}\" is not a positive integer"))?;
                opts.duration_secs = Some(secs);
            }
            "--seed" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let seed = raw
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{raw}\" is not a valid u64"))?;
                opts.seed = Some(seed);
            }
            "--log-level" => {
                i += 1;
                let level = args.next_or_err(i, "missing value for --log-level (expected a filter such as info)")?;
                opts.log_level = Some(level.to_string());
            }
            #[cfg(feature = "api")]
            "--api-bind" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --api-bind (expected host:port)")?;
                let addr = raw
                    .parse::<SocketAddr>()
                    .map_err(|_| format!("--api-bind value \"{raw}\" is not a socket address"))?;
                opts.api_bind = Some(addr);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if opts.config.is_some() && opts.preset.is_some() {
        return Err(
            "arguments `--config` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    Ok(opts)
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("dr-coordinator: demand-response event coordinator");
    eprintln!();
    eprintln!("Usage: dr-coordinator [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load configuration from a TOML file");
    eprintln!("  --preset <name>          Use a built-in preset (baseline, back_to_back, faulty_gateway)");
    eprintln!("  --status-out <path>      Export status history to CSV on exit");
    eprintln!("  --duration-secs <u64>    Override the run length");
    eprintln!("  --seed <u64>             Override the simulation seed");
    eprintln!("  --log-level <filter>     Log filter (default: info, or RUST_LOG)");
    #[cfg(feature = "api")]
    eprintln!("  --api-bind <addr>        Serve the status API on host:port");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the baseline preset is used.");
}
