mod freeze;
mod parse;
mod status;
mod storage;

use std::{ops::RangeInclusive, path::PathBuf, process::ExitCode, time::Duration};

use clap::{
    builder::{styling::AnsiColor, Styles},
    ArgAction, Args, Parser, Subcommand,
};
use humantime::parse_duration;
use log::{error, info};

use crate::{archive::DEFAULT_COMPRESSION_LEVEL, logger};

use self::parse::parse_range_inclusive;

const COMPRESSION_LEVEL_RANGE: RangeInclusive<u32> = 1..=9;

const JOB_COUNT_RANGE: RangeInclusive<usize> = 1..=64;
const DEFAULT_JOB_COUNT: usize = 1;

fn parse_compression_level(s: &str) -> Result<u32, String> {
    parse_range_inclusive(s, COMPRESSION_LEVEL_RANGE)
}

fn parse_job_count(s: &str) -> Result<usize, String> {
    parse_range_inclusive(s, JOB_COUNT_RANGE)
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, propagate_version = true, styles = cli_styles())]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload every manifest entry that is not frozen yet
    Freeze(FreezeArgs),
    /// Show the lock state of every manifest entry
    Status(StatusArgs),
}

impl Command {
    fn global(&self) -> &GlobalArgs {
        match self {
            Command::Freeze(args) => &args.global,
            Command::Status(args) => &args.global,
        }
    }
}

#[derive(Args, Debug)]
pub struct FreezeArgs {
    /// S3 bucket to upload into
    #[arg(short, long, value_name = "NAME", conflicts_with = "local")]
    pub bucket: Option<String>,

    /// Local directory to copy into instead of S3
    #[arg(long, value_name = "DIR")]
    pub local: Option<PathBuf>,

    /// Artificial delay per upload (local storage only)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub latency: Option<Duration>,

    /// Number of entries to upload at once
    #[arg(
        short = 'j',
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_JOB_COUNT,
        value_parser = parse_job_count,
    )]
    pub jobs: usize,

    /// Directory to build directory archives in [default: system temp dir]
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Gzip compression level for directory archives (1-9)
    #[arg(
        short = 'l',
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_COMPRESSION_LEVEL,
        value_parser = parse_compression_level,
    )]
    pub compression_level: u32,

    /// Show what would be uploaded without uploading anything
    #[arg(short = 'n', long, default_value_t = false)]
    pub dry_run: bool,

    /// Print transfer statistics when finished
    #[arg(long, default_value_t = false)]
    pub stats: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Manifest listing what to freeze
    #[arg(short, long, value_name = "PATH")]
    pub manifest: PathBuf,

    #[arg(short, long, action = ArgAction::Count, group = "verbosity")]
    pub verbose: u8,

    #[arg(short, long, action = ArgAction::Count, group = "verbosity")]
    pub quiet: u8,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.command.global());

    let result = match cli.command {
        Command::Freeze(args) => freeze::main(args).await,
        Command::Status(args) => status::main(args).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(args: &GlobalArgs) {
    let level = logger::level_from_args(args.verbose, args.quiet);
    logger::init(level);
}

fn print_stat<T: std::fmt::Display>(name: &str, value: T) {
    let style = AnsiColor::Green.on_default();
    info!("{style}{name}:{style:#} {value}");
}

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightMagenta.on_default())
        .usage(AnsiColor::BrightMagenta.on_default())
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightCyan.on_default())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn freeze_defaults() {
        let cli = Cli::try_parse_from(["freezeomatic", "freeze", "-m", "m.csv", "-b", "bucket"])
            .unwrap();
        let Command::Freeze(args) = cli.command else {
            panic!("expected freeze");
        };
        assert_eq!(args.jobs, 1);
        assert_eq!(args.compression_level, 6);
        assert_eq!(args.bucket.as_deref(), Some("bucket"));
        assert!(!args.dry_run);
    }

    #[test]
    fn bucket_and_local_conflict() {
        let result = Cli::try_parse_from([
            "freezeomatic",
            "freeze",
            "-m",
            "m.csv",
            "--bucket",
            "b",
            "--local",
            "/tmp/x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn job_count_is_bounded() {
        let result =
            Cli::try_parse_from(["freezeomatic", "freeze", "-m", "m.csv", "-j", "0"]);
        assert!(result.is_err());
    }
}
