use std::io::{self, Write};

use env_logger::fmt::Formatter;
use log::{Level, LevelFilter, Record};

/// Overrides the `-v`/`-q` level with an env_logger filter string.
pub const ENV_VAR_LOG: &str = "FREEZEOMATIC_LOG";

pub fn init(level: LevelFilter) {
    env_logger::Builder::new()
        .format(format)
        .filter_level(level)
        .parse_env(ENV_VAR_LOG)
        .init();
}

pub fn level_from_args(verbose: u8, quiet: u8) -> LevelFilter {
    let verbosity = i16::from(verbose) - i16::from(quiet);
    match verbosity {
        i16::MIN..=-2 => LevelFilter::Error,
        -1 => LevelFilter::Warn,
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn format(f: &mut Formatter, record: &Record) -> io::Result<()> {
    let args = record.args();
    let level = record.level();
    if let Some(prefix) = level_prefix(level) {
        let style = f.default_level_style(level);
        writeln!(f, "{style}{prefix}{style:#}{args}")
    } else {
        writeln!(f, "{args}")
    }
}

fn level_prefix(level: Level) -> Option<&'static str> {
    match level {
        Level::Debug | Level::Trace | Level::Info => None,
        Level::Warn => Some("warning: "),
        Level::Error => Some("error: "),
    }
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;

    use super::level_from_args;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_from_args(0, 0), LevelFilter::Info);
        assert_eq!(level_from_args(1, 0), LevelFilter::Debug);
        assert_eq!(level_from_args(5, 0), LevelFilter::Trace);
        assert_eq!(level_from_args(0, 1), LevelFilter::Warn);
        assert_eq!(level_from_args(0, 9), LevelFilter::Error);
    }
}
