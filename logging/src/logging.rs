use colored::*;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Colored stderr backend for the `log` macros.
#[derive(Clone, Copy)]
pub struct Logger {
    level: LevelFilter,
    debug: bool,
}

/// Maps the command line switches to a filter.
///
/// # Arguments
///
/// * `verbosity` - How often `-v` was given
/// * `quiet` - Only errors are printed, whatever the verbosity
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl Logger {
    pub fn new(level: LevelFilter) -> Logger {
        Logger {
            level,
            debug: level >= LevelFilter::Debug,
        }
    }

    /// Installs the logger as the global `log` backend.
    pub fn init(self) -> Result<(), SetLoggerError> {
        log::set_max_level(self.level);
        log::set_boxed_logger(Box::new(self))
    }

    /// Applies the formatting to the string based on the level
    fn apply_level(&self, string: &str, level: Level) -> ColoredString {
        match level {
            Level::Info => ("info: ".to_owned() + string).bright_cyan(),
            Level::Warn => ("warning: ".to_owned() + string).bright_yellow(),
            Level::Error => ("error: ".to_owned() + string).bright_red(),
            Level::Debug => ("debug: ".to_owned() + string).dimmed(),
            Level::Trace => ("trace: ".to_owned() + string).dimmed().italic(),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = if self.debug {
            format!("[{}] {}", record.target(), record.args())
        } else {
            record.args().to_string()
        };
        eprintln!("{}", self.apply_level(&message, record.level()));
    }

    fn flush(&self) {}
}
