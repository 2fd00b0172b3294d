//! Logger implementation

use {
    log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError},
    std::io::{self, Write},
};

static LOGGER: Logger = Logger;

/// Install the logger, printing records at or above `level` to standard error
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _ = writeln!(
            io::stderr().lock(),
            "{} {}: {}",
            format_level(record.level()),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn format_level(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[0;35mTRACE\x1b[0m",
        Level::Debug => "\x1b[0;34mDEBUG\x1b[0m",
        Level::Info => "\x1b[0;32mINFO \x1b[0m",
        Level::Warn => "\x1b[0;33mWARN \x1b[0m",
        Level::Error => "\x1b[0;31mERROR\x1b[0m",
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{format_level, init},
        log::{Level, LevelFilter},
    };

    #[test]
    fn levels_are_padded_to_equal_width() {
        let widths: Vec<_> = [Level::Trace, Level::Debug, Level::Info, Level::Warn, Level::Error]
            .iter()
            .map(|level| format_level(*level).len())
            .collect();

        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn logger_is_installed_once() {
        let _ = init(LevelFilter::Debug);

        assert!(init(LevelFilter::Trace).is_err());
    }
}
