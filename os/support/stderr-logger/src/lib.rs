//! A minimal [`log`] backend writing `[LEVEL] target: message` lines to stderr.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::{self, Write};

pub struct StderrLogger {
    max_level: LevelFilter,
}

impl StderrLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// `Warn` by default, one more level per `-v`.
    #[must_use]
    pub const fn from_verbosity(verbosity: u8) -> Self {
        Self::new(match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Install as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// If a logger was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }

    /// Write one formatted record to `out`.
    ///
    /// # Errors
    /// The error of the underlying writer.
    pub fn write_record<W: Write>(&self, out: &mut W, record: &Record) -> io::Result<()> {
        writeln!(
            out,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // A logger has nowhere to report its own failures.
        let _ = self.write_record(&mut io::stderr().lock(), record);
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn render(logger: &StderrLogger, level: Level, target: &str, message: &str) -> String {
        let mut out = Vec::new();
        logger
            .write_record(
                &mut out,
                &Record::builder()
                    .level(level)
                    .target(target)
                    .args(format_args!("{message}"))
                    .build(),
            )
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn format() {
        let logger = StderrLogger::new(LevelFilter::Trace);
        assert_eq!(
            render(&logger, Level::Info, "memory_dma::allocator", "allocated"),
            "[INFO] memory_dma::allocator: allocated\n"
        );
    }

    #[test]
    fn filters_by_level() {
        let logger = StderrLogger::new(LevelFilter::Info);
        let meta = |level| Metadata::builder().level(level).target("t").build();
        assert!(logger.enabled(&meta(Level::Error)));
        assert!(logger.enabled(&meta(Level::Info)));
        assert!(!logger.enabled(&meta(Level::Debug)));
    }

    #[test]
    fn verbosity() {
        assert_eq!(StderrLogger::from_verbosity(0).max_level(), LevelFilter::Warn);
        assert_eq!(StderrLogger::from_verbosity(2).max_level(), LevelFilter::Debug);
        assert_eq!(StderrLogger::from_verbosity(9).max_level(), LevelFilter::Trace);
    }
}
