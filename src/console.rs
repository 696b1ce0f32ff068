//! Console logger writing log records to standard error.

use log::{LevelFilter, SetLoggerError};
use spin::Once;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Console {
    lines: AtomicU64,
}

static DEFAULT: Once<Console> = Once::new();

impl Console {
    /// Installs the console as the global logger at `level`
    pub fn init(level: LevelFilter) -> Result<&'static Self, SetLoggerError> {
        let console = Self::default();
        console.install(level)?;
        Ok(console)
    }

    pub fn default() -> &'static Self {
        DEFAULT.call_once(|| Console {
            lines: AtomicU64::new(0),
        })
    }

    pub fn install(&'static self, level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(level);
        Ok(())
    }

    /// Number of records written so far
    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }
}

impl log::Log for Console {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        if write_log_entry_to(&mut stderr, record).is_ok() {
            self.lines.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn write_log_entry_to(writer: &mut impl Write, record: &log::Record) -> std::io::Result<()> {
    #[cfg(debug_assertions)]
    return writeln!(
        writer,
        "[{} {}:{} {}] {}",
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.target(),
        record.args()
    );
    #[cfg(not(debug_assertions))]
    return writeln!(writer, "[{:5}] {}", record.level(), record.args());
}
