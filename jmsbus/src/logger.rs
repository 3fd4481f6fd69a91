use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};

use anyhow::{anyhow, Result};
use slog::{o, Drain, Logger};

use jmsbus_conf::logging::{Level, To};
use jmsbus_conf::Settings;

/// Routes `log` records into a slog logger built from the `[log]` section
/// of the settings.
pub fn logger_init(settings: &Settings) -> Result<()> {
    let log = &settings.log;
    let logger = config_logger(log.filename(), log.to, log.level);
    log::set_boxed_logger(Box::new(LoggerEx(logger))).map_err(|e| anyhow!("logger already set, {e}"))?;
    log::set_max_level(slog_log_to_level(log.level.inner()).to_level_filter());
    Ok(())
}

struct LoggerEx(Logger);

impl log::Log for LoggerEx {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, r: &log::Record) {
        let level = log_to_slog_level(r.metadata().level());
        let location = &record_as_location(r);
        let s = slog::RecordStatic { location, level, tag: r.target() };
        self.0.log(&slog::Record::new(&s, r.args(), slog::b!()))
    }

    fn flush(&self) {}
}

fn log_to_slog_level(level: log::Level) -> slog::Level {
    match level {
        log::Level::Trace => slog::Level::Trace,
        log::Level::Debug => slog::Level::Debug,
        log::Level::Info => slog::Level::Info,
        log::Level::Warn => slog::Level::Warning,
        log::Level::Error => slog::Level::Error,
    }
}

fn slog_log_to_level(level: slog::Level) -> log::Level {
    match level {
        slog::Level::Trace => log::Level::Trace,
        slog::Level::Debug => log::Level::Debug,
        slog::Level::Info => log::Level::Info,
        slog::Level::Warning => log::Level::Warn,
        slog::Level::Error | slog::Level::Critical => log::Level::Error,
    }
}

fn record_as_location(r: &log::Record) -> slog::RecordLocation {
    let module = r.module_path_static().unwrap_or("<unknown>");
    let file = r.file_static().unwrap_or("<unknown>");
    let line = r.line().unwrap_or_default();
    slog::RecordLocation { file, line, column: 0, function: "", module }
}

pub fn config_logger(filename: String, to: To, level: Level) -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(WriteFilter::new(filename, to));
    let drain = slog_term::FullFormat::new(decorator)
        .use_custom_timestamp(|io: &mut dyn io::Write| {
            write!(io, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        })
        .use_original_order()
        .build()
        .fuse();

    let drain = LevelFilter { drain, level: level.inner() }.fuse();

    let drain = slog_async::Async::new(drain)
        .chan_size(4096 * 4)
        .overflow_strategy(slog_async::OverflowStrategy::DropAndReport)
        .build()
        .fuse();

    Logger::root(drain, o!())
}

struct LevelFilter<D> {
    drain: D,
    level: slog::Level,
}

impl<D: Drain> Drain for LevelFilter<D> {
    type Ok = Option<D::Ok>;
    type Err = Option<D::Err>;

    fn log(&self, record: &slog::Record, values: &slog::OwnedKVList) -> std::result::Result<Self::Ok, Self::Err> {
        if record.level().is_at_least(self.level) {
            self.drain.log(record, values).map(Some).map_err(Some)
        } else {
            Ok(None)
        }
    }
}

struct WriteFilter {
    filename: String,
    to: To,
    file: Option<File>,
    console: Stdout,
}

impl WriteFilter {
    fn new(filename: String, to: To) -> Self {
        Self { filename, to, file: None, console: io::stdout() }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            self.file = Some(open_file(&self.filename)?);
        }
        self.file.as_mut().ok_or_else(|| io::Error::other("log file unavailable"))
    }
}

impl io::Write for WriteFilter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.to {
            To::Console => self.console.write(buf),
            To::File => self.file()?.write(buf),
            To::Both => {
                let _ = self.console.write(buf)?;
                self.file()?.write(buf)
            }
            To::Off => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.to {
            To::Console => self.console.flush(),
            To::File => self.file()?.flush(),
            To::Both => {
                self.console.flush()?;
                self.file()?.flush()
            }
            To::Off => Ok(()),
        }
    }
}

fn open_file(filename: &str) -> io::Result<File> {
    if filename.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "no log file configured"));
    }
    OpenOptions::new().create(true).append(true).open(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(log_to_slog_level(log::Level::Warn), slog::Level::Warning);
        assert_eq!(slog_log_to_level(slog::Level::Critical), log::Level::Error);
        for l in [log::Level::Trace, log::Level::Debug, log::Level::Info, log::Level::Warn, log::Level::Error] {
            assert_eq!(slog_log_to_level(log_to_slog_level(l)), l);
        }
    }

    #[test]
    fn test_write_filter_file() {
        let path = std::env::temp_dir().join(format!("jmsbus-logger-test-{}.log", std::process::id()));
        let mut w = WriteFilter::new(path.to_string_lossy().into_owned(), To::File);
        w.write_all(b"line one\n").unwrap();
        w.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\n");
        let _ = std::fs::remove_file(&path);

        let mut off = WriteFilter::new(String::new(), To::Off);
        assert_eq!(off.write(b"dropped").unwrap(), 7);
        let mut missing = WriteFilter::new(String::new(), To::File);
        assert!(missing.write(b"x").is_err());
    }
}
