use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::{fmt, sync::Arc};

/// Logging handle handed to every component at construction time.
///
/// Components never touch the global `log` logger, so a library user decides
/// where records go (or that they go nowhere) per component.
#[derive(Clone)]
pub struct Logger(Arc<dyn Log>);

impl Logger {
    pub fn new(log: impl Log + 'static) -> Self {
        Self(Arc::new(log))
    }

    /// Discards every record.
    pub fn silent() -> Self {
        Self::new(Silent)
    }

    /// Colored logger writing to stderr.
    pub fn terminal(level: LevelFilter) -> Self {
        Self::new(Terminal { level })
    }

    #[doc(hidden)]
    pub fn emit(
        &self,
        level: Level,
        target: &str,
        file: &'static str,
        line: u32,
        args: fmt::Arguments<'_>,
    ) {
        let metadata = Metadata::builder().level(level).target(target).build();

        if self.0.enabled(&metadata) {
            self.0.log(
                &Record::builder()
                    .metadata(metadata)
                    .args(args)
                    .file_static(Some(file))
                    .line(Some(line))
                    .build(),
            );
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Logger")
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::silent()
    }
}

macro_rules! emit {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.emit($level, module_path!(), file!(), line!(), format_args!($($arg)+))
    };
}

macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => { $crate::logger::emit!($logger, log::Level::Debug, $($arg)+) };
}

macro_rules! info {
    ($logger:expr, $($arg:tt)+) => { $crate::logger::emit!($logger, log::Level::Info, $($arg)+) };
}

macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => { $crate::logger::emit!($logger, log::Level::Warn, $($arg)+) };
}

pub(crate) use {debug, emit, info, warning};

struct Silent;

impl Log for Silent {
    fn enabled(&self, _: &Metadata) -> bool {
        false
    }

    fn log(&self, _: &Record) {}

    fn flush(&self) {}
}

struct Terminal {
    level: LevelFilter,
}

impl Log for Terminal {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        match self.level {
            LevelFilter::Off => (),
            LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => match record.level() {
                Level::Info => eprintln!("{}", record.args()),
                _ => eprintln!("{} {}", label(record.level()), record.args()),
            },
            LevelFilter::Debug | LevelFilter::Trace => {
                let location = match (record.file(), record.line()) {
                    (Some(file), Some(line)) => format!("[{}:{}]", file, line).dimmed(),
                    _ => "[unk]".dimmed(),
                };

                eprintln!(
                    "{} {} {} {}",
                    label(record.level()),
                    record.target().dimmed(),
                    location,
                    record.args()
                );
            }
        }
    }

    fn flush(&self) {}
}

fn label(level: Level) -> ColoredString {
    match level {
        Level::Debug => "[DEBUG]".bold().blue(),
        Level::Error => "[ERROR]".bold().red(),
        Level::Info => "[INFO]".bold().green(),
        Level::Trace => "[TRACE]".bold().purple(),
        Level::Warn => "[WARN]".bold().yellow(),
    }
}
