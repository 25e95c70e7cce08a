//! Layered logger writing to the console, a log file and per-command log files.
//!
//! A [`Logger`] owns one [`Handler`] per destination. Every handler has its own level,
//! format and sink, and all of them share the logger name: the active subcommand path
//! joined with `-`.

use std::backtrace::Backtrace;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use anstyle::{AnsiColor, Reset, Style};
use chrono::{Local, NaiveDateTime};
use log::{Log, Metadata, Record};
use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;

use crate::parser::ParsedArgs;

pub const DEFAULT_FORMAT: &str = "%(asctime)s %(levelname)s: %(message)s";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("unable to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write log record: {0}")]
    Write(#[from] io::Error),
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),
    #[error("{0}")]
    Configuration(String),
}

/// Severity of a record, from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Trace = 1,
    Debug,
    Info,
    Warn,
    Ok,
    Error,
    Critical,
}

impl Level {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARNING",
            Level::Ok => "OK",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    fn index(self) -> usize {
        self as usize - 1
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug => Level::Debug,
            log::Level::Trace => Level::Trace,
        }
    }
}

/// Minimum level a handler emits; `None` emits nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LevelFilter {
    Trace = 1,
    Debug,
    Info,
    Warn,
    Ok,
    Error,
    Critical,
    None,
}

impl LevelFilter {
    #[must_use]
    pub fn allows(self, level: Level) -> bool {
        level as u8 >= self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LevelFilter::Trace,
            2 => LevelFilter::Debug,
            3 => LevelFilter::Info,
            4 => LevelFilter::Warn,
            5 => LevelFilter::Ok,
            6 => LevelFilter::Error,
            7 => LevelFilter::Critical,
            _ => LevelFilter::None,
        }
    }

    fn to_log(self) -> log::LevelFilter {
        match self {
            LevelFilter::Trace => log::LevelFilter::Trace,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Warn | LevelFilter::Ok => log::LevelFilter::Warn,
            LevelFilter::Error | LevelFilter::Critical => log::LevelFilter::Error,
            LevelFilter::None => log::LevelFilter::Off,
        }
    }
}

impl FromStr for LevelFilter {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" | "verbose" => Ok(LevelFilter::Trace),
            "debug" => Ok(LevelFilter::Debug),
            "info" => Ok(LevelFilter::Info),
            "warn" | "warning" => Ok(LevelFilter::Warn),
            "ok" => Ok(LevelFilter::Ok),
            "error" => Ok(LevelFilter::Error),
            "critical" => Ok(LevelFilter::Critical),
            "none" => Ok(LevelFilter::None),
            _ => Err(LogError::InvalidLevel(s.to_string())),
        }
    }
}

/// Level filter that can be changed through a shared reference
#[derive(Debug)]
struct LevelCell(AtomicU8);

impl LevelCell {
    fn new(filter: LevelFilter) -> Self {
        Self(AtomicU8::new(filter as u8))
    }

    fn get(&self) -> LevelFilter {
        LevelFilter::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, filter: LevelFilter) {
        self.0.store(filter as u8, Ordering::Relaxed);
    }
}

/// One record as seen by formats
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    pub level: Level,
    pub name: &'a str,
    pub message: &'a str,
    pub time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    AscTime,
    LevelName,
    Name,
    Message,
    Process,
}

/// Record layout using `%(field)s` placeholders.
///
/// Known fields are `asctime`, `levelname`, `name`, `message` and `process`; `%%` is a
/// literal percent sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pieces: Vec<Piece>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            pieces: vec![
                Piece::AscTime,
                Piece::Text(" ".to_string()),
                Piece::LevelName,
                Piece::Text(": ".to_string()),
                Piece::Message,
            ],
        }
    }
}

impl Format {
    /// # Errors
    ///
    /// Returns `LogError::Configuration` for an unknown placeholder.
    pub fn parse(template: &str) -> Result<Self, LogError> {
        let placeholder = Regex::new(r"%\((\w+)\)[sd]|%%")
            .map_err(|e| LogError::Configuration(e.to_string()))?;

        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut last = 0;
        for captures in placeholder.captures_iter(template) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            text.push_str(&template[last..whole.start()]);
            last = whole.end();

            let Some(field) = captures.get(1) else {
                text.push('%');
                continue;
            };
            let piece = match field.as_str() {
                "asctime" => Piece::AscTime,
                "levelname" => Piece::LevelName,
                "name" => Piece::Name,
                "message" => Piece::Message,
                "process" => Piece::Process,
                other => {
                    return Err(LogError::Configuration(format!(
                        "unknown log format field `{other}` in `{template}`"
                    )));
                }
            };
            if !text.is_empty() {
                pieces.push(Piece::Text(std::mem::take(&mut text)));
            }
            pieces.push(piece);
        }
        text.push_str(&template[last..]);
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Ok(Self { pieces })
    }

    #[must_use]
    pub fn render(&self, record: &LogRecord<'_>) -> String {
        let mut line = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => line.push_str(text),
                Piece::AscTime => {
                    line.push_str(&record.time.format("%Y-%m-%d %H:%M:%S,%3f").to_string());
                }
                Piece::LevelName => line.push_str(record.level.name()),
                Piece::Name => line.push_str(record.name),
                Piece::Message => line.push_str(record.message),
                Piece::Process => line.push_str(&std::process::id().to_string()),
            }
        }
        line
    }
}

/// Console style for each level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorScheme {
    styles: [Style; 7],
}

impl Default for ColorScheme {
    fn default() -> Self {
        let fg = |color: AnsiColor| Style::new().fg_color(Some(color.into()));
        Self {
            styles: [
                Style::new().dimmed(),
                fg(AnsiColor::Cyan),
                Style::new(),
                fg(AnsiColor::Yellow),
                fg(AnsiColor::Green),
                fg(AnsiColor::Red),
                fg(AnsiColor::Red).bold(),
            ],
        }
    }
}

impl ColorScheme {
    #[must_use]
    pub fn with(mut self, level: Level, style: Style) -> Self {
        self.styles[level.index()] = style;
        self
    }

    #[must_use]
    pub fn style(&self, level: Level) -> Style {
        self.styles[level.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Console,
    File(PathBuf),
}

/// A single log destination
pub struct Handler {
    destination: Destination,
    level: LevelCell,
    format: Format,
    colors: Option<ColorScheme>,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("destination", &self.destination)
            .field("level", &self.level.get())
            .field("format", &self.format)
            .field("colors", &self.colors)
            .finish_non_exhaustive()
    }
}

impl Handler {
    #[must_use]
    pub fn new(destination: Destination, sink: Box<dyn Write + Send>, level: LevelFilter, format: Format) -> Self {
        Self {
            destination,
            level: LevelCell::new(level),
            format,
            colors: None,
            sink: Mutex::new(sink),
        }
    }

    #[must_use]
    pub fn console(level: LevelFilter, format: Format, colors: Option<ColorScheme>) -> Self {
        let mut handler = Self::new(Destination::Console, Box::new(io::stderr()), level, format);
        handler.colors = colors;
        handler
    }

    /// Handler appending to `path`, which is created if missing.
    ///
    /// # Errors
    ///
    /// Returns `LogError::OpenFile` if the file cannot be opened.
    pub fn file(path: &Path, level: LevelFilter, format: Format) -> Result<Self, LogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LogError::OpenFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(Destination::File(path.to_path_buf()), Box::new(file), level, format))
    }

    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level.get()
    }

    pub fn set_level(&self, level: LevelFilter) {
        self.level.set(level);
    }

    fn emit(&self, record: &LogRecord<'_>) -> io::Result<()> {
        if !self.level.get().allows(record.level) {
            return Ok(());
        }
        let line = self.format.render(record);
        let mut sink = self.sink.lock();
        match &self.colors {
            Some(colors) => {
                let style = colors.style(record.level);
                writeln!(sink, "{style}{line}{Reset}")?;
            }
            None => writeln!(sink, "{line}")?,
        }
        sink.flush()
    }
}

/// Silences every non-console handler until dropped, then restores their levels
struct MuteGuard<'a> {
    muted: Vec<(&'a Handler, LevelFilter)>,
}

impl<'a> MuteGuard<'a> {
    fn new(handlers: &'a [Handler]) -> Self {
        let muted = handlers
            .iter()
            .filter(|handler| handler.destination != Destination::Console)
            .map(|handler| {
                let level = handler.level();
                handler.set_level(LevelFilter::None);
                (handler, level)
            })
            .collect();
        Self { muted }
    }
}

impl Drop for MuteGuard<'_> {
    fn drop(&mut self) {
        for (handler, level) in &self.muted {
            handler.set_level(*level);
        }
    }
}

/// Per-call options of the leveled logging methods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Terminate the process with this code once the record is written
    pub exit: Option<i32>,
    /// Only write to the console
    pub confidential: bool,
    /// Print a backtrace to stderr after the record
    pub stack: bool,
}

impl LogOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn exit_with(mut self, code: i32) -> Self {
        self.exit = Some(code);
        self
    }

    #[must_use]
    pub fn confidential(mut self) -> Self {
        self.confidential = true;
        self
    }

    #[must_use]
    pub fn stack(mut self) -> Self {
        self.stack = true;
        self
    }
}

/// Logging settings, usually built from parsed arguments with [`LogConfig::from_args`]
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Active subcommand path
    pub commands: Vec<String>,
    pub loglevel: LevelFilter,
    pub logformat: String,
    pub colors: Option<ColorScheme>,
    pub logfile: Option<PathBuf>,
    pub logfile_level: LevelFilter,
    pub logfile_format: String,
    pub logdir: Option<PathBuf>,
    /// One file per execution instead of one file per command
    pub logdir_per_exec: bool,
    pub logdir_level: LevelFilter,
    pub logdir_format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            loglevel: LevelFilter::Info,
            logformat: DEFAULT_FORMAT.to_string(),
            colors: None,
            logfile: None,
            logfile_level: LevelFilter::Info,
            logfile_format: DEFAULT_FORMAT.to_string(),
            logdir: None,
            logdir_per_exec: false,
            logdir_level: LevelFilter::Info,
            logdir_format: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl LogConfig {
    /// Take each setting from `args` when given on the command line, else from `defaults`.
    ///
    /// # Errors
    ///
    /// Returns `LogError::InvalidLevel` for an unknown level name.
    pub fn from_args(args: &ParsedArgs, defaults: LogConfig) -> Result<Self, LogError> {
        let level = |key: &str, default: LevelFilter| {
            args.get_str(key)
                .map(str::parse::<LevelFilter>)
                .transpose()
                .map(|level| level.unwrap_or(default))
        };
        let text = |key: &str, default: String| args.get_str(key).map_or(default, str::to_string);
        let path = |key: &str, default: Option<PathBuf>| args.get_str(key).map(PathBuf::from).or(default);

        Ok(Self {
            commands: args.commands.clone(),
            loglevel: level("loglevel", defaults.loglevel)?,
            logformat: text("logformat", defaults.logformat),
            colors: defaults.colors,
            logfile: path("logfile", defaults.logfile),
            logfile_level: level("logfile_level", defaults.logfile_level)?,
            logfile_format: text("logfile_format", defaults.logfile_format),
            logdir: path("logdir", defaults.logdir),
            logdir_per_exec: args.get_bool("logdir_per_exec").unwrap_or(false) || defaults.logdir_per_exec,
            logdir_level: level("logdir_level", defaults.logdir_level)?,
            logdir_format: text("logdir_format", defaults.logdir_format),
        })
    }
}

/// Path of the per-command log file.
///
/// Per execution: `logdir/<cmd>/.../<YYYYMMDDHHMM>.log`. Per command:
/// `logdir/<cmd>/.../<leaf>.log`, which needs at least one subcommand.
///
/// # Errors
///
/// Returns `LogError::Configuration` in per-command mode without subcommands.
pub fn command_log_path(
    logdir: &Path,
    commands: &[String],
    per_exec: bool,
    now: NaiveDateTime,
) -> Result<PathBuf, LogError> {
    if per_exec {
        let mut path: PathBuf = commands.iter().fold(logdir.to_path_buf(), |path, c| path.join(c));
        path.push(format!("{}.log", now.format("%Y%m%d%H%M")));
        return Ok(path);
    }
    let Some((leaf, parents)) = commands.split_last() else {
        return Err(LogError::Configuration(
            "program has no subcommands and can't use a per-command log directory".to_string(),
        ));
    };
    let mut path: PathBuf = parents.iter().fold(logdir.to_path_buf(), |path, c| path.join(c));
    path.push(format!("{leaf}.log"));
    Ok(path)
}

/// Create `path` and its missing parents, giving each created directory mode `0o770`.
///
/// # Errors
///
/// Returns `LogError::CreateDir` if a directory cannot be created.
pub fn create_log_dir(path: &Path) -> Result<(), LogError> {
    let create_error = |source: io::Error| LogError::CreateDir {
        path: path.to_path_buf(),
        source,
    };
    if path.is_dir() {
        return Ok(());
    }

    #[cfg(unix)]
    let missing: Vec<PathBuf> = path
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .map(Path::to_path_buf)
        .collect();

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o770);
    }
    builder.create(path).map_err(create_error)?;

    // The umask may have stripped group bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for dir in missing {
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o770)).map_err(create_error)?;
        }
    }
    Ok(())
}

struct Inner {
    name: String,
    handlers: Vec<Handler>,
}

/// Handle to the layered logger; clones share the same handlers
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("handlers", &self.inner.handlers)
            .finish()
    }
}

impl Logger {
    #[must_use]
    pub fn new(name: impl Into<String>, handlers: Vec<Handler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                handlers,
            }),
        }
    }

    /// Build the console, log file and per-command handlers described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `LogError` for an invalid format, a log directory that cannot be created,
    /// a log file that cannot be opened, or a per-command log directory requested
    /// without any subcommand.
    pub fn init(config: &LogConfig) -> Result<Self, LogError> {
        let mut handlers = Vec::new();
        if config.loglevel != LevelFilter::None {
            handlers.push(Handler::console(
                config.loglevel,
                Format::parse(&config.logformat)?,
                config.colors,
            ));
        }
        if let Some(logfile) = &config.logfile {
            handlers.push(Handler::file(
                logfile,
                config.logfile_level,
                Format::parse(&config.logfile_format)?,
            )?);
        }
        if let Some(logdir) = &config.logdir {
            let path = command_log_path(
                logdir,
                &config.commands,
                config.logdir_per_exec,
                Local::now().naive_local(),
            )?;
            if let Some(parent) = path.parent() {
                create_log_dir(parent)?;
            }
            handlers.push(Handler::file(
                &path,
                config.logdir_level,
                Format::parse(&config.logdir_format)?,
            )?);
        }
        Ok(Self::new(config.commands.join("-"), handlers))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn handlers(&self) -> &[Handler] {
        &self.inner.handlers
    }

    /// Most verbose level any handler emits
    #[must_use]
    pub fn max_level(&self) -> LevelFilter {
        self.inner
            .handlers
            .iter()
            .map(Handler::level)
            .min()
            .unwrap_or(LevelFilter::None)
    }

    /// Install as the global `log` backend.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Configuration` if a backend is already installed.
    pub fn install(&self) -> Result<(), LogError> {
        log::set_boxed_logger(Box::new(self.clone()))
            .map_err(|e| LogError::Configuration(e.to_string()))?;
        log::set_max_level(self.max_level().to_log());
        Ok(())
    }

    /// Write `message` to every handler accepting `level`.
    ///
    /// Handler levels are restored after a confidential call whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the first `LogError::Write` met; the remaining handlers are still written.
    pub fn log(&self, level: Level, message: impl fmt::Display, options: LogOptions) -> Result<(), LogError> {
        let message = message.to_string();
        let record = LogRecord {
            level,
            name: &self.inner.name,
            message: &message,
            time: Local::now().naive_local(),
        };

        let guard = options.confidential.then(|| MuteGuard::new(&self.inner.handlers));
        let mut result = Ok(());
        for handler in &self.inner.handlers {
            if let Err(e) = handler.emit(&record)
                && result.is_ok()
            {
                result = Err(LogError::Write(e));
            }
        }
        drop(guard);

        if options.stack {
            eprintln!("{}", Backtrace::force_capture());
        }
        if let Some(code) = options.exit {
            std::process::exit(code);
        }
        result
    }

    fn log_or_report(&self, level: Level, message: impl fmt::Display, options: LogOptions) {
        if let Err(e) = self.log(level, message, options) {
            eprintln!("Error: {e}");
        }
    }

    pub fn trace(&self, message: impl fmt::Display, options: LogOptions) {
        self.log_or_report(Level::Trace, message, options);
    }

    pub fn debug(&self, message: impl fmt::Display, options: LogOptions) {
        self.log_or_report(Level::Debug, message, options);
    }

    pub fn info(&self, message: impl fmt::Display, options: LogOptions) {
        self.log_or_report(Level::Info, message, options);
    }

    pub fn warn(&self, message: impl fmt::Display, options: LogOptions) {
        self.log_or_report(Level::Warn, message, options);
    }

    pub fn ok(&self, message: impl fmt::Display, options: LogOptions) {
        self.log_or_report(Level::Ok, message, options);
    }

    pub fn error(&self, message: impl fmt::Display, options: LogOptions) {
        self.log_or_report(Level::Error, message, options);
    }

    pub fn critical(&self, message: impl fmt::Display, options: LogOptions) {
        self.log_or_report(Level::Critical, message, options);
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let level = Level::from(metadata.level());
        self.inner.handlers.iter().any(|handler| handler.level().allows(level))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = Logger::log(self, record.level().into(), record.args(), LogOptions::default());
    }

    fn flush(&self) {
        for handler in &self.inner.handlers {
            let _ = handler.sink.lock().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ConfigNode;
    use chrono::NaiveDate;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn message_only() -> Format {
        Format::parse("%(levelname)s %(message)s").unwrap()
    }

    fn time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15)
            .unwrap()
            .and_hms_milli_opt(9, 30, 5, 42)
            .unwrap()
    }

    #[test]
    fn test_level_names() {
        assert_eq!("verbose".parse::<LevelFilter>().unwrap(), LevelFilter::Trace);
        assert_eq!("WARNING".parse::<LevelFilter>().unwrap(), LevelFilter::Warn);
        assert_eq!("none".parse::<LevelFilter>().unwrap(), LevelFilter::None);
        assert!(matches!(
            "loud".parse::<LevelFilter>(),
            Err(LogError::InvalidLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn test_level_filter_ordering() {
        assert!(LevelFilter::Warn.allows(Level::Ok));
        assert!(LevelFilter::Ok.allows(Level::Error));
        assert!(!LevelFilter::Ok.allows(Level::Warn));
        assert!(!LevelFilter::None.allows(Level::Critical));
    }

    #[test]
    fn test_format_render() {
        let record = LogRecord {
            level: Level::Warn,
            name: "deploy-app",
            message: "disk at 95%",
            time: time(),
        };
        let format = Format::parse("%(asctime)s [%(name)s] %(levelname)s: %(message)s 100%%").unwrap();
        assert_eq!(
            format.render(&record),
            "2026-10-15 09:30:05,042 [deploy-app] WARNING: disk at 95% 100%"
        );
        assert_eq!(Format::parse(DEFAULT_FORMAT).unwrap(), Format::default());
    }

    #[test]
    fn test_format_rejects_unknown_field() {
        assert!(matches!(
            Format::parse("%(lineno)d %(message)s"),
            Err(LogError::Configuration(_))
        ));
    }

    #[test]
    fn test_handlers_filter_by_level() {
        let console = SharedBuffer::default();
        let file = SharedBuffer::default();
        let logger = Logger::new(
            "run",
            vec![
                Handler::new(Destination::Console, Box::new(console.clone()), LevelFilter::Debug, message_only()),
                Handler::new(
                    Destination::File(PathBuf::from("run.log")),
                    Box::new(file.clone()),
                    LevelFilter::Warn,
                    message_only(),
                ),
            ],
        );

        logger.info("starting", LogOptions::new());
        logger.ok("done", LogOptions::new());

        assert_eq!(console.contents(), "INFO starting\nOK done\n");
        assert_eq!(file.contents(), "OK done\n");
        assert_eq!(logger.max_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_confidential_skips_files_and_restores_levels() {
        let console = SharedBuffer::default();
        let file = SharedBuffer::default();
        let logger = Logger::new(
            "login",
            vec![
                Handler::new(Destination::Console, Box::new(console.clone()), LevelFilter::Info, message_only()),
                Handler::new(
                    Destination::File(PathBuf::from("login.log")),
                    Box::new(file.clone()),
                    LevelFilter::Debug,
                    message_only(),
                ),
            ],
        );

        logger
            .log(Level::Info, "password: hunter2", LogOptions::new().confidential())
            .unwrap();
        assert_eq!(console.contents(), "INFO password: hunter2\n");
        assert_eq!(file.contents(), "");
        assert_eq!(logger.handlers()[1].level(), LevelFilter::Debug);

        logger.info("logged in", LogOptions::new());
        assert_eq!(file.contents(), "INFO logged in\n");
    }

    #[test]
    fn test_confidential_restores_levels_when_console_fails() {
        let file = SharedBuffer::default();
        let logger = Logger::new(
            "login",
            vec![
                Handler::new(Destination::Console, Box::new(BrokenPipe), LevelFilter::Info, message_only()),
                Handler::new(
                    Destination::File(PathBuf::from("login.log")),
                    Box::new(file.clone()),
                    LevelFilter::Warn,
                    message_only(),
                ),
            ],
        );

        let result = logger.log(Level::Error, "secret", LogOptions::new().confidential());
        assert!(matches!(result, Err(LogError::Write(_))));
        assert_eq!(file.contents(), "");
        assert_eq!(logger.handlers()[0].level(), LevelFilter::Info);
        assert_eq!(logger.handlers()[1].level(), LevelFilter::Warn);
    }

    #[test]
    fn test_command_log_path_per_command() {
        let commands = vec!["deploy".to_string(), "app".to_string()];
        let path = command_log_path(Path::new("/var/log/tool"), &commands, false, time()).unwrap();
        assert_eq!(path, Path::new("/var/log/tool/deploy/app.log"));
    }

    #[test]
    fn test_command_log_path_per_exec() {
        let commands = vec!["deploy".to_string(), "app".to_string()];
        let path = command_log_path(Path::new("/var/log/tool"), &commands, true, time()).unwrap();
        assert_eq!(path, Path::new("/var/log/tool/deploy/app/202610150930.log"));

        let path = command_log_path(Path::new("/var/log/tool"), &[], true, time()).unwrap();
        assert_eq!(path, Path::new("/var/log/tool/202610150930.log"));
    }

    #[test]
    fn test_command_log_path_needs_subcommand() {
        assert!(matches!(
            command_log_path(Path::new("logs"), &[], false, time()),
            Err(LogError::Configuration(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_create_log_dir_sets_group_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("deploy");
        create_log_dir(&nested).unwrap();

        for created in [dir.path().join("logs"), nested] {
            let mode = fs::metadata(&created).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o770, "{}", created.display());
        }
    }

    #[test]
    fn test_create_log_dir_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        match create_log_dir(&blocker.join("logs")) {
            Err(LogError::CreateDir { path, .. }) => assert_eq!(path, blocker.join("logs")),
            other => panic!("Expected LogError::CreateDir, got: {other:?}"),
        }
    }

    #[test]
    fn test_config_prefers_command_line_values() {
        let mut args = ParsedArgs::default();
        args.commands.push("deploy".to_string());
        args.values.insert("loglevel".to_string(), ConfigNode::from("debug"));
        args.values.insert("logfile".to_string(), ConfigNode::Null);

        let defaults = LogConfig {
            loglevel: LevelFilter::Warn,
            logfile: Some(PathBuf::from("/tmp/tool.log")),
            logfile_level: LevelFilter::Error,
            ..LogConfig::default()
        };
        let config = LogConfig::from_args(&args, defaults).unwrap();

        assert_eq!(config.commands, ["deploy"]);
        assert_eq!(config.loglevel, LevelFilter::Debug);
        assert_eq!(config.logfile, Some(PathBuf::from("/tmp/tool.log")));
        assert_eq!(config.logfile_level, LevelFilter::Error);
        assert_eq!(config.logformat, DEFAULT_FORMAT);
    }

    #[test]
    fn test_init_writes_per_command_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            commands: vec!["deploy".to_string(), "app".to_string()],
            loglevel: LevelFilter::None,
            logdir: Some(dir.path().join("logs")),
            logdir_format: "%(name)s %(levelname)s %(message)s".to_string(),
            ..LogConfig::default()
        };
        let logger = Logger::init(&config).unwrap();
        assert_eq!(logger.name(), "deploy-app");
        assert_eq!(logger.handlers().len(), 1);

        logger.info("deployed", LogOptions::new());
        logger.debug("hidden", LogOptions::new());

        let written = fs::read_to_string(dir.path().join("logs/deploy/app.log")).unwrap();
        assert_eq!(written, "deploy-app INFO deployed\n");
    }
}
