//! PLCR logging backend.
//!
//! Installs a [`log::Log`] implementation that formats every record as one
//! UTF-8 line (timestamp, uppercase level, bracketed component tag,
//! message) and hands it to a background writer thread. The writer duplicates each
//! line to standard output and to every client connected to the UNIX log
//! socket, so an external log shipper can tail the process without touching
//! its stdout.
//!
//! Call [`init`] exactly once, early, and keep the returned guard alive; the
//! writer flushes and joins when the guard drops.

use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::{fs, io, thread};

use backtrace::Backtrace;
use env_logger::filter::{Builder as FilterBuilder, Filter};
use log::{Level, LevelFilter, Log, Metadata, Record};
use plcr_channel::{Receiver, RecvTimeoutError, Sender};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use yansi::Paint;

mod error;

pub use error::InitError;

/// How often the writer wakes up to accept new log-socket clients while the
/// record channel is idle.
const IDLE_WAKEUP_MS: u64 = 200;

const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3] +00:00"
);

/// Logging configuration, normally taken from the `.env` runtime config.
#[derive(Clone, Debug)]
pub struct Config {
    /// Filter directives in `env_logger` syntax, e.g. `info,plcr_scan=debug`.
    pub filter: Option<String>,
    /// Duplicate records to standard output.
    pub log_to_stdout: bool,
    /// Color the level name on stdout.
    pub color: bool,
    /// Bind the log-shipping socket here; `None` disables the sink.
    pub socket_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            filter: None,
            log_to_stdout: true,
            color: true,
            socket_path: None,
        }
    }
}

enum Message {
    Record { plain: String, colored: String },
    Terminate,
}

struct Logger {
    filter: Filter,
    log_to_stdout: bool,
    color: bool,
    tx: Sender<Message>,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.filter.matches(record) {
            return;
        }
        let timestamp = OffsetDateTime::now_utc()
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| String::from("-"));
        let plain = format!(
            "{} {} [{}]  {}",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        );
        let colored = if self.log_to_stdout && self.color {
            format!(
                "{} {} [{}]  {}",
                timestamp,
                colored_level(record.level()),
                record.target(),
                record.args()
            )
        } else {
            plain.clone()
        };
        let _ = self.tx.send(Message::Record { plain, colored });
    }

    fn flush(&self) {}
}

fn colored_level(level: Level) -> String {
    match level {
        Level::Error => Paint::red("ERROR").bold().to_string(),
        Level::Warn => Paint::yellow("WARN").to_string(),
        Level::Info => Paint::green("INFO").to_string(),
        Level::Debug => Paint::cyan("DEBUG").to_string(),
        Level::Trace => Paint::blue("TRACE").to_string(),
    }
}

/// Joins the writer thread on drop, after asking it to drain the channel.
#[must_use]
pub struct LoggerInitGuard {
    tx: Sender<Message>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for LoggerInitGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Terminate);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Initializes the process logger.
///
/// `env` names an environment variable whose value, when present, overrides
/// `config.filter`. Fails if a logger is already installed or the log socket
/// cannot be bound.
pub fn init(env: Option<&str>, config: Config) -> Result<LoggerInitGuard, InitError> {
    let mut builder = FilterBuilder::new();
    let directives = env
        .and_then(|name| std::env::var(name).ok())
        .or_else(|| config.filter.clone())
        .unwrap_or_else(|| String::from("info"));
    builder.parse(&directives);
    let filter = builder.build();

    let sink = match &config.socket_path {
        Some(path) => {
            // A previous run may have left the socket file behind.
            let _ = fs::remove_file(path);
            Some(UnixListener::bind(path).map_err(InitError::Socket)?)
        }
        None => None,
    };
    if let Some(listener) = &sink {
        listener.set_nonblocking(true).map_err(InitError::Socket)?;
    }

    let (tx, rx) = plcr_channel::unbounded();
    let max_level = filter.filter();
    let logger = Logger {
        filter,
        log_to_stdout: config.log_to_stdout,
        color: config.color,
        tx: tx.clone(),
    };
    let log_to_stdout = config.log_to_stdout;

    let handle = thread::Builder::new()
        .name("LogWriter".to_string())
        .spawn(move || writer_loop(rx, sink, log_to_stdout))
        .map_err(InitError::Socket)?;

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);

    setup_panic_logger();

    Ok(LoggerInitGuard {
        tx,
        handle: Some(handle),
    })
}

/// Installs a logger that swallows everything, for tools that must stay
/// quiet on stdout.
pub fn init_silent() -> Result<(), log::SetLoggerError> {
    struct Silent;
    impl Log for Silent {
        fn enabled(&self, _: &Metadata) -> bool {
            false
        }
        fn log(&self, _: &Record) {}
        fn flush(&self) {}
    }
    log::set_boxed_logger(Box::new(Silent))?;
    log::set_max_level(LevelFilter::Off);
    Ok(())
}

fn writer_loop(rx: Receiver<Message>, sink: Option<UnixListener>, log_to_stdout: bool) {
    let mut clients: Vec<UnixStream> = Vec::new();
    loop {
        if let Some(listener) = &sink {
            accept_clients(listener, &mut clients);
        }
        match rx.recv_timeout(std::time::Duration::from_millis(IDLE_WAKEUP_MS)) {
            Ok(Message::Record { plain, colored }) => {
                if log_to_stdout {
                    println!("{colored}");
                }
                ship(&mut clients, &plain);
            }
            Ok(Message::Terminate) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let _ = io::stdout().flush();
}

fn accept_clients(listener: &UnixListener, clients: &mut Vec<UnixStream>) {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let _ = stream.set_nonblocking(true);
                clients.push(stream);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => break,
        }
    }
}

fn ship(clients: &mut Vec<UnixStream>, line: &str) {
    clients.retain_mut(|client| {
        client
            .write_all(line.as_bytes())
            .and_then(|_| client.write_all(b"\n"))
            .is_ok()
    });
}

/// Routes panic messages through the logger so they reach the log socket,
/// then falls through to the previously installed hook.
fn setup_panic_logger() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = match info.payload().downcast_ref::<&str>() {
            Some(s) => (*s).to_string(),
            None => match info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => String::from("Box<Any>"),
            },
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| String::from("<unknown>"));
        let backtrace = Backtrace::new();
        log::error!(
            target: "panic",
            "thread panicked at '{}', {}\n{:?}",
            message,
            location,
            backtrace
        );
        previous(info);
    }));
}
