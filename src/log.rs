//! Internal diagnostics: `info!`/`warn!`/`error!` macros that append to the
//! app dir's `log.txt` (§4.2) and fan out to a subscriber channel.
//!
//! The teacher routes every `info!`/`warn!`/`error!` call through a `mod
//! log` that was not itself present in the retrieval pack — only its call
//! sites in `context.rs` survived. Rebuilt here from those call sites: a
//! process-wide sink behind a `Mutex`, plus the single-callback dispatch
//! style from `context.rs`'s `cb`/`call_cb`, generalized to a list of
//! subscribers so both the log file and the UI facade can observe the same
//! stream.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lazy_static::lazy_static;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

type Subscriber = Box<dyn Fn(Level, &str) + Send>;

struct Sink {
    file: Option<File>,
    subscribers: Vec<Subscriber>,
}

lazy_static! {
    static ref SINK: Mutex<Sink> = Mutex::new(Sink {
        file: None,
        subscribers: Vec::new(),
    });
}

/// Points the process-wide log sink at `<appDir>/log.txt` (§4.2). Safe to
/// call more than once; later calls repoint the sink.
pub fn init(app_dir: &Path) -> std::io::Result<()> {
    let path = log_path(app_dir);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    SINK.lock().unwrap().file = Some(file);
    Ok(())
}

pub fn log_path(app_dir: &Path) -> PathBuf {
    app_dir.join("log.txt")
}

/// Registers an additional subscriber (e.g. the UI facade) that observes
/// every logged line alongside the file writer.
pub fn subscribe(subscriber: impl Fn(Level, &str) + Send + 'static) {
    SINK.lock().unwrap().subscribers.push(Box::new(subscriber));
}

#[doc(hidden)]
pub fn record(level: Level, message: std::fmt::Arguments) {
    let line = format!("[{}] {}", level.as_str(), message);
    let mut sink = SINK.lock().unwrap();
    if let Some(file) = sink.file.as_mut() {
        let _ = writeln!(file, "{}", line);
    }
    for subscriber in &sink.subscribers {
        subscriber(level, &line);
    }
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log::record($crate::log::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log::record($crate::log::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log::record($crate::log::Level::Error, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};
    use tempfile::tempdir;

    #[test]
    fn init_creates_log_file_and_appends() {
        let dir = tempdir().unwrap();
        init(dir.path()).unwrap();
        crate::info!("hello {}", "world");
        assert!(log_path(dir.path()).exists());
        let contents = std::fs::read_to_string(log_path(dir.path())).unwrap();
        assert!(contents.contains("hello world"));
    }

    #[test]
    fn subscribers_observe_logged_lines() {
        let dir = tempdir().unwrap();
        init(dir.path()).unwrap();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        subscribe(move |level, line| seen_clone.lock().unwrap().push((level, line.to_string())));
        crate::warn!("disk almost full");
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|(level, line)| *level == Level::Warn && line.contains("disk almost full")));
    }
}
