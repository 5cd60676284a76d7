//! Injectable logging for concurrent workers.
//!
//! Components never print directly; they receive a [`SharedLogger`] at
//! construction time. The console implementation reuses the crate's colored
//! output macros and prefixes every line with a timestamp.

use std::sync::{Arc, Mutex};

use chrono::Local;
use colored::Colorize;

use crate::{info, success, warning};

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
}

/// Logging capability handed to every component.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn success(&self, message: &str) {
        self.log(Level::Success, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

pub type SharedLogger = Arc<dyn Logger>;

/// Writes timestamped, colored lines to stdout.
///
/// A mutex serializes whole lines so that output from concurrent album jobs
/// never interleaves.
#[derive(Debug, Default)]
pub struct ConsoleLogger {
    lock: Mutex<()>,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedLogger {
        Arc::new(Self::new())
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, level: Level, message: &str) {
        // a poisoned lock only means another thread panicked mid-print
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        match level {
            Level::Info => info!("{} {}", stamp, message),
            Level::Success => success!("{} {}", stamp, message),
            Level::Warn => warning!("{} {}", stamp, message),
            Level::Error => {
                println!("[{}] {} {}", "!".red().bold(), stamp, message)
            }
        }
    }
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl NullLogger {
    pub fn shared() -> SharedLogger {
        Arc::new(Self)
    }
}

impl Logger for NullLogger {
    fn log(&self, _level: Level, _message: &str) {}
}
