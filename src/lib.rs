//! Monster Siren Records Archiver Library
//!
//! This library downloads the Monster Siren Records catalog (albums, songs,
//! lyrics and covers) into a local directory, converting and tagging every file
//! on the way. Repeat runs skip albums that were already archived.
//!
//! # Modules
//!
//! - `cli` - Command implementations (`download`, `albums`)
//! - `config` - Configuration from environment variables and `.env` files
//! - `engine` - Concurrent acquisition engine: retries, worker pool, transfers
//! - `logging` - Injectable console logger used by every component
//! - `management` - Persistent catalog cache and completion state
//! - `media` - ffmpeg and image conversion helpers
//! - `siren` - Monster Siren REST API client
//! - `types` - Data structures and type definitions
//! - `utils` - Naming, formatting and selection helpers
//!
//! # Example
//!
//! ```
//! use msrcli::{config, engine::RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> msrcli::Res<()> {
//!     config::load_env().await?;
//!     let policy = RetryPolicy::new(3);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod management;
pub mod media;
pub mod siren;
pub mod types;
pub mod utils;

/// A convenient Result type alias for operations that may fail.
///
/// Provides a standard error handling pattern for the command entry points
/// using a boxed dynamic error trait object with Send + Sync bounds for async
/// contexts.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Fetching album catalog from API");
/// info!("Found {} songs", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// # Example
///
/// ```
/// success!("All albums processed successfully");
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only meant for unrecoverable start-up errors in the binary; components
/// report failures through their injected [`logging::Logger`] instead.
///
/// # Example
///
/// ```
/// error!("ffmpeg is required but unavailable");
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// # Example
///
/// ```
/// warning!("Read album cache failed: {}", err);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
