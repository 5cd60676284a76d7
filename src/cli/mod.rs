//! # CLI Module
//!
//! User-facing commands of msrcli. Each command wires the configuration into the
//! catalog client, the caches and the acquisition engine, and reports through
//! the injected logger.
//!
//! ## Commands
//!
//! - [`download`] - Resolves the catalog and archives the selected albums on the
//!   worker pool
//! - [`albums`] - Prints the catalog as a table with a completed marker
//!
//! ## Catalog Resolution
//!
//! Both commands resolve the album list through [`load_albums`]: a fresh cache
//! is used as-is, otherwise the API is queried with retries and the cache is
//! refreshed. When the API is unreachable a cached catalog of any age is used.
//!
//! ## Data Flow
//!
//! ```text
//! CLI Layer (commands)
//!     ↓
//! Engine (retry, worker pool, transfers)
//!     ↓
//! Management (catalog cache, completion store) / Media (ffmpeg, covers)
//!     ↓
//! Siren API client
//! ```
//!
//! ## Failure Reporting
//!
//! Albums fail independently. A failed album is reported with the step that
//! failed and is not marked completed, so the next run retries it.

mod albums;
mod catalog;
mod download;

pub use albums::albums;
pub use albums::filter_albums;
pub use catalog::CatalogPolicy;
pub use catalog::load_albums;
pub use download::AlbumFailure;
pub use download::AlbumJob;
pub use download::DownloadError;
pub use download::download;
pub use download::finalize_song;
pub use download::progress_logger;
