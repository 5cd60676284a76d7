mod catalog;
mod persist;
mod state;

pub use catalog::CacheError;
pub use catalog::CacheSnapshot;
pub use catalog::CatalogCache;
pub use catalog::is_fresh;
pub use persist::write_atomic;
pub use state::CompletionStore;
pub use state::StateError;
