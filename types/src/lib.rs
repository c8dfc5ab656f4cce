pub mod backend;
pub mod disease;
pub mod image;
pub mod query;
pub mod server;

/// top-k used by single predictions when the caller does not ask for one
pub const DEFAULT_TOP_K: usize = 3;
