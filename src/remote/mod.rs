//! Remote retrieval of failure dumps.

pub mod fetcher;

pub use fetcher::{fetch_prefixes, FetchOptions};
