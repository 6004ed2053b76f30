pub mod availability;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod ical;
pub mod server;
pub mod watcher;
