// Fanding feed watcher - service core
//
// This crate wires the feed-watcher library into a running service: env
// configuration, the Discord notification sink, the crawl scheduler, and
// the read-only reporting API.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
