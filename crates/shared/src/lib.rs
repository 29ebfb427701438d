pub mod checker;
pub mod config;
mod config_env;
pub mod dates;
pub mod diff;
pub mod diff_log;
pub mod fetcher;
pub mod snapshot_store;
pub mod source;
