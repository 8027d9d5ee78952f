pub mod catalog;
pub mod checksum;
pub mod config;
pub mod export;
pub mod fetch;
pub mod logging;
