//! CLI command handlers, one file per command.

mod checksum;
mod export;
mod fetch;
mod list;

pub use checksum::run_checksum;
pub use export::run_export;
pub use fetch::run_fetch;
pub use list::run_list;
