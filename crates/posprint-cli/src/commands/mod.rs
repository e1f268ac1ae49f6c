//! Command implementations for the CLI.

mod connect;
mod print;
mod scan;
mod watch;

pub use connect::{cmd_connect, cmd_status};
pub use print::{cmd_preview, cmd_print, cmd_print_test, load_document};
pub use scan::cmd_scan;
pub use watch::cmd_watch;
