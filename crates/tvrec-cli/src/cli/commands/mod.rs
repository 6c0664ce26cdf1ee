//! CLI command handlers, one per file.

mod cancel;
mod daemon;
mod generate;
mod inspect;
mod record;
mod schedule;
mod status;

pub use cancel::run_cancel;
pub use daemon::run_daemon;
pub use generate::{run_completions, run_manpage};
pub use inspect::run_inspect;
pub use record::run_record;
pub use schedule::run_schedule;
pub use status::run_status;
