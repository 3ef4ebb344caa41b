//! The `admin` module holds the whole-namespace operations: the stats
//! report and the bulk dead-letter operator.
//!
//! Both walk the broker directory fresh on every call. Nothing about topics
//! or subscriptions is cached between invocations.

pub mod bulk;
pub mod stats;

pub use bulk::{BulkAction, BulkReport, run_bulk};
pub use stats::{DirectoryEntry, collect_stats, render_stats_table};
