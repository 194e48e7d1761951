pub mod collector;
pub mod diff;
pub mod shutdown;
pub mod source;

pub use collector::{capture_snapshot, Collector, CollectorSummary};
pub use diff::{DiffEngine, DiffSettings, SnapshotDiff};
pub use shutdown::{Shutdown, ShutdownSender};
pub use source::{ProcessSource, SourceError, SysinfoSource};
