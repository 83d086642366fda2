//! Storage pipeline components.
//!
//! - [`AppendLog`] - Single writer thread appending records to hourly partition files
//! - [`CountIndex`] - Per-type ordered sets answering total and range counts
//!   - [`MemoryCountIndex`] - In-process `BTreeSet` backend
//!   - [`SqliteCountIndex`] - Persistent SQLite backend
//!
//! # Architecture
//!
//! ```text
//! [Ingestor] ──enqueue──▶ [AppendLog thread] ──▶ <data_dir>/YYYY/MM/DD/HH_<event>.tsv
//!     │
//!     └──record_arrival──▶ [CountIndex]
//! ```
//!
//! The append log is the source of truth; the count index is derived and
//! allowed to undercount.

mod append_log;
mod count_index;
mod sqlite_index;

pub use append_log::{
    AppendLog, AppendLogConfig, AppendLogStats, DIR_MODE, FILE_MODE, StorageFault, WriterHealth,
    partition_path,
};
pub use count_index::{CountIndex, MemoryCountIndex, ScoreRange};
pub use sqlite_index::SqliteCountIndex;
