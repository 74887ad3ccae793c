//! Write-ahead log.
//!
//! ## Frame layout
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery policy
//!
//! - Only transactions with a `Commit` frame are replayed, in commit order.
//! - A truncated frame at the end of the log is a crash mid-append. It is
//!   discarded and the medium is cut back to the last complete frame.
//! - A checksum mismatch, bad magic, unknown frame type, or newer format
//!   version is corruption and fails the open.
//!
//! ## Checkpoints
//!
//! A checkpoint replaces the whole log with one compacted transaction that
//! holds the live key space, followed by a `Checkpoint` frame.

mod iterator;
mod record;
mod writer;

pub use iterator::WalRecordIterator;
pub use record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::{CommittedBatch, Recovery, WalManager};
