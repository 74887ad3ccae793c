//! # Bicycle Storage
//!
//! The ordered key-value layer under the Bicycle record engine.
//!
//! Keys and values are opaque bytes here. The crate knows nothing about
//! models, records, or indexes; it provides:
//!
//! - [`StorageBackend`]: append-only byte media ([`InMemoryBackend`],
//!   [`FileBackend`]) that hold the write-ahead log
//! - a write-ahead log with checksummed frames and crash recovery
//! - [`KvStore`]: an ordered multi-version map with atomic [`WriteBatch`]es,
//!   pinned [`Snapshot`]s, lazy chunked scans, and a single
//!   [`WriteTransaction`] at a time
//!
//! ## Example
//!
//! ```rust
//! use bicycle_storage::{InMemoryBackend, KvStore, StoreOptions, WriteBatch};
//!
//! let medium = InMemoryBackend::new();
//! let store = KvStore::open(Box::new(medium.clone()), StoreOptions::default()).unwrap();
//!
//! let mut batch = WriteBatch::new();
//! batch.put(b"user#1".to_vec(), b"alice".to_vec());
//! store.write_batch(batch).unwrap();
//! drop(store);
//!
//! let reopened = KvStore::open(Box::new(medium), StoreOptions::default()).unwrap();
//! assert_eq!(reopened.get(b"user#1").unwrap(), Some(b"alice".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod file;
mod memory;
mod mvcc;
mod store;
mod types;
pub mod wal;

pub use backend::StorageBackend;
pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use store::{
    prefix_upper_bound, Direction, EntryIter, KeyRange, KvStore, ReadView, ScanIter, Snapshot,
    StoreOptions, StoreStats, WriteTransaction,
};
pub use types::{SequenceNumber, TransactionId};
