//! Fault injection for the log medium.
//!
//! [`FailingBackend`] wraps another [`StorageBackend`] and fails appends or
//! syncs when told to through its [`FaultSwitch`], which stays usable
//! after the backend is boxed into a store.
//!
//! ```rust
//! use bicycle_core::{Config, Engine};
//! use bicycle_storage::InMemoryBackend;
//! use bicycle_testkit::{example_model, example_record, FailingBackend, EXAMPLE};
//!
//! let (backend, switch) = FailingBackend::new(Box::new(InMemoryBackend::new()));
//! let engine = Engine::open_with_backend(Box::new(backend), Config::new()).unwrap();
//! engine.register(example_model()).unwrap();
//!
//! switch.fail_appends(true);
//! assert!(engine.put(EXAMPLE, example_record(1, "a@x.com")).is_err());
//! switch.fail_appends(false);
//! assert_eq!(engine.count(EXAMPLE).unwrap(), 0);
//! ```

use bicycle_storage::{StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Faults {
    fail_appends: AtomicBool,
    fail_syncs: AtomicBool,
    /// Bytes written before the next append is torn; `u64::MAX` disarms.
    tear_after: AtomicU64,
    appended: AtomicU64,
    injected: AtomicUsize,
}

/// Controls the faults of a [`FailingBackend`].
#[derive(Debug, Clone)]
pub struct FaultSwitch {
    faults: Arc<Faults>,
}

impl FaultSwitch {
    /// Makes every append fail without writing.
    pub fn fail_appends(&self, on: bool) {
        self.faults.fail_appends.store(on, Ordering::SeqCst);
    }

    /// Makes every flush and sync fail.
    pub fn fail_syncs(&self, on: bool) {
        self.faults.fail_syncs.store(on, Ordering::SeqCst);
    }

    /// Tears the append that crosses `bytes` more bytes: the part up to the
    /// threshold is written, then the append fails.
    pub fn tear_after(&self, bytes: u64) {
        let now = self.faults.appended.load(Ordering::SeqCst);
        self.faults
            .tear_after
            .store(now.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Clears every fault.
    pub fn reset(&self) {
        self.faults.fail_appends.store(false, Ordering::SeqCst);
        self.faults.fail_syncs.store(false, Ordering::SeqCst);
        self.faults.tear_after.store(u64::MAX, Ordering::SeqCst);
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> usize {
        self.faults.injected.load(Ordering::SeqCst)
    }
}

/// A log medium that fails on demand.
pub struct FailingBackend {
    inner: Box<dyn StorageBackend>,
    faults: Arc<Faults>,
}

impl FailingBackend {
    /// Wraps `inner`; all faults start disarmed.
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, FaultSwitch) {
        let faults = Arc::new(Faults {
            tear_after: AtomicU64::new(u64::MAX),
            ..Faults::default()
        });
        let switch = FaultSwitch {
            faults: Arc::clone(&faults),
        };
        (Self { inner, faults }, switch)
    }

    fn inject(&self, what: &str) -> StorageError {
        self.faults.injected.fetch_add(1, Ordering::SeqCst);
        StorageError::IoFailure(io::Error::new(
            io::ErrorKind::Other,
            format!("injected {what} failure"),
        ))
    }
}

impl StorageBackend for FailingBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.faults.fail_appends.load(Ordering::SeqCst) {
            return Err(self.inject("append"));
        }

        let written = self.faults.appended.load(Ordering::SeqCst);
        let threshold = self.faults.tear_after.load(Ordering::SeqCst);
        let end = written + data.len() as u64;
        if end > threshold {
            let partial = threshold.saturating_sub(written) as usize;
            if partial > 0 {
                self.inner.append(&data[..partial])?;
            }
            self.faults.appended.fetch_add(partial as u64, Ordering::SeqCst);
            self.faults.tear_after.store(u64::MAX, Ordering::SeqCst);
            return Err(self.inject("torn append"));
        }

        let offset = self.inner.append(data)?;
        self.faults.appended.fetch_add(data.len() as u64, Ordering::SeqCst);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.faults.fail_syncs.load(Ordering::SeqCst) {
            return Err(self.inject("flush"));
        }
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.faults.fail_syncs.load(Ordering::SeqCst) {
            return Err(self.inject("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.faults.fail_appends.load(Ordering::SeqCst) {
            return Err(self.inject("replace"));
        }
        self.inner.replace(data)
    }
}
