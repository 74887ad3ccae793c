//! Secondary index maintenance and verification.
//!
//! Index entries are derived data. They are:
//! - Written in the same write transaction as the record they describe
//! - Never read or written by callers directly
//! - Fully derivable from the primary records
//!
//! An entry's key is `index prefix | index tuple | pk tuple` and its value
//! is the pk tuple, so equal index tuples are ordered by primary key.

mod maintainer;
mod verify;

pub use maintainer::{IndexMaintainer, IndexMutation};
pub use verify::{ModelReport, VerifyReport};

pub(crate) use verify::verify_model;
