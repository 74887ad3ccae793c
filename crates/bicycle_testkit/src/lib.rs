//! # Bicycle Testkit
//!
//! Test utilities for Bicycle.
//!
//! This crate provides:
//! - Engine fixtures over memory and temporary directories
//! - The `Example` model and seeded scenarios
//! - Property-based generators for values, tuples, and records
//! - A log medium that fails on demand
//! - Concurrent put/query stress runners
//!
//! ## Usage
//!
//! ```rust
//! use bicycle_testkit::prelude::*;
//!
//! with_example_engine(|engine| {
//!     engine.put(EXAMPLE, example_record(1, "a@x.com")).unwrap();
//!     assert_eq!(engine.count(EXAMPLE).unwrap(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
