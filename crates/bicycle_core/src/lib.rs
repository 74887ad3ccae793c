//! # Bicycle Core
//!
//! An embedded record engine with secondary indexes.
//!
//! Applications declare [`ModelDef`]s (fields, a primary key, and any
//! number of secondary indexes), then write and query [`Record`]s through
//! an [`Engine`]. Every write is validated against its model and applied
//! together with its index maintenance in one atomic transaction of the
//! underlying [`bicycle_storage`] store.
//!
//! This crate provides:
//! - [`schema`]: model declaration, validation, and the per-engine registry
//! - [`index`]: index entry maintenance, uniqueness, and consistency checks
//! - [`query`]: index selection, key ranges, and result ordering
//! - [`Engine`]: the facade tying models, indexes, and storage together
//! - [`Request`] / [`Response`]: a versioned, serde-friendly call contract
//!
//! ```rust
//! use bicycle_core::{Engine, FieldType, IndexDef, IndexQuery, ModelDef, Record};
//!
//! let engine = Engine::open_in_memory().unwrap();
//! engine
//!     .register(
//!         ModelDef::new("Example")
//!             .field("id", FieldType::Integer)
//!             .field("email", FieldType::Text)
//!             .primary_key(["id"])
//!             .index(IndexDef::new("by_email", ["email"]).unique()),
//!     )
//!     .unwrap();
//!
//! engine
//!     .put("Example", Record::new().with("id", 1).with("email", "a@x.com"))
//!     .unwrap();
//! let found = engine
//!     .get_by_index("Example", &IndexQuery::new().eq("email", "a@x.com"))
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod engine;
mod error;
pub mod index;
mod keys;
mod mutation;
pub mod query;
mod request;
pub mod schema;

pub use config::{Config, Durability};
pub use dir::DataDir;
pub use engine::{Engine, EngineStats, ModelStats};
pub use error::{ConflictError, CoreError, CoreResult, ErrorKind, QueryError, SchemaError};
pub use index::{IndexMaintainer, IndexMutation, ModelReport, VerifyReport};
pub use query::{Constraint, IndexQuery, Op, OrderBy};
pub use request::{Request, RequestEnvelope, Response, ResponseEnvelope, PROTOCOL_VERSION};
pub use schema::{
    FieldDef, FieldType, IndexDef, IndexField, IndexLayout, Model, ModelDef, SchemaRegistry,
    PRIMARY_INDEX,
};

pub use bicycle_codec::{Record, SortOrder, Value};
