//! Models and the registry that holds them.
//!
//! A [`ModelDef`] is what callers submit; [`Model`] is its validated form
//! with precomputed key layouts. The primary key is treated as one more
//! index ([`PRIMARY_INDEX`]) so the query planner can choose between it and
//! the secondary indexes uniformly.

mod model;
mod registry;

pub use model::{
    FieldDef, FieldType, IndexDef, IndexField, IndexLayout, Model, ModelDef, PRIMARY_INDEX,
};
pub(crate) use registry::Registration;
pub use registry::SchemaRegistry;
