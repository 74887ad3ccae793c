//! Index queries.
//!
//! A query is a conjunction of per-field constraints plus an optional order,
//! limit, and offset. The planner picks the index whose leading fields are
//! exactly the constrained ones and turns the constraints into one key
//! range; the resolver scans that range and materializes records.
//!
//! ```rust
//! use bicycle_core::{IndexQuery, SortOrder};
//!
//! let query = IndexQuery::new()
//!     .eq("country", "NZ")
//!     .gte("age", 18)
//!     .order_by("age", SortOrder::Descending)
//!     .limit(10);
//! assert_eq!(query.constraints.len(), 2);
//! ```

mod planner;
mod resolver;

pub(crate) use resolver::{resolve, Match};

use bicycle_codec::{SortOrder, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Equal. `eq null` matches null values.
    Eq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Text or bytes starting with the value.
    BeginsWith,
}

impl Op {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::BeginsWith => "begins_with",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constrained field.
    #[serde(alias = "field_name")]
    pub field: String,
    /// Operator.
    pub op: Op,
    /// Operand.
    pub value: Value,
}

/// Requested result order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field to order by.
    pub field: String,
    /// Direction.
    #[serde(default)]
    pub direction: SortOrder,
}

/// A query against one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexQuery {
    /// Conjunction of constraints.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Result order; index order when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderBy>,
    /// Maximum number of records returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Matching records skipped before the first one returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl IndexQuery {
    /// A query with no constraints: every record, in primary-key order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.constraints.push(Constraint {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Adds `field = value`.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Eq, value)
    }

    /// Adds `field > value`.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Gt, value)
    }

    /// Adds `field >= value`.
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Gte, value)
    }

    /// Adds `field < value`.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Lt, value)
    }

    /// Adds `field <= value`.
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Lte, value)
    }

    /// Adds a prefix match on a text or bytes field.
    #[must_use]
    pub fn begins_with(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::BeginsWith, value)
    }

    /// Sets the result order.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: SortOrder) -> Self {
        self.order = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the result offset.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
