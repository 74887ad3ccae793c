//! Property-based test generators using proptest.

use crate::fixtures::example_record;
use bicycle_codec::{Record, SortOrder, Value};
use bicycle_core::FieldType;
use proptest::prelude::*;

/// Any value that can be a key component. Floats are never NaN and `-0.0`
/// is normalized to `0.0`.
pub fn key_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        finite_float().prop_map(Value::Float),
        ".{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

fn finite_float() -> impl Strategy<Value = f64> {
    any::<f64>()
        .prop_filter("NaN has no order", |x| !x.is_nan())
        .prop_map(|x| if x == 0.0 { 0.0 } else { x })
}

/// Either sort order.
pub fn sort_order_strategy() -> impl Strategy<Value = SortOrder> {
    prop_oneof![Just(SortOrder::Ascending), Just(SortOrder::Descending)]
}

/// Tuples of `1..=max_len` key components, each with its own order.
pub fn tuple_strategy(max_len: usize) -> impl Strategy<Value = Vec<(Value, SortOrder)>> {
    prop::collection::vec((key_value_strategy(), sort_order_strategy()), 1..=max_len.max(1))
}

/// Values valid for a field of type `ty`.
///
/// # Panics
///
/// Panics for [`FieldType::Record`], which is not generated.
pub fn typed_value_strategy(ty: FieldType, nullable: bool) -> BoxedStrategy<Value> {
    let base = match ty {
        FieldType::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
        FieldType::Float => finite_float().prop_map(Value::Float).boxed(),
        FieldType::Text => "[a-z0-9@.]{0,12}".prop_map(Value::Text).boxed(),
        FieldType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        FieldType::Bytes => prop::collection::vec(any::<u8>(), 0..12)
            .prop_map(Value::Bytes)
            .boxed(),
        FieldType::Record => panic!("nested records are not generated"),
    };
    if nullable {
        prop_oneof![1 => Just(Value::Null), 4 => base].boxed()
    } else {
        base
    }
}

/// One call against the example model. Ids and emails come from small
/// domains so overwrites and unique conflicts are common.
#[derive(Debug, Clone, PartialEq)]
pub enum ExampleOp {
    /// `put` one record.
    Put {
        /// Primary key.
        id: i64,
        /// Unique email.
        email: String,
    },
    /// `batch_put` several records.
    BatchPut {
        /// `(id, email)` pairs in batch order.
        records: Vec<(i64, String)>,
    },
    /// `delete_by_index` on the primary key.
    DeleteId {
        /// Primary key.
        id: i64,
    },
    /// `delete_by_index` on the email index.
    DeleteEmail {
        /// Email.
        email: String,
    },
}

impl ExampleOp {
    /// Records written by a put or batch put.
    pub fn records(&self) -> Vec<Record> {
        match self {
            Self::Put { id, email } => vec![example_record(*id, email)],
            Self::BatchPut { records } => records
                .iter()
                .map(|(id, email)| example_record(*id, email))
                .collect(),
            Self::DeleteId { .. } | Self::DeleteEmail { .. } => Vec::new(),
        }
    }
}

fn small_id() -> impl Strategy<Value = i64> {
    0i64..16
}

fn small_email() -> impl Strategy<Value = String> {
    (0u8..12).prop_map(|n| format!("u{n}@x.com"))
}

/// Strategy for one example operation.
pub fn example_op_strategy() -> impl Strategy<Value = ExampleOp> {
    prop_oneof![
        4 => (small_id(), small_email()).prop_map(|(id, email)| ExampleOp::Put { id, email }),
        2 => prop::collection::vec((small_id(), small_email()), 1..5)
            .prop_map(|records| ExampleOp::BatchPut { records }),
        1 => small_id().prop_map(|id| ExampleOp::DeleteId { id }),
        1 => small_email().prop_map(|email| ExampleOp::DeleteEmail { email }),
    ]
}

/// Strategy for a sequence of example operations.
pub fn example_ops_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ExampleOp>> {
    prop::collection::vec(example_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
