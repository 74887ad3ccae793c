//! # Bicycle Codec
//!
//! Value types and encodings shared by the Bicycle engine:
//!
//! - [`Value`] and [`Record`]: dynamically typed record data
//! - [`encode_tuple`] / [`decode_tuple`]: an order-preserving key encoding,
//!   so byte-wise comparison of keys matches the logical order of the
//!   encoded values
//! - [`to_cbor`] / [`from_cbor`]: CBOR payloads for stored records
//!
//! ```rust
//! use bicycle_codec::{decode_tuple, encode_tuple, SortOrder, Value};
//!
//! let orders = [SortOrder::Ascending, SortOrder::Descending];
//! let tuple = [Value::Text("alice".into()), Value::Integer(30)];
//! let key = encode_tuple(tuple.iter().zip(orders)).unwrap();
//! assert_eq!(decode_tuple(&key, &orders).unwrap(), tuple.to_vec());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod payload;
mod value;

pub use error::{CodecError, CodecResult};
pub use key::{
    decode_prefix, decode_tuple, encode_prefix, encode_tuple, encode_value, prefix_successor,
    tuple_len, SortOrder, TAG_BOOL, TAG_BYTES, TAG_FLOAT, TAG_INTEGER, TAG_NULL, TAG_TEXT,
};
pub use payload::{from_cbor, to_cbor};
pub use value::{Record, Value, ValueKind};
