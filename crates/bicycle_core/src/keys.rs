//! Keyspace layout.
//!
//! Every key the engine writes starts with a one-byte space tag followed by
//! the encoded model name:
//!
//! ```text
//! 0x01 | model                                  -> model definition (CBOR)
//! 0x02 | model | pk tuple                       -> record (CBOR)
//! 0x03 | model | index | index tuple | pk tuple -> pk tuple
//! ```
//!
//! Names use the terminated text encoding, so the keys of one model or
//! index never share a prefix with another's.

use bicycle_codec::{encode_value, CodecResult, SortOrder, Value};
use bicycle_storage::KeyRange;

pub(crate) const CATALOG: u8 = 0x01;
pub(crate) const PRIMARY: u8 = 0x02;
pub(crate) const INDEX: u8 = 0x03;

fn push_name(out: &mut Vec<u8>, name: &str) -> CodecResult<()> {
    encode_value(&Value::Text(name.to_owned()), SortOrder::Ascending, out)
}

/// Key of a model's catalog entry.
pub(crate) fn catalog_key(model: &str) -> CodecResult<Vec<u8>> {
    let mut key = vec![CATALOG];
    push_name(&mut key, model)?;
    Ok(key)
}

/// Range holding every catalog entry.
pub(crate) fn catalog_range() -> KeyRange {
    KeyRange::prefix(&[CATALOG])
}

/// Prefix of every record of `model`.
pub(crate) fn primary_prefix(model: &str) -> CodecResult<Vec<u8>> {
    let mut key = vec![PRIMARY];
    push_name(&mut key, model)?;
    Ok(key)
}

/// Prefix of every entry of one secondary index.
pub(crate) fn index_prefix(model: &str, index: &str) -> CodecResult<Vec<u8>> {
    let mut key = vec![INDEX];
    push_name(&mut key, model)?;
    push_name(&mut key, index)?;
    Ok(key)
}
