//! CBOR payloads for stored records and catalog entries.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `value` to CBOR.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(out)
}

/// Deserializes a value from CBOR.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR
/// for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Record, Value};

    #[test]
    fn record_roundtrip_keeps_kinds() {
        let record = Record::new()
            .with("id", 1)
            .with("ratio", 0.25)
            .with("name", "zoë")
            .with("blob", Value::Bytes(vec![0, 255]))
            .with("none", Value::Null)
            .with("flag", true)
            .with("inner", Record::new().with("depth", 2));

        let bytes = to_cbor(&record).unwrap();
        let back: Record = from_cbor(&bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result: CodecResult<Record> = from_cbor(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
