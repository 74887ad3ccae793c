//! Order-preserving key encoding.
//!
//! Every value is written as a one-byte type tag followed by a body:
//!
//! | kind    | tag    | body                                             |
//! |---------|--------|--------------------------------------------------|
//! | null    | `0x01` | none                                             |
//! | bool    | `0x02` | `0x00` or `0x01`                                 |
//! | integer | `0x03` | big-endian `i64` with the sign bit flipped       |
//! | float   | `0x04` | big-endian IEEE bits, negatives fully inverted   |
//! | text    | `0x05` | bytes with `0x00` escaped as `0x00 0xFF`, ending `0x00 0x00` |
//! | bytes   | `0x06` | same escaping as text                            |
//!
//! Byte-wise comparison of two encodings matches the logical order of the
//! values: nulls first, then by kind, then by value. Every encoding is
//! self-delimiting, so no encoded tuple is a proper prefix of another tuple
//! with the same number of fields, and tuples concatenate without
//! separators.
//!
//! A descending field stores the bitwise complement of its ascending
//! encoding, which reverses its order and keeps it self-delimiting.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Tag of [`Value::Null`].
pub const TAG_NULL: u8 = 0x01;
/// Tag of [`Value::Bool`].
pub const TAG_BOOL: u8 = 0x02;
/// Tag of [`Value::Integer`].
pub const TAG_INTEGER: u8 = 0x03;
/// Tag of [`Value::Float`].
pub const TAG_FLOAT: u8 = 0x04;
/// Tag of [`Value::Text`].
pub const TAG_TEXT: u8 = 0x05;
/// Tag of [`Value::Bytes`].
pub const TAG_BYTES: u8 = 0x06;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;

/// Sort order of one key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    /// Largest first.
    #[serde(alias = "desc")]
    Descending,
}

impl SortOrder {
    /// Returns the opposite order.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    const fn mask(self) -> u8 {
        match self {
            Self::Ascending => 0x00,
            Self::Descending => 0xFF,
        }
    }
}

/// Appends the encoding of `value` to `out`.
///
/// # Errors
///
/// Returns [`CodecError::UnsupportedNested`] for records and
/// [`CodecError::NotANumber`] for NaN.
pub fn encode_value(value: &Value, order: SortOrder, out: &mut Vec<u8>) -> CodecResult<()> {
    let start = out.len();
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Integer(n) => {
            out.push(TAG_INTEGER);
            out.extend_from_slice(&encode_i64(*n));
        }
        Value::Float(x) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&encode_f64(*x)?);
        }
        Value::Text(s) => {
            out.push(TAG_TEXT);
            escape_into(s.as_bytes(), out);
            out.extend_from_slice(&[ESCAPE, TERMINATOR]);
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            escape_into(b, out);
            out.extend_from_slice(&[ESCAPE, TERMINATOR]);
        }
        Value::Record(_) => return Err(CodecError::UnsupportedNested),
    }
    complement_from(out, start, order);
    Ok(())
}

/// Encodes a tuple of `(value, order)` pairs.
///
/// ```rust
/// use bicycle_codec::{encode_tuple, SortOrder, Value};
///
/// let low = encode_tuple([(&Value::Integer(-5), SortOrder::Ascending)]).unwrap();
/// let high = encode_tuple([(&Value::Integer(3), SortOrder::Ascending)]).unwrap();
/// assert!(low < high);
/// ```
///
/// # Errors
///
/// Returns an error if any value cannot be encoded.
pub fn encode_tuple<'a>(
    fields: impl IntoIterator<Item = (&'a Value, SortOrder)>,
) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    for (value, order) in fields {
        encode_value(value, order, &mut out)?;
    }
    Ok(out)
}

/// Encodes the prefix shared by every text or bytes value starting with
/// `prefix`. The result has no terminator, so all matching encodings
/// start with it.
///
/// # Errors
///
/// Returns [`CodecError::TypeMismatch`] unless `prefix` is text or bytes.
pub fn encode_prefix(prefix: &Value, order: SortOrder, out: &mut Vec<u8>) -> CodecResult<()> {
    let start = out.len();
    match prefix {
        Value::Text(s) => {
            out.push(TAG_TEXT);
            escape_into(s.as_bytes(), out);
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            escape_into(b, out);
        }
        other => {
            return Err(CodecError::type_mismatch(
                "prefix",
                "text or bytes",
                other.kind().as_str(),
            ))
        }
    }
    complement_from(out, start, order);
    Ok(())
}

/// Decodes exactly `orders.len()` values that must span all of `bytes`.
///
/// # Errors
///
/// Returns [`CodecError::MalformedKey`] on bad tags, truncation, or
/// trailing bytes.
pub fn decode_tuple(bytes: &[u8], orders: &[SortOrder]) -> CodecResult<Vec<Value>> {
    let (values, used) = decode_prefix(bytes, orders)?;
    if used != bytes.len() {
        return Err(CodecError::malformed_key(format!(
            "{} trailing bytes after {} fields",
            bytes.len() - used,
            orders.len()
        )));
    }
    Ok(values)
}

/// Decodes `orders.len()` values from the start of `bytes` and returns
/// them with the number of bytes consumed.
///
/// # Errors
///
/// Returns [`CodecError::MalformedKey`] on bad tags or truncation.
pub fn decode_prefix(bytes: &[u8], orders: &[SortOrder]) -> CodecResult<(Vec<Value>, usize)> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let mut values = Vec::with_capacity(orders.len());
    for &order in orders {
        values.push(cursor.value(order)?);
    }
    Ok((values, cursor.pos))
}

/// Returns the byte length of the first `count` encoded fields.
///
/// # Errors
///
/// Returns [`CodecError::MalformedKey`] if `bytes` holds fewer fields.
pub fn tuple_len(bytes: &[u8], orders: &[SortOrder], count: usize) -> CodecResult<usize> {
    if count > orders.len() {
        return Err(CodecError::malformed_key(format!(
            "asked for {count} fields of a {}-field tuple",
            orders.len()
        )));
    }
    let mut cursor = Cursor { bytes, pos: 0 };
    for &order in &orders[..count] {
        cursor.skip(order)?;
    }
    Ok(cursor.pos)
}

/// Smallest byte string greater than every string starting with `prefix`,
/// or `None` if none exists.
#[must_use]
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last != 0xFF {
            next.push(last + 1);
            return Some(next);
        }
    }
    None
}

fn encode_i64(n: i64) -> [u8; 8] {
    ((n as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_i64(raw: [u8; 8]) -> i64 {
    (u64::from_be_bytes(raw) ^ (1 << 63)) as i64
}

fn encode_f64(x: f64) -> CodecResult<[u8; 8]> {
    if x.is_nan() {
        return Err(CodecError::NotANumber);
    }
    let x = if x == 0.0 { 0.0_f64 } else { x };
    let bits = x.to_bits();
    let bits = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits ^ (1 << 63)
    };
    Ok(bits.to_be_bytes())
}

fn decode_f64(raw: [u8; 8]) -> f64 {
    let bits = u64::from_be_bytes(raw);
    let bits = if bits & (1 << 63) != 0 {
        bits ^ (1 << 63)
    } else {
        !bits
    };
    f64::from_bits(bits)
}

fn escape_into(data: &[u8], out: &mut Vec<u8>) {
    for &b in data {
        if b == 0x00 {
            out.extend_from_slice(&[ESCAPE, ESCAPED_ZERO]);
        } else {
            out.push(b);
        }
    }
}

fn complement_from(out: &mut [u8], start: usize, order: SortOrder) {
    if order == SortOrder::Descending {
        for b in &mut out[start..] {
            *b = !*b;
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn byte(&mut self, order: SortOrder) -> CodecResult<u8> {
        let b = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| CodecError::malformed_key("truncated key"))?;
        self.pos += 1;
        Ok(b ^ order.mask())
    }

    fn fixed(&mut self, order: SortOrder) -> CodecResult<[u8; 8]> {
        let mut raw = [0u8; 8];
        for slot in &mut raw {
            *slot = self.byte(order)?;
        }
        Ok(raw)
    }

    fn escaped(&mut self, order: SortOrder) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = self.byte(order)?;
            if b != ESCAPE {
                out.push(b);
                continue;
            }
            match self.byte(order)? {
                TERMINATOR => return Ok(out),
                ESCAPED_ZERO => out.push(0x00),
                other => {
                    return Err(CodecError::malformed_key(format!(
                        "invalid escape byte {other:#04x}"
                    )))
                }
            }
        }
    }

    fn value(&mut self, order: SortOrder) -> CodecResult<Value> {
        match self.byte(order)? {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => match self.byte(order)? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(CodecError::malformed_key(format!(
                    "invalid bool byte {other:#04x}"
                ))),
            },
            TAG_INTEGER => Ok(Value::Integer(decode_i64(self.fixed(order)?))),
            TAG_FLOAT => Ok(Value::Float(decode_f64(self.fixed(order)?))),
            TAG_TEXT => {
                let raw = self.escaped(order)?;
                String::from_utf8(raw)
                    .map(Value::Text)
                    .map_err(|_| CodecError::malformed_key("text field is not UTF-8"))
            }
            TAG_BYTES => Ok(Value::Bytes(self.escaped(order)?)),
            tag => Err(CodecError::malformed_key(format!("unknown tag {tag:#04x}"))),
        }
    }

    fn skip(&mut self, order: SortOrder) -> CodecResult<()> {
        match self.byte(order)? {
            TAG_NULL => {}
            TAG_BOOL => {
                self.byte(order)?;
            }
            TAG_INTEGER | TAG_FLOAT => {
                self.fixed(order)?;
            }
            TAG_TEXT | TAG_BYTES => {
                self.escaped(order)?;
            }
            tag => {
                return Err(CodecError::malformed_key(format!("unknown tag {tag:#04x}")))
            }
        }
        Ok(())
    }
}
