use std::collections::HashMap;

use super::error::DecodeError;
use super::value::Value;

/// Converts an already-parsed [`Value`] into concrete Rust types.
///
/// Every method here takes `self` by value since [`Value`] is a cheap,
/// `Copy`-like borrow over the underlying token bytes.
pub trait FromValue<'a>: Sized {
    fn from_value(value: Value<'a>) -> Result<Self, DecodeError>;
}

fn mismatch(accepted: &'static [&'static str], got: &Value<'_>) -> DecodeError {
    DecodeError::TokenMismatch {
        accepted,
        got: value_name(got),
    }
}

fn value_name(value: &Value<'_>) -> &'static str {
    match value {
        Value::SimpleString(_) => "simpleString",
        Value::SimpleError(_) => "simpleError",
        Value::Integer(_) => "integer",
        Value::BulkString(_) => "bulkString",
        Value::NullBulkString => "null",
        Value::BulkError(_) => "bulkError",
        Value::VerbatimString { .. } => "verbatimString",
        Value::Double(_) => "double",
        Value::Boolean(_) => "boolean",
        Value::Null => "null",
        Value::BigNumber(_) => "bigNumber",
        Value::Array(_) => "array",
        Value::NullArray => "null",
        Value::Set(_) => "set",
        Value::Push(_) => "push",
        Value::Map(_) => "map",
    }
}

/// Returns the error prefix and message for a RESP3 error value, if `value`
/// is one; otherwise `None`.
pub fn as_error(value: &Value<'_>) -> Option<(String, String)> {
    let raw = match value {
        Value::SimpleError(bytes) => std::str::from_utf8(bytes).ok()?,
        Value::BulkError(bytes) => std::str::from_utf8(bytes).ok()?,
        _ => return None,
    };
    match raw.split_once(' ') {
        Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_uppercase()) => {
            Some((prefix.to_string(), rest.to_string()))
        }
        _ => Some((String::new(), raw.to_string())),
    }
}

pub fn as_i64(value: Value<'_>) -> Result<i64, DecodeError> {
    match value {
        Value::Integer(n) => Ok(n),
        Value::BulkString(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| DecodeError::CanNotParseInteger(bytes.to_vec())),
        other => Err(mismatch(&["integer", "bulkString"], &other)),
    }
}

pub fn as_f64(value: Value<'_>) -> Result<f64, DecodeError> {
    match value {
        Value::Double(f) => Ok(f),
        Value::Integer(n) => Ok(n as f64),
        Value::BulkString(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| DecodeError::CanNotParseDouble(bytes.to_vec())),
        other => Err(mismatch(&["double", "integer", "bulkString"], &other)),
    }
}

pub fn as_bool(value: Value<'_>) -> Result<bool, DecodeError> {
    match value {
        Value::Boolean(b) => Ok(b),
        Value::Integer(n) => Ok(n != 0),
        other => Err(mismatch(&["boolean", "integer"], &other)),
    }
}

/// Decodes a bulk string, simple string, or verbatim string as owned bytes.
/// Fails on `NullBulkString`/`Null` — use [`as_optional`] to accept nulls.
pub fn as_bytes(value: Value<'_>) -> Result<Vec<u8>, DecodeError> {
    match value {
        Value::BulkString(bytes) | Value::SimpleString(bytes) => Ok(bytes.to_vec()),
        Value::VerbatimString { text, .. } => Ok(text.to_vec()),
        other => Err(mismatch(
            &["bulkString", "simpleString", "verbatimString"],
            &other,
        )),
    }
}

pub fn as_string(value: Value<'_>) -> Result<String, DecodeError> {
    let bytes = as_bytes(value)?;
    String::from_utf8(bytes).map_err(|e| DecodeError::UnexpectedToken(format!("invalid utf-8: {e}")))
}

/// Decodes an array, set, or push aggregate by decoding each element with
/// `F`, collecting into a `Vec`.
pub fn as_vec<'a, T>(value: Value<'a>) -> Result<Vec<T>, DecodeError>
where
    T: FromValue<'a>,
{
    let items = match value {
        Value::Array(view) | Value::Set(view) | Value::Push(view) => view,
        other => return Err(mismatch(&["array", "set", "push"], &other)),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items.iter() {
        let item =
            item.map_err(|e| DecodeError::UnexpectedToken(format!("malformed element: {e}")))?;
        out.push(T::from_value(item)?);
    }
    Ok(out)
}

/// Decodes a map aggregate into a `HashMap`, or an array of alternating
/// key/value elements (servers sometimes reply with an array even when the
/// command is documented to return a map).
pub fn as_dict<'a, K, V>(value: Value<'a>) -> Result<HashMap<K, V>, DecodeError>
where
    K: FromValue<'a> + std::hash::Hash + Eq,
    V: FromValue<'a>,
{
    match value {
        Value::Map(view) => {
            let mut out = HashMap::with_capacity(view.len());
            for pair in view.iter() {
                let (k, v) = pair
                    .map_err(|e| DecodeError::UnexpectedToken(format!("malformed pair: {e}")))?;
                out.insert(K::from_value(k)?, V::from_value(v)?);
            }
            Ok(out)
        }
        Value::Array(items) => {
            if items.len() % 2 != 0 {
                return Err(DecodeError::invalid_array_size(items.len(), "even"));
            }
            let mut out = HashMap::with_capacity(items.len() / 2);
            let mut iter = items.iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                let k = k.map_err(|e| DecodeError::UnexpectedToken(format!("{e}")))?;
                let v = v.map_err(|e| DecodeError::UnexpectedToken(format!("{e}")))?;
                out.insert(K::from_value(k)?, V::from_value(v)?);
            }
            Ok(out)
        }
        other => Err(mismatch(&["map", "array"], &other)),
    }
}

/// `None` for any null variant, `Some(T::from_value(..))` otherwise.
pub fn as_optional<'a, T>(value: Value<'a>) -> Result<Option<T>, DecodeError>
where
    T: FromValue<'a>,
{
    if value.is_null() {
        Ok(None)
    } else {
        T::from_value(value).map(Some)
    }
}

impl<'a> FromValue<'a> for i64 {
    fn from_value(value: Value<'a>) -> Result<Self, DecodeError> {
        as_i64(value)
    }
}

impl<'a> FromValue<'a> for f64 {
    fn from_value(value: Value<'a>) -> Result<Self, DecodeError> {
        as_f64(value)
    }
}

impl<'a> FromValue<'a> for bool {
    fn from_value(value: Value<'a>) -> Result<Self, DecodeError> {
        as_bool(value)
    }
}

impl<'a> FromValue<'a> for String {
    fn from_value(value: Value<'a>) -> Result<Self, DecodeError> {
        as_string(value)
    }
}

impl<'a> FromValue<'a> for Vec<u8> {
    fn from_value(value: Value<'a>) -> Result<Self, DecodeError> {
        as_bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::token::parse;
    use bytes::BytesMut;

    #[test]
    fn decodes_integer() {
        let mut b = BytesMut::from(&b":42\r\n"[..]);
        let token = parse(&mut b).unwrap().unwrap();
        let value = Value::from_token(&token).unwrap();
        assert_eq!(as_i64(value).unwrap(), 42);
    }

    #[test]
    fn decodes_vec_of_integers() {
        let mut b = BytesMut::from(&b"*3\r\n:1\r\n:2\r\n:3\r\n"[..]);
        let token = parse(&mut b).unwrap().unwrap();
        let value = Value::from_token(&token).unwrap();
        let items: Vec<i64> = as_vec(value).unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn decodes_dict_from_map() {
        let mut b = BytesMut::from(&b"%2\r\n$1\r\na\r\n:1\r\n$1\r\nb\r\n:2\r\n"[..]);
        let token = parse(&mut b).unwrap().unwrap();
        let value = Value::from_token(&token).unwrap();
        let dict: HashMap<String, i64> = as_dict(value).unwrap();
        assert_eq!(dict.get("a"), Some(&1));
        assert_eq!(dict.get("b"), Some(&2));
    }

    #[test]
    fn optional_accepts_null() {
        let mut b = BytesMut::from(&b"$-1\r\n"[..]);
        let token = parse(&mut b).unwrap().unwrap();
        let value = Value::from_token(&token).unwrap();
        let out: Option<String> = as_optional(value).unwrap();
        assert_eq!(out, None);
    }
}
