//! Decodes a `CLUSTER SHARDS` reply into [`Shard`]s (spec §6, "Cluster
//! reply shape"). Accepts both the RESP3 map shape and the legacy
//! array-of-alternating-pairs shape for both the per-shard and per-node
//! records, since proxies and older servers emit either.

use crate::resp::{DecodeError, Value};

use super::topology::{Health, Role, Shard, ShardNode};

pub fn decode_shards_reply(value: Value<'_>) -> Result<Vec<Shard>, DecodeError> {
    let shards = as_items(value)?;
    shards.into_iter().map(decode_shard).collect()
}

fn decode_shard(value: Value<'_>) -> Result<Shard, DecodeError> {
    let fields = as_field_pairs(value)?;
    let mut slots = Vec::new();
    let mut nodes = Vec::new();
    for (key, val) in fields {
        match field_name(&key)?.as_str() {
            "slots" => slots = decode_slot_ranges(val)?,
            "nodes" => {
                for node in as_items(val)? {
                    nodes.push(decode_node(node)?);
                }
            }
            _ => {}
        }
    }
    Ok(Shard { slots, nodes })
}

fn decode_node(value: Value<'_>) -> Result<ShardNode, DecodeError> {
    let fields = as_field_pairs(value)?;
    let mut id = None;
    let mut ip = None;
    let mut hostname = None;
    let mut endpoint = None;
    let mut port = None;
    let mut tls_port = None;
    let mut role = None;
    let mut replication_offset = 0i64;
    let mut health = None;

    for (key, val) in fields {
        match field_name(&key)?.as_str() {
            "id" => id = Some(field_string(val)?),
            "ip" => ip = Some(field_string(val)?),
            "hostname" => hostname = Some(field_string(val)?),
            "endpoint" => endpoint = Some(field_string(val)?),
            "port" => port = Some(field_i64(val)? as u16),
            "tls-port" => tls_port = Some(field_i64(val)? as u16),
            "role" => role = Some(decode_role(&field_string(val)?)?),
            "replication-offset" => replication_offset = field_i64(val)?,
            "health" => health = Some(decode_health(&field_string(val)?)?),
            _ => {}
        }
    }

    Ok(ShardNode {
        id: id.ok_or_else(|| DecodeError::MissingToken { key: "id".into() })?,
        ip,
        hostname,
        endpoint: endpoint.ok_or_else(|| DecodeError::MissingToken { key: "endpoint".into() })?,
        port: port.ok_or_else(|| DecodeError::MissingToken { key: "port".into() })?,
        tls_port,
        role: role.ok_or_else(|| DecodeError::MissingToken { key: "role".into() })?,
        replication_offset,
        health: health.ok_or_else(|| DecodeError::MissingToken { key: "health".into() })?,
    })
}

/// `"master"` and `"primary"` are both accepted spellings for the primary
/// role (spec §9, Open Questions).
fn decode_role(raw: &str) -> Result<Role, DecodeError> {
    match raw {
        "master" | "primary" => Ok(Role::Primary),
        "replica" => Ok(Role::Replica),
        other => Err(DecodeError::UnexpectedToken(format!(
            "unrecognized cluster node role {other:?}"
        ))),
    }
}

fn decode_health(raw: &str) -> Result<Health, DecodeError> {
    match raw {
        "online" => Ok(Health::Online),
        "loading" => Ok(Health::Loading),
        "fail" => Ok(Health::Failed),
        other => Err(DecodeError::UnexpectedToken(format!(
            "unrecognized cluster node health {other:?}"
        ))),
    }
}

/// The `"slots"` field is a flat array of `(start, end)` pairs.
fn decode_slot_ranges(value: Value<'_>) -> Result<Vec<std::ops::RangeInclusive<u16>>, DecodeError> {
    let items = as_items(value)?;
    if items.len() % 2 != 0 {
        return Err(DecodeError::invalid_array_size(items.len(), "even".to_string()));
    }
    let mut ranges = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(start), Some(end)) = (iter.next(), iter.next()) {
        let start = field_i64(start)? as u16;
        let end = field_i64(end)? as u16;
        ranges.push(start..=end);
    }
    Ok(ranges)
}

/// Flattens an array/set/push into an owned `Vec<Value>`.
fn as_items<'a>(value: Value<'a>) -> Result<Vec<Value<'a>>, DecodeError> {
    match value {
        Value::Array(v) | Value::Set(v) | Value::Push(v) => v
            .iter()
            .collect::<Result<_, _>>()
            .map_err(|e| DecodeError::UnexpectedToken(format!("malformed element: {e}"))),
        other => Err(DecodeError::TokenMismatch {
            accepted: &["array", "set", "push"],
            got: describe(&other),
        }),
    }
}

/// Accepts either a RESP3 map or an array of alternating key/value
/// elements for one record (spec §6: "accepts both array-of-key-value-
/// pairs and map representations for each shard").
fn as_field_pairs<'a>(value: Value<'a>) -> Result<Vec<(Value<'a>, Value<'a>)>, DecodeError> {
    match value {
        Value::Map(m) => m
            .iter()
            .collect::<Result<_, _>>()
            .map_err(|e| DecodeError::UnexpectedToken(format!("malformed pair: {e}"))),
        Value::Array(_) | Value::Set(_) | Value::Push(_) => {
            let items = as_items(value)?;
            if items.len() % 2 != 0 {
                return Err(DecodeError::invalid_array_size(items.len(), "even".to_string()));
            }
            Ok(items.chunks(2).map(|c| (c[0].clone(), c[1].clone())).collect())
        }
        other => Err(DecodeError::TokenMismatch {
            accepted: &["map", "array"],
            got: describe(&other),
        }),
    }
}

fn field_name(value: &Value<'_>) -> Result<String, DecodeError> {
    field_string(value.clone())
}

fn field_string(value: Value<'_>) -> Result<String, DecodeError> {
    match value {
        Value::BulkString(bytes) | Value::SimpleString(bytes) => {
            String::from_utf8(bytes.to_vec())
                .map_err(|e| DecodeError::UnexpectedToken(format!("invalid utf-8: {e}")))
        }
        other => Err(DecodeError::TokenMismatch {
            accepted: &["bulkString", "simpleString"],
            got: describe(&other),
        }),
    }
}

fn field_i64(value: Value<'_>) -> Result<i64, DecodeError> {
    crate::resp::as_i64(value)
}

fn describe(value: &Value<'_>) -> &'static str {
    match value {
        Value::SimpleString(_) => "simpleString",
        Value::SimpleError(_) => "simpleError",
        Value::Integer(_) => "integer",
        Value::BulkString(_) => "bulkString",
        Value::NullBulkString | Value::Null | Value::NullArray => "null",
        Value::BulkError(_) => "bulkError",
        Value::VerbatimString { .. } => "verbatimString",
        Value::Double(_) => "double",
        Value::Boolean(_) => "boolean",
        Value::BigNumber(_) => "bigNumber",
        Value::Array(_) => "array",
        Value::Set(_) => "set",
        Value::Push(_) => "push",
        Value::Map(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::{parse, Value};
    use bytes::BytesMut;

    fn value_from(bytes: &'static [u8]) -> Value<'static> {
        let mut b = BytesMut::from(bytes);
        let token = parse(&mut b).unwrap().unwrap();
        Value::from_token(Box::leak(Box::new(token))).unwrap()
    }

    #[test]
    fn decodes_map_shaped_reply() {
        let wire = b"*1\r\n\
            %2\r\n\
            $5\r\nslots\r\n*2\r\n:0\r\n:16383\r\n\
            $5\r\nnodes\r\n*1\r\n\
            %7\r\n\
            $2\r\nid\r\n$4\r\nnid1\r\n\
            $8\r\nendpoint\r\n$4\r\nhost\r\n\
            $4\r\nport\r\n:6379\r\n\
            $4\r\nrole\r\n$6\r\nmaster\r\n\
            $18\r\nreplication-offset\r\n:0\r\n\
            $6\r\nhealth\r\n$6\r\nonline\r\n\
            $2\r\nip\r\n$4\r\nhost\r\n";
        let value = value_from(wire);
        let shards = decode_shards_reply(value).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].slots, vec![0..=16383]);
        assert_eq!(shards[0].nodes[0].role, Role::Primary);
        assert_eq!(shards[0].nodes[0].health, Health::Online);
    }

    #[test]
    fn accepts_array_shaped_records() {
        let wire = b"*1\r\n\
            *4\r\n\
            $5\r\nslots\r\n*2\r\n:0\r\n:16383\r\n\
            $5\r\nnodes\r\n*1\r\n\
            *10\r\n\
            $2\r\nid\r\n$4\r\nnid1\r\n\
            $8\r\nendpoint\r\n$4\r\nhost\r\n\
            $4\r\nport\r\n:6379\r\n\
            $4\r\nrole\r\n$7\r\nprimary\r\n\
            $18\r\nreplication-offset\r\n:0\r\n";
        let value = value_from(wire);
        let err = decode_shards_reply(value).unwrap_err();
        // missing "health" field in this trimmed fixture
        assert!(matches!(err, DecodeError::MissingToken { .. }));
    }

    #[test]
    fn rejects_unknown_role_spelling() {
        assert!(matches!(
            decode_role("arbiter"),
            Err(DecodeError::UnexpectedToken(_))
        ));
    }
}
