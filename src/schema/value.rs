//! Schema-free value used for every externally defined record field.
//!
//! Decodes from any self-describing serde format (MessagePack sections,
//! JSON output) and re-encodes without loss for the types both share.
//! Map keys are always strings; integer or boolean keys are stringified.
//! MessagePack timestamps (extension type -1) become RFC 3339 strings; any
//! other extension value surfaces as a `[type, bytes]` array.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

pub type Record = BTreeMap<String, Value>;

/// MessagePack extension type reserved for timestamps.
pub const TIMESTAMP_EXT: i8 = -1;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// Only for integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Record),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null      => serializer.serialize_unit(),
            Value::Bool(b)   => serializer.serialize_bool(*b),
            Value::Int(n)    => serializer.serialize_i64(*n),
            Value::UInt(n)   => serializer.serialize_u64(*n),
            Value::Float(f)  => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b)  => serializer.serialize_bytes(b),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any self-describing value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> { Ok(Value::Bool(v)) }
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E>   { Ok(Value::Int(v)) }
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E>   { Ok(Value::Float(v)) }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map(Value::Int).unwrap_or(Value::UInt(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E>      { Ok(Value::String(v.to_owned())) }
    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> { Ok(Value::String(v)) }
    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E>   { Ok(Value::Bytes(v.to_vec())) }
    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> { Ok(Value::Bytes(v)) }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> { Ok(Value::Null) }
    fn visit_none<E: de::Error>(self) -> Result<Value, E> { Ok(Value::Null) }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        Value::deserialize(d)
    }

    /// MessagePack extensions arrive here as a `(type, bytes)` pair.
    fn visit_newtype_struct<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => from_extension(items),
            other => other,
        })
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut out = Record::new();
        while let Some((MapKey(k), v)) = map.next_entry::<MapKey, Value>()? {
            out.insert(k, v);
        }
        Ok(Value::Map(out))
    }
}

fn from_extension(items: Vec<Value>) -> Value {
    if let [Value::Int(kind), Value::Bytes(data)] = items.as_slice() {
        if *kind == i64::from(TIMESTAMP_EXT) {
            if let Some(ts) = decode_timestamp(data) {
                return Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true));
            }
        }
    }
    Value::Array(items)
}

/// Decode a timestamp32, timestamp64 or timestamp96 extension payload.
pub fn decode_timestamp(data: &[u8]) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match data.len() {
        4 => (i64::from(u32::from_be_bytes(data.try_into().ok()?)), 0),
        8 => {
            // nanoseconds in the upper 30 bits, seconds in the lower 34
            let raw = u64::from_be_bytes(data.try_into().ok()?);
            ((raw & 0x3_ffff_ffff) as i64, (raw >> 34) as u32)
        }
        12 => {
            let nanos = u32::from_be_bytes(data[..4].try_into().ok()?);
            let secs  = i64::from_be_bytes(data[4..].try_into().ok()?);
            (secs, nanos)
        }
        _ => return None,
    };
    if nanos >= 1_000_000_000 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs, nanos)
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Map key accepting strings, integers and booleans.
struct MapKey(String);

struct MapKeyVisitor;

impl<'de> Visitor<'de> for MapKeyVisitor {
    type Value = MapKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, integer or boolean map key")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<MapKey, E>      { Ok(MapKey(v.to_owned())) }
    fn visit_string<E: de::Error>(self, v: String) -> Result<MapKey, E> { Ok(MapKey(v)) }
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MapKey, E>       { Ok(MapKey(v.to_string())) }
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MapKey, E>       { Ok(MapKey(v.to_string())) }
    fn visit_bool<E: de::Error>(self, v: bool) -> Result<MapKey, E>     { Ok(MapKey(v.to_string())) }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<MapKey, E> {
        Ok(MapKey(String::from_utf8_lossy(v).into_owned()))
    }
}

impl<'de> Deserialize<'de> for MapKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MapKeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msgpack_to_json() {
        let mut record = Record::new();
        record.insert("id".into(), "m1".into());
        record.insert("pinned".into(), Value::Bool(false));
        record.insert("nonce".into(), Value::Null);
        record.insert("flags".into(), Value::Int(-4));
        record.insert("embeds".into(), Value::Array(vec![Value::Map(Record::new())]));
        let packed = rmp_serde::to_vec_named(&record).unwrap();

        let decoded: Value = rmp_serde::from_slice(&packed).unwrap();
        assert_eq!(decoded, Value::Map(record.clone()));

        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["flags"], -4);
        assert!(json["nonce"].is_null());
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::Map(record));
    }

    /// `{"id": "m1", "timestamp": <ext -1, payload>}` as raw MessagePack.
    fn message_with_ext(ext_header: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0x82, 0xa2, b'i', b'd', 0xa2, b'm', b'1', 0xa9];
        out.extend_from_slice(b"timestamp");
        out.extend_from_slice(ext_header);
        out.extend_from_slice(payload);
        out
    }

    fn timestamp_of(packed: &[u8]) -> Value {
        let Value::Map(m) = rmp_serde::from_slice::<Value>(packed).unwrap() else { panic!("expected map") };
        m["timestamp"].clone()
    }

    #[test]
    fn timestamp_extensions_become_rfc3339() {
        // timestamp32: fixext4, type -1
        let ts32 = message_with_ext(&[0xd6, 0xff], &0x644f_a800u32.to_be_bytes());
        assert_eq!(timestamp_of(&ts32), Value::from("2023-05-01T11:52:32Z"));

        // timestamp64: 500ms past 2023-05-01T12:00:00Z
        let ts64 = message_with_ext(&[0xd7, 0xff], &0x7735_9400_644f_a9c0u64.to_be_bytes());
        assert_eq!(timestamp_of(&ts64), Value::from("2023-05-01T12:00:00.500Z"));

        // timestamp96: ext8, length 12, type -1
        let mut payload = 7u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&(-1i64).to_be_bytes());
        let ts96 = message_with_ext(&[0xc7, 12, 0xff], &payload);
        assert_eq!(timestamp_of(&ts96), Value::from("1969-12-31T23:59:59.000000007Z"));

        let json = serde_json::to_string(&rmp_serde::from_slice::<Value>(&ts32).unwrap()).unwrap();
        assert_eq!(json, r#"{"id":"m1","timestamp":"2023-05-01T11:52:32Z"}"#);
    }

    #[test]
    fn other_extensions_kept_as_pairs() {
        let packed = message_with_ext(&[0xd4, 0x05], &[0x2a]);
        assert_eq!(
            timestamp_of(&packed),
            Value::Array(vec![Value::Int(5), Value::Bytes(vec![0x2a])])
        );

        // out-of-range nanoseconds are not a valid timestamp
        let bad = message_with_ext(&[0xd7, 0xff], &u64::MAX.to_be_bytes());
        assert!(matches!(timestamp_of(&bad), Value::Array(_)));
    }

    #[test]
    fn large_unsigned_kept() {
        let packed = rmp_serde::to_vec(&u64::MAX).unwrap();
        let decoded: Value = rmp_serde::from_slice(&packed).unwrap();
        assert_eq!(decoded, Value::UInt(u64::MAX));
    }

    #[test]
    fn integer_keys_are_stringified() {
        let mut map = BTreeMap::new();
        map.insert(7u32, "seven");
        let packed = rmp_serde::to_vec(&map).unwrap();
        let decoded: Value = rmp_serde::from_slice(&packed).unwrap();
        let Value::Map(m) = decoded else { panic!("expected map") };
        assert_eq!(m.get("7").and_then(Value::as_str), Some("seven"));
    }
}
