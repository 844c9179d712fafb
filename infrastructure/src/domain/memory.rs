//! Memory size parsing.
//!
//! Accepts a bare byte count or a number with a binary unit suffix. Anything
//! else is a hard error naming the literal; there is no silent default.

use std::fmt;

use serde::Deserializer;
use serde::de::{self, Visitor};

use crate::domain::error::InfrastructureError;

const KIB: u64 = 1024;

fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit {
        "" | "b" => Some(1),
        "k" | "kb" | "kib" => Some(KIB),
        "m" | "mb" | "mib" => Some(KIB.pow(2)),
        "g" | "gb" | "gib" => Some(KIB.pow(3)),
        "t" | "tb" | "tib" => Some(KIB.pow(4)),
        _ => None,
    }
}

/// Parse a memory size such as `"2097152"`, `"512k"`, `"1mb"` or `"1.5GiB"` into bytes.
///
/// # Errors
///
/// Returns [`InfrastructureError::InvalidMemoryLimit`] naming the literal when
/// the number or unit is not recognised or the result overflows.
pub fn parse_memory_size(raw: &str) -> Result<u64, InfrastructureError> {
    let invalid = || InfrastructureError::InvalidMemoryLimit {
        value: raw.to_string(),
    };
    let value = raw.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    if number.is_empty() {
        return Err(invalid());
    }
    let multiplier = unit_multiplier(unit.trim()).ok_or_else(invalid)?;

    if number.contains('.') {
        let parsed: f64 = number.parse().map_err(|_| invalid())?;
        #[allow(clippy::cast_precision_loss)]
        let bytes = parsed * multiplier as f64;
        #[allow(clippy::cast_precision_loss)]
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(invalid());
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        return Ok(bytes as u64);
    }

    let parsed: u64 = number.parse().map_err(|_| invalid())?;
    parsed.checked_mul(multiplier).ok_or_else(invalid)
}

/// Normalise a raw `mem_limit` value taken from a YAML document: integer
/// bytes, a size string or nothing.
///
/// # Errors
///
/// Returns [`InfrastructureError::InvalidMemoryLimit`] naming the literal for
/// booleans, negative or fractional numbers, collections and malformed
/// strings.
pub fn mem_limit_from_yaml(value: &serde_yaml::Value) -> Result<Option<u64>, InfrastructureError> {
    use serde_yaml::Value;

    let invalid = |literal: String| InfrastructureError::InvalidMemoryLimit { value: literal };
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_u64().map(Some).ok_or_else(|| invalid(n.to_string())),
        Value::String(s) => parse_memory_size(s).map(Some),
        Value::Bool(b) => Err(invalid(b.to_string())),
        Value::Sequence(_) => Err(invalid("[sequence]".to_string())),
        Value::Mapping(_) => Err(invalid("{map}".to_string())),
        Value::Tagged(tagged) => mem_limit_from_yaml(&tagged.value),
    }
}

/// Serde helper for `mem_limit`-style fields: integer bytes or a size string.
///
/// Booleans, floats, sequences and maps are rejected with a message containing
/// the literal value.
///
/// # Errors
///
/// Returns a deserialization error for unsupported types or malformed strings.
pub fn deserialize_mem_limit<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(MemLimitVisitor)
}

struct MemLimitVisitor;

fn unsupported<E: de::Error>(value: impl fmt::Display) -> E {
    E::custom(InfrastructureError::InvalidMemoryLimit {
        value: value.to_string(),
    })
}

impl<'de> Visitor<'de> for MemLimitVisitor {
    type Value = Option<u64>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte count or a size string such as \"512mb\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v).map(Some).map_err(|_| unsupported(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Err(unsupported(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Err(unsupported(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse_memory_size(v).map(Some).map_err(E::custom)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, _: A) -> Result<Self::Value, A::Error> {
        Err(unsupported("[sequence]"))
    }

    fn visit_map<A: de::MapAccess<'de>>(self, _: A) -> Result<Self::Value, A::Error> {
        Err(unsupported("{map}"))
    }
}
