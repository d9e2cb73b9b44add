//! Logical types: semantic overlays on primitive wire types
//!
//! The compiler receives a [`LogicalType`] adapter at construction and uses
//! it for every `timestamp` in the schema. The default adapter,
//! [`TimestampMillis`], stores milliseconds since the Unix epoch in a `long`.

use std::fmt;

use apache_avro::types::Value as AvroValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

use crate::wire::WireType;

/// Conversion hooks between native values and a logical type's representation
pub trait LogicalType: Send + Sync + fmt::Debug {
    /// Name written as `logicalType` in the wire schema
    fn logical_name(&self) -> &str;

    /// Primitive wire type carrying the representation
    fn underlying(&self) -> WireType {
        WireType::Long
    }

    /// Convert a native value into its wire representation
    fn to_representation(&self, value: &JsonValue) -> Result<i64, String>;

    /// Convert a wire representation back into a native value
    fn from_representation(&self, representation: i64) -> Result<JsonValue, String>;

    /// Whether data written as `other` can be read as this logical type
    fn can_resolve_from(&self, other: &WireType) -> bool;

    /// Avro value for a representation
    fn to_avro(&self, representation: i64) -> AvroValue {
        AvroValue::Long(representation)
    }

    /// The annotated wire type
    fn wire_type(&self) -> WireType {
        WireType::Logical {
            logical_type: self.logical_name().to_string(),
            underlying: Box::new(self.underlying()),
        }
    }
}

/// Timestamps as milliseconds since the Unix epoch
///
/// Writes accept integer milliseconds or RFC 3339 strings; reads produce
/// RFC 3339 strings in UTC with millisecond precision, which deserialize
/// directly into `chrono::DateTime<Utc>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampMillis;

impl TimestampMillis {
    pub const NAME: &'static str = "timestamp-millis";
}

impl LogicalType for TimestampMillis {
    fn logical_name(&self) -> &str {
        Self::NAME
    }

    fn to_representation(&self, value: &JsonValue) -> Result<i64, String> {
        match value {
            JsonValue::Number(n) => n
                .as_i64()
                .ok_or_else(|| format!("timestamp {} is not an integer number of milliseconds", n)),
            JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", s, e)),
            other => Err(format!("expected timestamp, got {}", other)),
        }
    }

    fn from_representation(&self, representation: i64) -> Result<JsonValue, String> {
        DateTime::<Utc>::from_timestamp_millis(representation)
            .map(|dt| JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .ok_or_else(|| format!("timestamp {} is out of range", representation))
    }

    fn can_resolve_from(&self, other: &WireType) -> bool {
        match other {
            WireType::Long | WireType::String => true,
            WireType::Logical { logical_type, .. } => logical_type == Self::NAME,
            _ => false,
        }
    }

    fn to_avro(&self, representation: i64) -> AvroValue {
        AvroValue::TimestampMillis(representation)
    }
}
