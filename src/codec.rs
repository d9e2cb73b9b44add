//! Wire codec
//!
//! A [`Codec`] owns a locked registry and turns native values into bytes and
//! back. Avro schemas are derived from the compiled wire types on first use
//! and cached per record.
//!
//! ```
//! use sauron_schema::{Codec, NamedRecordType, SchemaRegistry, SchemaType};
//! use serde_json::json;
//!
//! let mut registry = SchemaRegistry::new("people", "avro");
//! registry
//!     .add_record(
//!         NamedRecordType::new("Person")
//!             .field("name", 1, SchemaType::string())
//!             .field("age", 2, SchemaType::int()),
//!     )
//!     .unwrap();
//!
//! let codec = Codec::new(registry).unwrap();
//! let bytes = codec.encode("Person", &json!({ "name": "Al", "age": 3 })).unwrap();
//! assert_eq!(codec.decode("Person", &bytes).unwrap(), json!({ "name": "Al", "age": 3 }));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use apache_avro::{from_avro_datum, to_avro_datum, Schema as AvroSchema};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::compatibility::{CompatibilityChecker, CompatibilityResult};
use crate::compiler::WireCompiler;
use crate::config::{CodecConfig, SerializerKind};
use crate::error::{Result, SchemaError};
use crate::logical::{LogicalType, TimestampMillis};
use crate::registry::SchemaRegistry;
use crate::snapshot::SchemaSnapshot;
use crate::value::ValueMapper;
use crate::wire::WireType;

/// Encoder and decoder for the records of one service
#[derive(Debug)]
pub struct Codec {
    registry: Arc<SchemaRegistry>,
    serializer: SerializerKind,
    logical: Arc<dyn LogicalType>,
    compiler: WireCompiler,
    values: ValueMapper,
    schemas: RwLock<HashMap<String, Arc<AvroSchema>>>,
    prepare_lock: Mutex<()>,
}

impl Codec {
    /// Lock `registry` and build a codec with the default configuration
    pub fn new(registry: SchemaRegistry) -> Result<Self> {
        Self::with_config(registry, CodecConfig::default())
    }

    pub fn with_config(registry: SchemaRegistry, config: CodecConfig) -> Result<Self> {
        Self::with_logical_type(registry, config, Arc::new(TimestampMillis))
    }

    /// Build a codec whose timestamps go through `logical`
    pub fn with_logical_type(
        mut registry: SchemaRegistry,
        config: CodecConfig,
        logical: Arc<dyn LogicalType>,
    ) -> Result<Self> {
        let serializer = if registry.serializer().is_empty() {
            config.serializer
        } else {
            registry.serializer().parse()?
        };

        registry.lock();
        let registry = Arc::new(registry);
        debug!(service = %registry.name(), serializer = %serializer, "Codec ready");

        Ok(Self {
            compiler: WireCompiler::new(registry.clone(), logical.clone()),
            values: ValueMapper::new(registry.clone(), logical.clone(), config),
            registry,
            serializer,
            logical,
            schemas: RwLock::new(HashMap::new()),
            prepare_lock: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn serializer(&self) -> SerializerKind {
        self.serializer
    }

    pub fn compiler(&self) -> &WireCompiler {
        &self.compiler
    }

    /// Compiled wire type of a registered record
    pub fn wire_type(&self, name: &str) -> Result<WireType> {
        self.compiler.compile(name)
    }

    /// Avro JSON schema of a registered record
    pub fn wire_schema(&self, name: &str) -> Result<JsonValue> {
        Ok(self.wire_type(name)?.to_avro_json())
    }

    /// Encode a native value as record `name`
    pub fn encode(&self, name: &str, value: &JsonValue) -> Result<Vec<u8>> {
        let schema = self.schema(name)?;
        let avro = self.values.encode_record(name, value)?;
        let bytes = to_avro_datum(&schema, avro)?;
        trace!(record = %name, bytes = bytes.len(), "Encoded value");
        Ok(bytes)
    }

    /// Decode bytes produced by [`encode`](Self::encode) for record `name`
    pub fn decode(&self, name: &str, bytes: &[u8]) -> Result<JsonValue> {
        let schema = self.schema(name)?;
        let avro = from_avro_datum(&schema, &mut &bytes[..], None)?;
        trace!(record = %name, bytes = bytes.len(), "Decoded value");
        self.values.decode_record(name, avro)
    }

    pub fn encode_as<T: Serialize>(&self, name: &str, value: &T) -> Result<Vec<u8>> {
        let native = serde_json::to_value(value)?;
        self.encode(name, &native)
    }

    pub fn decode_as<T: DeserializeOwned>(&self, name: &str, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_value(self.decode(name, bytes)?)?)
    }

    /// Check whether data written with `previous` can be read by this codec.
    ///
    /// Records present in both are compared, in this registry's order.
    pub fn check_against(&self, previous: &SchemaSnapshot) -> Result<IndexMap<String, CompatibilityResult>> {
        let checker = CompatibilityChecker::new().with_logical_type(self.logical.clone());
        self.check_against_with(previous, &checker)
    }

    /// [`check_against`](Self::check_against) with a configured checker
    pub fn check_against_with(
        &self,
        previous: &SchemaSnapshot,
        checker: &CompatibilityChecker,
    ) -> Result<IndexMap<String, CompatibilityResult>> {
        let previous = Codec::with_logical_type(
            SchemaRegistry::parse(previous.clone())?,
            CodecConfig::default(),
            self.logical.clone(),
        )?;

        let mut results = IndexMap::new();
        for record in self.registry.records() {
            if !previous.registry.has_record(&record.name) {
                continue;
            }
            let writer = previous.wire_type(&record.name)?;
            let reader = self.wire_type(&record.name)?;
            results.insert(record.name.clone(), checker.check(&writer, &reader));
        }
        Ok(results)
    }

    fn schema(&self, name: &str) -> Result<Arc<AvroSchema>> {
        let cached = self.schemas.read().get(name).cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }
        if !self.registry.has_record(name) {
            return Err(SchemaError::UnknownRecord {
                name: name.to_string(),
            });
        }

        let _guard = self.prepare_lock.lock();
        let cached = self.schemas.read().get(name).cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }

        let schema = Arc::new(AvroSchema::parse(&self.wire_schema(name)?)?);
        self.schemas.write().insert(name.to_string(), schema.clone());
        debug!(record = %name, "Prepared Avro schema");
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NamedRecordType;
    use crate::types::SchemaType;
    use serde_json::json;

    fn people() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new("people", "avro");
        registry
            .add_record(
                NamedRecordType::new("Person")
                    .field("name", 1, SchemaType::string())
                    .field("age", 2, SchemaType::int()),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_codec_locks_registry() {
        let codec = Codec::new(people()).unwrap();
        assert!(codec.registry().is_locked());
        assert_eq!(codec.serializer(), SerializerKind::Avro);
    }

    #[test]
    fn test_unknown_serializer() {
        let registry = SchemaRegistry::new("people", "protobuf");
        assert!(matches!(
            Codec::new(registry),
            Err(SchemaError::UnknownSerializer(name)) if name == "protobuf"
        ));

        let legacy = SchemaRegistry::new("people", "arvo");
        assert!(Codec::new(legacy).is_ok());
    }

    #[test]
    fn test_unknown_record() {
        let codec = Codec::new(people()).unwrap();
        assert!(matches!(
            codec.encode("Robot", &json!({})),
            Err(SchemaError::UnknownRecord { name }) if name == "Robot"
        ));
        assert!(matches!(codec.decode("Robot", &[]), Err(SchemaError::UnknownRecord { .. })));
    }

    #[test]
    fn test_wire_bytes_follow_field_order() {
        let codec = Codec::new(people()).unwrap();
        let bytes = codec.encode("Person", &json!({ "age": 3, "name": "Al" })).unwrap();
        // string "Al" (zigzag length 2 => 4), then int 3 (zigzag => 6)
        assert_eq!(bytes, vec![4, b'A', b'l', 6]);
    }

    #[test]
    fn test_truncated_input_is_codec_error() {
        let codec = Codec::new(people()).unwrap();
        assert!(matches!(codec.decode("Person", &[4, b'A']), Err(SchemaError::Codec(_))));
    }
}
