//! Sauron Schema
//!
//! Schema registry and wire codec for services that exchange typed records
//! over a message transport.
//!
//! ## Features
//!
//! - **Declared Records**: Records are built with [`RecordBuilder`] and validated once, when registered
//! - **Receivers**: Queries and commands grouped by namespace, checked against registered records
//! - **Lock Phase**: A locked registry rejects every mutation
//! - **Snapshots**: Registries serialize to JSON and are rebuilt with full re-validation
//! - **Wire Codec**: Records compile to Avro schemas; values encode to compact binary
//! - **Compatibility Checking**: Detection of breaking changes between snapshots
//!
//! ## Architecture
//!
//! ```text
//! RecordBuilder ──> SchemaRegistry ──lock──> Codec
//!                        │                    ├── WireCompiler (record + pointer caches)
//!                        │                    ├── value mapping (defaults, constraints)
//!                        │                    └── apache-avro datum encoding
//!                        └── normalize/parse <──> SchemaSnapshot (JSON)
//! ```

pub mod checksum;
pub mod codec;
pub mod compatibility;
pub mod compiler;
pub mod config;
pub mod error;
pub mod logical;
pub mod name;
pub mod receiver;
pub mod record;
pub mod registry;
pub mod snapshot;
pub mod types;
mod value;
pub mod wire;

pub use checksum::Checksum;
pub use codec::Codec;
pub use compatibility::{ChangeType, CompatibilityChecker, CompatibilityResult, SchemaChange};
pub use compiler::{CompilerStats, WireCompiler};
pub use config::{CodecConfig, OutputFormat, SauronConfig, SerializerKind, SnapshotConfig};
pub use error::{Result, SchemaError};
pub use logical::{LogicalType, TimestampMillis};
pub use name::is_valid_name;
pub use receiver::{Receiver, ReceiverKind, Transporter};
pub use record::{DefinitionId, NamedRecordType, RecordBuilder, RecordDefinition, RecordSource};
pub use registry::SchemaRegistry;
pub use snapshot::SchemaSnapshot;
pub use types::{
    ArrayType, BaseAttributes, CaseTransform, EnumType, Field, FieldOrder, MapType, NumberType, PointerType,
    RecordType, SchemaType, StringFormat, StringType, Trim, TypeKind, UnionType,
};
pub use wire::{WireEnum, WireField, WireRecord, WireType};
