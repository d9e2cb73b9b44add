//! Record declarations
//!
//! Records are declared with a [`RecordBuilder`] and finalized into a
//! [`RecordDefinition`]: an opaque handle carrying the [`NamedRecordType`].
//! The registry tracks which handle each record name came from, so adding the
//! same definition twice is a no-op while a second definition under an
//! already-used name is rejected.
//!
//! ```
//! use sauron_schema::{RecordBuilder, SchemaType};
//!
//! let address = RecordBuilder::new("Address")
//!     .field("street", 1, SchemaType::string())
//!     .build();
//!
//! let person = RecordBuilder::new("Person")
//!     .field("name", 1, SchemaType::string())
//!     .pointer("home", 2, &address)
//!     .build();
//!
//! assert_eq!(person.name(), "Person");
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{Field, SchemaType};

fn is_false(value: &bool) -> bool {
    !*value
}

/// A record's persisted form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRecordType {
    pub name: String,
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
    /// Marks records published as signals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
}

impl NamedRecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            signal: None,
            description: None,
            deprecated: false,
        }
    }

    pub fn field(mut self, name: impl Into<String>, order: i64, ty: SchemaType) -> Self {
        self.fields.insert(name.into(), Field::new(order, ty));
        self
    }

    pub fn is_signal(&self) -> bool {
        self.signal == Some(true)
    }

    /// Fields sorted by ascending `order`
    pub fn ordered_fields(&self) -> Vec<(&String, &Field)> {
        crate::types::ordered_fields(&self.fields)
    }
}

/// Identity of a record definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefinitionId(u64);

impl DefinitionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a declared record
///
/// Clones share identity; two handles compare equal only if they come from
/// the same [`RecordBuilder::build`] call.
#[derive(Clone)]
pub struct RecordDefinition {
    id: DefinitionId,
    record: Arc<NamedRecordType>,
}

impl RecordDefinition {
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &NamedRecordType {
        &self.record
    }
}

impl PartialEq for RecordDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordDefinition {}

impl fmt::Debug for RecordDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordDefinition({} {})", self.record.name, self.id)
    }
}

/// Accumulates fields for a record declaration
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: NamedRecordType,
}

impl RecordBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            record: NamedRecordType::new(name),
        }
    }

    /// Declare a field; redeclaring a name replaces the earlier entry
    pub fn field(mut self, name: impl Into<String>, order: i64, ty: SchemaType) -> Self {
        self.record.fields.insert(name.into(), Field::new(order, ty));
        self
    }

    /// Declare a field pointing at another record definition
    pub fn pointer(self, name: impl Into<String>, order: i64, target: &RecordDefinition) -> Self {
        self.field(name, order, SchemaType::pointer_to(target))
    }

    /// Declare an array field whose items point at another record definition
    pub fn array_of(self, name: impl Into<String>, order: i64, target: &RecordDefinition) -> Self {
        self.field(name, order, SchemaType::array(SchemaType::pointer_to(target)))
    }

    pub fn signal(mut self) -> Self {
        self.record.signal = Some(true);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.description = Some(description.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.record.deprecated = true;
        self
    }

    /// Finalize into a definition handle with a fresh identity
    pub fn build(self) -> RecordDefinition {
        RecordDefinition {
            id: DefinitionId::next(),
            record: Arc::new(self.record),
        }
    }

    /// Finalize into a plain record value without identity
    pub fn into_record(self) -> NamedRecordType {
        self.record
    }
}

/// Anything [`SchemaRegistry::add_record`](crate::SchemaRegistry::add_record) accepts
#[derive(Debug, Clone)]
pub enum RecordSource {
    /// Reference to an already-registered record
    Name(String),
    /// A declared definition, tracked by identity
    Definition(RecordDefinition),
    /// A plain record value, tracked by name only
    Literal(NamedRecordType),
}

impl From<&str> for RecordSource {
    fn from(name: &str) -> Self {
        RecordSource::Name(name.to_string())
    }
}

impl From<String> for RecordSource {
    fn from(name: String) -> Self {
        RecordSource::Name(name)
    }
}

impl From<RecordDefinition> for RecordSource {
    fn from(definition: RecordDefinition) -> Self {
        RecordSource::Definition(definition)
    }
}

impl From<&RecordDefinition> for RecordSource {
    fn from(definition: &RecordDefinition) -> Self {
        RecordSource::Definition(definition.clone())
    }
}

impl From<NamedRecordType> for RecordSource {
    fn from(record: NamedRecordType) -> Self {
        RecordSource::Literal(record)
    }
}
