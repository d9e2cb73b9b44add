//! Persisted form of a service schema
//!
//! ```json
//! {
//!   "name": "people",
//!   "serializer": "avro",
//!   "records": { "Person": { "name": "Person", "fields": { ... } } },
//!   "receivers": { "people": { "get": { "name": "get", "type": "query", ... } } }
//! }
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::Result;
use crate::receiver::Receiver;
use crate::record::NamedRecordType;

/// Snapshot produced by [`SchemaRegistry::normalize`](crate::SchemaRegistry::normalize)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub name: String,
    pub serializer: String,
    /// Records in registration order
    #[serde(default)]
    pub records: IndexMap<String, NamedRecordType>,
    /// namespace -> receiver name -> receiver
    #[serde(default)]
    pub receivers: IndexMap<String, IndexMap<String, Receiver>>,
}

impl SchemaSnapshot {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let content = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(content)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: impl AsRef<Path>, pretty: bool) -> Result<()> {
        fs::write(path, self.to_json(pretty)?)?;
        Ok(())
    }

    /// SHA256 fingerprint, independent of key order
    pub fn fingerprint(&self) -> Result<Checksum> {
        let value = serde_json::to_value(self)?;
        Ok(Checksum::from_json(&value)?)
    }
}
