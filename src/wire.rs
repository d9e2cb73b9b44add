//! Compiled wire schema
//!
//! A [`WireType`] is what the compiler produces from a schema type. It maps
//! one-to-one onto an Avro schema; [`WireType::to_avro_json`] renders it in
//! Avro's JSON schema syntax. Records are shared through `Arc`, so every
//! reference to a compiled record is the same object.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use crate::name::wire_name;

#[derive(Debug, Clone, PartialEq)]
pub enum WireType {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    /// Primitive annotated with a logical type
    Logical {
        logical_type: String,
        underlying: Box<WireType>,
    },
    Record(Arc<WireRecord>),
    Enum(Arc<WireEnum>),
    Array(Box<WireType>),
    Map(Box<WireType>),
    Union(Vec<WireType>),
    /// Name of a record that is still being compiled (self-reference)
    Ref(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    pub name: String,
    pub doc: Option<String>,
    /// Fields in ascending `order`
    pub fields: Vec<WireField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireField {
    pub name: String,
    pub order: i64,
    pub ty: WireType,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireEnum {
    pub name: String,
    pub doc: Option<String>,
    pub symbols: Vec<String>,
}

impl WireRecord {
    pub fn field(&self, name: &str) -> Option<&WireField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

impl WireType {
    /// The compiled record, if this is one
    pub fn as_record(&self) -> Option<&Arc<WireRecord>> {
        match self {
            WireType::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Whether this is a union whose first branch is `null`
    pub fn is_nullable(&self) -> bool {
        matches!(self, WireType::Union(branches) if branches.first() == Some(&WireType::Null))
    }

    /// Name of a named type (record, enum or reference)
    pub fn type_name(&self) -> Option<&str> {
        match self {
            WireType::Record(record) => Some(&record.name),
            WireType::Enum(enumeration) => Some(&enumeration.name),
            WireType::Ref(name) => Some(name),
            _ => None,
        }
    }

    /// Render as an Avro JSON schema.
    ///
    /// Each named type is defined at its first occurrence; later occurrences
    /// refer to it by name, as Avro requires.
    pub fn to_avro_json(&self) -> JsonValue {
        let mut emitted = HashSet::new();
        self.render(&mut emitted)
    }

    fn render(&self, emitted: &mut HashSet<String>) -> JsonValue {
        match self {
            WireType::Null => json!("null"),
            WireType::Boolean => json!("boolean"),
            WireType::Int => json!("int"),
            WireType::Long => json!("long"),
            WireType::Float => json!("float"),
            WireType::Double => json!("double"),
            WireType::Bytes => json!("bytes"),
            WireType::String => json!("string"),
            WireType::Logical {
                logical_type,
                underlying,
            } => json!({
                "type": underlying.render(emitted),
                "logicalType": logical_type,
            }),
            WireType::Record(record) => {
                let name = wire_name(&record.name);
                if !emitted.insert(name.clone()) {
                    return JsonValue::String(name);
                }
                let fields: Vec<JsonValue> = record
                    .fields
                    .iter()
                    .map(|field| {
                        let mut object = Map::new();
                        object.insert("name".into(), json!(wire_name(&field.name)));
                        object.insert("type".into(), field.ty.render(emitted));
                        if let Some(doc) = &field.doc {
                            object.insert("doc".into(), json!(doc));
                        }
                        if field.ty.is_nullable() {
                            object.insert("default".into(), JsonValue::Null);
                        }
                        JsonValue::Object(object)
                    })
                    .collect();

                let mut object = Map::new();
                object.insert("type".into(), json!("record"));
                object.insert("name".into(), json!(name));
                if let Some(doc) = &record.doc {
                    object.insert("doc".into(), json!(doc));
                }
                object.insert("fields".into(), JsonValue::Array(fields));
                JsonValue::Object(object)
            }
            WireType::Enum(enumeration) => {
                let name = wire_name(&enumeration.name);
                if !emitted.insert(name.clone()) {
                    return JsonValue::String(name);
                }
                let mut object = Map::new();
                object.insert("type".into(), json!("enum"));
                object.insert("name".into(), json!(name));
                if let Some(doc) = &enumeration.doc {
                    object.insert("doc".into(), json!(doc));
                }
                object.insert("symbols".into(), json!(enumeration.symbols));
                JsonValue::Object(object)
            }
            WireType::Array(items) => json!({ "type": "array", "items": items.render(emitted) }),
            WireType::Map(values) => json!({ "type": "map", "values": values.render(emitted) }),
            WireType::Union(branches) => {
                JsonValue::Array(branches.iter().map(|b| b.render(emitted)).collect())
            }
            WireType::Ref(name) => JsonValue::String(wire_name(name)),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireType::Null => write!(f, "null"),
            WireType::Boolean => write!(f, "boolean"),
            WireType::Int => write!(f, "int"),
            WireType::Long => write!(f, "long"),
            WireType::Float => write!(f, "float"),
            WireType::Double => write!(f, "double"),
            WireType::Bytes => write!(f, "bytes"),
            WireType::String => write!(f, "string"),
            WireType::Logical { logical_type, underlying } => {
                write!(f, "{}<{}>", logical_type, underlying)
            }
            WireType::Record(record) => write!(f, "record {}", record.name),
            WireType::Enum(enumeration) => write!(f, "enum {}", enumeration.name),
            WireType::Array(items) => write!(f, "array<{}>", items),
            WireType::Map(values) => write!(f, "map<{}>", values),
            WireType::Union(branches) => {
                write!(f, "union[")?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", branch)?;
                }
                write!(f, "]")
            }
            WireType::Ref(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Arc<WireRecord> {
        Arc::new(WireRecord {
            name: "Address".to_string(),
            doc: None,
            fields: vec![WireField {
                name: "street".to_string(),
                order: 1,
                ty: WireType::String,
                doc: None,
            }],
        })
    }

    #[test]
    fn test_named_type_rendered_once() {
        let address = address();
        let customer = WireType::Record(Arc::new(WireRecord {
            name: "Customer".to_string(),
            doc: Some("A customer".to_string()),
            fields: vec![
                WireField {
                    name: "home".to_string(),
                    order: 1,
                    ty: WireType::Record(address.clone()),
                    doc: None,
                },
                WireField {
                    name: "work".to_string(),
                    order: 2,
                    ty: WireType::Union(vec![WireType::Null, WireType::Record(address)]),
                    doc: None,
                },
            ],
        }));

        let rendered = customer.to_avro_json();
        assert_eq!(rendered["doc"], json!("A customer"));
        assert_eq!(rendered["fields"][0]["type"]["type"], json!("record"));
        assert_eq!(rendered["fields"][1]["type"], json!(["null", "Address"]));
        assert_eq!(rendered["fields"][1]["default"], JsonValue::Null);
        assert!(rendered["fields"][0].get("default").is_none());
    }

    #[test]
    fn test_logical_and_containers() {
        let ty = WireType::Map(Box::new(WireType::Array(Box::new(WireType::Logical {
            logical_type: "timestamp-millis".to_string(),
            underlying: Box::new(WireType::Long),
        }))));
        assert_eq!(
            ty.to_avro_json(),
            json!({
                "type": "map",
                "values": {
                    "type": "array",
                    "items": { "type": "long", "logicalType": "timestamp-millis" }
                }
            })
        );
        assert_eq!(ty.to_string(), "map<array<timestamp-millis<long>>>");
    }

    #[test]
    fn test_dollar_names_are_escaped() {
        let ty = WireType::Record(Arc::new(WireRecord {
            name: "$Meta".to_string(),
            doc: None,
            fields: vec![WireField {
                name: "$id".to_string(),
                order: 1,
                ty: WireType::Ref("$Meta".to_string()),
                doc: None,
            }],
        }));
        let rendered = ty.to_avro_json();
        assert_eq!(rendered["name"], json!("_S_Meta"));
        assert_eq!(rendered["fields"][0]["name"], json!("_S_id"));
        assert_eq!(rendered["fields"][0]["type"], json!("_S_Meta"));
    }
}
