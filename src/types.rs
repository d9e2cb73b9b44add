//! Schema type algebra
//!
//! A [`SchemaType`] is a kind tag ([`TypeKind`]) plus the attributes shared by
//! every type ([`BaseAttributes`]). Serialized, both are flattened into one
//! JSON object:
//!
//! ```json
//! { "type": "string", "nullable": true, "max": 64 }
//! ```
//!
//! A bare string (`"int"`) is accepted as shorthand for a primitive type.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, SchemaError};
use crate::record::RecordDefinition;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Attributes shared by every schema type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseAttributes {
    /// Explicit wire name for inline records and enums
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether `null` is accepted in addition to the type itself
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    /// Value used when a record field is absent from an encoded value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

/// A schema type: kind plus shared attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SchemaTypeRepr")]
pub struct SchemaType {
    #[serde(flatten)]
    pub base: BaseAttributes,
    #[serde(flatten)]
    pub kind: TypeKind,
}

/// Kind tag of a schema type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypeKind {
    Null,
    Boolean,
    Int(NumberType),
    Long(NumberType),
    Float(NumberType),
    Double(NumberType),
    Timestamp,
    Bytes,
    String(StringType),
    Record(RecordType),
    Enum(EnumType),
    Array(ArrayType),
    Map(MapType),
    Union(UnionType),
    Pointer(PointerType),
    /// Any tag this crate does not know; rejected by the compiler
    #[serde(other)]
    Unsupported,
}

/// Range constraints for numeric types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub positive: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub negative: bool,
}

/// Well-known string formats checked on encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StringFormat {
    Email,
    Uuid,
    ObjectId,
    Cuid,
    Luhn,
    Mac,
    Url,
    Alpha,
    Numeric,
    Alphanum,
    Alphadash,
    Hex,
    SingleLine,
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trim {
    Both,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseTransform {
    Lowercase,
    Uppercase,
}

/// String constraints and write-side transforms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<StringFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<Trim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_transform: Option<CaseTransform>,
}

/// Declared field position, kept as written until the registry checks it.
///
/// Snapshots may carry any JSON value here; only integral numbers (`3` or
/// `3.0`) name a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldOrder(JsonValue);

impl FieldOrder {
    /// The integer position, if the declared value is integral
    pub fn position(&self) -> Option<i64> {
        let JsonValue::Number(number) = &self.0 else {
            return None;
        };
        number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        })
    }
}

impl From<i64> for FieldOrder {
    fn from(order: i64) -> Self {
        FieldOrder(JsonValue::from(order))
    }
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record field: a schema type with its wire position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Wire position; fields are laid out in ascending order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<FieldOrder>,
    #[serde(flatten)]
    pub ty: SchemaType,
}

impl Field {
    pub fn new(order: i64, ty: SchemaType) -> Self {
        Self {
            order: Some(order.into()),
            ty,
        }
    }

    /// The declared position, if present and integral
    pub fn position(&self) -> Option<i64> {
        self.order.as_ref().and_then(FieldOrder::position)
    }

    /// The declared position, checked to be a positive integer
    pub fn checked_order(&self, path: &str) -> Result<i64> {
        let order = self.order.as_ref().ok_or_else(|| SchemaError::MissingOrder {
            path: path.to_string(),
        })?;
        match order.position() {
            Some(position) if position >= 1 => Ok(position),
            _ => Err(SchemaError::InvalidOrder {
                path: path.to_string(),
                order: order.to_string(),
            }),
        }
    }
}

/// Inline record type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
}

impl RecordType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, order: i64, ty: SchemaType) -> Self {
        self.fields.insert(name.into(), Field::new(order, ty));
        self
    }

    /// Fields sorted by ascending `order`; fields without an order sort last
    pub fn ordered_fields(&self) -> Vec<(&String, &Field)> {
        ordered_fields(&self.fields)
    }
}

pub(crate) fn ordered_fields(fields: &IndexMap<String, Field>) -> Vec<(&String, &Field)> {
    let mut sorted: Vec<_> = fields.iter().collect();
    sorted.sort_by_key(|(_, field)| field.position().unwrap_or(i64::MAX));
    sorted
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayType {
    pub items: Box<SchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
}

/// Map with string keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapType {
    pub values: Box<SchemaType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnionType {
    #[serde(default)]
    pub union: Vec<SchemaType>,
}

/// Reference to a named record
///
/// `target` is the resolved record name (`ref`). `forward` holds a record
/// definition that has not been registered yet (`$ref`); the registry
/// registers it and fills in `target` during validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerType {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip)]
    pub forward: Option<RecordDefinition>,
}

/// One alternative of a type that lowers to a wire union
#[derive(Debug, Clone, Copy)]
pub enum Branch<'a> {
    Null,
    /// The type lowered without its `nullable` wrapper
    Of(&'a SchemaType),
}

impl SchemaType {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            base: BaseAttributes::default(),
            kind,
        }
    }

    pub fn null() -> Self {
        Self::new(TypeKind::Null)
    }

    pub fn boolean() -> Self {
        Self::new(TypeKind::Boolean)
    }

    pub fn int() -> Self {
        Self::new(TypeKind::Int(NumberType::default()))
    }

    pub fn long() -> Self {
        Self::new(TypeKind::Long(NumberType::default()))
    }

    pub fn float() -> Self {
        Self::new(TypeKind::Float(NumberType::default()))
    }

    pub fn double() -> Self {
        Self::new(TypeKind::Double(NumberType::default()))
    }

    pub fn timestamp() -> Self {
        Self::new(TypeKind::Timestamp)
    }

    pub fn bytes() -> Self {
        Self::new(TypeKind::Bytes)
    }

    pub fn string() -> Self {
        Self::new(TypeKind::String(StringType::default()))
    }

    pub fn string_with(rules: StringType) -> Self {
        Self::new(TypeKind::String(rules))
    }

    pub fn record(record: RecordType) -> Self {
        Self::new(TypeKind::Record(record))
    }

    pub fn enumeration<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(TypeKind::Enum(EnumType {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn array(items: SchemaType) -> Self {
        Self::new(TypeKind::Array(ArrayType {
            items: Box::new(items),
            min: None,
            max: None,
            length: None,
            unique: false,
        }))
    }

    pub fn map(values: SchemaType) -> Self {
        Self::new(TypeKind::Map(MapType {
            values: Box::new(values),
        }))
    }

    pub fn union(alternatives: Vec<SchemaType>) -> Self {
        Self::new(TypeKind::Union(UnionType {
            union: alternatives,
        }))
    }

    /// Pointer to a record registered under `target`
    pub fn pointer(target: impl Into<String>) -> Self {
        Self::new(TypeKind::Pointer(PointerType {
            target: Some(target.into()),
            forward: None,
        }))
    }

    /// Pointer to a record definition, registered on demand
    pub fn pointer_to(definition: &RecordDefinition) -> Self {
        Self::new(TypeKind::Pointer(PointerType {
            target: None,
            forward: Some(definition.clone()),
        }))
    }

    pub fn nullable(mut self) -> Self {
        self.base.nullable = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.base.name = Some(name.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.base.description = Some(description.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.base.deprecated = true;
        self
    }

    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.base.default = Some(default);
        self
    }

    /// Apply numeric constraints; no-op for non-numeric kinds
    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        if let TypeKind::Int(n) | TypeKind::Long(n) | TypeKind::Float(n) | TypeKind::Double(n) =
            &mut self.kind
        {
            n.min = min;
            n.max = max;
        }
        self
    }

    /// Apply array size constraints; no-op for non-array kinds
    pub fn bounded(mut self, min: Option<usize>, max: Option<usize>, unique: bool) -> Self {
        if let TypeKind::Array(array) = &mut self.kind {
            array.min = min;
            array.max = max;
            array.unique = unique;
        }
        self
    }

    /// The tag this type serializes under
    pub fn tag(&self) -> &'static str {
        match &self.kind {
            TypeKind::Null => "null",
            TypeKind::Boolean => "boolean",
            TypeKind::Int(_) => "int",
            TypeKind::Long(_) => "long",
            TypeKind::Float(_) => "float",
            TypeKind::Double(_) => "double",
            TypeKind::Timestamp => "timestamp",
            TypeKind::Bytes => "bytes",
            TypeKind::String(_) => "string",
            TypeKind::Record(_) => "record",
            TypeKind::Enum(_) => "enum",
            TypeKind::Array(_) => "array",
            TypeKind::Map(_) => "map",
            TypeKind::Union(_) => "union",
            TypeKind::Pointer(_) => "pointer",
            TypeKind::Unsupported => "unsupported",
        }
    }

    /// Alternatives of the wire union this type lowers to, if any.
    ///
    /// Nullable types put `null` first. Nested unions are flattened and `null`
    /// appears at most once, since Avro forbids both nested unions and
    /// duplicate `null` branches.
    pub fn union_branches(&self) -> Option<Vec<Branch<'_>>> {
        if !self.base.nullable && !matches!(self.kind, TypeKind::Union(_)) {
            return None;
        }
        let mut branches = Vec::new();
        flatten_branches(self, &mut branches);
        Some(branches)
    }
}

fn flatten_branches<'a>(ty: &'a SchemaType, out: &mut Vec<Branch<'a>>) {
    if ty.base.nullable {
        push_null(out);
    }
    match &ty.kind {
        TypeKind::Union(union) => {
            for alternative in &union.union {
                flatten_branches(alternative, out);
            }
        }
        TypeKind::Null => push_null(out),
        _ => out.push(Branch::Of(ty)),
    }
}

fn push_null(out: &mut Vec<Branch<'_>>) {
    if !out.iter().any(|b| matches!(b, Branch::Null)) {
        out.push(Branch::Null);
    }
}

impl From<TypeKind> for SchemaType {
    fn from(kind: TypeKind) -> Self {
        SchemaType::new(kind)
    }
}

/// Accepted input forms for a schema type
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaTypeRepr {
    Shorthand(String),
    Full(FullRepr),
}

#[derive(Deserialize)]
struct FullRepr {
    #[serde(flatten)]
    base: BaseAttributes,
    #[serde(flatten)]
    kind: TypeKind,
}

impl From<SchemaTypeRepr> for SchemaType {
    fn from(repr: SchemaTypeRepr) -> Self {
        match repr {
            SchemaTypeRepr::Shorthand(tag) => SchemaType::new(primitive_kind(&tag)),
            SchemaTypeRepr::Full(FullRepr { base, kind }) => SchemaType { base, kind },
        }
    }
}

fn primitive_kind(tag: &str) -> TypeKind {
    match tag {
        "null" => TypeKind::Null,
        "boolean" => TypeKind::Boolean,
        "int" => TypeKind::Int(NumberType::default()),
        "long" => TypeKind::Long(NumberType::default()),
        "float" => TypeKind::Float(NumberType::default()),
        "double" => TypeKind::Double(NumberType::default()),
        "timestamp" => TypeKind::Timestamp,
        "bytes" => TypeKind::Bytes,
        "string" => TypeKind::String(StringType::default()),
        _ => TypeKind::Unsupported,
    }
}
