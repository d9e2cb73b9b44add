//! Schema-directed value mapping
//!
//! Converts native values (`serde_json::Value`) into Avro values on write and
//! back on read. The walk follows the schema types held by the registry, so
//! pointers resolve to registered records and union branch indices match the
//! ones the compiler emits (both use [`SchemaType::union_branches`]).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use apache_avro::types::Value as AvroValue;
use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use crate::config::CodecConfig;
use crate::error::{Result, SchemaError};
use crate::logical::LogicalType;
use crate::name::wire_name;
use crate::registry::SchemaRegistry;
use crate::types::{
    ordered_fields, ArrayType, Branch, CaseTransform, EnumType, Field, NumberType, SchemaType,
    StringFormat, StringType, Trim, TypeKind,
};

#[derive(Debug)]
pub(crate) struct ValueMapper {
    registry: Arc<SchemaRegistry>,
    logical: Arc<dyn LogicalType>,
    config: CodecConfig,
    /// Compiled `pattern` and `format` expressions, by source
    patterns: RwLock<HashMap<String, Regex>>,
}

impl ValueMapper {
    pub(crate) fn new(
        registry: Arc<SchemaRegistry>,
        logical: Arc<dyn LogicalType>,
        config: CodecConfig,
    ) -> Self {
        Self {
            registry,
            logical,
            config,
            patterns: RwLock::new(HashMap::new()),
        }
    }

    /// Map a native value onto the registered record `name`
    pub(crate) fn encode_record(&self, name: &str, value: &JsonValue) -> Result<AvroValue> {
        let record = self.registry.get_record(name).ok_or_else(|| SchemaError::UnknownRecord {
            name: name.to_string(),
        })?;
        self.record_to_avro(name, &record.fields, value)
    }

    /// Map a decoded Avro value of record `name` back to a native value
    pub(crate) fn decode_record(&self, name: &str, value: AvroValue) -> Result<JsonValue> {
        let record = self.registry.get_record(name).ok_or_else(|| SchemaError::UnknownRecord {
            name: name.to_string(),
        })?;
        self.record_from_avro(name, &record.fields, value)
    }

    fn record_to_avro(
        &self,
        path: &str,
        fields: &IndexMap<String, Field>,
        value: &JsonValue,
    ) -> Result<AvroValue> {
        let object = value
            .as_object()
            .ok_or_else(|| SchemaError::invalid_value(path, format!("expected object, got {}", kind_of(value))))?;

        let mut encoded = Vec::with_capacity(fields.len());
        for (field_name, field) in ordered_fields(fields) {
            let field_path = format!("{}.{}", path, field_name);
            let avro = match object.get(field_name.as_str()) {
                Some(present) => self.to_avro(&field.ty, &field_path, present)?,
                None => self.missing_field(&field.ty, &field_path)?,
            };
            encoded.push((wire_name(field_name), avro));
        }
        Ok(AvroValue::Record(encoded))
    }

    fn missing_field(&self, ty: &SchemaType, path: &str) -> Result<AvroValue> {
        if self.config.apply_defaults {
            if let Some(default) = &ty.base.default {
                return self.to_avro(ty, path, default);
            }
        }
        self.to_avro(ty, path, &JsonValue::Null)
            .map_err(|_| SchemaError::invalid_value(path, "required field is missing"))
    }

    fn to_avro(&self, ty: &SchemaType, path: &str, value: &JsonValue) -> Result<AvroValue> {
        let Some(branches) = ty.union_branches() else {
            return self.kind_to_avro(ty, path, value);
        };

        let mut failures = Vec::new();
        for (index, branch) in branches.iter().enumerate() {
            let attempt = match branch {
                Branch::Null if value.is_null() => Ok(AvroValue::Null),
                Branch::Null => continue,
                Branch::Of(alternative) => self.kind_to_avro(alternative, path, value),
            };
            match attempt {
                Ok(avro) => return Ok(AvroValue::Union(index as u32, Box::new(avro))),
                Err(e) => failures.push(e),
            }
        }

        // A single candidate explains the failure better than a generic message
        if failures.len() == 1 {
            if let Some(failure) = failures.pop() {
                return Err(failure);
            }
        }
        Err(SchemaError::invalid_value(
            path,
            format!("{} matches none of the {} union branches", kind_of(value), branches.len()),
        ))
    }

    /// Map a value ignoring the type's nullable flag
    fn kind_to_avro(&self, ty: &SchemaType, path: &str, value: &JsonValue) -> Result<AvroValue> {
        let mismatch = |expected: &str| {
            SchemaError::invalid_value(path, format!("expected {}, got {}", expected, kind_of(value)))
        };

        match &ty.kind {
            TypeKind::Null => match value {
                JsonValue::Null => Ok(AvroValue::Null),
                _ => Err(mismatch("null")),
            },
            TypeKind::Boolean => value.as_bool().map(AvroValue::Boolean).ok_or_else(|| mismatch("boolean")),
            TypeKind::Int(rules) => {
                let n = integer(value).ok_or_else(|| mismatch("integer"))?;
                let n = i32::try_from(n)
                    .map_err(|_| SchemaError::invalid_value(path, format!("{} does not fit in an int", n)))?;
                self.check_number(path, rules, f64::from(n))?;
                Ok(AvroValue::Int(n))
            }
            TypeKind::Long(rules) => {
                let n = integer(value).ok_or_else(|| mismatch("integer"))?;
                self.check_number(path, rules, n as f64)?;
                Ok(AvroValue::Long(n))
            }
            TypeKind::Float(rules) => {
                let n = value.as_f64().ok_or_else(|| mismatch("number"))?;
                if n.abs() > f64::from(f32::MAX) {
                    return Err(SchemaError::invalid_value(path, format!("{} does not fit in a float", n)));
                }
                self.check_number(path, rules, n)?;
                Ok(AvroValue::Float(n as f32))
            }
            TypeKind::Double(rules) => {
                let n = value.as_f64().ok_or_else(|| mismatch("number"))?;
                self.check_number(path, rules, n)?;
                Ok(AvroValue::Double(n))
            }
            TypeKind::Timestamp => {
                let representation = self
                    .logical
                    .to_representation(value)
                    .map_err(|reason| SchemaError::invalid_value(path, reason))?;
                Ok(self.logical.to_avro(representation))
            }
            TypeKind::Bytes => match value {
                JsonValue::String(s) => Ok(AvroValue::Bytes(s.as_bytes().to_vec())),
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .map(AvroValue::Bytes)
                    .ok_or_else(|| SchemaError::invalid_value(path, "byte arrays must contain integers 0-255")),
                _ => Err(mismatch("bytes")),
            },
            TypeKind::String(rules) => {
                let raw = value.as_str().ok_or_else(|| mismatch("string"))?;
                let prepared = transform(rules, raw);
                self.check_string(path, rules, &prepared)?;
                Ok(AvroValue::String(prepared))
            }
            TypeKind::Record(record) => self.record_to_avro(path, &record.fields, value),
            TypeKind::Enum(enumeration) => {
                let symbol = value.as_str().ok_or_else(|| mismatch("enum symbol"))?;
                enum_to_avro(path, enumeration, symbol)
            }
            TypeKind::Array(array) => {
                let items = value.as_array().ok_or_else(|| mismatch("array"))?;
                if self.config.validate_constraints {
                    check_array(path, array, items)?;
                }
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.to_avro(&array.items, &format!("{}[{}]", path, i), item))
                    .collect::<Result<Vec<_>>>()
                    .map(AvroValue::Array)
            }
            TypeKind::Map(map) => {
                let object = value.as_object().ok_or_else(|| mismatch("map"))?;
                object
                    .iter()
                    .map(|(key, item)| {
                        let avro = self.to_avro(&map.values, &format!("{}.{}", path, key), item)?;
                        Ok((key.clone(), avro))
                    })
                    .collect::<Result<HashMap<_, _>>>()
                    .map(AvroValue::Map)
            }
            TypeKind::Union(_) => self.to_avro(ty, path, value),
            TypeKind::Pointer(pointer) => {
                let target = self.pointer_target(path, pointer.target.as_deref())?;
                self.record_to_avro(path, target, value)
            }
            TypeKind::Unsupported => Err(SchemaError::UnsupportedType {
                path: path.to_string(),
            }),
        }
    }

    fn pointer_target(&self, path: &str, target: Option<&str>) -> Result<&IndexMap<String, Field>> {
        let target = target.ok_or_else(|| SchemaError::MissingPointerRef {
            path: path.to_string(),
        })?;
        self.registry
            .get_record(target)
            .map(|record| &record.fields)
            .ok_or_else(|| SchemaError::UndefinedPointer {
                path: path.to_string(),
                target: target.to_string(),
            })
    }

    fn check_number(&self, path: &str, rules: &NumberType, n: f64) -> Result<()> {
        if !self.config.validate_constraints {
            return Ok(());
        }
        if let Some(min) = rules.min {
            if n < min {
                return Err(SchemaError::constraint(path, format!("{} is less than minimum {}", n, min)));
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                return Err(SchemaError::constraint(path, format!("{} is greater than maximum {}", n, max)));
            }
        }
        if rules.positive && n <= 0.0 {
            return Err(SchemaError::constraint(path, format!("{} is not positive", n)));
        }
        if rules.negative && n >= 0.0 {
            return Err(SchemaError::constraint(path, format!("{} is not negative", n)));
        }
        Ok(())
    }

    fn check_string(&self, path: &str, rules: &StringType, s: &str) -> Result<()> {
        if !self.config.validate_constraints {
            return Ok(());
        }

        let length = s.chars().count();
        if let Some(min) = rules.min {
            if length < min {
                return Err(SchemaError::constraint(path, format!("length {} is below minimum {}", length, min)));
            }
        }
        if let Some(max) = rules.max {
            if length > max {
                return Err(SchemaError::constraint(path, format!("length {} exceeds maximum {}", length, max)));
            }
        }
        if let Some(exact) = rules.length {
            if length != exact {
                return Err(SchemaError::constraint(path, format!("length {} is not {}", length, exact)));
            }
        }
        if let Some(needle) = &rules.contains {
            if !s.contains(needle.as_str()) {
                return Err(SchemaError::constraint(path, format!("does not contain '{}'", needle)));
            }
        }
        if let Some(pattern) = &rules.pattern {
            if !self.regex(path, pattern)?.is_match(s) {
                return Err(SchemaError::constraint(path, format!("does not match pattern '{}'", pattern)));
            }
        }
        if let Some(format) = rules.format {
            let valid = match format {
                StringFormat::Luhn => luhn(s),
                other => self.regex(path, format_pattern(other))?.is_match(s),
            };
            if !valid {
                return Err(SchemaError::constraint(path, format!("is not a valid {:?} string", format)));
            }
        }
        Ok(())
    }

    fn regex(&self, path: &str, pattern: &str) -> Result<Regex> {
        let cached = self.patterns.read().get(pattern).cloned();
        if let Some(regex) = cached {
            return Ok(regex);
        }
        let regex = Regex::new(pattern)
            .map_err(|e| SchemaError::invalid_value(path, format!("invalid pattern: {}", e)))?;
        self.patterns.write().insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    fn record_from_avro(
        &self,
        path: &str,
        fields: &IndexMap<String, Field>,
        value: AvroValue,
    ) -> Result<JsonValue> {
        let AvroValue::Record(encoded) = value else {
            return Err(SchemaError::invalid_value(path, "expected a record on the wire"));
        };
        let mut by_name: HashMap<String, AvroValue> = encoded.into_iter().collect();

        let mut object = Map::new();
        for (field_name, field) in ordered_fields(fields) {
            let field_path = format!("{}.{}", path, field_name);
            let avro = by_name
                .remove(&wire_name(field_name))
                .ok_or_else(|| SchemaError::invalid_value(&field_path, "field is missing on the wire"))?;
            object.insert(field_name.clone(), self.from_avro(&field.ty, &field_path, avro)?);
        }
        Ok(JsonValue::Object(object))
    }

    fn from_avro(&self, ty: &SchemaType, path: &str, value: AvroValue) -> Result<JsonValue> {
        let Some(branches) = ty.union_branches() else {
            return self.kind_from_avro(ty, path, value);
        };

        match value {
            AvroValue::Union(index, inner) => match branches.get(index as usize) {
                Some(Branch::Null) => Ok(JsonValue::Null),
                Some(Branch::Of(alternative)) => self.kind_from_avro(alternative, path, *inner),
                None => Err(SchemaError::invalid_value(
                    path,
                    format!("union branch {} is out of range", index),
                )),
            },
            AvroValue::Null => Ok(JsonValue::Null),
            other => Err(SchemaError::invalid_value(path, format!("expected a union, got {:?}", other))),
        }
    }

    fn kind_from_avro(&self, ty: &SchemaType, path: &str, value: AvroValue) -> Result<JsonValue> {
        let native = match (&ty.kind, value) {
            (TypeKind::Null, AvroValue::Null) => JsonValue::Null,
            (TypeKind::Boolean, AvroValue::Boolean(b)) => JsonValue::Bool(b),
            (TypeKind::Int(_), AvroValue::Int(n)) => JsonValue::from(n),
            (TypeKind::Long(_), AvroValue::Long(n)) => JsonValue::from(n),
            (TypeKind::Float(_), AvroValue::Float(n)) => JsonValue::from(n),
            (TypeKind::Double(_), AvroValue::Double(n)) => JsonValue::from(n),
            (TypeKind::Timestamp, AvroValue::TimestampMillis(n) | AvroValue::Long(n)) => self
                .logical
                .from_representation(n)
                .map_err(|reason| SchemaError::invalid_value(path, reason))?,
            (TypeKind::Timestamp, AvroValue::String(s)) => self
                .logical
                .to_representation(&JsonValue::String(s))
                .and_then(|n| self.logical.from_representation(n))
                .map_err(|reason| SchemaError::invalid_value(path, reason))?,
            (TypeKind::Bytes, AvroValue::Bytes(bytes)) => JsonValue::from(bytes),
            (TypeKind::String(_), AvroValue::String(s)) => JsonValue::String(s),
            (TypeKind::Enum(_), AvroValue::Enum(_, symbol)) => JsonValue::String(symbol),
            (TypeKind::Record(record), value) => self.record_from_avro(path, &record.fields, value)?,
            (TypeKind::Array(array), AvroValue::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| self.from_avro(&array.items, &format!("{}[{}]", path, i), item))
                .collect::<Result<Vec<_>>>()
                .map(JsonValue::Array)?,
            (TypeKind::Map(map), AvroValue::Map(entries)) => {
                let mut object = Map::new();
                for (key, item) in entries {
                    let native = self.from_avro(&map.values, &format!("{}.{}", path, key), item)?;
                    object.insert(key, native);
                }
                JsonValue::Object(object)
            }
            (TypeKind::Union(_), value) => self.from_avro(ty, path, value)?,
            (TypeKind::Pointer(pointer), value) => {
                let target = self.pointer_target(path, pointer.target.as_deref())?;
                self.record_from_avro(path, target, value)?
            }
            (TypeKind::Unsupported, _) => {
                return Err(SchemaError::UnsupportedType {
                    path: path.to_string(),
                })
            }
            (_, other) => {
                return Err(SchemaError::invalid_value(
                    path,
                    format!("unexpected {:?} for {} field", other, ty.tag()),
                ))
            }
        };
        Ok(native)
    }
}

/// Integral JSON numbers, including floats without a fractional part
fn integer(value: &JsonValue) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn transform(rules: &StringType, raw: &str) -> String {
    let trimmed = match rules.trim {
        Some(Trim::Both) => raw.trim(),
        Some(Trim::Left) => raw.trim_start(),
        Some(Trim::Right) => raw.trim_end(),
        None => raw,
    };
    match rules.case_transform {
        Some(CaseTransform::Lowercase) => trimmed.to_lowercase(),
        Some(CaseTransform::Uppercase) => trimmed.to_uppercase(),
        None => trimmed.to_string(),
    }
}

fn enum_to_avro(path: &str, enumeration: &EnumType, symbol: &str) -> Result<AvroValue> {
    enumeration
        .symbols
        .iter()
        .position(|s| s == symbol)
        .map(|index| AvroValue::Enum(index as u32, symbol.to_string()))
        .ok_or_else(|| {
            SchemaError::constraint(
                path,
                format!("'{}' is not one of [{}]", symbol, enumeration.symbols.join(", ")),
            )
        })
}

fn check_array(path: &str, rules: &ArrayType, items: &[JsonValue]) -> Result<()> {
    let count = items.len();
    if let Some(min) = rules.min {
        if count < min {
            return Err(SchemaError::constraint(path, format!("{} items, expected at least {}", count, min)));
        }
    }
    if let Some(max) = rules.max {
        if count > max {
            return Err(SchemaError::constraint(path, format!("{} items, expected at most {}", count, max)));
        }
    }
    if let Some(exact) = rules.length {
        if count != exact {
            return Err(SchemaError::constraint(path, format!("{} items, expected exactly {}", count, exact)));
        }
    }
    if rules.unique {
        let mut seen = HashSet::with_capacity(count);
        for item in items {
            if !seen.insert(item.to_string()) {
                return Err(SchemaError::constraint(path, format!("duplicate item {}", item)));
            }
        }
    }
    Ok(())
}

fn format_pattern(format: StringFormat) -> &'static str {
    match format {
        StringFormat::Email => r"^[^\s@]+@[^\s@]+\.[^\s@]+$",
        StringFormat::Uuid => {
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
        }
        StringFormat::ObjectId => r"^[0-9a-fA-F]{24}$",
        StringFormat::Cuid => r"^c[^\s-]{8,}$",
        StringFormat::Mac => r"^(?:[0-9a-fA-F]{2}[:-]){5}[0-9a-fA-F]{2}$",
        StringFormat::Url => r"^[a-zA-Z][a-zA-Z0-9+.-]*://[^\s/?#]+\S*$",
        StringFormat::Alpha => r"^[a-zA-Z]+$",
        StringFormat::Numeric => r"^[0-9]+$",
        StringFormat::Alphanum => r"^[a-zA-Z0-9]+$",
        StringFormat::Alphadash => r"^[a-zA-Z0-9_-]+$",
        StringFormat::Hex => r"^[0-9a-fA-F]+$",
        StringFormat::SingleLine => r"^[^\r\n]*$",
        StringFormat::Base64 => {
            r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$"
        }
        // Checked by `luhn`
        StringFormat::Luhn => r"^[0-9]+$",
    }
}

/// Luhn checksum over a digit string
fn luhn(s: &str) -> bool {
    let digits: Option<Vec<u32>> = s.chars().map(|c| c.to_digit(10)).collect();
    let Some(digits) = digits else {
        return false;
    };
    if digits.len() < 2 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
