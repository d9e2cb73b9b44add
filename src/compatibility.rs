//! Schema compatibility checking
//!
//! Decides whether data written with one compiled schema (the writer) can be
//! read with another (the reader), following Avro's resolution rules, and
//! lists every change found along the way.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logical::{LogicalType, TimestampMillis};
use crate::wire::{WireEnum, WireRecord, WireType};

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Whether the reader can decode data produced by the writer
    pub is_compatible: bool,
    /// Whether this is a breaking change
    pub is_breaking: bool,
    /// List of changes detected
    pub changes: Vec<SchemaChange>,
    /// Summary of the compatibility check
    pub summary: String,
}

impl CompatibilityResult {
    /// Create a compatible result
    pub fn compatible(changes: Vec<SchemaChange>) -> Self {
        let summary = if changes.is_empty() {
            "No changes detected".to_string()
        } else {
            format!("{} compatible changes detected", changes.len())
        };
        Self {
            is_compatible: true,
            is_breaking: false,
            changes,
            summary,
        }
    }

    /// Create an incompatible result
    pub fn incompatible(changes: Vec<SchemaChange>, reason: impl Into<String>) -> Self {
        Self {
            is_compatible: false,
            is_breaking: true,
            changes,
            summary: reason.into(),
        }
    }

    pub fn breaking_changes(&self) -> impl Iterator<Item = &SchemaChange> {
        self.changes.iter().filter(|c| c.is_breaking)
    }
}

/// A detected change between schema versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChange {
    /// Type of change
    pub change_type: ChangeType,
    /// Path to the changed element (e.g., "Person.address.street")
    pub path: String,
    /// Old value (if applicable)
    pub old_value: Option<String>,
    /// New value (if applicable)
    pub new_value: Option<String>,
    /// Whether this change is breaking
    pub is_breaking: bool,
    /// Human-readable description
    pub description: String,
}

/// Type of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A new field was added
    FieldAdded,
    /// A field was removed
    FieldRemoved,
    /// A field's type changed
    TypeChanged,
    /// A type changed to one it can be resolved into
    TypePromoted,
    /// `null` was added to or removed from a type
    OptionalityChanged,
    /// A named type was renamed
    Renamed,
    /// Enum symbol added
    EnumSymbolAdded,
    /// Enum symbol removed
    EnumSymbolRemoved,
}

/// Compatibility checker for compiled schemas
#[derive(Debug, Clone)]
pub struct CompatibilityChecker {
    /// Strict mode - any change is considered breaking
    strict_mode: bool,
    /// Adapter deciding what its logical type can be read from
    logical: Arc<dyn LogicalType>,
}

impl CompatibilityChecker {
    /// Create a new compatibility checker
    pub fn new() -> Self {
        Self {
            strict_mode: false,
            logical: Arc::new(TimestampMillis),
        }
    }

    /// Enable strict mode
    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    pub fn with_logical_type(mut self, logical: Arc<dyn LogicalType>) -> Self {
        self.logical = logical;
        self
    }

    /// Check whether `reader` can decode data written with `writer`
    pub fn check(&self, writer: &WireType, reader: &WireType) -> CompatibilityResult {
        let path = reader.type_name().unwrap_or("$").to_string();
        let mut changes = Vec::new();
        self.compare(&path, writer, reader, &mut changes);

        let breaking_count = changes.iter().filter(|c| c.is_breaking).count();
        if self.strict_mode && !changes.is_empty() {
            CompatibilityResult::incompatible(
                changes,
                format!("Strict mode: {} changes detected", breaking_count),
            )
        } else if breaking_count > 0 {
            CompatibilityResult::incompatible(changes, format!("{} breaking changes detected", breaking_count))
        } else {
            CompatibilityResult::compatible(changes)
        }
    }

    fn compare(&self, path: &str, writer: &WireType, reader: &WireType, changes: &mut Vec<SchemaChange>) {
        if writer == reader {
            return;
        }

        match (writer, reader) {
            (WireType::Union(written), WireType::Union(read)) => {
                for branch in written {
                    if !read.iter().any(|r| self.resolves(path, branch, r)) {
                        changes.push(change(
                            ChangeType::TypeChanged,
                            path,
                            Some(branch),
                            Some(reader),
                            true,
                            format!("Union branch '{}' is no longer readable", branch),
                        ));
                    }
                }
                if read.contains(&WireType::Null) != written.contains(&WireType::Null) {
                    let nullable = read.contains(&WireType::Null);
                    changes.push(optionality(path, writer, reader, !nullable));
                }
                if written.len() != read.len() && changes.iter().all(|c| c.path != path) {
                    changes.push(change(
                        ChangeType::TypeChanged,
                        path,
                        Some(writer),
                        Some(reader),
                        false,
                        "Union branches changed".to_string(),
                    ));
                }
            }
            (_, WireType::Union(read)) => {
                let readable = read.iter().any(|r| self.resolves(path, writer, r));
                if read.first() == Some(&WireType::Null) && readable {
                    changes.push(optionality(path, writer, reader, false));
                } else {
                    changes.push(change(
                        ChangeType::TypeChanged,
                        path,
                        Some(writer),
                        Some(reader),
                        !readable,
                        format!("Type changed from {} to {}", writer, reader),
                    ));
                }
            }
            (WireType::Union(written), _) => {
                let nullable = written.contains(&WireType::Null);
                if nullable {
                    changes.push(optionality(path, writer, reader, true));
                }
                for branch in written.iter().filter(|b| **b != WireType::Null) {
                    self.compare(path, branch, reader, changes);
                }
            }
            (WireType::Record(written), WireType::Record(read)) => {
                self.compare_records(path, written, read, changes);
            }
            (WireType::Enum(written), WireType::Enum(read)) => {
                self.compare_enums(path, written, read, changes);
            }
            (WireType::Array(written), WireType::Array(read)) => {
                self.compare(&format!("{}.items", path), written, read, changes);
            }
            (WireType::Map(written), WireType::Map(read)) => {
                self.compare(&format!("{}.values", path), written, read, changes);
            }
            (WireType::Ref(_) | WireType::Record(_), WireType::Ref(_) | WireType::Record(_)) => {
                // Self-references compare by name; their structure is compared at the root
                if writer.type_name() != reader.type_name() {
                    changes.push(renamed(path, writer, reader));
                }
            }
            _ => self.compare_primitives(path, writer, reader, changes),
        }
    }

    fn compare_records(
        &self,
        path: &str,
        writer: &WireRecord,
        reader: &WireRecord,
        changes: &mut Vec<SchemaChange>,
    ) {
        if writer.name != reader.name {
            changes.push(SchemaChange {
                change_type: ChangeType::Renamed,
                path: path.to_string(),
                old_value: Some(writer.name.clone()),
                new_value: Some(reader.name.clone()),
                is_breaking: true,
                description: format!("Record '{}' was renamed to '{}'", writer.name, reader.name),
            });
        }

        for field in &reader.fields {
            let field_path = format!("{}.{}", path, field.name);
            match writer.field(&field.name) {
                Some(written) => self.compare(&field_path, &written.ty, &field.ty, changes),
                None => {
                    let has_default = field.ty.is_nullable();
                    changes.push(SchemaChange {
                        change_type: ChangeType::FieldAdded,
                        path: field_path,
                        old_value: None,
                        new_value: Some(field.ty.to_string()),
                        is_breaking: !has_default,
                        description: if has_default {
                            format!("Field '{}' was added with default value", field.name)
                        } else {
                            format!("Field '{}' was added without default (breaking)", field.name)
                        },
                    });
                }
            }
        }

        for field in &writer.fields {
            if reader.field(&field.name).is_none() {
                changes.push(SchemaChange {
                    change_type: ChangeType::FieldRemoved,
                    path: format!("{}.{}", path, field.name),
                    old_value: Some(field.ty.to_string()),
                    new_value: None,
                    is_breaking: false,
                    description: format!("Field '{}' was removed", field.name),
                });
            }
        }
    }

    fn compare_enums(&self, path: &str, writer: &WireEnum, reader: &WireEnum, changes: &mut Vec<SchemaChange>) {
        if writer.name != reader.name {
            changes.push(SchemaChange {
                change_type: ChangeType::Renamed,
                path: path.to_string(),
                old_value: Some(writer.name.clone()),
                new_value: Some(reader.name.clone()),
                is_breaking: true,
                description: format!("Enum '{}' was renamed to '{}'", writer.name, reader.name),
            });
        }

        for removed in writer.symbols.iter().filter(|s| !reader.symbols.contains(s)) {
            changes.push(SchemaChange {
                change_type: ChangeType::EnumSymbolRemoved,
                path: path.to_string(),
                old_value: Some(removed.clone()),
                new_value: None,
                is_breaking: true,
                description: format!("Enum symbol {} was removed", removed),
            });
        }
        for added in reader.symbols.iter().filter(|s| !writer.symbols.contains(s)) {
            changes.push(SchemaChange {
                change_type: ChangeType::EnumSymbolAdded,
                path: path.to_string(),
                old_value: None,
                new_value: Some(added.clone()),
                is_breaking: false,
                description: format!("Enum symbol {} was added", added),
            });
        }
    }

    fn compare_primitives(
        &self,
        path: &str,
        writer: &WireType,
        reader: &WireType,
        changes: &mut Vec<SchemaChange>,
    ) {
        let promoted = match reader {
            WireType::Logical { logical_type, underlying } => {
                if logical_type == self.logical.logical_name() {
                    self.logical.can_resolve_from(writer)
                } else {
                    promotes(strip_logical(writer), underlying)
                }
            }
            _ => promotes(strip_logical(writer), reader),
        };

        changes.push(if promoted {
            change(
                ChangeType::TypePromoted,
                path,
                Some(writer),
                Some(reader),
                false,
                format!("Type promoted from {} to {}", writer, reader),
            )
        } else {
            change(
                ChangeType::TypeChanged,
                path,
                Some(writer),
                Some(reader),
                true,
                format!("Type changed from {} to {}", writer, reader),
            )
        });
    }

    /// Whether `writer` resolves into `reader` without breaking changes
    fn resolves(&self, path: &str, writer: &WireType, reader: &WireType) -> bool {
        let mut scratch = Vec::new();
        self.compare(path, writer, reader, &mut scratch);
        scratch.iter().all(|c| !c.is_breaking)
    }
}

impl Default for CompatibilityChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_logical(ty: &WireType) -> &WireType {
    match ty {
        WireType::Logical { underlying, .. } => underlying,
        other => other,
    }
}

/// Avro's primitive promotion rules
fn promotes(writer: &WireType, reader: &WireType) -> bool {
    use WireType::*;
    writer == reader
        || matches!(
            (writer, reader),
            (Int, Long | Float | Double) | (Long, Float | Double) | (Float, Double) | (String, Bytes) | (Bytes, String)
        )
}

fn change(
    change_type: ChangeType,
    path: &str,
    old: Option<&WireType>,
    new: Option<&WireType>,
    is_breaking: bool,
    description: String,
) -> SchemaChange {
    SchemaChange {
        change_type,
        path: path.to_string(),
        old_value: old.map(ToString::to_string),
        new_value: new.map(ToString::to_string),
        is_breaking,
        description,
    }
}

fn optionality(path: &str, writer: &WireType, reader: &WireType, is_breaking: bool) -> SchemaChange {
    let description = if is_breaking {
        format!("{} no longer accepts null", path)
    } else {
        format!("{} now accepts null", path)
    };
    change(ChangeType::OptionalityChanged, path, Some(writer), Some(reader), is_breaking, description)
}

fn renamed(path: &str, writer: &WireType, reader: &WireType) -> SchemaChange {
    change(
        ChangeType::Renamed,
        path,
        Some(writer),
        Some(reader),
        true,
        format!("Named type changed from {} to {}", writer, reader),
    )
}
