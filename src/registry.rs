//! Schema Registry
//!
//! Holds the records and namespaced receivers a service declares. Every
//! record is validated once, when it is added, and is never mutated or
//! removed afterwards. [`SchemaRegistry::lock`] ends the build phase: from
//! then on every mutating call fails with [`SchemaError::SchemaLocked`].

use std::collections::HashMap;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, info, trace};

use crate::error::{Result, SchemaError};
use crate::name::is_valid_name;
use crate::receiver::{Receiver, ReceiverKind};
use crate::record::{DefinitionId, NamedRecordType, RecordDefinition, RecordSource};
use crate::snapshot::SchemaSnapshot;
use crate::types::{Field, PointerType, SchemaType, TypeKind};

/// Validated store of records and receivers
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    /// Service name
    name: String,
    /// Serializer the service speaks (e.g. "avro")
    serializer: String,
    /// Records in registration order; pointer targets precede their users
    records: IndexMap<String, NamedRecordType>,
    /// Definition each record was registered from, if any
    definitions: HashMap<String, DefinitionId>,
    /// namespace -> receiver name -> receiver
    receivers: IndexMap<String, IndexMap<String, Receiver>>,
    /// Names of records flagged as signals
    signals: Vec<String>,
    /// Records currently being validated, innermost last
    pending: Vec<String>,
    locked: bool,
}

impl SchemaRegistry {
    /// Create an empty, unlocked registry
    pub fn new(name: impl Into<String>, serializer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serializer: serializer.into(),
            records: IndexMap::new(),
            definitions: HashMap::new(),
            receivers: IndexMap::new(),
            signals: Vec::new(),
            pending: Vec::new(),
            locked: false,
        }
    }

    /// Rebuild a registry from a snapshot, re-validating everything.
    ///
    /// Records are replayed first, in stored order, then receivers, since a
    /// receiver can only reference records that already exist.
    pub fn parse(snapshot: SchemaSnapshot) -> Result<Self> {
        let mut registry = Self::new(snapshot.name, snapshot.serializer);
        for (key, record) in snapshot.records {
            if key != record.name {
                return Err(SchemaError::SnapshotKeyMismatch { key, name: record.name });
            }
            registry.add_record(record)?;
        }
        for (namespace, receivers) in snapshot.receivers {
            for (key, receiver) in receivers {
                if key != receiver.name {
                    return Err(SchemaError::SnapshotKeyMismatch {
                        key: format!("{}.{}", namespace, key),
                        name: receiver.name,
                    });
                }
                registry.add_receiver(namespace.clone(), receiver)?;
            }
        }
        Ok(registry)
    }

    /// Snapshot of the registry for persistence or transmission
    pub fn normalize(&self) -> SchemaSnapshot {
        SchemaSnapshot {
            name: self.name.clone(),
            serializer: self.serializer.clone(),
            records: self.records.clone(),
            receivers: self.receivers.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serializer(&self) -> &str {
        &self.serializer
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// End the build phase. Idempotent and irreversible.
    pub fn lock(&mut self) {
        if !self.locked {
            info!(
                service = %self.name,
                records = self.records.len(),
                receivers = self.receivers.values().map(IndexMap::len).sum::<usize>(),
                "Schema locked"
            );
        }
        self.locked = true;
    }

    pub fn has_record(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn get_record(&self, name: &str) -> Option<&NamedRecordType> {
        self.records.get(name)
    }

    /// Like [`get_record`](Self::get_record), failing with `UndefinedRecord`
    pub fn record(&self, name: &str) -> Result<&NamedRecordType> {
        self.records.get(name).ok_or_else(|| SchemaError::UndefinedRecord {
            name: name.to_string(),
            context: "Record lookup".to_string(),
        })
    }

    /// Registered records in registration order
    pub fn records(&self) -> impl Iterator<Item = &NamedRecordType> {
        self.records.values()
    }

    /// Names of records flagged as signals, in registration order
    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    pub fn receiver(&self, namespace: &str, name: &str) -> Option<&Receiver> {
        self.receivers.get(namespace)?.get(name)
    }

    /// Receivers of one namespace
    pub fn receivers(&self, namespace: &str) -> impl Iterator<Item = &Receiver> {
        self.receivers
            .get(namespace)
            .into_iter()
            .flat_map(|receivers| receivers.values())
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.receivers.keys().map(String::as_str)
    }

    /// Add a record and return its name.
    ///
    /// - A name must refer to an already-registered record.
    /// - A definition is registered once; adding the same definition again
    ///   returns its name, while a different definition under a registered
    ///   name fails with `DuplicateRecord`.
    /// - A literal record fails with `DuplicateRecord` if its name is taken.
    pub fn add_record(&mut self, source: impl Into<RecordSource>) -> Result<String> {
        self.ensure_unlocked()?;

        match source.into() {
            RecordSource::Name(name) => {
                if self.has_record(&name) {
                    Ok(name)
                } else {
                    Err(SchemaError::UndefinedRecord {
                        name,
                        context: "Record reference".to_string(),
                    })
                }
            }
            RecordSource::Definition(definition) => self.add_definition(definition),
            RecordSource::Literal(record) => {
                if self.is_taken(&record.name) {
                    return Err(SchemaError::DuplicateRecord { name: record.name });
                }
                self.insert_record(record, None)
            }
        }
    }

    /// Add a receiver under `namespace`
    pub fn add_receiver(&mut self, namespace: impl Into<String>, receiver: Receiver) -> Result<()> {
        self.ensure_unlocked()?;
        let namespace = namespace.into();

        let exists = self
            .receivers
            .get(&namespace)
            .is_some_and(|receivers| receivers.contains_key(&receiver.name));
        if exists {
            return Err(SchemaError::DuplicateReceiver {
                namespace,
                name: receiver.name,
            });
        }

        match &receiver.kind {
            ReceiverKind::Query { input, output } => {
                self.require_record(input, || {
                    format!("Query {}.{} input", namespace, receiver.name)
                })?;
                self.require_record(output, || {
                    format!("Query {}.{} output", namespace, receiver.name)
                })?;
            }
            ReceiverKind::Command { record } => {
                self.require_record(record, || format!("Command {}.{}", namespace, receiver.name))?;
            }
            ReceiverKind::Unsupported => {
                return Err(SchemaError::UnknownReceiverKind {
                    namespace,
                    name: receiver.name,
                });
            }
        }

        debug!(namespace = %namespace, receiver = %receiver.name, "Registered receiver");
        self.receivers
            .entry(namespace)
            .or_default()
            .insert(receiver.name.clone(), receiver);
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(SchemaError::SchemaLocked);
        }
        Ok(())
    }

    fn require_record(&self, name: &str, context: impl FnOnce() -> String) -> Result<()> {
        if self.has_record(name) {
            Ok(())
        } else {
            Err(SchemaError::UndefinedRecord {
                name: name.to_string(),
                context: context(),
            })
        }
    }

    fn is_taken(&self, name: &str) -> bool {
        self.records.contains_key(name) || self.pending.iter().any(|p| p == name)
    }

    fn add_definition(&mut self, definition: RecordDefinition) -> Result<String> {
        let name = definition.name();

        if let Some(id) = self.definitions.get(name) {
            if *id != definition.id() {
                return Err(SchemaError::DuplicateRecord {
                    name: name.to_string(),
                });
            }
            trace!(record = %name, "Record definition already registered");
            return Ok(name.to_string());
        }
        if self.is_taken(name) {
            return Err(SchemaError::DuplicateRecord {
                name: name.to_string(),
            });
        }

        self.insert_record(definition.record().clone(), Some(definition.id()))
    }

    /// Validate and store a record. Nothing is stored if validation fails,
    /// although pointer targets registered along the way stay registered.
    fn insert_record(&mut self, mut record: NamedRecordType, id: Option<DefinitionId>) -> Result<String> {
        if !is_valid_name(&record.name) {
            return Err(SchemaError::InvalidName { name: record.name });
        }

        let name = record.name.clone();
        self.pending.push(name.clone());
        let verified = self.verify_fields(&name, &mut record.fields);
        self.pending.pop();
        verified?;

        if record.is_signal() {
            self.signals.push(name.clone());
        }
        if let Some(id) = id {
            self.definitions.insert(name.clone(), id);
        }
        debug!(record = %name, fields = record.fields.len(), "Registered record");
        self.records.insert(name.clone(), record);
        Ok(name)
    }

    fn verify_fields(&mut self, path: &str, fields: &mut IndexMap<String, Field>) -> Result<()> {
        if fields.is_empty() {
            return Err(SchemaError::InvalidFields {
                path: path.to_string(),
                reason: "a record must declare at least one field".to_string(),
            });
        }

        let mut orders: HashMap<i64, String> = HashMap::new();
        for (field_name, field) in fields.iter_mut() {
            let field_path = format!("{}.{}", path, field_name);

            if !is_valid_name(field_name) {
                return Err(SchemaError::InvalidFieldName {
                    path: path.to_string(),
                    name: field_name.clone(),
                });
            }

            let order = field.checked_order(&field_path)?;
            if let Some(existing) = orders.insert(order, field_path.clone()) {
                return Err(SchemaError::DuplicateOrder {
                    path: field_path,
                    existing,
                    order,
                });
            }

            self.verify_field(&field_path, &mut field.ty)?;
        }
        Ok(())
    }

    fn verify_field(&mut self, path: &str, ty: &mut SchemaType) -> Result<()> {
        match &mut ty.kind {
            TypeKind::Record(record) => self.verify_fields(path, &mut record.fields),
            TypeKind::Pointer(pointer) => self.resolve_pointer(path, pointer),
            TypeKind::Array(array) => self.verify_field(&format!("{}.items", path), &mut array.items),
            TypeKind::Map(map) => self.verify_field(&format!("{}.values", path), &mut map.values),
            TypeKind::Union(union) => {
                for (i, alternative) in union.union.iter_mut().enumerate() {
                    self.verify_field(&format!("{}.union[{}]", path, i), alternative)?;
                }
                Ok(())
            }
            TypeKind::String(rules) => {
                if let Some(pattern) = &rules.pattern {
                    Regex::new(pattern).map_err(|e| SchemaError::InvalidFields {
                        path: path.to_string(),
                        reason: format!("invalid pattern: {}", e),
                    })?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Register a forward reference if present, then require the target to
    /// exist. A record may point at itself by name while it is validated.
    fn resolve_pointer(&mut self, path: &str, pointer: &mut PointerType) -> Result<()> {
        if let Some(definition) = pointer.forward.take() {
            let name = self.add_record(definition)?;
            pointer.target = Some(name);
        }

        let target = pointer.target.as_deref().ok_or_else(|| SchemaError::MissingPointerRef {
            path: path.to_string(),
        })?;

        let self_reference = self.pending.last().is_some_and(|p| p == target);
        if !self.has_record(target) && !self_reference {
            return Err(SchemaError::UndefinedPointer {
                path: path.to_string(),
                target: target.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBuilder;
    use crate::types::{RecordType, StringType};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new("test", "avro")
    }

    fn person() -> NamedRecordType {
        NamedRecordType::new("Person")
            .field("name", 1, SchemaType::string())
            .field("age", 2, SchemaType::int())
    }

    #[test]
    fn test_add_literal_definition_and_name() {
        let mut registry = registry();
        assert!(!registry.has_record("Bar"));

        let foo = NamedRecordType::new("Foo").field("name", 1, SchemaType::string());
        assert_eq!(registry.add_record(foo).unwrap(), "Foo");
        assert!(registry.has_record("Foo"));

        let bar = RecordBuilder::new("Bar").field("age", 1, SchemaType::int()).build();
        assert_eq!(registry.add_record(&bar).unwrap(), "Bar");
        assert!(registry.has_record("Bar"));

        assert_eq!(registry.add_record("Bar").unwrap(), "Bar");
        assert!(matches!(
            registry.add_record("Missing"),
            Err(SchemaError::UndefinedRecord { name, .. }) if name == "Missing"
        ));
    }

    #[test]
    fn test_add_with_collection_types() {
        let mut registry = registry();
        let foo = RecordBuilder::new("Foo")
            .field("tags", 1, SchemaType::array(SchemaType::string()))
            .field(
                "users",
                2,
                SchemaType::record(
                    RecordType::new()
                        .field("name", 1, SchemaType::string())
                        .field("age", 2, SchemaType::int()),
                ),
            )
            .field("refId", 3, SchemaType::union(vec![SchemaType::string(), SchemaType::int()]))
            .field("header", 4, SchemaType::map(SchemaType::string()))
            .build();
        assert_eq!(registry.add_record(&foo).unwrap(), "Foo");
    }

    #[test]
    fn test_definition_idempotence() {
        let mut registry = registry();
        let bar = RecordBuilder::new("Bar").field("age", 1, SchemaType::int()).build();

        assert_eq!(registry.add_record(&bar).unwrap(), "Bar");
        assert_eq!(registry.add_record(bar.clone()).unwrap(), "Bar");
        assert_eq!(registry.records().count(), 1);
    }

    #[test]
    fn test_duplicate_records() {
        let mut registry = registry();
        let first = RecordBuilder::new("Bar").field("age", 1, SchemaType::int()).build();
        let second = RecordBuilder::new("Bar").field("age", 1, SchemaType::int()).build();

        registry.add_record(&first).unwrap();
        assert!(matches!(
            registry.add_record(&second),
            Err(SchemaError::DuplicateRecord { name }) if name == "Bar"
        ));

        let literal = NamedRecordType::new("Bar").field("age", 1, SchemaType::int());
        assert!(matches!(
            registry.add_record(literal),
            Err(SchemaError::DuplicateRecord { .. })
        ));

        registry.add_record(person()).unwrap();
        let redeclared = RecordBuilder::new("Person").field("x", 1, SchemaType::int()).build();
        assert!(matches!(
            registry.add_record(&redeclared),
            Err(SchemaError::DuplicateRecord { .. })
        ));
    }

    #[test]
    fn test_name_validation() {
        let mut registry = registry();
        let bad_name = NamedRecordType::new("32f").field("a", 1, SchemaType::int());
        assert!(matches!(
            registry.add_record(bad_name),
            Err(SchemaError::InvalidName { name }) if name == "32f"
        ));

        let bad_field = NamedRecordType::new("Foo").field("bad-name", 1, SchemaType::int());
        assert!(matches!(
            registry.add_record(bad_field),
            Err(SchemaError::InvalidFieldName { path, name }) if path == "Foo" && name == "bad-name"
        ));
        assert!(!registry.has_record("Foo"));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut registry = registry();
        assert!(matches!(
            registry.add_record(NamedRecordType::new("Empty")),
            Err(SchemaError::InvalidFields { path, .. }) if path == "Empty"
        ));

        let nested = NamedRecordType::new("Outer")
            .field("inner", 1, SchemaType::record(RecordType::new()));
        assert!(matches!(
            registry.add_record(nested),
            Err(SchemaError::InvalidFields { path, .. }) if path == "Outer.inner"
        ));
    }

    #[test]
    fn test_order_validation() {
        let mut registry = registry();

        let mut missing = NamedRecordType::new("Missing").field("a", 1, SchemaType::int());
        missing.fields["a"].order = None;
        assert!(matches!(
            registry.add_record(missing),
            Err(SchemaError::MissingOrder { path }) if path == "Missing.a"
        ));

        let zero = NamedRecordType::new("Zero").field("a", 0, SchemaType::int());
        assert!(matches!(
            registry.add_record(zero),
            Err(SchemaError::InvalidOrder { order, .. }) if order == "0"
        ));

        let negative = NamedRecordType::new("Negative").field("a", -3, SchemaType::int());
        assert!(matches!(
            registry.add_record(negative),
            Err(SchemaError::InvalidOrder { order, .. }) if order == "-3"
        ));

        let duplicated = NamedRecordType::new("Dup")
            .field("a", 1, SchemaType::int())
            .field("b", 2, SchemaType::int())
            .field("c", 2, SchemaType::int());
        match registry.add_record(duplicated) {
            Err(SchemaError::DuplicateOrder { path, existing, order }) => {
                assert_eq!(path, "Dup.c");
                assert_eq!(existing, "Dup.b");
                assert_eq!(order, 2);
            }
            other => panic!("Expected DuplicateOrder, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_order_paths() {
        let mut registry = registry();
        let record = NamedRecordType::new("Outer").field(
            "items",
            1,
            SchemaType::array(SchemaType::record(
                RecordType::new()
                    .field("x", 1, SchemaType::int())
                    .field("y", 1, SchemaType::int()),
            )),
        );
        assert!(matches!(
            registry.add_record(record),
            Err(SchemaError::DuplicateOrder { path, .. }) if path == "Outer.items.items.y"
        ));
    }

    #[test]
    fn test_pointer_resolution() {
        let mut registry = registry();

        let bar = RecordBuilder::new("Bar").field("name", 1, SchemaType::string()).build();
        let baz = RecordBuilder::new("Baz").field("age", 1, SchemaType::int()).build();
        registry.add_record(&baz).unwrap();

        let doe = RecordBuilder::new("Doe").field("a", 1, SchemaType::int()).build();
        let joe = RecordBuilder::new("Joe").field("a", 1, SchemaType::int()).build();
        let aoe = RecordBuilder::new("Aoe").field("a", 1, SchemaType::int()).build();
        let boe = RecordBuilder::new("Boe").field("a", 1, SchemaType::int()).build();

        let foo = RecordBuilder::new("Foo")
            .pointer("bar", 1, &bar)
            .field("baz", 2, SchemaType::pointer("Baz"))
            .field("does", 3, SchemaType::array(SchemaType::pointer_to(&doe)))
            .field("joe", 4, SchemaType::map(SchemaType::pointer_to(&joe)))
            .field(
                "aboe",
                5,
                SchemaType::union(vec![SchemaType::pointer_to(&aoe), SchemaType::pointer_to(&boe)]),
            )
            .build();

        assert_eq!(registry.add_record(&foo).unwrap(), "Foo");
        for name in ["Foo", "Bar", "Baz", "Doe", "Joe", "Aoe", "Boe"] {
            assert!(registry.has_record(name), "{} should be registered", name);
        }

        // Forward references are stored resolved, by name
        match &registry.get_record("Foo").unwrap().fields["bar"].ty.kind {
            TypeKind::Pointer(p) => {
                assert_eq!(p.target.as_deref(), Some("Bar"));
                assert!(p.forward.is_none());
            }
            other => panic!("Expected Pointer, got {:?}", other),
        }

        // Pointer targets are registered before the records using them
        let order: Vec<_> = registry.records().map(|r| r.name.as_str()).collect();
        let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert!(position("Bar") < position("Foo"));
        assert!(position("Boe") < position("Foo"));
    }

    #[test]
    fn test_undefined_and_missing_pointer() {
        let mut registry = registry();
        let foo = NamedRecordType::new("Foo").field("baz", 1, SchemaType::pointer("UndefinedName"));
        assert!(matches!(
            registry.add_record(foo),
            Err(SchemaError::UndefinedPointer { path, target }) if path == "Foo.baz" && target == "UndefinedName"
        ));
        assert!(!registry.has_record("Foo"));

        let dangling = NamedRecordType::new("Dangling").field(
            "p",
            1,
            SchemaType::union(vec![SchemaType::null(), SchemaType::new(TypeKind::Pointer(PointerType::default()))]),
        );
        assert!(matches!(
            registry.add_record(dangling),
            Err(SchemaError::MissingPointerRef { path }) if path == "Dangling.p.union[1]"
        ));
    }

    #[test]
    fn test_self_reference() {
        let mut registry = registry();
        let node = NamedRecordType::new("Node")
            .field("value", 1, SchemaType::int())
            .field("next", 2, SchemaType::pointer("Node").nullable());
        assert_eq!(registry.add_record(node).unwrap(), "Node");

        // Only the record under validation may be referenced before it exists
        let leaf = RecordBuilder::new("Leaf")
            .field("parent", 1, SchemaType::pointer("Tree"))
            .build();
        let tree = RecordBuilder::new("Tree").pointer("leaf", 1, &leaf).build();
        assert!(matches!(
            registry.add_record(&tree),
            Err(SchemaError::UndefinedPointer { path, .. }) if path == "Leaf.parent"
        ));
        assert!(!registry.has_record("Tree"));
        assert!(!registry.has_record("Leaf"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut registry = registry();
        let record = NamedRecordType::new("Code").field(
            "value",
            1,
            SchemaType::string_with(StringType {
                pattern: Some("([a-z".to_string()),
                ..Default::default()
            }),
        );
        assert!(matches!(
            registry.add_record(record),
            Err(SchemaError::InvalidFields { path, .. }) if path == "Code.value"
        ));
    }

    #[test]
    fn test_receivers() {
        let mut registry = registry();
        registry.add_record(person()).unwrap();
        let query = NamedRecordType::new("PersonQuery").field("id", 1, SchemaType::long());
        registry.add_record(query).unwrap();

        registry
            .add_receiver("people", Receiver::query("get", "PersonQuery", "Person"))
            .unwrap();
        registry
            .add_receiver("people", Receiver::command("save", "Person"))
            .unwrap();
        // Same name in another namespace is fine
        registry
            .add_receiver("admin", Receiver::command("save", "Person"))
            .unwrap();

        assert!(matches!(
            registry.add_receiver("people", Receiver::command("save", "Person")),
            Err(SchemaError::DuplicateReceiver { namespace, name }) if namespace == "people" && name == "save"
        ));
        assert!(matches!(
            registry.add_receiver("people", Receiver::query("find", "PersonQuery", "Nope")),
            Err(SchemaError::UndefinedRecord { name, context }) if name == "Nope" && context == "Query people.find output"
        ));
        assert!(matches!(
            registry.add_receiver("people", Receiver::command("drop", "Nope")),
            Err(SchemaError::UndefinedRecord { .. })
        ));

        let mut unknown = Receiver::command("stream", "Person");
        unknown.kind = ReceiverKind::Unsupported;
        assert!(matches!(
            registry.add_receiver("people", unknown),
            Err(SchemaError::UnknownReceiverKind { .. })
        ));

        assert_eq!(registry.receivers("people").count(), 2);
        assert!(registry.receiver("admin", "save").is_some());
        assert_eq!(registry.namespaces().collect::<Vec<_>>(), vec!["people", "admin"]);
    }

    #[test]
    fn test_lock_is_irreversible() {
        let mut registry = registry();
        registry.add_record(person()).unwrap();
        registry.lock();
        registry.lock();
        assert!(registry.is_locked());

        assert!(matches!(registry.add_record("Person"), Err(SchemaError::SchemaLocked)));
        assert!(matches!(
            registry.add_record(NamedRecordType::new("Other").field("a", 1, SchemaType::int())),
            Err(SchemaError::SchemaLocked)
        ));
        assert!(matches!(
            registry.add_record(NamedRecordType::new("bad name")),
            Err(SchemaError::SchemaLocked)
        ));
        assert!(matches!(
            registry.add_receiver("ns", Receiver::command("save", "Person")),
            Err(SchemaError::SchemaLocked)
        ));
        assert!(registry.has_record("Person"));
    }

    #[test]
    fn test_signals() {
        let mut registry = registry();
        let created = RecordBuilder::new("PersonCreated")
            .field("id", 1, SchemaType::long())
            .signal()
            .build();
        registry.add_record(&created).unwrap();
        registry.add_record(&created).unwrap();
        registry.add_record(person()).unwrap();
        assert_eq!(registry.signals(), &["PersonCreated".to_string()]);
    }

    #[test]
    fn test_parse_normalize_roundtrip() {
        let mut registry = registry();
        let address = RecordBuilder::new("Address").field("street", 1, SchemaType::string()).build();
        let customer = RecordBuilder::new("Customer")
            .field("name", 1, SchemaType::string())
            .pointer("address", 2, &address)
            .build();
        registry.add_record(&customer).unwrap();
        registry.add_record(person()).unwrap();
        registry
            .add_receiver("crm", Receiver::query("lookup", "Person", "Customer"))
            .unwrap();

        let snapshot = registry.normalize();
        let parsed = SchemaRegistry::parse(snapshot.clone()).unwrap();

        for record in registry.records() {
            assert_eq!(parsed.get_record(&record.name), Some(record));
        }
        assert_eq!(parsed.normalize(), snapshot);
        assert_eq!(parsed.receiver("crm", "lookup"), registry.receiver("crm", "lookup"));
    }

    #[test]
    fn test_parse_rejects_invalid_snapshot() {
        let mut snapshot = registry().normalize();
        snapshot.records.insert(
            "Broken".to_string(),
            NamedRecordType::new("Broken").field("a", 1, SchemaType::pointer("Ghost")),
        );
        assert!(matches!(
            SchemaRegistry::parse(snapshot),
            Err(SchemaError::UndefinedPointer { .. })
        ));

        let mut snapshot = registry().normalize();
        snapshot
            .receivers
            .entry("ns".to_string())
            .or_default()
            .insert("get".to_string(), Receiver::command("get", "Ghost"));
        assert!(matches!(
            SchemaRegistry::parse(snapshot),
            Err(SchemaError::UndefinedRecord { .. })
        ));
    }
}
