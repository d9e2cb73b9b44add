//! Schema-to-wire compiler
//!
//! Lowers registered records into [`WireType`]s. Two caches sit in front of
//! the recursion:
//!
//! - compiled records, by record name;
//! - resolved pointer subtrees, by target record name.
//!
//! Both are filled lazily and never invalidated; the registry is immutable
//! once the compiler exists. First-time compilation is serialized by a
//! compile lock, so each record is compiled at most once and every reference
//! to it shares one `Arc`.
//!
//! Inline records and enums share one namespace with the registered records.
//! A generated `<Parent>_<field>` name that is already taken gets a numeric
//! suffix. An explicit name may be reused only by an identical definition.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{Result, SchemaError};
use crate::logical::LogicalType;
use crate::name::wire_name;
use crate::registry::SchemaRegistry;
use crate::types::{ordered_fields, Branch, Field, PointerType, SchemaType, TypeKind};
use crate::wire::{WireEnum, WireField, WireRecord, WireType};

/// Cache counters, for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerStats {
    pub records_compiled: usize,
    pub record_cache_hits: usize,
    pub pointer_cache_hits: usize,
}

#[derive(Debug, Default)]
struct Counters {
    records_compiled: AtomicUsize,
    record_cache_hits: AtomicUsize,
    pointer_cache_hits: AtomicUsize,
}

/// An inline named type, keyed by its wire name
#[derive(Debug, Clone)]
enum Named {
    /// Claimed while its definition is being lowered
    Reserved,
    Record(Arc<WireRecord>),
    Enum(Arc<WireEnum>),
}

/// Records on the current compilation path, outermost first
#[derive(Default)]
struct Session {
    in_progress: Vec<String>,
    /// Inline named types of each record in `in_progress`
    defined: Vec<HashMap<String, Named>>,
}

impl Session {
    fn lookup(&self, key: &str) -> Option<&Named> {
        self.defined.iter().rev().find_map(|frame| frame.get(key))
    }

    fn insert(&mut self, key: String, named: Named) {
        if let Some(frame) = self.defined.last_mut() {
            frame.insert(key, named);
        }
    }
}

#[derive(Debug)]
pub struct WireCompiler {
    registry: Arc<SchemaRegistry>,
    logical: Arc<dyn LogicalType>,
    records: RwLock<HashMap<String, Arc<WireRecord>>>,
    pointers: RwLock<HashMap<String, WireType>>,
    /// Wire names of registered records
    reserved: HashSet<String>,
    /// Inline named types of compiled records; written under the compile lock
    named: RwLock<HashMap<String, Named>>,
    compile_lock: Mutex<()>,
    counters: Counters,
}

impl WireCompiler {
    pub fn new(registry: Arc<SchemaRegistry>, logical: Arc<dyn LogicalType>) -> Self {
        let reserved = registry.records().map(|r| wire_name(&r.name)).collect();
        Self {
            registry,
            logical,
            records: RwLock::new(HashMap::new()),
            pointers: RwLock::new(HashMap::new()),
            reserved,
            named: RwLock::new(HashMap::new()),
            compile_lock: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn logical_type(&self) -> &dyn LogicalType {
        self.logical.as_ref()
    }

    /// Compile a registered record into its wire type
    pub fn compile(&self, name: &str) -> Result<WireType> {
        Ok(WireType::Record(self.compile_record(name)?))
    }

    /// Compile a registered record, returning the shared compiled record
    pub fn compile_record(&self, name: &str) -> Result<Arc<WireRecord>> {
        let cached = self.records.read().get(name).cloned();
        if let Some(record) = cached {
            self.counters.record_cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(record);
        }
        if !self.registry.has_record(name) {
            return Err(SchemaError::UnknownRecord {
                name: name.to_string(),
            });
        }

        let _guard = self.compile_lock.lock();
        let mut session = Session::default();
        self.record_by_name(name, &mut session)
    }

    pub fn stats(&self) -> CompilerStats {
        CompilerStats {
            records_compiled: self.counters.records_compiled.load(Ordering::Relaxed),
            record_cache_hits: self.counters.record_cache_hits.load(Ordering::Relaxed),
            pointer_cache_hits: self.counters.pointer_cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Must be called with the compile lock held
    fn record_by_name(&self, name: &str, session: &mut Session) -> Result<Arc<WireRecord>> {
        let cached = self.records.read().get(name).cloned();
        if let Some(record) = cached {
            self.counters.record_cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(record);
        }

        let record = self
            .registry
            .get_record(name)
            .ok_or_else(|| SchemaError::UnknownRecord {
                name: name.to_string(),
            })?;

        session.in_progress.push(name.to_string());
        session.defined.push(HashMap::new());
        let fields = self.lower_fields(name, name, &record.fields, session);
        let defined = session.defined.pop().unwrap_or_default();
        session.in_progress.pop();

        let compiled = Arc::new(WireRecord {
            name: name.to_string(),
            doc: record.description.clone(),
            fields: fields?,
        });
        self.named.write().extend(defined);
        self.records.write().insert(name.to_string(), compiled.clone());
        self.counters.records_compiled.fetch_add(1, Ordering::Relaxed);
        debug!(record = %name, fields = compiled.fields.len(), "Compiled record");
        Ok(compiled)
    }

    fn lower_fields(
        &self,
        path: &str,
        scope: &str,
        fields: &IndexMap<String, Field>,
        session: &mut Session,
    ) -> Result<Vec<WireField>> {
        ordered_fields(fields)
            .into_iter()
            .map(|(field_name, field)| {
                let field_path = format!("{}.{}", path, field_name);
                let order = field.checked_order(&field_path)?;
                let ty = self.lower(
                    &field.ty,
                    &field_path,
                    &format!("{}_{}", scope, field_name),
                    session,
                )?;
                Ok(WireField {
                    name: field_name.clone(),
                    order,
                    ty,
                    doc: field.ty.base.description.clone(),
                })
            })
            .collect()
    }

    /// Lower a type, including its nullable wrapper.
    ///
    /// `scope` names inline records and enums that carry no explicit name.
    fn lower(&self, ty: &SchemaType, path: &str, scope: &str, session: &mut Session) -> Result<WireType> {
        let Some(branches) = ty.union_branches() else {
            return self.lower_kind(ty, path, scope, session);
        };

        let is_union = matches!(ty.kind, TypeKind::Union(_));
        let mut lowered = Vec::with_capacity(branches.len());
        for (i, branch) in branches.into_iter().enumerate() {
            let wire = match branch {
                Branch::Null => WireType::Null,
                Branch::Of(alternative) if is_union => self.lower_kind(
                    alternative,
                    &format!("{}.union[{}]", path, i),
                    &format!("{}_{}", scope, i),
                    session,
                )?,
                Branch::Of(alternative) => self.lower_kind(alternative, path, scope, session)?,
            };
            lowered.push(wire);
        }
        Ok(WireType::Union(lowered))
    }

    /// Lower a type ignoring its nullable flag
    fn lower_kind(&self, ty: &SchemaType, path: &str, scope: &str, session: &mut Session) -> Result<WireType> {
        let wire = match &ty.kind {
            TypeKind::Null => WireType::Null,
            TypeKind::Boolean => WireType::Boolean,
            TypeKind::Int(_) => WireType::Int,
            TypeKind::Long(_) => WireType::Long,
            TypeKind::Float(_) => WireType::Float,
            TypeKind::Double(_) => WireType::Double,
            TypeKind::Timestamp => self.logical.wire_type(),
            TypeKind::Bytes => WireType::Bytes,
            TypeKind::String(_) => WireType::String,
            TypeKind::Record(record) => {
                let name = self.claim_name(ty, path, scope, session)?;
                let fields = self.lower_fields(path, &name, &record.fields, session)?;
                let compiled = Arc::new(WireRecord {
                    name,
                    doc: ty.base.description.clone(),
                    fields,
                });
                self.define(WireType::Record(compiled), path, session)?
            }
            TypeKind::Enum(enumeration) => {
                let name = self.claim_name(ty, path, scope, session)?;
                let compiled = Arc::new(WireEnum {
                    name,
                    doc: ty.base.description.clone(),
                    symbols: enumeration.symbols.clone(),
                });
                self.define(WireType::Enum(compiled), path, session)?
            }
            TypeKind::Array(array) => WireType::Array(Box::new(self.lower(
                &array.items,
                &format!("{}.items", path),
                &format!("{}_items", scope),
                session,
            )?)),
            TypeKind::Map(map) => WireType::Map(Box::new(self.lower(
                &map.values,
                &format!("{}.values", path),
                &format!("{}_values", scope),
                session,
            )?)),
            TypeKind::Union(_) => return self.lower(ty, path, scope, session),
            TypeKind::Pointer(pointer) => return self.lower_pointer(pointer, path, session),
            TypeKind::Unsupported => {
                return Err(SchemaError::UnsupportedType {
                    path: path.to_string(),
                })
            }
        };
        Ok(wire)
    }

    fn lookup_named(&self, key: &str, session: &Session) -> Option<Named> {
        match session.lookup(key) {
            Some(named) => Some(named.clone()),
            None => self.named.read().get(key).cloned(),
        }
    }

    /// Pick the name of an inline record or enum.
    ///
    /// Generated names are suffixed until free. An explicit name is checked
    /// against registered records and against definitions still being lowered;
    /// finished definitions are compared in [`Self::define`].
    fn claim_name(&self, ty: &SchemaType, path: &str, scope: &str, session: &mut Session) -> Result<String> {
        if let Some(name) = &ty.base.name {
            let key = wire_name(name);
            let existing = self.lookup_named(&key, session);
            if self.reserved.contains(&key) || matches!(existing, Some(Named::Reserved)) {
                return Err(SchemaError::ConflictingType {
                    path: path.to_string(),
                    name: name.clone(),
                });
            }
            if existing.is_none() {
                session.insert(key, Named::Reserved);
            }
            return Ok(name.clone());
        }

        let mut name = scope.to_string();
        let mut suffix = 1;
        loop {
            let key = wire_name(&name);
            if !self.reserved.contains(&key) && self.lookup_named(&key, session).is_none() {
                session.insert(key, Named::Reserved);
                return Ok(name);
            }
            suffix += 1;
            name = format!("{}_{}", scope, suffix);
        }
    }

    /// Record a lowered inline type under its claimed name, reusing an
    /// identical earlier definition
    fn define(&self, wire: WireType, path: &str, session: &mut Session) -> Result<WireType> {
        let (name, named) = match &wire {
            WireType::Record(record) => (record.name.clone(), Named::Record(record.clone())),
            WireType::Enum(enumeration) => (enumeration.name.clone(), Named::Enum(enumeration.clone())),
            _ => return Ok(wire),
        };
        let key = wire_name(&name);

        let existing = self.lookup_named(&key, session);
        let identical = match (&existing, &named) {
            (Some(Named::Record(existing)), Named::Record(record)) if existing.fields == record.fields => {
                Some(WireType::Record(existing.clone()))
            }
            (Some(Named::Enum(existing)), Named::Enum(enumeration))
                if existing.symbols == enumeration.symbols =>
            {
                Some(WireType::Enum(existing.clone()))
            }
            _ => None,
        };

        match existing {
            None | Some(Named::Reserved) => {
                trace!(name = %name, path = %path, "Defined inline type");
                session.insert(key, named);
                Ok(wire)
            }
            Some(existing) => {
                let wire = identical.ok_or_else(|| SchemaError::ConflictingType {
                    path: path.to_string(),
                    name,
                })?;
                // Keep the reused definition with the record that now depends on it
                session.insert(key, existing);
                Ok(wire)
            }
        }
    }

    fn lower_pointer(&self, pointer: &PointerType, path: &str, session: &mut Session) -> Result<WireType> {
        let target = pointer
            .target
            .as_deref()
            .ok_or_else(|| SchemaError::MissingPointerRef {
                path: path.to_string(),
            })?;

        if session.in_progress.iter().any(|name| name == target) {
            return Ok(WireType::Ref(target.to_string()));
        }

        let cached = self.pointers.read().get(target).cloned();
        if let Some(wire) = cached {
            trace!(target = %target, "Pointer cache hit");
            self.counters.pointer_cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(wire);
        }

        if !self.registry.has_record(target) {
            return Err(SchemaError::UndefinedPointer {
                path: path.to_string(),
                target: target.to_string(),
            });
        }

        let wire = WireType::Record(self.record_by_name(target, session)?);
        self.pointers.write().insert(target.to_string(), wire.clone());
        Ok(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::TimestampMillis;
    use crate::record::{NamedRecordType, RecordBuilder};
    use crate::types::RecordType;
    use serde_json::json;

    fn compiler(registry: SchemaRegistry) -> WireCompiler {
        WireCompiler::new(Arc::new(registry), Arc::new(TimestampMillis))
    }

    fn field_types(record: &WireRecord) -> Vec<(&str, &WireType)> {
        record.fields.iter().map(|f| (f.name.as_str(), &f.ty)).collect()
    }

    #[test]
    fn test_fields_follow_order_not_declaration() {
        let mut registry = SchemaRegistry::new("test", "avro");
        registry
            .add_record(
                NamedRecordType::new("Pair")
                    .field("b", 2, SchemaType::string())
                    .field("a", 1, SchemaType::int()),
            )
            .unwrap();
        let compiler = compiler(registry);

        let record = compiler.compile_record("Pair").unwrap();
        assert_eq!(record.field_names(), vec!["a", "b"]);
        assert_eq!(
            compiler.compile("Pair").unwrap().to_avro_json(),
            json!({
                "type": "record",
                "name": "Pair",
                "fields": [
                    { "name": "a", "type": "int" },
                    { "name": "b", "type": "string" }
                ]
            })
        );
    }

    #[test]
    fn test_nullable_is_null_first_union() {
        let mut registry = SchemaRegistry::new("test", "avro");
        registry
            .add_record(
                NamedRecordType::new("Maybe")
                    .field("name", 1, SchemaType::string().nullable())
                    .field(
                        "either",
                        2,
                        SchemaType::union(vec![SchemaType::string(), SchemaType::int()]).nullable(),
                    ),
            )
            .unwrap();
        let record = compiler(registry).compile_record("Maybe").unwrap();

        assert_eq!(
            record.fields[0].ty,
            WireType::Union(vec![WireType::Null, WireType::String])
        );
        assert_eq!(
            record.fields[1].ty,
            WireType::Union(vec![WireType::Null, WireType::String, WireType::Int])
        );
    }

    #[test]
    fn test_lowering_rules() {
        let mut registry = SchemaRegistry::new("test", "avro");
        registry
            .add_record(
                NamedRecordType::new("Everything")
                    .field("flag", 1, SchemaType::boolean())
                    .field("count", 2, SchemaType::long())
                    .field("ratio", 3, SchemaType::float())
                    .field("score", 4, SchemaType::double())
                    .field("raw", 5, SchemaType::bytes())
                    .field("at", 6, SchemaType::timestamp())
                    .field("status", 7, SchemaType::enumeration(["ACTIVE", "DISABLED"]))
                    .field("tags", 8, SchemaType::array(SchemaType::string()))
                    .field("headers", 9, SchemaType::map(SchemaType::int()))
                    .field(
                        "inner",
                        10,
                        SchemaType::record(RecordType::new().field("x", 1, SchemaType::int())),
                    )
                    .field("nothing", 11, SchemaType::null()),
            )
            .unwrap();
        let record = compiler(registry).compile_record("Everything").unwrap();
        let types = field_types(&record);

        assert_eq!(types[0].1, &WireType::Boolean);
        assert_eq!(types[1].1, &WireType::Long);
        assert_eq!(types[2].1, &WireType::Float);
        assert_eq!(types[3].1, &WireType::Double);
        assert_eq!(types[4].1, &WireType::Bytes);
        assert_eq!(types[5].1, &TimestampMillis.wire_type());
        match types[6].1 {
            WireType::Enum(e) => {
                assert_eq!(e.name, "Everything_status");
                assert_eq!(e.symbols, vec!["ACTIVE", "DISABLED"]);
            }
            other => panic!("Expected Enum, got {:?}", other),
        }
        assert_eq!(types[7].1, &WireType::Array(Box::new(WireType::String)));
        assert_eq!(types[8].1, &WireType::Map(Box::new(WireType::Int)));
        match types[9].1 {
            WireType::Record(inner) => assert_eq!(inner.name, "Everything_inner"),
            other => panic!("Expected Record, got {:?}", other),
        }
        assert_eq!(types[10].1, &WireType::Null);
    }

    #[test]
    fn test_pointer_caching() {
        let mut registry = SchemaRegistry::new("test", "avro");
        let address = RecordBuilder::new("Address").field("street", 1, SchemaType::string()).build();
        let customer = RecordBuilder::new("Customer")
            .pointer("home", 1, &address)
            .pointer("work", 2, &address)
            .field("previous", 3, SchemaType::array(SchemaType::pointer("Address")))
            .build();
        registry.add_record(&customer).unwrap();
        let compiler = compiler(registry);

        let record = compiler.compile_record("Customer").unwrap();
        let home = record.fields[0].ty.as_record().unwrap();
        let work = record.fields[1].ty.as_record().unwrap();
        assert!(Arc::ptr_eq(home, work));
        match &record.fields[2].ty {
            WireType::Array(items) => assert!(Arc::ptr_eq(items.as_record().unwrap(), home)),
            other => panic!("Expected Array, got {:?}", other),
        }

        let stats = compiler.stats();
        assert_eq!(stats.records_compiled, 2);
        assert_eq!(stats.pointer_cache_hits, 2);

        // The standalone record is the same compiled object
        let standalone = compiler.compile_record("Address").unwrap();
        assert!(Arc::ptr_eq(&standalone, home));
        assert_eq!(compiler.stats().records_compiled, 2);

        // Rendered schema defines Address once
        let rendered = compiler.compile("Customer").unwrap().to_avro_json();
        assert_eq!(rendered["fields"][0]["type"]["name"], json!("Address"));
        assert_eq!(rendered["fields"][1]["type"], json!("Address"));
        assert_eq!(rendered["fields"][2]["type"]["items"], json!("Address"));
    }

    #[test]
    fn test_self_reference_compiles_to_ref() {
        let mut registry = SchemaRegistry::new("test", "avro");
        registry
            .add_record(
                NamedRecordType::new("Node")
                    .field("value", 1, SchemaType::int())
                    .field("next", 2, SchemaType::pointer("Node").nullable()),
            )
            .unwrap();
        let record = compiler(registry).compile_record("Node").unwrap();
        assert_eq!(
            record.fields[1].ty,
            WireType::Union(vec![WireType::Null, WireType::Ref("Node".to_string())])
        );
    }

    #[test]
    fn test_unknown_and_unsupported() {
        let mut registry = SchemaRegistry::new("test", "avro");
        registry
            .add_record(
                NamedRecordType::new("Odd")
                    .field("ok", 1, SchemaType::int())
                    .field("weird", 2, SchemaType::array(SchemaType::new(TypeKind::Unsupported))),
            )
            .unwrap();
        let compiler = compiler(registry);

        assert!(matches!(
            compiler.compile("Missing"),
            Err(SchemaError::UnknownRecord { name }) if name == "Missing"
        ));
        assert!(matches!(
            compiler.compile("Odd"),
            Err(SchemaError::UnsupportedType { path }) if path == "Odd.weird.items"
        ));
        assert_eq!(compiler.stats().records_compiled, 0);
    }

    #[test]
    fn test_generated_name_skips_registered_record() {
        let mut registry = SchemaRegistry::new("test", "avro");
        registry
            .add_record(NamedRecordType::new("Foo_bar").field("x", 1, SchemaType::int()))
            .unwrap();
        registry
            .add_record(
                NamedRecordType::new("Foo")
                    .field(
                        "bar",
                        1,
                        SchemaType::record(RecordType::new().field("y", 1, SchemaType::string())),
                    )
                    .field("other", 2, SchemaType::pointer("Foo_bar")),
            )
            .unwrap();
        let compiler = compiler(registry);

        let record = compiler.compile_record("Foo").unwrap();
        assert_eq!(record.fields[0].ty.type_name(), Some("Foo_bar_2"));
        assert_eq!(record.fields[1].ty.type_name(), Some("Foo_bar"));

        let rendered = compiler.compile("Foo").unwrap().to_avro_json();
        assert_eq!(rendered["fields"][0]["type"]["name"], json!("Foo_bar_2"));
        assert_eq!(rendered["fields"][1]["type"]["name"], json!("Foo_bar"));
        assert_eq!(rendered["fields"][1]["type"]["fields"][0]["name"], json!("x"));
    }

    #[test]
    fn test_explicit_name_conflicts() {
        let mut registry = SchemaRegistry::new("test", "avro");
        registry
            .add_record(
                NamedRecordType::new("Foo")
                    .field("a", 1, SchemaType::enumeration(["X", "Y"]).named("Status"))
                    .field("b", 2, SchemaType::enumeration(["P", "Q", "R"]).named("Status")),
            )
            .unwrap();
        registry
            .add_record(
                NamedRecordType::new("Bar").field(
                    "foo",
                    1,
                    SchemaType::record(RecordType::new().field("v", 1, SchemaType::int())).named("Foo"),
                ),
            )
            .unwrap();
        let compiler = compiler(registry);

        assert!(matches!(
            compiler.compile("Foo"),
            Err(SchemaError::ConflictingType { path, name }) if path == "Foo.b" && name == "Status"
        ));
        assert!(matches!(
            compiler.compile("Bar"),
            Err(SchemaError::ConflictingType { path, name }) if path == "Bar.foo" && name == "Foo"
        ));
    }

    #[test]
    fn test_identical_explicit_names_share_definition() {
        let mut registry = SchemaRegistry::new("test", "avro");
        let status = SchemaType::enumeration(["ACTIVE", "DISABLED"]).named("Status");
        let account = RecordBuilder::new("Account").field("status", 1, status.clone()).build();
        let user = RecordBuilder::new("User")
            .field("status", 1, status.clone())
            .pointer("account", 2, &account)
            .field("previous", 3, status.nullable())
            .build();
        registry.add_record(&user).unwrap();
        let compiler = compiler(registry);

        let record = compiler.compile_record("User").unwrap();
        let account = compiler.compile_record("Account").unwrap();
        match (&record.fields[0].ty, &account.fields[0].ty) {
            (WireType::Enum(a), WireType::Enum(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("Expected Enums, got {:?}", other),
        }

        let rendered = compiler.compile("User").unwrap().to_avro_json();
        assert_eq!(rendered["fields"][0]["type"]["name"], json!("Status"));
        assert_eq!(rendered["fields"][2]["type"], json!(["null", "Status"]));
    }

    #[test]
    fn test_concurrent_compilation_is_single() {
        let mut registry = SchemaRegistry::new("test", "avro");
        let leaf = RecordBuilder::new("Leaf").field("v", 1, SchemaType::int()).build();
        let root = RecordBuilder::new("Root").array_of("leaves", 1, &leaf).build();
        registry.add_record(&root).unwrap();
        registry.lock();
        let compiler = compiler(registry);

        let results: Vec<Arc<WireRecord>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| compiler.compile_record("Root").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for record in &results[1..] {
            assert!(Arc::ptr_eq(record, &results[0]));
        }
        assert_eq!(compiler.stats().records_compiled, 2);
    }
}
