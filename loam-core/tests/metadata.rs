use loam_core::{
    ColumnKind, Entity, Error, FieldSpec, MetadataCache, MetadataError, RelationKind, Shared,
    Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Parent {
    id: i64,
    name: String,
    children: Vec<Shared<Child>>,
    note: Option<String>,
}

impl Entity for Parent {
    fn entity_name() -> &'static str {
        "Parent"
    }

    fn table() -> &'static str {
        "Parents"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int64)
                .identifier()
                .with(|e: &Parent| e.id, |e, v| e.id = v),
            FieldSpec::new("name")
                .column("Name", ColumnKind::String)
                .not_null()
                .unique()
                .with(|e: &Parent| e.name.clone(), |e, v| e.name = v),
            FieldSpec::new("children")
                .one_to_many::<Child>("ParentId", |e: &mut Parent, v| e.children = v),
            FieldSpec::new("note")
                .custom("ParentFields", 7, "ParentId", ColumnKind::String)
                .with(|e: &Parent| e.note.clone(), |e, v| e.note = v),
        ]
    }
}

#[derive(Default)]
struct Child {
    id: i64,
    parent: Option<Shared<Parent>>,
}

impl Entity for Child {
    fn entity_name() -> &'static str {
        "Child"
    }

    fn table() -> &'static str {
        "Children"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int64)
                .identifier()
                .with(|e: &Child| e.id, |e, v| e.id = v),
            FieldSpec::new("parent").column("ParentId", ColumnKind::Int64).many_to_one::<Parent>(
                "Id",
                |e: &Child| e.parent.clone(),
                |e, v| e.parent = v,
            ),
        ]
    }
}

static COUNTED_INSPECTIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Counted {
    id: i64,
}

impl Entity for Counted {
    fn entity_name() -> &'static str {
        "Counted"
    }

    fn table() -> &'static str {
        "Counted"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        COUNTED_INSPECTIONS.fetch_add(1, Ordering::SeqCst);
        vec![FieldSpec::new("id")
            .column("Id", ColumnKind::Int64)
            .identifier()
            .with(|e: &Counted| e.id, |e, v| e.id = v)]
    }
}

#[test]
fn resolution_is_cached_and_never_reinspects() {
    let cache = MetadataCache::new();
    let first = cache.resolve::<Counted>().unwrap();
    let second = cache.resolve::<Counted>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    // Field declarations were read exactly once.
    assert_eq!(COUNTED_INSPECTIONS.load(Ordering::SeqCst), 1);
}

#[test]
fn class_meta_describes_the_relational_shape() {
    let cache = MetadataCache::new();
    let meta = cache.resolve::<Parent>().unwrap();

    assert_eq!(meta.entity, "Parent");
    assert_eq!(meta.table, "Parents");
    assert_eq!(meta.identifier_column(), "Id");
    assert!(!meta.has_guid_column());
    assert!(meta.has_custom_columns());
    assert_eq!(meta.custom_table, Some("ParentFields"));
    assert_eq!(meta.custom_reference, Some("ParentId"));

    // Declaration order survives into the column list.
    let fields: Vec<_> = meta.columns.iter().map(|c| c.field).collect();
    assert_eq!(fields, ["id", "name", "children", "note"]);

    let name = meta.column("Name").unwrap();
    assert!(name.is_unique);
    assert!(!name.is_nullable);
    assert_eq!(name.kind, ColumnKind::String);

    let children = &meta.columns[2];
    assert!(children.is_relationship());
    assert_eq!(children.column, None);
    let relation = children.relation.as_ref().unwrap();
    assert_eq!(relation.kind, RelationKind::OneToMany);
    assert_eq!(relation.target, "Child");
    assert_eq!(relation.reference_column, "ParentId");

    let note = meta.custom_column(7).unwrap();
    assert!(note.is_custom_column());
    assert_eq!(note.column, Some("CustomFieldValue"));
    assert!(note.is_nullable);

    let child_meta = cache.resolve::<Child>().unwrap();
    let parent_ref = child_meta.column("ParentId").unwrap();
    let relation = parent_ref.relation.as_ref().unwrap();
    assert_eq!(relation.kind, RelationKind::ManyToOne);
    assert_eq!(relation.reference_column, "Id");
}

#[test]
fn storage_templates_follow_the_fixed_mapping() {
    assert_eq!(ColumnKind::Boolean.template(), Value::Boolean(None));
    assert_eq!(ColumnKind::Byte.template(), Value::UInt8(None));
    assert_eq!(ColumnKind::Int16.template(), Value::Int16(None));
    assert_eq!(ColumnKind::Int32.template(), Value::Int32(None));
    assert_eq!(ColumnKind::Int64.template(), Value::Int64(None));
    assert_eq!(ColumnKind::Single.template(), Value::Float32(None));
    assert_eq!(ColumnKind::Double.template(), Value::Float64(None));
    assert_eq!(ColumnKind::Decimal.template(), Value::Decimal(None));
    assert_eq!(ColumnKind::Money.template(), Value::Decimal(None));
    assert_eq!(ColumnKind::Guid.template(), Value::Uuid(None));
    assert_eq!(ColumnKind::Date.template(), Value::Date(None));
    assert_eq!(ColumnKind::DateTime.template(), Value::Timestamp(None));
    assert_eq!(ColumnKind::Time.template(), Value::Time(None));
    assert_eq!(ColumnKind::Binary.template(), Value::Blob(None));
    assert_eq!(ColumnKind::Bytes.template(), Value::Blob(None));
    // Everything text-like stores as text.
    assert_eq!(ColumnKind::String.template(), Value::Varchar(None));
    assert_eq!(ColumnKind::Chars.template(), Value::Varchar(None));
    assert_eq!(ColumnKind::Xml.template(), Value::Varchar(None));
}

#[test]
fn custom_upsert_fragment_and_parameter_normalization() {
    let cache = MetadataCache::new();
    let meta = cache.resolve::<Parent>().unwrap();
    let note = meta.custom_column(7).unwrap();
    let binding = note.custom.as_ref().unwrap();

    let sql = binding.upsert_sql();
    assert!(sql.starts_with("INSERT INTO ParentFields (ParentId, CustomFieldId, CustomFieldValue)"));
    assert!(sql.contains("VALUES (@identifier, @customFieldId, @fieldValue)"));
    assert!(sql.contains("ON CONFLICT (ParentId, CustomFieldId) DO UPDATE SET CustomFieldValue = @fieldValue"));

    let mut parent = Parent::default();
    parent.note = Some("remember".into());
    let parameters = note.custom_parameters(&parent, Value::Int64(Some(3)));
    assert_eq!(parameters.get("customFieldId"), Some(&Value::Int32(Some(7))));
    assert_eq!(parameters.get("identifier"), Some(&Value::Int64(Some(3))));
    assert_eq!(
        parameters.get("fieldValue"),
        Some(&Value::Varchar(Some("remember".into())))
    );

    // Null and empty string both bind as SQL null.
    parent.note = Some(String::new());
    let parameters = note.custom_parameters(&parent, Value::Int64(Some(3)));
    assert_eq!(parameters.get("fieldValue"), Some(&Value::Null));
    parent.note = None;
    let parameters = note.custom_parameters(&parent, Value::Int64(Some(3)));
    assert_eq!(parameters.get("fieldValue"), Some(&Value::Null));
}

#[derive(Default)]
struct Unbound {
    id: i64,
    dangling: i32,
}

impl Entity for Unbound {
    fn entity_name() -> &'static str {
        "Unbound"
    }

    fn table() -> &'static str {
        "Unbound"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int64)
                .identifier()
                .with(|e: &Unbound| e.id, |e, v| e.id = v),
            FieldSpec::new("dangling").with(|e: &Unbound| e.dangling, |e, v| e.dangling = v),
        ]
    }
}

#[derive(Default)]
struct Conflicted {
    id: i64,
    twisted: Option<String>,
}

impl Entity for Conflicted {
    fn entity_name() -> &'static str {
        "Conflicted"
    }

    fn table() -> &'static str {
        "Conflicted"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int64)
                .identifier()
                .with(|e: &Conflicted| e.id, |e, v| e.id = v),
            // A column and a custom binding on the same field.
            FieldSpec::new("twisted")
                .column("Twisted", ColumnKind::String)
                .custom("ConflictedFields", 1, "ConflictedId", ColumnKind::String)
                .with(|e: &Conflicted| e.twisted.clone(), |e, v| e.twisted = v),
        ]
    }
}

#[derive(Default)]
struct Headless {
    name: String,
}

impl Entity for Headless {
    fn entity_name() -> &'static str {
        "Headless"
    }

    fn table() -> &'static str {
        "Headless"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![FieldSpec::new("name")
            .column("Name", ColumnKind::String)
            .with(|e: &Headless| e.name.clone(), |e, v| e.name = v)]
    }
}

#[test]
fn inconsistent_declarations_fail_resolution() {
    let cache = MetadataCache::new();
    match cache.resolve::<Unbound>() {
        Err(Error::Metadata(MetadataError::UnboundField { entity, field })) => {
            assert_eq!(entity, "Unbound");
            assert_eq!(field, "dangling");
        }
        other => panic!("expected an unbound field error, got {:?}", other.err()),
    }
    match cache.resolve::<Conflicted>() {
        Err(Error::Metadata(MetadataError::ConflictingBindings { field, .. })) => {
            assert_eq!(field, "twisted");
        }
        other => panic!("expected conflicting bindings, got {:?}", other.err()),
    }
    match cache.resolve::<Headless>() {
        Err(Error::Metadata(MetadataError::MissingIdentifier { entity })) => {
            assert_eq!(entity, "Headless");
        }
        other => panic!("expected a missing identifier error, got {:?}", other.err()),
    }
}
