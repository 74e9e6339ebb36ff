use crate::{EntityManager, Parameters, Result, Shared, Value};
use std::fmt::Write;

/// Semantic column types an entity field may declare. The mapping onto
/// storage [`Value`] templates is fixed; anything unrecognized stores as
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnKind {
    Binary,
    Boolean,
    Byte,
    Bytes,
    Chars,
    Date,
    DateTime,
    Time,
    Decimal,
    Double,
    Guid,
    Int16,
    Int32,
    Int64,
    Money,
    Single,
    #[default]
    String,
    Xml,
}

impl ColumnKind {
    /// Storage template: a typed null [`Value`] describing how this column
    /// is represented by the driver layer.
    pub fn template(&self) -> Value {
        match self {
            ColumnKind::Binary | ColumnKind::Bytes => Value::Blob(None),
            ColumnKind::Boolean => Value::Boolean(None),
            ColumnKind::Byte => Value::UInt8(None),
            ColumnKind::Date => Value::Date(None),
            ColumnKind::DateTime => Value::Timestamp(None),
            ColumnKind::Time => Value::Time(None),
            ColumnKind::Decimal | ColumnKind::Money => Value::Decimal(None),
            ColumnKind::Double => Value::Float64(None),
            ColumnKind::Guid => Value::Uuid(None),
            ColumnKind::Int16 => Value::Int16(None),
            ColumnKind::Int32 => Value::Int32(None),
            ColumnKind::Int64 => Value::Int64(None),
            ColumnKind::Single => Value::Float32(None),
            ColumnKind::Chars | ColumnKind::String | ColumnKind::Xml => Value::Varchar(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
}

/// Binding of a field onto the entity's custom field table: a sparse
/// attribute stored as one `(reference, CustomFieldId, CustomFieldValue)`
/// row instead of a column of the entity table itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomBinding {
    /// Custom field table name.
    pub table: &'static str,
    /// Selects which logical custom field this is.
    pub field_id: i32,
    /// Column of the custom table referencing the owning entity's identifier.
    pub reference_column: &'static str,
}

/// The value column every custom field table stores its payload in.
pub const CUSTOM_VALUE_COLUMN: &str = "CustomFieldValue";
/// The key column every custom field table selects the logical field by.
pub const CUSTOM_ID_COLUMN: &str = "CustomFieldId";

impl CustomBinding {
    /// Upsert statement for one custom field: insert the row when none
    /// exists for `(CustomFieldId, reference)`, update its value column
    /// otherwise. Parameterized by `@identifier`, `@customFieldId` and
    /// `@fieldValue`.
    pub fn upsert_sql(&self) -> String {
        let mut sql = String::with_capacity(256);
        let _ = write!(
            sql,
            "INSERT INTO {} ({}, {}, {})",
            self.table, self.reference_column, CUSTOM_ID_COLUMN, CUSTOM_VALUE_COLUMN
        );
        let _ = write!(sql, "\nVALUES (@identifier, @customFieldId, @fieldValue)");
        let _ = write!(
            sql,
            "\nON CONFLICT ({}, {}) DO UPDATE SET {} = @fieldValue",
            self.reference_column, CUSTOM_ID_COLUMN, CUSTOM_VALUE_COLUMN
        );
        sql
    }
}

/// Capability-typed access to one field: a get/set pair resolved once at
/// metadata construction, replacing by-name lookups at run time.
pub struct Accessor<E> {
    pub(crate) get: Box<dyn Fn(&E) -> Value + Send + Sync>,
    pub(crate) set: Box<dyn Fn(&mut E, Value) -> Result<()> + Send + Sync>,
}

impl<E> Accessor<E> {
    pub fn get(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    pub fn set(&self, entity: &mut E, value: Value) -> Result<()> {
        (self.set)(entity, value)
    }
}

/// How the engine reads and writes the field behind a column.
pub(crate) enum Access<E> {
    /// Plain and custom columns carry a value accessor.
    Plain(Accessor<E>),
    /// Many-to-one fields hold the related entity; the bound column reads
    /// the target's reference column instead.
    ForeignKey(Box<dyn Fn(&EntityManager, &E) -> Result<Value> + Send + Sync>),
    /// One-to-many fields have no column value of their own.
    None,
}

pub(crate) type RelationResolver<E> =
    Box<dyn Fn(&EntityManager, &Shared<E>, &Value) -> Result<()> + Send + Sync>;

/// A declared relationship and the resolver that populates it during
/// hydration.
pub struct Relation<E> {
    pub kind: RelationKind,
    /// Entity name of the relation target.
    pub target: &'static str,
    /// Join column on the target entity. Always explicit; metadata
    /// resolution rejects relationships that leave it unset.
    pub reference_column: &'static str,
    pub(crate) resolve: RelationResolver<E>,
}

impl<E> std::fmt::Debug for Relation<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("reference_column", &self.reference_column)
            .finish()
    }
}

/// Relational binding of one entity field, validated out of its
/// [`FieldSpec`](crate::FieldSpec) declaration.
pub struct ColumnMeta<E> {
    /// Declared field name.
    pub field: &'static str,
    /// Bound column name; `None` for one-to-many fields.
    pub column: Option<&'static str>,
    pub kind: ColumnKind,
    /// Storage template derived from `kind`.
    pub template: Value,
    pub is_identifier: bool,
    pub is_unique: bool,
    pub is_nullable: bool,
    pub is_row_guid: bool,
    pub is_version: bool,
    pub relation: Option<Relation<E>>,
    pub custom: Option<CustomBinding>,
    pub(crate) access: Access<E>,
}

impl<E> ColumnMeta<E> {
    pub fn is_relationship(&self) -> bool {
        self.relation.is_some()
    }

    pub fn is_custom_column(&self) -> bool {
        self.custom.is_some()
    }

    pub(crate) fn accessor(&self) -> Option<&Accessor<E>> {
        match &self.access {
            Access::Plain(accessor) => Some(accessor),
            _ => None,
        }
    }

    /// Column value for insert/update parameter lists. Many-to-one fields
    /// read the foreign key out of the related entity.
    pub(crate) fn read_value(&self, manager: &EntityManager, entity: &E) -> Result<Value> {
        match &self.access {
            Access::Plain(accessor) => Ok(accessor.get(entity)),
            Access::ForeignKey(read) => read(manager, entity),
            Access::None => Ok(Value::Null),
        }
    }

    /// Parameter set for this custom column's upsert. A null or empty
    /// string payload binds as SQL null.
    pub fn custom_parameters(&self, entity: &E, identifier: Value) -> Parameters {
        let binding = self
            .custom
            .as_ref()
            .expect("custom_parameters requires a custom column");
        let mut value = match &self.access {
            Access::Plain(accessor) => accessor.get(entity),
            _ => Value::Null,
        };
        if value.is_null() || value.as_text().is_some_and(str::is_empty) {
            value = Value::Null;
        }
        let mut parameters = Parameters::new();
        parameters
            .set("customFieldId", Value::Int32(Some(binding.field_id)))
            .set("identifier", identifier)
            .set("fieldValue", value);
        parameters
    }
}

impl<E> std::fmt::Debug for ColumnMeta<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnMeta")
            .field("field", &self.field)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .field("is_identifier", &self.is_identifier)
            .field("relation", &self.relation)
            .field("custom", &self.custom)
            .finish()
    }
}
