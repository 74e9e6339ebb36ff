use crate::{
    column::{Access, RelationResolver},
    Accessor, AsValue, ColumnKind, ColumnMeta, CustomBinding, EntityManager, Error, MetadataError,
    Relation, RelationKind, Result, Value, CUSTOM_VALUE_COLUMN,
};
use std::{
    fmt::{self, Display},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use uuid::Uuid;

/// The canonical live instance of an entity. The identity cache hands the
/// same `Shared` to every caller, so mutations through it are visible to
/// all holders.
pub type Shared<E> = Arc<RwLock<E>>;

pub fn shared<E>(entity: E) -> Shared<E> {
    Arc::new(RwLock::new(entity))
}

// A poisoned lock still holds the canonical copy; recover it rather than
// propagating the panic of an unrelated writer.
pub(crate) fn read_lock<E>(entity: &Shared<E>) -> RwLockReadGuard<'_, E> {
    entity.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<E>(entity: &Shared<E>) -> RwLockWriteGuard<'_, E> {
    entity.write().unwrap_or_else(PoisonError::into_inner)
}

/// An identifier value backing identity cache lookups: the single-column
/// numeric key, or the row GUID for GUID-keyed lookups. `Int(-1)` is the
/// conventional "not yet assigned" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Int(i64),
    Uuid(Uuid),
}

impl EntityId {
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(v) = value.as_integer() {
            return Some(EntityId::Int(v));
        }
        match value {
            Value::Uuid(Some(v)) => Some(EntityId::Uuid(*v)),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Value {
        match self {
            EntityId::Int(v) => Value::Int64(Some(*v)),
            EntityId::Uuid(v) => Value::Uuid(Some(*v)),
        }
    }

    /// Whether the identifier has been assigned (is not the `-1` sentinel).
    pub fn is_set(&self) -> bool {
        !matches!(self, EntityId::Int(-1))
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        EntityId::Int(value as i64)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Int(value)
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        EntityId::Uuid(value)
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(v) => write!(f, "{}", v),
            EntityId::Uuid(v) => write!(f, "{}", v),
        }
    }
}

/// A type mapped onto exactly one table row. Implementors supply the table
/// binding and the per-field declarations; how those declarations are
/// produced (by hand, by a macro) is no concern of the engine.
pub trait Entity: Default + Send + Sync + 'static {
    /// Entity name used in events and diagnostics.
    fn entity_name() -> &'static str;
    /// Table the entity maps onto.
    fn table() -> &'static str;
    /// Per-field declarations, in field declaration order.
    fn fields() -> Vec<FieldSpec<Self>>;
}

/// Declaration of one entity field: which column it binds, how it is
/// accessed, and whether it is the identifier, a relationship or a custom
/// column. Validated into a [`ColumnMeta`] during metadata resolution.
pub struct FieldSpec<E> {
    field: &'static str,
    column: Option<(&'static str, ColumnKind)>,
    custom: Option<(CustomBinding, ColumnKind)>,
    relation: Option<(RelationKind, &'static str, &'static str, RelationResolver<E>)>,
    identifier: bool,
    row_guid: bool,
    version: bool,
    unique: bool,
    nullable: bool,
    access: Access<E>,
}

impl<E: Entity> FieldSpec<E> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            column: None,
            custom: None,
            relation: None,
            identifier: false,
            row_guid: false,
            version: false,
            unique: false,
            nullable: true,
            access: Access::None,
        }
    }

    /// Binds the field to a plain column of the entity table.
    pub fn column(mut self, name: &'static str, kind: ColumnKind) -> Self {
        self.column = Some((name, kind));
        self
    }

    /// Binds the field to the custom field table instead of a column of its
    /// own.
    pub fn custom(
        mut self,
        table: &'static str,
        field_id: i32,
        reference_column: &'static str,
        kind: ColumnKind,
    ) -> Self {
        self.custom = Some((
            CustomBinding {
                table,
                field_id,
                reference_column,
            },
            kind,
        ));
        self
    }

    /// Declares a many-to-one relationship: the bound column holds a key
    /// matching `reference_column` of a single `T`. The join column is the
    /// declared one, never the target's primary key by assumption.
    pub fn many_to_one<T: Entity>(
        mut self,
        reference_column: &'static str,
        get: impl Fn(&E) -> Option<Shared<T>> + Send + Sync + 'static,
        assign: impl Fn(&mut E, Option<Shared<T>>) + Send + Sync + 'static,
    ) -> Self {
        let resolve: RelationResolver<E> =
            Box::new(move |manager, entity, foreign_key| {
                let target = manager.find_one_by::<T>(&[(reference_column, foreign_key.clone())])?;
                assign(&mut write_lock(entity), target);
                Ok(())
            });
        self.relation = Some((
            RelationKind::ManyToOne,
            T::entity_name(),
            reference_column,
            resolve,
        ));
        let read: Box<dyn Fn(&EntityManager, &E) -> Result<Value> + Send + Sync> =
            Box::new(move |manager, entity| match get(entity) {
                None => Ok(Value::Null),
                Some(target) => {
                    let meta = manager.metadata().resolve::<T>()?;
                    let column = meta.column(reference_column).ok_or_else(|| {
                        MetadataError::UnknownColumn {
                            entity: T::entity_name(),
                            column: reference_column.to_string(),
                        }
                    })?;
                    let accessor = column.accessor().ok_or_else(|| {
                        Error::Conversion(format!(
                            "reference column `{}` of `{}` has no value accessor",
                            reference_column,
                            T::entity_name()
                        ))
                    })?;
                    Ok(accessor.get(&read_lock(&target)))
                }
            });
        self.access = Access::ForeignKey(read);
        self
    }

    /// Declares a one-to-many relationship: all `T` whose `reference_column`
    /// equals this entity's identifier, resolved by a separate query rather
    /// than from column data.
    pub fn one_to_many<T: Entity>(
        mut self,
        reference_column: &'static str,
        assign: impl Fn(&mut E, Vec<Shared<T>>) + Send + Sync + 'static,
    ) -> Self {
        let resolve: RelationResolver<E> = Box::new(move |manager, entity, identifier| {
            let related = manager
                .find_by::<T>(&[(reference_column, identifier.clone())])?
                .unwrap_or_default();
            assign(&mut write_lock(entity), related);
            Ok(())
        });
        self.relation = Some((
            RelationKind::OneToMany,
            T::entity_name(),
            reference_column,
            resolve,
        ));
        self
    }

    /// Resolved get/set pair for the field's value.
    pub fn with<V: AsValue>(
        mut self,
        get: impl Fn(&E) -> V + Send + Sync + 'static,
        set: impl Fn(&mut E, V) + Send + Sync + 'static,
    ) -> Self {
        self.access = Access::Plain(Accessor {
            get: Box::new(move |entity| get(entity).as_value()),
            set: Box::new(move |entity, value| {
                set(entity, V::try_from_value(value)?);
                Ok(())
            }),
        });
        self
    }

    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self.nullable = false;
        self
    }

    pub fn guid(mut self) -> Self {
        self.row_guid = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Validates the declaration. Exactly one of plain column, custom column
    /// and one-to-many must apply; a relationship cannot double as a custom
    /// column; relationships must name their join column explicitly.
    pub(crate) fn into_column_meta(self, entity: &'static str) -> Result<ColumnMeta<E>> {
        let field = self.field;
        let one_to_many = matches!(&self.relation, Some((RelationKind::OneToMany, ..)));
        if self.relation.is_some() && self.custom.is_some() {
            return Err(MetadataError::ConflictingBindings { entity, field }.into());
        }
        if self.custom.is_some() && self.column.is_some() {
            return Err(MetadataError::ConflictingBindings { entity, field }.into());
        }
        if one_to_many && self.column.is_some() {
            return Err(MetadataError::ConflictingBindings { entity, field }.into());
        }
        if matches!(&self.relation, Some((RelationKind::ManyToOne, ..))) && self.column.is_none() {
            return Err(MetadataError::ManyToOneWithoutColumn { entity, field }.into());
        }
        if self.column.is_none() && self.custom.is_none() && !one_to_many {
            return Err(MetadataError::UnboundField { entity, field }.into());
        }
        if let Some((_, _, reference, _)) = &self.relation {
            if reference.is_empty() {
                return Err(MetadataError::MissingJoinColumn { entity, field }.into());
            }
        }
        if self.identifier && (self.custom.is_some() || self.relation.is_some()) {
            return Err(MetadataError::InvalidIdentifier { entity, field }.into());
        }

        let is_custom = self.custom.is_some();
        let (column, kind) = match (&self.column, &self.custom) {
            (Some((name, kind)), None) => (Some(*name), *kind),
            // Custom columns all live in the shared value column of the
            // custom table.
            (None, Some((_, kind))) => (Some(CUSTOM_VALUE_COLUMN), *kind),
            _ => (None, ColumnKind::default()),
        };
        let needs_accessor = self.relation.is_none();
        if needs_accessor && !matches!(self.access, Access::Plain(_)) {
            return Err(MetadataError::MissingAccessor { entity, field }.into());
        }

        let relation = self
            .relation
            .map(|(kind, target, reference_column, resolve)| Relation {
                kind,
                target,
                reference_column,
                resolve,
            });
        Ok(ColumnMeta {
            field,
            column,
            kind,
            template: kind.template(),
            is_identifier: self.identifier,
            is_unique: !is_custom && self.unique,
            is_nullable: is_custom || self.nullable,
            is_row_guid: self.row_guid,
            is_version: self.version,
            relation,
            custom: self.custom.map(|(binding, _)| binding),
            access: self.access,
        })
    }
}
