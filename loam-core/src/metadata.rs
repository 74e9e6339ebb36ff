use crate::{
    entity::read_lock, ColumnMeta, Entity, EntityManager, MetadataError, Parameters, RelationKind,
    Result, Shared, Value,
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// The complete relational shape of one entity type, derived from its field
/// declarations on first resolution and never mutated afterwards.
pub struct ClassMeta<E> {
    pub entity: &'static str,
    pub table: &'static str,
    /// All columns in field declaration order.
    pub columns: Vec<ColumnMeta<E>>,
    by_column: HashMap<&'static str, usize>,
    by_custom_id: HashMap<i32, usize>,
    identifier: usize,
    pub guid_column: Option<&'static str>,
    pub custom_table: Option<&'static str>,
    pub custom_reference: Option<&'static str>,
}

impl<E: Entity> ClassMeta<E> {
    pub(crate) fn build() -> Result<Self> {
        let entity = E::entity_name();
        let mut columns = Vec::new();
        for spec in E::fields() {
            columns.push(spec.into_column_meta(entity)?);
        }

        let mut by_column = HashMap::new();
        let mut by_custom_id = HashMap::new();
        let mut identifier = None;
        let mut guid_column = None;
        let mut custom_table = None;
        let mut custom_reference = None;
        for (index, column) in columns.iter().enumerate() {
            if let Some(name) = column.column {
                if !column.is_custom_column() && by_column.insert(name, index).is_some() {
                    return Err(MetadataError::DuplicateColumn {
                        entity,
                        column: name,
                    }
                    .into());
                }
            }
            if column.is_identifier && identifier.is_none() {
                identifier = Some(index);
            }
            if column.is_row_guid && guid_column.is_none() {
                guid_column = column.column;
            }
            if let Some(binding) = &column.custom {
                if by_custom_id.insert(binding.field_id, index).is_some() {
                    return Err(MetadataError::DuplicateCustomField {
                        entity,
                        field_id: binding.field_id,
                    }
                    .into());
                }
                match custom_table {
                    None => {
                        custom_table = Some(binding.table);
                        custom_reference = Some(binding.reference_column);
                    }
                    Some(table) if table != binding.table => {
                        return Err(MetadataError::MixedCustomTables { entity }.into());
                    }
                    Some(_) => {}
                }
            }
        }
        let identifier = identifier.ok_or(MetadataError::MissingIdentifier { entity })?;

        Ok(Self {
            entity,
            table: E::table(),
            columns,
            by_column,
            by_custom_id,
            identifier,
            guid_column,
            custom_table,
            custom_reference,
        })
    }

    pub fn identifier(&self) -> &ColumnMeta<E> {
        &self.columns[self.identifier]
    }

    pub fn identifier_column(&self) -> &'static str {
        self.identifier().column.unwrap_or_default()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta<E>> {
        self.by_column.get(name).map(|&i| &self.columns[i])
    }

    pub fn custom_column(&self, field_id: i32) -> Option<&ColumnMeta<E>> {
        self.by_custom_id.get(&field_id).map(|&i| &self.columns[i])
    }

    pub fn has_guid_column(&self) -> bool {
        self.guid_column.is_some()
    }

    pub fn has_custom_columns(&self) -> bool {
        !self.by_custom_id.is_empty()
    }

    /// Columns stored in the entity table itself: plain values plus
    /// many-to-one foreign keys. Custom columns and one-to-many fields are
    /// excluded.
    pub fn table_columns(&self) -> impl Iterator<Item = &ColumnMeta<E>> {
        self.columns.iter().filter(|c| {
            c.column.is_some()
                && !c.is_custom_column()
                && !matches!(
                    c.relation.as_ref().map(|r| r.kind),
                    Some(RelationKind::OneToMany)
                )
        })
    }

    pub fn custom_columns(&self) -> impl Iterator<Item = &ColumnMeta<E>> {
        self.columns.iter().filter(|c| c.is_custom_column())
    }

    pub(crate) fn relationships(&self) -> impl Iterator<Item = &ColumnMeta<E>> {
        self.columns.iter().filter(|c| c.is_relationship())
    }

    pub(crate) fn identifier_value(&self, entity: &E) -> Value {
        self.identifier()
            .accessor()
            .map(|a| a.get(entity))
            .unwrap_or(Value::Null)
    }

    pub(crate) fn shared_identifier_value(&self, entity: &Shared<E>) -> Value {
        self.identifier_value(&read_lock(entity))
    }

    /// Parameter dictionary of every table column except the identifier,
    /// for insert and update statements.
    pub(crate) fn parameters(
        &self,
        manager: &EntityManager,
        entity: &Shared<E>,
    ) -> Result<Parameters> {
        let guard = read_lock(entity);
        let mut parameters = Parameters::new();
        for column in self.table_columns() {
            if column.is_identifier {
                continue;
            }
            let name = column.column.unwrap_or_default();
            parameters.set(name, column.read_value(manager, &guard)?);
        }
        Ok(parameters)
    }
}

impl<E> std::fmt::Debug for ClassMeta<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassMeta")
            .field("entity", &self.entity)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Memoizes one [`ClassMeta`] per entity type for the lifetime of the
/// process. Resolution is deterministic and idempotent: the first call
/// inspects the declarations, every later call returns the identical
/// `Arc`.
#[derive(Default)]
pub struct MetadataCache {
    types: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<E: Entity>(&self) -> Result<Arc<ClassMeta<E>>> {
        let key = TypeId::of::<E>();
        {
            let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = types.get(&key) {
                if let Ok(meta) = entry.clone().downcast::<ClassMeta<E>>() {
                    return Ok(meta);
                }
            }
        }

        let meta = Arc::new(ClassMeta::<E>::build()?);
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        // First writer wins so resolution stays reference-stable under
        // concurrent first calls.
        let entry = types
            .entry(key)
            .or_insert_with(|| meta as Arc<dyn Any + Send + Sync>);
        let meta = entry
            .clone()
            .downcast::<ClassMeta<E>>()
            .expect("metadata cache entry keyed by the wrong type");
        Ok(meta)
    }
}
