use crate::{
    entity::write_lock, shared, ClassMeta, ColumnKind, Entity, EntityId, EntityManager,
    QueryBuilder, Result, RowLabeled, Shared, Statement, Value, CUSTOM_ID_COLUMN,
    CUSTOM_VALUE_COLUMN,
};
use std::sync::Arc;
use time::{macros::format_description, Date, PrimitiveDateTime, Time};

impl EntityManager {
    /// Materializes one result row into a populated entity. A `None` row
    /// yields `None` — "no relationship target" is not an error. Rows whose
    /// identifier is already cached resolve to the cached instance without
    /// allocating; that is also what keeps cyclic relationship graphs
    /// finite.
    pub(crate) fn hydrate<E: Entity>(
        &self,
        row: Option<&RowLabeled>,
        meta: &ClassMeta<E>,
    ) -> Result<Option<Shared<E>>> {
        let Some(row) = row else {
            return Ok(None);
        };

        let identifier_value = row
            .get_column(meta.identifier_column())
            .cloned()
            .unwrap_or(Value::Null);
        let identifier = EntityId::from_value(&identifier_value);
        if let Some(id) = &identifier {
            if let Some(hit) = self.cache.get::<E>(id) {
                self.listeners.entity_loaded(meta.entity, Some(id));
                return Ok(Some(hit));
            }
        }

        let mut entity = E::default();
        for column in meta.table_columns() {
            if column.is_relationship() {
                continue;
            }
            let Some(name) = column.column else { continue };
            let Some(value) = row.get_column(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(accessor) = column.accessor() {
                accessor.set(&mut entity, value.clone())?;
            }
        }

        let entity = shared(entity);
        // Registered before relationships resolve, so a cycle coming back
        // around finds this instance instead of materializing a second one.
        let entity = match &identifier {
            Some(id) => {
                let canonical = self.cache.add_or_get(id.clone(), entity.clone());
                if !Arc::ptr_eq(&canonical, &entity) {
                    self.listeners.entity_loaded(meta.entity, Some(id));
                    return Ok(Some(canonical));
                }
                canonical
            }
            None => entity,
        };

        for column in meta.relationships() {
            let Some(relation) = &column.relation else {
                continue;
            };
            match relation.kind {
                crate::RelationKind::ManyToOne => {
                    let foreign_key = column
                        .column
                        .and_then(|name| row.get_column(name))
                        .cloned()
                        .unwrap_or(Value::Null);
                    if foreign_key.is_null() {
                        // No related row; the field stays unset.
                        continue;
                    }
                    (relation.resolve)(self, &entity, &foreign_key)?;
                }
                crate::RelationKind::OneToMany => {
                    // Always resolved by its own query, never from row data.
                    (relation.resolve)(self, &entity, &identifier_value)?;
                }
            }
        }

        if meta.has_custom_columns() {
            self.hydrate_custom_columns(&entity, meta)?;
        }
        self.listeners.entity_loaded(meta.entity, identifier.as_ref());
        Ok(Some(entity))
    }

    /// Pulls this entity's `(CustomFieldId, CustomFieldValue)` rows and
    /// assigns each through its declared semantic type. Unresolvable ids
    /// and unconvertible or unassignable values leave the field at its
    /// default; a partially populated entity beats a failed read.
    fn hydrate_custom_columns<E: Entity>(
        &self,
        entity: &Shared<E>,
        meta: &ClassMeta<E>,
    ) -> Result<()> {
        let (Some(table), Some(reference)) = (meta.custom_table, meta.custom_reference) else {
            return Ok(());
        };
        let operation = format!("HydrateCustomColumns:{}", meta.entity);
        let sql = QueryBuilder::new()
            .select([reference, CUSTOM_ID_COLUMN, CUSTOM_VALUE_COLUMN])
            .from(table)
            .where_eq_param(reference, "identifier")
            .sql();
        let identifier = meta.shared_identifier_value(entity);
        let rows = self
            .with_retry(&operation, || {
                let mut connection = self.driver.connect()?;
                Statement::new(&mut *connection, sql.as_str())
                    .bind("identifier", identifier.clone())
                    .fetch()
            })
            .map_err(|e| self.persistence_error(&operation, e))?;

        for row in rows {
            let Some(raw) = row.get_column(CUSTOM_VALUE_COLUMN) else {
                continue;
            };
            if raw.is_null() {
                continue;
            }
            let Some(field_id) = row.get_column(CUSTOM_ID_COLUMN).and_then(Value::as_integer)
            else {
                continue;
            };
            let Some(column) = meta.custom_column(field_id as i32) else {
                continue;
            };
            let Some(value) = convert_custom_value(column.kind, raw) else {
                log::debug!(
                    "custom field {} of {} holds a value unconvertible to {:?}",
                    field_id,
                    meta.entity,
                    column.kind
                );
                continue;
            };
            if let Some(accessor) = column.accessor() {
                if let Err(error) = accessor.set(&mut write_lock(entity), value) {
                    log::debug!(
                        "skipping custom field {} of {}: {}",
                        field_id,
                        meta.entity,
                        error
                    );
                }
            }
        }
        Ok(())
    }
}

/// Converts a raw custom column payload into the declared semantic type.
/// Values already in the declared storage shape pass through; text parses
/// locale-invariantly; everything else yields no value.
fn convert_custom_value(kind: ColumnKind, raw: &Value) -> Option<Value> {
    if raw.same_type(&kind.template()) {
        return Some(raw.clone());
    }
    let text = match raw {
        Value::Varchar(Some(v)) => v.clone(),
        other => other.to_string(),
    };
    let text = text.trim();
    match kind {
        ColumnKind::Boolean => parse_boolean(text).map(|v| Value::Boolean(Some(v))),
        ColumnKind::Byte => text.parse().ok().map(|v| Value::UInt8(Some(v))),
        ColumnKind::Int16 => text.parse().ok().map(|v| Value::Int16(Some(v))),
        ColumnKind::Int32 => text.parse().ok().map(|v| Value::Int32(Some(v))),
        ColumnKind::Int64 => text.parse().ok().map(|v| Value::Int64(Some(v))),
        ColumnKind::Single => text.parse().ok().map(|v| Value::Float32(Some(v))),
        ColumnKind::Double => text.parse().ok().map(|v| Value::Float64(Some(v))),
        ColumnKind::Decimal => text.parse().ok().map(|v| Value::Decimal(Some(v))),
        ColumnKind::DateTime => parse_timestamp(text).map(|v| Value::Timestamp(Some(v))),
        ColumnKind::Date => parse_date(text).map(|v| Value::Date(Some(v))),
        ColumnKind::Time => parse_time(text).map(|v| Value::Time(Some(v))),
        ColumnKind::String => Some(Value::Varchar(Some(text.to_string()))),
        // Binary, GUID, money and the other exotics are not supported as
        // custom column payloads.
        _ => None,
    }
}

/// Integer first, invariant boolean text second.
fn parse_boolean(text: &str) -> Option<bool> {
    if let Ok(number) = text.parse::<i64>() {
        return Some(number != 0);
    }
    match text.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Option<PrimitiveDateTime> {
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let tee = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(text, &spaced)
        .or_else(|_| PrimitiveDateTime::parse(text, &tee))
        .ok()
        .or_else(|| parse_date(text).map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT)))
}

fn parse_date(text: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text, &format).ok()
}

fn parse_time(text: &str) -> Option<Time> {
    let format = format_description!("[hour]:[minute]:[second]");
    Time::parse(text, &format).ok()
}
