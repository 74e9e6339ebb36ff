use crate::{
    entity::{read_lock, write_lock},
    events::Listeners,
    shared, CacheManager, ColumnMeta, Connection, DbError, Driver, Entity, EntityId,
    EntityListener, Error, MetadataCache, Parameters, QueryBuilder, Result, RowLabeled, Shared,
    Statement, Value,
};
use std::{sync::Arc, time::Instant};

/// Number of times an operation is retried on a database-level failure
/// before the error surfaces.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub(crate) struct Exhausted {
    pub attempts: u32,
    pub source: DbError,
}

/// The persistence engine. Owns the process-wide services — metadata
/// resolution, the identity cache, the listener registry — and turns entity
/// instances into transactional, parameterized statements against the
/// injected driver.
///
/// Every operation runs to completion on the caller's thread, retries
/// included. Concurrent callers are expected; the shared state tolerates
/// concurrent reads with occasional writes.
pub struct EntityManager {
    pub(crate) driver: Arc<dyn Driver>,
    metadata: MetadataCache,
    pub(crate) cache: CacheManager,
    pub(crate) listeners: Listeners,
    max_retries: u32,
}

impl EntityManager {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            metadata: MetadataCache::new(),
            cache: CacheManager::new(),
            listeners: Listeners::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn identity_cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn subscribe(&self, listener: Arc<dyn EntityListener>) {
        self.listeners.subscribe(listener);
    }

    /// Writes `entity` as a new row, or delegates to [`update`] when its
    /// identifier is already assigned and the row exists. Returns the
    /// canonical instance re-read from the store; the argument is not the
    /// instance handed back.
    ///
    /// [`update`]: EntityManager::update
    pub fn persist<E: Entity>(&self, entity: E) -> Result<Shared<E>> {
        let meta = self.metadata.resolve::<E>()?;
        let entity = shared(entity);
        let operation = format!("Persist:{}", meta.entity);

        if let Some(identifier) = EntityId::from_value(&meta.shared_identifier_value(&entity)) {
            if identifier.is_set()
                && self.fast_count(
                    meta.table,
                    &[(meta.identifier_column(), identifier.as_value())],
                )? > 0
            {
                return self.update(&entity);
            }
        }

        let insert_sql = QueryBuilder::new().insert(&meta).sql();
        let parameters = meta.parameters(self, &entity)?;
        let guid_lookup = meta.guid_column.map(|guid_column| {
            let value = meta
                .column(guid_column)
                .and_then(ColumnMeta::accessor)
                .map(|accessor| accessor.get(&read_lock(&entity)))
                .unwrap_or(Value::Null);
            let sql = QueryBuilder::new()
                .select([meta.identifier_column()])
                .from(meta.table)
                .where_eq_param(guid_column, "guid")
                .sql();
            (sql, value)
        });
        let last_id_sql = QueryBuilder::new().last_insert_id().sql();
        let custom_upserts = custom_upserts(&meta);

        let last_id = self
            .with_retry(&operation, || {
                self.write_unit(|connection| {
                    Statement::new(&mut *connection, insert_sql.as_str())
                        .bind_many(&parameters)
                        .execute()?;
                    let identity = match &guid_lookup {
                        None => Statement::new(&mut *connection, last_id_sql.as_str())
                            .fetch_scalar()?,
                        Some((sql, guid)) => Statement::new(&mut *connection, sql.as_str())
                            .bind("guid", guid.clone())
                            .fetch_scalar()?,
                    };
                    let last_id = identity
                        .as_ref()
                        .and_then(Value::as_integer)
                        .ok_or_else(|| {
                            DbError::new("the store did not return a generated identifier")
                        })?;
                    for (upsert, column) in &custom_upserts {
                        let custom_parameters = column
                            .custom_parameters(&read_lock(&entity), Value::Int64(Some(last_id)));
                        Statement::new(&mut *connection, upsert.as_str())
                            .bind_many(&custom_parameters)
                            .execute()?;
                    }
                    Ok(last_id)
                })
            })
            .map_err(|e| self.persistence_error(&operation, e))?;

        if let Some(accessor) = meta.identifier().accessor() {
            accessor.set(&mut write_lock(&entity), Value::Int64(Some(last_id)))?;
        }
        log::debug!("persisted {} with identifier {}", meta.entity, last_id);

        // Re-enter the read path so the identity cache holds the copy the
        // caller gets back.
        self.find_by_id::<E>(last_id)?.ok_or(Error::ReloadFailed {
            entity: meta.entity,
            identifier: last_id,
        })
    }

    /// Rewrites every table column of an already-persisted entity, plus its
    /// custom columns, in one transaction. Requires a valid identifier.
    /// On success the identity cache is refreshed so it never serves a
    /// pre-update copy.
    pub fn update<E: Entity>(&self, entity: &Shared<E>) -> Result<Shared<E>> {
        let meta = self.metadata.resolve::<E>()?;
        let operation = format!("Update:{}", meta.entity);
        let identifier = EntityId::from_value(&meta.shared_identifier_value(entity))
            .filter(EntityId::is_set)
            .ok_or(Error::MissingIdentifier)?;

        let sql = QueryBuilder::new()
            .update(&meta)
            .where_eq_param(meta.identifier_column(), "identifier")
            .sql();
        let parameters = meta.parameters(self, entity)?;
        let custom_upserts = custom_upserts(&meta);

        self.with_retry(&operation, || {
            self.write_unit(|connection| {
                Statement::new(&mut *connection, sql.as_str())
                    .bind_many(&parameters)
                    .bind("identifier", identifier.as_value())
                    .execute()?;
                for (upsert, column) in &custom_upserts {
                    let custom_parameters =
                        column.custom_parameters(&read_lock(entity), identifier.as_value());
                    Statement::new(&mut *connection, upsert.as_str())
                        .bind_many(&custom_parameters)
                        .execute()?;
                }
                Ok(())
            })
        })
        .map_err(|e| Error::Statement {
            sql: sql.clone(),
            attempts: e.attempts,
            source: e.source,
        })?;

        self.cache.remove::<E>(&identifier);
        self.cache.add::<E>(identifier, entity.clone());
        Ok(entity.clone())
    }

    /// Looks an entity up by identifier, serving the identity cache when it
    /// can. Null, zero and negative identifiers mean "not found" and never
    /// reach the store.
    pub fn find_by_id<E: Entity>(
        &self,
        identifier: impl Into<EntityId>,
    ) -> Result<Option<Shared<E>>> {
        let identifier = identifier.into();
        if let EntityId::Int(v) = identifier {
            if v < 1 {
                return Ok(None);
            }
        }
        let meta = self.metadata.resolve::<E>()?;
        if let Some(hit) = self.cache.get::<E>(&identifier) {
            log::debug!("identity cache hit for {} {}", meta.entity, identifier);
            self.listeners.entity_loaded(meta.entity, Some(&identifier));
            return Ok(Some(hit));
        }

        let operation = format!("FindById:{}", meta.entity);
        let sql = QueryBuilder::new()
            .select_entity(&meta)
            .from(meta.table)
            .where_eq_param(meta.identifier_column(), "identifier")
            .sql();
        let row = self
            .with_retry(&operation, || {
                let mut connection = self.driver.connect()?;
                Statement::new(&mut *connection, sql.as_str())
                    .bind("identifier", identifier.as_value())
                    .fetch_row()
            })
            .map_err(|e| self.persistence_error(&operation, e))?;
        // The connection is already released here; relationship and custom
        // column resolution open their own.
        self.hydrate(row.as_ref(), &meta)
    }

    /// Filtered enumeration: equality filters ANDed together in the given
    /// order. Returns `None` when the query ran but matched nothing, which
    /// is distinct from both an empty page and a failed query.
    pub fn find_by<E: Entity>(&self, filters: &[(&str, Value)]) -> Result<Option<Vec<Shared<E>>>> {
        let meta = self.metadata.resolve::<E>()?;
        let operation = format!("FindBy:{}", meta.entity);
        let expected = self.fast_count(meta.table, filters)?;

        let mut builder = QueryBuilder::new().select_entity(&meta).from(meta.table);
        for (position, (column, _)) in filters.iter().enumerate() {
            builder = if position == 0 {
                builder.where_eq(column)
            } else {
                builder.and_where_eq(column)
            };
        }
        let sql = builder.sql();
        let parameters: Parameters = filters.iter().map(|(c, v)| (*c, v.clone())).collect();
        let rows = self
            .with_retry(&operation, || {
                let mut connection = self.driver.connect()?;
                Statement::new(&mut *connection, sql.as_str())
                    .bind_many(&parameters)
                    .fetch()
            })
            .map_err(|e| self.persistence_error(&operation, e))?;

        self.listeners.begin_listing(meta.entity, expected);
        if rows.is_empty() {
            self.listeners.end_listing(meta.entity, 0);
            return Ok(None);
        }
        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entity) = self.hydrate(Some(row), &meta)? {
                entities.push(entity);
            }
        }
        self.listeners.end_listing(meta.entity, entities.len() as i64);
        Ok(Some(entities))
    }

    pub fn find_one_by<E: Entity>(&self, filters: &[(&str, Value)]) -> Result<Option<Shared<E>>> {
        Ok(self
            .find_by(filters)?
            .and_then(|mut entities| match entities.is_empty() {
                true => None,
                false => Some(entities.remove(0)),
            }))
    }

    pub fn find_all<E: Entity>(&self) -> Result<Option<Vec<Shared<E>>>> {
        self.find_by::<E>(&[])
    }

    /// Cheap `COUNT(*)` probe used for existence checks and listing sizes.
    pub(crate) fn fast_count(&self, table: &str, filters: &[(&str, Value)]) -> Result<i64> {
        let mut builder = QueryBuilder::new().select_count().from(table);
        for (position, (column, _)) in filters.iter().enumerate() {
            builder = if position == 0 {
                builder.where_eq(column)
            } else {
                builder.and_where_eq(column)
            };
        }
        let sql = builder.sql();
        let parameters: Parameters = filters.iter().map(|(c, v)| (*c, v.clone())).collect();
        let scalar = self
            .with_retry("FastCount", || {
                let mut connection = self.driver.connect()?;
                Statement::new(&mut *connection, sql.as_str())
                    .bind_many(&parameters)
                    .fetch_scalar()
            })
            .map_err(|e| self.persistence_error("FastCount", e))?;
        Ok(scalar.as_ref().and_then(Value::as_integer).unwrap_or(0))
    }

    /// Runs caller-supplied SQL and returns the result set. Read-only and
    /// safe to retry verbatim, like the typed read paths.
    pub fn query_rows(&self, sql: &str, parameters: &Parameters) -> Result<Vec<RowLabeled>> {
        self.with_retry("Query", || {
            let mut connection = self.driver.connect()?;
            connection.fetch(sql, parameters)
        })
        .map_err(|e| self.persistence_error("Query", e))
    }

    pub fn query_row(&self, sql: &str, parameters: &Parameters) -> Result<Option<RowLabeled>> {
        self.with_retry("Query", || {
            let mut connection = self.driver.connect()?;
            connection.fetch_row(sql, parameters)
        })
        .map_err(|e| self.persistence_error("Query", e))
    }

    pub fn query_scalar(&self, sql: &str, parameters: &Parameters) -> Result<Option<Value>> {
        self.with_retry("Query", || {
            let mut connection = self.driver.connect()?;
            connection.fetch_scalar(sql, parameters)
        })
        .map_err(|e| self.persistence_error("Query", e))
    }

    /// Bounded retry loop shared by every operation. Each attempt starts
    /// from a fresh connection (and transaction, for writes); nothing is
    /// reused across attempts. Retries are unconditional on any database
    /// error; no classification is attempted yet.
    pub(crate) fn with_retry<T>(
        &self,
        operation: &str,
        mut attempt: impl FnMut() -> std::result::Result<T, DbError>,
    ) -> std::result::Result<T, Exhausted> {
        let started = Instant::now();
        let mut retries = 0;
        loop {
            match attempt() {
                Ok(value) => {
                    self.listeners
                        .operation_complete(operation, true, started.elapsed());
                    return Ok(value);
                }
                Err(error) if retries < self.max_retries => {
                    retries += 1;
                    log::warn!(
                        "{} failed, retrying ({}/{}): {}",
                        operation,
                        retries,
                        self.max_retries,
                        error
                    );
                }
                Err(error) => {
                    self.listeners
                        .operation_complete(operation, false, started.elapsed());
                    log::error!("{} failed after {} attempts: {}", operation, retries + 1, error);
                    return Err(Exhausted {
                        attempts: retries + 1,
                        source: error,
                    });
                }
            }
        }
    }

    /// One transactional unit of work: fresh connection, `BEGIN`, the body,
    /// then `COMMIT` — or `ROLLBACK` on any failure. The connection is
    /// dropped on every exit path.
    fn write_unit<T>(
        &self,
        body: impl FnOnce(&mut dyn Connection) -> std::result::Result<T, DbError>,
    ) -> std::result::Result<T, DbError> {
        let mut connection = self.driver.connect()?;
        connection.begin()?;
        match body(&mut *connection) {
            Ok(value) => {
                connection.commit()?;
                Ok(value)
            }
            Err(error) => {
                let _ = connection.rollback();
                Err(error)
            }
        }
    }

    pub(crate) fn persistence_error(&self, operation: &str, exhausted: Exhausted) -> Error {
        Error::Persistence {
            operation: operation.to_string(),
            attempts: exhausted.attempts,
            source: exhausted.source,
        }
    }
}

fn custom_upserts<E: Entity>(
    meta: &crate::ClassMeta<E>,
) -> Vec<(String, &ColumnMeta<E>)> {
    meta.custom_columns()
        .filter_map(|column| {
            column
                .custom
                .as_ref()
                .map(|binding| (binding.upsert_sql(), column))
        })
        .collect()
}
