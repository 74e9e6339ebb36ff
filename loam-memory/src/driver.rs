use crate::{connection::MemoryConnection, store::Store};
use loam_core::{Connection, DbError, Driver, Value};
use std::sync::{Arc, PoisonError, RwLock};

/// In-memory backend. All connections handed out by one driver share the
/// same table store, so a test can write through the engine and assert on
/// the rows directly.
#[derive(Default, Clone)]
pub struct MemoryDriver {
    store: Arc<RwLock<Store>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `identity_column` of `table` as store-assigned: inserts
    /// that do not provide it get the next identity, observable through
    /// `last_insert_rowid()`. Tables never defined still accept rows, they
    /// just assign nothing.
    pub fn define_table(&self, table: &str, identity_column: &str) {
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .define_table(table, identity_column);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .row_count(table)
    }

    /// All values of one column, in row insertion order.
    pub fn column_values(&self, table: &str, column: &str) -> Vec<Value> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .column_values(table, column)
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
            snapshot: None,
        }))
    }
}
