use crate::{parse::parse, store::Store};
use loam_core::{Connection, DbError, Parameters, RowLabeled};
use std::sync::{Arc, PoisonError, RwLock};

/// A connection into the shared store. `begin` snapshots the whole store;
/// `rollback` restores the snapshot and `commit` discards it. Good enough
/// for the single-writer workloads the driver exists for.
pub struct MemoryConnection {
    pub(crate) store: Arc<RwLock<Store>>,
    pub(crate) snapshot: Option<Store>,
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str, parameters: &Parameters) -> Result<u64, DbError> {
        log::trace!("executing: {}", sql);
        let command = parse(sql)?;
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .execute(&command, parameters)
    }

    fn fetch(&mut self, sql: &str, parameters: &Parameters) -> Result<Vec<RowLabeled>, DbError> {
        log::trace!("fetching: {}", sql);
        let command = parse(sql)?;
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fetch(&command, parameters)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        if self.snapshot.is_some() {
            return Err(DbError::new("a transaction is already open"));
        }
        self.snapshot = Some(
            self.store
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| DbError::new("no open transaction to commit"))
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| DbError::new("no open transaction to roll back"))?;
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        Ok(())
    }
}
