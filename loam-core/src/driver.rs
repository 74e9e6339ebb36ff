use crate::{DbError, Parameters, RowLabeled, Value};

/// A backend able to hand out connections. The engine opens one connection
/// per logical unit of work and drops it on every exit path.
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;
    fn connect(&self) -> Result<Box<dyn Connection>, DbError>;
}

/// One open connection. Statement execution binds a named-parameter
/// dictionary to SQL text; transaction state is carried by the connection
/// itself, so statements run between `begin` and `commit` are associated
/// with that transaction.
///
/// Every failure is reported as [`DbError`] and treated as transient by the
/// engine. Cancellation and timeouts are this layer's concern; the engine
/// adds only its bounded retry count on top.
pub trait Connection: Send {
    /// Runs a statement and returns the number of affected rows.
    fn execute(&mut self, sql: &str, parameters: &Parameters) -> Result<u64, DbError>;

    /// Runs a query and returns the full result set.
    fn fetch(&mut self, sql: &str, parameters: &Parameters) -> Result<Vec<RowLabeled>, DbError>;

    /// Runs a query and returns the first row, if any.
    fn fetch_row(
        &mut self,
        sql: &str,
        parameters: &Parameters,
    ) -> Result<Option<RowLabeled>, DbError> {
        Ok(self.fetch(sql, parameters)?.into_iter().next())
    }

    /// Runs a query and returns the first value of the first row, if any.
    fn fetch_scalar(
        &mut self,
        sql: &str,
        parameters: &Parameters,
    ) -> Result<Option<Value>, DbError> {
        Ok(self
            .fetch_row(sql, parameters)?
            .and_then(|row| row.values.first().cloned()))
    }

    fn begin(&mut self) -> Result<(), DbError>;
    fn commit(&mut self) -> Result<(), DbError>;
    fn rollback(&mut self) -> Result<(), DbError>;
}
