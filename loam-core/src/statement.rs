use crate::{Connection, DbError, Parameters, RowLabeled, Value};

/// Builder over an open connection pairing SQL text with its named
/// parameters before execution.
pub struct Statement<'c> {
    connection: &'c mut dyn Connection,
    sql: String,
    parameters: Parameters,
}

impl<'c> Statement<'c> {
    pub fn new(connection: &'c mut dyn Connection, sql: impl Into<String>) -> Self {
        Self {
            connection,
            sql: sql.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn bind(mut self, name: &str, value: Value) -> Self {
        self.parameters.set(name, value);
        self
    }

    pub fn bind_many(mut self, parameters: &Parameters) -> Self {
        self.parameters.merge(parameters);
        self
    }

    pub fn execute(self) -> Result<u64, DbError> {
        self.connection.execute(&self.sql, &self.parameters)
    }

    pub fn fetch(self) -> Result<Vec<RowLabeled>, DbError> {
        self.connection.fetch(&self.sql, &self.parameters)
    }

    pub fn fetch_row(self) -> Result<Option<RowLabeled>, DbError> {
        self.connection.fetch_row(&self.sql, &self.parameters)
    }

    pub fn fetch_scalar(self) -> Result<Option<Value>, DbError> {
        self.connection.fetch_scalar(&self.sql, &self.parameters)
    }
}
