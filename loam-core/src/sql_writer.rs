use crate::{separated_by, ClassMeta, Entity};
use std::fmt::Write;

/// Builds parameterized SQL text with named `@column` placeholders. Purely
/// textual: nothing here touches a connection.
#[derive(Default, Debug)]
pub struct QueryBuilder {
    sql: String,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self {
            sql: String::with_capacity(256),
        }
    }

    pub fn select<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.sql.push_str("SELECT ");
        separated_by(&mut self.sql, columns, |out, v| out.push_str(v), ", ");
        self
    }

    pub fn select_count(mut self) -> Self {
        self.sql.push_str("SELECT COUNT(*)");
        self
    }

    /// Projection of every table column of the entity, in declaration
    /// order.
    pub fn select_entity<E: Entity>(self, meta: &ClassMeta<E>) -> Self {
        self.select(meta.table_columns().filter_map(|c| c.column))
    }

    pub fn from(mut self, table: &str) -> Self {
        self.sql.push('\n');
        self.sql.push_str("FROM ");
        self.sql.push_str(table);
        self
    }

    /// Equality filter against the placeholder of the same name.
    pub fn where_eq(self, column: &str) -> Self {
        self.where_eq_param(column, column)
    }

    pub fn and_where_eq(self, column: &str) -> Self {
        self.and_where_eq_param(column, column)
    }

    pub fn where_eq_param(mut self, column: &str, parameter: &str) -> Self {
        let _ = write!(self.sql, "\nWHERE {} = @{}", column, parameter);
        self
    }

    pub fn and_where_eq_param(mut self, column: &str, parameter: &str) -> Self {
        let _ = write!(self.sql, " AND {} = @{}", column, parameter);
        self
    }

    /// Insert of every table column except the identifier, which the store
    /// assigns.
    pub fn insert<E: Entity>(mut self, meta: &ClassMeta<E>) -> Self {
        let _ = write!(self.sql, "INSERT INTO {} (", meta.table);
        let columns = || {
            meta.table_columns()
                .filter(|c| !c.is_identifier)
                .filter_map(|c| c.column)
        };
        separated_by(&mut self.sql, columns(), |out, v| out.push_str(v), ", ");
        self.sql.push_str(")\nVALUES (");
        separated_by(
            &mut self.sql,
            columns(),
            |out, v| {
                out.push('@');
                out.push_str(v);
            },
            ", ",
        );
        self.sql.push(')');
        self
    }

    /// Update of every table column except the identifier; the caller adds
    /// the identifier filter.
    pub fn update<E: Entity>(mut self, meta: &ClassMeta<E>) -> Self {
        let _ = write!(self.sql, "UPDATE {}\nSET ", meta.table);
        separated_by(
            &mut self.sql,
            meta.table_columns()
                .filter(|c| !c.is_identifier)
                .filter_map(|c| c.column),
            |out, v| {
                let _ = write!(out, "{} = @{}", v, v);
            },
            ", ",
        );
        self
    }

    /// The store's last-identity mechanism for numeric keys.
    pub fn last_insert_id(mut self) -> Self {
        self.sql.push_str("SELECT last_insert_rowid()");
        self
    }

    pub fn sql(self) -> String {
        self.sql
    }
}
