use crate::parse::{Command, Filter, Projection};
use loam_core::{DbError, Parameters, RowLabeled, RowNames, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The whole database: named tables plus the last identity the store
/// assigned. Cloneable so a transaction can snapshot it.
#[derive(Default, Debug, Clone)]
pub(crate) struct Store {
    tables: HashMap<String, Table>,
    last_insert_id: i64,
}

#[derive(Default, Debug, Clone)]
pub(crate) struct Table {
    /// Auto-assigned key column, when registered via `define_table`.
    identity_column: Option<String>,
    next_id: i64,
    rows: Vec<HashMap<String, Value>>,
}

impl Store {
    pub(crate) fn define_table(&mut self, name: &str, identity_column: &str) {
        let table = self.tables.entry(name.to_string()).or_default();
        table.identity_column = Some(identity_column.to_string());
    }

    pub(crate) fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map(|t| t.rows.len()).unwrap_or(0)
    }

    pub(crate) fn column_values(&self, name: &str, column: &str) -> Vec<Value> {
        self.tables
            .get(name)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn execute(
        &mut self,
        command: &Command,
        parameters: &Parameters,
    ) -> Result<u64, DbError> {
        match command {
            Command::Insert {
                table,
                columns,
                parameters: names,
                on_conflict,
            } => {
                if columns.len() != names.len() {
                    return Err(DbError::new("insert column and value lists differ in length"));
                }
                let mut row = HashMap::new();
                for (column, name) in columns.iter().zip(names) {
                    row.insert(column.clone(), bound(parameters, name)?);
                }
                let mut assigned = None;
                {
                    let table = self.tables.entry(table.clone()).or_default();
                    if let Some(conflict) = on_conflict {
                        let existing = table.rows.iter_mut().find(|candidate| {
                            conflict.keys.iter().all(|key| {
                                values_equal(
                                    candidate.get(key).unwrap_or(&Value::Null),
                                    row.get(key).unwrap_or(&Value::Null),
                                )
                            })
                        });
                        if let Some(existing) = existing {
                            existing
                                .insert(conflict.column.clone(), bound(parameters, &conflict.parameter)?);
                            return Ok(1);
                        }
                    }
                    if let Some(identity) = table.identity_column.clone() {
                        if !row.contains_key(&identity) {
                            table.next_id += 1;
                            assigned = Some(table.next_id);
                            row.insert(identity, Value::Int64(Some(table.next_id)));
                        }
                    }
                    table.rows.push(row);
                }
                if let Some(id) = assigned {
                    self.last_insert_id = id;
                }
                Ok(1)
            }
            Command::Update {
                table,
                assignments,
                filters,
            } => {
                let mut updates = Vec::with_capacity(assignments.len());
                for assignment in assignments {
                    updates.push((
                        assignment.column.clone(),
                        bound(parameters, &assignment.parameter)?,
                    ));
                }
                let filters = resolve_filters(filters, parameters)?;
                let Some(table) = self.tables.get_mut(table) else {
                    return Ok(0);
                };
                let mut affected = 0;
                for row in table.rows.iter_mut().filter(|row| matches(row, &filters)) {
                    for (column, value) in &updates {
                        row.insert(column.clone(), value.clone());
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            _ => Err(DbError::new("not a modifying statement")),
        }
    }

    pub(crate) fn fetch(
        &self,
        command: &Command,
        parameters: &Parameters,
    ) -> Result<Vec<RowLabeled>, DbError> {
        match command {
            Command::LastInsertId => {
                let labels: RowNames = Arc::from(vec!["last_insert_rowid()".to_string()]);
                Ok(vec![RowLabeled::new(
                    labels,
                    vec![Value::Int64(Some(self.last_insert_id))].into_boxed_slice(),
                )])
            }
            Command::Select {
                projection,
                table,
                filters,
            } => {
                let filters = resolve_filters(filters, parameters)?;
                let rows = self
                    .tables
                    .get(table)
                    .map(|t| {
                        t.rows
                            .iter()
                            .filter(|row| matches(row, &filters))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                match projection {
                    Projection::Count => {
                        let labels: RowNames = Arc::from(vec!["COUNT(*)".to_string()]);
                        Ok(vec![RowLabeled::new(
                            labels,
                            vec![Value::Int64(Some(rows.len() as i64))].into_boxed_slice(),
                        )])
                    }
                    Projection::Columns(columns) => {
                        let labels: RowNames = Arc::from(columns.clone());
                        Ok(rows
                            .into_iter()
                            .map(|row| {
                                let values = columns
                                    .iter()
                                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                                    .collect::<Vec<_>>()
                                    .into_boxed_slice();
                                RowLabeled::new(labels.clone(), values)
                            })
                            .collect())
                    }
                }
            }
            _ => Err(DbError::new("not a query")),
        }
    }
}

fn bound(parameters: &Parameters, name: &str) -> Result<Value, DbError> {
    parameters
        .get(name)
        .cloned()
        .ok_or_else(|| DbError::new(format!("unbound parameter @{}", name)))
}

fn resolve_filters(
    filters: &[Filter],
    parameters: &Parameters,
) -> Result<Vec<(String, Value)>, DbError> {
    filters
        .iter()
        .map(|f| Ok((f.column.clone(), bound(parameters, &f.parameter)?)))
        .collect()
}

fn matches(row: &HashMap<String, Value>, filters: &[(String, Value)]) -> bool {
    filters
        .iter()
        .all(|(column, value)| values_equal(row.get(column).unwrap_or(&Value::Null), value))
}

/// Equality with integer widths collapsed, since the engine binds keys at
/// whatever width the entity declares.
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a.as_integer(), b.as_integer()) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}
