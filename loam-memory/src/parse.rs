use loam_core::DbError;

/// One statement in the grammar the engine emits: filtered selects with
/// equality conjunctions, `COUNT(*)`, inserts with an optional
/// `ON CONFLICT` upsert clause, keyed updates and the last-identity probe.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Select {
        projection: Projection,
        table: String,
        filters: Vec<Filter>,
    },
    LastInsertId,
    Insert {
        table: String,
        columns: Vec<String>,
        parameters: Vec<String>,
        on_conflict: Option<Conflict>,
    },
    Update {
        table: String,
        assignments: Vec<Filter>,
        filters: Vec<Filter>,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Projection {
    Count,
    Columns(Vec<String>),
}

/// `column = @parameter`, used both as filter and as assignment.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Filter {
    pub column: String,
    pub parameter: String,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Conflict {
    pub keys: Vec<String>,
    pub column: String,
    pub parameter: String,
}

pub(crate) fn parse(sql: &str) -> Result<Command, DbError> {
    let text = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(rest) = strip_ci(&text, "SELECT ") {
        parse_select(rest)
    } else if let Some(rest) = strip_ci(&text, "INSERT INTO ") {
        parse_insert(rest)
    } else if let Some(rest) = strip_ci(&text, "UPDATE ") {
        parse_update(rest)
    } else {
        Err(unsupported(&text))
    }
}

fn parse_select(rest: &str) -> Result<Command, DbError> {
    let Some((projection, tail)) = split_ci(rest, " FROM ") else {
        if rest.eq_ignore_ascii_case("last_insert_rowid()") {
            return Ok(Command::LastInsertId);
        }
        return Err(unsupported(rest));
    };
    let projection = if projection.eq_ignore_ascii_case("COUNT(*)") {
        Projection::Count
    } else {
        Projection::Columns(split_list(projection))
    };
    let (table, filters) = parse_table_and_filters(tail)?;
    Ok(Command::Select {
        projection,
        table,
        filters,
    })
}

fn parse_insert(rest: &str) -> Result<Command, DbError> {
    let table = rest.split(' ').next().unwrap_or_default().to_string();
    let (columns, rest) = parenthesized(rest)?;
    let rest = strip_ci(rest.trim_start(), "VALUES").ok_or_else(|| unsupported(rest))?;
    let (values, rest) = parenthesized(rest)?;
    let parameters = values.iter().map(|v| placeholder(v)).collect::<Result<_, _>>()?;
    let rest = rest.trim();
    let on_conflict = if rest.is_empty() {
        None
    } else {
        let tail = strip_ci(rest, "ON CONFLICT").ok_or_else(|| unsupported(rest))?;
        let (keys, tail) = parenthesized(tail)?;
        let tail = strip_ci(tail.trim_start(), "DO UPDATE SET ").ok_or_else(|| unsupported(tail))?;
        let assignment = parse_assignment(tail.trim())?;
        Some(Conflict {
            keys,
            column: assignment.column,
            parameter: assignment.parameter,
        })
    };
    Ok(Command::Insert {
        table,
        columns,
        parameters,
        on_conflict,
    })
}

fn parse_update(rest: &str) -> Result<Command, DbError> {
    let (table, tail) = split_ci(rest, " SET ").ok_or_else(|| unsupported(rest))?;
    let (assignments, filters) = match split_ci(tail, " WHERE ") {
        Some((assignments, filters)) => (assignments, parse_filters(filters)?),
        None => (tail, Vec::new()),
    };
    let assignments = split_list(assignments)
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<Result<_, _>>()?;
    Ok(Command::Update {
        table: table.to_string(),
        assignments,
        filters,
    })
}

fn parse_table_and_filters(tail: &str) -> Result<(String, Vec<Filter>), DbError> {
    match split_ci(tail, " WHERE ") {
        Some((table, filters)) => Ok((table.trim().to_string(), parse_filters(filters)?)),
        None => Ok((tail.trim().to_string(), Vec::new())),
    }
}

fn parse_filters(text: &str) -> Result<Vec<Filter>, DbError> {
    let mut filters = Vec::new();
    let mut rest = text;
    loop {
        match split_ci(rest, " AND ") {
            Some((head, tail)) => {
                filters.push(parse_assignment(head)?);
                rest = tail;
            }
            None => {
                filters.push(parse_assignment(rest)?);
                return Ok(filters);
            }
        }
    }
}

/// `column = @parameter`
fn parse_assignment(text: &str) -> Result<Filter, DbError> {
    let (column, parameter) = split_ci(text, " = ").ok_or_else(|| unsupported(text))?;
    Ok(Filter {
        column: column.trim().to_string(),
        parameter: placeholder(parameter.trim())?,
    })
}

fn placeholder(text: &str) -> Result<String, DbError> {
    text.strip_prefix('@')
        .map(str::to_string)
        .ok_or_else(|| DbError::new(format!("expected a named placeholder, got `{}`", text)))
}

/// Content of the first parenthesized list, split on commas, plus the text
/// after the closing parenthesis.
fn parenthesized(text: &str) -> Result<(Vec<String>, &str), DbError> {
    let open = text.find('(').ok_or_else(|| unsupported(text))?;
    let close = text[open..]
        .find(')')
        .map(|i| open + i)
        .ok_or_else(|| unsupported(text))?;
    Ok((split_list(&text[open + 1..close]), &text[close + 1..]))
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn strip_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len() && text[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn split_ci<'a>(text: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    let upper = text.to_ascii_uppercase();
    let position = upper.find(&separator.to_ascii_uppercase())?;
    Some((&text[..position], &text[position + separator.len()..]))
}

fn unsupported(text: &str) -> DbError {
    DbError::new(format!("unsupported statement: {}", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_with_filters() {
        let command = parse("SELECT Id, Name\nFROM Customers\nWHERE Status = @Status AND Region = @Region").unwrap();
        assert_eq!(
            command,
            Command::Select {
                projection: Projection::Columns(vec!["Id".into(), "Name".into()]),
                table: "Customers".into(),
                filters: vec![
                    Filter {
                        column: "Status".into(),
                        parameter: "Status".into()
                    },
                    Filter {
                        column: "Region".into(),
                        parameter: "Region".into()
                    },
                ],
            }
        );
    }

    #[test]
    fn count_star() {
        let command = parse("SELECT COUNT(*)\nFROM Customers").unwrap();
        assert_eq!(
            command,
            Command::Select {
                projection: Projection::Count,
                table: "Customers".into(),
                filters: vec![],
            }
        );
    }

    #[test]
    fn last_insert_id() {
        assert_eq!(parse("SELECT last_insert_rowid()").unwrap(), Command::LastInsertId);
    }

    #[test]
    fn insert_with_upsert_clause() {
        let command = parse(
            "INSERT INTO Extras (CustomerId, CustomFieldId, CustomFieldValue)\n\
             VALUES (@identifier, @customFieldId, @fieldValue)\n\
             ON CONFLICT (CustomerId, CustomFieldId) DO UPDATE SET CustomFieldValue = @fieldValue",
        )
        .unwrap();
        assert_eq!(
            command,
            Command::Insert {
                table: "Extras".into(),
                columns: vec![
                    "CustomerId".into(),
                    "CustomFieldId".into(),
                    "CustomFieldValue".into()
                ],
                parameters: vec![
                    "identifier".into(),
                    "customFieldId".into(),
                    "fieldValue".into()
                ],
                on_conflict: Some(Conflict {
                    keys: vec!["CustomerId".into(), "CustomFieldId".into()],
                    column: "CustomFieldValue".into(),
                    parameter: "fieldValue".into(),
                }),
            }
        );
    }

    #[test]
    fn update_by_identifier() {
        let command = parse("UPDATE Customers\nSET Name = @Name, Email = @Email\nWHERE Id = @identifier").unwrap();
        assert_eq!(
            command,
            Command::Update {
                table: "Customers".into(),
                assignments: vec![
                    Filter {
                        column: "Name".into(),
                        parameter: "Name".into()
                    },
                    Filter {
                        column: "Email".into(),
                        parameter: "Email".into()
                    },
                ],
                filters: vec![Filter {
                    column: "Id".into(),
                    parameter: "identifier".into()
                }],
            }
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse("DROP TABLE Customers").is_err());
        assert!(parse("SELECT Name FROM t WHERE Name = 'literal'").is_err());
    }
}
