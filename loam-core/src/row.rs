use crate::Value;
use std::sync::Arc;

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone)]
pub struct RowLabeled {
    /// Column names.
    pub labels: RowNames,
    /// Data values (aligned by index with `labels`).
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
}

/// Named statement parameters, kept in insertion order. Filter composition
/// relies on the caller-supplied key order being preserved.
#[derive(Default, Debug, Clone)]
pub struct Parameters {
    entries: Vec<(String, Value)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value`, replacing an earlier binding of the same name
    /// in place. A leading `@` is stripped so callers may pass placeholder
    /// spellings verbatim.
    pub fn set(&mut self, name: impl AsRef<str>, value: Value) -> &mut Self {
        let name = name.as_ref().trim_start_matches('@');
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.trim_start_matches('@');
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, other: &Parameters) -> &mut Self {
        for (name, value) in other.iter() {
            self.set(name, value.clone());
        }
        self
    }
}

impl<'a> FromIterator<(&'a str, Value)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (&'a str, Value)>>(iter: I) -> Self {
        let mut parameters = Parameters::new();
        for (name, value) in iter {
            parameters.set(name, value);
        }
        parameters
    }
}
