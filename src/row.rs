//! Typed rows returned from fetch operations.

use crate::value::Value;

/// A single result row: an ordered list of column-name/value pairs.
///
/// Column order follows the order returned by the driver; duplicate column
/// names (e.g. from a join) are preserved rather than collapsed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Row { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Looks a column up by name, returning the first match.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.columns.iter()
    }

    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.columns
    }
}

impl rusqlite::types::FromSql for Value {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        Ok(Value::from(value))
    }
}

pub(crate) fn row_from_statement(
    stmt: &rusqlite::Row<'_>,
    column_names: &[String],
) -> rusqlite::Result<Row> {
    let mut columns = Vec::with_capacity(column_names.len());
    for (idx, name) in column_names.iter().enumerate() {
        let value: Value = stmt.get(idx)?;
        columns.push((name.clone(), value));
    }
    Ok(Row::new(columns))
}
