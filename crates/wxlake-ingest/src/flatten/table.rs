//! Discovered relational tables

use serde_json::Value;
use std::collections::BTreeSet;
use wxlake_common::{Record, Result, WxError};

/// A column: the sequence of keys leading to a leaf value
pub type ColumnPath = Vec<String>;

/// Joins key paths into column names and child table names
pub const PATH_SEPARATOR: &str = "__";

/// Column linking a child row to its parent row identifier
pub const PARENT_ID: &str = "parent_id";

/// Storage type of a column. Every leaf is stored as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
}

/// A resolved `(name, type)` pair for one column path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub path: ColumnPath,
    pub column_type: ColumnType,
}

/// A table discovered while flattening: a name, a sorted set of column paths
/// and the raw rows collected for it.
///
/// Columns are only ever added. Row order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DictTable {
    name: String,
    columns: BTreeSet<ColumnPath>,
    rows: Vec<Record>,
}

impl DictTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: BTreeSet::new(), rows: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column paths in lexicographic order
    pub fn columns(&self) -> impl Iterator<Item = &ColumnPath> {
        self.columns.iter()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, path: &[&str]) -> bool {
        self.columns.iter().any(|c| c.iter().map(String::as_str).eq(path.iter().copied()))
    }

    pub fn update_columns(&mut self, columns: impl IntoIterator<Item = ColumnPath>) {
        self.columns.extend(columns);
    }

    pub fn push_row(&mut self, row: Record) {
        self.rows.push(row);
    }

    /// Union the columns of `other` and append its rows
    pub fn merge(&mut self, other: DictTable) -> Result<()> {
        if other.name != self.name {
            return Err(WxError::flatten(format!(
                "Cannot merge table '{}' into '{}'",
                other.name, self.name
            )));
        }
        self.columns.extend(other.columns);
        self.rows.extend(other.rows);
        Ok(())
    }

    pub fn column_definitions(&self) -> Vec<ColumnDefinition> {
        self.columns
            .iter()
            .map(|path| ColumnDefinition {
                name: column_name(path),
                path: path.clone(),
                column_type: ColumnType::Text,
            })
            .collect()
    }

    /// Render every row against the column set; absent values are `None`
    pub fn render_rows(&self) -> Result<Vec<Vec<Option<String>>>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|path| match access_nested_key(row, path) {
                        Some(value) => render_value(value).map_err(|kind| {
                            WxError::flatten(format!(
                                "Column '{}' of table '{}' holds {} that was not flattened",
                                column_name(path),
                                self.name,
                                kind
                            ))
                        }),
                        None => Ok(None),
                    })
                    .collect()
            })
            .collect()
    }
}

impl std::fmt::Display for DictTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Table {} ({} rows)", self.name, self.rows.len())?;
        for path in &self.columns {
            writeln!(f, "- {}", column_name(path))?;
        }
        Ok(())
    }
}

pub fn column_name(path: &[String]) -> String {
    path.join(PATH_SEPARATOR)
}

/// Follow `path` through nested objects; `None` when any step is missing
pub fn access_nested_key<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut value = record.get(first)?;
    for key in rest {
        value = value.as_object()?.get(key)?;
    }
    Some(value)
}

/// Text form of a leaf. Mappings are refused; the error names what was found.
fn render_value(value: &Value) -> std::result::Result<Option<String>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) => Ok(Some(value.to_string())),
        Value::Object(_) => Err("a mapping"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn path(keys: &[&str]) -> ColumnPath {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_columns_sorted_and_unique() {
        let mut table = DictTable::new("t");
        table.update_columns([path(&["b"]), path(&["a", "z"]), path(&["a"]), path(&["b"])]);

        let names: Vec<String> = table.column_definitions().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "a__z", "b"]);
    }

    #[test]
    fn test_merge_unions_columns_and_appends_rows() {
        let mut left = DictTable::new("t");
        left.update_columns([path(&["x"])]);
        left.push_row(row(json!({"x": 1})));

        let mut right = DictTable::new("t");
        right.update_columns([path(&["y"])]);
        right.push_row(row(json!({"y": "two"})));

        left.merge(right).unwrap();

        assert_eq!(left.num_columns(), 2);
        assert_eq!(left.num_rows(), 2);
        assert_eq!(
            left.render_rows().unwrap(),
            vec![vec![Some("1".to_string()), None], vec![None, Some("two".to_string())]]
        );

        assert!(left.merge(DictTable::new("other")).is_err());
    }

    #[test]
    fn test_render_values_as_text() {
        let mut table = DictTable::new("t");
        table.update_columns([path(&["flag"]), path(&["n"]), path(&["none"]), path(&["pairs"])]);
        table.push_row(row(json!({"flag": true, "n": 2.5, "none": null, "pairs": [[1, 2]]})));

        assert_eq!(
            table.render_rows().unwrap(),
            vec![vec![
                Some("true".to_string()),
                Some("2.5".to_string()),
                None,
                Some("[[1,2]]".to_string())
            ]]
        );
    }

    #[test]
    fn test_unflattened_mapping_is_an_error() {
        let mut table = DictTable::new("t");
        table.update_columns([path(&["b"])]);
        table.push_row(row(json!({"b": 1})));
        table.push_row(row(json!({"b": {"c": 2}})));

        let err = table.render_rows().unwrap_err();
        assert!(matches!(err, WxError::Flatten(_)));
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_access_nested_key() {
        let record = row(json!({"a": {"b": {"c": 3}}, "s": 1}));
        assert_eq!(access_nested_key(&record, &path(&["a", "b", "c"])), Some(&json!(3)));
        assert_eq!(access_nested_key(&record, &path(&["a", "x"])), None);
        assert_eq!(access_nested_key(&record, &path(&["s", "deeper"])), None);
        assert_eq!(access_nested_key(&record, &[]), None);
    }
}
