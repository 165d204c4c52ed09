//! Record extraction
//!
//! [`flatten_records`] turns a list of nested records into a root table plus
//! one child table per nested list field. The walk itself is a pure function
//! returning the columns and child tables it discovered for one record.

use super::table::{column_name, ColumnPath, DictTable, PARENT_ID, PATH_SEPARATOR};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use wxlake_common::{Record, Result};

/// Joins the values of the id paths into a row identifier
pub const ROW_ID_SEPARATOR: &str = ":";

/// What one walk discovered: leaf columns of the current table and child tables
#[derive(Debug, Default)]
pub struct Extraction {
    pub columns: BTreeSet<ColumnPath>,
    pub children: BTreeMap<String, DictTable>,
}

impl Extraction {
    fn absorb(&mut self, other: Extraction) -> Result<()> {
        self.columns.extend(other.columns);
        for table in other.children.into_values() {
            add_table(&mut self.children, table)?;
        }
        Ok(())
    }
}

/// Merge `table` into `tables`, keyed by table name
pub fn add_table(tables: &mut BTreeMap<String, DictTable>, table: DictTable) -> Result<()> {
    match tables.get_mut(table.name()) {
        Some(existing) => existing.merge(table),
        None => {
            tables.insert(table.name().to_string(), table);
            Ok(())
        }
    }
}

/// Concatenate the text form of every id path present in `record`.
/// `None` when no id path resolves.
pub fn row_identifier(record: &Record, id_paths: &[ColumnPath]) -> Option<String> {
    let parts: Vec<String> = id_paths
        .iter()
        .filter_map(|path| super::table::access_nested_key(record, path))
        .filter(|value| !value.is_null())
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(ROW_ID_SEPARATOR))
    }
}

/// Flatten `records` under `root_name`.
///
/// Returns every discovered table keyed by name; the root table is present
/// even when `records` is empty. `row_ids` must hold one identifier per record.
pub fn flatten_records(
    root_name: &str,
    records: Vec<Record>,
    row_ids: Vec<String>,
    id_paths: &[ColumnPath],
) -> Result<BTreeMap<String, DictTable>> {
    let mut root = DictTable::new(root_name);
    let mut tables = BTreeMap::new();

    for (record, row_id) in records.into_iter().zip(row_ids) {
        let extraction = extract(&record, root_name, &row_id, id_paths)?;
        root.update_columns(extraction.columns);
        root.push_row(record);
        for child in extraction.children.into_values() {
            add_table(&mut tables, child)?;
        }
    }

    add_table(&mut tables, root)?;
    Ok(tables)
}

/// Walk one record belonging to `table_name` whose identifier is `row_id`
pub fn extract(
    record: &Record,
    table_name: &str,
    row_id: &str,
    id_paths: &[ColumnPath],
) -> Result<Extraction> {
    walk(record, &[], table_name, row_id, id_paths)
}

fn walk(
    map: &Record,
    prefix: &[String],
    table_name: &str,
    row_id: &str,
    id_paths: &[ColumnPath],
) -> Result<Extraction> {
    let mut extraction = Extraction::default();

    for (key, value) in map {
        let mut path = prefix.to_vec();
        path.push(key.clone());

        match value {
            Value::Object(inner) => {
                extraction.absorb(walk(inner, &path, table_name, row_id, id_paths)?)?;
            }
            Value::Array(items) if items.is_empty() => {}
            Value::Array(items) if items.iter().any(Value::is_array) => {
                extraction.columns.insert(path);
            }
            Value::Array(items) => {
                let child_name = format!("{}{}{}", table_name, PATH_SEPARATOR, column_name(&path));
                for child in child_tables(&child_name, items, row_id, id_paths)?.into_values() {
                    add_table(&mut extraction.children, child)?;
                }
            }
            _ => {
                extraction.columns.insert(path);
            }
        }
    }

    Ok(extraction)
}

/// Rows of a nested list, stamped with `parent_id`, plus their own descendants
fn child_tables(
    name: &str,
    items: &[Value],
    parent_id: &str,
    id_paths: &[ColumnPath],
) -> Result<BTreeMap<String, DictTable>> {
    let mut table = DictTable::new(name);
    let mut tables = BTreeMap::new();

    for (index, item) in items.iter().enumerate() {
        let mut row = match item {
            Value::Object(fields) => fields.clone(),
            scalar => {
                let mut row = Record::new();
                row.insert("value".to_string(), scalar.clone());
                row
            }
        };
        row.insert(PARENT_ID.to_string(), Value::String(parent_id.to_string()));

        // Scoped by the parent so equal ids under different parents stay distinct
        let child_id = match row_identifier(&row, id_paths) {
            Some(id) => format!("{}.{}", parent_id, id),
            None => format!("{}.{}", parent_id, index),
        };

        let extraction = extract(&row, name, &child_id, id_paths)?;
        table.update_columns(extraction.columns);
        table.push_row(row);
        for grandchild in extraction.children.into_values() {
            add_table(&mut tables, grandchild)?;
        }
    }

    add_table(&mut tables, table)?;
    Ok(tables)
}
