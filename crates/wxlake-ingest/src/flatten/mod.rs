//! Flattening engine
//!
//! Nested JSON records become normalized tables: scalar leaves become
//! columns named by their key path joined with `__`, and each nested list
//! becomes a child table `<parent>__<field>` whose rows carry a `parent_id`
//! built from the parent row's identifier.
//!
//! ```text
//! {"a": 1, "b": {"c": 2}, "d": [{"e": 3}]}   (root "root", id path ["a"])
//!
//! root     : a, b__c
//! root__d  : e, parent_id = "1"
//! ```

pub mod extract;
pub mod flattener;
pub mod table;

pub use extract::{flatten_records, row_identifier, Extraction};
pub use flattener::{Flattener, MaterializedTable};
pub use table::{ColumnDefinition, ColumnPath, ColumnType, DictTable, PARENT_ID};
