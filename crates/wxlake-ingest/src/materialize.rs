//! Table materializer
//!
//! Converts a [`DictTable`] into an Arrow `RecordBatch` with one nullable
//! text column per discovered column path plus two provenance columns, and
//! hands it to a destination, which stores it as ZSTD-compressed Parquet.

use crate::config::FlattenConfig;
use crate::destination::Destination;
use crate::flatten::DictTable;
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, instrument};
use wxlake_common::{Result, Timestamp, WxError};

/// Stamps provenance onto tables and writes them out
#[derive(Debug, Clone)]
pub struct Materializer {
    run_id: String,
    run_id_column: String,
    modified_at_column: String,
}

impl Materializer {
    pub fn new(
        run_id: impl Into<String>,
        run_id_column: impl Into<String>,
        modified_at_column: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            run_id_column: run_id_column.into(),
            modified_at_column: modified_at_column.into(),
        }
    }

    pub fn from_config(config: &FlattenConfig) -> Self {
        Self::new(&config.run_id, &config.run_id_column, &config.modified_at_column)
    }

    /// Build the columnar form of `table`.
    ///
    /// A table without rows still carries its full schema.
    pub fn to_record_batch(&self, table: &DictTable, modified_at: Timestamp) -> Result<RecordBatch> {
        let definitions = table.column_definitions();
        let rows = table.render_rows()?;

        let mut fields = Vec::with_capacity(definitions.len() + 2);
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(definitions.len() + 2);
        let mut seen = HashSet::with_capacity(definitions.len());

        for (index, definition) in definitions.iter().enumerate() {
            // Distinct paths can join to the same name, e.g. ["a", "b"] and ["a__b"]
            if !seen.insert(definition.name.as_str()) {
                return Err(WxError::flatten(format!(
                    "Table '{}' has more than one column named '{}'",
                    table.name(),
                    definition.name
                )));
            }
            if definition.name == self.run_id_column || definition.name == self.modified_at_column {
                return Err(WxError::flatten(format!(
                    "Table '{}' already has a column named '{}'",
                    table.name(),
                    definition.name
                )));
            }
            let values: Vec<Option<&str>> = rows.iter().map(|row| row[index].as_deref()).collect();
            fields.push(Field::new(&definition.name, DataType::Utf8, true));
            arrays.push(Arc::new(StringArray::from(values)));
        }

        let modified_at = modified_at.to_string();
        fields.push(Field::new(&self.run_id_column, DataType::Utf8, false));
        arrays.push(Arc::new(StringArray::from(vec![self.run_id.as_str(); rows.len()])));
        fields.push(Field::new(&self.modified_at_column, DataType::Utf8, false));
        arrays.push(Arc::new(StringArray::from(vec![modified_at.as_str(); rows.len()])));

        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| WxError::columnar(format!("Table '{}': {}", table.name(), e)))
    }

    /// Write `table` to `target` as `<sub_path>/<table name>.parquet`
    #[instrument(skip(self, table, target), fields(table = %table.name(), destination = %target.name()))]
    pub async fn materialize(
        &self,
        table: &DictTable,
        target: &dyn Destination,
        sub_path: &str,
    ) -> Result<String> {
        let batch = self.to_record_batch(table, Timestamp::now())?;
        let key = target.materialize_table(sub_path, table.name(), &batch).await?;

        info!(rows = batch.num_rows(), columns = batch.num_columns(), key = %key, "Table written");
        Ok(key)
    }
}

/// Encode `batch` as a single-row-group ZSTD Parquet file
pub fn write_parquet<W: Write + Send>(writer: W, batch: &RecordBatch) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();

    let mut writer = ArrowWriter::try_new(writer, batch.schema(), Some(props))
        .map_err(|e| WxError::columnar(format!("Failed to create Parquet writer: {}", e)))?;
    writer
        .write(batch)
        .map_err(|e| WxError::columnar(format!("Failed to write record batch: {}", e)))?;
    writer
        .close()
        .map_err(|e| WxError::columnar(format!("Failed to finish Parquet file: {}", e)))?;

    Ok(())
}
