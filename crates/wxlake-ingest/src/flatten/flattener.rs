//! Flattening pass: raw batches in, one Parquet file per discovered table out

use super::extract::{add_table, flatten_records, row_identifier};
use super::table::{DictTable, PATH_SEPARATOR};
use crate::config::FlattenConfig;
use crate::destination::{normalize_sub_path, Destination};
use crate::materialize::Materializer;
use futures::TryStreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use wxlake_common::Result;

/// One table written by a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedTable {
    pub name: String,
    pub rows: usize,
    pub key: String,
}

pub struct Flattener {
    config: FlattenConfig,
    materializer: Materializer,
}

impl Flattener {
    pub fn new(config: FlattenConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { materializer: Materializer::from_config(&config), config })
    }

    /// Root table name for a raw sub-path
    pub fn root_table_name(&self, sub_path: &str) -> String {
        format!(
            "{}{}",
            self.config.table_prefix,
            normalize_sub_path(sub_path).replace('/', PATH_SEPARATOR)
        )
    }

    /// Read every batch under `sub_path` and merge the tables found in each file
    #[instrument(skip(self, source), fields(source = %source.name()))]
    pub async fn read_tables(
        &self,
        source: &dyn Destination,
        sub_path: &str,
    ) -> Result<BTreeMap<String, DictTable>> {
        let root_name = self.root_table_name(sub_path);
        let mut tables = BTreeMap::new();
        let mut files = 0usize;

        let mut batches = source.iterate_raw_records(sub_path).await?;
        while let Some((source_id, records)) = batches.try_next().await? {
            files += 1;
            for table in self.flatten_file(&root_name, &source_id, records)?.into_values() {
                add_table(&mut tables, table)?;
            }
        }

        if files == 0 {
            warn!(sub_path, "No raw batches found");
            add_table(&mut tables, DictTable::new(&root_name))?;
        }

        info!(sub_path, files, tables = tables.len(), "Discovered tables");
        Ok(tables)
    }

    /// Stamp each record with its source and flatten one file's records
    fn flatten_file(
        &self,
        root_name: &str,
        source_id: &str,
        mut records: Vec<wxlake_common::Record>,
    ) -> Result<BTreeMap<String, DictTable>> {
        let row_ids = records
            .iter_mut()
            .enumerate()
            .map(|(index, record)| {
                record.insert(self.config.source_key.clone(), Value::String(source_id.to_string()));
                row_identifier(record, &self.config.id_paths)
                    .unwrap_or_else(|| format!("{}.{}", source_id, index))
            })
            .collect();

        flatten_records(root_name, records, row_ids, &self.config.id_paths)
    }

    /// Flatten every configured sub-path of `source` into `target`
    pub async fn run(
        &self,
        source: &dyn Destination,
        target: &dyn Destination,
    ) -> Result<Vec<MaterializedTable>> {
        let mut written = Vec::new();

        for sub_path in &self.config.sub_paths {
            info!(sub_path = %sub_path, "Flattening");
            let tables = self.read_tables(source, sub_path).await?;

            for table in tables.values() {
                let key = self
                    .materializer
                    .materialize(table, target, &self.config.output_sub_path)
                    .await?;
                written.push(MaterializedTable {
                    name: table.name().to_string(),
                    rows: table.num_rows(),
                    key,
                });
            }
        }

        Ok(written)
    }
}
