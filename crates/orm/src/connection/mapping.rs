//! Row materialization
//!
//! Three modes: `Assoc` (column-name keyed map), `Num` (positional values),
//! and `Model` (values bucketed into per-alias sub-maps so one joined SELECT
//! hydrates several entities per row). A column named `Alias__field` is a
//! virtual field belonging to alias `Alias`.
//!
//! `map_numeric_results` buckets from the original field list
//! (`Alias.column` / `expr AS Alias__column`) instead of driver column
//! metadata - PostgreSQL does not reliably report join-table provenance, so
//! provenance comes from the statement we built ourselves.

use serde_json::{Map, Value};

use crate::datasource::Row;

use super::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMode {
    Assoc,
    Num,
    Model,
}

/// One row bucketed per alias, alias order following first appearance in
/// the field list.
pub type BucketedRow = Vec<(String, Map<String, Value>)>;

impl Connection {
    /// Materialize one row in the requested mode.
    pub fn materialize(row: &Row, mode: RowMode, default_alias: &str) -> Value {
        match mode {
            RowMode::Assoc => Value::Object(Self::map_row_assoc(row)),
            RowMode::Num => Value::Array(row.values.clone()),
            RowMode::Model => {
                let mut out = Map::new();
                for (alias, bucket) in Self::map_model_row(row, default_alias) {
                    out.insert(alias, Value::Object(bucket));
                }
                Value::Object(out)
            }
        }
    }

    /// Column-name keyed map. Later duplicate columns overwrite earlier
    /// ones, like a driver's assoc fetch.
    pub fn map_row_assoc(row: &Row) -> Map<String, Value> {
        let mut map = Map::new();
        for (column, value) in row.columns.iter().zip(&row.values) {
            map.insert(column.clone(), value.clone());
        }
        map
    }

    /// Bucket a row per alias using the driver's column names. Virtual
    /// `Alias__field` columns move into their alias bucket; everything else
    /// lands under `default_alias`.
    pub fn map_model_row(row: &Row, default_alias: &str) -> BucketedRow {
        let mut buckets = BucketedRow::new();
        for (column, value) in row.columns.iter().zip(&row.values) {
            let (alias, field) = match column.split_once("__") {
                Some((alias, field)) if !alias.is_empty() && !field.is_empty() => {
                    (alias.to_string(), field.to_string())
                }
                _ => (default_alias.to_string(), column.clone()),
            };
            bucket_insert(&mut buckets, alias, field, value.clone());
        }
        buckets
    }

    /// Bucket numeric rows using the original field list for provenance.
    ///
    /// Field list entries are matched positionally to row values:
    /// `Alias.column` buckets under `Alias`; `expr AS Alias__column` is a
    /// virtual field of `Alias`; `expr AS column` and bare `column` fall
    /// back to `default_alias`.
    pub fn map_numeric_results(
        rows: &[Row],
        fields: &[String],
        default_alias: &str,
    ) -> Vec<BucketedRow> {
        let provenance: Vec<(String, String)> = fields
            .iter()
            .map(|field| field_provenance(field, default_alias))
            .collect();

        rows.iter()
            .map(|row| {
                let mut buckets = BucketedRow::new();
                for (index, value) in row.values.iter().enumerate() {
                    let (alias, field) = match provenance.get(index) {
                        Some((alias, field)) => (alias.clone(), field.clone()),
                        None => (
                            default_alias.to_string(),
                            row.columns
                                .get(index)
                                .cloned()
                                .unwrap_or_else(|| index.to_string()),
                        ),
                    };
                    bucket_insert(&mut buckets, alias, field, value.clone());
                }
                buckets
            })
            .collect()
    }
}

fn bucket_insert(buckets: &mut BucketedRow, alias: String, field: String, value: Value) {
    if let Some((_, bucket)) = buckets.iter_mut().find(|(a, _)| *a == alias) {
        bucket.insert(field, value);
    } else {
        let mut bucket = Map::new();
        bucket.insert(field, value);
        buckets.push((alias, bucket));
    }
}

fn field_provenance(field: &str, default_alias: &str) -> (String, String) {
    let target = match field
        .find(" AS ")
        .or_else(|| field.find(" as "))
    {
        Some(pos) => field[pos + 4..].trim(),
        None => field,
    };
    if let Some((alias, name)) = target.split_once("__") {
        if !alias.is_empty() && !name.is_empty() {
            return (alias.to_string(), name.to_string());
        }
    }
    if let Some((alias, name)) = target.split_once('.') {
        return (alias.to_string(), name.to_string());
    }
    (default_alias.to_string(), target.to_string())
}
