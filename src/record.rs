//! # Record Collections
//!
//! Row-oriented view over tabular data: each [`Record`] is one row, kept as an
//! ordered map of JSON values plus its position in the source table.
//! [`spin_frame`] runs a whole table through [`Dispatcher::batch`] and converts
//! the processed records back to rows.

use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::TurntableError;
use crate::execution::task::{failure_count, TaskResult};
use crate::execution::Dispatcher;

/// One row of a table, as a plain JSON object
pub type Row = Map<String, Value>;

/// Field name holding a record's position in the source table
pub const ORIGINAL_INDEX_FIELD: &str = "index_original";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record {index} has no field '{name}'")]
    MissingField { index: usize, name: String },

    #[error("Field '{name}' of record {index} has an unexpected type: {source}")]
    FieldType {
        index: usize,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    index: usize,
    fields: Row,
}

impl Record {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            fields: Row::new(),
        }
    }

    pub fn from_row(index: usize, row: Row) -> Self {
        Self { index, fields: row }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Set a field, replacing any previous value
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> &mut Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Set a field from any serializable value
    pub fn set_serialized<V: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &V,
    ) -> Result<&mut Self, RecordError> {
        let value = serde_json::to_value(value).map_err(|source| RecordError::FieldType {
            index: self.index,
            name: name.to_string(),
            source,
        })?;
        self.fields.insert(name.to_string(), value);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Typed read of a field
    pub fn get_as<V: DeserializeOwned>(&self, name: &str) -> Result<V, RecordError> {
        let value = self.fields.get(name).ok_or_else(|| RecordError::MissingField {
            index: self.index,
            name: name.to_string(),
        })?;
        V::deserialize(value).map_err(|source| RecordError::FieldType {
            index: self.index,
            name: name.to_string(),
            source,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Add every `(name, value)` pair, later pairs win
    pub fn load<I, K>(&mut self, extras: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in extras {
            self.fields.insert(name.into(), value);
        }
        self
    }

    pub fn fields(&self) -> &Row {
        &self.fields
    }

    pub fn into_row(self) -> Row {
        self.fields
    }
}

/// One record per row, each carrying its row position under
/// [`ORIGINAL_INDEX_FIELD`] plus every entry of `extras`.
pub fn build_collection(rows: Vec<Row>, extras: &Row) -> Vec<Record> {
    info!(rows = rows.len(), "Generating the record collection");

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let mut record = Record::from_row(index, row);
            record.set(ORIGINAL_INDEX_FIELD, index);
            record.load(extras.clone());
            record
        })
        .collect()
}

/// Rows back from records, ordered by record index
pub fn collection_to_rows(mut collection: Vec<Record>) -> Vec<Row> {
    collection.sort_by_key(Record::index);
    collection.into_iter().map(Record::into_row).collect()
}

/// Build a collection from `rows`, process it in batches and return the
/// processed rows. Rows whose processing failed are left out.
pub fn spin_frame<E, F>(dispatcher: &Dispatcher, rows: Vec<Row>, f: F) -> Result<Vec<Row>, TurntableError>
where
    E: Display + 'static,
    F: Fn(Record) -> Result<Record, E> + Send + Sync + 'static,
{
    let collection = build_collection(rows, &Row::new());
    let results = dispatcher.batch(collection, f)?;

    let failed = failure_count(&results);
    if failed > 0 {
        warn!(failed, total = results.len(), "Rows dropped after failed processing");
    }

    Ok(collection_to_rows(
        results.into_iter().filter_map(TaskResult::ok).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn albums() -> Vec<Row> {
        [
            ("Michael Jackson", "Thriller"),
            ("Pink Floyd", "The Dark Side of the Moon"),
            ("AC/DC", "Back in Black"),
        ]
        .into_iter()
        .map(|(artist, album)| {
            let mut row = Row::new();
            row.insert("Artist".into(), json!(artist));
            row.insert("Album".into(), json!(album));
            row
        })
        .collect()
    }

    #[test]
    fn test_build_collection_adds_index_and_extras() {
        let mut extras = Row::new();
        extras.insert("favorite".into(), json!("nevermind"));

        let collection = build_collection(albums(), &extras);
        assert_eq!(collection.len(), 3);
        assert_eq!(collection[1].index(), 1);
        assert_eq!(collection[1].get_as::<usize>(ORIGINAL_INDEX_FIELD).unwrap(), 1);
        assert_eq!(collection[2].get("favorite"), Some(&json!("nevermind")));
        assert_eq!(collection[0].get("Album"), Some(&json!("Thriller")));
    }

    #[test]
    fn test_typed_access_errors() {
        let mut record = Record::new(4);
        record.set("cost", 40).set("label", "cheap");

        assert_eq!(record.get_as::<u32>("cost").unwrap(), 40);
        assert!(matches!(
            record.get_as::<u32>("label"),
            Err(RecordError::FieldType { index: 4, .. })
        ));
        assert!(matches!(
            record.get_as::<u32>("missing"),
            Err(RecordError::MissingField { .. })
        ));
    }

    #[test]
    fn test_collection_round_trip_orders_by_index() {
        let mut collection = build_collection(albums(), &Row::new());
        collection.reverse();
        let rows = collection_to_rows(collection);
        assert_eq!(rows[0]["Artist"], json!("Michael Jackson"));
        assert_eq!(rows[2][ORIGINAL_INDEX_FIELD], json!(2));
    }

    #[test]
    fn test_spin_frame_drops_failed_rows() {
        let dispatcher = Dispatcher::new().processes(2).quiet(true);
        let rows = spin_frame(&dispatcher, albums(), |mut record: Record| {
            let artist: String = record.get_as("Artist").map_err(|e| e.to_string())?;
            if artist == "AC/DC" {
                return Err(format!("no price for {artist}"));
            }
            record.set("cost", 40);
            Ok(record)
        })
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row["cost"] == json!(40)));
        assert_eq!(rows[1]["Album"], json!("The Dark Side of the Moon"));
    }
}
