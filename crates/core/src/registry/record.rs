//! A single registry row bound to its column schema.

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::schema::{CODE_COLUMN, ColumnSchema, STATUS_COLUMN, VALID_STATUS};

/// One row of the registry: column name to nullable value, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    schema: ColumnSchema,
    values: Vec<Option<String>>,
}

impl Record {
    /// Bind `values` to `schema`, padding with nulls up to the schema length.
    ///
    /// Callers must not pass more values than the schema has columns; the
    /// parser routes such rows to the error ledger instead.
    pub fn new(schema: ColumnSchema, mut values: Vec<Option<String>>) -> Self {
        debug_assert!(values.len() <= schema.len());
        values.resize(schema.len(), None);
        Self { schema, values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.schema
            .position(column)
            .and_then(|i| self.values[i].as_deref())
    }

    /// Certificate identifier (`RegistroCA`).
    pub fn code(&self) -> Option<&str> {
        self.get(CODE_COLUMN)
    }

    pub fn status(&self) -> Option<&str> {
        self.get(STATUS_COLUMN)
    }

    pub fn is_valid(&self) -> bool {
        self.status() == Some(VALID_STATUS)
    }

    pub fn column_names(&self) -> &[String] {
        self.schema.names()
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// `(column, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_deref))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}
