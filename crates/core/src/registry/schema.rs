//! Column schema loading.
//!
//! The schema file is a single comma-separated line naming the columns of the
//! raw dataset, in file order.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::Error;

/// Number of columns in the published registry file.
pub const COLUMN_COUNT: usize = 19;

/// Identifier column.
pub const CODE_COLUMN: &str = "RegistroCA";

/// Status column compared against [`VALID_STATUS`].
pub const STATUS_COLUMN: &str = "Situacao";

pub const VALID_STATUS: &str = "VÁLIDO";

/// Ordered, immutable list of column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    names: Arc<[String]>,
}

impl ColumnSchema {
    /// Build a schema from names, enforcing the column count and uniqueness.
    pub fn new<I, S>(names: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.len() != COLUMN_COUNT {
            return Err(Error::Schema(format!(
                "expected {} columns, found {}",
                COLUMN_COUNT,
                names.len()
            )));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.is_empty() {
                return Err(Error::Schema("column names must not be empty".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::Schema(format!("duplicate column name: {name}")));
            }
        }

        Ok(Self { names: names.into() })
    }

    /// Parse the first non-empty line of a schema file's contents.
    pub fn parse(contents: &str) -> Result<Self, Error> {
        let line = contents
            .lines()
            .map(|l| l.trim_start_matches('\u{feff}').trim())
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::Schema("column schema file is empty".into()))?;

        Self::new(line.split(',').map(str::trim))
    }

    /// Read and parse the schema file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Schema(format!("column schema file not found: {}", path.display()))
            } else {
                Error::Schema(format!("failed to read {}: {}", path.display(), e))
            }
        })?;

        let schema = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), "loaded column schema");
        Ok(schema)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.names.iter().position(|n| n == column)
    }
}
