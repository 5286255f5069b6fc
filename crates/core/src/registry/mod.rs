//! Registry file model: column schema, records, and the resilient parser.

pub mod ledger;
pub mod parser;
pub mod record;
pub mod schema;

pub use ledger::ErrorLedger;
pub use parser::{ParsedRows, RecordParser, RowOutcome};
pub use record::Record;
pub use schema::{COLUMN_COUNT, ColumnSchema};
