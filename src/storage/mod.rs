//! SQLite persistence: the connection handle, per-class tables and row records.

pub mod handle;
pub mod naming;
pub mod record;
pub mod table;

pub use handle::{RowMap, StorageHandle};
pub use record::Record;
pub use table::{EntityCursor, OrderBy, Query, SchemaChanges, Table, TableHandle};
