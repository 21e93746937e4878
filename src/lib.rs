pub mod app;
pub mod domain;
pub mod error;
pub mod infra;
pub mod storage;

// Convenience re-exports (keeps call-sites clean)
pub use app::{ChangeKey, ChangeLog, ClassRef, Registry};
pub use domain::model::{
    Entity, EntityBase, FieldDescriptor, FieldKind, FieldSet, OptionDefault, OptionType,
    OptionValue, Persistable, Setting, StorageType, StorageValue, Value, WriteOptions,
};
pub use error::{MetaError, MetaResult};
pub use infra::StoreConfig;
pub use storage::{
    EntityCursor, OrderBy, Query, Record, SchemaChanges, StorageHandle, Table, TableHandle,
};
