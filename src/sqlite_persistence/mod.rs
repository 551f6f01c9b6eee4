//! Declarative SQLite schema handling shared by the on-disk stores.

mod connection;
mod versioned_schema;

pub use connection::{configure_connection, BUSY_TIMEOUT};
pub use versioned_schema::{
    ensure_schema, read_schema_version, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table,
    VersionedSchema, SCHEMA_VERSION_TABLE,
};
