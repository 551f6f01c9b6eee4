use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use tracing::info;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `is_primary_key = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    Cascade,
}

impl ForeignKeyOnChange {
    fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::NoAction => "NO ACTION",
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::SetNull => "SET NULL",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    /// Marking more than one column turns them into a composite key.
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
    pub foreign_key: Option<&'a ForeignKey>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    fn primary_key_columns(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name)
            .collect()
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        let primary_key = self.primary_key_columns();
        let inline_primary_key = primary_key.len() == 1;

        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!("{} {}", column.name, column.sql_type.as_sql()));
            if column.is_primary_key && inline_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
            if let Some(foreign_key) = column.foreign_key {
                create_sql.push_str(&format!(
                    " REFERENCES {}({}) ON DELETE {}",
                    foreign_key.foreign_table,
                    foreign_key.foreign_column,
                    foreign_key.on_delete.as_sql()
                ));
            }
        }
        if primary_key.len() > 1 {
            create_sql.push_str(&format!(", PRIMARY KEY ({})", primary_key.join(", ")));
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<Column<'_, String>> = stmt
            .query_map(params![], |row| {
                let sql_type = match row.get::<_, String>(2)?.as_str() {
                    "TEXT" => &SqlType::Text,
                    "INTEGER" => &SqlType::Integer,
                    "REAL" => &SqlType::Real,
                    "BLOB" => &SqlType::Blob,
                    _ => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            2,
                            "".to_string(),
                            Type::Text,
                        ))
                    }
                };
                Ok(Column {
                    name: row.get(1)?,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    // Composite keys report their 1-based position in the key.
                    is_primary_key: row.get::<_, i32>(5)? > 0,
                    foreign_key: None,
                })
            })?
            .collect::<rusqlite::Result<_>>()
            .with_context(|| format!("Error reading columns of table {}", self.name))?;

        if actual_columns.is_empty() {
            bail!("Table {} is missing", self.name);
        }
        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} Column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if actual.sql_type != expected.sql_type {
                bail!(
                    "Table {} Column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} Column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            // Default values might be wrapped in parentheses, so we strip them before comparing
            if actual
                .default_value
                .as_ref()
                .map(strip_leading_and_trailing_parentheses)
                != expected
                    .default_value
                    .map(strip_leading_and_trailing_parentheses)
            {
                bail!(
                    "Table {} Column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} Column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }

        for (index_name, _columns) in self.indices {
            let index_exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }

        // PRAGMA foreign_key_list returns: id, seq, table, from, to, on_update, on_delete, match
        let mut fk_stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", self.name))?;
        let actual_fks: Vec<(String, String, String, String)> = fk_stmt
            .query_map([], |row| Ok((row.get(3)?, row.get(2)?, row.get(4)?, row.get(6)?)))?
            .collect::<rusqlite::Result<_>>()?;

        for column in self.columns {
            let Some(expected_fk) = column.foreign_key else {
                continue;
            };
            let expected_on_delete = expected_fk.on_delete.as_sql();
            let found = actual_fks.iter().any(|(from, table, to, on_delete)| {
                from == column.name
                    && table == expected_fk.foreign_table
                    && to == expected_fk.foreign_column
                    && on_delete == expected_on_delete
            });
            if !found {
                bail!(
                    "Table {} column {} is missing foreign key: expected REFERENCES {}({}) ON DELETE {}",
                    self.name,
                    column.name,
                    expected_fk.foreign_table,
                    expected_fk.foreign_column,
                    expected_on_delete
                );
            }
        }
        Ok(())
    }
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Marker table holding the single row with the version the database is at.
pub const SCHEMA_VERSION_TABLE: Table = Table {
    name: "schema_version",
    columns: &[
        sqlite_column!("version", &SqlType::Integer, non_null = true),
        sqlite_column!("applied_at", &SqlType::Text),
    ],
    indices: &[],
};

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        SCHEMA_VERSION_TABLE.create(conn)?;
        for table in self.tables {
            table
                .create(conn)
                .with_context(|| format!("Failed to create table {}", table.name))?;
        }
        write_schema_version(conn, self.version)
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        SCHEMA_VERSION_TABLE.validate(conn)?;
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Reads the recorded schema version, `None` when the database was never initialized.
pub fn read_schema_version(conn: &Connection) -> Result<Option<usize>> {
    let has_marker = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
            params![SCHEMA_VERSION_TABLE.name],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if !has_marker {
        return Ok(None);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?;
    match version {
        Some(v) if v < 0 => bail!("Invalid schema version {}", v),
        Some(v) => Ok(Some(v as usize)),
        None => Ok(None),
    }
}

fn write_schema_version(conn: &Connection, version: usize) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![version as i64, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Brings `conn` to the latest of `schemas`, creating a fresh database or
/// migrating an existing one forward in a single transaction.
///
/// Calling it on a database already at the latest version only validates it.
/// A recorded version that is not listed in `schemas` is an error.
pub fn ensure_schema(
    conn: &mut Connection,
    schemas: &[VersionedSchema],
    db_label: &str,
) -> Result<usize> {
    let latest = schemas
        .last()
        .with_context(|| format!("No {} schema versions defined", db_label))?;

    let Some(db_version) = read_schema_version(conn)? else {
        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )?;
        if table_count > 0 {
            bail!(
                "{} database has {} tables but no schema version marker",
                db_label,
                table_count
            );
        }
        info!(
            "Creating {} database schema at version {}",
            db_label, latest.version
        );
        let tx = conn.transaction()?;
        latest.create(&tx)?;
        tx.commit()?;
        return Ok(latest.version);
    };

    let position = schemas
        .iter()
        .position(|s| s.version == db_version)
        .with_context(|| format!("Unknown {} database version {}", db_label, db_version))?;
    schemas[position].validate(conn).with_context(|| {
        format!(
            "{} database schema validation failed for version {}",
            db_label, db_version
        )
    })?;

    if db_version == latest.version {
        return Ok(db_version);
    }

    let tx = conn.transaction()?;
    let mut current = db_version;
    for schema in &schemas[position + 1..] {
        let migration = schema.migration.with_context(|| {
            format!(
                "No migration from {} database version {} to {}",
                db_label, current, schema.version
            )
        })?;
        info!(
            "Migrating {} database from version {} to {}",
            db_label, current, schema.version
        );
        migration(&tx)
            .with_context(|| format!("Failed to run migration to version {}", schema.version))?;
        write_schema_version(&tx, schema.version)?;
        current = schema.version;
    }
    tx.commit()?;

    latest.validate(conn).with_context(|| {
        format!(
            "{} database schema validation failed after migrating to version {}",
            db_label, latest.version
        )
    })?;
    Ok(current)
}
