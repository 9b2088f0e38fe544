use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use tracing::{debug, info};

use crate::error::{TaxonomyError, sql};
use crate::normalize::{Field, RowResult};
use crate::rank::RankLadder;

/// Tables in load order; teardown runs in reverse.
pub const TABLES: &[&str] = &["source", "ranks", "nodes", "names", "merged"];

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS source (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS ranks (
    rank TEXT PRIMARY KEY,
    height INTEGER NOT NULL UNIQUE,
    no_rank INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS nodes (
    tax_id TEXT PRIMARY KEY NOT NULL,
    parent_id TEXT,
    rank TEXT REFERENCES ranks(rank),
    embl_code TEXT,
    division_id TEXT,
    source_id INTEGER REFERENCES source(id),
    is_valid INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS ix_nodes_parent_id ON nodes(parent_id);

CREATE TABLE IF NOT EXISTS names (
    id INTEGER PRIMARY KEY,
    tax_id TEXT REFERENCES nodes(tax_id) ON DELETE CASCADE,
    tax_name TEXT,
    unique_name TEXT,
    name_class TEXT,
    source_id INTEGER REFERENCES source(id),
    is_primary INTEGER,
    is_classified INTEGER
);

CREATE INDEX IF NOT EXISTS ix_names_tax_id_is_primary ON names(tax_id, is_primary);
CREATE INDEX IF NOT EXISTS ix_names_tax_name ON names(tax_name);

CREATE TABLE IF NOT EXISTS merged (
    old_tax_id TEXT PRIMARY KEY,
    new_tax_id TEXT
);
"#;

impl ToSql for Field {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Field::Null => ToSqlOutput::Owned(Value::Null),
            Field::Int(value) => ToSqlOutput::from(*value),
            Field::Text(value) => ToSqlOutput::from(value.as_str()),
        })
    }
}

/// The SQLite file holding one taxonomy.
#[derive(Debug)]
pub struct Store {
    path: Option<Utf8PathBuf>,
    conn: Connection,
}

impl Store {
    pub fn open(path: &Utf8Path) -> Result<Self, TaxonomyError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| TaxonomyError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path()).map_err(sql)?;
        Self::configure(&conn)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn,
        })
    }

    pub fn open_in_memory() -> Result<Self, TaxonomyError> {
        let conn = Connection::open_in_memory().map_err(sql)?;
        Self::configure(&conn)?;
        Ok(Self { path: None, conn })
    }

    /// `~/.cache/kira-taxonomy/taxonomy.db`
    pub fn default_path() -> Result<Utf8PathBuf, TaxonomyError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("kira-taxonomy")
                        .join("taxonomy.db"),
                )
                .ok()
            })
            .ok_or_else(|| {
                TaxonomyError::Filesystem("unable to resolve cache directory".to_string())
            })
    }

    fn configure(conn: &Connection) -> Result<(), TaxonomyError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(sql)
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>, TaxonomyError> {
        self.conn.transaction().map_err(sql)
    }

    /// Creates the five tables. With `clobber`, existing tables are dropped
    /// first; without it, existing tables are left as they are.
    pub fn initialize_schema(&mut self, clobber: bool) -> Result<(), TaxonomyError> {
        let tx = self.transaction()?;
        if clobber {
            info!("clobbering taxonomy tables");
            for table in TABLES.iter().rev() {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
                    .map_err(sql)?;
            }
        }
        debug!("creating taxonomy tables");
        tx.execute_batch(SCHEMA).map_err(sql)?;
        tx.commit().map_err(sql)
    }

    pub fn has_schema(&self) -> Result<bool, TaxonomyError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('source', 'ranks', 'nodes', 'names', 'merged')",
                [],
                |row| row.get(0),
            )
            .map_err(sql)?;
        Ok(count as usize == TABLES.len())
    }

    /// Inserts `rows` into `table` in one transaction. Without `columns`
    /// the first row is taken as the header.
    pub fn bulk_load<I>(
        &mut self,
        table: &str,
        columns: Option<&[&str]>,
        rows: I,
    ) -> Result<usize, TaxonomyError>
    where
        I: IntoIterator<Item = RowResult>,
    {
        let tx = self.transaction()?;
        let count = load_rows(&tx, table, columns, rows)?;
        tx.commit().map_err(sql)?;
        Ok(count)
    }

    pub fn add_source(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(i64, bool), TaxonomyError> {
        let tx = self.transaction()?;
        let result = add_source(&tx, name, description)?;
        tx.commit().map_err(sql)?;
        Ok(result)
    }

    pub fn seed_ranks(&mut self, ladder: &RankLadder) -> Result<usize, TaxonomyError> {
        let tx = self.transaction()?;
        let count = seed_ranks(&tx, ladder)?;
        tx.commit().map_err(sql)?;
        Ok(count)
    }

    /// The ladder stored in the `ranks` table, ordered by height.
    pub fn rank_ladder(&self) -> Result<RankLadder, TaxonomyError> {
        let mut stmt = self
            .conn
            .prepare("SELECT rank, no_rank FROM ranks ORDER BY height")
            .map_err(sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)?;
        let no_rank = rows
            .iter()
            .find(|(_, flag)| *flag)
            .map(|(rank, _)| rank.clone())
            .ok_or_else(|| {
                TaxonomyError::UnknownRank("ranks table has no placeholder rank".to_string())
            })?;
        RankLadder::new(rows.into_iter().map(|(rank, _)| rank), &no_rank)
    }

    pub fn count(&self, table: &str) -> Result<usize, TaxonomyError> {
        check_identifier(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(sql)?;
        Ok(count as usize)
    }
}

/// Inserts rows inside an open transaction; the caller commits.
pub fn load_rows<I>(
    tx: &Transaction<'_>,
    table: &str,
    columns: Option<&[&str]>,
    rows: I,
) -> Result<usize, TaxonomyError>
where
    I: IntoIterator<Item = RowResult>,
{
    check_identifier(table)?;
    let mut rows = rows.into_iter();
    let columns: Vec<String> = match columns {
        Some(columns) => columns.iter().map(|column| column.to_string()).collect(),
        None => {
            let header = rows.next().ok_or_else(|| {
                TaxonomyError::MalformedRecord(format!("no header row for table {table}"))
            })??;
            header
                .iter()
                .map(|field| {
                    field.as_text().map(str::to_string).ok_or_else(|| {
                        TaxonomyError::MalformedRecord(format!(
                            "header for table {table} must be text: {header:?}"
                        ))
                    })
                })
                .collect::<Result<_, _>>()?
        }
    };
    for column in &columns {
        check_identifier(column)?;
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    let statement = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    let mut stmt = tx.prepare(&statement).map_err(sql)?;
    let mut count = 0usize;
    for row in rows {
        let row = row?;
        if row.len() != columns.len() {
            return Err(TaxonomyError::MalformedRecord(format!(
                "{table} row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        stmt.execute(params_from_iter(row.iter())).map_err(sql)?;
        count += 1;
    }
    info!(table, rows = count, "loaded rows");
    Ok(count)
}

/// Get-or-create a source row; returns (id, created).
pub fn add_source(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<(i64, bool), TaxonomyError> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM source WHERE name = ?1", params![name], |row| row.get(0))
        .optional()
        .map_err(sql)?;
    if let Some(id) = existing {
        return Ok((id, false));
    }
    conn.execute(
        "INSERT INTO source (name, description) VALUES (?1, ?2)",
        params![name, description],
    )
    .map_err(sql)?;
    Ok((conn.last_insert_rowid(), true))
}

/// Seeds the `ranks` table when it is empty; returns rows inserted.
pub fn seed_ranks(tx: &Transaction<'_>, ladder: &RankLadder) -> Result<usize, TaxonomyError> {
    let existing: i64 = tx
        .query_row("SELECT COUNT(*) FROM ranks", [], |row| row.get(0))
        .map_err(sql)?;
    if existing > 0 {
        debug!(existing, "ranks already seeded");
        return Ok(0);
    }
    let rows = ladder.rows().map(|(rank, height, no_rank)| {
        Ok(vec![
            Field::text(rank),
            Field::Int(height),
            Field::Int(i64::from(no_rank)),
        ])
    });
    load_rows(tx, "ranks", Some(&["rank", "height", "no_rank"]), rows)
}

fn check_identifier(name: &str) -> Result<(), TaxonomyError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !name.starts_with(|ch: char| ch.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(TaxonomyError::InvalidIdentifier(name.to_string()))
    }
}
