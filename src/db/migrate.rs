//! Versioned schema for the world mirror.
//!
//! Files under `migrations/` are named `NNN_description.sql` and applied in
//! version order, one transaction each. `schema_migrations` records what ran.
//! A recorded version whose file was renamed or replaced is refused instead of
//! being applied a second time.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{QuestchainError, Result};

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// One schema step read from disk.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub name: String,
    sql: String,
}

impl Migration {
    /// Parse `NNN_description.sql`; the numeric prefix is the version.
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| bad_file(path, "name is not valid UTF-8"))?
            .to_string();

        let version = name
            .split_once('_')
            .map(|(prefix, _)| prefix)
            .filter(|prefix| !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|prefix| prefix.parse::<u32>().ok())
            .ok_or_else(|| bad_file(path, "expected NNN_description.sql"))?;

        let sql = fs::read_to_string(path)?;
        Ok(Self { version, name, sql })
    }
}

fn bad_file(path: &Path, why: &str) -> QuestchainError {
    QuestchainError::Config(format!("migration {}: {}", path.display(), why))
}

/// Every `.sql` file in `dir`, sorted by version. Two files sharing a version
/// is a configuration error.
pub fn discover(dir: &Path) -> Result<Vec<Migration>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "sql") {
            found.push(Migration::from_file(&path)?);
        }
    }
    found.sort_by_key(|m| m.version);

    if let Some(clash) = found.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(QuestchainError::Config(format!(
            "migrations {} and {} share version {}",
            clash[0].name, clash[1].name, clash[0].version
        )));
    }
    Ok(found)
}

/// Recorded migrations by version. Empty when nothing has been applied yet.
pub fn applied_versions(conn: &Connection) -> Result<BTreeMap<u32, String>> {
    let has_ledger = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !has_ledger {
        return Ok(BTreeMap::new());
    }

    let mut stmt = conn.prepare("SELECT version, name FROM schema_migrations")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?;
    let mut applied = BTreeMap::new();
    for row in rows {
        let (version, name) = row?;
        applied.insert(version, name);
    }
    Ok(applied)
}

/// Migrations from `available` that still need to run.
///
/// Fails if a recorded version maps to a different file name than the one on
/// disk.
pub fn pending<'a>(
    applied: &BTreeMap<u32, String>,
    available: &'a [Migration],
) -> Result<Vec<&'a Migration>> {
    let mut todo = Vec::new();
    for migration in available {
        match applied.get(&migration.version) {
            None => todo.push(migration),
            Some(recorded) if *recorded == migration.name => {}
            Some(recorded) => {
                return Err(QuestchainError::Config(format!(
                    "schema version {} was applied as {} but the file is now {}",
                    migration.version, recorded, migration.name
                )))
            }
        }
    }
    Ok(todo)
}

/// Apply every pending migration in `dir`. Returns how many ran.
pub fn run_migrations(conn: &mut Connection, dir: &Path) -> Result<usize> {
    conn.execute(LEDGER_DDL, [])?;

    let available = discover(dir)?;
    let applied = applied_versions(conn)?;
    let todo = pending(&applied, &available)?;

    if todo.is_empty() {
        log::debug!("Schema up to date at version {:?}", applied.keys().next_back());
        return Ok(0);
    }

    for migration in &todo {
        log::info!("Applying schema version {} ({})", migration.version, migration.name);
        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            QuestchainError::Config(format!("schema version {} failed: {}", migration.version, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    log::info!("Applied {} schema migration(s)", todo.len());
    Ok(todo.len())
}
