use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tokio::task;
use crate::error::{Result, QuestchainError};

/// Database connection wrapper
///
/// Writer handles create the file and run migrations. Reader handles refuse to
/// create a missing file and set `query_only`, so the resolution path can
/// never mutate the world mirror.
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
    read_only: bool,
}

impl Db {
    /// Create a writer handle (used for migrations and boundary generation)
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
            read_only: false,
        }
    }

    /// Create a reader handle for query paths
    pub fn open_read_only<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
            read_only: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Open a new database connection with the pragmas for this handle's mode
    pub fn open_connection(&self) -> Result<Connection> {
        open(&self.path, self.read_only)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let read_only = self.read_only;
        task::spawn_blocking(move || {
            let mut conn = open(&path, read_only)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| QuestchainError::StoreUnavailable(format!("database task failed: {}", e)))?
    }
}

fn open(path: &Path, read_only: bool) -> Result<Connection> {
    if read_only {
        // No SQLITE_OPEN_CREATE: a missing world mirror is an outage, not an empty world
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            QuestchainError::StoreUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;

        conn.execute_batch(
            "PRAGMA query_only = ON; \
             PRAGMA temp_store = MEMORY; \
             PRAGMA cache_size = -65536; \
             PRAGMA mmap_size = 268435456;"
        )
        .map_err(|e| QuestchainError::StoreUnavailable(format!("cannot configure connection: {}", e)))?;

        return Ok(conn);
    }

    let conn = Connection::open(path).map_err(QuestchainError::Database)?;

    // WAL so readers never block the boundary generator
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA foreign_keys = ON; \
         PRAGMA temp_store = MEMORY; \
         PRAGMA cache_size = -65536; \
         PRAGMA mmap_size = 268435456; \
         PRAGMA wal_autocheckpoint = 1000;"
    )?;

    Ok(conn)
}

pub mod migrate;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db.with_connection(|conn| {
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                .map_err(QuestchainError::Database)?;
            Ok(())
        }).await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        db.with_connection(|conn| {
            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");

            let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(foreign_keys, 1);

            Ok::<(), QuestchainError>(())
        }).await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_rejects_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("missing.db");
        let db = Db::open_read_only(&db_path);

        let err = db.with_connection(|_conn| Ok(())).await.unwrap_err();
        assert!(err.is_fatal(), "expected StoreUnavailable, got {:?}", err);
        assert!(!db_path.exists());
    }

    #[tokio::test]
    async fn test_reader_is_query_only() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        Db::new(&db_path)
            .with_connection(|conn| {
                conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let reader = Db::open_read_only(&db_path);
        let write = reader
            .with_connection(|conn| {
                conn.execute("INSERT INTO t (id) VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(matches!(write, Err(QuestchainError::Database(_))));

        let count: i64 = reader
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
