//! Store backed by a SQLite mirror of the world database.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::cache::RecordCache;
use crate::chain::{normalize_prerequisite, QuestId, QuestRecord};
use crate::db::Db;
use crate::store::QuestStore;
use crate::zone::{MapId, ZoneBoundary, ZoneBoundaryIndex, ZoneId, ZonePredicate, ZoneSummary};
use crate::{QuestchainError, Result};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// VM instructions between deadline checks.
const PROGRESS_STEPS: i32 = 1000;

pub struct SqliteQuestStore {
    db: Db,
    boundaries: Arc<ZoneBoundaryIndex>,
    query_timeout: Duration,
    record_cache: Option<Arc<RecordCache>>,
}

impl SqliteQuestStore {
    pub fn new(db: Db, boundaries: Arc<ZoneBoundaryIndex>) -> Self {
        Self {
            db,
            boundaries,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            record_cache: None,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_record_cache(mut self, cache: Arc<RecordCache>) -> Self {
        self.record_cache = Some(cache);
        self
    }

    pub fn boundaries(&self) -> &ZoneBoundaryIndex {
        &self.boundaries
    }

    /// Run one query on the blocking pool under the per-query deadline.
    ///
    /// Dropping a `spawn_blocking` future does not stop the task, so the
    /// deadline is enforced twice. Inside SQLite a progress handler interrupts
    /// the statement once it passes. Outside, `tokio::time::timeout` covers
    /// time spent waiting for a blocking thread or opening the file.
    async fn query<F, T>(&self, what: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.query_timeout;
        let deadline = Instant::now() + timeout;
        let work = self
            .db
            .with_connection(move |conn| run_with_deadline(conn, deadline, f));

        let outcome = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(QuestchainError::Timeout(String::new())),
        };
        outcome.map_err(|e| match e {
            QuestchainError::Timeout(_) => {
                QuestchainError::Timeout(format!("{} exceeded {}ms", what, timeout.as_millis()))
            }
            other => other,
        })
    }
}

/// Run `f` with a progress handler that aborts the statement after `deadline`.
///
/// An interrupted statement surfaces as `Timeout`.
fn run_with_deadline<F, T>(conn: &mut Connection, deadline: Instant, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T>,
{
    conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
    let result = f(conn);
    conn.progress_handler(PROGRESS_STEPS, None::<fn() -> bool>);

    result.map_err(|e| match e {
        QuestchainError::Database(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::OperationInterrupted =>
        {
            QuestchainError::Timeout("interrupted by deadline".to_string())
        }
        other => other,
    })
}

/// `WHERE` fragment and parameters for a zone predicate.
///
/// Always the tag match, plus one rectangle clause per boundary.
fn zone_filter(predicate: &ZonePredicate) -> (String, Vec<SqlValue>) {
    let mut clauses = vec!["c.zoneId = ?".to_string()];
    let mut values = vec![SqlValue::Integer(i64::from(predicate.zone_id()))];

    for boundary in predicate.boundaries() {
        let (min_x, max_x, min_y, max_y) = boundary.rect();
        clauses.push(
            "(c.map = ? AND c.position_x BETWEEN ? AND ? AND c.position_y BETWEEN ? AND ?)"
                .to_string(),
        );
        values.push(SqlValue::Integer(i64::from(boundary.map_id())));
        values.push(SqlValue::Real(min_x));
        values.push(SqlValue::Real(max_x));
        values.push(SqlValue::Real(min_y));
        values.push(SqlValue::Real(max_y));
    }

    (format!("({})", clauses.join(" OR ")), values)
}

fn to_id(raw: i64, what: &str) -> Result<u32> {
    u32::try_from(raw).map_err(|_| QuestchainError::Parse(format!("{} out of range: {}", what, raw)))
}

#[async_trait]
impl QuestStore for SqliteQuestStore {
    async fn find_candidate_starters(
        &self,
        predicate: &ZonePredicate,
        limit: usize,
    ) -> Result<Vec<QuestId>> {
        let (filter, mut values) = zone_filter(predicate);
        values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        // ORDER BY keeps repeated calls idempotent
        let sql = format!(
            r#"
            SELECT DISTINCT qt.ID
            FROM quest_template qt
            LEFT JOIN quest_template_addon qta ON qt.ID = qta.ID
            INNER JOIN creature_queststarter cqs ON qt.ID = cqs.quest
            INNER JOIN creature c ON cqs.id = c.id
            WHERE {}
              AND (qta.PrevQuestID = 0 OR qta.PrevQuestID IS NULL)
            ORDER BY qt.ID
            LIMIT ?
            "#,
            filter
        );

        let ids = self
            .query("find_candidate_starters", move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let ids = stmt
                    .query_map(rusqlite::params_from_iter(values), |row| row.get::<_, i64>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(ids)
            })
            .await?;

        ids.into_iter().map(|id| to_id(id, "quest id")).collect()
    }

    async fn get_quest_record(&self, id: QuestId) -> Result<Option<QuestRecord>> {
        if let Some(cached) = self.record_cache.as_ref().and_then(|c| c.get(id)) {
            return Ok(Some(cached));
        }

        let row = self
            .query("get_quest_record", move |conn| {
                let row = conn
                    .query_row(
                        r#"
                        SELECT qt.ID, qt.LogTitle, qta.MaxLevel, qta.PrevQuestID
                        FROM quest_template qt
                        LEFT JOIN quest_template_addon qta ON qt.ID = qta.ID
                        WHERE qt.ID = ?1
                        "#,
                        params![id],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, Option<String>>(1)?,
                                row.get::<_, Option<i64>>(2)?,
                                row.get::<_, Option<i64>>(3)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((raw_id, title, max_level, prev)) = row else {
            return Ok(None);
        };

        let record = QuestRecord {
            id: to_id(raw_id, "quest id")?,
            title: title.unwrap_or_default(),
            level_hint: max_level.and_then(|l| i32::try_from(l).ok()),
            prev_quest_id: normalize_prerequisite(prev),
        };

        if let Some(cache) = &self.record_cache {
            cache.put(record.clone());
        }
        Ok(Some(record))
    }

    async fn find_successor(&self, id: QuestId) -> Result<Option<QuestId>> {
        // NextQuestID is never populated; search the prerequisite column instead.
        // Both signs match because a negative PrevQuestID still names a prerequisite.
        // Addon rows without a template are not quests and never win.
        let successor = self
            .query("find_successor", move |conn| {
                let successor = conn
                    .query_row(
                        r#"
                        SELECT qta.ID
                        FROM quest_template_addon qta
                        INNER JOIN quest_template qt ON qt.ID = qta.ID
                        WHERE qta.PrevQuestID IN (?1, ?2)
                        ORDER BY qta.ID
                        LIMIT 1
                        "#,
                        params![i64::from(id), -i64::from(id)],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                Ok(successor)
            })
            .await?;

        successor.map(|s| to_id(s, "quest id")).transpose()
    }

    async fn list_zone_boundaries(&self, zone_id: ZoneId) -> Result<Vec<ZoneBoundary>> {
        Ok(self.boundaries.for_zone(zone_id))
    }

    async fn list_zones(&self, map_id: Option<MapId>) -> Result<Vec<ZoneSummary>> {
        let rows = self
            .query("list_zones", move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT c.zoneId, c.map, COUNT(DISTINCT cqs.quest)
                    FROM creature c
                    INNER JOIN creature_queststarter cqs ON cqs.id = c.id
                    WHERE c.zoneId > 0
                      AND (?1 IS NULL OR c.map = ?1)
                    GROUP BY c.zoneId, c.map
                    ORDER BY c.map, c.zoneId
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![map_id], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(zone_id, map_id, quest_count)| {
                Ok(ZoneSummary {
                    zone_id: to_id(zone_id, "zone id")?,
                    map_id: to_id(map_id, "map id")?,
                    quest_count: to_id(quest_count, "quest count")?,
                })
            })
            .collect()
    }
}
