//! Generate zone boundaries from quest-giver spawn coordinates.
//!
//! Each `(zone, map)` pair that has quest givers gets the bounding rectangle of
//! those spawns. The result seeds `zone_boundaries` so mistagged spawns on the
//! same map can be recovered by position.

use rusqlite::params;
use serde::Serialize;

use crate::db::Db;
use crate::zone::ZoneBoundary;
use crate::{QuestchainError, Result};

/// A generated boundary plus how many distinct quests its spawns offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedBoundary {
    pub boundary: ZoneBoundary,
    pub quest_count: u32,
}

/// Compute one boundary per `(zone, map)` with at least `min_quests` quests.
///
/// Spawns tagged zone 0 (untagged) are ignored.
pub async fn derive_zone_boundaries(db: &Db, min_quests: u32) -> Result<Vec<DerivedBoundary>> {
    let rows = db
        .with_connection(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT
                    c.zoneId,
                    c.map,
                    COUNT(DISTINCT cqs.quest) AS quest_count,
                    MIN(c.position_x), MAX(c.position_x),
                    MIN(c.position_y), MAX(c.position_y)
                FROM creature c
                INNER JOIN creature_queststarter cqs ON cqs.id = c.id
                WHERE c.zoneId > 0
                GROUP BY c.zoneId, c.map
                HAVING COUNT(DISTINCT cqs.quest) >= ?1
                ORDER BY c.map, c.zoneId
                "#,
            )?;
            let rows = stmt
                .query_map(params![min_quests], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
            Ok::<_, QuestchainError>(rows)
        })
        .await?;

    let mut derived = Vec::with_capacity(rows.len());
    for (zone_id, map_id, quest_count, min_x, max_x, min_y, max_y) in rows {
        let zone_id = u32::try_from(zone_id)
            .map_err(|_| QuestchainError::Parse(format!("zone id out of range: {}", zone_id)))?;
        let map_id = u32::try_from(map_id)
            .map_err(|_| QuestchainError::Parse(format!("map id out of range: {}", map_id)))?;
        derived.push(DerivedBoundary {
            boundary: ZoneBoundary::new(zone_id, map_id, min_x, max_x, min_y, max_y)?,
            quest_count: u32::try_from(quest_count).unwrap_or(u32::MAX),
        });
    }

    log::info!("Derived {} zone boundaries (min_quests={})", derived.len(), min_quests);
    Ok(derived)
}

/// Upsert boundaries into `zone_boundaries`. Needs a writer handle.
pub async fn store_zone_boundaries(db: &Db, boundaries: Vec<DerivedBoundary>) -> Result<usize> {
    if db.is_read_only() {
        return Err(QuestchainError::Config(
            "cannot store zone boundaries through a read-only handle".to_string(),
        ));
    }

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO zone_boundaries (zone_id, map_id, min_x, max_x, min_y, max_y, quest_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(zone_id, map_id) DO UPDATE SET
                    min_x = excluded.min_x,
                    max_x = excluded.max_x,
                    min_y = excluded.min_y,
                    max_y = excluded.max_y,
                    quest_count = excluded.quest_count
                "#,
            )?;
            for derived in &boundaries {
                let b = &derived.boundary;
                let (min_x, max_x, min_y, max_y) = b.rect();
                written += stmt.execute(params![
                    b.zone_id(),
                    b.map_id(),
                    min_x,
                    max_x,
                    min_y,
                    max_y,
                    derived.quest_count
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    })
    .await
}
