//! Static boundary reference set, loaded once at startup.

use std::collections::HashMap;

use crate::db::Db;
use crate::zone::{BoundaryKey, ZoneBoundary, ZoneId};
use crate::{QuestchainError, Result};

/// Boundaries keyed by `(zone, map)`.
#[derive(Debug, Clone, Default)]
pub struct ZoneBoundaryIndex {
    by_key: HashMap<BoundaryKey, ZoneBoundary>,
}

impl ZoneBoundaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later entries replace earlier ones with the same key.
    pub fn from_boundaries(boundaries: impl IntoIterator<Item = ZoneBoundary>) -> Self {
        let mut index = Self::new();
        for boundary in boundaries {
            index.insert(boundary);
        }
        index
    }

    pub fn insert(&mut self, boundary: ZoneBoundary) {
        if let Some(previous) = self.by_key.insert(boundary.key(), boundary) {
            log::warn!(
                "boundary for zone {} map {} registered twice, keeping the later one",
                previous.zone_id(),
                previous.map_id()
            );
        }
    }

    pub fn get(&self, key: &BoundaryKey) -> Option<&ZoneBoundary> {
        self.by_key.get(key)
    }

    /// All boundaries for a zone id, one per map, ordered by map.
    pub fn for_zone(&self, zone_id: ZoneId) -> Vec<ZoneBoundary> {
        let mut found: Vec<ZoneBoundary> = self
            .by_key
            .values()
            .filter(|b| b.zone_id() == zone_id)
            .copied()
            .collect();
        found.sort_by_key(|b| b.map_id());
        found
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Load every row of `zone_boundaries`. Rows violating the rectangle
    /// invariant are skipped with a warning.
    pub async fn load(db: &Db) -> Result<Self> {
        let rows = db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT zone_id, map_id, min_x, max_x, min_y, max_y \
                     FROM zone_boundaries ORDER BY map_id, zone_id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, f64>(3)?,
                            row.get::<_, f64>(4)?,
                            row.get::<_, f64>(5)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok::<_, QuestchainError>(rows)
            })
            .await?;

        let mut index = Self::new();
        for (zone_id, map_id, min_x, max_x, min_y, max_y) in rows {
            let (Ok(zone_id), Ok(map_id)) = (u32::try_from(zone_id), u32::try_from(map_id)) else {
                log::warn!("skipping boundary with out-of-range key ({}, {})", zone_id, map_id);
                continue;
            };
            match ZoneBoundary::new(zone_id, map_id, min_x, max_x, min_y, max_y) {
                Ok(boundary) => index.insert(boundary),
                Err(e) => log::warn!("skipping boundary row: {}", e),
            }
        }

        log::info!("Loaded {} zone boundaries", index.len());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_same_zone_on_two_maps_kept_apart() {
        let index = ZoneBoundaryIndex::from_boundaries([
            ZoneBoundary::new(12, 0, -9500.0, -8700.0, -250.0, 500.0).unwrap(),
            ZoneBoundary::new(12, 530, 0.0, 10.0, 0.0, 10.0).unwrap(),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.for_zone(12).len(), 2);
        assert!(index.for_zone(13).is_empty());
        assert!(index.get(&BoundaryKey { zone_id: 12, map_id: 530 }).is_some());
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let index = ZoneBoundaryIndex::from_boundaries([
            ZoneBoundary::new(12, 0, 0.0, 1.0, 0.0, 1.0).unwrap(),
            ZoneBoundary::new(12, 0, 0.0, 2.0, 0.0, 2.0).unwrap(),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.for_zone(12)[0].rect(), (0.0, 2.0, 0.0, 2.0));
    }

    #[tokio::test]
    async fn test_load_from_database() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("world.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO zone_boundaries (zone_id, map_id, min_x, max_x, min_y, max_y) \
                 VALUES (14, 1, 100.0, 200.0, -50.0, 50.0)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let index = ZoneBoundaryIndex::load(&Db::open_read_only(db.path())).await.unwrap();
        // Seeded Elwynn Forest plus the row above
        assert_eq!(index.len(), 2);
        assert_eq!(index.for_zone(12)[0].map_id(), 0);
        assert!(index.for_zone(14)[0].contains(1, 150.0, 0.0));
    }
}
