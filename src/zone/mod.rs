//! Spatial zone resolution.
//!
//! Spawn records carry a zone tag that is sometimes stale. A zone request is
//! therefore turned into a predicate that also accepts spawns whose map and
//! coordinates fall inside one of the zone's registered rectangles.

mod derive;
mod index;

pub use derive::{derive_zone_boundaries, store_zone_boundaries, DerivedBoundary};
pub use index::ZoneBoundaryIndex;

use serde::{Deserialize, Serialize};

use crate::store::QuestStore;
use crate::{QuestchainError, Result};

pub type ZoneId = u32;
pub type MapId = u32;

/// Composite boundary key. A zone id alone is not unique across maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryKey {
    pub zone_id: ZoneId,
    pub map_id: MapId,
}

/// Axis-aligned rectangle on one map that counts as part of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneBoundary {
    zone_id: ZoneId,
    map_id: MapId,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl ZoneBoundary {
    pub fn new(
        zone_id: ZoneId,
        map_id: MapId,
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
    ) -> Result<Self> {
        if ![min_x, max_x, min_y, max_y].iter().all(|v| v.is_finite()) {
            return Err(QuestchainError::InvalidInput(format!(
                "boundary for zone {} map {} has non-finite coordinates",
                zone_id, map_id
            )));
        }
        if min_x > max_x || min_y > max_y {
            return Err(QuestchainError::InvalidInput(format!(
                "boundary for zone {} map {} is inverted: x [{}, {}] y [{}, {}]",
                zone_id, map_id, min_x, max_x, min_y, max_y
            )));
        }
        Ok(Self {
            zone_id,
            map_id,
            min_x,
            max_x,
            min_y,
            max_y,
        })
    }

    pub fn key(&self) -> BoundaryKey {
        BoundaryKey {
            zone_id: self.zone_id,
            map_id: self.map_id,
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    /// `(min_x, max_x, min_y, max_y)`
    pub fn rect(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.max_x, self.min_y, self.max_y)
    }

    /// Inclusive containment. Coordinates on another map never match.
    pub fn contains(&self, map_id: MapId, x: f64, y: f64) -> bool {
        map_id == self.map_id
            && x >= self.min_x
            && x <= self.max_x
            && y >= self.min_y
            && y <= self.max_y
    }
}

/// Where a quest giver stands in the world, plus its (possibly wrong) zone tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub map_id: MapId,
    pub zone_id: ZoneId,
    pub x: f64,
    pub y: f64,
}

/// "Belongs to zone" test for spawn records.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePredicate {
    zone_id: ZoneId,
    boundaries: Vec<ZoneBoundary>,
}

impl ZonePredicate {
    /// Tag match only, no spatial fallback.
    pub fn exact(zone_id: ZoneId) -> Self {
        Self {
            zone_id,
            boundaries: Vec::new(),
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn boundaries(&self) -> &[ZoneBoundary] {
        &self.boundaries
    }

    pub fn has_spatial_fallback(&self) -> bool {
        !self.boundaries.is_empty()
    }

    pub fn matches(&self, spawn: &SpawnPoint) -> bool {
        spawn.zone_id == self.zone_id
            || self
                .boundaries
                .iter()
                .any(|b| b.contains(spawn.map_id, spawn.x, spawn.y))
    }
}

/// Zone summary for browse listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    pub zone_id: ZoneId,
    pub map_id: MapId,
    pub quest_count: u32,
}

/// Check a caller-supplied zone id. Zero, negative, and out-of-range ids are rejected.
pub fn validate_zone_id(raw: i64) -> Result<ZoneId> {
    match ZoneId::try_from(raw) {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(QuestchainError::InvalidInput(format!(
            "zone_id must be a positive integer, got {}",
            raw
        ))),
    }
}

/// Build the selection predicate for a zone.
///
/// With no registered boundary the predicate is a plain tag match.
pub async fn resolve_zone<S>(store: &S, zone_id: ZoneId) -> Result<ZonePredicate>
where
    S: QuestStore + ?Sized,
{
    if zone_id == 0 {
        return Err(QuestchainError::InvalidInput(
            "zone_id must be a positive integer, got 0".to_string(),
        ));
    }

    let mut boundaries: Vec<ZoneBoundary> = store
        .list_zone_boundaries(zone_id)
        .await?
        .into_iter()
        .filter(|b| b.zone_id() == zone_id)
        .collect();
    boundaries.sort_by_key(|b| b.map_id());
    boundaries.dedup_by_key(|b| b.map_id());

    if boundaries.is_empty() {
        log::debug!("zone {}: no registered boundary, tag match only", zone_id);
    } else {
        log::debug!(
            "zone {}: spatial fallback on {} map(s)",
            zone_id,
            boundaries.len()
        );
    }

    Ok(ZonePredicate {
        zone_id,
        boundaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryQuestStore;

    fn elwynn() -> ZoneBoundary {
        ZoneBoundary::new(12, 0, -9500.0, -8700.0, -250.0, 500.0).unwrap()
    }

    #[test]
    fn test_boundary_rejects_inverted_rect() {
        assert!(ZoneBoundary::new(12, 0, 10.0, -10.0, 0.0, 1.0).is_err());
        assert!(ZoneBoundary::new(12, 0, 0.0, 1.0, 5.0, 4.0).is_err());
        assert!(ZoneBoundary::new(12, 0, f64::NAN, 1.0, 0.0, 1.0).is_err());
        // Degenerate but valid
        assert!(ZoneBoundary::new(12, 0, 1.0, 1.0, 2.0, 2.0).is_ok());
    }

    #[test]
    fn test_contains_is_inclusive_and_map_scoped() {
        let b = elwynn();
        assert!(b.contains(0, -9500.0, -250.0));
        assert!(b.contains(0, -8700.0, 500.0));
        assert!(b.contains(0, -9000.0, 100.0));
        assert!(!b.contains(0, -8699.9, 100.0));
        assert!(!b.contains(1, -9000.0, 100.0));
    }

    #[test]
    fn test_predicate_matches_tag_or_rect() {
        let predicate = ZonePredicate {
            zone_id: 12,
            boundaries: vec![elwynn()],
        };
        let tagged_elsewhere = SpawnPoint { map_id: 1, zone_id: 12, x: 0.0, y: 0.0 };
        let mistagged_inside = SpawnPoint { map_id: 0, zone_id: 999, x: -9000.0, y: 100.0 };
        let outside = SpawnPoint { map_id: 0, zone_id: 999, x: 0.0, y: 0.0 };

        assert!(predicate.matches(&tagged_elsewhere));
        assert!(predicate.matches(&mistagged_inside));
        assert!(!predicate.matches(&outside));
    }

    #[test]
    fn test_validate_zone_id() {
        assert_eq!(validate_zone_id(12).unwrap(), 12);
        assert!(validate_zone_id(0).is_err());
        assert!(validate_zone_id(-5).is_err());
        assert!(validate_zone_id(i64::from(u32::MAX) + 1).is_err());
    }

    #[tokio::test]
    async fn test_resolve_without_boundary_is_exact() {
        let store = InMemoryQuestStore::new();
        let predicate = resolve_zone(&store, 40).await.unwrap();
        assert_eq!(predicate, ZonePredicate::exact(40));
        assert!(!predicate.has_spatial_fallback());
    }

    #[tokio::test]
    async fn test_resolve_collects_every_map_for_zone() {
        let store = InMemoryQuestStore::new()
            .with_boundary(elwynn())
            .with_boundary(ZoneBoundary::new(12, 530, 0.0, 100.0, 0.0, 100.0).unwrap())
            .with_boundary(ZoneBoundary::new(14, 1, 0.0, 100.0, 0.0, 100.0).unwrap());

        let predicate = resolve_zone(&store, 12).await.unwrap();
        let maps: Vec<MapId> = predicate.boundaries().iter().map(|b| b.map_id()).collect();
        assert_eq!(maps, vec![0, 530]);
    }

    #[tokio::test]
    async fn test_resolve_rejects_zero() {
        let store = InMemoryQuestStore::new();
        let err = resolve_zone(&store, 0).await.unwrap_err();
        assert!(matches!(err, QuestchainError::InvalidInput(_)));
    }
}
