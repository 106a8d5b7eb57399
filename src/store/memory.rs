//! In-memory store, for embedding small worlds and for tests.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::chain::{QuestId, QuestRecord};
use crate::store::QuestStore;
use crate::zone::{
    MapId, SpawnPoint, ZoneBoundary, ZoneBoundaryIndex, ZoneId, ZonePredicate, ZoneSummary,
};
use crate::Result;

/// Creature entry id; one entry may have many spawns.
pub type CreatureEntry = u32;

#[derive(Debug, Clone, Default)]
pub struct InMemoryQuestStore {
    quests: BTreeMap<QuestId, QuestRecord>,
    spawns: Vec<(CreatureEntry, SpawnPoint)>,
    offerings: BTreeSet<(CreatureEntry, QuestId)>,
    boundaries: ZoneBoundaryIndex,
}

impl InMemoryQuestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quest(mut self, record: QuestRecord) -> Self {
        self.quests.insert(record.id, record);
        self
    }

    pub fn with_spawn(mut self, entry: CreatureEntry, spawn: SpawnPoint) -> Self {
        self.spawns.push((entry, spawn));
        self
    }

    /// `entry` offers `quest`.
    pub fn with_offering(mut self, entry: CreatureEntry, quest: QuestId) -> Self {
        self.offerings.insert((entry, quest));
        self
    }

    pub fn with_boundary(mut self, boundary: ZoneBoundary) -> Self {
        self.boundaries.insert(boundary);
        self
    }
}

#[async_trait]
impl QuestStore for InMemoryQuestStore {
    async fn find_candidate_starters(
        &self,
        predicate: &ZonePredicate,
        limit: usize,
    ) -> Result<Vec<QuestId>> {
        let in_zone: BTreeSet<CreatureEntry> = self
            .spawns
            .iter()
            .filter(|(_, spawn)| predicate.matches(spawn))
            .map(|(entry, _)| *entry)
            .collect();

        let starters: BTreeSet<QuestId> = self
            .offerings
            .iter()
            .filter(|(entry, _)| in_zone.contains(entry))
            .map(|(_, quest)| *quest)
            .filter(|quest| self.quests.get(quest).map_or(false, QuestRecord::is_starter))
            .collect();

        Ok(starters.into_iter().take(limit).collect())
    }

    async fn get_quest_record(&self, id: QuestId) -> Result<Option<QuestRecord>> {
        Ok(self.quests.get(&id).cloned())
    }

    async fn find_successor(&self, id: QuestId) -> Result<Option<QuestId>> {
        // BTreeMap iterates in id order, so the first hit is the lowest id
        Ok(self
            .quests
            .values()
            .find(|q| q.prev_quest_id == Some(id))
            .map(|q| q.id))
    }

    async fn list_zone_boundaries(&self, zone_id: ZoneId) -> Result<Vec<ZoneBoundary>> {
        Ok(self.boundaries.for_zone(zone_id))
    }

    async fn list_zones(&self, map_id: Option<MapId>) -> Result<Vec<ZoneSummary>> {
        let mut per_zone: BTreeMap<(MapId, ZoneId), BTreeSet<QuestId>> = BTreeMap::new();
        for (entry, spawn) in &self.spawns {
            if spawn.zone_id == 0 || map_id.map_or(false, |m| m != spawn.map_id) {
                continue;
            }
            let quests = self
                .offerings
                .iter()
                .filter(|(e, _)| e == entry)
                .map(|(_, q)| *q);
            per_zone
                .entry((spawn.map_id, spawn.zone_id))
                .or_default()
                .extend(quests);
        }

        Ok(per_zone
            .into_iter()
            .filter(|(_, quests)| !quests.is_empty())
            .map(|((map_id, zone_id), quests)| ZoneSummary {
                zone_id,
                map_id,
                quest_count: quests.len() as u32,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(map_id: MapId, zone_id: ZoneId, x: f64, y: f64) -> SpawnPoint {
        SpawnPoint { map_id, zone_id, x, y }
    }

    fn store() -> InMemoryQuestStore {
        InMemoryQuestStore::new()
            .with_quest(QuestRecord::new(1, "Starter"))
            .with_quest(QuestRecord::new(2, "Follow-up").with_prerequisite(1))
            .with_quest(QuestRecord::new(3, "Alternate follow-up").with_prerequisite(1))
            .with_quest(QuestRecord::new(4, "Elsewhere"))
            .with_spawn(100, spawn(0, 12, 0.0, 0.0))
            .with_spawn(200, spawn(1, 14, 0.0, 0.0))
            .with_offering(100, 1)
            .with_offering(100, 2)
            .with_offering(200, 4)
    }

    #[tokio::test]
    async fn test_starters_exclude_quests_with_prerequisite() {
        let starters = store()
            .find_candidate_starters(&ZonePredicate::exact(12), 100)
            .await
            .unwrap();
        assert_eq!(starters, vec![1]);
    }

    #[tokio::test]
    async fn test_successor_is_lowest_id() {
        assert_eq!(store().find_successor(1).await.unwrap(), Some(2));
        assert_eq!(store().find_successor(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_zones_counts_distinct_quests() {
        let zones = store().list_zones(None).await.unwrap();
        assert_eq!(
            zones,
            vec![
                ZoneSummary { zone_id: 12, map_id: 0, quest_count: 2 },
                ZoneSummary { zone_id: 14, map_id: 1, quest_count: 1 },
            ]
        );
        assert_eq!(store().list_zones(Some(1)).await.unwrap().len(), 1);
    }
}
