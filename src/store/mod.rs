//! Quest record store: the narrow read interface the resolver needs.

mod memory;
mod sqlite;

pub use memory::InMemoryQuestStore;
pub use sqlite::SqliteQuestStore;

use async_trait::async_trait;

use crate::chain::{QuestId, QuestRecord};
use crate::zone::{MapId, ZoneBoundary, ZoneId, ZonePredicate, ZoneSummary};
use crate::Result;

/// Read-only access to quest data.
///
/// Absence is never an error: missing records, successors and boundaries
/// come back as `None` or empty. `Err` is reserved for backend failures.
#[async_trait]
pub trait QuestStore: Send + Sync {
    /// Quests offered by an in-zone spawn that have no prerequisite, ordered by
    /// id, at most `limit` of them.
    async fn find_candidate_starters(
        &self,
        predicate: &ZonePredicate,
        limit: usize,
    ) -> Result<Vec<QuestId>>;

    async fn get_quest_record(&self, id: QuestId) -> Result<Option<QuestRecord>>;

    /// The lowest-id quest naming `id` as its prerequisite.
    async fn find_successor(&self, id: QuestId) -> Result<Option<QuestId>>;

    async fn list_zone_boundaries(&self, zone_id: ZoneId) -> Result<Vec<ZoneBoundary>>;

    /// Zones with quest givers, optionally limited to one map.
    async fn list_zones(&self, map_id: Option<MapId>) -> Result<Vec<ZoneSummary>>;
}
