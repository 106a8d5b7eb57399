//! Quest chains: record types, the prerequisite walk, and zone-level resolution.
//!
//! A chain is reconstructed by walking *forward* from a starter quest, finding
//! each successor through the reverse prerequisite relation (the quest whose
//! prerequisite is the current one). The schema's forward "next quest" column
//! is never consulted.

mod resolver;
mod tracer;

pub use resolver::{ChainResolver, ResolverOptions};
pub use tracer::trace_chain;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable quest identifier from the world database.
pub type QuestId = u32;

/// One row of quest metadata. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestRecord {
    pub id: QuestId,
    pub title: String,
    /// Taken from the addon table's max level; absent for many quests.
    pub level_hint: Option<i32>,
    /// Quest that must be completed first. `None` means the quest is a starter.
    pub prev_quest_id: Option<QuestId>,
}

impl QuestRecord {
    pub fn new(id: QuestId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            level_hint: None,
            prev_quest_id: None,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level_hint = Some(level);
        self
    }

    pub fn with_prerequisite(mut self, prev: QuestId) -> Self {
        self.prev_quest_id = normalize_prerequisite(Some(i64::from(prev)));
        self
    }

    pub fn is_starter(&self) -> bool {
        self.prev_quest_id.is_none()
    }
}

/// Map a raw prerequisite column to a quest id.
///
/// 0 and NULL mean "no prerequisite". Negative values are the server's
/// "must be active" form and still name a prerequisite.
pub fn normalize_prerequisite(raw: Option<i64>) -> Option<QuestId> {
    match raw {
        None | Some(0) => None,
        Some(v) => QuestId::try_from(v.unsigned_abs()).ok(),
    }
}

/// A quest placed at a position within one traced chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainNode {
    #[serde(flatten)]
    pub quest: QuestRecord,
    pub depth: usize,
}

/// An ordered chain of quests, depth 0 first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestChain {
    start_quest: QuestId,
    quests: Vec<ChainNode>,
    total_quests: usize,
}

impl QuestChain {
    pub fn new(start_quest: QuestId) -> Self {
        Self {
            start_quest,
            quests: Vec::new(),
            total_quests: 0,
        }
    }

    /// Append the next quest; its depth is the current length.
    pub fn push(&mut self, quest: QuestRecord) {
        let depth = self.quests.len();
        self.quests.push(ChainNode { quest, depth });
        self.total_quests = self.quests.len();
    }

    pub fn start_quest(&self) -> QuestId {
        self.start_quest
    }

    pub fn quests(&self) -> &[ChainNode] {
        &self.quests
    }

    pub fn total_quests(&self) -> usize {
        self.total_quests
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    pub fn quest_ids(&self) -> impl Iterator<Item = QuestId> + '_ {
        self.quests.iter().map(|n| n.quest.id)
    }

    pub fn signature(&self) -> ChainSignature {
        ChainSignature::from_ids(self.quest_ids())
    }
}

/// Order-independent chain identity: the sorted set of quest ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainSignature(Vec<QuestId>);

impl ChainSignature {
    pub fn from_ids(ids: impl IntoIterator<Item = QuestId>) -> Self {
        let mut ids: Vec<QuestId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    pub fn ids(&self) -> &[QuestId] {
        &self.0
    }
}

impl fmt::Display for ChainSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "{}", parts.join("-"))
    }
}
