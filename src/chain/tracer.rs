//! Forward prerequisite walk from one quest.

use std::collections::HashSet;

use crate::chain::{QuestChain, QuestId};
use crate::store::QuestStore;
use crate::Result;

/// Walk forward from `start`, one successor at a time.
///
/// Stops when a record is missing, when there is no successor, or when the
/// successor was already visited in this walk. Depths come out as 0, 1, 2, ...
pub async fn trace_chain<S>(store: &S, start: QuestId) -> Result<QuestChain>
where
    S: QuestStore + ?Sized,
{
    let mut chain = QuestChain::new(start);
    let mut visited = HashSet::new();
    let mut current = Some(start);

    while let Some(quest_id) = current {
        if !visited.insert(quest_id) {
            log::debug!(
                "cycle in chain from {}: quest {} revisited at depth {}",
                start,
                quest_id,
                chain.total_quests()
            );
            break;
        }

        let Some(record) = store.get_quest_record(quest_id).await? else {
            log::debug!("chain from {} ends at missing quest {}", start, quest_id);
            break;
        };
        chain.push(record);

        current = store.find_successor(quest_id).await?;
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::QuestRecord;
    use crate::store::InMemoryQuestStore;

    fn linear_store() -> InMemoryQuestStore {
        // 1 -> 2 -> 3, plus 4 standalone
        InMemoryQuestStore::new()
            .with_quest(QuestRecord::new(1, "One"))
            .with_quest(QuestRecord::new(2, "Two").with_prerequisite(1))
            .with_quest(QuestRecord::new(3, "Three").with_prerequisite(2))
            .with_quest(QuestRecord::new(4, "Four"))
    }

    fn ids(chain: &QuestChain) -> Vec<QuestId> {
        chain.quest_ids().collect()
    }

    #[tokio::test]
    async fn test_trace_linear_chain() {
        let chain = trace_chain(&linear_store(), 1).await.unwrap();
        assert_eq!(ids(&chain), vec![1, 2, 3]);
        let depths: Vec<usize> = chain.quests().iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_trace_from_middle() {
        let chain = trace_chain(&linear_store(), 2).await.unwrap();
        assert_eq!(ids(&chain), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_trace_standalone_quest() {
        let chain = trace_chain(&linear_store(), 4).await.unwrap();
        assert_eq!(chain.total_quests(), 1);
    }

    #[tokio::test]
    async fn test_trace_missing_start_is_empty() {
        let chain = trace_chain(&linear_store(), 42).await.unwrap();
        assert!(chain.is_empty());
    }

    #[tokio::test]
    async fn test_trace_cycle_terminates() {
        // 1 -> 2 -> 1: both quests claim the other as prerequisite
        let store = InMemoryQuestStore::new()
            .with_quest(QuestRecord::new(1, "One").with_prerequisite(2))
            .with_quest(QuestRecord::new(2, "Two").with_prerequisite(1));
        let chain = trace_chain(&store, 1).await.unwrap();
        assert_eq!(ids(&chain), vec![1, 2]);
        assert_eq!(chain.quests().last().unwrap().depth, 1);
    }

    #[tokio::test]
    async fn test_trace_self_loop() {
        let store = InMemoryQuestStore::new().with_quest(QuestRecord::new(9, "Nine").with_prerequisite(9));
        let chain = trace_chain(&store, 9).await.unwrap();
        assert_eq!(ids(&chain), vec![9]);
    }

    #[tokio::test]
    async fn test_trace_fan_out_follows_lowest_id() {
        let store = InMemoryQuestStore::new()
            .with_quest(QuestRecord::new(1, "One"))
            .with_quest(QuestRecord::new(30, "Branch B").with_prerequisite(1))
            .with_quest(QuestRecord::new(20, "Branch A").with_prerequisite(1))
            .with_quest(QuestRecord::new(31, "After B").with_prerequisite(30));
        let chain = trace_chain(&store, 1).await.unwrap();
        assert_eq!(ids(&chain), vec![1, 20]);
    }
}
