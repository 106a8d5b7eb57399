//! Zone-level chain resolution: starters → walks → dedup → ranking.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};

use crate::cache::RecordCache;
use crate::chain::{trace_chain, QuestChain, QuestId};
use crate::config::{ChainsConfig, Config};
use crate::db::Db;
use crate::store::{QuestStore, SqliteQuestStore};
use crate::zone::{resolve_zone, MapId, ZoneBoundary, ZoneBoundaryIndex, ZoneId, ZoneSummary};
use crate::{QuestchainError, Result};

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Candidates beyond this are dropped without error.
    pub max_starters: usize,
    pub trace_concurrency: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_starters: 100,
            trace_concurrency: 8,
        }
    }
}

impl From<&ChainsConfig> for ResolverOptions {
    fn from(config: &ChainsConfig) -> Self {
        Self {
            max_starters: config.max_starters,
            trace_concurrency: config.trace_concurrency,
        }
    }
}

/// Entry point for chain queries over any [`QuestStore`].
pub struct ChainResolver {
    store: Arc<dyn QuestStore>,
    options: ResolverOptions,
}

impl ChainResolver {
    pub fn new(store: Arc<dyn QuestStore>, options: ResolverOptions) -> Self {
        Self { store, options }
    }

    /// Build the SQLite-backed resolver described by `config`.
    ///
    /// Loads the boundary reference set once; it is shared read-only afterwards.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db = Db::open_read_only(config.db_path());
        let boundaries = Arc::new(ZoneBoundaryIndex::load(&db).await?);

        let mut store = SqliteQuestStore::new(db, boundaries).with_query_timeout(config.query_timeout());
        if config.store.record_cache_capacity > 0 {
            log::info!(
                "Quest record cache enabled (capacity {}, ttl {:?})",
                config.store.record_cache_capacity,
                config.record_cache_ttl()
            );
            store = store.with_record_cache(Arc::new(RecordCache::new(
                config.store.record_cache_capacity,
                config.record_cache_ttl(),
            )));
        }

        Ok(Self::new(Arc::new(store), ResolverOptions::from(&config.chains)))
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Every distinct chain starting in `zone_id`, longest first.
    ///
    /// A candidate whose walk fails is logged and left out; a store that is
    /// unreachable or timing out fails the whole call.
    pub async fn find_quest_chains_in_zone(&self, zone_id: ZoneId) -> Result<Vec<QuestChain>> {
        let started = Instant::now();
        let store = self.store.as_ref();

        let predicate = resolve_zone(store, zone_id).await?;
        let mut starters = store
            .find_candidate_starters(&predicate, self.options.max_starters)
            .await?;
        starters.truncate(self.options.max_starters);

        log::debug!(
            "find_quest_chains_in_zone({}): found {} starter quests",
            zone_id,
            starters.len()
        );
        if !starters.is_empty() && starters.len() <= 5 {
            log::debug!("starter quest ids: {:?}", starters);
        }

        // buffered() yields in input order, so processing order survives concurrency
        let traced: Vec<(QuestId, Result<QuestChain>)> = stream::iter(starters)
            .map(|quest_id| async move { (quest_id, trace_chain(store, quest_id).await) })
            .buffered(self.options.trace_concurrency.max(1))
            .collect()
            .await;

        let chains = assemble_chains(traced)?;

        log::info!(
            "zone {}: {} chain(s) in {}ms",
            zone_id,
            chains.len(),
            started.elapsed().as_millis()
        );
        Ok(chains)
    }

    /// The chain from `quest_id` forward.
    pub async fn trace_quest_chain(&self, quest_id: QuestId) -> Result<QuestChain> {
        if quest_id == 0 {
            return Err(QuestchainError::InvalidInput(
                "quest_id must be a positive integer, got 0".to_string(),
            ));
        }
        let chain = trace_chain(self.store.as_ref(), quest_id).await?;
        if chain.is_empty() {
            return Err(QuestchainError::QuestNotFound(quest_id));
        }
        Ok(chain)
    }

    pub async fn list_zones(&self, map_id: Option<MapId>) -> Result<Vec<ZoneSummary>> {
        self.store.list_zones(map_id).await
    }

    pub async fn zone_boundaries(&self, zone_id: ZoneId) -> Result<Vec<ZoneBoundary>> {
        Ok(resolve_zone(self.store.as_ref(), zone_id)
            .await?
            .boundaries()
            .to_vec())
    }
}

/// Drop failed and duplicate walks, then rank by length (stable on ties).
fn assemble_chains(traced: Vec<(QuestId, Result<QuestChain>)>) -> Result<Vec<QuestChain>> {
    let mut seen = HashSet::new();
    let mut chains = Vec::new();

    for (starter, outcome) in traced {
        match outcome {
            Ok(chain) if chain.is_empty() => {
                log::debug!("starter {} has no quest record, skipping", starter);
            }
            Ok(chain) => {
                let signature = chain.signature();
                if seen.insert(signature.clone()) {
                    chains.push(chain);
                } else {
                    log::debug!("starter {} repeats chain {}", starter, signature);
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Failed to trace chain for quest {}: {}", starter, e);
            }
        }
    }

    chains.sort_by(|a, b| b.total_quests().cmp(&a.total_quests()));
    Ok(chains)
}
