pub mod cache;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod store;
pub mod zone;

pub use chain::{ChainResolver, QuestChain, QuestId, QuestRecord, ResolverOptions};
pub use config::Config;
pub use error::{QuestchainError, Result};
pub use store::QuestStore;
pub use zone::{ZoneBoundary, ZoneId};
