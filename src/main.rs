use questchain::chain::ChainResolver;
use questchain::db::{migrate, Db};
use questchain::error::QuestchainError;
use questchain::mcp::{HttpMcpServer, McpServer};
use questchain::Config;
use std::path::Path;
use std::sync::Arc;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides questchain.log_level
    let default_level = Config::load()
        .map(|c| c.questchain.log_level)
        .unwrap_or_else(|_| "info".to_string());

    // stderr only; stdout belongs to the MCP stdio transport
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", default_level)
    ).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_mcp_server().await?,
        "serve-http" => run_http_server().await?,
        "verify" => run_schema_verification().await?,
        other => {
            log::warn!("Unknown command '{}', running verify", other);
            run_schema_verification().await?;
        }
    }

    Ok(())
}

/// Apply pending migrations through a writable handle, then build the resolver
async fn prepare(config: &Config) -> Result<Arc<ChainResolver>> {
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    let resolver = ChainResolver::from_config(config).await?;
    Ok(Arc::new(resolver))
}

/// Run MCP server (stdio transport)
async fn run_mcp_server() -> Result<()> {
    let config = Config::load()?;
    let resolver = prepare(&config).await?;

    McpServer::new(resolver).run().await?;
    Ok(())
}

/// Run HTTP server (MCP over POST plus browse API)
async fn run_http_server() -> Result<()> {
    log::info!("Starting Questchain HTTP Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let resolver = prepare(&config).await?;
    log::info!("Database initialized successfully");

    let http_server = HttpMcpServer::new(resolver, &config);
    http_server.run(config.http_server.port).await?;
    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    log::info!("Starting Questchain v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Database path: {}", config.db_path().display());
    log::info!(
        "Chains: max_starters={}, trace_concurrency={}",
        config.chains.max_starters,
        config.chains.trace_concurrency
    );

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    let applied = db
        .with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;
    log::info!("Database initialized successfully ({} migrations applied)", applied);

    verify_database_schema(&db).await?;
    Ok(())
}

/// Verify that all expected database objects exist and report row counts
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = [
            "creature",
            "creature_queststarter",
            "quest_template",
            "quest_template_addon",
            "schema_migrations",
            "zone_boundaries",
        ];
        let mut all_tables_exist = true;
        for table in &expected_tables {
            if tables.iter().any(|t| t == table) {
                log::debug!("✓ Table exists: {}", table);
            } else {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            }
        }
        if !all_tables_exist {
            return Err(QuestchainError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::applied_versions(conn)?;
        match applied.iter().next_back() {
            Some((version, name)) => log::info!("✓ Schema at version {} ({})", version, name),
            None => log::warn!("No schema migrations recorded"),
        }

        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")?;
        let indexes: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        for index_name in ["idx_quest_addon_prev", "idx_creature_zone", "idx_creature_map_position"] {
            if indexes.iter().any(|i| i == index_name) {
                log::debug!("✓ Index exists: {}", index_name);
            } else {
                log::warn!("Index not found: {} (chain queries will scan)", index_name);
            }
        }

        for table in ["quest_template", "creature", "creature_queststarter", "zone_boundaries"] {
            let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            log::info!("{}: {} rows", table, count);
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(QuestchainError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
