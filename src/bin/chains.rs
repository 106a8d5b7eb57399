use clap::Parser;
use questchain::chain::{ChainResolver, ResolverOptions};
use questchain::zone::validate_zone_id;
use questchain::Config;
use std::time::Instant;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "chains")]
#[command(about = "Print the quest chains that start in a zone")]
struct Args {
    /// Zone identifier (e.g. 12 for Elwynn Forest)
    #[arg(allow_negative_numbers = true)]
    zone_id: i64,

    /// Override chains.max_starters from config.toml
    #[arg(long)]
    max_starters: Option<usize>,

    /// Print the raw JSON result instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "warn")
    ).init();

    let args = Args::parse();
    let zone_id = validate_zone_id(args.zone_id)?;

    let mut config = Config::load()?;
    if let Some(max_starters) = args.max_starters {
        if max_starters == 0 {
            anyhow::bail!("--max-starters must be greater than 0");
        }
        config.chains.max_starters = max_starters;
    }

    let resolver = ChainResolver::from_config(&config).await?;
    let ResolverOptions { max_starters, .. } = resolver.options().clone();

    let start = Instant::now();
    let chains = resolver.find_quest_chains_in_zone(zone_id).await?;
    let elapsed = start.elapsed();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&chains)?);
        return Ok(());
    }

    println!("\n=== Quest chains starting in zone {} ===\n", zone_id);
    if chains.is_empty() {
        println!("No quest chains found.");
    }

    for (idx, chain) in chains.iter().enumerate() {
        println!("{}. Chain from quest {} ({} quests)", idx + 1, chain.start_quest(), chain.total_quests());
        for node in chain.quests() {
            let level = node
                .quest
                .level_hint
                .map(|l| format!("[{}]", l))
                .unwrap_or_else(|| "[-]".to_string());
            println!("   {:indent$}{} {:>6} {}", "", level, node.quest.id, node.quest.title, indent = node.depth * 2);
        }
        println!();
    }

    println!("{:-<60}", "");
    println!(
        "{} chain(s) in {}ms (max {} starters)",
        chains.len(),
        elapsed.as_millis(),
        max_starters
    );
    Ok(())
}
