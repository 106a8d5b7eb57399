use clap::Parser;
use questchain::db::{migrate, Db};
use questchain::zone::{derive_zone_boundaries, store_zone_boundaries};
use questchain::Config;
use std::path::Path;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "boundaries")]
#[command(about = "Derive zone bounding boxes from quest giver spawns and store them")]
struct Args {
    /// Skip zones with fewer distinct quests than this
    #[arg(short, long, default_value_t = 1)]
    min_quests: u32,

    /// Print the derived rectangles without writing them
    #[arg(short, long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    let config = Config::load()?;
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    let derived = derive_zone_boundaries(&db, args.min_quests).await?;

    println!(
        "{:>6} {:>5} {:>10} {:>10} {:>10} {:>10} {:>7}",
        "zone", "map", "min_x", "max_x", "min_y", "max_y", "quests"
    );
    println!("{:-<64}", "");
    for d in &derived {
        let (min_x, max_x, min_y, max_y) = d.boundary.rect();
        println!(
            "{:>6} {:>5} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>7}",
            d.boundary.zone_id(),
            d.boundary.map_id(),
            min_x,
            max_x,
            min_y,
            max_y,
            d.quest_count
        );
    }

    if args.dry_run {
        log::info!("Dry run: {} boundaries not written", derived.len());
        return Ok(());
    }

    let written = store_zone_boundaries(&db, derived).await?;
    log::info!(
        "Stored {} zone boundaries at {}",
        written,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
