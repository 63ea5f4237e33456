// Print the newest persisted sample.
//
// Usage: pimonitor-status [DB_PATH]
//   DB_PATH  default: persistence.path from $CONFIG_FILE (config.toml)
//
// Opens the database read-only; an unreadable database is reported, never moved aside
// (the daemon may own it).

use pimonitor::config::AppConfig;
use pimonitor::history_repo::HistoryRepo;
use pimonitor::query::status;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let args: Vec<String> = env::args().collect();
    let path = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| config.persistence.path.clone());

    if !std::path::Path::new(&path).exists() {
        println!("History database not found: {}", path);
        return Ok(());
    }

    let repo = match HistoryRepo::connect_read_only(&path).await {
        Ok(repo) => repo,
        Err(e) => {
            println!("Error: {}", e);
            return Ok(());
        }
    };
    let latest = repo.load_latest().await;
    repo.close().await;
    match latest {
        Ok(Some(sample)) => print!("{}", status::render(&sample)),
        Ok(None) => println!("No data available"),
        Err(e) => println!("Error: {}", e),
    }
    Ok(())
}
