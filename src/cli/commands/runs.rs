use crate::config::Config;
use crate::db::Store;

pub async fn cmd_runs(config: &Config, limit: u64) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let runs = store.recent_sync_runs(limit).await?;

    if runs.is_empty() {
        println!("No sync runs recorded.");
        return Ok(());
    }

    println!("Recent Sync Runs (last {}):", runs.len());
    println!("{:-<70}", "");

    for run in runs {
        println!(
            "• {} {} via {} - {}",
            run.started_at, run.content_type, run.source, run.status
        );
        println!(
            "  processed {} | created {} | updated {} | errors {} | pages {} | {} ms",
            run.processed,
            run.created,
            run.updated,
            run.error_count,
            run.pages_fetched,
            run.duration_ms
        );
    }

    Ok(())
}
