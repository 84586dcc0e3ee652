use crate::config::Config;
use crate::domain::SourceKind;
use crate::state::SharedState;

pub async fn cmd_repair(
    config: Config,
    source: Option<SourceKind>,
    limit: u64,
) -> anyhow::Result<()> {
    let source = source.unwrap_or(config.sync.default_source);
    let state = SharedState::new(config).await?;

    let incomplete = state.repair_service.find_incomplete(None).await?;
    if incomplete.is_empty() {
        println!("No incomplete titles.");
        return Ok(());
    }
    println!("{} incomplete title(s) found", incomplete.len());

    let report = state.repair_service.repair(source, limit).await?;
    println!(
        "Repaired {} of {} examined ({} missing upstream, {} failed)",
        report.repaired, report.examined, report.missing_upstream, report.failed
    );
    if report.timed_out {
        println!("Stopped at the run deadline; run again to continue.");
    }
    for error in &report.errors {
        println!("  ! {error}");
    }

    Ok(())
}
