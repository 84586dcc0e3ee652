use crate::config::Config;
use crate::domain::{ContentType, SourceKind};
use crate::services::SyncRequest;
use crate::state::SharedState;

pub async fn cmd_sync(
    config: Config,
    content_type: ContentType,
    max_pages: u32,
    start_page: Option<u32>,
    source: Option<SourceKind>,
) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    let report = state
        .sync_service
        .run(SyncRequest {
            content_type,
            max_pages,
            start_page,
            source,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        anyhow::bail!("Sync run {} ended with status {}", report.run_id, report.status.as_str());
    }
    Ok(())
}
