use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::clients::{AnilistClient, CatalogSources, JikanClient, build_http_client};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    RepairService, SeaOrmUpsertService, SyncService, SyncSettings, UpsertService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub sources: CatalogSources,

    pub upserter: Arc<dyn UpsertService>,

    pub sync_service: Arc<SyncService>,

    pub repair_service: Arc<RepairService>,
}

impl SharedState {
    /// Opens the configured database and wires the real catalog adapters.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        // One pooled client for every adapter; its timeout bounds each call.
        let http_client =
            build_http_client(config.sync.request_timeout_seconds, &config.sync.user_agent)?;

        let sources = CatalogSources::new()
            .with(Arc::new(AnilistClient::with_shared_client(
                http_client.clone(),
                config.anilist.endpoint.clone(),
            )))
            .with(Arc::new(JikanClient::with_shared_client(
                http_client,
                config.jikan.base_url.clone(),
            )));

        Ok(Self::with_parts(config, store, sources))
    }

    /// Wires services over an already opened store and an explicit set of
    /// sources.
    #[must_use]
    pub fn with_parts(config: Config, store: Store, sources: CatalogSources) -> Self {
        let upserter =
            Arc::new(SeaOrmUpsertService::new(store.clone())) as Arc<dyn UpsertService>;

        let settings = SyncSettings::from_config(&config);
        let page_delay = Duration::from_millis(config.sync.page_delay_ms);
        let run_timeout = settings.run_timeout;

        let sync_service = Arc::new(SyncService::new(
            sources.clone(),
            upserter.clone(),
            store.clone(),
            settings,
        ));

        let repair_service = Arc::new(RepairService::new(
            sources.clone(),
            upserter.clone(),
            store.clone(),
            page_delay,
            run_timeout,
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            store,
            sources,
            upserter,
            sync_service,
            repair_service,
        }
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
