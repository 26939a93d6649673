// src/state.rs
// Application state shared across the HTTP boundary and the scheduler

use std::sync::Arc;
use tracing::info;

use crate::agent::SqlAgent;
use crate::cache::{Cache, MemoryBackend, RedisBackend};
use crate::catalog::SchemaCatalog;
use crate::config::Config;
use crate::connector::{PostgresConnector, SqlConnector};
use crate::dispatch::{Classifier, Dispatcher, ResultStore};
use crate::llm::{ChatCompleter, LmClient};
use crate::session::ConversationMemory;

pub struct AppState {
    pub config: Config,
    pub cache: Cache,
    pub connector: Arc<dyn SqlConnector>,
    pub catalog: Arc<SchemaCatalog>,
    pub memory: ConversationMemory,
    pub lm: Arc<dyn ChatCompleter>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wire the production object graph from config.
    pub async fn initialize(config: Config) -> anyhow::Result<Arc<Self>> {
        let cache = match &config.cache.redis_url {
            Some(url) => {
                info!("Using Redis cache backend");
                Cache::new(Arc::new(RedisBackend::connect(url).await?))
            }
            None => {
                info!("REDIS_URL not set, using in-process cache backend");
                Cache::new(Arc::new(MemoryBackend::new(config.cache.memory_max_entries)))
            }
        };

        let connector: Arc<dyn SqlConnector> =
            Arc::new(PostgresConnector::connect(&config.database).await?);

        let catalog = Arc::new(SchemaCatalog::new(
            connector.clone(),
            cache.clone(),
            config.cache.schema_cache_ttl_secs,
        ));

        let memory = ConversationMemory::new(cache.clone(), &config.session);

        let lm: Arc<dyn ChatCompleter> =
            Arc::new(LmClient::new(config.llm.clone(), cache.clone())?);

        let agent = Arc::new(SqlAgent::new(
            lm.clone(),
            connector.clone(),
            catalog.clone(),
            memory.clone(),
            cache.clone(),
            config.agent.clone(),
            &config.cache,
            &config.session,
        ));

        let results = ResultStore::new(cache.clone(), config.dispatch.result_ttl_secs);

        let classifier = if config.dispatch.classifier_enabled {
            Classifier::with_lm(lm.clone())
        } else {
            Classifier::standard_only()
        };

        let dispatcher = Dispatcher::start(config.dispatch.clone(), agent, results, classifier);

        Ok(Arc::new(Self {
            config,
            cache,
            connector,
            catalog,
            memory,
            lm,
            dispatcher,
        }))
    }
}
