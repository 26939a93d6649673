// tests/common/mod.rs
// Shared fixtures for the end-to-end scenarios

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use askdb::agent::SqlAgent;
use askdb::cache::Cache;
use askdb::catalog::SchemaCatalog;
use askdb::config::{AgentConfig, CacheConfig, DispatchConfig, PoolConfig, SessionConfig};
use askdb::dispatch::{Classifier, Dispatcher, ResultRecord, ResultStore};
use askdb::llm::ChatCompleter;
use askdb::session::ConversationMemory;
use askdb::testing::{MockConnector, MockLm};

pub struct Harness {
    pub lm: Arc<MockLm>,
    pub connector: Arc<MockConnector>,
    pub cache: Cache,
    pub memory: ConversationMemory,
    pub dispatcher: Arc<Dispatcher>,
    pub results: ResultStore,
}

pub fn pool(workers: usize, soft_secs: u64, hard_secs: u64) -> PoolConfig {
    PoolConfig {
        workers,
        soft_limit_secs: soft_secs,
        hard_limit_secs: hard_secs,
    }
}

/// Dispatcher tuning for tests: small pools, fast retries.
pub fn dispatch_config(max_retries: u32, soft_secs: u64, hard_secs: u64) -> DispatchConfig {
    DispatchConfig {
        simple: pool(1, soft_secs, hard_secs),
        standard: pool(2, soft_secs, hard_secs),
        complex: pool(1, soft_secs, hard_secs),
        prefetch_multiplier: 2,
        max_tasks_per_child: 0,
        max_retries,
        retry_base_ms: 10,
        classifier_enabled: false,
        max_question_bytes: 4_096,
        result_ttl_secs: 3_600,
    }
}

pub fn agent_config(correction_max_attempts: u32) -> AgentConfig {
    AgentConfig {
        generation_temperature: 0.0,
        summary_temperature: 0.3,
        suggestion_temperature: 0.5,
        correction_max_attempts,
        read_only_enforced: true,
        statement_timeout_secs: 20,
        max_suggestions: 5,
        expose_sql_on_error: false,
    }
}

pub fn session_config(history_limit: usize) -> SessionConfig {
    SessionConfig {
        ttl_secs: 86_400,
        history_limit,
        context_window: history_limit,
    }
}

pub fn cache_config() -> CacheConfig {
    CacheConfig {
        redis_url: None,
        query_cache_ttl_secs: 300,
        schema_cache_ttl_secs: 3_600,
        suggestion_cache_ttl_secs: 300,
        memory_max_entries: 10_000,
    }
}

/// The `users(id, name, created_at)` schema every scenario shares.
pub fn users_connector() -> Arc<MockConnector> {
    Arc::new(MockConnector::new().with_table(
        "users",
        vec![
            ("id", "int", false, None),
            ("name", "text", true, None),
            ("created_at", "timestamp", true, None),
        ],
    ))
}

/// Full harness over the scripted LM stub.
pub fn harness(history_limit: usize, dispatch: DispatchConfig) -> Harness {
    let lm = Arc::new(MockLm::new());
    let connector = users_connector();
    harness_with_lm(lm.clone(), connector.clone(), history_limit, dispatch, 3)
        .attach(lm, connector)
}

/// Harness over an arbitrary completer (used by the circuit-breaker
/// scenario, which needs the real `LmClient`).
pub fn build_dispatcher(
    lm: Arc<dyn ChatCompleter>,
    connector: Arc<MockConnector>,
    history_limit: usize,
    dispatch: DispatchConfig,
    correction_max_attempts: u32,
) -> (Cache, ConversationMemory, Arc<Dispatcher>, ResultStore) {
    let cache = Cache::in_memory(10_000);
    let catalog = Arc::new(SchemaCatalog::new(connector.clone(), cache.clone(), 3_600));
    let memory = ConversationMemory::new(cache.clone(), &session_config(history_limit));

    let agent = Arc::new(SqlAgent::new(
        lm,
        connector,
        catalog,
        memory.clone(),
        cache.clone(),
        agent_config(correction_max_attempts),
        &cache_config(),
        &session_config(history_limit),
    ));

    let results = ResultStore::new(cache.clone(), 3_600);
    let dispatcher = Dispatcher::start(dispatch, agent, results.clone(), Classifier::standard_only());

    (cache, memory, dispatcher, results)
}

struct PartialHarness {
    cache: Cache,
    memory: ConversationMemory,
    dispatcher: Arc<Dispatcher>,
    results: ResultStore,
}

impl PartialHarness {
    fn attach(self, lm: Arc<MockLm>, connector: Arc<MockConnector>) -> Harness {
        Harness {
            lm,
            connector,
            cache: self.cache,
            memory: self.memory,
            dispatcher: self.dispatcher,
            results: self.results,
        }
    }
}

fn harness_with_lm(
    lm: Arc<MockLm>,
    connector: Arc<MockConnector>,
    history_limit: usize,
    dispatch: DispatchConfig,
    correction_max_attempts: u32,
) -> PartialHarness {
    let (cache, memory, dispatcher, results) =
        build_dispatcher(lm, connector, history_limit, dispatch, correction_max_attempts);

    PartialHarness {
        cache,
        memory,
        dispatcher,
        results,
    }
}

/// Script the four happy-path LM replies for "How many users?".
pub fn script_happy_path(lm: &MockLm) {
    lm.push("[\"users\"]");
    lm.push("SELECT COUNT(*) FROM users;");
    lm.push("There are 3 users.");
    lm.push("[\"Top 5 recent users?\", \"Users per month?\"]");
}

/// Poll until the record is terminal or the deadline passes.
pub async fn wait_terminal(
    dispatcher: &Dispatcher,
    job_id: &str,
    deadline: Duration,
) -> ResultRecord {
    let started = tokio::time::Instant::now();

    loop {
        if let Ok(record) = dispatcher.poll(job_id).await {
            if record.is_terminal() {
                return record;
            }
        }

        if started.elapsed() > deadline {
            panic!("job {} did not reach a terminal state within {:?}", job_id, deadline);
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
