//! Medway Server
//!
//! Dispatcher binary: loads configuration, wires the decision pipeline and
//! serves the HTTP API until ctrl-c.

use anyhow::Context;
use clap::Parser;
use medway_config::{ConfigStore, ModelResolver};
use medway_core::io::IoContext;
use medway_core::{init_telemetry, HttpClient, ReqwestHttpClient, TelemetryConfig};
use medway_decision::{
    DecisionPipeline, MemoryAgentRegistry, MemoryRuleSource, PipelineDeps, RuleCache, RuleSource,
    RULE_RELOAD_INTERVAL_MS_DEFAULT,
};
use medway_gateway::{HttpEmbedder, HttpLlmGateway, HttpReranker, MilvusConfig, MilvusVectorSearch};
use medway_memory::SessionMemoryManager;
use medway_registry::{InstanceRecord, RegistryTasks, ServiceRegistry};
use medway_server::backends;
use medway_server::bootstrap::seed_system_models;
use medway_server::{router, AppState, ServerConfig};
use std::sync::Arc;
use tokio::sync::watch;

/// Medway server CLI
#[derive(Parser, Debug)]
#[command(name = "medway-server")]
#[command(about = "Medway multi-agent dispatcher")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "medway.json")]
    config: String,

    /// Bind address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    init_telemetry(&TelemetryConfig::from_env().with_log_level(filter))?;

    let mut config = ServerConfig::from_file(&cli.config)?;
    config.apply_env()?;
    if let Some(bind) = cli.bind {
        config.core.node.bind_address = bind;
    }
    config.validate()?;

    let node = config.core.node.clone();
    tracing::info!(agent_code = %node.agent_code, config = %cli.config, bind = %node.bind_address, "Medway server starting");

    let io = IoContext::production();
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    tracing::info!(
        coordination = ?config.backends.coordination,
        cache = ?config.backends.cache,
        messages = ?config.backends.messages,
        "Storage backends"
    );
    let store = backends::coordination_store(&config.backends, http.clone(), &io);
    seed_system_models(store.as_ref(), &config.system_models).await?;

    // Configuration and model endpoints
    let config_store = Arc::new(
        ConfigStore::new(
            store.clone(),
            &node.agent_code,
            config.defaults_by_key(),
            Vec::new(),
            io.time.clone(),
        )
        .with_watch_retry_delay_ms(config.core.registry.watch_retry_delay_ms),
    );
    let resolver = Arc::new(ModelResolver::new(config_store.clone()));

    // Registry
    let registry = Arc::new(ServiceRegistry::new(store.clone(), config.core.registry.clone(), io.time.clone()));
    let cached = registry.load_all().await?;
    tracing::info!(count = cached, "Instances loaded");
    let record = InstanceRecord::new(&node.agent_code, &node.advertise_ip, node.advertise_port)
        .with_version(&node.version)
        .with_name(&node.agent_name);
    let registry_tasks = RegistryTasks::start(registry.clone(), Some(record));

    // Model gateways
    let mut milvus = MilvusConfig::new(&config.vector_store.url)
        .with_timeout_ms(config.core.decision.vector_search_timeout_ms);
    milvus.token = config.vector_store.token.clone();
    if milvus.url.is_empty() {
        tracing::warn!("Vector store url is empty, dispatch past layer 3 will fail");
    }

    // Session memory
    let memory = Arc::new(SessionMemoryManager::new(
        config.core.memory.clone(),
        &config.core.lock_table,
        backends::cache_layer(&config.backends, &io).await?,
        backends::message_store(&config.backends, &io).await?,
        io.clone(),
    ));

    // Rules
    let rule_source: Arc<dyn RuleSource> = Arc::new(MemoryRuleSource::new(config.fast_rules.clone()));
    let rules = Arc::new(RuleCache::new());
    let loaded = rules.reload(rule_source.as_ref()).await?;
    tracing::info!(count = loaded, "Fast rules loaded");

    let pipeline = DecisionPipeline::new(
        PipelineDeps {
            rules: rules.clone(),
            llm: Arc::new(HttpLlmGateway::with_http_client(http.clone())),
            embedder: Arc::new(HttpEmbedder::new(http.clone())),
            reranker: Arc::new(HttpReranker::new(http.clone())),
            search: Arc::new(MilvusVectorSearch::new(milvus, http)),
            resolver,
            registry: Arc::new(MemoryAgentRegistry::new(config.agents.clone())),
            memory,
        },
        config.core.decision.clone(),
    );
    let state = AppState::new(&node.agent_code, pipeline, registry, io.time.clone());

    // Background loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config_task = {
        let config_store = config_store.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { config_store.run(shutdown).await })
    };
    let rules_task = {
        let time = io.time.clone();
        tokio::spawn(async move {
            rules
                .run_reload(rule_source, time, RULE_RELOAD_INTERVAL_MS_DEFAULT, shutdown_rx)
                .await
        })
    };

    let listener = tokio::net::TcpListener::bind(&node.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", node.bind_address))?;
    tracing::info!(address = %node.bind_address, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Ctrl-c handler failed");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    registry_tasks.join().await;
    for task in [config_task, rules_task] {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    tracing::info!("Medway server stopped");
    Ok(())
}
