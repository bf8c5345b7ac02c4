mod config;
mod db;
mod documents;
mod embedding;
mod errors;
mod extraction;
mod graph;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod state;
mod taxonomy;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, DocumentSourceConfig, EmbeddingProvider, S3Config};
use crate::db::create_pool;
use crate::documents::{DocumentSource, JsonFileDocumentSource, PgDocumentSource};
use crate::embedding::{Embedder, HashingEmbedder, OllamaEmbedder};
use crate::extraction::{
    CheckpointStore, ExtractionCache, ExtractionCoordinator, LlmSkillExtractor,
    MemoryExtractionCache, RedisExtractionCache,
};
use crate::graph::{PgTaxonomyStore, TaxonomyStore};
use crate::llm_client::LlmClient;
use crate::pipeline::{ArtifactExporter, Pipeline, RunRegistry};
use crate::routes::build_router;
use crate::state::AppState;
use crate::taxonomy::canonicalize::Canonicalizer;
use crate::taxonomy::resolution::Resolver;
use crate::taxonomy::snapshot::{SnapshotHandle, TaxonomySnapshot};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or invalid env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting skill taxonomy service v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn TaxonomyStore> = Arc::new(PgTaxonomyStore::new(db.clone()));

    // Extraction dedup cache: Redis when configured, in-process otherwise
    let cache: Arc<dyn ExtractionCache> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Extraction cache: Redis");
            Arc::new(RedisExtractionCache::new(client))
        }
        None => {
            info!("Extraction cache: in-process (REDIS_URL not set)");
            Arc::new(MemoryExtractionCache::new())
        }
    };

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.llm_timeout())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let embedder: Arc<dyn Embedder> = match config.embedding.provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.embedding.dim)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
            config.embedding.ollama_url.clone(),
            config.embedding.model.clone(),
            config.embedding.dim,
            config.llm_timeout(),
        )?),
    };
    info!(
        "Embedder: {} ({} dimensions)",
        embedder.model_name(),
        embedder.dimension()
    );

    let source: Arc<dyn DocumentSource> = match &config.document_source {
        DocumentSourceConfig::Postgres => Arc::new(PgDocumentSource::new(db.clone())),
        DocumentSourceConfig::File(path) => Arc::new(JsonFileDocumentSource::new(path.clone())),
    };

    let artifacts = match &config.s3 {
        Some(s3) => {
            info!("Run artifacts will be exported to s3://{}", s3.bucket);
            Some(ArtifactExporter::new(build_s3_client(s3).await, &s3.bucket))
        }
        None => {
            info!("S3 not configured; run artifacts are not exported");
            None
        }
    };

    // Serve whatever the store already holds until the next run replaces it
    let snapshot = match store.load_skills().await {
        Ok(skills) => SnapshotHandle::new(TaxonomySnapshot::new(skills)),
        Err(e) => {
            warn!("Could not load persisted taxonomy, starting empty: {e}");
            SnapshotHandle::new(TaxonomySnapshot::empty())
        }
    };

    let coordinator = ExtractionCoordinator::new(
        Arc::new(LlmSkillExtractor::new(llm, config.min_mention_confidence)),
        cache,
        CheckpointStore::new(&config.checkpoint_dir),
        config.extraction_settings(),
    );
    let pipeline = Arc::new(Pipeline::new(
        source,
        store.clone(),
        coordinator,
        Canonicalizer::new(embedder.clone(), config.canonicalize_settings()),
        embedder.clone(),
        config.embedding.concurrency,
        snapshot.clone(),
        artifacts,
    ));
    let resolver = Arc::new(Resolver::new(
        embedder.clone(),
        config.semantic_match_threshold,
        config.embedding.concurrency,
    ));

    // Build app state
    let state = AppState {
        db,
        store,
        embedder,
        resolver,
        snapshot,
        pipeline,
        runs: RunRegistry::new(),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(s3: &S3Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &s3.access_key_id,
        &s3.secret_access_key,
        None,
        None,
        "taxonomy-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&s3.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
