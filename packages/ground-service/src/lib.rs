pub mod pack;

mod balance;
mod budget;
mod embed;
mod error;
mod evidence;
mod remote;
mod rerank;
mod retrieve;
mod search;
mod snapshot;
mod tokens;

pub use error::{Error, Result};
pub use pack::{
	CollectionRequest, CoverageReport, Diagnostics, EvidenceItem, EvidencePack, PackStatus,
	QueryRequest, RerankMode, Stage, Warning, WarningKind,
};
pub use snapshot::redacted_config;

use std::{future::Future, pin::Pin, sync::Arc};

use tokenizers::Tokenizer;

use ground_config::{Config, EmbeddingProviderConfig, ProviderConfig, RerankProviderConfig};
use ground_domain::{RawHit, SparseVector};
use ground_providers::{
	embedding,
	rate_limit::RateLimiter,
	rerank::RerankOptions,
	sparse,
};
use ground_storage::{HybridQuery, qdrant::QdrantStore};

use crate::tokens::TokenCounter;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, ground_providers::Result<Vec<Vec<f32>>>>;
}

pub trait SparseEmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed_sparse<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, ground_providers::Result<Vec<SparseVector>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
		options: RerankOptions<'a>,
	) -> BoxFuture<'a, ground_providers::Result<Vec<f32>>>;
}

pub trait VectorStore
where
	Self: Send + Sync,
{
	fn hybrid_query<'a>(
		&'a self,
		query: &'a HybridQuery,
	) -> BoxFuture<'a, ground_storage::Result<Vec<RawHit>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub sparse: Arc<dyn SparseEmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		sparse: Arc<dyn SparseEmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
	) -> Self {
		Self { embedding, sparse, rerank }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), sparse: provider.clone(), rerank: provider }
	}
}

/// The retrieval core. Holds configuration and collaborators, never per-call state.
pub struct GroundService {
	pub cfg: Config,
	pub store: Arc<dyn VectorStore>,
	pub providers: Providers,
	tokens: TokenCounter,
	limiters: Limiters,
}
impl GroundService {
	pub fn new(cfg: Config, store: Arc<dyn VectorStore>) -> Self {
		Self::with_providers(cfg, store, Providers::default())
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn VectorStore>, providers: Providers) -> Self {
		let limiters = Limiters::new(&cfg);

		Self { cfg, store, providers, tokens: TokenCounter::Heuristic, limiters }
	}

	/// Connects to Qdrant and, when configured, loads the rerank tokenizer.
	pub fn from_config(cfg: Config) -> Result<Self> {
		let store = QdrantStore::new(&cfg.storage.qdrant)?;
		let tokenizer_repo = cfg.rerank.tokenizer_repo.clone();
		let mut service = Self::new(cfg, Arc::new(store));

		if let Some(repo) = tokenizer_repo {
			match Tokenizer::from_pretrained(&repo, None) {
				Ok(tokenizer) => service = service.with_tokenizer(tokenizer),
				Err(err) => tracing::warn!(
					error = %err,
					tokenizer_repo = %repo,
					"Failed to load rerank tokenizer. Falling back to estimated token counts."
				),
			}
		}

		Ok(service)
	}

	pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
		self.tokens = TokenCounter::Tokenizer(Arc::new(tokenizer));

		self
	}
}

/// One token bucket per remote provider, shared by every call on this service.
struct Limiters {
	embedding_docs: RateLimiter,
	embedding_code: RateLimiter,
	sparse: RateLimiter,
	rerank: RateLimiter,
}
impl Limiters {
	fn new(cfg: &Config) -> Self {
		let providers = &cfg.providers;

		Self {
			embedding_docs: RateLimiter::per_minute(
				"embedding_docs",
				providers.embedding_docs.requests_per_minute,
			),
			embedding_code: RateLimiter::per_minute(
				"embedding_code",
				providers.embedding_code.requests_per_minute,
			),
			sparse: RateLimiter::per_minute("sparse", providers.sparse.requests_per_minute),
			rerank: RateLimiter::per_minute("rerank", providers.rerank.requests_per_minute),
		}
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, ground_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl SparseEmbeddingProvider for DefaultProviders {
	fn embed_sparse<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, ground_providers::Result<Vec<SparseVector>>> {
		Box::pin(sparse::embed_sparse(cfg, texts))
	}
}

impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
		options: RerankOptions<'a>,
	) -> BoxFuture<'a, ground_providers::Result<Vec<f32>>> {
		Box::pin(ground_providers::rerank::rerank(cfg, query, docs, options))
	}
}

impl VectorStore for QdrantStore {
	fn hybrid_query<'a>(
		&'a self,
		query: &'a HybridQuery,
	) -> BoxFuture<'a, ground_storage::Result<Vec<RawHit>>> {
		Box::pin(QdrantStore::hybrid_query(self, query))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_providers_share_one_http_backend() {
		let providers = Providers::default();

		assert_eq!(Arc::strong_count(&providers.rerank), 3);
		assert_eq!(Arc::strong_count(&providers.embedding), 3);
	}
}
