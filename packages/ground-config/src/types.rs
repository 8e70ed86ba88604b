use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retry: Retry,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub coverage: Coverage,
	#[serde(default)]
	pub rerank: Rerank,
	#[serde(default)]
	pub evidence: Evidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub api_key: Option<String>,
	#[serde(default = "default_qdrant_timeout_ms")]
	pub timeout_ms: u64,
	pub collections: Vec<Collection>,
}

/// One independently indexed content collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
	pub name: String,
	/// `doc` or `code`.
	pub content_type: String,
	/// Named dense vector inside the collection.
	pub dense_vector: String,
	/// Which dense embedding space produces the query vector: `docs` or `code`.
	pub dense_space: String,
	/// Named sparse vector inside the collection.
	pub sparse_vector: String,
	/// Lexical method identity used when the collection was ingested.
	pub sparse_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Providers {
	pub embedding_docs: EmbeddingProviderConfig,
	pub embedding_code: EmbeddingProviderConfig,
	pub sparse: ProviderConfig,
	pub rerank: RerankProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default = "default_input_type")]
	pub input_type: String,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	#[serde(default = "default_rerank_timeout_ms")]
	pub timeout_ms: u64,
	/// Provider-side ceiling on the tokens of a single rerank call.
	#[serde(default = "default_rerank_max_total_tokens")]
	pub max_total_tokens: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, base_backoff_ms: 200, max_backoff_ms: 2_000 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Search {
	pub prefetch_dense: u32,
	pub prefetch_sparse: u32,
	pub collection_limit: u32,
	pub widened_collection_limit: u32,
	/// `rrf` or `dbsf`.
	pub fusion: String,
	pub hnsw_ef: u64,
	pub exact: bool,
	/// Below this many merged candidates the expanded query variants are searched too.
	pub min_primary_candidates: u32,
	pub max_query_variants: u32,
	pub domain_phrase: String,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			prefetch_dense: 80,
			prefetch_sparse: 120,
			collection_limit: 60,
			widened_collection_limit: 90,
			fusion: "rrf".to_string(),
			hnsw_ef: 256,
			exact: false,
			min_primary_candidates: 24,
			max_query_variants: 3,
			domain_phrase: "API documentation and source code".to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Coverage {
	pub min_doc: u32,
	pub min_code: u32,
	pub rerank_pool_max: u32,
}
impl Default for Coverage {
	fn default() -> Self {
		Self { min_doc: 3, min_code: 3, rerank_pool_max: 180 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rerank {
	pub enabled: bool,
	pub batch_size: u32,
	pub max_doc_tokens: u32,
	pub truncation: bool,
	pub tokenizer_repo: Option<String>,
	pub instructions: RerankInstructions,
}
impl Default for Rerank {
	fn default() -> Self {
		Self {
			enabled: true,
			batch_size: 60,
			max_doc_tokens: 512,
			truncation: true,
			tokenizer_repo: None,
			instructions: RerankInstructions::default(),
		}
	}
}

/// Optional per-mode overrides of the built-in rerank instructions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankInstructions {
	pub build: Option<String>,
	pub debug: Option<String>,
	pub explain: Option<String>,
	pub refactor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Evidence {
	pub top_k: u32,
	pub buffer_k: u32,
}
impl Default for Evidence {
	fn default() -> Self {
		Self { top_k: 12, buffer_k: 20 }
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_qdrant_timeout_ms() -> u64 {
	10_000
}

fn default_input_type() -> String {
	"query".to_string()
}

fn default_rerank_timeout_ms() -> u64 {
	20_000
}

fn default_rerank_max_total_tokens() -> u32 {
	120_000
}
