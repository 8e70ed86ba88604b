mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Collection, Config, Coverage, EmbeddingProviderConfig, Evidence, ProviderConfig, Providers,
	Qdrant, Rerank, RerankInstructions, RerankProviderConfig, Retry, Search, Service, Storage,
};

use std::{env, fs, path::Path};

use regex::{Captures, Regex};

pub const CONTENT_TYPES: [&str; 2] = ["doc", "code"];
pub const DENSE_SPACES: [&str; 2] = ["docs", "code"];
pub const FUSION_METHODS: [&str; 2] = ["rrf", "dbsf"];
/// Sparse provider id meaning the vector store embeds query text itself.
pub const STORE_SIDE_SPARSE_PROVIDER: &str = "qdrant";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let raw = substitute_vars(&raw, |name| env::var(name).ok());
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

/// Replaces every `${NAME}` with the looked-up value; unknown names become empty strings.
pub fn substitute_vars<F>(raw: &str, lookup: F) -> String
where
	F: Fn(&str) -> Option<String>,
{
	let Ok(pattern) = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") else {
		return raw.to_string();
	};

	pattern.replace_all(raw, |caps: &Captures| lookup(&caps[1]).unwrap_or_default()).into_owned()
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation { message: "storage.qdrant.url must be non-empty.".to_string() });
	}
	if cfg.storage.qdrant.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collections.is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collections must be non-empty.".to_string(),
		});
	}

	let mut seen = Vec::with_capacity(cfg.storage.qdrant.collections.len());

	for collection in &cfg.storage.qdrant.collections {
		if collection.name.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.collections.name must be non-empty.".to_string(),
			});
		}
		if seen.contains(&collection.name.as_str()) {
			return Err(Error::Validation {
				message: format!("Collection {:?} is configured more than once.", collection.name),
			});
		}

		seen.push(collection.name.as_str());

		if !CONTENT_TYPES.contains(&collection.content_type.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"Collection {:?} content_type must be one of doc or code.",
					collection.name
				),
			});
		}
		if !DENSE_SPACES.contains(&collection.dense_space.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"Collection {:?} dense_space must be one of docs or code.",
					collection.name
				),
			});
		}
		if collection.dense_vector.trim().is_empty() || collection.sparse_vector.trim().is_empty()
		{
			return Err(Error::Validation {
				message: format!(
					"Collection {:?} must name both its dense and sparse vectors.",
					collection.name
				),
			});
		}
		if collection.sparse_model != cfg.providers.sparse.model {
			return Err(Error::Validation {
				message: format!(
					"Collection {:?} was ingested with sparse model {:?} but providers.sparse.model is {:?}.",
					collection.name, collection.sparse_model, cfg.providers.sparse.model
				),
			});
		}
	}

	for (label, provider) in [
		("embedding_docs", &cfg.providers.embedding_docs),
		("embedding_code", &cfg.providers.embedding_code),
	] {
		if provider.dimensions == 0 {
			return Err(Error::Validation {
				message: format!("providers.{label}.dimensions must be greater than zero."),
			});
		}
		if provider.timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("providers.{label}.timeout_ms must be greater than zero."),
			});
		}
	}

	if cfg.providers.sparse.timeout_ms == 0 || cfg.providers.rerank.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "Provider timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.rerank.max_total_tokens == 0 {
		return Err(Error::Validation {
			message: "providers.rerank.max_total_tokens must be greater than zero.".to_string(),
		});
	}

	let sparse_is_remote = cfg.providers.sparse.provider_id != STORE_SIDE_SPARSE_PROVIDER;

	for (label, key, required) in [
		("embedding_docs", &cfg.providers.embedding_docs.api_key, true),
		("embedding_code", &cfg.providers.embedding_code.api_key, true),
		("sparse", &cfg.providers.sparse.api_key, sparse_is_remote),
		("rerank", &cfg.providers.rerank.api_key, true),
	] {
		if required && key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	for (label, rpm) in [
		("embedding_docs", cfg.providers.embedding_docs.requests_per_minute),
		("embedding_code", cfg.providers.embedding_code.requests_per_minute),
		("sparse", cfg.providers.sparse.requests_per_minute),
		("rerank", cfg.providers.rerank.requests_per_minute),
	] {
		if rpm == Some(0) {
			return Err(Error::Validation {
				message: format!(
					"providers.{label}.requests_per_minute must be greater than zero when set."
				),
			});
		}
	}

	if !(1..=3).contains(&cfg.retry.max_attempts) {
		return Err(Error::Validation {
			message: "retry.max_attempts must be in the range 1-3.".to_string(),
		});
	}
	if cfg.retry.max_backoff_ms < cfg.retry.base_backoff_ms {
		return Err(Error::Validation {
			message: "retry.max_backoff_ms must be at least retry.base_backoff_ms.".to_string(),
		});
	}
	if !FUSION_METHODS.contains(&cfg.search.fusion.as_str()) {
		return Err(Error::Validation {
			message: "search.fusion must be one of rrf or dbsf.".to_string(),
		});
	}
	if cfg.search.prefetch_dense == 0 || cfg.search.prefetch_sparse == 0 {
		return Err(Error::Validation {
			message: "search prefetch limits must be greater than zero.".to_string(),
		});
	}
	if cfg.search.collection_limit == 0 {
		return Err(Error::Validation {
			message: "search.collection_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.widened_collection_limit <= cfg.search.collection_limit {
		return Err(Error::Validation {
			message: "search.widened_collection_limit must be greater than search.collection_limit."
				.to_string(),
		});
	}
	if cfg.search.max_query_variants > 3 {
		return Err(Error::Validation {
			message: "search.max_query_variants must be 3 or less.".to_string(),
		});
	}
	if cfg.coverage.rerank_pool_max == 0 {
		return Err(Error::Validation {
			message: "coverage.rerank_pool_max must be greater than zero.".to_string(),
		});
	}
	if cfg.rerank.batch_size == 0 {
		return Err(Error::Validation {
			message: "rerank.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.rerank.max_doc_tokens == 0 {
		return Err(Error::Validation {
			message: "rerank.max_doc_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.evidence.top_k == 0 {
		return Err(Error::Validation {
			message: "evidence.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.evidence.buffer_k < cfg.evidence.top_k {
		return Err(Error::Validation {
			message: "evidence.buffer_k must be at least evidence.top_k.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.storage.qdrant.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.storage.qdrant.api_key = None;
	}
	if cfg.rerank.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false) {
		cfg.rerank.tokenizer_repo = None;
	}

	let instructions = &mut cfg.rerank.instructions;

	for slot in [
		&mut instructions.build,
		&mut instructions.debug,
		&mut instructions.explain,
		&mut instructions.refactor,
	] {
		if slot.as_deref().map(|text| text.trim().is_empty()).unwrap_or(false) {
			*slot = None;
		}
	}
}
