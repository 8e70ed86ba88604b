//! Provider doubles. All are deterministic and count their calls.

use std::{
	collections::HashSet,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use ground_config::{EmbeddingProviderConfig, ProviderConfig, RerankProviderConfig};
use ground_domain::SparseVector;
use ground_providers::{Error as ProviderError, Result as ProviderResult, rerank::RerankOptions};
use ground_service::{
	BoxFuture, EmbeddingProvider, Providers, RerankProvider, SparseEmbeddingProvider,
};

use crate::hashing;

/// Hash embeddings salted by the configured model, so each dense space is distinct.
#[derive(Default)]
pub struct HashEmbedding {
	calls: AtomicUsize,
}
impl HashEmbedding {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, ProviderResult<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vectors = texts
			.iter()
			.map(|text| hashing::dense_vector(&cfg.model, cfg.dimensions as usize, text))
			.collect();

		Box::pin(async move { Ok(vectors) })
	}
}

#[derive(Default)]
pub struct HashSparse {
	calls: AtomicUsize,
}
impl HashSparse {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl SparseEmbeddingProvider for HashSparse {
	fn embed_sparse<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, ProviderResult<Vec<SparseVector>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vectors = texts.iter().map(|text| hashing::sparse_vector(text)).collect();

		Box::pin(async move { Ok(vectors) })
	}
}

/// Scores a document by the share of query words it contains. Independent per document, so
/// batching never changes the result.
#[derive(Default)]
pub struct LexicalRerank {
	batches: Mutex<Vec<usize>>,
}
impl LexicalRerank {
	pub fn score(query: &str, doc: &str) -> f32 {
		let query_words = hashing::words(query).into_iter().collect::<HashSet<_>>();

		if query_words.is_empty() {
			return 0.0;
		}

		let doc_words = hashing::words(doc).into_iter().collect::<HashSet<_>>();
		let shared = query_words.intersection(&doc_words).count();

		shared as f32 / query_words.len() as f32
	}

	/// Document count of each call received.
	pub fn batches(&self) -> Vec<usize> {
		self.batches.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl RerankProvider for LexicalRerank {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
		_options: RerankOptions<'a>,
	) -> BoxFuture<'a, ProviderResult<Vec<f32>>> {
		self.batches.lock().unwrap_or_else(|err| err.into_inner()).push(docs.len());

		let scores = docs.iter().map(|doc| Self::score(query, doc)).collect();

		Box::pin(async move { Ok(scores) })
	}
}

/// Fails every call with the given HTTP status.
pub struct Unavailable {
	status: u16,
	calls: AtomicUsize,
}
impl Unavailable {
	pub fn new(status: u16) -> Self {
		Self { status, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn fail<T>(&self) -> BoxFuture<'_, ProviderResult<T>>
	where
		T: Send + 'static,
	{
		self.calls.fetch_add(1, Ordering::SeqCst);

		let status = self.status;

		Box::pin(async move {
			Err(ProviderError::Status { status, body: "injected failure".to_string() })
		})
	}
}
impl EmbeddingProvider for Unavailable {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, ProviderResult<Vec<Vec<f32>>>> {
		self.fail()
	}
}
impl SparseEmbeddingProvider for Unavailable {
	fn embed_sparse<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, ProviderResult<Vec<SparseVector>>> {
		self.fail()
	}
}
impl RerankProvider for Unavailable {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a RerankProviderConfig,
		_query: &'a str,
		_docs: &'a [String],
		_options: RerankOptions<'a>,
	) -> BoxFuture<'a, ProviderResult<Vec<f32>>> {
		self.fail()
	}
}

/// Answers with HTTP 503 for the first `failures` calls, then delegates.
pub struct FlakyRerank {
	failures: AtomicUsize,
	calls: AtomicUsize,
	inner: LexicalRerank,
}
impl FlakyRerank {
	pub fn new(failures: usize) -> Self {
		Self {
			failures: AtomicUsize::new(failures),
			calls: AtomicUsize::new(0),
			inner: LexicalRerank::default(),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl RerankProvider for FlakyRerank {
	fn rerank<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
		options: RerankOptions<'a>,
	) -> BoxFuture<'a, ProviderResult<Vec<f32>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let failing = self
			.failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();

		if failing {
			return Box::pin(async {
				Err(ProviderError::Status { status: 503, body: "warming up".to_string() })
			});
		}

		self.inner.rerank(cfg, query, docs, options)
	}
}

/// Hash embeddings for every space and lexical reranking.
pub fn hash_providers() -> Providers {
	Providers::new(
		Arc::new(HashEmbedding::default()),
		Arc::new(HashSparse::default()),
		Arc::new(LexicalRerank::default()),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lexical_scores_reflect_overlap() {
		assert_eq!(LexicalRerank::score("function tool", "A function tool wraps code."), 1.0);
		assert_eq!(LexicalRerank::score("function tool", "A function."), 0.5);
		assert_eq!(LexicalRerank::score("", "anything"), 0.0);
	}
}
