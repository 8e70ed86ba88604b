use ground_domain::SparseVector;

use crate::{
	GroundService,
	budget::Deadline,
	pack::{Stage, Warning, WarningKind},
};

/// The sparse side of one query text.
#[derive(Debug, Clone)]
pub(crate) enum SparseQuery {
	Vector(SparseVector),
	/// The store embeds the raw text with this model.
	StoreSide { model: String },
}

/// Every vector available for one query text. Missing spaces failed upstream.
#[derive(Debug, Clone)]
pub(crate) struct QueryEntry {
	pub(crate) text: String,
	pub(crate) docs: Option<Vec<f32>>,
	pub(crate) code: Option<Vec<f32>>,
	pub(crate) sparse: Option<SparseQuery>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SpacesNeeded {
	pub(crate) docs: bool,
	pub(crate) code: bool,
}

impl GroundService {
	pub(crate) fn spaces_needed(&self) -> SpacesNeeded {
		let collections = &self.cfg.storage.qdrant.collections;

		SpacesNeeded {
			docs: collections.iter().any(|collection| collection.dense_space == "docs"),
			code: collections.iter().any(|collection| collection.dense_space == "code"),
		}
	}

	/// Embeds `texts` in both dense spaces and the sparse space concurrently.
	///
	/// A failing space is recorded as a warning and left empty; the other spaces still serve
	/// the search.
	pub(crate) async fn embed_queries(
		&self,
		texts: &[String],
		deadline: &Deadline,
		warnings: &mut Vec<Warning>,
	) -> Vec<QueryEntry> {
		let needed = self.spaces_needed();
		let providers = &self.cfg.providers;
		let docs = async {
			if !needed.docs {
				return None;
			}

			Some(
				self.call_provider(
					"embedding_docs",
					&self.limiters.embedding_docs,
					providers.embedding_docs.timeout_ms,
					deadline,
					|| self.providers.embedding.embed(&providers.embedding_docs, texts),
				)
				.await,
			)
		};
		let code = async {
			if !needed.code {
				return None;
			}

			Some(
				self.call_provider(
					"embedding_code",
					&self.limiters.embedding_code,
					providers.embedding_code.timeout_ms,
					deadline,
					|| self.providers.embedding.embed(&providers.embedding_code, texts),
				)
				.await,
			)
		};
		let sparse = async {
			if providers.sparse.provider_id == ground_config::STORE_SIDE_SPARSE_PROVIDER {
				return None;
			}

			Some(
				self.call_provider(
					"sparse",
					&self.limiters.sparse,
					providers.sparse.timeout_ms,
					deadline,
					|| self.providers.sparse.embed_sparse(&providers.sparse, texts),
				)
				.await,
			)
		};
		let (docs, code, sparse) = tokio::join!(docs, code, sparse);
		let docs = accept_dense(
			"embedding_docs",
			docs,
			texts.len(),
			providers.embedding_docs.dimensions as usize,
			warnings,
		);
		let code = accept_dense(
			"embedding_code",
			code,
			texts.len(),
			providers.embedding_code.dimensions as usize,
			warnings,
		);
		let sparse = match sparse {
			None => Some(
				texts
					.iter()
					.map(|_| SparseQuery::StoreSide { model: providers.sparse.model.clone() })
					.collect::<Vec<_>>(),
			),
			Some(Ok(vectors)) if vectors.len() == texts.len() =>
				Some(vectors.into_iter().map(SparseQuery::Vector).collect()),
			Some(Ok(vectors)) => {
				record_unavailable(
					"sparse",
					&format!("returned {} vectors for {} queries", vectors.len(), texts.len()),
					warnings,
				);

				None
			},
			Some(Err(err)) => {
				record_unavailable("sparse", &err.to_string(), warnings);

				None
			},
		};

		texts
			.iter()
			.enumerate()
			.map(|(idx, text)| QueryEntry {
				text: text.clone(),
				docs: docs.as_ref().map(|vectors| vectors[idx].clone()),
				code: code.as_ref().map(|vectors| vectors[idx].clone()),
				sparse: sparse.as_ref().map(|queries| queries[idx].clone()),
			})
			.collect()
	}
}

fn accept_dense(
	label: &str,
	result: Option<ground_providers::Result<Vec<Vec<f32>>>>,
	expected: usize,
	dimensions: usize,
	warnings: &mut Vec<Warning>,
) -> Option<Vec<Vec<f32>>> {
	match result? {
		Ok(vectors) if vectors.iter().any(|vector| vector.len() != dimensions) => {
			record_unavailable(
				label,
				&format!("returned vectors that are not {dimensions}-dimensional"),
				warnings,
			);

			None
		},
		Ok(vectors) if vectors.len() == expected => Some(vectors),
		Ok(vectors) => {
			record_unavailable(
				label,
				&format!("returned {} vectors for {expected} queries", vectors.len()),
				warnings,
			);

			None
		},
		Err(err) => {
			record_unavailable(label, &err.to_string(), warnings);

			None
		},
	}
}

fn record_unavailable(label: &str, reason: &str, warnings: &mut Vec<Warning>) {
	tracing::warn!(
		provider = label,
		error = reason,
		"Query embedding unavailable. Continuing without it."
	);

	warnings.push(Warning::new(
		Stage::Embed,
		WarningKind::EmbeddingUnavailable,
		Some(label),
		format!("Provider {label} failed after retries: {reason}. Searching without this vector."),
	));
}
