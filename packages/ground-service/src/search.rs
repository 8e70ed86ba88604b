use std::{
	fmt::{self, Display, Formatter},
	time::{Duration, Instant},
};

use futures::future;

use ground_config::Collection;
use ground_domain::{ContentType, PayloadFilter, RawHit};
use ground_providers::retry::{self, RetryPolicy};
use ground_storage::{FusionMethod, HybridQuery, Lane, LaneInput};

use crate::{
	GroundService,
	budget::{self, Deadline},
	embed::{QueryEntry, SparseQuery},
	pack::{CollectionRequest, Stage, Warning, WarningKind},
};

/// One round of collection requests sharing the same query texts and limit.
pub(crate) struct SearchPass<'a> {
	pub(crate) collections: Vec<&'a Collection>,
	pub(crate) entries: &'a [QueryEntry],
	pub(crate) limit: u32,
	pub(crate) widened: bool,
	pub(crate) filters: &'a [PayloadFilter],
	pub(crate) deadline: &'a Deadline,
}

/// Outcome of one collection request. `hits` is `None` when the request failed.
pub(crate) struct CollectionResult {
	pub(crate) request: CollectionRequest,
	pub(crate) hits: Option<Vec<RawHit>>,
}

#[derive(Debug)]
enum SearchFailure {
	Store(ground_storage::Error),
	Timeout { timeout_ms: u64 },
	NoVectors,
}
impl SearchFailure {
	fn is_transient(&self) -> bool {
		matches!(self, Self::Store(ground_storage::Error::Qdrant(_)) | Self::Timeout { .. })
	}
}
impl Display for SearchFailure {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Store(err) => write!(f, "{err}"),
			Self::Timeout { timeout_ms } => write!(f, "timed out after {timeout_ms} ms"),
			Self::NoVectors => write!(f, "no query vector was available for this collection"),
		}
	}
}

pub(crate) fn collection_type(collection: &Collection) -> ContentType {
	ContentType::parse(&collection.content_type).unwrap_or(ContentType::Doc)
}

impl GroundService {
	/// One hybrid query per collection: a dense and a sparse lane for every query text.
	pub(crate) fn build_query(
		&self,
		collection: &Collection,
		entries: &[QueryEntry],
		limit: u32,
		filters: &[PayloadFilter],
	) -> Option<HybridQuery> {
		let search = &self.cfg.search;
		let mut lanes = Vec::with_capacity(entries.len() * 2);

		for entry in entries {
			let dense = match collection.dense_space.as_str() {
				"code" => entry.code.as_ref(),
				_ => entry.docs.as_ref(),
			};

			if let Some(vector) = dense {
				lanes.push(Lane {
					vector_name: collection.dense_vector.clone(),
					input: LaneInput::Dense(vector.clone()),
					limit: search.prefetch_dense,
				});
			}

			let sparse = match &entry.sparse {
				Some(SparseQuery::Vector(vector)) if !vector.is_empty() =>
					Some(LaneInput::Sparse(vector.clone())),
				Some(SparseQuery::StoreSide { model }) =>
					Some(LaneInput::Document { text: entry.text.clone(), model: model.clone() }),
				_ => None,
			};

			if let Some(input) = sparse {
				lanes.push(Lane {
					vector_name: collection.sparse_vector.clone(),
					input,
					limit: search.prefetch_sparse,
				});
			}
		}

		if lanes.is_empty() {
			return None;
		}

		Some(HybridQuery {
			collection: collection.name.clone(),
			content_type: collection_type(collection),
			lanes,
			fusion: FusionMethod::parse(&search.fusion).unwrap_or(FusionMethod::Rrf),
			limit,
			hnsw_ef: search.hnsw_ef,
			exact: search.exact,
			filters: filters.to_vec(),
		})
	}

	/// Searches every given collection concurrently. Each request settles on its own; a
	/// failure only removes that collection's hits and adds a warning.
	pub(crate) async fn search_collections(
		&self,
		pass: &SearchPass<'_>,
		warnings: &mut Vec<Warning>,
	) -> Vec<CollectionResult> {
		let searches = pass.collections.iter().map(|collection| {
			let query = self.build_query(collection, pass.entries, pass.limit, pass.filters);

			self.search_one(collection, query, pass)
		});
		let results = future::join_all(searches).await;

		for result in &results {
			let request = &result.request;

			match &request.error {
				Some(error) => {
					tracing::warn!(
						collection = %request.collection,
						widened = pass.widened,
						error = %error,
						"Collection search failed. Continuing without it."
					);

					warnings.push(Warning::new(
						Stage::Search,
						WarningKind::CollectionSearchFailed,
						Some(&request.collection),
						format!("Search of collection {:?} failed: {error}.", request.collection),
					));
				},
				None => tracing::info!(
					collection = %request.collection,
					hits = request.hits,
					limit = pass.limit,
					widened = pass.widened,
					elapsed_ms = request.elapsed_ms,
					"Collection search finished."
				),
			}
		}

		results
	}

	async fn search_one(
		&self,
		collection: &Collection,
		query: Option<HybridQuery>,
		pass: &SearchPass<'_>,
	) -> CollectionResult {
		let started = Instant::now();
		let lanes = query.as_ref().map(|query| query.lanes.len()).unwrap_or(0);
		let outcome = match &query {
			Some(query) => self.run_query(query, pass.deadline).await,
			None => Err(SearchFailure::NoVectors),
		};
		let (hits, error) = match outcome {
			Ok(hits) => (Some(hits), None),
			Err(err) => (None, Some(err.to_string())),
		};

		CollectionResult {
			request: CollectionRequest {
				collection: collection.name.clone(),
				content_type: collection_type(collection),
				limit: pass.limit,
				lanes,
				query_texts: pass.entries.len(),
				widened: pass.widened,
				hits: hits.as_ref().map(Vec::len).unwrap_or(0),
				elapsed_ms: budget::elapsed_ms(started),
				error,
			},
			hits,
		}
	}

	async fn run_query(
		&self,
		query: &HybridQuery,
		deadline: &Deadline,
	) -> Result<Vec<RawHit>, SearchFailure> {
		let policy = RetryPolicy::from_config(&self.cfg.retry);
		let timeout_ms = self.cfg.storage.qdrant.timeout_ms;

		retry::with_retry_until(
			&policy,
			"vector_store",
			deadline.until(),
			SearchFailure::is_transient,
			|_| {
				let timeout = deadline.cap(Duration::from_millis(timeout_ms));
				let call = self.store.hybrid_query(query);

				async move {
					match tokio::time::timeout(timeout, call).await {
						Ok(result) => result.map_err(SearchFailure::Store),
						Err(_) =>
							Err(SearchFailure::Timeout { timeout_ms: timeout.as_millis() as u64 }),
					}
				}
			},
		)
		.await
	}
}
