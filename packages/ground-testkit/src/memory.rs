//! A vector store that keeps points in memory and fuses lanes the way Qdrant does.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashMap},
	sync::Mutex,
};

use qdrant_client::QdrantError;

use ground_domain::{ContentType, HitPayload, RawHit, SparseVector, vector};
use ground_service::{BoxFuture, VectorStore};
use ground_storage::{FusionMethod, HybridQuery, LaneInput};

use crate::hashing;

const RRF_RANK_CONSTANT: f32 = 2.0;

#[derive(Debug, Clone)]
pub struct StoredPoint {
	pub id: String,
	pub dense: Vec<f32>,
	pub sparse: SparseVector,
	pub payload: HitPayload,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
	Always,
	Times(usize),
}

/// Records every query it answers and can be told to fail per collection.
#[derive(Default)]
pub struct InMemoryStore {
	collections: Mutex<BTreeMap<String, Vec<StoredPoint>>>,
	failures: Mutex<HashMap<String, Failure>>,
	requests: Mutex<Vec<HybridQuery>>,
}
impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, collection: &str, point: StoredPoint) {
		let mut collections = self.collections.lock().unwrap_or_else(|err| err.into_inner());

		collections.entry(collection.to_string()).or_default().push(point);
	}

	pub fn point_count(&self, collection: &str) -> usize {
		let collections = self.collections.lock().unwrap_or_else(|err| err.into_inner());

		collections.get(collection).map(Vec::len).unwrap_or(0)
	}

	/// Every later query against `collection` fails.
	pub fn fail_collection(&self, collection: &str) {
		let mut failures = self.failures.lock().unwrap_or_else(|err| err.into_inner());

		failures.insert(collection.to_string(), Failure::Always);
	}

	/// The next `times` queries against `collection` fail, then it recovers.
	pub fn fail_collection_times(&self, collection: &str, times: usize) {
		let mut failures = self.failures.lock().unwrap_or_else(|err| err.into_inner());

		failures.insert(collection.to_string(), Failure::Times(times));
	}

	/// Every query received, in arrival order, including the failed ones.
	pub fn requests(&self) -> Vec<HybridQuery> {
		self.requests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn requests_for(&self, collection: &str) -> Vec<HybridQuery> {
		self.requests().into_iter().filter(|query| query.collection == collection).collect()
	}

	pub fn search(&self, query: &HybridQuery) -> ground_storage::Result<Vec<RawHit>> {
		self.requests.lock().unwrap_or_else(|err| err.into_inner()).push(query.clone());

		if self.take_failure(&query.collection) {
			return Err(QdrantError::ConversionError(format!(
				"Injected failure for collection {:?}.",
				query.collection
			))
			.into());
		}

		let collections = self.collections.lock().unwrap_or_else(|err| err.into_inner());
		let Some(points) = collections.get(&query.collection) else {
			return Ok(Vec::new());
		};
		let eligible = points
			.iter()
			.enumerate()
			.filter(|(_, point)| {
				query
					.active_filters()
					.all(|filter| filter.matches(field_value(&point.payload, &filter.field)))
			})
			.collect::<Vec<_>>();
		let mut fused = BTreeMap::<usize, f32>::new();

		for lane in &query.lanes {
			let ranking = rank_lane(&eligible, &lane.input, lane.limit as usize);

			match query.fusion {
				FusionMethod::Rrf =>
					for (rank, (idx, _)) in ranking.iter().enumerate() {
						*fused.entry(*idx).or_default() += 1.0 / (RRF_RANK_CONSTANT + rank as f32 + 1.0);
					},
				FusionMethod::Dbsf =>
					for (idx, score) in normalize_distribution(&ranking) {
						*fused.entry(idx).or_default() += score;
					},
			}
		}

		let mut ordered = fused.into_iter().collect::<Vec<_>>();

		ordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
		ordered.truncate(query.limit as usize);

		Ok(ordered
			.into_iter()
			.map(|(idx, score)| {
				let point = &points[idx];

				RawHit {
					collection: query.collection.clone(),
					collection_type: query.content_type,
					point_id: point.id.clone(),
					score,
					payload: point.payload.clone(),
				}
			})
			.collect())
	}

	fn take_failure(&self, collection: &str) -> bool {
		let mut failures = self.failures.lock().unwrap_or_else(|err| err.into_inner());

		match failures.get(collection).copied() {
			Some(Failure::Always) => true,
			Some(Failure::Times(0)) | None => false,
			Some(Failure::Times(left)) => {
				failures.insert(collection.to_string(), Failure::Times(left - 1));

				true
			},
		}
	}
}
impl VectorStore for InMemoryStore {
	fn hybrid_query<'a>(
		&'a self,
		query: &'a HybridQuery,
	) -> BoxFuture<'a, ground_storage::Result<Vec<RawHit>>> {
		Box::pin(async move { self.search(query) })
	}
}

/// Scores one lane and keeps its top `limit`. Lexical lanes only return points sharing a term.
fn rank_lane(
	eligible: &[(usize, &StoredPoint)],
	input: &LaneInput,
	limit: usize,
) -> Vec<(usize, f32)> {
	let document;
	let (dense, sparse) = match input {
		LaneInput::Dense(query) => (Some(query), None),
		LaneInput::Sparse(query) => (None, Some(query)),
		LaneInput::Document { text, .. } => {
			document = hashing::sparse_vector(text);

			(None, Some(&document))
		},
	};
	let mut scored = eligible
		.iter()
		.filter_map(|(idx, point)| match (dense, sparse) {
			(Some(query), _) => Some((*idx, vector::cosine(query, &point.dense))),
			(_, Some(query)) => {
				let score = query.dot(&point.sparse);

				(score > 0.0).then_some((*idx, score))
			},
			_ => None,
		})
		.collect::<Vec<_>>();

	scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
	scored.truncate(limit);

	scored
}

/// Maps scores onto `[0, 1]` using mean plus or minus three standard deviations.
fn normalize_distribution(ranking: &[(usize, f32)]) -> Vec<(usize, f32)> {
	if ranking.is_empty() {
		return Vec::new();
	}

	let count = ranking.len() as f32;
	let mean = ranking.iter().map(|(_, score)| score).sum::<f32>() / count;
	let variance = ranking.iter().map(|(_, score)| (score - mean).powi(2)).sum::<f32>() / count;
	let spread = 3.0 * variance.sqrt();
	let (low, high) = (mean - spread, mean + spread);

	ranking
		.iter()
		.map(|(idx, score)| {
			let normalized =
				if high > low { ((score - low) / (high - low)).clamp(0.0, 1.0) } else { 1.0 };

			(*idx, normalized)
		})
		.collect()
}

fn field_value<'a>(payload: &'a HitPayload, field: &str) -> Option<&'a str> {
	let provenance = &payload.provenance;

	match field {
		"repo" => provenance.repo.as_deref(),
		"ref" => provenance.git_ref.as_deref(),
		"path" => provenance.path.as_deref(),
		"url" => provenance.url.as_deref(),
		"chunk_id" => payload.chunk_id.as_deref(),
		"content_type" => payload.content_type.map(ContentType::as_str),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use ground_domain::{PayloadFilter, Provenance};
	use ground_storage::Lane;

	use super::*;

	fn point(id: &str, text: &str, repo: &str) -> StoredPoint {
		StoredPoint {
			id: id.to_string(),
			dense: hashing::dense_vector("docs", 16, text),
			sparse: hashing::sparse_vector(text),
			payload: HitPayload {
				content_type: None,
				chunk_id: None,
				text: text.to_string(),
				provenance: Provenance {
					repo: Some(repo.to_string()),
					url: Some(format!("https://example.test/{id}")),
					..Default::default()
				},
			},
		}
	}

	fn lexical_query(text: &str, limit: u32) -> HybridQuery {
		HybridQuery {
			collection: "docs".to_string(),
			content_type: ContentType::Doc,
			lanes: vec![Lane {
				vector_name: "bm25".to_string(),
				input: LaneInput::Sparse(hashing::sparse_vector(text)),
				limit: 10,
			}],
			fusion: FusionMethod::Rrf,
			limit,
			hnsw_ef: 64,
			exact: false,
			filters: Vec::new(),
		}
	}

	#[test]
	fn lexical_lanes_skip_points_without_shared_terms() {
		let store = InMemoryStore::new();

		store.insert("docs", point("1", "function tool", "adk-docs"));
		store.insert("docs", point("2", "session state", "adk-docs"));

		let hits = store.search(&lexical_query("tool", 10)).expect("Search must succeed.");

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].point_id, "1");
	}

	#[test]
	fn filters_and_limits_apply() {
		let store = InMemoryStore::new();

		store.insert("docs", point("1", "tool one", "adk-docs"));
		store.insert("docs", point("2", "tool two", "adk-python"));
		store.insert("docs", point("3", "tool three", "adk-docs"));

		let mut query = lexical_query("tool", 1);

		query.filters.push(PayloadFilter::new("repo", ["adk-python"]));

		let hits = store.search(&query).expect("Search must succeed.");

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].point_id, "2");
	}

	#[test]
	fn injected_failures_run_out() {
		let store = InMemoryStore::new();

		store.fail_collection_times("docs", 1);

		assert!(store.search(&lexical_query("tool", 5)).is_err());
		assert!(store.search(&lexical_query("tool", 5)).is_ok());
		assert_eq!(store.requests_for("docs").len(), 2);
	}

	#[test]
	fn dbsf_keeps_scores_in_unit_range() {
		let normalized = normalize_distribution(&[(0, 4.0), (1, 2.0), (2, 0.5)]);

		assert!(normalized.iter().all(|(_, score)| (0.0..=1.0).contains(score)));
		assert!(normalized[0].1 > normalized[2].1);
		assert_eq!(normalize_distribution(&[(7, 0.3)]), vec![(7, 1.0)]);
	}
}
