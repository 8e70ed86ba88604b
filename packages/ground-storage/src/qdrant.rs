use std::time::Duration;

use qdrant_client::qdrant::{
	Condition, Document, Filter, Fusion, PrefetchQueryBuilder, Query, QueryPointsBuilder,
	SearchParamsBuilder, VectorInput,
};

use ground_domain::RawHit;

use crate::{
	Error, Result, payload,
	query::{FusionMethod, HybridQuery, LaneInput},
};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
}
impl QdrantStore {
	pub fn new(cfg: &ground_config::Qdrant) -> Result<Self> {
		let mut builder = qdrant_client::Qdrant::from_url(&cfg.url)
			.timeout(Duration::from_millis(cfg.timeout_ms));

		if let Some(api_key) = &cfg.api_key {
			builder = builder.api_key(api_key.clone());
		}

		let client = builder.build()?;

		Ok(Self { client })
	}

	/// Runs one fused query and decodes the hits in fused order.
	pub async fn hybrid_query(&self, query: &HybridQuery) -> Result<Vec<RawHit>> {
		let request = build_request(query)?;
		let response = self.client.query(request).await?;

		tracing::debug!(
			collection = %query.collection,
			lanes = query.lanes.len(),
			hits = response.result.len(),
			"Collection query finished."
		);

		Ok(response
			.result
			.into_iter()
			.map(|point| payload::decode_point(&query.collection, query.content_type, point))
			.collect())
	}
}

pub fn build_request(query: &HybridQuery) -> Result<QueryPointsBuilder> {
	if query.lanes.is_empty() {
		return Err(Error::InvalidArgument(format!(
			"Query against {:?} has no lanes.",
			query.collection
		)));
	}
	if query.limit == 0 {
		return Err(Error::InvalidArgument("Query limit must be greater than zero.".to_string()));
	}

	let filter = build_filter(query);
	let params = SearchParamsBuilder::default().hnsw_ef(query.hnsw_ef).exact(query.exact).build();
	let mut search = QueryPointsBuilder::new(query.collection.clone());

	for lane in &query.lanes {
		let input = match &lane.input {
			LaneInput::Dense(vector) => VectorInput::from(vector.clone()),
			LaneInput::Sparse(vector) =>
				VectorInput::new_sparse(vector.indices.clone(), vector.values.clone()),
			LaneInput::Document { text, model } =>
				VectorInput::from(Document::new(text.clone(), model.clone())),
		};
		let mut prefetch = PrefetchQueryBuilder::default()
			.query(Query::new_nearest(input))
			.using(lane.vector_name.clone())
			.params(params.clone())
			.limit(lane.limit as u64);

		if let Some(filter) = &filter {
			prefetch = prefetch.filter(filter.clone());
		}

		search = search.add_prefetch(prefetch);
	}

	let fusion = match query.fusion {
		FusionMethod::Rrf => Fusion::Rrf,
		FusionMethod::Dbsf => Fusion::Dbsf,
	};

	Ok(search.with_payload(true).query(fusion).limit(query.limit as u64))
}

fn build_filter(query: &HybridQuery) -> Option<Filter> {
	let conditions = query
		.active_filters()
		.map(|filter| Condition::matches(filter.field.clone(), filter.any_of.clone()))
		.collect::<Vec<_>>();

	if conditions.is_empty() {
		return None;
	}

	Some(Filter::must(conditions))
}

#[cfg(test)]
mod tests {
	use ground_domain::{ContentType, PayloadFilter, SparseVector};

	use super::*;
	use crate::query::Lane;

	fn query(lanes: Vec<Lane>, filters: Vec<PayloadFilter>) -> HybridQuery {
		HybridQuery {
			collection: "grounding_code".to_string(),
			content_type: ContentType::Code,
			lanes,
			fusion: FusionMethod::Rrf,
			limit: 60,
			hnsw_ef: 256,
			exact: false,
			filters,
		}
	}

	fn lanes() -> Vec<Lane> {
		vec![
			Lane {
				vector_name: "dense_code".to_string(),
				input: LaneInput::Dense(vec![0.1, 0.2]),
				limit: 80,
			},
			Lane {
				vector_name: "sparse_lexical".to_string(),
				input: LaneInput::Sparse(SparseVector { indices: vec![3], values: vec![1.0] }),
				limit: 120,
			},
		]
	}

	#[test]
	fn every_lane_becomes_a_filtered_prefetch() {
		let filters = vec![PayloadFilter::new("repo", ["adk-python"])];
		let request = build_request(&query(lanes(), filters)).expect("Request must build.").build();

		assert_eq!(request.collection_name, "grounding_code");
		assert_eq!(request.limit, Some(60));
		assert_eq!(request.prefetch.len(), 2);
		assert_eq!(request.prefetch[0].limit, Some(80));
		assert_eq!(request.prefetch[1].limit, Some(120));
		assert_eq!(request.prefetch[1].using.as_deref(), Some("sparse_lexical"));
		assert!(request.prefetch.iter().all(|prefetch| prefetch.filter.is_some()));
		assert!(request.prefetch.iter().all(|prefetch| {
			prefetch.params.as_ref().and_then(|params| params.hnsw_ef) == Some(256)
		}));
	}

	#[test]
	fn empty_filters_are_dropped() {
		let filters = vec![PayloadFilter::new("repo", Vec::<String>::new())];
		let request = build_request(&query(lanes(), filters)).expect("Request must build.").build();

		assert!(request.prefetch.iter().all(|prefetch| prefetch.filter.is_none()));
	}

	#[test]
	fn laneless_queries_are_rejected() {
		assert!(matches!(build_request(&query(Vec::new(), Vec::new())), Err(Error::InvalidArgument(_))));
	}
}
