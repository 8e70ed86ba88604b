//! Runs the pipeline against a real Qdrant. Skipped unless `GROUND_QDRANT_URL` is set.

use std::{collections::HashMap, sync::Arc};

use qdrant_client::{
	Payload,
	qdrant::{
		CreateCollectionBuilder, Distance, Modifier, PointStruct, SparseVectorParamsBuilder,
		SparseVectorsConfigBuilder, UpsertPointsBuilder, Vector, VectorParamsBuilder,
		VectorsConfigBuilder,
	},
};

use ground_config::Config;
use ground_domain::{CitationConfidence, TaskMode};
use ground_service::{GroundService, PackStatus, QueryRequest};
use ground_storage::qdrant::QdrantStore;
use ground_testkit::{
	ChunkSeed, TestCollections,
	corpus::{self, DENSE_DIMENSIONS},
	fakes, hashing,
};

async fn create_collection(store: &QdrantStore, name: &str) {
	let mut vectors_config = VectorsConfigBuilder::default();

	vectors_config.add_named_vector_params(
		"dense",
		VectorParamsBuilder::new(DENSE_DIMENSIONS.into(), Distance::Cosine),
	);

	let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

	sparse_vectors_config.add_named_vector_params(
		"bm25",
		SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
	);

	store
		.client
		.create_collection(
			CreateCollectionBuilder::new(name.to_string())
				.vectors_config(vectors_config)
				.sparse_vectors_config(sparse_vectors_config),
		)
		.await
		.expect("Failed to create Qdrant collection.");
}

fn point(idx: usize, chunk: &ChunkSeed, cfg: &Config, content_type: &str) -> PointStruct {
	let space = match content_type {
		"code" => &cfg.providers.embedding_code,
		_ => &cfg.providers.embedding_docs,
	};
	let sparse = hashing::sparse_vector(&chunk.text);
	let mut vectors = HashMap::new();

	vectors.insert(
		"dense".to_string(),
		Vector::from(hashing::dense_vector(&space.model, space.dimensions as usize, &chunk.text)),
	);
	vectors.insert("bm25".to_string(), Vector::new_sparse(sparse.indices, sparse.values));

	let provenance = &chunk.provenance;
	let mut payload = Payload::new();

	payload.insert("text", chunk.text.clone());
	payload.insert("content_type", content_type.to_string());

	for (key, value) in [
		("chunk_id", &chunk.chunk_id),
		("repo", &provenance.repo),
		("ref", &provenance.git_ref),
		("path", &provenance.path),
		("url", &provenance.url),
	] {
		if let Some(value) = value {
			payload.insert(key, value.clone());
		}
	}
	for (key, value) in [("start_line", provenance.start_line), ("end_line", provenance.end_line)] {
		if let Some(value) = value {
			payload.insert(key, serde_json::Value::from(value));
		}
	}

	PointStruct::new(idx as u64, vectors, payload)
}

#[tokio::test]
async fn live_build_question_is_grounded_in_both_collections() {
	let Some(url) = ground_testkit::env_qdrant_url() else {
		eprintln!("Skipping live Qdrant test; set GROUND_QDRANT_URL to run it.");

		return;
	};
	let collections = TestCollections::new(url);
	let docs = collections.collection_name("ground_docs");
	let code = collections.collection_name("ground_code");
	let mut cfg = corpus::test_config();

	cfg.storage.qdrant.url = collections.url().to_string();
	cfg.storage.qdrant.timeout_ms = 10_000;
	cfg.storage.qdrant.collections[0].name = docs.clone();
	cfg.storage.qdrant.collections[1].name = code.clone();

	let store = QdrantStore::new(&cfg.storage.qdrant).expect("Failed to build Qdrant client.");

	create_collection(&store, &docs).await;
	create_collection(&store, &code).await;

	for (collection, content_type) in [(&docs, "doc"), (&code, "code")] {
		let points = corpus::function_tool_corpus()
			.iter()
			.filter(|chunk| {
				(chunk.collection == corpus::CODE_COLLECTION) == (content_type == "code")
			})
			.enumerate()
			.map(|(idx, chunk)| point(idx + 1, chunk, &cfg, content_type))
			.collect::<Vec<_>>();

		store
			.client
			.upsert_points(UpsertPointsBuilder::new(collection.clone(), points).wait(true))
			.await
			.expect("Failed to upsert Qdrant points.");
	}

	let service = GroundService::with_providers(cfg, Arc::new(store), fakes::hash_providers());
	let pack = service
		.retrieve(QueryRequest::new("how to add a function tool", TaskMode::Build))
		.await
		.expect("Retrieval must not fail.");

	collections.cleanup().await.expect("Failed to clean up test collections.");

	assert_eq!(pack.status, PackStatus::Ok);
	assert!(pack.warnings.is_empty(), "Unexpected warnings: {:?}", pack.warnings);
	assert!(pack.coverage.satisfied, "Coverage: {:?}", pack.coverage);
	assert!(pack.items.iter().all(|item| item.citation_confidence == CitationConfidence::Full));
}
