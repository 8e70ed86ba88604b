//! Request and response shapes of the single `retrieve` operation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use ground_domain::{
	CitationConfidence, ContentType, CoverageRule, PayloadFilter, Provenance, ScoreSource,
	TaskMode, TypeCounts,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
	pub query: String,
	#[serde(default)]
	pub mode: TaskMode,
	/// Overrides `evidence.top_k`.
	pub top_k: Option<u32>,
	/// Soft budget for the whole call; remote timeouts are capped by what remains.
	pub time_budget_ms: Option<u64>,
	#[serde(default)]
	pub filters: Vec<PayloadFilter>,
	/// Overrides `rerank.enabled`.
	pub rerank: Option<bool>,
}
impl QueryRequest {
	pub fn new(query: impl Into<String>, mode: TaskMode) -> Self {
		Self {
			query: query.into(),
			mode,
			top_k: None,
			time_budget_ms: None,
			filters: Vec::new(),
			rerank: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackStatus {
	Ok,
	/// No collection produced a usable candidate. Not an error.
	NoEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePack {
	pub status: PackStatus,
	pub items: Vec<EvidenceItem>,
	pub coverage: CoverageReport,
	pub warnings: Vec<Warning>,
	pub diagnostics: Diagnostics,
}
impl EvidencePack {
	pub fn has_warning(&self, kind: WarningKind) -> bool {
		self.warnings.iter().any(|warning| warning.kind == kind)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
	/// 1-based position in the pack.
	pub rank: usize,
	pub candidate_id: String,
	pub content_type: ContentType,
	pub citation: String,
	pub citation_confidence: CitationConfidence,
	pub rerank_score: f32,
	pub score_source: ScoreSource,
	pub store_score: f32,
	pub collection: String,
	pub chunk_id: Option<String>,
	pub provenance: Provenance,
	pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
	pub by_type: TypeCounts,
	pub by_repo: BTreeMap<String, usize>,
	/// Minimums that applied to this call, absent when the mode does not require mixing.
	pub required: Option<CoverageRule>,
	pub satisfied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Normalize,
	Embed,
	Search,
	Merge,
	Balance,
	Rerank,
	Assemble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
	EmbeddingUnavailable,
	CollectionSearchFailed,
	CoverageDeficient,
	RerankUnavailable,
	ProvenanceIncomplete,
	ProvenanceExcluded,
	BudgetExceeded,
}

/// A recorded degradation: which stage, which collection or provider, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
	pub stage: Stage,
	pub kind: WarningKind,
	pub subject: Option<String>,
	pub message: String,
}
impl Warning {
	pub fn new(
		stage: Stage,
		kind: WarningKind,
		subject: Option<&str>,
		message: impl Into<String>,
	) -> Self {
		Self { stage, kind, subject: subject.map(str::to_string), message: message.into() }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMode {
	CrossEncoder,
	/// Ordered by fused store score because reranking failed or ran out of budget.
	Fallback,
	Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
	pub trace_id: Uuid,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	pub request: RequestEcho,
	pub query: QueryDiagnostics,
	pub vectors: VectorDiagnostics,
	pub fusion: String,
	pub limits: LimitDiagnostics,
	pub requests: Vec<CollectionRequest>,
	pub widening: WideningDiagnostics,
	pub counts: CountDiagnostics,
	pub rerank: RerankDiagnostics,
	pub selection: SelectionDiagnostics,
	pub timings: Timings,
	/// Effective configuration with secrets replaced.
	pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEcho {
	pub query: String,
	pub mode: TaskMode,
	pub top_k: u32,
	pub buffer_k: u32,
	pub time_budget_ms: Option<u64>,
	pub filters: Vec<PayloadFilter>,
	pub rerank_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDiagnostics {
	pub primary: String,
	pub variants: Vec<String>,
	pub identifiers: Vec<String>,
	pub variants_searched: bool,
}

/// Which query vector kinds were available for the primary pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorDiagnostics {
	pub dense_docs: bool,
	pub dense_code: bool,
	/// `provider`, `store`, or `unavailable`.
	pub sparse: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitDiagnostics {
	pub prefetch_dense: u32,
	pub prefetch_sparse: u32,
	pub collection_limit: u32,
	pub widened_collection_limit: u32,
	pub rerank_pool_max: u32,
	pub hnsw_ef: u64,
	pub exact: bool,
}

/// One hybrid request issued to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
	pub collection: String,
	pub content_type: ContentType,
	pub limit: u32,
	pub lanes: usize,
	pub query_texts: usize,
	pub widened: bool,
	pub hits: usize,
	pub elapsed_ms: u64,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WideningDiagnostics {
	pub triggered: bool,
	pub deficits: Vec<ContentType>,
	pub collections: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountDiagnostics {
	pub raw_hits: usize,
	pub merged: usize,
	pub duplicates: usize,
	pub rejected: usize,
	pub pool: usize,
	pub excluded: usize,
	pub returned: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankDiagnostics {
	pub mode: RerankMode,
	pub instruction: Option<String>,
	/// Document count of each provider call, in dispatch order.
	pub batches: Vec<usize>,
	pub estimated_tokens: usize,
	pub trimmed_documents: usize,
	/// `tokenizer` or `estimate`.
	pub token_counter: String,
	pub truncation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionDiagnostics {
	pub promoted: usize,
	pub promoted_beyond_buffer: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timings {
	pub normalize_ms: u64,
	pub embed_ms: u64,
	pub search_ms: u64,
	pub merge_ms: u64,
	pub balance_ms: u64,
	pub rerank_ms: u64,
	pub assemble_ms: u64,
	pub total_ms: u64,
}
