use std::time::Instant;

use time::OffsetDateTime;
use uuid::Uuid;

use ground_domain::{
	ContentType, CoverageRule, ExpansionTemplates, PayloadFilter, coverage, query,
};

use crate::{
	Error, GroundService, Result,
	balance::{Expansion, HitBoard},
	budget::{self, Deadline},
	embed::{QueryEntry, SparseQuery},
	evidence,
	pack::{
		CollectionRequest, CountDiagnostics, Diagnostics, EvidencePack, LimitDiagnostics,
		PackStatus, QueryDiagnostics, QueryRequest, RequestEcho, Stage, Timings,
		VectorDiagnostics, Warning, WarningKind, WideningDiagnostics,
	},
	search::SearchPass,
	snapshot,
};

/// Per-call state threaded through the stages. Dropped when the pack is built.
pub(crate) struct Call<'a> {
	pub(crate) filters: &'a [PayloadFilter],
	pub(crate) deadline: Deadline,
	pub(crate) warnings: Vec<Warning>,
	pub(crate) requests: Vec<CollectionRequest>,
	coverage_warned: Vec<ContentType>,
}
impl<'a> Call<'a> {
	pub(crate) fn new(filters: &'a [PayloadFilter], deadline: Deadline) -> Self {
		Self {
			filters,
			deadline,
			warnings: Vec::new(),
			requests: Vec::new(),
			coverage_warned: Vec::new(),
		}
	}

	pub(crate) fn warn(
		&mut self,
		stage: Stage,
		kind: WarningKind,
		subject: Option<&str>,
		message: String,
	) {
		tracing::warn!(
			stage = ?stage,
			kind = ?kind,
			subject = subject.unwrap_or_default(),
			message = %message,
			"Retrieval degraded."
		);

		self.warnings.push(Warning::new(stage, kind, subject, message));
	}

	/// Records a coverage shortfall once per type, whichever stage notices it first.
	pub(crate) fn warn_coverage(
		&mut self,
		stage: Stage,
		content_type: ContentType,
		have: usize,
		rule: &CoverageRule,
	) {
		if self.coverage_warned.contains(&content_type) {
			return;
		}

		self.coverage_warned.push(content_type);

		self.warn(
			stage,
			WarningKind::CoverageDeficient,
			Some(content_type.as_str()),
			format!(
				"Only {have} {} items available where mixed grounding needs {}.",
				content_type.as_str(),
				rule.minimum(content_type)
			),
		);
	}
}

impl GroundService {
	/// Answers one question with a ranked, cited, type-balanced evidence pack.
	///
	/// Degraded dependencies surface as warnings on the pack. Only a malformed request is an
	/// error.
	pub async fn retrieve(&self, req: QueryRequest) -> Result<EvidencePack> {
		validate_request(&req)?;

		let started = Instant::now();
		let trace_id = Uuid::new_v4();
		let created_at = OffsetDateTime::now_utc();
		let search_cfg = &self.cfg.search;
		let top_k = req.top_k.unwrap_or(self.cfg.evidence.top_k);
		let buffer_k = self.cfg.evidence.buffer_k.max(top_k);
		let rerank_enabled = req.rerank.unwrap_or(self.cfg.rerank.enabled);
		let rule = req.mode.requires_mixed_grounding().then(|| CoverageRule {
			min_doc: self.cfg.coverage.min_doc as usize,
			min_code: self.cfg.coverage.min_code as usize,
		});
		let mut call = Call::new(&req.filters, Deadline::new(req.time_budget_ms));
		let mut timings = Timings::default();

		tracing::info!(
			trace_id = %trace_id,
			mode = req.mode.as_str(),
			top_k,
			filters = req.filters.len(),
			"Retrieval started."
		);

		let stage = Instant::now();
		let normalized = query::expand(
			&req.query,
			ExpansionTemplates {
				domain_phrase: &search_cfg.domain_phrase,
				max_variants: search_cfg.max_query_variants as usize,
			},
		);

		timings.normalize_ms = budget::elapsed_ms(stage);

		let stage = Instant::now();
		let mut entries = self
			.embed_queries(
				std::slice::from_ref(&normalized.primary),
				&call.deadline,
				&mut call.warnings,
			)
			.await;
		let vectors = vector_diagnostics(&entries);

		timings.embed_ms = budget::elapsed_ms(stage);

		let mut board = HitBoard::new(&self.cfg.storage.qdrant.collections);
		let stage = Instant::now();
		let pass = SearchPass {
			collections: board.healthy(),
			entries: &entries,
			limit: search_cfg.collection_limit,
			widened: false,
			filters: call.filters,
			deadline: &call.deadline,
		};
		let results = self.search_collections(&pass, &mut call.warnings).await;

		board.absorb(results, &mut call.requests);

		timings.search_ms = budget::elapsed_ms(stage);

		let stage = Instant::now();
		let mut merged = board.merge();

		timings.merge_ms = budget::elapsed_ms(stage);

		let mut query_diagnostics = QueryDiagnostics {
			primary: normalized.primary.clone(),
			variants: normalized.variants.clone(),
			identifiers: normalized.identifiers.clone(),
			variants_searched: false,
		};

		if merged.candidates.len() < search_cfg.min_primary_candidates as usize
			&& !normalized.variants.is_empty()
		{
			if call.deadline.expired() {
				call.warn(
					Stage::Search,
					WarningKind::BudgetExceeded,
					None,
					"Time budget spent before searching query variants. Skipped variants."
						.to_string(),
				);
			} else {
				let stage = Instant::now();
				let variants =
					self.embed_queries(&normalized.variants, &call.deadline, &mut call.warnings).await;

				entries.extend(variants);

				timings.embed_ms += budget::elapsed_ms(stage);

				let stage = Instant::now();
				let pass = SearchPass {
					collections: board.healthy(),
					entries: &entries,
					limit: search_cfg.collection_limit,
					widened: false,
					filters: call.filters,
					deadline: &call.deadline,
				};
				let results = self.search_collections(&pass, &mut call.warnings).await;

				board.absorb(results, &mut call.requests);

				timings.search_ms += budget::elapsed_ms(stage);

				let stage = Instant::now();

				merged = board.merge();

				timings.merge_ms += budget::elapsed_ms(stage);
				query_diagnostics.variants_searched = true;
			}
		}

		let stage = Instant::now();
		let (merged, widening) = match &rule {
			Some(rule) => {
				let expansion = Expansion {
					entries: &mut entries,
					variants: &normalized.variants,
					variants_searched: &mut query_diagnostics.variants_searched,
				};

				self.balance(&mut board, expansion, rule, merged, &mut call).await
			},
			None => (merged, WideningDiagnostics::default()),
		};

		timings.balance_ms = budget::elapsed_ms(stage);

		if !merged.rejected.is_empty() {
			call.warn(
				Stage::Merge,
				WarningKind::ProvenanceExcluded,
				None,
				format!(
					"{} hits carried neither a path nor a URL and were dropped.",
					merged.rejected.len()
				),
			);
		}

		let mut counts = CountDiagnostics {
			raw_hits: board.raw_hits(),
			merged: merged.candidates.len(),
			duplicates: merged.duplicates,
			rejected: merged.rejected.len(),
			..Default::default()
		};
		let pool = coverage::select_pool(merged.candidates, self.cfg.coverage.rerank_pool_max as usize);

		counts.pool = pool.len();

		let stage = Instant::now();
		let reranked =
			self.rerank_pool(&normalized.primary, req.mode, pool, rerank_enabled, &mut call).await;

		timings.rerank_ms = budget::elapsed_ms(stage);

		let stage = Instant::now();
		let assembly = evidence::assemble(
			reranked.ranked,
			top_k as usize,
			buffer_k as usize,
			rule.as_ref(),
			&mut call,
		);

		timings.assemble_ms = budget::elapsed_ms(stage);
		timings.total_ms = budget::elapsed_ms(started);
		counts.excluded = assembly.excluded;
		counts.returned = assembly.items.len();

		let status =
			if assembly.items.is_empty() { PackStatus::NoEvidence } else { PackStatus::Ok };
		let Call { warnings, requests, .. } = call;

		tracing::info!(
			trace_id = %trace_id,
			status = ?status,
			items = counts.returned,
			doc = assembly.coverage.by_type.doc,
			code = assembly.coverage.by_type.code,
			warnings = warnings.len(),
			total_ms = timings.total_ms,
			"Retrieval finished."
		);

		let diagnostics = Diagnostics {
			trace_id,
			created_at,
			request: RequestEcho {
				query: req.query.clone(),
				mode: req.mode,
				top_k,
				buffer_k,
				time_budget_ms: req.time_budget_ms,
				filters: req.filters.clone(),
				rerank_enabled,
			},
			query: query_diagnostics,
			vectors,
			fusion: search_cfg.fusion.clone(),
			limits: LimitDiagnostics {
				prefetch_dense: search_cfg.prefetch_dense,
				prefetch_sparse: search_cfg.prefetch_sparse,
				collection_limit: search_cfg.collection_limit,
				widened_collection_limit: search_cfg.widened_collection_limit,
				rerank_pool_max: self.cfg.coverage.rerank_pool_max,
				hnsw_ef: search_cfg.hnsw_ef,
				exact: search_cfg.exact,
			},
			requests,
			widening,
			counts,
			rerank: reranked.diagnostics,
			selection: assembly.selection,
			timings,
			config: snapshot::redacted_config(&self.cfg),
		};

		Ok(EvidencePack {
			status,
			items: assembly.items,
			coverage: assembly.coverage,
			warnings,
			diagnostics,
		})
	}
}

fn validate_request(req: &QueryRequest) -> Result<()> {
	if query::normalize_query(&req.query).is_empty() {
		return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
	}
	if req.top_k == Some(0) {
		return Err(Error::InvalidRequest {
			message: "top_k must be greater than zero.".to_string(),
		});
	}
	if req.filters.iter().any(|filter| filter.field.trim().is_empty()) {
		return Err(Error::InvalidRequest {
			message: "filters.field must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn vector_diagnostics(entries: &[QueryEntry]) -> VectorDiagnostics {
	let Some(entry) = entries.first() else {
		return VectorDiagnostics { sparse: "unavailable".to_string(), ..Default::default() };
	};
	let sparse = match &entry.sparse {
		Some(SparseQuery::Vector(_)) => "provider",
		Some(SparseQuery::StoreSide { .. }) => "store",
		None => "unavailable",
	};

	VectorDiagnostics {
		dense_docs: entry.docs.is_some(),
		dense_code: entry.code.is_some(),
		sparse: sparse.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use ground_domain::TaskMode;

	use super::*;

	#[test]
	fn blank_queries_are_rejected() {
		let err = validate_request(&QueryRequest::new(" \n\t ", TaskMode::Build))
			.expect_err("Expected a blank query to be rejected.");

		assert!(err.to_string().contains("query must be non-empty."));
	}

	#[test]
	fn zero_top_k_is_rejected() {
		let mut req = QueryRequest::new("how to add a function tool", TaskMode::Build);

		req.top_k = Some(0);

		assert!(validate_request(&req).is_err());
	}

	#[test]
	fn filters_need_a_field() {
		let mut req = QueryRequest::new("how to add a function tool", TaskMode::Explain);

		req.filters.push(PayloadFilter::new(" ", ["adk-python"]));

		assert!(validate_request(&req).is_err());

		req.filters[0].field = "repo".to_string();

		assert!(validate_request(&req).is_ok());
	}

	#[test]
	fn coverage_warnings_are_recorded_once_per_type() {
		let mut call = Call::new(&[], Deadline::new(None));
		let rule = CoverageRule { min_doc: 3, min_code: 3 };

		call.warn_coverage(Stage::Balance, ContentType::Code, 1, &rule);
		call.warn_coverage(Stage::Assemble, ContentType::Code, 2, &rule);
		call.warn_coverage(Stage::Assemble, ContentType::Doc, 0, &rule);

		let kinds = call.warnings.iter().map(|warning| warning.subject.as_deref()).collect::<Vec<_>>();

		assert_eq!(kinds, vec![Some("code"), Some("doc")]);
		assert_eq!(call.warnings[0].stage, Stage::Balance);
	}
}
