use std::{cmp::Ordering, ops::Range, time::Instant};

use futures::future;

use ground_config::Rerank;
use ground_domain::{Candidate, ContentType, RankedCandidate, ScoreSource, TaskMode};
use ground_providers::rerank::{self, RerankOptions};

use crate::{
	GroundService,
	budget,
	pack::{RerankDiagnostics, RerankMode, Stage, WarningKind},
	retrieve::Call,
	tokens::TokenCounter,
};

const BUILD_INSTRUCTION: &str = "Rank evidence that shows how to implement the task: concrete API usage, signatures, and configuration from authoritative documentation and source. Demote passing mentions.";
const DEBUG_INSTRUCTION: &str = "Rank evidence that explains the failing behavior: error conditions, validation paths, and the code that raises or handles them. Demote general overviews.";
const EXPLAIN_INSTRUCTION: &str = "Rank evidence that explains the concept clearly and authoritatively: conceptual documentation first, then the defining source. Demote incidental mentions.";
const REFACTOR_INSTRUCTION: &str = "Rank evidence that defines the current structure: type and function definitions, call sites, and documented extension points. Demote tutorials.";

pub(crate) struct RerankOutcome {
	pub(crate) ranked: Vec<RankedCandidate>,
	pub(crate) diagnostics: RerankDiagnostics,
}

pub(crate) fn instruction_for(cfg: &Rerank, mode: TaskMode) -> String {
	let overrides = &cfg.instructions;
	let (custom, fallback) = match mode {
		TaskMode::Build => (&overrides.build, BUILD_INSTRUCTION),
		TaskMode::Debug => (&overrides.debug, DEBUG_INSTRUCTION),
		TaskMode::Explain => (&overrides.explain, EXPLAIN_INSTRUCTION),
		TaskMode::Refactor => (&overrides.refactor, REFACTOR_INSTRUCTION),
	};

	custom.clone().unwrap_or_else(|| fallback.to_string())
}

/// Provenance header first, then the chunk body trimmed to `max_tokens`. The header is never
/// trimmed. Returns the document and whether the body was cut.
pub(crate) fn serialize_document(
	candidate: &Candidate,
	counter: &TokenCounter,
	max_tokens: usize,
) -> (String, bool) {
	let provenance = &candidate.provenance;
	let mut header = vec![format!("SOURCE_TYPE: {}", candidate.content_type.as_str())];

	if let Some(repo) = &provenance.repo {
		header.push(format!("REPO: {repo}"));
	}
	if let Some(git_ref) = &provenance.git_ref {
		header.push(format!("REF: {git_ref}"));
	}

	match (candidate.content_type, &provenance.path, &provenance.url) {
		(ContentType::Code, Some(path), _) | (ContentType::Doc, Some(path), None) =>
			header.push(format!("PATH: {path}")),
		(_, _, Some(url)) => header.push(format!("URL: {url}")),
		_ => {},
	}

	if let Some(span) = provenance.line_span() {
		header.push(format!("LINES: {}-{}", span.start, span.end));
	}

	let (body, trimmed) = counter.trim(&candidate.text, max_tokens);

	(format!("{}\n\n{body}", header.join("\n")), trimmed)
}

/// Splits documents into provider calls. Everything goes in one call when the estimated total
/// fits `max_total_tokens`; otherwise calls hold at most `batch_size` documents and stay under
/// the token limit where a single document allows it.
pub(crate) fn plan_batches(
	doc_tokens: &[usize],
	query_tokens: usize,
	max_total_tokens: usize,
	batch_size: usize,
) -> Vec<Range<usize>> {
	if doc_tokens.is_empty() {
		return Vec::new();
	}

	let total = doc_tokens.iter().map(|tokens| tokens + query_tokens).sum::<usize>();

	if total <= max_total_tokens {
		return vec![0..doc_tokens.len()];
	}

	let batch_size = batch_size.max(1);
	let mut batches = Vec::new();
	let mut start = 0;
	let mut used = 0;

	for (idx, tokens) in doc_tokens.iter().enumerate() {
		let cost = tokens + query_tokens;
		let full = idx - start == batch_size || (idx > start && used + cost > max_total_tokens);

		if full {
			batches.push(start..idx);

			start = idx;
			used = 0;
		}

		used += cost;
	}

	batches.push(start..doc_tokens.len());

	batches
}

pub(crate) fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Descending fused store score; ties keep pool order.
pub(crate) fn order_by_store(pool: Vec<Candidate>) -> Vec<RankedCandidate> {
	let mut ranked = pool
		.into_iter()
		.map(|candidate| {
			let score = candidate.store_score;

			RankedCandidate::new(candidate, score, ScoreSource::Store)
		})
		.collect::<Vec<_>>();

	ranked.sort_by(|a, b| cmp_f32_desc(a.rerank_score, b.rerank_score));

	ranked
}

/// Descending rerank score; ties keep pool order.
pub(crate) fn order_by_scores(pool: Vec<Candidate>, scores: &[f32]) -> Vec<RankedCandidate> {
	let mut ranked = pool
		.into_iter()
		.zip(scores)
		.map(|(candidate, score)| RankedCandidate::new(candidate, *score, ScoreSource::Rerank))
		.collect::<Vec<_>>();

	ranked.sort_by(|a, b| cmp_f32_desc(a.rerank_score, b.rerank_score));

	ranked
}

impl GroundService {
	pub(crate) async fn rerank_pool(
		&self,
		query: &str,
		mode: TaskMode,
		pool: Vec<Candidate>,
		enabled: bool,
		call: &mut Call<'_>,
	) -> RerankOutcome {
		let cfg = &self.cfg.rerank;
		let instruction = instruction_for(cfg, mode);
		let mut diagnostics = RerankDiagnostics {
			mode: RerankMode::CrossEncoder,
			instruction: Some(instruction.clone()),
			batches: Vec::new(),
			estimated_tokens: 0,
			trimmed_documents: 0,
			token_counter: self.tokens.label().to_string(),
			truncation: cfg.truncation,
		};

		if !enabled {
			diagnostics.mode = RerankMode::Disabled;
			diagnostics.instruction = None;

			return RerankOutcome { ranked: order_by_store(pool), diagnostics };
		}
		if pool.is_empty() {
			return RerankOutcome { ranked: Vec::new(), diagnostics };
		}
		if call.deadline.expired() {
			diagnostics.mode = RerankMode::Fallback;

			call.warn(
				Stage::Rerank,
				WarningKind::BudgetExceeded,
				Some("rerank"),
				"Time budget spent before reranking. Ordered by fused store score.".to_string(),
			);

			return RerankOutcome { ranked: order_by_store(pool), diagnostics };
		}

		let max_doc_tokens = cfg.max_doc_tokens as usize;
		let mut docs = Vec::with_capacity(pool.len());
		let mut doc_tokens = Vec::with_capacity(pool.len());

		for candidate in &pool {
			let (doc, trimmed) = serialize_document(candidate, &self.tokens, max_doc_tokens);

			if trimmed {
				diagnostics.trimmed_documents += 1;
			}

			doc_tokens.push(self.tokens.count(&doc));
			docs.push(doc);
		}

		let query_tokens = self.tokens.count(&rerank::compose_query(Some(&instruction), query));
		let provider = &self.cfg.providers.rerank;
		let batches = plan_batches(
			&doc_tokens,
			query_tokens,
			provider.max_total_tokens as usize,
			cfg.batch_size as usize,
		);

		diagnostics.estimated_tokens =
			doc_tokens.iter().map(|tokens| tokens + query_tokens).sum::<usize>();
		diagnostics.batches = batches.iter().map(ExactSizeIterator::len).collect();

		let started = Instant::now();
		let options = RerankOptions { instruction: Some(&instruction), truncation: cfg.truncation };
		let deadline = call.deadline;
		let calls = batches.iter().map(|range| {
			let docs = &docs[range.clone()];

			async move {
				let scores = self
					.call_provider("rerank", &self.limiters.rerank, provider.timeout_ms, &deadline, || {
						self.providers.rerank.rerank(provider, query, docs, options)
					})
					.await?;

				if scores.len() != docs.len() {
					return Err(ground_providers::Error::InvalidResponse {
						message: format!(
							"Rerank returned {} scores for {} documents.",
							scores.len(),
							docs.len()
						),
					});
				}

				Ok(scores)
			}
		});
		let results = future::join_all(calls).await;
		let mut scores = Vec::with_capacity(pool.len());

		for result in results {
			match result {
				Ok(batch) => scores.extend(batch),
				Err(err) => {
					diagnostics.mode = RerankMode::Fallback;

					tracing::warn!(
						error = %err,
						candidates = pool.len(),
						"Rerank unavailable. Falling back to fused store order."
					);

					call.warn(
						Stage::Rerank,
						WarningKind::RerankUnavailable,
						Some("rerank"),
						format!("Reranking failed after retries: {err}. Ordered by fused store score."),
					);

					return RerankOutcome { ranked: order_by_store(pool), diagnostics };
				},
			}
		}

		tracing::info!(
			candidates = pool.len(),
			batches = batches.len(),
			elapsed_ms = budget::elapsed_ms(started),
			"Rerank finished."
		);

		RerankOutcome { ranked: order_by_scores(pool, &scores), diagnostics }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ground_domain::Provenance;

	fn candidate(content_type: ContentType, text: &str, score: f32) -> Candidate {
		Candidate {
			candidate_id: text.to_string(),
			content_type,
			collection: "c".to_string(),
			point_id: "1".to_string(),
			chunk_id: None,
			text: text.to_string(),
			text_hash: String::new(),
			provenance: Provenance {
				repo: Some("adk-python".to_string()),
				git_ref: Some("v1.2.0".to_string()),
				path: Some("src/tools/function_tool.py".to_string()),
				url: None,
				start_line: Some(3),
				end_line: Some(9),
			},
			store_score: score,
		}
	}

	#[test]
	fn header_precedes_trimmed_body() {
		let (doc, trimmed) = serialize_document(
			&candidate(ContentType::Code, "one two three four five six", 0.0),
			&TokenCounter::Heuristic,
			4,
		);

		assert!(trimmed);
		assert_eq!(
			doc,
			"SOURCE_TYPE: code\nREPO: adk-python\nREF: v1.2.0\nPATH: src/tools/function_tool.py\nLINES: 3-9\n\none two three"
		);
	}

	#[test]
	fn docs_are_located_by_url() {
		let mut doc = candidate(ContentType::Doc, "Tools", 0.0);

		doc.provenance.url = Some("https://google.github.io/adk-docs/tools/".to_string());

		let (serialized, _) = serialize_document(&doc, &TokenCounter::Heuristic, 10);

		assert!(serialized.contains("URL: https://google.github.io/adk-docs/tools/"));
		assert!(!serialized.contains("PATH:"));
	}

	#[test]
	fn single_batch_when_everything_fits() {
		assert_eq!(plan_batches(&[10; 100], 5, 10_000, 60), vec![0..100]);
	}

	#[test]
	fn oversized_pools_split_by_count_and_tokens() {
		assert_eq!(plan_batches(&[10; 130], 0, 1_000, 60), vec![0..60, 60..120, 120..130]);
		assert_eq!(plan_batches(&[10; 5], 0, 20, 60), vec![0..2, 2..4, 4..5]);
	}

	#[test]
	fn fallback_orders_by_store_score_stably() {
		let ranked = order_by_store(vec![
			candidate(ContentType::Doc, "a", 0.2),
			candidate(ContentType::Code, "b", 0.9),
			candidate(ContentType::Doc, "c", 0.2),
		]);
		let ids = ranked.iter().map(|r| r.candidate.candidate_id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids, vec!["b", "a", "c"]);
		assert!(ranked.iter().all(|r| r.score_source == ScoreSource::Store));
	}

	#[test]
	fn instruction_overrides_apply_per_mode() {
		let mut cfg = Rerank::default();

		cfg.instructions.debug = Some("Find the bug.".to_string());

		assert_eq!(instruction_for(&cfg, TaskMode::Debug), "Find the bug.");
		assert_eq!(instruction_for(&cfg, TaskMode::Build), BUILD_INSTRUCTION);
	}
}
