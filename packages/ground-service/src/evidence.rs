use std::collections::BTreeMap;

use ground_domain::{
	CitationConfidence, ContentType, CoverageRule, RankedCandidate, TypeCounts, coverage,
};

use crate::{
	pack::{CoverageReport, EvidenceItem, SelectionDiagnostics, Stage, WarningKind},
	retrieve::Call,
};

const UNKNOWN_REPO: &str = "unknown";

pub(crate) struct Assembly {
	pub(crate) items: Vec<EvidenceItem>,
	pub(crate) coverage: CoverageReport,
	pub(crate) selection: SelectionDiagnostics,
	pub(crate) excluded: usize,
}

/// Applies the provenance gate, the final coverage check, and the top-k cut.
pub(crate) fn assemble(
	ranked: Vec<RankedCandidate>,
	top_k: usize,
	buffer_k: usize,
	rule: Option<&CoverageRule>,
	call: &mut Call<'_>,
) -> Assembly {
	let mut citable = Vec::with_capacity(ranked.len());
	let mut uncitable = Vec::new();

	for candidate in ranked {
		if candidate.citation.is_some() {
			citable.push(candidate);
		} else {
			uncitable.push(candidate.candidate.content_type);
		}
	}

	let excluded = TypeCounts::of(uncitable);

	for (content_type, missing) in [(ContentType::Doc, "URL"), (ContentType::Code, "path")] {
		let count = excluded.get(content_type);

		if count > 0 {
			call.warn(
				Stage::Assemble,
				WarningKind::ProvenanceExcluded,
				Some(content_type.as_str()),
				format!(
					"{count} {} candidates had no {missing} and were excluded from the pack.",
					content_type.as_str()
				),
			);
		}
	}

	let selection = coverage::select_final(
		&citable,
		|candidate| candidate.candidate.content_type,
		top_k,
		buffer_k,
		rule,
	);
	let chosen = selection.indices.iter().map(|idx| &citable[*idx]).collect::<Vec<_>>();
	let mut items = Vec::with_capacity(chosen.len());

	for (position, ranked) in chosen.into_iter().enumerate() {
		let Some(citation) = &ranked.citation else {
			continue;
		};
		let candidate = &ranked.candidate;

		items.push(EvidenceItem {
			rank: position + 1,
			candidate_id: candidate.candidate_id.clone(),
			content_type: candidate.content_type,
			citation: citation.text.clone(),
			citation_confidence: citation.confidence,
			rerank_score: ranked.rerank_score,
			score_source: ranked.score_source,
			store_score: candidate.store_score,
			collection: candidate.collection.clone(),
			chunk_id: candidate.chunk_id.clone(),
			provenance: candidate.provenance.clone(),
			text: candidate.text.clone(),
		});
	}

	let reduced = items
		.iter()
		.filter(|item| item.citation_confidence == CitationConfidence::Reduced)
		.count();

	if reduced > 0 {
		call.warn(
			Stage::Assemble,
			WarningKind::ProvenanceIncomplete,
			Some(ContentType::Code.as_str()),
			format!("{reduced} code items have no line span and are cited by path only."),
		);
	}

	let by_type = TypeCounts::of(items.iter().map(|item| item.content_type));
	let mut by_repo = BTreeMap::new();

	for item in &items {
		let repo = item.provenance.repo.clone().unwrap_or_else(|| UNKNOWN_REPO.to_string());

		*by_repo.entry(repo).or_insert(0) += 1;
	}

	if let Some(rule) = rule {
		for content_type in rule.deficits(by_type) {
			call.warn_coverage(Stage::Assemble, content_type, by_type.get(content_type), rule);
		}
	}

	let satisfied = rule.map(|rule| rule.is_met(by_type)).unwrap_or(true);

	Assembly {
		items,
		coverage: CoverageReport { by_type, by_repo, required: rule.copied(), satisfied },
		selection: SelectionDiagnostics {
			promoted: selection.promoted,
			promoted_beyond_buffer: selection.promoted_beyond_buffer,
		},
		excluded: excluded.doc + excluded.code,
	}
}

#[cfg(test)]
mod tests {
	use ground_domain::{Candidate, Provenance, ScoreSource};

	use super::*;
	use crate::budget::Deadline;

	fn ranked(content_type: ContentType, id: &str, provenance: Provenance) -> RankedCandidate {
		let candidate = Candidate {
			candidate_id: id.to_string(),
			content_type,
			collection: format!("{}_collection", content_type.as_str()),
			point_id: id.to_string(),
			chunk_id: None,
			text: format!("chunk {id}"),
			text_hash: id.to_string(),
			provenance,
			store_score: 0.5,
		};

		RankedCandidate::new(candidate, 0.5, ScoreSource::Rerank)
	}

	fn code_at(path: &str, lines: Option<(u32, u32)>) -> Provenance {
		Provenance {
			repo: Some("adk-python".to_string()),
			git_ref: Some("main".to_string()),
			path: Some(path.to_string()),
			url: None,
			start_line: lines.map(|(start, _)| start),
			end_line: lines.map(|(_, end)| end),
		}
	}

	fn doc_at(url: Option<&str>) -> Provenance {
		Provenance {
			repo: None,
			git_ref: None,
			path: Some("docs/tools/index.md".to_string()),
			url: url.map(str::to_string),
			start_line: None,
			end_line: None,
		}
	}

	#[test]
	fn uncitable_candidates_never_reach_the_pack() {
		let mut call = Call::new(&[], Deadline::new(None));
		let assembly = assemble(
			vec![
				ranked(ContentType::Doc, "no-url", doc_at(None)),
				ranked(ContentType::Doc, "tools", doc_at(Some("https://google.github.io/adk-docs/tools/"))),
				ranked(ContentType::Code, "tool", code_at("src/google/adk/tools/function_tool.py", Some((10, 40)))),
			],
			5,
			5,
			None,
			&mut call,
		);
		let ids = assembly.items.iter().map(|item| item.candidate_id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids, vec!["tools", "tool"]);
		assert_eq!(assembly.items[0].rank, 1);
		assert_eq!(assembly.items[1].citation, "adk-python@main:src/google/adk/tools/function_tool.py#L10-L40");
		assert_eq!(assembly.excluded, 1);
		assert_eq!(call.warnings.len(), 1);
		assert_eq!(call.warnings[0].kind, WarningKind::ProvenanceExcluded);
		assert_eq!(call.warnings[0].subject.as_deref(), Some("doc"));
		assert!(assembly.coverage.satisfied);
	}

	#[test]
	fn spanless_code_is_kept_with_reduced_confidence() {
		let mut call = Call::new(&[], Deadline::new(None));
		let assembly = assemble(
			vec![ranked(ContentType::Code, "agent", code_at("src/google/adk/agents/llm_agent.py", None))],
			5,
			5,
			None,
			&mut call,
		);

		assert_eq!(assembly.items.len(), 1);
		assert_eq!(assembly.items[0].citation_confidence, CitationConfidence::Reduced);
		assert_eq!(call.warnings[0].kind, WarningKind::ProvenanceIncomplete);
		assert_eq!(assembly.coverage.by_repo.get("adk-python"), Some(&1));
	}

	#[test]
	fn short_final_coverage_is_reported() {
		let mut call = Call::new(&[], Deadline::new(None));
		let rule = CoverageRule { min_doc: 1, min_code: 1 };
		let assembly = assemble(
			vec![ranked(ContentType::Code, "tool", code_at("src/tool.py", Some((1, 2))))],
			5,
			5,
			Some(&rule),
			&mut call,
		);

		assert!(!assembly.coverage.satisfied);
		assert_eq!(assembly.coverage.required, Some(rule));
		assert_eq!(call.warnings.len(), 1);
		assert_eq!(call.warnings[0].kind, WarningKind::CoverageDeficient);
		assert_eq!(call.warnings[0].subject.as_deref(), Some("doc"));
		assert_eq!(assembly.coverage.by_repo.get("adk-python"), Some(&1));
	}
}
